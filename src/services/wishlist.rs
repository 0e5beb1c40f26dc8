use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{wishlist_item, Product, WishlistItem},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Serialize)]
pub struct WishlistItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub added_at: chrono::DateTime<Utc>,
}

/// Per-user saved-product list keyed by product. No quantity semantics.
#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl WishlistService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Save a product. Saving an already-saved product keeps the existing
    /// row untouched.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<WishlistItemView>, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        self.insert_if_absent(user_id, product_id).await?;
        self.list(user_id).await
    }

    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn remove(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<WishlistItemView>, ServiceError> {
        let result = WishlistItem::delete_many()
            .filter(wishlist_item::Column::UserId.eq(user_id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not on the wishlist",
                product_id
            )));
        }

        self.list(user_id).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<WishlistItemView>, ServiceError> {
        let rows = WishlistItem::find()
            .filter(wishlist_item::Column::UserId.eq(user_id))
            .order_by_asc(wishlist_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(row, product)| {
                let product = product?;
                Some(WishlistItemView {
                    id: row.id,
                    product_id: product.id,
                    product_name: product.name,
                    price: product.price,
                    image_url: product.image_url,
                    added_at: row.created_at,
                })
            })
            .collect())
    }

    /// Union a client-held wishlist into the server-side one: products
    /// already saved keep their existing row, unknown products are skipped,
    /// the rest insert. Row writes are independent; re-running a partial
    /// merge is harmless because the union is idempotent.
    #[instrument(skip(self, product_ids), fields(user_id = %user_id, local_count = product_ids.len()))]
    pub async fn merge(
        &self,
        user_id: Uuid,
        product_ids: Vec<Uuid>,
    ) -> Result<Vec<WishlistItemView>, ServiceError> {
        let mut merged = 0usize;
        for product_id in product_ids {
            let product = Product::find_by_id(product_id)
                .one(&*self.db)
                .await?
                .filter(|p| p.is_active);
            if product.is_none() {
                warn!(%product_id, "skipping unknown product during wishlist merge");
                continue;
            }
            if self.insert_if_absent(user_id, product_id).await? {
                merged += 1;
            }
        }

        info!(%user_id, merged, "wishlist merge finished");
        self.event_sender
            .send_or_log(Event::WishlistMerged {
                user_id,
                merged_items: merged,
            })
            .await;

        self.list(user_id).await
    }

    /// Returns true when a new row was inserted.
    async fn insert_if_absent(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, ServiceError> {
        let existing = WishlistItem::find()
            .filter(wishlist_item::Column::UserId.eq(user_id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        if existing.is_some() {
            return Ok(false);
        }

        wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        Ok(true)
    }
}
