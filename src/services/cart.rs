use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{cart_item, CartItem, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct AddCartItemInput {
    pub product_id: Uuid,
    #[validate(length(min = 1))]
    pub size: String,
    #[validate(length(min = 1))]
    pub color: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// Client-held cart row, as sent by the merge and sync endpoints on login.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct LocalCartItem {
    pub product_id: Uuid,
    pub size: String,
    pub color: String,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub image_url: Option<String>,
    pub size: String,
    pub color: String,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total: Decimal,
}

/// Per-user cart keyed by (product, size, color).
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds an item, incrementing the quantity when the variant key already
    /// exists in the cart.
    #[instrument(skip(self, input), fields(user_id = %user_id, product_id = %input.product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddCartItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let product = Product::find_by_id(input.product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if !product.has_variant(&input.size, &input.color) {
            return Err(ServiceError::ValidationError(format!(
                "product '{}' has no {} / {} variant",
                product.name, input.size, input.color
            )));
        }

        self.upsert_row(
            user_id,
            input.product_id,
            &input.size,
            &input.color,
            input.quantity,
        )
        .await?;

        self.list(user_id).await
    }

    /// Updates a row's quantity; zero or less removes the row.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .filter(|item| item.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if quantity <= 0 {
            item.delete(&*self.db).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
        }

        self.list(user_id).await
    }

    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }

        self.list(user_id).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Cart contents joined with product display data. Rows whose product
    /// was deleted out from under them are skipped.
    pub async fn list(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        let mut total = Decimal::ZERO;
        for (row, product) in rows {
            let Some(product) = product else { continue };
            let line_total = product.price * Decimal::from(row.quantity);
            total += line_total;
            items.push(CartItemView {
                id: row.id,
                product_id: product.id,
                product_name: product.name,
                unit_price: product.price,
                image_url: product.image_url,
                size: row.size,
                color: row.color,
                quantity: row.quantity,
                line_total,
            });
        }

        Ok(CartView { items, total })
    }

    /// Reconcile a client-held cart with the server-side cart on login.
    ///
    /// Keys present on both sides sum their quantities; local-only keys are
    /// inserted. Each row is written independently: a mid-merge failure
    /// leaves a partially merged cart, and re-running the merge completes it
    /// (at the cost of double-counting rows that were already summed).
    #[instrument(skip(self, local_items), fields(user_id = %user_id, local_count = local_items.len()))]
    pub async fn merge(
        &self,
        user_id: Uuid,
        local_items: Vec<LocalCartItem>,
    ) -> Result<CartView, ServiceError> {
        let mut merged = 0usize;
        for local in local_items {
            if local.quantity < 1 {
                continue;
            }
            match self.validate_variant(&local).await {
                Ok(()) => {
                    self.upsert_row(
                        user_id,
                        local.product_id,
                        &local.size,
                        &local.color,
                        local.quantity,
                    )
                    .await?;
                    merged += 1;
                }
                Err(e) => {
                    // Stale local rows (deleted products, removed variants)
                    // are dropped rather than failing the whole merge.
                    warn!(product_id = %local.product_id, error = %e, "skipping unmergeable cart row");
                }
            }
        }

        info!(%user_id, merged, "cart merge finished");
        self.event_sender
            .send_or_log(Event::CartMerged {
                user_id,
                merged_items: merged,
            })
            .await;

        self.list(user_id).await
    }

    /// Replace the server-side cart with the client list.
    #[instrument(skip(self, local_items), fields(user_id = %user_id))]
    pub async fn sync(
        &self,
        user_id: Uuid,
        local_items: Vec<LocalCartItem>,
    ) -> Result<CartView, ServiceError> {
        self.clear(user_id).await?;

        for local in local_items {
            if local.quantity < 1 {
                continue;
            }
            if let Err(e) = self.validate_variant(&local).await {
                warn!(product_id = %local.product_id, error = %e, "skipping unsyncable cart row");
                continue;
            }
            self.upsert_row(
                user_id,
                local.product_id,
                &local.size,
                &local.color,
                local.quantity,
            )
            .await?;
        }

        self.list(user_id).await
    }

    async fn validate_variant(&self, local: &LocalCartItem) -> Result<(), ServiceError> {
        let product = Product::find_by_id(local.product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", local.product_id))
            })?;
        if !product.has_variant(&local.size, &local.color) {
            return Err(ServiceError::ValidationError(format!(
                "product '{}' has no {} / {} variant",
                product.name, local.size, local.color
            )));
        }
        Ok(())
    }

    /// Insert or quantity-sum a cart row for the (product, size, color) key.
    async fn upsert_row(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: &str,
        color: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .filter(cart_item::Column::Size.eq(size))
            .filter(cart_item::Column::Color.eq(color))
            .one(&*self.db)
            .await?;

        match existing {
            Some(row) => {
                let current = row.quantity;
                let mut active: cart_item::ActiveModel = row.into();
                active.quantity = Set(current + quantity);
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
            }
            None => {
                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    size: Set(size.to_string()),
                    color: Set(color.to_string()),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        Ok(())
    }
}
