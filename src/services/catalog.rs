use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{category, product, Category, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit::{Actor, AuditAction, AuditLogService},
};

/// Sort orders accepted by the product listing.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

/// Storefront listing filter; all fields optional.
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    /// Category slug
    pub category: Option<String>,
    /// Case-sensitive substring match on the product name
    pub q: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub sort: ProductSort,
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: product::Model,
    pub category: Option<category::Model>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    /// Derived from the name when omitted
    pub slug: Option<String>,
    pub description: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub category_id: Uuid,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub category_id: Option<Uuid>,
    pub sizes: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    pub slug: Option<String>,
}

/// Read side of the catalog plus the admin CRUD used by the back-office.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    audit: Arc<AuditLogService>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, audit: Arc<AuditLogService>) -> Self {
        Self {
            db,
            event_sender,
            audit,
        }
    }

    /// Storefront listing: active products only, filtered and paginated.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        page: u64,
        per_page: u64,
    ) -> Result<ProductPage, ServiceError> {
        let mut query = Product::find().filter(product::Column::IsActive.eq(true));

        if let Some(slug) = &filter.category {
            let category = Category::find()
                .filter(category::Column::Slug.eq(slug.clone()))
                .one(&*self.db)
                .await?;
            match category {
                Some(category) => {
                    query = query.filter(product::Column::CategoryId.eq(category.id));
                }
                None => {
                    // Unknown category yields an empty page, not an error.
                    return Ok(ProductPage {
                        products: vec![],
                        total: 0,
                        page,
                        per_page,
                    });
                }
            }
        }

        if let Some(q) = &filter.q {
            query = query.filter(product::Column::Name.contains(q.as_str()));
        }
        if let Some(min) = filter.min_price {
            query = query.filter(product::Column::Price.gte(min));
        }
        if let Some(max) = filter.max_price {
            query = query.filter(product::Column::Price.lte(max));
        }

        query = match filter.sort {
            ProductSort::Newest => query.order_by_desc(product::Column::CreatedAt),
            ProductSort::PriceAsc => query.order_by_asc(product::Column::Price),
            ProductSort::PriceDesc => query.order_by_desc(product::Column::Price),
            ProductSort::Name => query.order_by_asc(product::Column::Name),
        };

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(ProductPage {
            products,
            total,
            page,
            per_page,
        })
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductDetail, ServiceError> {
        let (product, category) = Product::find_by_id(product_id)
            .find_also_related(Category)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(ProductDetail { product, category })
    }

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
        actor: &Actor,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must not be negative".to_string(),
            ));
        }

        Category::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "category {} does not exist",
                    input.category_id
                ))
            })?;

        let slug = match &input.slug {
            Some(slug) => slug.clone(),
            None => slugify(&input.name),
        };
        self.ensure_product_slug_free(&slug).await?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            slug: Set(slug),
            description: Set(input.description.clone()),
            price: Set(input.price),
            image_url: Set(input.image_url.clone()),
            category_id: Set(input.category_id),
            sizes: Set(json!(input.sizes)),
            colors: Set(json!(input.colors)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %model.id, "product created");
        self.audit
            .record(
                AuditAction::ProductCreated,
                "product",
                model.id,
                json!({ "name": model.name, "price": model.price }),
                Some(actor),
            )
            .await;
        self.event_sender
            .send_or_log(Event::ProductCreated(model.id))
            .await;

        Ok(model)
    }

    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
        actor: &Actor,
    ) -> Result<product::Model, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "price must not be negative".to_string(),
                ));
            }
        }
        if let Some(category_id) = input.category_id {
            Category::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!("category {} does not exist", category_id))
                })?;
        }

        let mut active: product::ActiveModel = product.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(Some(image_url));
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(sizes) = input.sizes {
            active.sizes = Set(json!(sizes));
        }
        if let Some(colors) = input.colors {
            active.colors = Set(json!(colors));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let model = active.update(&*self.db).await?;

        self.audit
            .record(
                AuditAction::ProductUpdated,
                "product",
                model.id,
                json!({ "name": model.name }),
                Some(actor),
            )
            .await;
        self.event_sender
            .send_or_log(Event::ProductUpdated(model.id))
            .await;

        Ok(model)
    }

    /// Soft delete: archived products drop out of the storefront listing but
    /// stay referencable from historical order lines.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn archive_product(
        &self,
        product_id: Uuid,
        actor: &Actor,
    ) -> Result<(), ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let mut active: product::ActiveModel = product.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.audit
            .record(
                AuditAction::ProductArchived,
                "product",
                product_id,
                json!({}),
                Some(actor),
            )
            .await;
        self.event_sender
            .send_or_log(Event::ProductArchived(product_id))
            .await;

        Ok(())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
        actor: &Actor,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let slug = match &input.slug {
            Some(slug) => slug.clone(),
            None => slugify(&input.name),
        };

        let existing = Category::find()
            .filter(category::Column::Slug.eq(slug.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "category slug '{}' is already in use",
                slug
            )));
        }

        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            slug: Set(slug),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.audit
            .record(
                AuditAction::CategoryCreated,
                "category",
                model.id,
                json!({ "name": model.name }),
                Some(actor),
            )
            .await;

        Ok(model)
    }

    async fn ensure_product_slug_free(&self, slug: &str) -> Result<(), ServiceError> {
        let existing = Product::find()
            .filter(product::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "product slug '{}' is already in use",
                slug
            )));
        }
        Ok(())
    }
}

/// Lowercase, alphanumeric, dash-separated slug.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Varsity Hoodie & Navy"), "varsity-hoodie-navy");
        assert_eq!(slugify("  Mug (11oz)  "), "mug-11oz");
        assert_eq!(slugify("CAPS"), "caps");
    }
}
