use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{
        cart_item,
        order::{self, OrderStatus},
        order_item,
        payment::{self, PaymentStatus},
        product, CartItem, Order, OrderItem, Payment, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit::{Actor, AuditAction, AuditLogService},
};

/// Request/response types for the order service

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CheckoutRequest {
    /// Cart rows selected for this order
    #[validate(length(min = 1, message = "at least one cart item must be selected"))]
    pub item_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub customer_name: String,
    #[validate(length(min = 1, max = 30))]
    pub customer_phone: String,
    #[validate(email)]
    pub customer_email: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    /// When supplied, the update is rejected unless it matches the stored
    /// version at transaction time.
    pub expected_version: Option<i32>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusUpdateResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub version: i32,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderSummary {
    pub id: Uuid,
    pub customer_name: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub version: i32,
    pub scheduled_pickup_date: Option<NaiveDate>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<order::Model> for OrderSummary {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            customer_name: model.customer_name,
            total_amount: model.total_amount,
            status: model.status,
            version: model.version,
            scheduled_pickup_date: model.scheduled_pickup_date,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub payment: Option<payment::Model>,
}

#[derive(Debug, Serialize)]
pub struct OrderListPage {
    pub orders: Vec<OrderSummary>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Filter for the admin order listing.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
}

/// What changes on an order row. Applied with the version compare-and-swap,
/// so "what changed" is a closed type rather than an ad-hoc column bag.
#[derive(Debug, Clone)]
pub(crate) struct OrderStatusChange {
    pub status: OrderStatus,
    pub completion: Option<CompletionInfo>,
    pub pickup_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub(crate) struct CompletionInfo {
    pub completed_by: Uuid,
}

impl OrderStatusChange {
    pub(crate) fn to(status: OrderStatus) -> Self {
        Self {
            status,
            completion: None,
            pickup_date: None,
        }
    }
}

/// Write `change` onto the order row, incrementing `version` by exactly 1.
///
/// The update is guarded on the version read inside the current transaction:
/// a concurrent writer that advanced the row first makes the guarded update
/// touch zero rows, which surfaces as a `VersionConflict` carrying the row's
/// current status. No read-then-write race window remains.
pub(crate) async fn apply_status_change(
    txn: &DatabaseTransaction,
    current: &order::Model,
    change: OrderStatusChange,
) -> Result<order::Model, ServiceError> {
    let now = Utc::now();

    let mut update = Order::update_many()
        .col_expr(order::Column::Status, Expr::value(change.status))
        .col_expr(
            order::Column::Version,
            Expr::col(order::Column::Version).add(1),
        )
        .col_expr(order::Column::UpdatedAt, Expr::value(now));

    if let Some(completion) = &change.completion {
        update = update
            .col_expr(order::Column::PickedUpAt, Expr::value(Some(now)))
            .col_expr(
                order::Column::CompletedBy,
                Expr::value(Some(completion.completed_by)),
            );
    }

    if let Some(pickup_date) = change.pickup_date {
        update = update.col_expr(
            order::Column::ScheduledPickupDate,
            Expr::value(Some(pickup_date)),
        );
    }

    let result = update
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::Version.eq(current.version))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let fresh = Order::find_by_id(current.id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", current.id)))?;
        return Err(ServiceError::VersionConflict {
            expected: current.version,
            current: fresh.version,
            current_status: fresh.status,
        });
    }

    Order::find_by_id(current.id)
        .one(txn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("Order {} vanished mid-transaction", current.id))
        })
}

/// Owns order creation and every status transition on an order row.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    audit: Arc<AuditLogService>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, audit: Arc<AuditLogService>) -> Self {
        Self {
            db,
            event_sender,
            audit,
        }
    }

    /// Create an order (plus its payment record) from the user's selected
    /// cart rows. Customer fields are snapshotted verbatim from the request;
    /// unit prices and product names are snapshotted from the catalog at
    /// this moment. The selected cart rows are consumed.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        let selected = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::Id.is_in(request.item_ids.clone()))
            .all(&txn)
            .await?;

        if selected.is_empty() {
            return Err(ServiceError::ValidationError(
                "no cart items selected for checkout".to_string(),
            ));
        }
        if selected.len() != request.item_ids.len() {
            return Err(ServiceError::ValidationError(
                "one or more selected cart items no longer exist".to_string(),
            ));
        }

        let product_ids: Vec<Uuid> = selected.iter().map(|i| i.product_id).collect();
        let products = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let mut total = Decimal::ZERO;
        let mut item_models = Vec::with_capacity(selected.len());

        for cart_row in &selected {
            let product = products
                .iter()
                .find(|p| p.id == cart_row.product_id && p.is_active)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "product {} is no longer available",
                        cart_row.product_id
                    ))
                })?;

            let line_total = product.price * Decimal::from(cart_row.quantity);
            total += line_total;

            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                size: Set(cart_row.size.clone()),
                color: Set(cart_row.color.clone()),
                quantity: Set(cart_row.quantity),
                unit_price: Set(product.price),
                created_at: Set(now),
            });
        }

        let order_model = order::ActiveModel {
            id: Set(order_id),
            customer_name: Set(request.customer_name.clone()),
            customer_phone: Set(request.customer_phone.clone()),
            customer_email: Set(request.customer_email.clone()),
            total_amount: Set(total),
            status: Set(OrderStatus::AwaitingPayment),
            version: Set(1),
            user_id: Set(Some(user_id)),
            scheduled_pickup_date: Set(None),
            picked_up_at: Set(None),
            completed_by: Set(None),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for item in item_models {
            item.insert(&txn).await?;
        }

        // Payment amount is fixed at order creation and never recalculated.
        let payment_model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            amount: Set(total),
            status: Set(PaymentStatus::Pending),
            proof_image_url: Set(String::new()),
            verified_by: Set(None),
            verified_at: Set(None),
            rejection_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::Id.is_in(request.item_ids.clone()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(%order_id, %user_id, %total, "order created");

        self.audit
            .record(
                AuditAction::OrderCreated,
                "order",
                order_id,
                json!({ "total_amount": total, "items": selected.len() }),
                None,
            )
            .await;
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderDetail {
            order: order_model,
            items,
            payment: Some(payment_model),
        })
    }

    /// Retrieves an order with its items and payment
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let payment = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?;

        Ok(OrderDetail {
            order,
            items,
            payment,
        })
    }

    /// Lists a user's own orders, newest first
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListPage, ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListPage {
            orders: orders.into_iter().map(OrderSummary::from).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Admin listing with optional status filter
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListPage, ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListPage {
            orders: orders.into_iter().map(OrderSummary::from).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Update an order's status under optimistic concurrency control.
    ///
    /// Re-asserting the current status is accepted and still bumps the
    /// version, so an admin's explicit save always leaves a trace.
    #[instrument(skip(self, request), fields(order_id = %order_id, new_status = %request.status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
        actor: &Actor,
    ) -> Result<StatusUpdateResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if let Some(expected) = request.expected_version {
            if expected != order.version {
                warn!(
                    %order_id,
                    expected,
                    current = order.version,
                    "stale order status update rejected"
                );
                return Err(ServiceError::VersionConflict {
                    expected,
                    current: order.version,
                    current_status: order.status,
                });
            }
        }

        let old_status = order.status;
        let change = OrderStatusChange {
            status: request.status,
            completion: (request.status == OrderStatus::Completed).then(|| CompletionInfo {
                completed_by: actor.id,
            }),
            pickup_date: None,
        };

        let updated = apply_status_change(&txn, &order, change).await?;
        txn.commit().await?;

        info!(
            %order_id,
            %old_status,
            new_status = %updated.status,
            version = updated.version,
            "order status updated"
        );

        self.audit
            .record(
                AuditAction::OrderStatusUpdated,
                "order",
                order_id,
                json!({
                    "from": old_status,
                    "to": updated.status,
                    "version": updated.version,
                }),
                Some(actor),
            )
            .await;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: updated.status,
            })
            .await;
        match updated.status {
            OrderStatus::Completed => {
                self.event_sender
                    .send_or_log(Event::OrderCompleted(order_id))
                    .await;
            }
            OrderStatus::Cancelled => {
                self.event_sender
                    .send_or_log(Event::OrderCancelled(order_id))
                    .await;
            }
            _ => {}
        }

        Ok(StatusUpdateResponse {
            id: updated.id,
            status: updated.status,
            version: updated.version,
        })
    }
}
