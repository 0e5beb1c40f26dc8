use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, Iterable, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::instrument;

use crate::{
    db::DbPool,
    entities::{
        order::{self, OrderStatus},
        payment::{self, PaymentStatus},
        product,
        user::{self, UserRole},
        Order, Payment, Product, User,
    },
    errors::ServiceError,
    services::orders::OrderSummary,
};

const RECENT_ORDERS_LIMIT: u64 = 5;

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub total_orders: u64,
    pub orders_by_status: Vec<StatusCount>,
    pub completed_revenue: Decimal,
    pub pending_verifications: u64,
    pub registered_customers: u64,
    pub active_products: u64,
    pub recent_orders: Vec<OrderSummary>,
}

/// Aggregates for the admin landing page. Read-only.
#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DbPool>,
}

impl DashboardService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn metrics(&self) -> Result<DashboardMetrics, ServiceError> {
        let total_orders = Order::find().count(&*self.db).await?;

        let mut orders_by_status = Vec::new();
        for status in OrderStatus::iter() {
            let count = Order::find()
                .filter(order::Column::Status.eq(status))
                .count(&*self.db)
                .await?;
            orders_by_status.push(StatusCount { status, count });
        }

        // Summed in memory; completed orders are a bounded, slow-growing set
        // and the sum stays backend-portable.
        let completed_revenue = Order::find()
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .all(&*self.db)
            .await?
            .into_iter()
            .fold(Decimal::ZERO, |acc, o| acc + o.total_amount);

        // Proofs uploaded and waiting on an admin decision.
        let pending_verifications = Payment::find()
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .filter(payment::Column::ProofImageUrl.ne(""))
            .count(&*self.db)
            .await?;

        let registered_customers = User::find()
            .filter(user::Column::Role.eq(UserRole::Customer))
            .count(&*self.db)
            .await?;

        let active_products = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .count(&*self.db)
            .await?;

        let recent_orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, RECENT_ORDERS_LIMIT)
            .fetch_page(0)
            .await?
            .into_iter()
            .map(OrderSummary::from)
            .collect();

        Ok(DashboardMetrics {
            total_orders,
            orders_by_status,
            completed_revenue,
            pending_verifications,
            registered_customers,
            active_products,
            recent_orders,
        })
    }
}
