use std::sync::Arc;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        audit::AuditLogService, cart::CartService, catalog::CatalogService,
        dashboard::DashboardService, orders::OrderService, payments::PaymentService,
        users::UserService, wishlist::WishlistService,
    },
    storage::BlobStorage,
};

pub mod cart;
pub mod common;
pub mod dashboard;
pub mod orders;
pub mod products;
pub mod users;
pub mod wishlist;

/// Service container shared by all HTTP handlers through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub wishlist: Arc<WishlistService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub users: Arc<UserService>,
    pub dashboard: Arc<DashboardService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        storage: Arc<dyn BlobStorage>,
        config: &AppConfig,
    ) -> Self {
        let audit = Arc::new(AuditLogService::new(db.clone()));

        let catalog = Arc::new(CatalogService::new(
            db.clone(),
            event_sender.clone(),
            audit.clone(),
        ));
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let wishlist = Arc::new(WishlistService::new(db.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            audit.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            event_sender.clone(),
            audit.clone(),
            storage,
            config.storage.proof_bucket.clone(),
        ));
        let users = Arc::new(UserService::new(
            db.clone(),
            auth_service,
            event_sender,
            audit.clone(),
        ));
        let dashboard = Arc::new(DashboardService::new(db));

        Self {
            catalog,
            cart,
            wishlist,
            orders,
            payments,
            users,
            dashboard,
        }
    }
}
