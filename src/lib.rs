//! Campus Merch API Library
//!
//! Backend for a university merchandise storefront: catalog browsing, cart
//! and wishlist management, checkout, payment verification, and order
//! pickup management.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod storage;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub auth_service: Arc<auth::AuthService>,
    pub services: handlers::AppServices,
}

/// Liveness probe
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// All versioned API routes, customer-facing and back-office.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/products", handlers::products::catalog_routes())
        .nest("/categories", handlers::products::category_routes())
        .nest("/cart", handlers::cart::cart_routes())
        .nest("/wishlist", handlers::wishlist::wishlist_routes())
        .nest("/orders", handlers::orders::order_routes())
        .nest("/auth", handlers::users::auth_routes())
        .nest("/admin", admin_routes())
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/orders", handlers::orders::admin_order_routes())
        .nest("/products", handlers::products::admin_catalog_routes())
        .nest("/users", handlers::users::admin_user_routes())
        .nest("/dashboard", handlers::dashboard::dashboard_routes())
}

/// Build the full application router for the given state.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}
