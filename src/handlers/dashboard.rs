use crate::handlers::common::{map_service_error, success_response};
use crate::{auth::AdminUser, errors::ApiError, AppState};
use axum::{extract::State, routing::get, Router};
use std::sync::Arc;

pub fn dashboard_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(metrics))
}

async fn metrics(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let metrics = state
        .services
        .dashboard
        .metrics()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(metrics))
}
