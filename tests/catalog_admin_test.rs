//! Catalog queries, back-office product management, accounts, and the admin
//! dashboard aggregates.

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

use campus_merch_api::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::catalog::{
        CreateProductInput, ProductFilter, ProductSort, UpdateProductInput,
    },
    services::orders::UpdateOrderStatusRequest,
    services::users::{LoginRequest, RegisterRequest},
};

#[tokio::test]
async fn listing_filters_and_sorts() {
    let app = TestApp::new().await;
    let hoodie = app
        .seed_product("Zip Hoodie", dec!(45.00), &["M"], &["navy"])
        .await;
    let tee = app
        .seed_product("Campus Tee", dec!(15.00), &["M"], &["white"])
        .await;
    let _mug = app
        .seed_product("Campus Mug", dec!(9.00), &["one-size"], &["white"])
        .await;

    // Price ascending puts the mug first.
    let page = app
        .state
        .services
        .catalog
        .list_products(
            ProductFilter {
                sort: ProductSort::PriceAsc,
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.products[0].name, "Campus Mug");

    // Substring search.
    let page = app
        .state
        .services
        .catalog
        .list_products(
            ProductFilter {
                q: Some("Hoodie".to_string()),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.products[0].id, hoodie.id);

    // Price bounds.
    let page = app
        .state
        .services
        .catalog
        .list_products(
            ProductFilter {
                min_price: Some(dec!(10.00)),
                max_price: Some(dec!(20.00)),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.products[0].id, tee.id);

    // Unknown category slug is an empty page, not an error.
    let page = app
        .state
        .services
        .catalog
        .list_products(
            ProductFilter {
                category: Some("does-not-exist".to_string()),
                ..Default::default()
            },
            1,
            20,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn archived_products_leave_the_listing_but_stay_fetchable() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Limited Pennant", dec!(12.00), &["one-size"], &["red"])
        .await;

    app.state
        .services
        .catalog
        .archive_product(product.id, &app.admin_actor())
        .await
        .unwrap();

    let page = app
        .state
        .services
        .catalog
        .list_products(ProductFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    // Historical order lines still need the product record.
    let detail = app.state.services.catalog.get_product(product.id).await.unwrap();
    assert!(!detail.product.is_active);
}

#[tokio::test]
async fn product_slugs_are_derived_and_unique() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Crewneck Sweater", dec!(35.00), &["M"], &["grey"])
        .await;
    assert_eq!(product.slug, "crewneck-sweater");

    let err = app
        .state
        .services
        .catalog
        .create_product(
            CreateProductInput {
                name: "Crewneck Sweater".to_string(),
                slug: None,
                description: "duplicate".to_string(),
                price: dec!(35.00),
                image_url: None,
                category_id: product.category_id,
                sizes: vec!["M".to_string()],
                colors: vec!["grey".to_string()],
            },
            &app.admin_actor(),
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn product_updates_apply_partially() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["M"], &["white"])
        .await;

    let updated = app
        .state
        .services
        .catalog
        .update_product(
            product.id,
            UpdateProductInput {
                price: Some(dec!(17.50)),
                colors: Some(vec!["white".to_string(), "navy".to_string()]),
                ..Default::default()
            },
            &app.admin_actor(),
        )
        .await
        .unwrap();

    assert_eq!(updated.price, dec!(17.50));
    assert_eq!(updated.name, "Campus Tee");
    assert!(updated.has_variant("M", "navy"));
}

// ==================== Accounts ====================

#[tokio::test]
async fn register_login_and_me_round_trip() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "name": "Jordan Lee",
                "email": "jordan@student.test",
                "password": "a-long-password",
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({
                "email": "jordan@student.test",
                "password": "a-long-password",
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let token = body["access_token"].as_str().expect("token issued");
    assert_eq!(body["user"]["role"], "customer");

    let response = app
        .request(Method::GET, "/api/v1/auth/me", None, Some(token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["email"], "jordan@student.test");
}

#[tokio::test]
async fn wrong_password_and_duplicate_email_are_rejected() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .users
        .login(LoginRequest {
            email: app.customer.email.clone(),
            password: "wrong-password".to_string(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Unauthorized(_));

    let err = app
        .state
        .services
        .users
        .register(RegisterRequest {
            name: "Duplicate".to_string(),
            email: app.customer.email.clone(),
            phone: None,
            password: "another-password".to_string(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn admin_routes_are_gated_by_role() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/admin/dashboard",
            None,
            Some(app.customer_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::GET,
            "/api/v1/admin/dashboard",
            None,
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ==================== Dashboard ====================

#[tokio::test]
async fn dashboard_aggregates_orders_and_revenue() {
    let app = TestApp::new().await;

    let first = app.checkout_order(dec!(40.00), 1).await.order;
    let _second = app.checkout_order(dec!(25.00), 2).await.order;

    app.state
        .services
        .orders
        .update_order_status(
            first.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Completed,
                expected_version: None,
            },
            &app.admin_actor(),
        )
        .await
        .unwrap();

    let metrics = app.state.services.dashboard.metrics().await.unwrap();

    assert_eq!(metrics.total_orders, 2);
    assert_eq!(metrics.completed_revenue, dec!(40.00));
    let completed = metrics
        .orders_by_status
        .iter()
        .find(|s| s.status == OrderStatus::Completed)
        .unwrap();
    assert_eq!(completed.count, 1);
    assert_eq!(metrics.recent_orders.len(), 2);
    assert!(metrics.active_products >= 2);
    assert!(metrics.registered_customers >= 1);
}
