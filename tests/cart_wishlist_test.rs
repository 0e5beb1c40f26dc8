//! Cart and wishlist behavior, including the login-time merge semantics:
//! cart merges sum quantities (and are deliberately not idempotent), while
//! wishlist merges are a set union.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use uuid::Uuid;

use campus_merch_api::{
    errors::ServiceError,
    services::cart::{AddCartItemInput, LocalCartItem},
};

fn local(product_id: Uuid, size: &str, color: &str, quantity: i32) -> LocalCartItem {
    LocalCartItem {
        product_id,
        size: size.to_string(),
        color: color.to_string(),
        quantity,
    }
}

#[tokio::test]
async fn adding_the_same_variant_sums_quantities() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["S", "M"], &["white", "navy"])
        .await;

    app.add_cart_item(app.customer.id, product.id, "M", "white", 1)
        .await;
    app.add_cart_item(app.customer.id, product.id, "M", "white", 2)
        .await;
    // A different color is a different key.
    app.add_cart_item(app.customer.id, product.id, "M", "navy", 1)
        .await;

    let cart = app.state.services.cart.list(app.customer.id).await.unwrap();
    assert_eq!(cart.items.len(), 2);

    let white = cart
        .items
        .iter()
        .find(|i| i.color == "white")
        .expect("white row");
    assert_eq!(white.quantity, 3);
    assert_eq!(white.line_total, dec!(45.00));
    assert_eq!(cart.total, dec!(60.00));
}

#[tokio::test]
async fn unknown_variants_are_rejected() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["S", "M"], &["white"])
        .await;

    let err = app
        .state
        .services
        .cart
        .add_item(
            app.customer.id,
            AddCartItemInput {
                product_id: product.id,
                size: "XXL".to_string(),
                color: "white".to_string(),
                quantity: 1,
            },
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn zero_quantity_update_removes_the_row() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["M"], &["white"])
        .await;
    app.add_cart_item(app.customer.id, product.id, "M", "white", 2)
        .await;

    let cart = app.state.services.cart.list(app.customer.id).await.unwrap();
    let item_id = cart.items[0].id;

    let cart = app
        .state
        .services
        .cart
        .update_quantity(app.customer.id, item_id, 0)
        .await
        .unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn merge_sums_shared_keys_and_inserts_new_ones() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["S", "M"], &["white"])
        .await;
    let other = app
        .seed_product("Campus Mug", dec!(9.00), &["one-size"], &["white"])
        .await;

    // Server-side cart holds 2 of the tee.
    app.add_cart_item(app.customer.id, product.id, "M", "white", 2)
        .await;

    let merged = app
        .state
        .services
        .cart
        .merge(
            app.customer.id,
            vec![
                local(product.id, "M", "white", 1),
                local(other.id, "one-size", "white", 3),
            ],
        )
        .await
        .unwrap();

    assert_eq!(merged.items.len(), 2);
    let tee = merged.items.iter().find(|i| i.product_id == product.id).unwrap();
    let mug = merged.items.iter().find(|i| i.product_id == other.id).unwrap();
    assert_eq!(tee.quantity, 3);
    assert_eq!(mug.quantity, 3);
}

#[tokio::test]
async fn remerging_the_same_local_cart_double_counts() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["M"], &["white"])
        .await;

    let local_items = vec![local(product.id, "M", "white", 2)];

    app.state
        .services
        .cart
        .merge(app.customer.id, local_items.clone())
        .await
        .unwrap();
    let cart = app
        .state
        .services
        .cart
        .merge(app.customer.id, local_items)
        .await
        .unwrap();

    // Quantity summing means the merge is not idempotent. Documented
    // behavior, inherited from the merge rule.
    assert_eq!(cart.items[0].quantity, 4);
}

#[tokio::test]
async fn merge_skips_stale_local_rows() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["M"], &["white"])
        .await;

    let merged = app
        .state
        .services
        .cart
        .merge(
            app.customer.id,
            vec![
                local(Uuid::new_v4(), "M", "white", 2),
                local(product.id, "M", "white", 1),
                local(product.id, "M", "neon", 1),
            ],
        )
        .await
        .unwrap();

    // Only the valid row landed.
    assert_eq!(merged.items.len(), 1);
    assert_eq!(merged.items[0].quantity, 1);
}

#[tokio::test]
async fn sync_replaces_the_server_cart() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Tee", dec!(15.00), &["S", "M"], &["white"])
        .await;

    app.add_cart_item(app.customer.id, product.id, "S", "white", 5)
        .await;

    let cart = app
        .state
        .services
        .cart
        .sync(app.customer.id, vec![local(product.id, "M", "white", 1)])
        .await
        .unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].size, "M");
    assert_eq!(cart.items[0].quantity, 1);
}

// ==================== Wishlist ====================

#[tokio::test]
async fn wishlist_add_keeps_existing_row() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Scarf", dec!(22.00), &["one-size"], &["navy"])
        .await;

    let first = app
        .state
        .services
        .wishlist
        .add(app.customer.id, product.id)
        .await
        .unwrap();
    let again = app
        .state
        .services
        .wishlist
        .add(app.customer.id, product.id)
        .await
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(again.len(), 1);
    assert_eq!(first[0].id, again[0].id, "existing row is kept");
}

#[tokio::test]
async fn wishlist_merge_is_a_set_union() {
    let app = TestApp::new().await;
    let saved = app
        .seed_product("Campus Scarf", dec!(22.00), &["one-size"], &["navy"])
        .await;
    let new_one = app
        .seed_product("Campus Beanie", dec!(18.00), &["one-size"], &["navy"])
        .await;

    app.state
        .services
        .wishlist
        .add(app.customer.id, saved.id)
        .await
        .unwrap();

    let merged = app
        .state
        .services
        .wishlist
        .merge(
            app.customer.id,
            vec![saved.id, new_one.id, Uuid::new_v4()],
        )
        .await
        .unwrap();

    assert_eq!(merged.len(), 2);

    // Union semantics make re-merging harmless.
    let remerged = app
        .state
        .services
        .wishlist
        .merge(app.customer.id, vec![saved.id, new_one.id])
        .await
        .unwrap();
    assert_eq!(remerged.len(), 2);
}

#[tokio::test]
async fn wishlist_remove_of_unsaved_product_reports_not_found() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Campus Scarf", dec!(22.00), &["one-size"], &["navy"])
        .await;

    let err = app
        .state
        .services
        .wishlist
        .remove(app.customer.id, product.id)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::NotFound(_));
}
