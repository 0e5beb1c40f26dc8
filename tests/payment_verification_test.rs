//! Payment proof upload and the admin verify/reject decision, including the
//! coupling to order status and the shared version counter.

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use chrono::NaiveDate;
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use tower::ServiceExt;
use uuid::Uuid;

use campus_merch_api::{
    entities::{order::OrderStatus, payment::PaymentStatus},
    errors::ServiceError,
    services::orders::UpdateOrderStatusRequest,
    services::payments::{ProofUpload, VerificationDecision, VerifyPaymentRequest},
};

fn png_upload() -> ProofUpload {
    ProofUpload {
        bytes: Bytes::from_static(b"not-really-a-png"),
        content_type: "image/png".to_string(),
    }
}

fn verify_request(pickup_date: Option<NaiveDate>) -> VerifyPaymentRequest {
    VerifyPaymentRequest {
        decision: VerificationDecision::Verify,
        rejection_reason: None,
        pickup_date,
    }
}

fn reject_request(reason: &str) -> VerifyPaymentRequest {
    VerifyPaymentRequest {
        decision: VerificationDecision::Reject,
        rejection_reason: Some(reason.to_string()),
        pickup_date: None,
    }
}

#[tokio::test]
async fn upload_transitions_payment_and_order() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;

    let first = app
        .state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .expect("first upload");

    assert_eq!(first.payment_status, PaymentStatus::Pending);
    assert_eq!(first.order_status, OrderStatus::Pending);
    assert!(!first.proof_image_url.is_empty());
    assert_eq!(first.order_version, 2);
    assert_eq!(app.storage.object_count(), 1);

    // A re-upload gets a distinct, timestamp-qualified object.
    let second = app
        .state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .expect("second upload");

    assert_ne!(first.proof_image_url, second.proof_image_url);
    assert_eq!(app.storage.object_count(), 2);

    let detail = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(detail.payment.unwrap().proof_image_url, second.proof_image_url);
}

#[tokio::test]
async fn empty_upload_is_rejected_without_touching_storage() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;

    let err = app
        .state
        .services
        .payments
        .upload_proof(
            order.id,
            app.customer.id,
            ProofUpload {
                bytes: Bytes::new(),
                content_type: "image/png".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.storage.object_count(), 0);
}

#[tokio::test]
async fn storage_failure_surfaces_and_leaves_database_untouched() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;

    app.storage.fail_next_put();
    let err = app
        .state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ExternalServiceError(_));

    let detail = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(detail.order.status, OrderStatus::AwaitingPayment);
    assert_eq!(detail.order.version, 1);
    assert!(detail.payment.unwrap().proof_image_url.is_empty());
}

#[tokio::test]
async fn uploads_to_foreign_orders_are_forbidden() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;
    let (other, _token) = app.register_customer("casey@student.test").await;

    let err = app
        .state
        .services
        .payments
        .upload_proof(order.id, other.id, png_upload())
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Forbidden(_));
    assert_eq!(app.storage.object_count(), 0);
}

#[tokio::test]
async fn verify_is_not_idempotent() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;
    app.state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .unwrap();

    let pickup = NaiveDate::from_ymd_opt(2026, 9, 14).unwrap();
    let first = app
        .state
        .services
        .payments
        .verify_payment(order.id, verify_request(Some(pickup)), &app.admin_actor())
        .await
        .expect("first verify succeeds");

    assert_eq!(first.payment_status, PaymentStatus::Verified);
    assert_eq!(first.order_status, OrderStatus::ReadyForPickup);

    let detail = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(detail.order.scheduled_pickup_date, Some(pickup));
    let payment = detail.payment.unwrap();
    assert_eq!(payment.verified_by, Some(app.admin.id));
    assert!(payment.verified_at.is_some());

    // Second verify is an error, and the payment is left as it was.
    let err = app
        .state
        .services
        .payments
        .verify_payment(order.id, verify_request(None), &app.admin_actor())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyVerified(id) if id == order.id);

    let detail = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(detail.payment.unwrap().status, PaymentStatus::Verified);
    assert_eq!(detail.order.status, OrderStatus::ReadyForPickup);
}

#[tokio::test]
async fn reject_reopens_the_order_for_reupload() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;
    app.state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .unwrap();

    let decision = app
        .state
        .services
        .payments
        .verify_payment(
            order.id,
            reject_request("amount does not match the transfer"),
            &app.admin_actor(),
        )
        .await
        .expect("reject succeeds");

    assert_eq!(decision.payment_status, PaymentStatus::Rejected);
    assert_eq!(decision.order_status, OrderStatus::AwaitingPayment);

    let detail = app.state.services.orders.get_order(order.id).await.unwrap();
    let payment = detail.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Rejected);
    assert_eq!(
        payment.rejection_reason.as_deref(),
        Some("amount does not match the transfer")
    );
    assert_eq!(detail.order.status, OrderStatus::AwaitingPayment);

    // A fresh upload clears the rejection and queues the order again.
    app.state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .unwrap();
    let detail = app.state.services.orders.get_order(order.id).await.unwrap();
    let payment = detail.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.rejection_reason.is_none());
    assert_eq!(detail.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn verify_on_unknown_order_reports_not_found() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .payments
        .verify_payment(Uuid::new_v4(), verify_request(None), &app.admin_actor())
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::NotFound(_));
}

/// Every order mutation shares one version counter, so an admin still
/// working from a pre-verification read loses the race.
#[tokio::test]
async fn decisions_participate_in_the_shared_version_counter() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(50.00), 1).await.order;
    assert_eq!(order.version, 1);

    // Upload bumps the version to 2.
    let upload = app
        .state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .unwrap();
    assert_eq!(upload.order_version, 2);

    // Verify bumps it to 3.
    let decision = app
        .state
        .services
        .payments
        .verify_payment(
            order.id,
            verify_request(NaiveDate::from_ymd_opt(2026, 9, 14)),
            &app.admin_actor(),
        )
        .await
        .unwrap();
    assert_eq!(decision.order_version, 3);

    // An admin still holding the checkout-time version conflicts.
    let err = app
        .state
        .services
        .orders
        .update_order_status(
            order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Completed,
                expected_version: Some(1),
            },
            &app.admin_actor(),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::VersionConflict {
            expected: 1,
            current: 3,
            current_status: OrderStatus::ReadyForPickup,
        }
    );

    // Refreshing to the current version lets the pickup complete.
    let done = app
        .state
        .services
        .orders
        .update_order_status(
            order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Completed,
                expected_version: Some(3),
            },
            &app.admin_actor(),
        )
        .await
        .unwrap();
    assert_eq!(done.version, 4);
    assert_eq!(done.status, OrderStatus::Completed);
}

// ==================== HTTP contract ====================

#[tokio::test]
async fn proof_upload_works_over_multipart() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;

    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"proof.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         fake-png-bytes\r\n\
         --{b}--\r\n",
        b = boundary
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/orders/{}/payment-proof", order.id))
        .header("authorization", format!("Bearer {}", app.customer_token()))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(axum::body::Body::from(body))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["payment_status"], "pending");
    assert_eq!(body["order_status"], "pending");
    assert!(body["proof_image_url"].as_str().unwrap().contains(&order.id.to_string()));
}

#[tokio::test]
async fn double_verify_returns_conflict_over_http() {
    let app = TestApp::new().await;
    let order = app.checkout_order(dec!(30.00), 1).await.order;
    app.state
        .services
        .payments
        .upload_proof(order.id, app.customer.id, png_upload())
        .await
        .unwrap();

    let uri = format!("/api/v1/admin/orders/{}/payment/verify", order.id);
    let payload = serde_json::json!({ "decision": "verify" });

    let response = app
        .request(Method::POST, &uri, Some(payload.clone()), Some(app.admin_token()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::POST, &uri, Some(payload), Some(app.admin_token()))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert!(body.get("error").is_some());
}
