use utoipa::OpenApi;

/// OpenAPI document served at `/docs`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Merch API",
        description = "University merchandise storefront: catalog, cart, checkout, payment verification, and order pickup management"
    ),
    paths(
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::orders::checkout,
        crate::handlers::orders::get_order,
        crate::handlers::orders::upload_payment_proof,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::verify_payment,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::orders::CheckoutRequest,
        crate::services::orders::UpdateOrderStatusRequest,
        crate::services::orders::StatusUpdateResponse,
        crate::services::payments::VerifyPaymentRequest,
        crate::services::payments::PaymentDecisionResponse,
        crate::services::payments::ProofUploadResponse,
    )),
    tags(
        (name = "catalog", description = "Storefront catalog"),
        (name = "orders", description = "Order lifecycle"),
        (name = "payments", description = "Payment verification"),
    )
)]
pub struct ApiDoc;
