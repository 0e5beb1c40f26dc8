use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use bytes::Bytes;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use campus_merch_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::user::{self, UserRole},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::audit::Actor,
    services::cart::AddCartItemInput,
    services::catalog::{CreateCategoryInput, CreateProductInput},
    services::orders::{CheckoutRequest, OrderDetail},
    services::users::RegisterRequest,
    storage::BlobStorage,
    AppState,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

/// Recorded blob write, for asserting on upload side effects.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bucket: String,
    pub object_name: String,
    pub size: usize,
    pub content_type: String,
}

/// In-memory stand-in for the object store, with one-shot failure injection.
#[derive(Default)]
pub struct InMemoryBlobStorage {
    pub objects: Mutex<Vec<StoredObject>>,
    fail_next: AtomicBool,
}

impl InMemoryBlobStorage {
    pub fn fail_next_put(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn put_object(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, ServiceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "storage offline".to_string(),
            ));
        }

        self.objects.lock().unwrap().push(StoredObject {
            bucket: bucket.to_string(),
            object_name: object_name.to_string(),
            size: bytes.len(),
            content_type: content_type.to_string(),
        });

        Ok(format!("https://cdn.test/{}/{}", bucket, object_name))
    }
}

/// Test harness: application state over a fresh SQLite database per test.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub storage: Arc<InMemoryBlobStorage>,
    pub admin: user::Model,
    pub customer: user::Model,
    admin_token: String,
    customer_token: String,
    _db_file: tempfile::NamedTempFile,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file = tempfile::NamedTempFile::new().expect("temp database file");
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.path().display()),
            "test_secret_key_for_testing_purposes_only".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let storage = Arc::new(InMemoryBlobStorage::default());
        let auth_service = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        )));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            auth_service.clone(),
            storage.clone(),
            &cfg,
        );

        let state = Arc::new(AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            auth_service: auth_service.clone(),
            services,
        });

        let router = campus_merch_api::app_router(state.clone());

        let customer = register_user(&state, "Riley Customer", "riley@student.test").await;
        let admin = register_user(&state, "Morgan Admin", "morgan@staff.test").await;
        let admin = promote_to_admin(&state, admin).await;

        let admin_token = auth_service
            .generate_token(&admin)
            .expect("admin token")
            .access_token;
        let customer_token = auth_service
            .generate_token(&customer)
            .expect("customer token")
            .access_token;

        Self {
            state,
            router,
            storage,
            admin,
            customer,
            admin_token,
            customer_token,
            _db_file: db_file,
            _event_task: event_task,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn customer_token(&self) -> &str {
        &self.customer_token
    }

    /// Register an additional customer account and mint a token for it.
    pub async fn register_customer(&self, email: &str) -> (user::Model, String) {
        let model = register_user(&self.state, "Extra Customer", email).await;
        let token = self
            .state
            .auth_service
            .generate_token(&model)
            .expect("extra customer token")
            .access_token;
        (model, token)
    }

    pub fn admin_actor(&self) -> Actor {
        Actor {
            id: self.admin.id,
            email: self.admin.email.clone(),
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed a category plus one product with the given variants.
    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        sizes: &[&str],
        colors: &[&str],
    ) -> campus_merch_api::entities::product::Model {
        let actor = self.admin_actor();
        let category = self
            .state
            .services
            .catalog
            .create_category(
                CreateCategoryInput {
                    name: format!("Category for {}", name),
                    slug: None,
                },
                &actor,
            )
            .await
            .expect("seed category");

        self.state
            .services
            .catalog
            .create_product(
                CreateProductInput {
                    name: name.to_string(),
                    slug: None,
                    description: format!("{} for tests", name),
                    price,
                    image_url: None,
                    category_id: category.id,
                    sizes: sizes.iter().map(|s| s.to_string()).collect(),
                    colors: colors.iter().map(|c| c.to_string()).collect(),
                },
                &actor,
            )
            .await
            .expect("seed product")
    }

    pub async fn add_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: &str,
        color: &str,
        quantity: i32,
    ) {
        self.state
            .services
            .cart
            .add_item(
                user_id,
                AddCartItemInput {
                    product_id,
                    size: size.to_string(),
                    color: color.to_string(),
                    quantity,
                },
            )
            .await
            .expect("seed cart item");
    }

    /// Seed a product, put `quantity` of it in the customer's cart, and
    /// check out, yielding an order in `awaiting_payment` at version 1.
    pub async fn checkout_order(&self, price: Decimal, quantity: i32) -> OrderDetail {
        let product = self
            .seed_product(
                &format!("Checkout product {}", Uuid::new_v4()),
                price,
                &["M", "L"],
                &["navy"],
            )
            .await;
        self.add_cart_item(self.customer.id, product.id, "M", "navy", quantity)
            .await;

        let cart = self
            .state
            .services
            .cart
            .list(self.customer.id)
            .await
            .expect("list cart");
        let item_ids = cart.items.iter().map(|i| i.id).collect();

        self.state
            .services
            .orders
            .checkout(
                self.customer.id,
                CheckoutRequest {
                    item_ids,
                    customer_name: "Riley Customer".to_string(),
                    customer_phone: "+15550101".to_string(),
                    customer_email: "riley@student.test".to_string(),
                    notes: None,
                },
            )
            .await
            .expect("checkout")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

async fn register_user(state: &Arc<AppState>, name: &str, email: &str) -> user::Model {
    let response = state
        .services
        .users
        .register(RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            password: "correct-horse-battery".to_string(),
        })
        .await
        .expect("register test user");

    campus_merch_api::entities::User::find_by_id(response.id)
        .one(&*state.db)
        .await
        .expect("load registered user")
        .expect("registered user exists")
}

async fn promote_to_admin(state: &Arc<AppState>, user: user::Model) -> user::Model {
    let mut active: user::ActiveModel = user.into();
    active.role = Set(UserRole::Admin);
    active.update(&*state.db).await.expect("promote admin")
}

/// Parse a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
