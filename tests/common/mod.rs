use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    middleware, Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use smartmenu_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{category, product},
    events::{self, EventSender},
    errors::ServiceError,
    handlers::AppServices,
    payments::{
        CheckoutSession, CreateSessionRequest, PaymentProvider, SessionStatus,
    },
    AppState,
};

const TEST_JWT_SECRET: &str =
    "integration-test-signing-key-0123456789-abcdefghijklmnopqrstuvwxyz-!@#$";

/// Scriptable in-memory stand-in for the payment provider.
pub struct StubPaymentProvider {
    /// Whether sessions report as paid when retrieved
    pub paid: AtomicBool,
    /// When set, session creation fails with a provider error
    pub fail_sessions: AtomicBool,
    pub sessions_created: AtomicUsize,
    pub refunded_intents: Mutex<Vec<String>>,
    pub mirrored_coupons: Mutex<Vec<String>>,
}

impl StubPaymentProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            paid: AtomicBool::new(true),
            fail_sessions: AtomicBool::new(false),
            sessions_created: AtomicUsize::new(0),
            refunded_intents: Mutex::new(Vec::new()),
            mirrored_coupons: Mutex::new(Vec::new()),
        })
    }

    pub fn set_paid(&self, paid: bool) {
        self.paid.store(paid, Ordering::SeqCst);
    }

    pub fn set_fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn refund_count(&self) -> usize {
        self.refunded_intents.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProvider for StubPaymentProvider {
    async fn create_coupon(
        &self,
        code: &str,
        _amount_off: Decimal,
        _currency: &str,
    ) -> Result<(), ServiceError> {
        self.mirrored_coupons.lock().unwrap().push(code.to_string());
        Ok(())
    }

    async fn delete_coupon(&self, code: &str) -> Result<(), ServiceError> {
        self.mirrored_coupons
            .lock()
            .unwrap()
            .retain(|mirrored| mirrored != code);
        Ok(())
    }

    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(ServiceError::Payment("session creation refused".to_string()));
        }
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckoutSession {
            id: format!("stub_sess_{}_{}", request.reference, n),
            url: format!("https://pay.test/session/{}", n),
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        let paid = self.paid.load(Ordering::SeqCst);
        Ok(SessionStatus {
            id: session_id.to_string(),
            paid,
            payment_intent_id: paid.then(|| format!("stub_pi_{}", session_id)),
        })
    }

    async fn refund(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        self.refunded_intents
            .lock()
            .unwrap()
            .push(payment_intent_id.to_string());
        Ok(())
    }
}

/// Harness spinning up the full router against a throwaway SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<StubPaymentProvider>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        database_url,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expiration: 3600,
        host: "127.0.0.1".to_string(),
        port: 18_080,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: true,
        cors_allowed_origins: None,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        event_channel_capacity: 256,
        payment_api_base: "https://pay.test".to_string(),
        payment_secret_key: None,
        payment_currency: "usd".to_string(),
        checkout_return_url: "https://shop.test/checkout/approved".to_string(),
        checkout_cancel_url: "https://shop.test/cart".to_string(),
        auth_issuer: "smartmenu-api".to_string(),
        auth_audience: "smartmenu-clients".to_string(),
    }
}

impl TestApp {
    /// Construct a new application with a fresh schema.
    pub async fn new() -> Self {
        let db_dir = TempDir::new().expect("create temp dir for test database");
        let db_path = db_dir.path().join("smartmenu_test.db");
        let cfg = test_config(format!("sqlite://{}?mode=rwc", db_path.display()));

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from_app_config(&cfg)));
        let provider = StubPaymentProvider::new();

        let services = AppServices::new(
            db_arc.clone(),
            &cfg,
            event_sender.clone(),
            auth_service.clone(),
            provider.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            event_sender,
            auth_service: auth_service.clone(),
        };

        let router = smartmenu_api::api_routes()
            .layer(middleware::from_fn_with_state(
                auth_service,
                |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
                 mut req: Request<Body>,
                 next: axum::middleware::Next| async move {
                    req.extensions_mut().insert(auth);
                    next.run(req).await
                },
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            provider,
            _event_task: event_task,
            _db_dir: db_dir,
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

    /// Register an account and return its bearer token.
    pub async fn register_and_login(&self, email: &str, role: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/auth/register",
                Some(json!({
                    "email": email,
                    "name": "Test User",
                    "password": "correct-horse-battery",
                    "role": role,
                })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED, "register {}", email);

        let response = self
            .request(
                Method::POST,
                "/auth/login",
                Some(json!({
                    "email": email,
                    "password": "correct-horse-battery",
                })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login {}", email);
        let body = read_json(response).await;
        body["data"]["token"]
            .as_str()
            .expect("login response carries a token")
            .to_string()
    }

    pub async fn admin_token(&self) -> String {
        let email = format!("admin-{}@test.example", Uuid::new_v4());
        self.register_and_login(&email, "ADMIN").await
    }

    pub async fn customer_token(&self) -> String {
        let email = format!("customer-{}@test.example", Uuid::new_v4());
        self.register_and_login(&email, "CUSTOMER").await
    }

    pub async fn seed_category(&self, name: &str) -> category::Model {
        self.state
            .services
            .catalog
            .create_category(name.to_string())
            .await
            .expect("seed category")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        let cat = self.seed_category(&format!("cat-{}", name)).await;
        self.state
            .services
            .catalog
            .create_product(smartmenu_api::services::CreateProductInput {
                name: name.to_string(),
                price,
                description: format!("{} seeded for integration tests", name),
                category_id: cat.id,
                image_url: None,
            })
            .await
            .expect("seed product")
    }

    #[allow(dead_code)]
    pub async fn seed_coupon(&self, code: &str, discount: Decimal, min: Decimal) {
        self.state
            .services
            .coupons
            .create_coupon(smartmenu_api::services::CreateCouponInput {
                code: code.to_string(),
                discount_amount: discount,
                min_amount: min,
            })
            .await
            .expect("seed coupon");
    }

    /// Put one product line in the caller's cart, returning the cart body.
    #[allow(dead_code)]
    pub async fn add_to_cart(&self, token: &str, product_id: i32, count: i32) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/cart/items",
                Some(json!({ "product_id": product_id, "count": count })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await
    }

    #[allow(dead_code)]
    pub fn default_price() -> Decimal {
        dec!(9.99)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Read a money field regardless of whether it serialized as a JSON
/// number or a decimal string.
#[allow(dead_code)]
pub fn money(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.as_f64().expect("numeric value"),
        other => panic!("not a money value: {}", other),
    }
}

/// Collect a response body as JSON.
pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is json")
    }
}
