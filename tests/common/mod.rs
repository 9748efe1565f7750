//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use payment_gateway::config::{DeliveryMode, GatewayConfig};
use payment_gateway::lifecycle::{build_parts, start_gateway, Gateway};
use payment_gateway::{HttpServer, Shutdown};

pub const ADMIN_TOKEN: &str = "123";

/// Switches and bookkeeping of one mock processor.
pub struct MockState {
    pub failing: AtomicBool,
    pub health_failing: AtomicBool,
    pub min_response_time: AtomicU64,
    pub delay_ms: AtomicU64,
    pub submit_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
    pub token: Mutex<String>,
    pub payments: DashMap<Uuid, Value>,
    pub fee: Decimal,
}

impl MockState {
    fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            health_failing: AtomicBool::new(false),
            min_response_time: AtomicU64::new(0),
            delay_ms: AtomicU64::new(0),
            submit_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            token: Mutex::new(ADMIN_TOKEN.to_string()),
            payments: DashMap::new(),
            fee: Decimal::new(5, 2),
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

pub struct MockProcessor {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockProcessor {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_health_failing(&self, failing: bool) {
        self.state.health_failing.store(failing, Ordering::SeqCst);
    }

    pub fn accepted(&self) -> usize {
        self.state.payments.len()
    }

    pub fn has(&self, id: &Uuid) -> bool {
        self.state.payments.contains_key(id)
    }
}

/// Start a mock payment processor on an ephemeral port.
pub async fn start_mock_processor() -> MockProcessor {
    let state = Arc::new(MockState::new());
    let app = Router::new()
        .route("/payments", post(submit))
        .route("/payments/service-health", get(health))
        .route("/payments/{id}", get(get_payment))
        .route("/admin/payments-summary", get(summary))
        .route("/admin/config/token", post(set_token))
        .route("/admin/config/delay", post(set_delay))
        .route("/admin/config/failure", post(set_failure))
        .route("/admin/payments", post(purge))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockProcessor { addr, state }
}

async fn submit(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.submit_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if state.failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "processor failing").into_response();
    }

    let Some(id) = body["correlationId"].as_str().and_then(|s| s.parse::<Uuid>().ok()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if state.payments.insert(id, body).is_some() {
        return (StatusCode::UNPROCESSABLE_ENTITY, "duplicate correlationId").into_response();
    }
    Json(json!({ "message": "payment processed successfully" })).into_response()
}

async fn health(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.health_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "failing": state.health_failing.load(Ordering::SeqCst),
        "minResponseTime": state.min_response_time.load(Ordering::SeqCst),
    }))
}

async fn get_payment(State(state): State<Arc<MockState>>, Path(id): Path<Uuid>) -> Response {
    match state.payments.get(&id) {
        Some(p) => Json(p.value().clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn summary(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let total_amount: f64 = state
        .payments
        .iter()
        .filter_map(|p| p.value()["amount"].as_f64())
        .sum();
    let fee: f64 = state.fee.to_string().parse().unwrap();
    Json(json!({
        "totalRequests": state.payments.len(),
        "totalAmount": total_amount,
        "totalFee": total_amount * fee,
        "feePerTransaction": fee,
    }))
    .into_response()
}

async fn set_token(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    *state.token.lock().unwrap() = body["token"].as_str().unwrap_or_default().to_string();
    StatusCode::NO_CONTENT
}

async fn set_delay(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    state
        .delay_ms
        .store(body["delay"].as_u64().unwrap_or(0), Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn set_failure(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    state
        .failing
        .store(body["failure"].as_bool().unwrap_or(false), Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn purge(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    state.payments.clear();
    StatusCode::NO_CONTENT
}

/// Gateway config pointing at two mock processors.
pub fn gateway_config(default: &MockProcessor, fallback: &MockProcessor, mode: DeliveryMode) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.processors.default_url = default.url();
    config.processors.fallback_url = fallback.url();
    config.processors.request_timeout_ms = 1_000;
    config.health_check.interval_ms = 50;
    config.health_check.timeout_ms = 500;
    config.retries.base_delay_ms = 20;
    config.retries.max_delay_ms = 200;
    config.gateway.mode = mode;
    config.admin.enabled = true;
    config.admin.api_key = "test-admin-key".to_string();
    config
}

pub struct RunningGateway {
    pub addr: SocketAddr,
    pub gateway: Gateway,
    pub shutdown: Shutdown,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.gateway.drain())
            .await
            .expect("gateway did not drain");
    }
}

/// Start the full gateway on an ephemeral port.
pub async fn spawn_gateway(config: GatewayConfig) -> RunningGateway {
    let shutdown = Shutdown::new();
    let parts = build_parts(&config).await.unwrap();
    let gateway = start_gateway(&config, parts, &shutdown);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, gateway.service.clone());
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    RunningGateway {
        addr,
        gateway,
        shutdown,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
