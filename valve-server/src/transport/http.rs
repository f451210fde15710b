//! HTTP/JSON transport
//!
//! # API Endpoints
//!
//! ## POST /batch
//!
//! Run a batch atomically. Requests run in order; the first failure rolls
//! back the whole batch.
//!
//! ```json
//! {
//!   "caller": "alice",
//!   "requests": [
//!     {"type": "check", "target_service_id": "example", "endpoint_id": 111},
//!     {"type": "invoke", "target_service_id": "example", "data": [0, 2, 0, 0, 0, 3, 0, 0, 0]}
//!   ]
//! }
//! ```
//!
//! Admission time is read from the server clock when the batch is
//! submitted; requests cannot set it. Responds with one outcome per
//! request:
//!
//! ```json
//! {
//!   "outcomes": [
//!     {"type": "admitted", "target_service_id": "example", "endpoint_id": 111,
//!      "owner_id": "alice", "tokens_remaining": 4, "window_start": 1700000000},
//!     {"type": "returned", "data": [5, 0, 0, 0, 0, 0, 0, 0]}
//!   ]
//! }
//! ```
//!
//! ## POST /policies, POST /buckets, POST /check
//!
//! Single-request shortcuts for creating a policy, creating the caller's
//! bucket and running a cooperative check.
//!
//! ## GET /policies/{target}/{endpoint}, GET /policies/{target}/{endpoint}/buckets/{owner}
//!
//! Inspect stored records.
//!
//! ## GET /health, GET /metrics
//!
//! Health check returning "OK", and metrics in Prometheus text format.
//!
//! # Errors
//!
//! | kind                                   | status |
//! |----------------------------------------|--------|
//! | `invalid_policy`                       | 400    |
//! | `unauthorized`, `admission_required`   | 403    |
//! | `not_found`                            | 404    |
//! | `already_exists`                       | 409    |
//! | `quota_exceeded`                       | 429    |
//! | `internal`                             | 500    |
//! | `target_call_failed`                   | 502    |

use super::Transport;
use crate::actor::GatewayHandle;
use crate::gateway::ADMIN_CALLER;
use crate::metrics::{BatchStatus, Metrics};
use crate::types::{
    BatchRequest, BatchResponse, BucketBody, ErrorBody, OutcomeBody, OwnerRequest, PolicyBody,
    PolicyRequest,
};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use valve::{Batch, BatchError, BatchReceipt, BucketId, OwnerId, PolicyId, Request, ValveError};

/// HTTP transport implementation
pub struct HttpTransport {
    addr: SocketAddr,
    metrics: Arc<Metrics>,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16, metrics: Arc<Metrics>) -> Result<Self> {
        let addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address {host}:{port}: {e}"))?;
        Ok(Self { addr, metrics })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, gateway: GatewayHandle) -> Result<()> {
        let app = router(gateway, self.metrics);

        tracing::info!("HTTP server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Source of the admission time for incoming batches
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Build the HTTP routes over a gateway actor, timed by the system clock
pub fn router(gateway: GatewayHandle, metrics: Arc<Metrics>) -> Router {
    router_with_clock(gateway, metrics, Arc::new(SystemTime::now))
}

/// Build the HTTP routes with an explicit clock
pub fn router_with_clock(gateway: GatewayHandle, metrics: Arc<Metrics>, clock: Clock) -> Router {
    let app_state = Arc::new(AppState {
        gateway,
        metrics,
        clock,
    });

    Router::new()
        .route("/batch", post(handle_batch))
        .route("/policies", post(handle_create_policy))
        .route("/buckets", post(handle_create_bucket))
        .route("/check", post(handle_check))
        .route("/policies/{target}/{endpoint}", get(handle_get_policy))
        .route(
            "/policies/{target}/{endpoint}/buckets/{owner}",
            get(handle_get_bucket),
        )
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(handle_metrics))
        .with_state(app_state)
}

struct AppState {
    gateway: GatewayHandle,
    metrics: Arc<Metrics>,
    clock: Clock,
}

/// Error response with its status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn internal(error: anyhow::Error) -> Self {
        tracing::error!("Gateway error: {}", error);
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: format!("Internal server error: {error}"),
                kind: "internal".to_string(),
                index: None,
                retry_after: None,
            },
        }
    }
}

/// HTTP status for a gateway error
pub fn status_for(error: &ValveError) -> StatusCode {
    match error {
        ValveError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
        ValveError::Unauthorized(_) | ValveError::AdmissionRequired => StatusCode::FORBIDDEN,
        ValveError::NotFound(_) => StatusCode::NOT_FOUND,
        ValveError::AlreadyExists(_) => StatusCode::CONFLICT,
        ValveError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        ValveError::TargetCallFailed(_) => StatusCode::BAD_GATEWAY,
        ValveError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ValveError> for ApiError {
    fn from(error: ValveError) -> Self {
        ApiError {
            status: status_for(&error),
            body: ErrorBody::from(&error),
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(error: BatchError) -> Self {
        ApiError {
            status: status_for(&error.error),
            body: ErrorBody::from(&error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.body.retry_after;
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from(secs));
        }
        response
    }
}

async fn run_batch(state: &AppState, batch: Batch) -> Result<BatchReceipt, ApiError> {
    let admissions = batch
        .requests
        .iter()
        .filter(|r| matches!(r, Request::Check { .. } | Request::Call { .. }))
        .count() as u64;

    let start = Instant::now();
    let reply = state.gateway.submit(batch, (state.clock)()).await;
    let latency_us = start.elapsed().as_micros() as u64;

    match reply {
        Ok(Ok(receipt)) => {
            state
                .metrics
                .record_batch(BatchStatus::Committed, latency_us, admissions);
            Ok(receipt)
        }
        Ok(Err(error)) => {
            state
                .metrics
                .record_batch(BatchStatus::from(&error.error), latency_us, admissions);
            Err(error.into())
        }
        Err(e) => {
            state
                .metrics
                .record_batch(BatchStatus::Error, latency_us, admissions);
            Err(ApiError::internal(e))
        }
    }
}

fn single_outcome(receipt: BatchReceipt) -> Result<OutcomeBody, ApiError> {
    receipt
        .outcomes
        .into_iter()
        .next()
        .map(OutcomeBody::from)
        .ok_or_else(|| ApiError::internal(anyhow::anyhow!("Gateway returned no outcome")))
}

async fn handle_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let receipt = run_batch(&state, req.into_batch()).await?;
    Ok(Json(receipt.into()))
}

async fn handle_create_policy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PolicyRequest>,
) -> Result<(StatusCode, Json<OutcomeBody>), ApiError> {
    let batch = Batch::new(ADMIN_CALLER).with(Request::CreatePolicy {
        target_service_id: req.target_service_id.into(),
        endpoint_id: req.endpoint_id,
        max_requests: req.max_requests,
        window_seconds: req.window_seconds,
    });

    let receipt = run_batch(&state, batch).await?;
    Ok((StatusCode::CREATED, Json(single_outcome(receipt)?)))
}

async fn handle_create_bucket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OwnerRequest>,
) -> Result<(StatusCode, Json<OutcomeBody>), ApiError> {
    let caller = OwnerId::from(req.caller.as_str());
    let batch = Batch::new(caller.clone()).with(Request::CreateBucket {
        policy_id: req.policy_id(),
        owner_id: caller,
    });

    let receipt = run_batch(&state, batch).await?;
    Ok((StatusCode::CREATED, Json(single_outcome(receipt)?)))
}

async fn handle_check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OwnerRequest>,
) -> Result<Json<OutcomeBody>, ApiError> {
    let batch = Batch::new(req.caller.as_str()).check(req.policy_id());

    let receipt = run_batch(&state, batch).await?;
    Ok(Json(single_outcome(receipt)?))
}

async fn handle_get_policy(
    State(state): State<Arc<AppState>>,
    Path((target, endpoint)): Path<(String, u32)>,
) -> Result<Json<PolicyBody>, ApiError> {
    let id = PolicyId::new(target, endpoint);
    let policy = state
        .gateway
        .policy(id.clone())
        .await
        .map_err(ApiError::internal)??;

    policy
        .map(|policy| Json(policy.into()))
        .ok_or_else(|| ValveError::NotFound(id.to_string()).into())
}

async fn handle_get_bucket(
    State(state): State<Arc<AppState>>,
    Path((target, endpoint, owner)): Path<(String, u32, String)>,
) -> Result<Json<BucketBody>, ApiError> {
    let id = BucketId::new(PolicyId::new(target, endpoint), owner.into());
    let bucket = state
        .gateway
        .bucket(id.clone())
        .await
        .map_err(ApiError::internal)??;

    bucket
        .map(|bucket| Json(bucket.into()))
        .ok_or_else(|| ValveError::NotFound(id.to_string()).into())
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}
