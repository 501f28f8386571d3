//! HTTP server exposing the admin API.
//!
//! Request bodies are binary protobuf when sent as `application/protobuf`
//! and ProtoJSON otherwise; an empty body is the default request. Responses
//! follow the `Accept` header the same way.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::signal;

use super::AdminService;
use crate::error::{Error, Result};
use crate::metrics::{AdminLabels, Metrics};

/// Content type for binary protobuf.
const CONTENT_TYPE_PROTOBUF: &str = "application/protobuf";

/// Content type for ProtoJSON.
const CONTENT_TYPE_PROTOJSON: &str = "application/protobuf+json";

fn is_binary_protobuf(media_type: &str) -> bool {
    media_type.contains(CONTENT_TYPE_PROTOBUF) && !media_type.contains(CONTENT_TYPE_PROTOJSON)
}

fn header_is_protobuf(headers: &HeaderMap, name: header::HeaderName) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(is_binary_protobuf)
        .unwrap_or(false)
}

/// Decodes a request body according to its `Content-Type`.
fn decode_body<T>(headers: &HeaderMap, body: &[u8]) -> Result<T>
where
    T: Message + Default + DeserializeOwned,
{
    if body.is_empty() {
        return Ok(T::default());
    }
    if header_is_protobuf(headers, header::CONTENT_TYPE) {
        T::decode(body).map_err(|e| Error::Configuration(format!("Invalid protobuf: {}", e)))
    } else {
        serde_json::from_slice(body)
            .map_err(|e| Error::Configuration(format!("Invalid JSON: {}", e)))
    }
}

/// Response in the format asked for by the `Accept` header.
pub enum ApiResponse {
    Json(Json<serde_json::Value>),
    Protobuf(Vec<u8>),
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Json(json) => json.into_response(),
            ApiResponse::Protobuf(bytes) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, CONTENT_TYPE_PROTOBUF)],
                bytes,
            )
                .into_response(),
        }
    }
}

fn to_api_response<T: Message + Serialize>(
    headers: &HeaderMap,
    response: T,
) -> Result<ApiResponse> {
    if header_is_protobuf(headers, header::ACCEPT) {
        return Ok(ApiResponse::Protobuf(response.encode_to_vec()));
    }
    let value = serde_json::to_value(&response)
        .map_err(|e| Error::Internal(format!("failed to encode response: {}", e)))?;
    Ok(ApiResponse::Json(Json(value)))
}

/// Error response with a Prometheus-style JSON body.
pub struct ApiError(Error);

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            Error::Configuration(_) => (StatusCode::BAD_REQUEST, "bad_data"),
            Error::Unimplemented(_) => (StatusCode::NOT_IMPLEMENTED, "unimplemented"),
            Error::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Error::Cancelled | Error::RemoteUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();

        let body = serde_json::json!({
            "status": "error",
            "errorType": error_type,
            "error": self.0.to_string()
        });

        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<dyn AdminService>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Counts the request and logs failures.
    fn observe(
        &self,
        operation: &str,
        result: Result<ApiResponse>,
    ) -> std::result::Result<ApiResponse, ApiError> {
        let result = result.map_err(ApiError::from);
        let status = match &result {
            Ok(_) => StatusCode::OK,
            Err(err) => err.status().0,
        };
        if let Err(ApiError(err)) = &result {
            tracing::warn!(operation, "admin request failed: {}", err);
        }
        self.metrics
            .admin_requests
            .get_or_create(&AdminLabels {
                operation: operation.to_string(),
                status: status.as_u16(),
            })
            .inc();
        result
    }
}

async fn reload(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<ApiResponse> {
    let request = decode_body(headers, body)?;
    let response = state.admin.reload(request).await?;
    to_api_response(headers, response)
}

async fn snapshot(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<ApiResponse> {
    let request = decode_body(headers, body)?;
    let response = state.admin.snapshot(request).await?;
    to_api_response(headers, response)
}

async fn delete_series(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ApiResponse> {
    let request = decode_body(headers, body)?;
    let response = state.admin.delete_series(request).await?;
    to_api_response(headers, response)
}

/// Handle POST /api/v2/admin/tsdb/reload
async fn handle_reload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<ApiResponse, ApiError> {
    let result = reload(&state, &headers, &body).await;
    state.observe("reload", result)
}

/// Handle POST /api/v2/admin/tsdb/snapshot
async fn handle_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<ApiResponse, ApiError> {
    let result = snapshot(&state, &headers, &body).await;
    state.observe("snapshot", result)
}

/// Handle POST /api/v2/admin/tsdb/delete_series
async fn handle_delete_series(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<ApiResponse, ApiError> {
    let result = delete_series(&state, &headers, &body).await;
    state.observe("delete_series", result)
}

/// Handle GET /metrics
async fn handle_metrics(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

/// Handle /-/healthy endpoint - returns 200 OK if service is running
async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle /-/ready endpoint
async fn handle_ready() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Builds the admin router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v2/admin/tsdb/reload", post(handle_reload))
        .route("/api/v2/admin/tsdb/snapshot", post(handle_snapshot))
        .route("/api/v2/admin/tsdb/delete_series", post(handle_delete_series))
        .route("/metrics", get(handle_metrics))
        .route("/-/healthy", get(handle_healthy))
        .route("/-/ready", get(handle_ready))
        .with_state(state)
}

/// HTTP server for the admin API.
pub struct AdminServer {
    state: AppState,
    port: u16,
}

impl AdminServer {
    pub fn new(admin: Arc<dyn AdminService>, metrics: Arc<Metrics>, port: u16) -> Self {
        Self {
            state: AppState { admin, metrics },
            port,
        }
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Starting admin HTTP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Listen for SIGTERM (K8s pod termination) and SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::TsdbAdminService;
    use crate::admin::proto::{DeleteSeriesRequest, SnapshotResponse};
    use crate::config::StorageOptions;
    use crate::engine::memory::MemoryDb;
    use crate::logging::DiscardSink;
    use crate::remote::proto::{LabelMatcher, MatcherType};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> AppState {
        let db = MemoryDb::open(&StorageOptions::default(), Arc::new(DiscardSink));
        AppState {
            admin: Arc::new(TsdbAdminService::new(db)),
            metrics: Arc::new(Metrics::new()),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn should_return_not_implemented_for_reload() {
        // given
        let state = state();
        let app = router(state.clone());

        // when
        let response = app
            .oneshot(post("/api/v2/admin/tsdb/reload", Body::empty()))
            .await
            .unwrap();

        // then
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["errorType"], "unimplemented");
        assert_eq!(body["error"], "unimplemented: reload");
        assert!(
            state
                .metrics
                .encode()
                .contains("operation=\"reload\",status=\"501\"")
        );
    }

    #[tokio::test]
    async fn should_return_not_implemented_for_snapshot() {
        // given
        let app = router(state());

        // when
        let response = app
            .oneshot(post("/api/v2/admin/tsdb/snapshot", r#"{"skipHead": true}"#))
            .await
            .unwrap();

        // then
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body_json(response).await["error"], "unimplemented: snapshot");
    }

    #[tokio::test]
    async fn should_delete_series_from_json_request() {
        // given
        let app = router(state());
        let body = r#"{"minTime": 0, "maxTime": 1000, "matchers": [{"type": 0, "name": "job", "value": "api"}]}"#;

        // when
        let response = app
            .oneshot(post("/api/v2/admin/tsdb/delete_series", body))
            .await
            .unwrap();

        // then
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn should_accept_protobuf_delete_request() {
        // given
        let app = router(state());
        let request = DeleteSeriesRequest {
            min_time: None,
            max_time: None,
            matchers: vec![LabelMatcher {
                r#type: MatcherType::Re as i32,
                name: "job".to_string(),
                value: "api|web".to_string(),
            }],
        };

        // when
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v2/admin/tsdb/delete_series")
                    .header(header::CONTENT_TYPE, CONTENT_TYPE_PROTOBUF)
                    .header(header::ACCEPT, CONTENT_TYPE_PROTOBUF)
                    .body(Body::from(request.encode_to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        // then
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE_PROTOBUF
        );
    }

    #[tokio::test]
    async fn should_reject_delete_without_matchers() {
        // given
        let app = router(state());

        // when
        let response = app
            .oneshot(post("/api/v2/admin/tsdb/delete_series", "{}"))
            .await
            .unwrap();

        // then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["errorType"], "bad_data");
    }

    #[tokio::test]
    async fn should_reject_malformed_json() {
        // given
        let app = router(state());

        // when
        let response = app
            .oneshot(post("/api/v2/admin/tsdb/snapshot", "{not json"))
            .await
            .unwrap();

        // then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_serve_health_and_metrics() {
        // given
        let app = router(state());

        // when
        let healthy = app
            .clone()
            .oneshot(Request::get("/-/healthy").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let metrics = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // then
        assert_eq!(healthy.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(metrics.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("# HELP admin_requests"));
    }

    #[test]
    fn should_encode_snapshot_response_as_json() {
        // given
        let headers = HeaderMap::new();

        // when
        let response = to_api_response(
            &headers,
            SnapshotResponse {
                name: "20260101T000000Z-0001".to_string(),
            },
        )
        .unwrap();

        // then
        match response {
            ApiResponse::Json(Json(value)) => assert_eq!(value["name"], "20260101T000000Z-0001"),
            ApiResponse::Protobuf(_) => panic!("expected JSON response"),
        }
    }
}
