use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use runlet::error::RunError;
use runlet::request::RunRequest;
use runlet::runtime::PythonRuntime;
use serde::Serialize;
use tower::ServiceBuilder;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;

pub const MAX_RUN_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub runtime: PythonRuntime,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

pub fn router(state: AppState, request_timeout: Duration, max_inflight: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthcheck))
        .route("/runtime/python", get(run_handler).post(run_handler))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(MAX_RUN_BODY_LIMIT_BYTES))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .layer(CompressionLayer::new())
        .layer(ConcurrencyLimitLayer::new(max_inflight))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state)
}

async fn healthcheck() -> Response {
    let mut response = StatusCode::OK.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

async fn log_request_response(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{method} {uri} status={} latency_ms={}",
        response.status(),
        start.elapsed().as_millis()
    );
    response
}

// Validation failures become structured error responses; the sandboxed
// program's own failure (non-zero exit, timeout) is an ordinary 200 whose
// body is the stderr stream.
async fn run_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let request = match RunRequest::from_parts(body, content_type, &headers).await {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };
    match state.runtime.run(&request).await {
        Ok(response) => response.into_body().into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &RunError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        log::error!("run failed: {err}");
    }
    let mut response = Json(ErrorBody {
        error: err.title(),
        message: err.to_string(),
    })
    .into_response();
    *response.status_mut() = status;
    response
}
