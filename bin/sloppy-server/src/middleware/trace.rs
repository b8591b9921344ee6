use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::BodyExt;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::state::AppState;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Bodies larger than this are summarised instead of logged.
const BODY_LOG_LIMIT: usize = 1024;

/// Run each request inside an `http_request` span keyed by a trace id.
///
/// The id is taken from the `x-trace-id` request header when it is a valid
/// UUID, generated otherwise, and echoed back on the response.
pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let header_value = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let is_upgrade = req.headers().contains_key(header::UPGRADE);

        let mut req = if is_upgrade {
            req
        } else {
            let (parts, body) = req.into_parts();
            let bytes = buffer_and_log("request", &parts.headers, body).await;
            Request::from_parts(parts, Body::from(bytes))
        };
        if let Some(value) = &header_value {
            req.headers_mut().insert(X_TRACE_ID, value.clone());
        }

        let response = next.run(req).await;

        let mut response = if is_upgrade {
            response
        } else {
            let (parts, body) = response.into_parts();
            let bytes = buffer_and_log("response", &parts.headers, body).await;
            Response::from_parts(parts, Body::from(bytes))
        };
        if let Some(value) = header_value {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

async fn buffer_and_log(direction: &str, headers: &header::HeaderMap, body: Body) -> Bytes {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Bytes::new(),
    };

    if content_type.contains("application/json") && bytes.len() < BODY_LOG_LIMIT {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            debug!(direction, body = text, "http body");
        }
    } else if !bytes.is_empty() {
        debug!(direction, content_type, size = bytes.len(), "http body skipped");
    }
    bytes
}
