// src/middleware/request_id.rs

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps each request in a span carrying a fresh request id and echoes the id back.
pub async fn trace_requests(mut req: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %req.method(),
        url.path = %req.uri().path(),
    );
    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        info!(
            http.response.duration = ?start_time.elapsed(),
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );
        response
    }
    .instrument(span)
    .await
}
