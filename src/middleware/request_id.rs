use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::middleware::auth::AuthenticatedUser;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags the request with a trace id, echoes it back and logs one line per
/// request.
pub async fn request_id(req: Request, next: Next) -> Response {
    let id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let span = tracing::info_span!("request", request_id = %id, method = %method, path = %path);
    let mut response = next.run(req).instrument(span.clone()).await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let user_id = response
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.to_string());
    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = elapsed_ms,
            user_id = user_id.as_deref().unwrap_or("-"),
            "request"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
