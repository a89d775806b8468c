use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::transport::SESSION_HEADER;

/// Logs go to stderr so the stdio transport keeps stdout for protocol frames.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// One summary line per HTTP exchange. The session id is the one the client
/// presented, or the one issued by `initialize`.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let presented_session = session_id(request.headers());
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();
    let session = presented_session.or_else(|| session_id(response.headers()));

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        session_id = session.as_deref().unwrap_or("-"),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.is_server_error() {
        warn!(method = %method, path = %path, session_id = ?session, "request failed");
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{HeaderValue, Request as HttpRequest, StatusCode},
        middleware,
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn reads_session_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);

        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc-123"));
        assert_eq!(session_id(&headers).as_deref(), Some("abc-123"));
    }

    #[tokio::test]
    async fn middleware_passes_responses_through() {
        let app = Router::new()
            .route(
                "/mcp",
                post(|| async { ([(SESSION_HEADER, "issued-1")], StatusCode::OK) }),
            )
            .layer(middleware::from_fn(request_logging_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/mcp")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(SESSION_HEADER).map(HeaderValue::as_bytes),
            Some(&b"issued-1"[..])
        );
    }
}
