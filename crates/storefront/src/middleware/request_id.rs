//! Request ID propagation.
//!
//! `tower-http` assigns a UUID v4 to requests that arrive without an
//! `x-request-id` header and copies it onto the response. The functions here
//! put that ID on the request's tracing span and on the Sentry scope.

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use tracing::Span;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn request_id(request: &Request) -> &str {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
}

/// Span for one request, used with `TraceLayer::make_span_with`.
pub fn make_request_span(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id(request),
    )
}

/// Tag the Sentry scope with the request ID for error correlation.
pub async fn tag_request_id(request: Request, next: Next) -> Response {
    let id = request_id(&request).to_owned();
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &id);
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn test_missing_header_reads_as_dash() {
        let request = Request::builder().uri("/cart").body(Body::empty()).unwrap_or_default();
        assert_eq!(request_id(&request), "-");

        let request = Request::builder()
            .uri("/cart")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap_or_default();
        assert_eq!(request_id(&request), "abc-123");
    }
}
