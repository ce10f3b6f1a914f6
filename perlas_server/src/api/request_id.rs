//! Request correlation and access logging.
//!
//! Every response carries `x-request-id`: the caller's value when it is
//! usable, a fresh UUID otherwise. The same layer times the request and
//! feeds the access log and HTTP metrics.

use axum::{
    extract::{FromRequestParts, MatchedPath, Request},
    http::{HeaderMap, HeaderValue, request::Parts},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

use super::errors::ApiError;
use super::middleware::USER_ID_HEADER;
use crate::{logging, metrics};

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied id that is propagated
const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id of the current request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Caller's id when present and at most [`MAX_REQUEST_ID_LEN`] bytes, else a new UUID
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let supplied = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN);
        match supplied {
            Some(id) => Self(id.to_string()),
            None => Self(Uuid::new_v4().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .ok_or_else(|| ApiError::new("INTERNAL_ERROR", "Request id layer is not installed"))
    }
}

/// Attach a request id, then log and count the finished request.
///
/// Metric labels use the matched route template, `unmatched` for 404s.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers());
    request.extensions_mut().insert(request_id.clone());

    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", MatchedPath::as_str)
        .to_owned();
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());

    tracing::debug!(request_id = request_id.as_str(), %method, uri = %request.uri(), "Request started");

    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed();

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status().as_u16();
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    metrics::http_requests_total(method.as_str(), &route, status);
    metrics::http_request_duration_ms(method.as_str(), &route, elapsed.as_secs_f64() * 1000.0);
    logging::log_api_request(method.as_str(), &route, status, duration_ms, user_id);
    logging::log_performance(
        &format!("{} {}", method, route),
        duration_ms,
        Some(request_id.as_str()),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers
    }

    #[test]
    fn test_supplied_id_is_kept() {
        assert_eq!(RequestId::from_headers(&headers_with("req-123")).as_str(), "req-123");
    }

    #[test]
    fn test_missing_id_is_generated() {
        let id = RequestId::from_headers(&HeaderMap::new());
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_oversized_or_blank_id_is_replaced() {
        for supplied in ["x".repeat(MAX_REQUEST_ID_LEN + 1), "   ".to_string()] {
            let id = RequestId::from_headers(&headers_with(&supplied));
            assert!(Uuid::parse_str(id.as_str()).is_ok());
        }
    }
}
