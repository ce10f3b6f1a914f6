//! Caller identity middleware for protected endpoints.
//!
//! Authentication happens upstream. The gateway in front of this service
//! forwards the authenticated user in `x-user-id`, and operators
//! additionally in `x-operator-id`. These middlewares parse the headers
//! and inject the identity into request extensions for downstream handlers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware};
//! # use perlas_server::api::middleware::user_context_middleware;
//! # async fn handler() {}
//!
//! let protected_routes: Router = Router::new()
//!     .route("/api/v1/wallet", get(handler))
//!     .layer(middleware::from_fn(user_context_middleware));
//! # let _ = protected_routes;
//! ```
//!
//! # Extracting the Caller
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use perlas_server::api::middleware::Caller;
//!
//! async fn protected_handler(Extension(caller): Extension<Caller>) -> String {
//!     format!("Authenticated as user {}", caller.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use perlas_wallet::wallet::UserId;

use super::errors::ApiError;

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the operator performing an admin action
pub const OPERATOR_ID_HEADER: &str = "x-operator-id";

/// Authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
}

/// Operator performing an admin action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

impl Operator {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn parse_user_id(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<UserId>().ok())
        .filter(|id| *id > 0)
}

fn parse_operator(headers: &HeaderMap) -> Option<String> {
    headers
        .get(OPERATOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .map(str::to_string)
}

/// Require `x-user-id` and inject [`Caller`].
///
/// - **Success**: Header holds a positive integer → Injects `Caller` → Calls next handler
/// - **Missing or invalid header**: Returns `401 Unauthorized`
pub async fn user_context_middleware(mut request: Request, next: Next) -> Response {
    match parse_user_id(request.headers()) {
        Some(user_id) => {
            request.extensions_mut().insert(Caller { user_id });
            next.run(request).await
        }
        None => ApiError::unauthorized("Missing or invalid x-user-id header").into_response(),
    }
}

/// Require `x-operator-id` and inject [`Operator`].
pub async fn operator_middleware(mut request: Request, next: Next) -> Response {
    match parse_operator(request.headers()) {
        Some(operator) => {
            request.extensions_mut().insert(Operator(operator));
            next.run(request).await
        }
        None => ApiError::unauthorized("Missing or invalid x-operator-id header").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_user_id() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_user_id(&headers), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("42"));
        assert_eq!(parse_user_id(&headers), Some(42));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("-3"));
        assert_eq!(parse_user_id(&headers), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(parse_user_id(&headers), None);
    }

    #[test]
    fn test_parse_operator() {
        let mut headers = HeaderMap::new();
        headers.insert(OPERATOR_ID_HEADER, HeaderValue::from_static("  ops-7 "));
        assert_eq!(parse_operator(&headers).as_deref(), Some("ops-7"));

        headers.insert(OPERATOR_ID_HEADER, HeaderValue::from_static(""));
        assert_eq!(parse_operator(&headers), None);
    }
}
