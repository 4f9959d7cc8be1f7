pub mod middleware;
pub mod routes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

// Re-export public types and functions
pub use middleware::{AuthState, AuthedUser, log_request_errors, token_auth_middleware};
pub use routes::{
    AuthRequest, AuthResponse, RelaySettings, authenticate, fetch_config, update_config,
};

/// Create an error response
pub(crate) fn err_response(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "error": message,
        "status": status.as_u16()
    });

    (status, body.to_string()).into_response()
}
