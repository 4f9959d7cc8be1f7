use crate::api::err_response;
use crate::token::TokenService;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, warn};

/// Token verification state to be passed to the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub tokens: TokenService,
}

/// Authenticated username, inserted into request extensions by the auth middleware
#[derive(Debug, Clone)]
pub struct AuthedUser(pub String);

/// Middleware for bearer-token authentication
pub async fn token_auth_middleware(
    State(auth_state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    // Owned copy of the token so the request can move on into next.run
    let token = {
        let bearer = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match bearer {
            Some(token) => token.to_string(),
            None => {
                warn!("Request without a usable bearer token");
                return err_response(StatusCode::UNAUTHORIZED, "Bearer token required");
            }
        }
    };

    // Verify the token
    let payload = match auth_state.tokens.verify(&token) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Failed to verify token: {}", err);
            return err_response(err.to_err_code(), &err.to_string());
        }
    };

    req.extensions_mut().insert(AuthedUser(payload.username));
    next.run(req).await
}

pub async fn log_request_errors(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri().clone();
    let method = req.method().clone();

    let response = next.run(req).await;
    let status = response.status();
    if status.is_client_error() {
        // 4xx error
        warn!(
            method = %method,
            uri = %uri,
            status = %status,
            "Client error"
        );
    } else if status.is_server_error() {
        // 5xx error
        error!(
            method = %method,
            uri = %uri,
            status = %status,
            "Server error"
        );
    }

    response
}
