pub mod api;
pub mod app_state;
pub mod config;
pub mod credentials;
pub mod relay;
pub mod token;

use axum::Router;
use axum::extract::Extension;
use axum::http::{Method, header};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

//
// Re-export
//
pub use api::{
    AuthRequest, AuthResponse, AuthState, AuthedUser, RelaySettings, authenticate, fetch_config,
    log_request_errors, token_auth_middleware, update_config,
};
pub use app_state::AppState;
pub use config::Config;
pub use credentials::CredentialStore;
pub use relay::{Destination, PushRule, RelayConfig, RelayStore, StoreError};
pub use token::{TOKEN_TTL_SECS, TokenError, TokenPayload, TokenService};

pub async fn run(config: Config) {
    // Ensure we're in a proper async context by yielding once
    tokio::task::yield_now().await;

    let listen_on_port = config.listen_on_port;
    let static_dir = config.static_path();

    let state = AppState::new(&config).expect("Failed to create app state");

    // CORS layer, wide open for the dashboard
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    // Create auth state for middleware
    let auth_state = AuthState {
        tokens: state.tokens.clone(),
    };

    // Token-protected routes first, then the login route, then the dashboard
    let app = Router::new()
        .route("/update", post(update_config))
        .route("/getconf", get(fetch_config))
        .route_layer(axum::middleware::from_fn_with_state(
            auth_state,
            token_auth_middleware,
        ))
        .route("/auth", post(authenticate))
        .fallback_service(ServeDir::new(&static_dir))
        .layer(axum::middleware::from_fn(api::log_request_errors))
        .layer(cors)
        .layer(Extension(state));

    let addr = format!("0.0.0.0:{listen_on_port}");
    info!("Listening on {addr}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind API server");

    axum::serve(listener, app).await.expect("Server error");
}
