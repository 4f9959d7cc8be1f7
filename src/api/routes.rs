use crate::AppState;
use crate::api::err_response;
use crate::api::middleware::AuthedUser;
use crate::relay::{PushRule, RelayConfig, StoreError};
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Serialize, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

/// Wire shape shared by the update request body and the getconf response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySettings {
    pub streamkey_youtube: String,
    pub streamkey_twitch: String,
    pub streamkey_facebook: String,
    pub enable_youtube: bool,
    pub enable_twitch: bool,
    pub enable_facebook: bool,
}

impl From<RelaySettings> for RelayConfig {
    fn from(settings: RelaySettings) -> Self {
        Self {
            youtube: PushRule {
                enabled: settings.enable_youtube,
                stream_key: settings.streamkey_youtube,
            },
            facebook: PushRule {
                enabled: settings.enable_facebook,
                stream_key: settings.streamkey_facebook,
            },
            twitch: PushRule {
                enabled: settings.enable_twitch,
                stream_key: settings.streamkey_twitch,
            },
        }
    }
}

impl From<RelayConfig> for RelaySettings {
    fn from(config: RelayConfig) -> Self {
        Self {
            streamkey_youtube: config.youtube.stream_key,
            streamkey_twitch: config.twitch.stream_key,
            streamkey_facebook: config.facebook.stream_key,
            enable_youtube: config.youtube.enabled,
            enable_twitch: config.twitch.enabled,
            enable_facebook: config.facebook.enabled,
        }
    }
}

#[axum::debug_handler]
pub async fn authenticate(
    Extension(state): Extension<AppState>,
    Json(request): Json<AuthRequest>,
) -> impl IntoResponse {
    if !state.credentials.verify(&request.username, &request.password) {
        warn!(username = %request.username, "Rejected login attempt");
        return err_response(StatusCode::UNAUTHORIZED, "Invalid username or password");
    }

    match state.tokens.issue(&request.username) {
        Ok(token) => {
            info!(username = %request.username, "Issued access token");
            (StatusCode::OK, Json(AuthResponse { token })).into_response()
        }
        Err(error) => {
            error!(?error, "Failed to issue token");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue token")
        }
    }
}

pub async fn update_config(
    Extension(state): Extension<AppState>,
    Extension(AuthedUser(username)): Extension<AuthedUser>,
    Json(settings): Json<RelaySettings>,
) -> impl IntoResponse {
    let config = RelayConfig::from(settings);

    match state.relay_store.save(&username, &config).await {
        Ok(()) => {
            info!(%username, "Updated relay configuration");
            (StatusCode::OK, "Configuration updated successfully").into_response()
        }
        Err(error) => {
            error!(%username, ?error, "Failed to write relay configuration");
            err_response(error.to_err_code(), &error.to_string())
        }
    }
}

pub async fn fetch_config(
    Extension(state): Extension<AppState>,
    Extension(AuthedUser(username)): Extension<AuthedUser>,
) -> impl IntoResponse {
    match state.relay_store.load(&username).await {
        Ok(config) => {
            debug!(%username, "Fetched relay configuration");
            (StatusCode::OK, Json(RelaySettings::from(config))).into_response()
        }
        Err(StoreError::NotFound) => {
            debug!(%username, "No relay configuration yet");
            err_response(StatusCode::NOT_FOUND, &StoreError::NotFound.to_string())
        }
        Err(error) => {
            error!(%username, ?error, "Failed to read relay configuration");
            err_response(error.to_err_code(), &error.to_string())
        }
    }
}
