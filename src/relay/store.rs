use crate::relay::{RelayConfig, codec};
use axum::http::StatusCode;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Errors from reading or writing a relay configuration file, with API error codes
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No relay configuration for this user")]
    NotFound,

    #[error("Failed to read relay configuration: {0}")]
    Read(std::io::Error),

    #[error("Failed to write relay configuration: {0}")]
    Write(std::io::Error),
}

impl StoreError {
    /// Convert error to HTTP status code
    pub fn to_err_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::Read(_) | StoreError::Write(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Reads and writes per-user application blocks under the nginx config directory
#[derive(Clone, Debug)]
pub struct RelayStore {
    nginx_dir: PathBuf,
}

impl RelayStore {
    pub fn new(nginx_dir: impl Into<PathBuf>) -> Self {
        Self {
            nginx_dir: nginx_dir.into(),
        }
    }

    /// Path of one user's configuration file
    pub fn config_path(&self, username: &str) -> PathBuf {
        self.nginx_dir.join(format!("{username}.conf"))
    }

    /// Overwrite the user's configuration file wholesale.
    ///
    /// Concurrent updates for the same user race; last writer wins, as with
    /// any other nginx config edit. No lock is taken.
    pub async fn save(&self, username: &str, config: &RelayConfig) -> Result<(), StoreError> {
        let path = self.config_path(username);
        let text = codec::encode(username, config);

        tokio::fs::write(&path, text)
            .await
            .map_err(StoreError::Write)?;
        debug!(username, path = %path.display(), "Wrote relay configuration");

        Ok(())
    }

    /// Load and decode the user's configuration file
    pub async fn load(&self, username: &str) -> Result<RelayConfig, StoreError> {
        let path = self.config_path(username);

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|error| match error.kind() {
                ErrorKind::NotFound => StoreError::NotFound,
                _ => StoreError::Read(error),
            })?;

        Ok(codec::decode(&text))
    }
}
