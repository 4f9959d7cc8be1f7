use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::relay::RelayStore;
use crate::token::TokenService;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn init_workspace(nginx_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(nginx_dir)?;
    Ok(())
}

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub tokens: TokenService,
    pub relay_store: RelayStore,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let nginx_dir = config.nginx_path();
        init_workspace(&nginx_dir)?;

        let credentials = CredentialStore::load(&config.users_path())?;
        info!(users = credentials.len(), "Loaded credential store");

        let tokens = TokenService::from_keys(config.token_keys.clone())?;

        Ok(Self {
            credentials: Arc::new(credentials),
            tokens,
            relay_store: RelayStore::new(nginx_dir),
        })
    }
}
