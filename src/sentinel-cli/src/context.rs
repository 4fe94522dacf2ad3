//! Wiring from configuration to a ready session manager.

use anyhow::{Context, Result};
use sentinel_auth::{
    AuthConfig, AuthorizedClient, HttpAuthApi, RenewalCoordinator, SessionManager, sentinel_home,
};
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Everything a command needs to talk to the API as the signed-in user.
pub struct AppContext {
    pub config: AuthConfig,
    pub manager: SessionManager,
    pub client: AuthorizedClient,
}

impl AppContext {
    /// Build the context and bootstrap the session from stored credentials.
    pub fn new(global: &GlobalArgs) -> Result<Self> {
        let config = load_config(global)?;
        let home = sentinel_home()?;
        let store = config.build_store(&home);
        tracing::debug!(
            api = %config.api_base_url,
            storage = ?config.storage,
            home = %home.display(),
            "Building session context"
        );

        let api = HttpAuthApi::with_timeout(&config.api_base_url, config.request_timeout())
            .context("Failed to create HTTP client")?;
        let coordinator = Arc::new(
            RenewalCoordinator::new(Arc::new(api.clone()), store)
                .with_settings(config.renewal_settings()),
        );
        let client = AuthorizedClient::from_api(&api, coordinator.clone())
            .with_renewal_wait(config.renewal_wait());
        let manager = SessionManager::new(coordinator);

        Ok(Self {
            config,
            manager,
            client,
        })
    }
}

/// Resolve configuration: file, then environment, then command-line flags.
pub fn load_config(global: &GlobalArgs) -> Result<AuthConfig> {
    let path = match &global.config {
        Some(path) => path.clone(),
        None => AuthConfig::default_path()?,
    };
    let mut config = AuthConfig::load(&path)?;
    config.apply_env_overrides();
    if let Some(url) = &global.api_url {
        config.api_base_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}
