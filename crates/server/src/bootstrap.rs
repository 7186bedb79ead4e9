use ordermate_agent::{llm_from_config, AgentRuntime, LlmError};
use ordermate_core::config::{AppConfig, ConfigError, LoadOptions};
use ordermate_db::{open_store, StoreError};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("record store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("language model client could not be built: {0}")]
    Llm(#[from] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        store_backend = ?config.store.backend,
        "starting application bootstrap"
    );

    let store = open_store(&config.store).await?;
    info!(
        event_name = "system.bootstrap.store_ready",
        correlation_id = "bootstrap",
        backend = store.backend_name(),
        "record store ready"
    );

    let llm = llm_from_config(&config.llm)?;
    if llm.is_none() {
        warn!(
            event_name = "system.bootstrap.llm_missing",
            correlation_id = "bootstrap",
            "no language model credentials; chat replies will ask for configuration"
        );
    }

    let runtime = AgentRuntime::new(store, llm, &config);
    Ok(Application { config, runtime })
}
