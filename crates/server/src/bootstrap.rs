use std::sync::Arc;

use rosterbot_core::config::{AccessConfig, AppConfig, ConfigError};
use rosterbot_core::{
    AccessStore, AccessStoreError, ConversationEngine, ConversationService, CsvDatasetLoader,
    DatasetCatalog, DatasetLoader, FileAccessStore, InMemoryAccessStore, ResultFormatter,
};
use rosterbot_telegram::{
    conversation_dispatcher, HttpBotTransport, PollingRunner, ReconnectPolicy, TransportError,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub catalog: Arc<DatasetCatalog>,
    pub loader: Arc<dyn DatasetLoader>,
    pub service: Arc<ConversationService>,
    pub runner: PollingRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("access store could not be opened: {0}")]
    AccessStore(#[from] AccessStoreError),
    #[error("bot transport could not be created: {0}")]
    Transport(#[from] TransportError),
}

/// Wires dataset, access list, conversation service and transport. A dataset that fails to load
/// does not stop startup; conversations report it until a reload succeeds.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let loader: Arc<dyn DatasetLoader> = Arc::new(CsvDatasetLoader::new(
        config.dataset.path.clone(),
        config.dataset.columns.clone(),
        config.field_normalizer()?,
    ));
    let catalog = Arc::new(DatasetCatalog::load_from(loader.as_ref()));

    let access = build_access_store(&config.access)?;
    let members = access.members()?.len();
    info!(
        event_name = "system.bootstrap.access_ready",
        correlation_id = "bootstrap",
        members,
        persistent = config.access.store_path.is_some(),
        "access list ready"
    );
    if config.access.store_path.is_none() {
        warn!(
            event_name = "system.bootstrap.access_in_memory",
            correlation_id = "bootstrap",
            "access list is not persisted; first-user bootstrap repeats after restart"
        );
    }

    let engine = ConversationEngine::new(
        ResultFormatter::new(config.search.currency_suffix.clone()),
        config.search.max_results,
    );
    let service = Arc::new(ConversationService::new(engine, Arc::clone(&catalog), access));

    let transport = HttpBotTransport::new(
        config.telegram.api_base_url.clone(),
        config.telegram.bot_token.clone(),
        config.telegram.poll_timeout_secs,
    )?;
    let runner = PollingRunner::new(
        Arc::new(transport),
        conversation_dispatcher(Arc::clone(&service)),
        ReconnectPolicy::default(),
    );

    Ok(Application { config, catalog, loader, service, runner })
}

/// File-backed when a path is configured, in memory otherwise; seeded with `allowed_users`.
pub fn build_access_store(config: &AccessConfig) -> Result<Arc<dyn AccessStore>, AccessStoreError> {
    let store: Arc<dyn AccessStore> = match &config.store_path {
        Some(path) => {
            let store = FileAccessStore::open(path)?;
            store.ensure_writable()?;
            Arc::new(store)
        }
        None => Arc::new(InMemoryAccessStore::default()),
    };
    for user in &config.allowed_users {
        store.grant(*user)?;
    }
    Ok(store)
}
