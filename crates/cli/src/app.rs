//! Wiring: turn a [`Config`] into the service bundle every command uses.

use std::sync::Arc;

use playcoach_pipeline::{AnalysisPipeline, GeminiClient, ServiceBundle, ServiceCell};
use playcoach_storage::{FsObjectStore, MemoryResultStore, StorageError};

use crate::config::{Config, ConfigError};

#[derive(Debug, thiserror::Error)]
pub(crate) enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("could not open record store: {0}")]
    Storage(#[from] StorageError),
}

/// Build the pipeline for `config`, initialising the shared clients once.
pub(crate) async fn build_pipeline(
    cell: &ServiceCell,
    config: &Config,
) -> Result<AnalysisPipeline, StartupError> {
    let services = cell.get_or_try_init(|| build_services(config)).await?;
    Ok(AnalysisPipeline::new(services))
}

async fn build_services(config: &Config) -> Result<ServiceBundle, StartupError> {
    let gemini = config.gemini_config();
    if gemini.api_key.is_none() {
        tracing::warn!(
            "GEMINI_API_KEY is not set; analysis requests will fail with a configuration error"
        );
    }

    let identity = config.identity()?;
    if identity.is_empty() {
        tracing::warn!("no access tokens configured; every authenticated route will return 401");
    }

    let results = MemoryResultStore::open(&config.storage.namespace, config.journal_path()).await?;
    let objects = FsObjectStore::new(
        config.objects_root(),
        &config.storage.bucket,
        &config.storage.public_url,
    );

    tracing::info!(
        namespace = %config.storage.namespace,
        bucket = %config.storage.bucket,
        model = %gemini.model,
        timeout_secs = gemini.timeout.as_secs(),
        "services initialised"
    );

    Ok(ServiceBundle {
        generation: Arc::new(GeminiClient::new(gemini)),
        results: Arc::new(results),
        objects: Arc::new(objects),
        identity: Arc::new(identity),
        prompt: config.prompt_options(),
    })
}
