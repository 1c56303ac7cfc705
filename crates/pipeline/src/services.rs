//! Service bundle: every external collaborator the pipeline talks to,
//! constructed once at startup and injected.

use std::future::Future;
use std::sync::Arc;

use playcoach_core::PromptOptions;
use playcoach_storage::{ObjectStore, ResultStore};
use tokio::sync::OnceCell;

use crate::generation::GenerationClient;
use crate::identity::IdentityProvider;

/// Shared clients for one service instance.
#[derive(Clone)]
pub struct ServiceBundle {
    pub generation: Arc<dyn GenerationClient>,
    pub results: Arc<dyn ResultStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub prompt: PromptOptions,
}

/// One-time initialisation guard for a [`ServiceBundle`].
///
/// Concurrent first callers wait on a single initialiser; a failed
/// initialisation leaves the cell empty so a later call can retry.
#[derive(Default)]
pub struct ServiceCell {
    inner: OnceCell<Arc<ServiceBundle>>,
}

impl ServiceCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<Arc<ServiceBundle>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ServiceBundle, E>>,
    {
        self.inner
            .get_or_try_init(|| async { init().await.map(Arc::new) })
            .await
            .cloned()
    }

    pub fn get(&self) -> Option<Arc<ServiceBundle>> {
        self.inner.get().cloned()
    }
}
