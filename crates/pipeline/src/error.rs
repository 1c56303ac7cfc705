use playcoach_core::InputError;
use playcoach_storage::StorageError;

use crate::generation::GenerationError;
use crate::identity::AuthError;

/// Failure of one pipeline run.
///
/// Malformed model output is not here: it is absorbed into a degraded
/// result and never fails a submission.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),
}

/// Closed classification used for status mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InputValidation,
    Authentication,
    Transport,
    UpstreamApi,
    Configuration,
    Persistence,
}

impl PipelineError {
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::Input(_) => PipelineErrorKind::InputValidation,
            PipelineError::Authentication(_) => PipelineErrorKind::Authentication,
            PipelineError::Generation(GenerationError::MissingCredentials { .. }) => {
                PipelineErrorKind::Configuration
            }
            PipelineError::Generation(GenerationError::Transport(_)) => PipelineErrorKind::Transport,
            PipelineError::Generation(GenerationError::Upstream { .. }) => {
                PipelineErrorKind::UpstreamApi
            }
            PipelineError::Persistence(_) => PipelineErrorKind::Persistence,
        }
    }

    /// User-readable summary for the `error` field of a response.
    pub fn summary(&self) -> String {
        match self.kind() {
            PipelineErrorKind::InputValidation | PipelineErrorKind::Authentication => {
                self.to_string()
            }
            PipelineErrorKind::Transport => {
                "Failed to analyze gameplay: the AI service could not be reached.".to_string()
            }
            PipelineErrorKind::UpstreamApi => {
                "Failed to analyze gameplay: the AI service returned an error.".to_string()
            }
            PipelineErrorKind::Configuration => {
                "Server configuration error: AI service credentials are missing.".to_string()
            }
            PipelineErrorKind::Persistence => "Failed to save gameplay data.".to_string(),
        }
    }

    /// Technical detail for the optional `details` field.
    pub fn details(&self) -> Option<String> {
        match self {
            PipelineError::Input(_) | PipelineError::Authentication(_) => None,
            PipelineError::Generation(e) => Some(e.to_string()),
            PipelineError::Persistence(e) => Some(e.to_string()),
        }
    }
}
