//! playcoach-pipeline: the gameplay analysis pipeline and the clients it
//! depends on.
//!
//! [`AnalysisPipeline`] drives one submission through validation, prompt
//! building, the generation call, parsing and persistence. Its
//! collaborators live in a [`ServiceBundle`] built once at startup.

mod error;
mod generation;
mod identity;
mod pipeline;
mod services;

pub use error::{PipelineError, PipelineErrorKind};
pub use generation::{
    GeminiClient, GeminiConfig, GenerationClient, GenerationError, API_KEY_VAR, DEFAULT_GEMINI_URL,
    DEFAULT_MODEL, DEFAULT_TIMEOUT,
};
pub use identity::{AuthError, IdentityConfigError, IdentityProvider, StaticTokenIdentity};
pub use pipeline::{sanitize_file_name, AnalysisPipeline, FileUpload, UploadReceipt, FALLBACK_FILE_NAME};
pub use services::{ServiceBundle, ServiceCell};
