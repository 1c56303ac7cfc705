//! Generation client: one outbound `generateContent` call per analysis.
//!
//! The client returns the raw response body on success. Reading the
//! envelope is the parser's job, so a blocked or empty completion still
//! yields a displayable (degraded) result instead of a hard failure.

use std::time::Duration;

use async_trait::async_trait;
use playcoach_core::GenerationPayload;

/// Default generative-language service base URL.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default bound on one generation call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable holding the service credential.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Why a generation call produced no response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The service credential is not configured. Raised before any I/O.
    #[error("{variable} is not set")]
    MissingCredentials { variable: String },

    /// Connection, DNS, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Performs one schema-constrained generation call.
///
/// Implementations never retry: one failed attempt is surfaced as is.
#[async_trait]
pub trait GenerationClient: Send + Sync + 'static {
    /// Send `payload` and return the raw response body.
    async fn generate(&self, payload: &GenerationPayload) -> Result<String, GenerationError>;
}

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: None,
            base_url: DEFAULT_GEMINI_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GeminiConfig {
    /// Full `generateContent` endpoint for the configured model.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// [`GenerationClient`] for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    config: GeminiConfig,
    agent: ureq::Agent,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build()
            .into();
        GeminiClient { config, agent }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, payload: &GenerationPayload) -> Result<String, GenerationError> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => {
                return Err(GenerationError::MissingCredentials {
                    variable: API_KEY_VAR.to_string(),
                })
            }
        };

        let agent = self.agent.clone();
        let url = self.config.endpoint();
        let timeout = self.config.timeout;
        let payload = payload.clone();

        tracing::debug!(url = %url, model = %self.config.model, "calling generation service");

        // ureq is synchronous, so wrap in spawn_blocking
        tokio::task::spawn_blocking(move || call_generate(&agent, &url, &api_key, &payload, timeout))
            .await
            .map_err(|e| GenerationError::Transport(format!("task join error: {}", e)))?
    }
}

fn call_generate(
    agent: &ureq::Agent,
    url: &str,
    api_key: &str,
    payload: &GenerationPayload,
    timeout: Duration,
) -> Result<String, GenerationError> {
    let mut response = agent
        .post(url)
        .header("x-goog-api-key", api_key)
        .header("content-type", "application/json")
        .send_json(payload)
        .map_err(|e| transport_error(e, timeout))?;

    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| transport_error(e, timeout))?;

    if !(200..300).contains(&status) {
        return Err(GenerationError::Upstream { status, body });
    }
    Ok(body)
}

fn transport_error(error: ureq::Error, timeout: Duration) -> GenerationError {
    match error {
        ureq::Error::Timeout(_) => {
            GenerationError::Transport(format!("request timed out after {}s", timeout.as_secs()))
        }
        other => GenerationError::Transport(other.to_string()),
    }
}
