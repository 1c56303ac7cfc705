/// Input rejected before any pipeline work begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// The gameplay text is empty or whitespace-only.
    #[error("Gameplay text is required for analysis.")]
    EmptyText,

    /// No file was selected, or the selected file has no content.
    #[error("No file uploaded.")]
    MissingFile,
}

/// Why a model response could not be read as an analysis.
///
/// Never surfaced to callers as a failure: the parser downgrades every
/// variant to a degraded [`AnalysisResult`](crate::AnalysisResult) and
/// reports the reason alongside it for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedResponse {
    /// The response body is not a JSON generation envelope.
    #[error("response envelope is not valid JSON: {0}")]
    InvalidEnvelope(String),

    /// The envelope carries no completion candidates.
    #[error("response contains no completion candidates")]
    NoCandidates,

    /// The first candidate has no text parts, or only empty ones.
    #[error("first candidate has no text content (finish reason: {finish_reason})")]
    EmptyContent { finish_reason: String },

    /// The candidate text is not JSON.
    #[error("candidate text is not valid JSON: {0}")]
    InvalidJson(String),

    /// The candidate text is JSON, but not an object.
    #[error("candidate JSON is not an object")]
    NotAnObject,
}
