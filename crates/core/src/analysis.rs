use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// A caller's stable handle, as issued by the identity provider.
///
/// Only meaningful for equality and namespacing. Never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One submission of free-text gameplay for analysis.
///
/// Only constructible through [`AnalysisRequest::new`], so holding one
/// means the text passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    raw_text: String,
    submitter_id: Option<UserId>,
}

impl AnalysisRequest {
    /// Validate and wrap a submission. The text is kept verbatim; trimming
    /// is only used to decide whether it is empty.
    pub fn new(raw_text: impl Into<String>, submitter_id: Option<UserId>) -> Result<Self, InputError> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(InputError::EmptyText);
        }
        Ok(AnalysisRequest {
            raw_text,
            submitter_id,
        })
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn submitter_id(&self) -> Option<&UserId> {
        self.submitter_id.as_ref()
    }
}

/// Structured feedback for one submission.
///
/// Serializes with the exact key names and order the model is asked for:
/// `analysis`, `suggestions`, `errorsDetected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "analysis", default)]
    pub analysis_text: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(rename = "errorsDetected", default)]
    pub errors_detected: Vec<String>,
}

/// Message used as `analysis` when the model output could not be read.
pub const DEGRADED_ANALYSIS_TEXT: &str =
    "Failed to parse AI analysis. Please try again or refine your input.";

/// Longest slice of offending model output quoted in a degraded result.
pub const MAX_QUOTED_RAW_CHARS: usize = 2000;

impl AnalysisResult {
    pub fn new(
        analysis_text: impl Into<String>,
        suggestions: Vec<String>,
        errors_detected: Vec<String>,
    ) -> Self {
        AnalysisResult {
            analysis_text: analysis_text.into(),
            suggestions,
            errors_detected,
        }
    }

    /// Shape-valid result signalling that the model output was unusable.
    /// `errorsDetected` holds exactly one entry quoting `raw`.
    pub fn degraded(raw: &str) -> Self {
        AnalysisResult {
            analysis_text: DEGRADED_ANALYSIS_TEXT.to_string(),
            suggestions: Vec::new(),
            errors_detected: vec![format!(
                "Invalid AI response format: {}",
                truncate_chars(raw, MAX_QUOTED_RAW_CHARS)
            )],
        }
    }
}

/// Truncate on a char boundary, marking the cut with `...`.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
