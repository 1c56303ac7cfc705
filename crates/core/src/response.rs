//! Response validation and parsing.
//!
//! Turns the raw body returned by the generation service into an
//! [`AnalysisResult`]. Once the service call itself succeeded this never
//! fails: anything unreadable becomes a degraded result, and the reason is
//! returned next to it so the caller can log it.

use serde::Deserialize;
use serde_json::Value;

use crate::analysis::AnalysisResult;
use crate::error::MalformedResponse;

/// Outcome of parsing one generation response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    /// Always well-formed.
    pub result: AnalysisResult,
    /// Set when `result` is degraded.
    pub malformation: Option<MalformedResponse>,
}

impl ParsedAnalysis {
    pub fn is_degraded(&self) -> bool {
        self.malformation.is_some()
    }

    fn parsed(result: AnalysisResult) -> Self {
        ParsedAnalysis {
            result,
            malformation: None,
        }
    }

    fn degraded(raw: &str, reason: MalformedResponse) -> Self {
        ParsedAnalysis {
            result: AnalysisResult::degraded(raw),
            malformation: Some(reason),
        }
    }
}

// ── Envelope types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Parse a full response body: envelope first, then the candidate text.
pub fn parse_generation_response(body: &str) -> ParsedAnalysis {
    match extract_candidate_text(body) {
        Ok(text) => parse_analysis_text(&text),
        Err(reason) => ParsedAnalysis::degraded(body, reason),
    }
}

/// Parse the model's text payload as an analysis, tolerating minor drift.
pub fn parse_analysis_text(text: &str) -> ParsedAnalysis {
    let json_str = strip_code_fences(text);

    let value: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => return ParsedAnalysis::degraded(text, MalformedResponse::InvalidJson(e.to_string())),
    };

    match value {
        Value::Object(fields) => ParsedAnalysis::parsed(AnalysisResult {
            analysis_text: fields.get("analysis").map(coerce_string).unwrap_or_default(),
            suggestions: fields.get("suggestions").map(coerce_list).unwrap_or_default(),
            errors_detected: fields
                .get("errorsDetected")
                .map(coerce_list)
                .unwrap_or_default(),
        }),
        _ => ParsedAnalysis::degraded(text, MalformedResponse::NotAnObject),
    }
}

// ── Internal ─────────────────────────────────────────────────────────────────

/// Concatenated text of the first candidate's parts.
fn extract_candidate_text(body: &str) -> Result<String, MalformedResponse> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| MalformedResponse::InvalidEnvelope(e.to_string()))?;

    let candidate = envelope
        .candidates
        .into_iter()
        .next()
        .ok_or(MalformedResponse::NoCandidates)?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(MalformedResponse::EmptyContent {
            finish_reason: candidate
                .finish_reason
                .unwrap_or_else(|| "unspecified".to_string()),
        });
    }

    Ok(text)
}

/// Strip markdown code fences (```json ... ```) if the model added them.
fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    if let Some(stripped) = trimmed.strip_prefix("```json") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }

    trimmed
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A list of strings; a lone string becomes a one-element list and nulls
/// are dropped.
fn coerce_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(coerce_string)
            .collect(),
        Value::Null => Vec::new(),
        other => vec![coerce_string(other)],
    }
}
