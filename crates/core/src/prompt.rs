//! Prompt construction: maps a validated request to a complete,
//! schema-constrained generation payload.
//!
//! The payload serializes directly into the body of a `generateContent`
//! call, so the generation client only adds transport concerns.

use serde::Serialize;
use serde_json::Value;

use crate::analysis::AnalysisRequest;
use crate::schema::{describe_schema, response_schema};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// MIME type requesting machine-parseable output instead of free text.
pub const JSON_MIME_TYPE: &str = "application/json";

/// Sampling settings applied to every payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptOptions {
    pub temperature: f32,
}

impl Default for PromptOptions {
    fn default() -> Self {
        PromptOptions {
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// A complete request body for the generative-language service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub response_mime_type: String,
    pub response_schema: Value,
}

impl GenerationPayload {
    /// The instruction text sent to the model.
    pub fn prompt_text(&self) -> &str {
        self.contents
            .first()
            .and_then(|c| c.parts.first())
            .map(|p| p.text.as_str())
            .unwrap_or("")
    }
}

/// Build the payload for one request. Pure; no I/O.
pub fn build_payload(request: &AnalysisRequest, options: &PromptOptions) -> GenerationPayload {
    GenerationPayload {
        contents: vec![Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: build_prompt_text(request),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: options.temperature,
            response_mime_type: JSON_MIME_TYPE.to_string(),
            response_schema: response_schema(),
        },
    }
}

fn build_prompt_text(request: &AnalysisRequest) -> String {
    let mut prompt = String::from(
        "Analyze the following gameplay log/description for a gaming/esports player.\n\
         Focus on identifying patterns, specific errors, and providing actionable suggestions for improvement.\n\
         Consider the context of a competitive gaming environment.\n",
    );

    if let Some(user) = request.submitter_id() {
        prompt.push_str(&format!(
            "This analysis is for user ID: {}. Tailor the advice as if speaking directly to them.\n",
            user
        ));
    }

    prompt.push_str("\nGameplay:\n\"\"\"\n");
    prompt.push_str(request.raw_text());
    prompt.push_str("\n\"\"\"\n\n");

    prompt.push_str("Respond with exactly one JSON object of this shape:\n");
    prompt.push_str(&describe_schema());
    prompt.push_str(
        "\n\nUse exactly these keys in this order: \"analysis\", \"suggestions\", \"errorsDetected\".\n\
         \"analysis\": a general overview of the gameplay and its patterns.\n\
         \"suggestions\": an array of specific, actionable tips to improve.\n\
         \"errorsDetected\": an array of clear, identified mistakes or sub-optimal actions.\n\
         Do not include markdown fences or any text outside the JSON object.",
    );

    prompt
}
