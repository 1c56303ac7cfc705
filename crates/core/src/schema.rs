//! The output contract both this service and the model must satisfy.

use serde_json::{json, Value};

/// Output keys in the order the model must emit them.
pub const FIELD_ORDER: [&str; 3] = ["analysis", "suggestions", "errorsDetected"];

const ANALYSIS_DESCRIPTION: &str = "A comprehensive analysis of the gameplay.";
const SUGGESTIONS_DESCRIPTION: &str = "Actionable suggestions for improvement.";
const ERRORS_DESCRIPTION: &str = "Specific errors or misplays identified.";

/// The schema in the generation service's constrained-output dialect
/// (upper-case OpenAPI subset with explicit `propertyOrdering`).
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "analysis": {
                "type": "STRING",
                "description": ANALYSIS_DESCRIPTION,
            },
            "suggestions": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": SUGGESTIONS_DESCRIPTION,
            },
            "errorsDetected": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": ERRORS_DESCRIPTION,
            },
        },
        "required": FIELD_ORDER,
        "propertyOrdering": FIELD_ORDER,
    })
}

/// The same contract as a standard JSON Schema document.
pub fn result_json_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "AnalysisResult",
        "type": "object",
        "properties": {
            "analysis": { "type": "string", "description": ANALYSIS_DESCRIPTION },
            "suggestions": {
                "type": "array",
                "items": { "type": "string" },
                "description": SUGGESTIONS_DESCRIPTION,
            },
            "errorsDetected": {
                "type": "array",
                "items": { "type": "string" },
                "description": ERRORS_DESCRIPTION,
            },
        },
        "required": FIELD_ORDER,
        "additionalProperties": false,
    })
}

/// Human-readable rendering of the schema, embedded in the prompt.
pub(crate) fn describe_schema() -> String {
    format!(
        "{{\n  \"analysis\": string, // {}\n  \"suggestions\": [string], // {}\n  \"errorsDetected\": [string] // {}\n}}",
        ANALYSIS_DESCRIPTION, SUGGESTIONS_DESCRIPTION, ERRORS_DESCRIPTION
    )
}
