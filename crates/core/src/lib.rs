//! playcoach-core: the analysis contract shared by the pipeline and the
//! generative-language model.
//!
//! Everything in this crate is pure: no network, no storage, no clocks.
//!
//! # Public API
//!
//! - [`AnalysisRequest`] / [`AnalysisResult`] -- input and output of one analysis
//! - [`response_schema()`] -- the output shape the model is constrained to
//! - [`build_payload()`] -- prompt builder producing a [`GenerationPayload`]
//! - [`parse_generation_response()`] -- envelope extraction and tolerant parsing
//! - [`UserId`] -- opaque caller identifier
//! - [`InputError`] -- input validation failures

pub mod analysis;
pub mod error;
pub mod prompt;
pub mod response;
pub mod schema;

pub use analysis::{
    AnalysisRequest, AnalysisResult, UserId, DEGRADED_ANALYSIS_TEXT, MAX_QUOTED_RAW_CHARS,
};
pub use error::{InputError, MalformedResponse};
pub use prompt::{build_payload, GenerationPayload, PromptOptions, DEFAULT_TEMPERATURE};
pub use response::{parse_analysis_text, parse_generation_response, ParsedAnalysis};
pub use schema::{response_schema, result_json_schema, FIELD_ORDER};
