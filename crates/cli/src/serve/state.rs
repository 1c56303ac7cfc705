//! Application state shared across request handlers.

use playcoach_pipeline::AnalysisPipeline;

pub(crate) struct AppState {
    pub(crate) pipeline: AnalysisPipeline,
}
