//! HTTP route handlers: health, analysis, upload, history.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures_util::{Stream, StreamExt};
use playcoach_core::{InputError, UserId};
use playcoach_pipeline::{FileUpload, PipelineError, PipelineErrorKind};
use playcoach_storage::{HistoryDelta, HistoryStream, Unsubscribe};

use super::json_error;
use super::state::AppState;

/// Multipart field carrying the uploaded file.
pub(crate) const FILE_FIELD: &str = "gameplayFile";

/// Map a pipeline failure to its status code and `{error, details?}` body.
pub(crate) fn pipeline_error_response(err: &PipelineError) -> Response {
    let status = match err.kind() {
        PipelineErrorKind::InputValidation => StatusCode::BAD_REQUEST,
        PipelineErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        PipelineErrorKind::Transport
        | PipelineErrorKind::UpstreamApi
        | PipelineErrorKind::Configuration
        | PipelineErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut body = serde_json::json!({ "error": err.summary() });
    if let Some(details) = err.details() {
        body["details"] = serde_json::Value::String(details);
    }
    (status, Json(body)).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// POST /analyze-gameplay
pub(crate) async fn handle_analyze(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<UserId>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let Json(parsed) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            let body = serde_json::json!({
                "error": "Request body must be JSON.",
                "details": rejection.body_text(),
            });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    // A missing or non-string field is the same as empty text.
    let text = parsed
        .get("gameplayText")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    match state.pipeline.submit_gameplay_text(&owner, text).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => pipeline_error_response(&e),
    }
}

/// POST /upload-gameplay (multipart, file in `gameplayFile`)
pub(crate) async fn handle_upload(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<UserId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match multipart {
        Ok(multipart) => read_file_field(multipart).await,
        Err(rejection) => Err(rejection.body_text()),
    };
    let upload = match upload {
        Ok(Some(upload)) => upload,
        Ok(None) => return pipeline_error_response(&InputError::MissingFile.into()),
        Err(details) => {
            let body = serde_json::json!({
                "error": InputError::MissingFile.to_string(),
                "details": details,
            });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    match state.pipeline.upload_gameplay_file(&owner, upload).await {
        Ok(receipt) => {
            let body = serde_json::json!({
                "message": "File uploaded and metadata saved.",
                "fileUrl": receipt.file_url,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => pipeline_error_response(&e),
    }
}

/// The first `gameplayFile` field, or `None` if the form has none.
async fn read_file_field(mut multipart: Multipart) -> Result<Option<FileUpload>, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| e.body_text())?;
        return Ok(Some(FileUpload {
            bytes: bytes.to_vec(),
            file_name,
            mime_type,
        }));
    }
    Ok(None)
}

/// GET /gameplay-logs
pub(crate) async fn handle_list_logs(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<UserId>,
) -> Response {
    match state.pipeline.list_history(&owner).await {
        Ok(records) => {
            let response = serde_json::json!({ "logs": records });
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => pipeline_error_response(&e),
    }
}

/// GET /gameplay-logs/stream
///
/// Server-sent events: one `snapshot` event, then an `update` event per
/// change. Dropping the connection unsubscribes.
pub(crate) async fn handle_stream_logs(
    State(state): State<Arc<AppState>>,
    Extension(owner): Extension<UserId>,
) -> Response {
    let (stream, unsubscribe) = match state.pipeline.history(&owner).subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => return pipeline_error_response(&e.into()),
    };
    history_events_response(stream, unsubscribe)
}

/// The SSE response for one subscription. Dropping the body unsubscribes.
fn history_events_response(stream: HistoryStream, unsubscribe: Unsubscribe) -> Response {
    Sse::new(delta_events(stream.into_stream(), unsubscribe))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Calls [`Unsubscribe::unsubscribe`] when the event stream is dropped.
struct UnsubscribeOnDrop(Unsubscribe);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

fn delta_events(
    deltas: impl Stream<Item = HistoryDelta> + Send + 'static,
    unsubscribe: Unsubscribe,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let guard = UnsubscribeOnDrop(unsubscribe);
    deltas.map(move |delta| {
        let _ = &guard;
        Ok(delta_event(&delta))
    })
}

fn delta_event(delta: &HistoryDelta) -> Event {
    let (name, payload) = if delta.initial {
        ("snapshot", serde_json::json!({ "snapshot": delta.snapshot }))
    } else {
        (
            "update",
            serde_json::json!({ "changed": delta.changed, "snapshot": delta.snapshot }),
        )
    };
    Event::default().event(name).data(payload.to_string())
}
