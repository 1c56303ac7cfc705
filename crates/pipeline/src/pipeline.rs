//! The analysis pipeline: validate, build the prompt, call the model, parse,
//! persist. Also the file-upload path and history access.

use std::sync::Arc;

use playcoach_core::{
    build_payload, parse_generation_response, AnalysisRequest, AnalysisResult, InputError, UserId,
};
use playcoach_storage::{GameplayLogRecord, HistorySnapshot, LiveHistory, NewGameplayLog};
use time::OffsetDateTime;

use crate::error::{PipelineError, PipelineErrorKind};
use crate::identity::AuthError;
use crate::services::ServiceBundle;

/// File name used when the supplied one cannot be used as a key segment.
pub const FALLBACK_FILE_NAME: &str = "gameplay.log";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// One uploaded gameplay file.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Where an upload ended up, and the record written for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub file_url: String,
    pub record: GameplayLogRecord,
}

/// Orchestrates one service instance's submissions.
///
/// Cheap to clone. Each call runs as an independent task with no state
/// shared between calls except the stores behind the service bundle.
#[derive(Clone)]
pub struct AnalysisPipeline {
    services: Arc<ServiceBundle>,
}

impl AnalysisPipeline {
    pub fn new(services: Arc<ServiceBundle>) -> Self {
        AnalysisPipeline { services }
    }

    pub fn services(&self) -> &ServiceBundle {
        &self.services
    }

    /// Resolve a bearer credential to its owner.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<UserId, PipelineError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCredential)?;
        self.services
            .identity
            .resolve(credential)
            .await
            .ok_or_else(|| AuthError::InvalidCredential.into())
    }

    /// Analyze free-text gameplay for `owner` and record the result.
    ///
    /// A record is written only once a result (possibly degraded) exists;
    /// any failure before that leaves the store untouched.
    pub async fn submit_gameplay_text(
        &self,
        owner: &UserId,
        raw_text: impl Into<String>,
    ) -> Result<AnalysisResult, PipelineError> {
        let request = AnalysisRequest::new(raw_text, Some(owner.clone()))?;
        let payload = build_payload(&request, &self.services.prompt);

        let body = match self.services.generation.generate(&payload).await {
            Ok(body) => body,
            Err(e) => {
                let err = PipelineError::from(e);
                if err.kind() == PipelineErrorKind::Configuration {
                    tracing::error!(owner = %owner, error = %err, "generation service is not configured");
                } else {
                    tracing::warn!(owner = %owner, error = %err, "generation call failed");
                }
                return Err(err);
            }
        };

        let parsed = parse_generation_response(&body);
        if let Some(reason) = &parsed.malformation {
            tracing::warn!(owner = %owner, reason = %reason, "model output unreadable, storing degraded result");
        }

        let record = self
            .services
            .results
            .append(
                owner,
                NewGameplayLog::analysis(request.raw_text(), parsed.result.clone()),
            )
            .await?;
        tracing::info!(owner = %owner, record = %record.id, degraded = parsed.is_degraded(), "analysis saved");

        Ok(parsed.result)
    }

    /// Store an uploaded file and record its metadata.
    pub async fn upload_gameplay_file(
        &self,
        owner: &UserId,
        upload: FileUpload,
    ) -> Result<UploadReceipt, PipelineError> {
        if upload.bytes.is_empty() {
            return Err(InputError::MissingFile.into());
        }

        let key = format!(
            "{}/{}_{}",
            owner,
            unix_millis(OffsetDateTime::now_utc()),
            sanitize_file_name(&upload.file_name)
        );
        let mime_type = if upload.mime_type.trim().is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            upload.mime_type
        };

        let size = upload.bytes.len();
        self.services
            .objects
            .upload(&key, upload.bytes, &mime_type)
            .await?;
        let file_url = self.services.objects.public_url(&key).await?;

        let record = self
            .services
            .results
            .append(
                owner,
                NewGameplayLog::upload(&file_url, upload.file_name, mime_type),
            )
            .await?;
        tracing::info!(owner = %owner, key = %key, size, record = %record.id, "gameplay file uploaded");

        Ok(UploadReceipt { file_url, record })
    }

    /// Live history view for `owner`. Nothing is opened until subscribed.
    pub fn history(&self, owner: &UserId) -> LiveHistory {
        LiveHistory::new(self.services.results.clone(), owner.clone())
    }

    /// `owner`'s records, newest first.
    pub async fn list_history(&self, owner: &UserId) -> Result<Vec<GameplayLogRecord>, PipelineError> {
        let records = self.services.results.list(owner).await?;
        let mut snapshot = HistorySnapshot::default();
        snapshot.merge(records);
        Ok(snapshot.records().to_vec())
    }
}

/// A file name safe to use as the last segment of an object key.
pub fn sanitize_file_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return FALLBACK_FILE_NAME.to_string();
    }
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unix_millis(at: OffsetDateTime) -> i128 {
    at.unix_timestamp_nanos() / 1_000_000
}
