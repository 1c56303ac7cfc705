use playcoach_core::{AnalysisResult, UserId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One entry in a player's gameplay history.
///
/// Text-analysis records carry `source_text` and `result`; file-upload
/// records carry the `source_file_*` fields and usually no `result`.
/// Never updated after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameplayLogRecord {
    pub id: String,
    pub owner_id: UserId,
    /// Server-assigned; strictly increasing per store.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
}

/// The caller-supplied part of a record. Id, owner and timestamp are
/// assigned by the store at write time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewGameplayLog {
    pub source_text: Option<String>,
    pub source_file_url: Option<String>,
    pub source_file_name: Option<String>,
    pub source_file_mime_type: Option<String>,
    pub result: Option<AnalysisResult>,
}

impl NewGameplayLog {
    /// A completed text analysis.
    pub fn analysis(source_text: impl Into<String>, result: AnalysisResult) -> Self {
        NewGameplayLog {
            source_text: Some(source_text.into()),
            result: Some(result),
            ..Default::default()
        }
    }

    /// An uploaded gameplay file, not yet analyzed.
    pub fn upload(
        file_url: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        NewGameplayLog {
            source_file_url: Some(file_url.into()),
            source_file_name: Some(file_name.into()),
            source_file_mime_type: Some(mime_type.into()),
            ..Default::default()
        }
    }

    /// Stamp with store-assigned identity.
    pub fn into_record(
        self,
        id: String,
        owner_id: UserId,
        created_at: OffsetDateTime,
    ) -> GameplayLogRecord {
        GameplayLogRecord {
            id,
            owner_id,
            created_at,
            source_text: self.source_text,
            source_file_url: self.source_file_url,
            source_file_name: self.source_file_name,
            source_file_mime_type: self.source_file_mime_type,
            result: self.result,
        }
    }
}

/// Document path of a record inside the store's namespace.
pub fn record_path(namespace: &str, owner: &UserId, id: &str) -> String {
    format!("artifacts/{}/users/{}/gameplay_logs/{}", namespace, owner, id)
}
