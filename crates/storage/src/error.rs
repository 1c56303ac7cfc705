/// All errors that can be returned by a result store or object store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure while reading or writing records or objects.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded for the journal.
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A journal line (1-based) could not be decoded on replay.
    #[error("corrupt journal at line {line}: {message}")]
    CorruptJournal { line: usize, message: String },

    /// An object with this key was already uploaded. Uploads never overwrite.
    #[error("object already exists: {key}")]
    ObjectExists { key: String },

    /// The key would escape the bucket or is empty.
    #[error("invalid object key: {key}")]
    InvalidKey { key: String },

    /// No object was uploaded under this key.
    #[error("object not found: {key}")]
    ObjectNotFound { key: String },

    /// A backend-specific storage error (connection, quota, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
