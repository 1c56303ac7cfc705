use async_trait::async_trait;
use playcoach_core::UserId;
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::record::{GameplayLogRecord, NewGameplayLog};

/// The document store holding every player's gameplay history.
///
/// ## Write semantics
///
/// `append` assigns a unique id and a server timestamp at write time.
/// Timestamps are strictly increasing across all owners of one store, so
/// concurrent writers always get a total order. Once `append` returns `Ok`
/// the record is durable (at-least-once) and is pushed to every open
/// [`ChangeFeed`] for that owner.
///
/// There is no update or delete.
///
/// ## Change feeds
///
/// `watch` opens a standing read scoped to one owner. Its first event is
/// the owner's full current set; every later event is one inserted record.
/// Taking the snapshot and subscribing happen atomically with respect to
/// `append`, so a record is never both in the snapshot and pushed, nor
/// missing from both. Dropping the feed cancels it.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to live in axum state
/// and cross task boundaries.
#[async_trait]
pub trait ResultStore: Send + Sync + 'static {
    /// Append one record under `owner`'s namespace.
    async fn append(
        &self,
        owner: &UserId,
        log: NewGameplayLog,
    ) -> Result<GameplayLogRecord, StorageError>;

    /// All records owned by `owner`, in write order.
    async fn list(&self, owner: &UserId) -> Result<Vec<GameplayLogRecord>, StorageError>;

    /// Open a change feed scoped to `owner`.
    async fn watch(&self, owner: &UserId) -> Result<ChangeFeed, StorageError>;
}

/// Raw-bytes object storage with public retrieval URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store `bytes` under `key`. Fails with `ObjectExists` rather than
    /// overwriting.
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Durable retrieval URL for an uploaded key.
    async fn public_url(&self, key: &str) -> Result<String, StorageError>;
}

/// One event from a [`ChangeFeed`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The owner's full record set at subscription time. Always first.
    Snapshot(Vec<GameplayLogRecord>),
    /// A record appended after the subscription was opened.
    Inserted(GameplayLogRecord),
    /// The subscriber fell behind and this many inserts were dropped.
    /// Consumers must resynchronise with a full listing.
    Lagged(u64),
}

/// A standing subscription to one owner's inserts.
pub struct ChangeFeed {
    initial: Option<Vec<GameplayLogRecord>>,
    receiver: broadcast::Receiver<GameplayLogRecord>,
}

impl ChangeFeed {
    /// Build a feed from a snapshot and a receiver subscribed at the same
    /// instant the snapshot was taken.
    pub fn new(
        initial: Vec<GameplayLogRecord>,
        receiver: broadcast::Receiver<GameplayLogRecord>,
    ) -> Self {
        ChangeFeed {
            initial: Some(initial),
            receiver,
        }
    }

    /// Next event, or `None` once the store has shut the feed down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(ChangeEvent::Snapshot(initial));
        }
        match self.receiver.recv().await {
            Ok(record) => Some(ChangeEvent::Inserted(record)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                Some(ChangeEvent::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
