//! In-process document store with per-owner change feeds and an optional
//! append-only JSON-lines journal for durability.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use playcoach_core::UserId;
use time::{Duration, OffsetDateTime};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};

use crate::error::StorageError;
use crate::record::{record_path, GameplayLogRecord, NewGameplayLog};
use crate::traits::{ChangeFeed, ResultStore};

/// Buffered inserts per owner channel before a slow subscriber lags.
pub(crate) const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    records: HashMap<UserId, Vec<GameplayLogRecord>>,
    feeds: HashMap<UserId, broadcast::Sender<GameplayLogRecord>>,
    last_created_at: Option<OffsetDateTime>,
    journal: Option<File>,
    /// A failed write could not be rolled back; appends are refused.
    journal_broken: bool,
    /// Cut the next journal write after this many bytes and fail it.
    #[cfg(test)]
    short_write: Option<usize>,
}

impl State {
    /// Wall-clock time, bumped past the previous stamp if the clock has not
    /// advanced, so timestamps are strictly increasing.
    fn next_timestamp(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let stamp = match self.last_created_at {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.last_created_at = Some(stamp);
        stamp
    }

    fn insert(&mut self, record: GameplayLogRecord) {
        if self
            .last_created_at
            .map_or(true, |last| record.created_at > last)
        {
            self.last_created_at = Some(record.created_at);
        }
        self.records
            .entry(record.owner_id.clone())
            .or_default()
            .push(record);
    }
}

/// A [`ResultStore`] kept in memory, optionally journaled to disk.
///
/// All writes are serialized through one lock, which is what makes the
/// timestamp order, journal order and feed order agree.
pub struct MemoryResultStore {
    namespace: String,
    journal_path: Option<PathBuf>,
    state: Mutex<State>,
}

impl MemoryResultStore {
    /// A volatile store. Records are lost when it is dropped.
    pub fn new(namespace: impl Into<String>) -> Self {
        MemoryResultStore {
            namespace: namespace.into(),
            journal_path: None,
            state: Mutex::new(State::default()),
        }
    }

    /// A durable store backed by the journal at `path`.
    ///
    /// Existing records are replayed. A final line that does not decode is
    /// treated as a torn write and skipped; a bad line anywhere else is
    /// reported as [`StorageError::CorruptJournal`].
    pub async fn open(
        namespace: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut state = State::default();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let lines: Vec<&str> = contents.split_inclusive('\n').collect();
                let mut valid_len = 0;
                for (idx, raw) in lines.iter().enumerate() {
                    let line = raw.trim_end();
                    if line.is_empty() {
                        valid_len += raw.len();
                        continue;
                    }
                    match serde_json::from_str::<GameplayLogRecord>(line) {
                        Ok(record) => {
                            state.insert(record);
                            valid_len += raw.len();
                        }
                        Err(e) if idx + 1 == lines.len() => {
                            tracing::warn!(
                                journal = %path.display(),
                                error = %e,
                                "skipping torn final journal line"
                            );
                        }
                        Err(e) => {
                            return Err(StorageError::CorruptJournal {
                                line: idx + 1,
                                message: e.to_string(),
                            })
                        }
                    }
                }

                // Later appends must start on a fresh line.
                let mut repaired = contents[..valid_len].to_string();
                if !repaired.is_empty() && !repaired.ends_with('\n') {
                    repaired.push('\n');
                }
                if repaired != contents {
                    tokio::fs::write(&path, repaired).await?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let replayed: usize = state.records.values().map(Vec::len).sum();
        tracing::info!(journal = %path.display(), records = replayed, "opened record journal");

        state.journal = Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?,
        );

        Ok(MemoryResultStore {
            namespace: namespace.into(),
            journal_path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal_path.as_deref()
    }

    #[cfg(test)]
    async fn fail_next_write_after(&self, bytes: usize) {
        self.state.lock().await.short_write = Some(bytes);
    }
}

/// Write one journal line and sync it to disk.
async fn write_line(journal: &mut File, line: &[u8], short_write: Option<usize>) -> io::Result<()> {
    if let Some(limit) = short_write {
        journal.write_all(&line[..limit.min(line.len())]).await?;
        journal.flush().await?;
        return Err(io::Error::new(io::ErrorKind::WriteZero, "short journal write"));
    }
    journal.write_all(line).await?;
    journal.sync_data().await
}

/// Cut the journal back to `len` bytes, dropping a partially written line.
async fn roll_back(journal: &mut File, len: u64) -> io::Result<()> {
    journal.set_len(len).await?;
    journal.sync_data().await
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn append(
        &self,
        owner: &UserId,
        log: NewGameplayLog,
    ) -> Result<GameplayLogRecord, StorageError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.journal_broken {
            return Err(StorageError::Backend(
                "record journal is unusable after a failed write".to_string(),
            ));
        }

        let created_at = state.next_timestamp();
        let record = log.into_record(uuid::Uuid::new_v4().to_string(), owner.clone(), created_at);

        #[cfg(test)]
        let short_write = state.short_write.take();
        #[cfg(not(test))]
        let short_write = None;

        if let Some(journal) = state.journal.as_mut() {
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            let start = journal.metadata().await?.len();
            if let Err(e) = write_line(journal, &line, short_write).await {
                if let Err(rollback) = roll_back(journal, start).await {
                    tracing::error!(
                        error = %rollback,
                        "journal rollback failed; refusing further appends"
                    );
                    state.journal_broken = true;
                }
                return Err(e.into());
            }
        }

        state.insert(record.clone());
        let unwatched = match state.feeds.get(owner) {
            Some(feed) => feed.send(record.clone()).is_err(),
            None => false,
        };
        if unwatched {
            // Every receiver for this owner has been dropped.
            state.feeds.remove(owner);
        }

        tracing::debug!(
            path = %record_path(&self.namespace, owner, &record.id),
            "appended gameplay log"
        );
        Ok(record)
    }

    async fn list(&self, owner: &UserId) -> Result<Vec<GameplayLogRecord>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.records.get(owner).cloned().unwrap_or_default())
    }

    async fn watch(&self, owner: &UserId) -> Result<ChangeFeed, StorageError> {
        let mut state = self.state.lock().await;

        let receiver = state
            .feeds
            .entry(owner.clone())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe();
        let snapshot = state.records.get(owner).cloned().unwrap_or_default();

        Ok(ChangeFeed::new(snapshot, receiver))
    }
}
