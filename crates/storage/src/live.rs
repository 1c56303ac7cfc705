//! Live history view: an ordered, self-updating snapshot of one viewer's
//! gameplay logs, driven by the result store's change feed.
//!
//! A [`LiveHistory`] is a restartable description of the view. Each call to
//! [`LiveHistory::subscribe`] opens a fresh change feed and returns a
//! [`HistoryStream`] of deltas plus an [`Unsubscribe`] handle. Nothing is
//! buffered across subscriptions: a new one always starts from the full
//! current snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::Stream;
use playcoach_core::UserId;
use tokio::sync::Notify;

use crate::error::StorageError;
use crate::record::GameplayLogRecord;
use crate::traits::{ChangeEvent, ChangeFeed, ResultStore};

/// Records ordered by `created_at`, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    records: Vec<GameplayLogRecord>,
}

impl HistorySnapshot {
    /// Merge records by id, then re-sort the whole snapshot.
    ///
    /// Returns the records that were new or differed from the stored copy.
    pub fn merge(
        &mut self,
        incoming: impl IntoIterator<Item = GameplayLogRecord>,
    ) -> Vec<GameplayLogRecord> {
        let mut changed = Vec::new();
        for record in incoming {
            match self.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) if *existing == record => {}
                Some(existing) => {
                    *existing = record.clone();
                    changed.push(record);
                }
                None => {
                    self.records.push(record.clone());
                    changed.push(record);
                }
            }
        }
        self.records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        changed
    }

    pub fn records(&self) -> &[GameplayLogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One step of a live view.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDelta {
    /// True for the first delta of a subscription.
    pub initial: bool,
    /// Records added or replaced by this step.
    pub changed: Vec<GameplayLogRecord>,
    /// The full snapshot after this step, newest first.
    pub snapshot: Vec<GameplayLogRecord>,
}

/// Restartable description of one viewer's live history.
#[derive(Clone)]
pub struct LiveHistory {
    store: Arc<dyn ResultStore>,
    owner: UserId,
}

impl LiveHistory {
    pub fn new(store: Arc<dyn ResultStore>, owner: UserId) -> Self {
        LiveHistory { store, owner }
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    /// Open a standing subscription scoped to this viewer.
    pub async fn subscribe(&self) -> Result<(HistoryStream, Unsubscribe), StorageError> {
        let feed = self.store.watch(&self.owner).await?;
        let cancel = Arc::new(Cancellation::default());
        tracing::debug!(owner = %self.owner, "history subscription opened");

        let stream = HistoryStream {
            store: self.store.clone(),
            owner: self.owner.clone(),
            feed: Some(feed),
            snapshot: HistorySnapshot::default(),
            started: false,
            cancel: cancel.clone(),
        };
        Ok((stream, Unsubscribe { cancel }))
    }
}

#[derive(Default)]
struct Cancellation {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Explicit teardown handle for a [`HistoryStream`].
///
/// Dropping the handle does not cancel; call [`Unsubscribe::unsubscribe`].
/// Clones share one cancellation.
#[derive(Clone)]
pub struct Unsubscribe {
    cancel: Arc<Cancellation>,
}

impl Unsubscribe {
    /// Cancel the subscription. The stream yields `None` from its next poll
    /// and releases the underlying change feed.
    pub fn unsubscribe(&self) {
        self.cancel.cancelled.store(true, Ordering::Release);
        // notify_one stores a permit if the stream is not currently waiting.
        self.cancel.notify.notify_one();
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.cancel.cancelled.load(Ordering::Acquire)
    }
}

/// A lazy, unbounded sequence of [`HistoryDelta`]s for one subscription.
pub struct HistoryStream {
    store: Arc<dyn ResultStore>,
    owner: UserId,
    feed: Option<ChangeFeed>,
    snapshot: HistorySnapshot,
    started: bool,
    cancel: Arc<Cancellation>,
}

impl HistoryStream {
    /// Wait for the next delta. `None` once unsubscribed or the store closed
    /// the feed.
    pub async fn next(&mut self) -> Option<HistoryDelta> {
        loop {
            if self.cancel.cancelled.load(Ordering::Acquire) {
                self.teardown();
                return None;
            }

            let feed = self.feed.as_mut()?;
            let event = tokio::select! {
                _ = self.cancel.notify.notified() => None,
                event = feed.recv() => Some(event),
            };
            let event = match event {
                Some(Some(event)) => event,
                Some(None) => {
                    self.teardown();
                    return None;
                }
                // Woken by unsubscribe; the flag check above ends the stream.
                None => continue,
            };

            let changed = match event {
                ChangeEvent::Snapshot(records) => self.snapshot.merge(records),
                ChangeEvent::Inserted(record) => self.snapshot.merge([record]),
                ChangeEvent::Lagged(skipped) => {
                    tracing::warn!(
                        owner = %self.owner,
                        skipped,
                        "history feed lagged, resynchronising"
                    );
                    match self.store.list(&self.owner).await {
                        Ok(records) => self.snapshot.merge(records),
                        Err(e) => {
                            tracing::warn!(owner = %self.owner, error = %e, "history resync failed");
                            self.teardown();
                            return None;
                        }
                    }
                }
            };

            let initial = !self.started;
            self.started = true;
            if !initial && changed.is_empty() {
                continue;
            }
            return Some(HistoryDelta {
                initial,
                changed,
                snapshot: self.snapshot.records().to_vec(),
            });
        }
    }

    /// The snapshot as of the last delta returned.
    pub fn snapshot(&self) -> &HistorySnapshot {
        &self.snapshot
    }

    /// Adapt into a [`Stream`], e.g. for server-sent events.
    pub fn into_stream(self) -> impl Stream<Item = HistoryDelta> + Send {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|delta| (delta, stream))
        })
    }

    fn teardown(&mut self) {
        if self.feed.take().is_some() {
            tracing::debug!(owner = %self.owner, "history subscription closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryResultStore, FEED_CAPACITY};
    use crate::record::NewGameplayLog;
    use playcoach_core::AnalysisResult;
    use std::time::Duration;
    use time::macros::datetime;

    fn record(id: &str, at: time::OffsetDateTime) -> GameplayLogRecord {
        NewGameplayLog::analysis(id, AnalysisResult::default()).into_record(
            id.to_string(),
            UserId::new("u1"),
            at,
        )
    }

    fn analysis(text: &str) -> NewGameplayLog {
        NewGameplayLog::analysis(text, AnalysisResult::new(text, vec![], vec![]))
    }

    fn ids(records: &[GameplayLogRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_merge_resorts_regardless_of_arrival_order() {
        let mut snapshot = HistorySnapshot::default();
        snapshot.merge([record("b", datetime!(2025-01-01 10:00 UTC))]);
        snapshot.merge([record("a", datetime!(2025-01-01 09:00 UTC))]);
        snapshot.merge([record("c", datetime!(2025-01-01 11:00 UTC))]);
        assert_eq!(ids(snapshot.records()), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_merge_by_id_is_idempotent() {
        let mut snapshot = HistorySnapshot::default();
        let r = record("a", datetime!(2025-01-01 09:00 UTC));
        assert_eq!(snapshot.merge([r.clone()]).len(), 1);
        assert!(snapshot.merge([r]).is_empty());
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_first_delta_is_full_sorted_snapshot() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let owner = UserId::new("u1");
        let first = store.append(&owner, analysis("first")).await.unwrap();
        let second = store.append(&owner, analysis("second")).await.unwrap();

        let view = LiveHistory::new(store.clone(), owner);
        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();

        let delta = stream.next().await.unwrap();
        assert!(delta.initial);
        assert_eq!(delta.snapshot, vec![second, first]);
    }

    #[tokio::test]
    async fn test_empty_history_still_yields_initial_delta() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let view = LiveHistory::new(store, UserId::new("nobody"));
        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();

        let delta = stream.next().await.unwrap();
        assert!(delta.initial);
        assert!(delta.snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_inserts_are_pushed_and_resorted() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let owner = UserId::new("u1");
        let view = LiveHistory::new(store.clone(), owner.clone());
        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();
        stream.next().await.unwrap();

        let older = store.append(&owner, analysis("older")).await.unwrap();
        let newer = store.append(&owner, analysis("newer")).await.unwrap();

        let delta = stream.next().await.unwrap();
        assert!(!delta.initial);
        assert_eq!(delta.changed, vec![older.clone()]);
        let delta = stream.next().await.unwrap();
        assert_eq!(delta.changed, vec![newer.clone()]);
        assert_eq!(delta.snapshot, vec![newer, older]);
    }

    #[tokio::test]
    async fn test_other_owners_records_are_not_delivered() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let view = LiveHistory::new(store.clone(), alice.clone());
        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();
        stream.next().await.unwrap();

        store.append(&bob, analysis("bob's")).await.unwrap();
        let mine = store.append(&alice, analysis("alice's")).await.unwrap();

        let delta = stream.next().await.unwrap();
        assert_eq!(delta.snapshot, vec![mine]);
    }

    #[tokio::test]
    async fn test_unsubscribe_ends_waiting_stream() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let view = LiveHistory::new(store, UserId::new("u1"));
        let (mut stream, unsubscribe) = view.subscribe().await.unwrap();
        stream.next().await.unwrap();

        let waiter = tokio::spawn(async move { stream.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        unsubscribe.unsubscribe();

        let next = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("stream did not end after unsubscribe")
            .unwrap();
        assert!(next.is_none());
        assert!(unsubscribe.is_unsubscribed());
    }

    #[tokio::test]
    async fn test_unsubscribe_before_poll() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let view = LiveHistory::new(store, UserId::new("u1"));
        let (mut stream, unsubscribe) = view.subscribe().await.unwrap();
        unsubscribe.unsubscribe();
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_resubscribe_starts_from_full_snapshot() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let owner = UserId::new("u1");
        let view = LiveHistory::new(store.clone(), owner.clone());

        let (mut stream, unsubscribe) = view.subscribe().await.unwrap();
        stream.next().await.unwrap();
        unsubscribe.unsubscribe();
        drop(stream);

        let missed = store.append(&owner, analysis("while away")).await.unwrap();

        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();
        let delta = stream.next().await.unwrap();
        assert!(delta.initial);
        assert_eq!(delta.snapshot, vec![missed]);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_end_sorted() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let owner = UserId::new("u1");
        let view = LiveHistory::new(store.clone(), owner.clone());
        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();
        stream.next().await.unwrap();

        let a = {
            let (s, o) = (store.clone(), owner.clone());
            tokio::spawn(async move { s.append(&o, analysis("a")).await })
        };
        let b = {
            let (s, o) = (store.clone(), owner.clone());
            tokio::spawn(async move { s.append(&o, analysis("b")).await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        stream.next().await.unwrap();
        let last = stream.next().await.unwrap();
        let mut expected = vec![a, b];
        expected.sort_by(|x, y| y.created_at.cmp(&x.created_at));
        assert_eq!(last.snapshot, expected);
    }

    #[tokio::test]
    async fn test_into_stream_yields_deltas() {
        use futures_util::StreamExt;

        let store = Arc::new(MemoryResultStore::new("test-app"));
        let owner = UserId::new("u1");
        let view = LiveHistory::new(store.clone(), owner.clone());
        let (stream, unsubscribe) = view.subscribe().await.unwrap();
        let mut stream = Box::pin(stream.into_stream());

        assert!(stream.next().await.unwrap().initial);
        let written = store.append(&owner, analysis("x")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().changed, vec![written]);

        unsubscribe.unsubscribe();
        assert!(stream.next().await.is_none());
    }

    /// Delegates to the in-memory store but cannot list.
    struct ListingUnavailable(MemoryResultStore);

    #[async_trait::async_trait]
    impl ResultStore for ListingUnavailable {
        async fn append(
            &self,
            owner: &UserId,
            log: NewGameplayLog,
        ) -> Result<GameplayLogRecord, StorageError> {
            self.0.append(owner, log).await
        }

        async fn list(&self, _owner: &UserId) -> Result<Vec<GameplayLogRecord>, StorageError> {
            Err(StorageError::Backend("listing unavailable".to_string()))
        }

        async fn watch(&self, owner: &UserId) -> Result<ChangeFeed, StorageError> {
            self.0.watch(owner).await
        }
    }

    #[tokio::test]
    async fn test_lagged_feed_resyncs_from_full_listing() {
        let store = Arc::new(MemoryResultStore::new("test-app"));
        let owner = UserId::new("u1");
        let view = LiveHistory::new(store.clone(), owner.clone());
        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();
        stream.next().await.unwrap();

        let total = FEED_CAPACITY + 44;
        let mut written = Vec::with_capacity(total);
        for i in 0..total {
            written.push(store.append(&owner, analysis(&format!("burst {i}"))).await.unwrap());
        }

        let delta = stream.next().await.unwrap();
        assert!(!delta.initial);
        assert_eq!(delta.changed.len(), total);
        written.reverse();
        assert_eq!(delta.snapshot, written);

        // Inserts still buffered in the feed were already merged.
        let after = store.append(&owner, analysis("after burst")).await.unwrap();
        let delta = stream.next().await.unwrap();
        assert_eq!(delta.changed, vec![after.clone()]);
        assert_eq!(delta.snapshot.len(), total + 1);
        assert_eq!(delta.snapshot[0], after);
    }

    #[tokio::test]
    async fn test_failed_resync_ends_stream() {
        let store = Arc::new(ListingUnavailable(MemoryResultStore::new("test-app")));
        let owner = UserId::new("u1");
        let view = LiveHistory::new(store.clone(), owner.clone());
        let (mut stream, _unsubscribe) = view.subscribe().await.unwrap();
        stream.next().await.unwrap();

        for i in 0..=FEED_CAPACITY {
            store.append(&owner, analysis(&format!("burst {i}"))).await.unwrap();
        }

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }
}
