//! Conformance test suite for `ResultStore` implementations.
//!
//! Any backend can run this suite to check the guarantees the rest of the
//! system relies on:
//!
//! - **Append**: unique ids, strictly increasing timestamps, round-trip fidelity
//! - **Owner isolation**: listings and feeds never cross owners
//! - **Watch**: snapshot first, then every insert exactly once
//! - **Concurrency**: racing writers all land and stay totally ordered
//!
//! # Usage
//!
//! ```ignore
//! use playcoach_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryResultStore::new("test") }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod append;
mod concurrent;
mod watch;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use playcoach_core::AnalysisResult;

use crate::record::NewGameplayLog;
use crate::traits::{ChangeEvent, ChangeFeed};
use crate::ResultStore;

/// How long a feed may stay silent before a test gives up on an event.
const FEED_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "append", "watch").
    pub category: String,
    /// Test name (e.g. "append_assigns_unique_ids").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a result store.
///
/// `factory` is called once per test and must return a fresh, empty store.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ResultStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(append::run_append_tests(&factory).await);
    results.extend(watch::run_watch_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_analysis(text: &str) -> NewGameplayLog {
    NewGameplayLog::analysis(
        text,
        AnalysisResult::new(
            format!("analysis of {text}"),
            vec!["Hold the angle".to_string()],
            vec!["Overextended".to_string()],
        ),
    )
}

/// Next feed event, failing if none arrives within [`FEED_TIMEOUT`].
async fn recv_event(feed: &mut ChangeFeed) -> Result<ChangeEvent, String> {
    match tokio::time::timeout(FEED_TIMEOUT, feed.recv()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err("feed closed unexpectedly".to_string()),
        Err(_) => Err("timed out waiting for feed event".to_string()),
    }
}

/// Succeeds if the feed stays silent for a short while.
async fn expect_silence(feed: &mut ChangeFeed) -> Result<(), String> {
    match tokio::time::timeout(Duration::from_millis(100), feed.recv()).await {
        Err(_) => Ok(()),
        Ok(event) => Err(format!("expected no event, got {event:?}")),
    }
}
