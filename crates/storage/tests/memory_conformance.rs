use playcoach_storage::conformance::run_conformance_suite;
use playcoach_storage::MemoryResultStore;

#[tokio::test]
async fn volatile_store_conformance() {
    let report = run_conformance_suite(|| async { MemoryResultStore::new("conformance") }).await;
    assert!(report.total > 0);
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn journaled_store_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let counter = std::sync::atomic::AtomicUsize::new(0);

    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let path = dir.path().join(format!("store-{n}.jsonl"));
        async move {
            MemoryResultStore::open("conformance", path)
                .await
                .expect("open journal")
        }
    })
    .await;
    assert_eq!(report.failed, 0, "{report}");
}
