//! Cooperative cancellation during a run.

use async_trait::async_trait;
use batch_ingest::client::RetryPolicy;
use batch_ingest::controller::{RunOptions, SyncController};
use batch_ingest::dataset::{DatasetDescriptor, Partitioning};
use batch_ingest::limiter::RateLimitPolicy;
use batch_ingest::remote::{FetchPage, Params, RemoteSource, SourceResult};
use batch_ingest::shutdown::{SharedShutdown, ShutdownCoordinator};
use batch_ingest::store::memory::MemoryStore;
use batch_ingest::{Row, RunState, SyncMode};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
}

fn dataset() -> DatasetDescriptor {
    DatasetDescriptor {
        name: "daily_bars".into(),
        endpoint: "daily".into(),
        table: "daily_bars".into(),
        fields: vec![],
        primary_key: vec!["code".into(), "trade_date".into()],
        mode: SyncMode::Smart,
        earliest: date("20240101"),
        safety_lookback_days: 5,
        rate_limit: RateLimitPolicy {
            calls_per_period: 10_000,
            ..Default::default()
        },
        retry: RetryPolicy {
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5,
            persist_attempts: 1,
        },
        partitioning: Partitioning::default(),
        transform: Default::default(),
        validation: vec![],
    }
}

fn row(code: &str, trade_date: &str) -> Row {
    let mut r = Row::new();
    r.insert("code".into(), json!(code));
    r.insert("trade_date".into(), json!(trade_date));
    r
}

/// Requests shutdown after serving `trigger_after` calls.
struct ShutdownAfter {
    shutdown: SharedShutdown,
    trigger_after: u32,
    calls: AtomicU32,
}

#[async_trait]
impl RemoteSource for ShutdownAfter {
    async fn call(&self, _endpoint: &str, params: &Params) -> SourceResult<FetchPage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.trigger_after {
            self.shutdown.request_shutdown();
        }
        let start = params.get("start_date").cloned().unwrap_or_default();
        Ok(FetchPage::last(vec![row("000001", &start)]))
    }
}

#[tokio::test]
async fn test_shutdown_skips_unstarted_batches() {
    let shutdown = ShutdownCoordinator::shared();
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(ShutdownAfter {
        shutdown: shutdown.clone(),
        trigger_after: 2,
        calls: AtomicU32::new(0),
    });
    let controller = SyncController::new(remote, store.clone(), store.clone(), shutdown);

    // Three monthly batches, sequential workers, shutdown after the second.
    let result = controller
        .sync(
            &dataset(),
            RunOptions {
                mode: Some(SyncMode::Incremental),
                start: Some(date("20240101")),
                end: Some(date("20240331")),
                concurrency: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Batches already in flight finish; the rest are skipped, not failed.
    assert_eq!(result.state, RunState::PartiallyFailed);
    assert_eq!(result.successful_batches, 2);
    assert_eq!(result.failed_batches, 0);
    assert_eq!(result.skipped_batches, 1);
    assert_eq!(store.table_len("daily_bars"), 2);
}

#[tokio::test]
async fn test_watermark_reflects_persisted_prefix_after_shutdown() {
    use batch_ingest::store::WatermarkStore;

    let shutdown = ShutdownCoordinator::shared();
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(ShutdownAfter {
        shutdown: shutdown.clone(),
        trigger_after: 2,
        calls: AtomicU32::new(0),
    });
    let controller = SyncController::new(remote, store.clone(), store.clone(), shutdown);

    controller
        .sync(
            &dataset(),
            RunOptions {
                mode: Some(SyncMode::Incremental),
                start: Some(date("20240101")),
                end: Some(date("20240331")),
                concurrency: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // January and February were persisted before the shutdown landed.
    assert_eq!(
        store.get_latest_key("daily_bars").await.unwrap(),
        Some(date("20240229"))
    );
}

#[tokio::test]
async fn test_shutdown_before_run_skips_everything() {
    /// Should never be called once shutdown is already requested.
    struct Untouchable;

    #[async_trait]
    impl RemoteSource for Untouchable {
        async fn call(&self, _endpoint: &str, _params: &Params) -> SourceResult<FetchPage> {
            panic!("remote called after shutdown");
        }
    }

    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let store = Arc::new(MemoryStore::new());
    let controller =
        SyncController::new(Arc::new(Untouchable), store.clone(), store, shutdown);

    let result = controller
        .sync(
            &dataset(),
            RunOptions {
                mode: Some(SyncMode::Incremental),
                start: Some(date("20240101")),
                end: Some(date("20240331")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.successful_batches, 0);
    assert_eq!(result.skipped_batches, result.total_batches);
}
