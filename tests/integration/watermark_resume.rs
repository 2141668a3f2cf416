//! Watermark advancement across failing and recovering runs.

use async_trait::async_trait;
use batch_ingest::client::RetryPolicy;
use batch_ingest::controller::{RunOptions, SyncController};
use batch_ingest::dataset::{DatasetDescriptor, Partitioning};
use batch_ingest::limiter::RateLimitPolicy;
use batch_ingest::remote::{FetchPage, Params, RemoteSource, SourceError, SourceResult};
use batch_ingest::shutdown::ShutdownCoordinator;
use batch_ingest::store::memory::MemoryStore;
use batch_ingest::store::WatermarkStore;
use batch_ingest::{Row, RunState, SyncMode};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
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

/// February fails while `broken` is set; everything else succeeds.
struct FebruaryOutage {
    broken: AtomicBool,
}

#[async_trait]
impl RemoteSource for FebruaryOutage {
    async fn call(&self, _endpoint: &str, params: &Params) -> SourceResult<FetchPage> {
        let start = params.get("start_date").cloned().unwrap_or_default();
        if start.starts_with("202402") && self.broken.load(Ordering::SeqCst) {
            return Err(SourceError::Server("upstream 500".into()));
        }
        Ok(FetchPage::last(vec![row("000001", &start)]))
    }
}

#[tokio::test]
async fn test_failed_middle_batch_then_recovery_run() {
    let remote = Arc::new(FebruaryOutage {
        broken: AtomicBool::new(true),
    });
    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::new(
        remote.clone(),
        store.clone(),
        store.clone(),
        ShutdownCoordinator::shared(),
    );
    let window = RunOptions {
        mode: Some(SyncMode::Incremental),
        start: Some(date("20240101")),
        end: Some(date("20240331")),
        concurrency: Some(1),
        ..Default::default()
    };

    // First run: January persists, February fails, March persists past the
    // gap. The watermark must stop at end of January.
    let first = controller.sync(&dataset(), window.clone()).await.unwrap();
    assert_eq!(first.state, RunState::PartiallyFailed);
    assert_eq!(first.failed_batches, 1);
    assert_eq!(
        store.get_latest_key("daily_bars").await.unwrap(),
        Some(date("20240131"))
    );

    // Second run over the same window with the outage resolved.
    remote.broken.store(false, Ordering::SeqCst);
    let second = controller.sync(&dataset(), window).await.unwrap();
    assert_eq!(second.state, RunState::Completed);
    assert_eq!(
        store.get_latest_key("daily_bars").await.unwrap(),
        Some(date("20240331"))
    );
    assert_eq!(store.table_len("daily_bars"), 3);
}

#[tokio::test]
async fn test_watermark_never_regresses() {
    let store = Arc::new(MemoryStore::new());
    store
        .set_latest_key("daily_bars", date("20240630"))
        .await
        .unwrap();

    let remote = Arc::new(FebruaryOutage {
        broken: AtomicBool::new(false),
    });
    let controller = SyncController::new(
        remote,
        store.clone(),
        store.clone(),
        ShutdownCoordinator::shared(),
    );

    // An explicit backfill of an older window completes, but its end sits
    // before the stored watermark.
    let result = controller
        .sync(
            &dataset(),
            RunOptions {
                mode: Some(SyncMode::Incremental),
                start: Some(date("20240101")),
                end: Some(date("20240131")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.state, RunState::Completed);
    assert_eq!(
        store.get_latest_key("daily_bars").await.unwrap(),
        Some(date("20240630"))
    );
}

#[tokio::test]
async fn test_all_batches_failing_leaves_watermark_unset() {
    /// Every call fails.
    struct Down;

    #[async_trait]
    impl RemoteSource for Down {
        async fn call(&self, _endpoint: &str, _params: &Params) -> SourceResult<FetchPage> {
            Err(SourceError::Connection("refused".into()))
        }
    }

    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::new(
        Arc::new(Down),
        store.clone(),
        store.clone(),
        ShutdownCoordinator::shared(),
    );

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

    assert_eq!(result.state, RunState::PartiallyFailed);
    assert_eq!(result.failed_batches, 3);
    assert_eq!(store.get_latest_key("daily_bars").await.unwrap(), None);
}
