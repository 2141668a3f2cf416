//! End-to-end sync runs against a scripted remote and the JSON store.

use async_trait::async_trait;
use batch_ingest::client::RetryPolicy;
use batch_ingest::controller::{RunOptions, SyncController};
use batch_ingest::dataset::{DatasetDescriptor, Partitioning};
use batch_ingest::limiter::RateLimitPolicy;
use batch_ingest::processor::transform::TransformRules;
use batch_ingest::remote::{FetchPage, Params, RemoteSource, SourceResult};
use batch_ingest::shutdown::ShutdownCoordinator;
use batch_ingest::store::json::JsonStore;
use batch_ingest::store::memory::MemoryStore;
use batch_ingest::store::WatermarkStore;
use batch_ingest::{Row, RunState, SyncMode};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
}

fn dataset() -> DatasetDescriptor {
    DatasetDescriptor {
        name: "daily_bars".into(),
        endpoint: "daily".into(),
        table: "daily_bars".into(),
        fields: vec!["code".into(), "trade_date".into(), "close".into()],
        primary_key: vec!["code".into(), "trade_date".into()],
        mode: SyncMode::Smart,
        earliest: date("20240101"),
        safety_lookback_days: 5,
        rate_limit: RateLimitPolicy {
            calls_per_period: 10_000,
            ..Default::default()
        },
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5,
            persist_attempts: 2,
        },
        partitioning: Partitioning::default(),
        transform: TransformRules::default(),
        validation: vec![],
    }
}

fn row(code: &str, trade_date: &str, close: f64) -> Row {
    let mut r = Row::new();
    r.insert("code".into(), json!(code));
    r.insert("trade_date".into(), json!(trade_date));
    r.insert("close".into(), json!(close));
    r
}

/// One row per batch, keyed by the batch's start date.
struct OneRowPerBatch;

#[async_trait]
impl RemoteSource for OneRowPerBatch {
    async fn call(&self, _endpoint: &str, params: &Params) -> SourceResult<FetchPage> {
        let start = params.get("start_date").cloned().unwrap_or_default();
        Ok(FetchPage::last(vec![row("000001", &start, 10.5)]))
    }
}

/// Serves the same three rows split across two cursor pages.
struct PagedRemote;

#[async_trait]
impl RemoteSource for PagedRemote {
    async fn call(&self, _endpoint: &str, params: &Params) -> SourceResult<FetchPage> {
        match params.get("page_token").map(String::as_str) {
            None => Ok(FetchPage {
                rows: vec![
                    row("000001", "2024-01-02", 10.5),
                    row("000002", "2024-01-02", 8.2),
                ],
                has_more: true,
                next_cursor: Some("p2".into()),
            }),
            Some("p2") => Ok(FetchPage::last(vec![row("000003", "2024-01-02", 3.3)])),
            Some(other) => panic!("unexpected page token {other}"),
        }
    }
}

#[tokio::test]
async fn test_incremental_run_persists_and_advances_watermark() {
    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::new(
        Arc::new(OneRowPerBatch),
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

    // Three months, one monthly batch each, one row per batch.
    assert_eq!(result.state, RunState::Completed);
    assert_eq!(result.total_batches, 3);
    assert_eq!(result.rows_affected, 3);
    assert_eq!(store.table_len("daily_bars"), 3);
    assert_eq!(
        store.get_latest_key("daily_bars").await.unwrap(),
        Some(date("20240331"))
    );
}

#[tokio::test]
async fn test_pagination_is_transparent_to_the_run() {
    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::new(
        Arc::new(PagedRemote),
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
                end: Some(date("20240115")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // A single batch, but both pages land in one upsert.
    assert_eq!(result.total_batches, 1);
    assert_eq!(result.rows_affected, 3);
    assert_eq!(store.table_len("daily_bars"), 3);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::new(
        Arc::new(OneRowPerBatch),
        store.clone(),
        store.clone(),
        ShutdownCoordinator::shared(),
    );
    let options = RunOptions {
        mode: Some(SyncMode::Incremental),
        start: Some(date("20240101")),
        end: Some(date("20240131")),
        ..Default::default()
    };

    controller.sync(&dataset(), options.clone()).await.unwrap();
    let second = controller.sync(&dataset(), options).await.unwrap();

    assert_eq!(second.state, RunState::Completed);
    // Same primary keys, so the row count does not grow.
    assert_eq!(store.table_len("daily_bars"), 1);
}

#[tokio::test]
async fn test_json_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(JsonStore::open(dir.path()).unwrap());
        let controller = SyncController::new(
            Arc::new(OneRowPerBatch),
            store.clone(),
            store,
            ShutdownCoordinator::shared(),
        );
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
    }

    // A fresh handle over the same directory sees the watermark.
    let reopened = JsonStore::open(dir.path()).unwrap();
    assert_eq!(
        reopened.get_latest_key("daily_bars").await.unwrap(),
        Some(date("20240131"))
    );
}

#[tokio::test]
async fn test_transform_and_validation_in_the_full_pipeline() {
    use batch_ingest::processor::validate::ValidationRule;

    /// Raw upstream shape: short names, stringly-typed numbers, one junk row.
    struct RawRemote;

    #[async_trait]
    impl RemoteSource for RawRemote {
        async fn call(&self, _endpoint: &str, _params: &Params) -> SourceResult<FetchPage> {
            let mut good = Row::new();
            good.insert("ts_code".into(), json!("000001"));
            good.insert("trade_date".into(), json!("20240102"));
            good.insert("close".into(), json!("10.50"));
            let mut bad = Row::new();
            bad.insert("ts_code".into(), json!("000002"));
            bad.insert("trade_date".into(), json!("20240102"));
            bad.insert("close".into(), json!("-1.0"));
            Ok(FetchPage::last(vec![good, bad]))
        }
    }

    let mut dataset = dataset();
    dataset.transform = TransformRules {
        renames: [("ts_code".to_string(), "code".to_string())].into(),
        numeric_columns: vec!["close".into()],
        date_columns: vec!["trade_date".into()],
    };
    dataset.validation = vec![ValidationRule::Positive {
        column: "close".into(),
    }];

    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::new(
        Arc::new(RawRemote),
        store.clone(),
        store.clone(),
        ShutdownCoordinator::shared(),
    );
    let result = controller
        .sync(
            &dataset,
            RunOptions {
                mode: Some(SyncMode::Incremental),
                start: Some(date("20240101")),
                end: Some(date("20240115")),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.state, RunState::Completed);
    assert_eq!(result.rows_affected, 1);
    assert_eq!(result.rows_dropped, 1);

    let rows = store.rows("daily_bars");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["code"], json!("000001"));
    assert_eq!(rows[0]["close"], json!(10.5));
    assert_eq!(rows[0]["trade_date"], json!("2024-01-02"));
}
