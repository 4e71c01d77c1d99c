//! Background worker tests

use arrow_schema::DataType;
use rsdb_catalog::{Bucket, Catalog, ColumnInfo, Histogram, InMemoryCatalog, TableInfo};
use rsdb_common::{ColumnId, StatsConfig, TableId};
use rsdb_statistics::{StatsHandle, StatsWorker};
use rsdb_storage::{HistogramKind, InMemoryStatsStorage};
use std::sync::Arc;
use std::time::Duration;

const ORDERS: TableId = TableId(1);

fn setup() -> (Arc<InMemoryCatalog>, Arc<InMemoryStatsStorage>, Arc<StatsHandle>) {
    let _ = tracing_subscriber::fmt::try_init();
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog
        .create_table(TableInfo::new(
            ORDERS.0,
            "orders",
            vec![ColumnInfo::new(1, "id", DataType::Int64)],
        ))
        .unwrap();
    let storage = Arc::new(InMemoryStatsStorage::new());
    let config = StatsConfig {
        lease_ms: 20,
        load_check_interval_ms: 5,
        ..Default::default()
    };
    let handle = Arc::new(StatsHandle::new(config, storage.clone()).unwrap());
    (catalog, storage, handle)
}

/// Poll until `cond` holds, for at most two seconds.
async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_refreshes_and_loads() {
    let (catalog, storage, handle) = setup();
    storage.put_table_meta(ORDERS, 100, 0);
    storage.put_histogram(
        ORDERS,
        HistogramKind::Column,
        1,
        Histogram {
            buckets: vec![Bucket {
                lower: "1".to_string(),
                upper: "100".to_string(),
                count: 100,
                repeats: 1,
            }],
            ndv: 100,
            ..Default::default()
        },
        None,
    );

    let (task, shutdown) = StatsWorker::new(handle.clone(), catalog).spawn();

    assert!(wait_for(|| handle.get(ORDERS).is_some()).await);
    assert_eq!(handle.get(ORDERS).unwrap().count, 100);

    handle.request_histogram(ORDERS, ColumnId(1));
    assert!(
        wait_for(|| {
            handle
                .get(ORDERS)
                .and_then(|t| t.column(ColumnId(1)).map(|c| c.is_loaded()))
                .unwrap_or(false)
        })
        .await
    );
    assert_eq!(handle.pending_histogram_loads(), 0);

    // Deltas recorded by a session reach storage and come back through refresh
    let session = handle.new_session_collector();
    session.update(ORDERS, 10, 10);
    assert!(wait_for(|| handle.get(ORDERS).map(|t| t.count) == Some(110)).await);

    shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_worker_stops_when_sender_dropped() {
    let (catalog, _storage, handle) = setup();
    let (task, shutdown) = StatsWorker::new(handle, catalog).spawn();
    drop(shutdown);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_refresh_once_logs_errors() {
    let (catalog, storage, handle) = setup();
    storage.inject_failure(rsdb_storage::FailPoint::MetaQuery);
    let worker = StatsWorker::new(handle.clone(), catalog);
    // Errors do not escape a cycle
    worker.refresh_once().await;
    assert!(handle.snapshot().is_empty());

    storage.clear_failure(rsdb_storage::FailPoint::MetaQuery);
    storage.put_table_meta(ORDERS, 5, 0);
    worker.refresh_once().await;
    assert_eq!(handle.get(ORDERS).unwrap().count, 5);
}
