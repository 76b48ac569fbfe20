//! End-to-end sync scenarios against scripted connectors.

use lexsync_batch::BatchConfig;
use lexsync_engine::{
    classes, Connectivity, ConnectorError, MockConnector, RetentionPolicy, RetryConfig,
    SyncConfig, SyncOrchestrator, OFFLINE_ID_PREFIX,
};
use lexsync_queue::{QueueConfig, QueueStore, SyncState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn test_config() -> SyncConfig {
    SyncConfig::default()
        .with_reconnect_debounce(Duration::from_millis(200))
        .with_sync_on_start(false)
}

fn offline_orchestrator(config: SyncConfig) -> SyncOrchestrator {
    let queue = QueueStore::in_memory().unwrap();
    SyncOrchestrator::with_connectivity(Arc::new(queue), config, Connectivity::new(false))
}

#[tokio::test(start_paused = true)]
async fn offline_case_is_delivered_after_reconnect() {
    let orchestrator = offline_orchestrator(test_config());
    let connector = Arc::new(MockConnector::new());
    orchestrator.register_connector(classes::LAW_FIRM_CASES, connector.clone());
    orchestrator.start().unwrap();

    let outcome = orchestrator
        .create_with_fallback(classes::LAW_FIRM_CASES, json!({"title": "Estate of Doe"}))
        .await
        .unwrap();
    assert!(outcome.offline);
    assert!(outcome.id.starts_with(OFFLINE_ID_PREFIX));
    assert_eq!(connector.create_calls(), 0);

    let status = orchestrator.get_status().unwrap();
    assert!(!status.online);
    assert_eq!(status.class(classes::LAW_FIRM_CASES).pending, 1);

    orchestrator.set_online(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.create_calls(), 0, "sync must wait for the debounce");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = orchestrator.get_status().unwrap();
    let cases = status.class(classes::LAW_FIRM_CASES);
    assert_eq!(cases.completed, 1);
    assert_eq!(cases.pending, 0);
    assert!(status.last_sync.is_some());
    assert_eq!(connector.created(), vec![json!({"title": "Estate of Doe"})]);

    orchestrator.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn flapping_connectivity_triggers_one_sync() {
    let orchestrator = offline_orchestrator(test_config());
    let connector = Arc::new(MockConnector::new());
    orchestrator.register_connector(classes::CALENDAR_EVENTS, connector.clone());
    orchestrator.start().unwrap();

    orchestrator
        .create_with_fallback(classes::CALENDAR_EVENTS, json!({"title": "Hearing"}))
        .await
        .unwrap();

    orchestrator.set_online(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.set_online(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.set_online(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.create_calls(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(connector.create_calls(), 1);
    assert_eq!(
        orchestrator.get_status().unwrap().class(classes::CALENDAR_EVENTS).completed,
        1
    );

    orchestrator.close().await.unwrap();
}

#[tokio::test]
async fn failed_chunk_only_fails_its_records() {
    let config = test_config().with_batch_config(
        classes::ACCOUNTING_ENTRIES,
        BatchConfig::new(5, Duration::from_secs(3600)),
    );
    let orchestrator = offline_orchestrator(config);
    for n in 0..10 {
        orchestrator
            .create_with_fallback(classes::ACCOUNTING_ENTRIES, json!({"entry": n}))
            .await
            .unwrap();
    }

    let connector = Arc::new(MockConnector::batching());
    connector
        .then_succeed()
        .then_fail(ConnectorError::server(503, "ledger unavailable"));
    orchestrator.register_connector(classes::ACCOUNTING_ENTRIES, connector.clone());
    orchestrator.set_online(true);

    let report = orchestrator.sync_all().await.unwrap();
    assert_eq!(report.synced, 5);
    assert_eq!(report.failed, 5);
    assert_eq!(connector.batch_calls(), 2);

    let entries = orchestrator.get_status().unwrap().class(classes::ACCOUNTING_ENTRIES);
    assert_eq!(entries.completed, 5);
    assert_eq!(entries.failed, 5);

    let failed = orchestrator
        .queue()
        .list_failed(classes::ACCOUNTING_ENTRIES)
        .unwrap();
    let failed_entries: Vec<_> = failed.iter().map(|r| r.payload["entry"].clone()).collect();
    assert_eq!(failed_entries, (5..10).map(|n| json!(n)).collect::<Vec<_>>());
    assert!(failed.iter().all(|r| r.attempts == 1 && r.last_error.is_some()));

    let report = orchestrator.retry_failed().await.unwrap();
    assert_eq!(report.synced, 5);

    let entries = orchestrator.get_status().unwrap().class(classes::ACCOUNTING_ENTRIES);
    assert_eq!(entries.completed, 10);
    assert_eq!(entries.pending, 0);
    assert_eq!(entries.failed, 0);
    assert_eq!(connector.created().len(), 10);
}

#[tokio::test]
async fn records_replay_in_creation_order() {
    let orchestrator = offline_orchestrator(test_config());
    for title in ["t1", "t2", "t3"] {
        orchestrator
            .create_with_fallback(classes::LAW_FIRM_CASES, json!({"title": title}))
            .await
            .unwrap();
    }

    let connector = Arc::new(MockConnector::new());
    orchestrator.register_connector(classes::LAW_FIRM_CASES, connector.clone());
    orchestrator.set_online(true);
    orchestrator.sync_all().await.unwrap();

    assert_eq!(
        connector.created(),
        vec![json!({"title": "t1"}), json!({"title": "t2"}), json!({"title": "t3"})]
    );
}

#[tokio::test]
async fn every_synced_record_matches_one_successful_call() {
    let config = test_config().with_retry(RetryConfig::new(10));
    let orchestrator = offline_orchestrator(config);
    for n in 0..6 {
        orchestrator
            .create_with_fallback(classes::DOCUMENTS, json!({"doc": n}))
            .await
            .unwrap();
    }

    let connector = Arc::new(MockConnector::new());
    for _ in 0..3 {
        connector
            .then_fail(ConnectorError::Network("connection reset".into()))
            .then_succeed();
    }
    orchestrator.register_connector(classes::DOCUMENTS, connector.clone());
    orchestrator.set_online(true);

    for _ in 0..5 {
        orchestrator.sync_all().await.unwrap();
    }

    let synced = orchestrator
        .queue()
        .list_by_state(classes::DOCUMENTS, SyncState::Synced)
        .unwrap();
    assert_eq!(synced.len(), 6);

    let mut delivered: Vec<_> = connector.created().iter().map(|p| p["doc"].clone()).collect();
    let mut expected: Vec<_> = synced.iter().map(|r| r.payload["doc"].clone()).collect();
    delivered.sort_by_key(|v| v.as_i64());
    expected.sort_by_key(|v| v.as_i64());
    assert_eq!(delivered, expected);
}

#[tokio::test(start_paused = true)]
async fn losing_connectivity_aborts_the_pass() {
    let orchestrator = Arc::new(offline_orchestrator(test_config()));
    for n in 0..3 {
        orchestrator
            .create_with_fallback(classes::LAW_FIRM_CASES, json!({"n": n}))
            .await
            .unwrap();
    }

    let connector = Arc::new(MockConnector::new());
    connector.set_delay(Duration::from_millis(100));
    orchestrator.register_connector(classes::LAW_FIRM_CASES, connector.clone());
    orchestrator.set_online(true);

    let pass = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.sync_all().await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    orchestrator.set_online(false);

    let report = pass.await.unwrap().unwrap();
    assert!(report.aborted);
    assert_eq!(report.synced, 2);

    let counts = orchestrator.queue().counts(classes::LAW_FIRM_CASES).unwrap();
    assert_eq!(counts.synced, 2);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.syncing, 0);
}

#[tokio::test(start_paused = true)]
async fn losing_connectivity_aborts_a_batched_pass() {
    let config = test_config().with_batch_config(
        classes::ACCOUNTING_ENTRIES,
        BatchConfig::new(1, Duration::from_millis(50)),
    );
    let orchestrator = Arc::new(offline_orchestrator(config));
    for n in 0..3 {
        orchestrator
            .create_with_fallback(classes::ACCOUNTING_ENTRIES, json!({"amount": n}))
            .await
            .unwrap();
    }

    let connector = Arc::new(MockConnector::batching());
    connector.set_delay(Duration::from_millis(100));
    orchestrator.register_connector(classes::ACCOUNTING_ENTRIES, connector.clone());
    orchestrator.set_online(true);

    let pass = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.sync_all().await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    orchestrator.set_online(false);

    let report = pass.await.unwrap().unwrap();
    assert!(report.aborted);
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(connector.batch_calls(), 2);

    let counts = orchestrator.queue().counts(classes::ACCOUNTING_ENTRIES).unwrap();
    assert_eq!(counts.synced, 2);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.syncing, 0);
    let remaining = orchestrator.queue().list_unsynced(classes::ACCOUNTING_ENTRIES).unwrap();
    assert_eq!(remaining[0].attempts, 0);
    assert_eq!(remaining[0].payload, json!({"amount": 2}));
}

#[tokio::test]
async fn batched_records_replay_in_creation_order() {
    let config = test_config().with_batch_config(
        classes::CALENDAR_EVENTS,
        BatchConfig::new(2, Duration::from_millis(50)),
    );
    let orchestrator = offline_orchestrator(config);
    for title in ["t1", "t2", "t3", "t4", "t5"] {
        orchestrator
            .create_with_fallback(classes::CALENDAR_EVENTS, json!({"title": title}))
            .await
            .unwrap();
    }

    let connector = Arc::new(MockConnector::batching());
    orchestrator.register_connector(classes::CALENDAR_EVENTS, connector.clone());
    orchestrator.set_online(true);
    let report = orchestrator.sync_all().await.unwrap();

    assert_eq!(report.synced, 5);
    assert_eq!(connector.batch_calls(), 3);
    let titles: Vec<_> = connector
        .created()
        .iter()
        .map(|payload| payload["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("t1"), json!("t2"), json!("t3"), json!("t4"), json!("t5")]);
}

#[tokio::test]
async fn concurrent_passes_do_not_double_deliver() {
    let orchestrator = offline_orchestrator(test_config());
    for n in 0..3 {
        orchestrator
            .create_with_fallback(classes::CALENDAR_EVENTS, json!({"n": n}))
            .await
            .unwrap();
    }
    let connector = Arc::new(MockConnector::new());
    connector.set_delay(Duration::from_millis(5));
    orchestrator.register_connector(classes::CALENDAR_EVENTS, connector.clone());
    orchestrator.set_online(true);

    let (first, second) = tokio::join!(orchestrator.sync_all(), orchestrator.sync_all());

    assert_eq!(first.unwrap().synced + second.unwrap().synced, 3);
    assert_eq!(connector.create_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn background_task_retries_with_backoff() {
    let retry = RetryConfig::new(3).with_initial_delay(Duration::from_millis(100));
    let config = SyncConfig::default().with_retry(retry).with_sync_on_start(true);
    let queue = Arc::new(QueueStore::in_memory().unwrap());
    queue
        .save(classes::ACCOUNTING_ENTRIES, "offline_a", json!({"amount": 120}))
        .unwrap();

    let orchestrator = SyncOrchestrator::new(queue, config);
    let connector = Arc::new(MockConnector::new());
    connector.then_fail(ConnectorError::Timeout(Duration::from_secs(10)));
    orchestrator.register_connector(classes::ACCOUNTING_ENTRIES, connector.clone());
    orchestrator.start().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.create_calls(), 1);
    assert_eq!(
        orchestrator.get_status().unwrap().class(classes::ACCOUNTING_ENTRIES).failed,
        1
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.create_calls(), 2);
    let entries = orchestrator.get_status().unwrap().class(classes::ACCOUNTING_ENTRIES);
    assert_eq!(entries.completed, 1);
    assert_eq!(entries.failed, 0);

    orchestrator.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_picks_up_new_records() {
    let config = test_config().with_sync_interval(Duration::from_secs(1));
    let queue = Arc::new(QueueStore::in_memory().unwrap());
    let orchestrator = SyncOrchestrator::new(Arc::clone(&queue), config);
    let connector = Arc::new(MockConnector::new());
    orchestrator.register_connector(classes::DOCUMENTS, connector.clone());
    orchestrator.start().unwrap();

    queue
        .save(classes::DOCUMENTS, "offline_doc", json!({"name": "engagement.pdf"}))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connector.create_calls(), 0);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(connector.create_calls(), 1);

    orchestrator.close().await.unwrap();
}

#[tokio::test]
async fn interrupted_delivery_resumes_after_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pending.log");

    {
        let queue = QueueStore::open_path(&path, QueueConfig::default()).unwrap();
        queue
            .save(classes::LAW_FIRM_CASES, "offline_1", json!({"title": "Roe"}))
            .unwrap();
        queue.mark_syncing(classes::LAW_FIRM_CASES, "offline_1").unwrap();
        // Dropped mid-delivery.
    }

    let orchestrator = SyncOrchestrator::open_path(&path, test_config()).unwrap();
    let record = orchestrator
        .queue()
        .get(classes::LAW_FIRM_CASES, "offline_1")
        .unwrap()
        .unwrap();
    assert_eq!(record.sync_state, SyncState::Pending);

    let connector = Arc::new(MockConnector::new());
    orchestrator.register_connector(classes::LAW_FIRM_CASES, connector.clone());
    assert_eq!(orchestrator.sync_all().await.unwrap().synced, 1);
    orchestrator.close().await.unwrap();
}

#[tokio::test]
async fn compaction_prunes_delivered_records() {
    let config = test_config().with_retention(RetentionPolicy::PruneSynced);
    let orchestrator = offline_orchestrator(config);
    for n in 0..4 {
        orchestrator
            .create_with_fallback(classes::CALENDAR_EVENTS, json!({"n": n}))
            .await
            .unwrap();
    }
    orchestrator
        .create_with_fallback(classes::DOCUMENTS, json!({"name": "unsynced.pdf"}))
        .await
        .unwrap();

    orchestrator.register_connector(classes::CALENDAR_EVENTS, Arc::new(MockConnector::new()));
    orchestrator.set_online(true);
    orchestrator.sync_all().await.unwrap();

    let stats = orchestrator.compact().unwrap();
    assert_eq!(stats.records_pruned, 4);
    assert_eq!(stats.records_kept, 1);
    assert_eq!(orchestrator.queue().len(), 1);
}
