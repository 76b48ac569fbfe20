//! The sync orchestrator: create-with-fallback, sync passes and the
//! background task that triggers them.

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::connector::Connector;
use crate::error::{ConnectorError, ConnectorResult, EngineError, EngineResult};
use crate::status::{ClassStatus, SyncReport, SyncStatus};
use lexsync_batch::{BatchError, BatchProcessor};
use lexsync_cache::CacheLayer;
use lexsync_queue::{
    now_millis, CompactionStats, PendingRecord, QueueConfig, QueueError, QueueStore, SyncState,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Prefix of the surrogate ids given to records queued offline.
pub const OFFLINE_ID_PREFIX: &str = "offline_";

type Batcher = BatchProcessor<Value, ConnectorResult<String>>;

/// Result of [`SyncOrchestrator::create_with_fallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOutcome {
    /// Remote id, or an `offline_` surrogate when the record was queued.
    pub id: String,
    /// True if the record was queued instead of created remotely.
    pub offline: bool,
}

/// Coordinates connectors, the durable queue and the listing cache.
///
/// Lifecycle: construct, [`register_connector`](Self::register_connector)
/// for each entity class, [`start`](Self::start) the background task, and
/// [`close`](Self::close) on shutdown. The orchestrator owns the queue's
/// lifecycle and closes it.
pub struct SyncOrchestrator {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Shared {
    config: SyncConfig,
    queue: Arc<QueueStore>,
    cache: CacheLayer,
    connectivity: Connectivity,
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
    batchers: Mutex<HashMap<String, Arc<Batcher>>>,
    completed: Mutex<HashMap<String, usize>>,
    last_sync: Mutex<Option<u64>>,
    /// Held for the duration of a pass; passes never overlap.
    pass: tokio::sync::Mutex<()>,
    syncing: AtomicBool,
    closed: AtomicBool,
}

impl SyncOrchestrator {
    /// Creates an orchestrator that starts out online.
    pub fn new(queue: Arc<QueueStore>, config: SyncConfig) -> Self {
        Self::with_connectivity(queue, config, Connectivity::default())
    }

    /// Creates an orchestrator driven by an existing connectivity flag.
    pub fn with_connectivity(
        queue: Arc<QueueStore>,
        config: SyncConfig,
        connectivity: Connectivity,
    ) -> Self {
        let shared = Shared {
            cache: CacheLayer::new(),
            queue,
            connectivity,
            connectors: RwLock::new(HashMap::new()),
            batchers: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
            last_sync: Mutex::new(None),
            pass: tokio::sync::Mutex::new(()),
            syncing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            config,
        };
        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    /// Opens the queue file at `path` and creates an orchestrator over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be opened.
    pub fn open_path(path: &Path, config: SyncConfig) -> EngineResult<Self> {
        let queue = QueueStore::open_path(path, QueueConfig::default())?;
        Ok(Self::new(Arc::new(queue), config))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Returns the durable queue.
    pub fn queue(&self) -> &Arc<QueueStore> {
        &self.shared.queue
    }

    /// Returns the listing cache.
    pub fn cache(&self) -> &CacheLayer {
        &self.shared.cache
    }

    /// Returns the connectivity flag.
    pub fn connectivity(&self) -> &Connectivity {
        &self.shared.connectivity
    }

    /// Returns true if the device is online.
    pub fn is_online(&self) -> bool {
        self.shared.connectivity.is_online()
    }

    /// Updates connectivity. Going online schedules a debounced sync once
    /// the background task runs.
    pub fn set_online(&self, online: bool) {
        self.shared.connectivity.set_online(online);
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Registers the connector for an entity class, replacing and returning
    /// any previous one.
    pub fn register_connector(
        &self,
        entity_class: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Option<Arc<dyn Connector>> {
        let entity_class = entity_class.into();
        // A batcher captures its connector; the next pass builds a new one.
        self.shared.batchers.lock().remove(&entity_class);
        debug!(entity_class, batch = connector.supports_batch(), "connector registered");
        self.shared.connectors.write().insert(entity_class, connector)
    }

    /// Creates an entity remotely, or queues it when that is not possible.
    ///
    /// The remote call is attempted only when online and a connector is
    /// registered. Any connector failure, including timeouts and rejected
    /// payloads, falls back to the queue and yields an `offline_` id.
    ///
    /// # Errors
    ///
    /// Only when the record cannot be queued durably, or after `close`.
    pub async fn create_with_fallback(
        &self,
        entity_class: &str,
        payload: Value,
    ) -> EngineResult<CreateOutcome> {
        let shared = &self.shared;
        shared.ensure_open()?;

        if shared.connectivity.is_online() {
            if let Some(connector) = shared.connector(entity_class) {
                match bounded(shared.config.connector_timeout, connector.create(&payload)).await {
                    Ok(id) => {
                        shared.cache.delete(&listing_key(entity_class));
                        debug!(entity_class, id, "created remotely");
                        return Ok(CreateOutcome { id, offline: false });
                    }
                    Err(error) => {
                        warn!(entity_class, %error, "remote create failed, queueing for sync");
                    }
                }
            }
        }

        let id = format!("{OFFLINE_ID_PREFIX}{}", Uuid::new_v4().simple());
        shared.queue.save(entity_class, &id, payload)?;
        info!(entity_class, id, "record queued for sync");
        Ok(CreateOutcome { id, offline: true })
    }

    /// Replays every queued record against its connector.
    ///
    /// Returns immediately with a skipped report when offline. Concurrent
    /// calls run one after the other.
    ///
    /// # Errors
    ///
    /// Returns queue errors; connector failures are recorded on the records
    /// and reported in the [`SyncReport`].
    pub async fn sync_all(&self) -> EngineResult<SyncReport> {
        self.shared.sync_all().await
    }

    /// Runs a sync pass now. Same as [`sync_all`](Self::sync_all).
    ///
    /// # Errors
    ///
    /// See [`sync_all`](Self::sync_all).
    pub async fn sync_now(&self) -> EngineResult<SyncReport> {
        self.shared.sync_all().await
    }

    /// Gives every failed record, permanent failures included, a fresh
    /// retry budget and runs a pass.
    ///
    /// # Errors
    ///
    /// See [`sync_all`](Self::sync_all).
    pub async fn retry_failed(&self) -> EngineResult<SyncReport> {
        let shared = &self.shared;
        shared.ensure_open()?;
        let mut requeued = 0;
        for entity_class in shared.queue.entity_classes()? {
            requeued += shared.queue.requeue_failed(&entity_class)?;
        }
        info!(requeued, "retrying failed records");
        shared.sync_all().await
    }

    /// Returns per-class counters and connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after `close`.
    pub fn get_status(&self) -> EngineResult<SyncStatus> {
        let shared = &self.shared;
        let mut names: BTreeSet<String> = shared.queue.entity_classes()?.into_iter().collect();
        names.extend(shared.connectors.read().keys().cloned());
        let completed = shared.completed.lock().clone();

        let mut classes = BTreeMap::new();
        for name in names {
            let counts = shared.queue.counts(&name)?;
            let completed = completed.get(&name).copied().unwrap_or(0);
            let failed = counts.failed + counts.failed_permanent;
            let status = ClassStatus {
                total: counts.pending + counts.syncing + failed + completed,
                pending: counts.pending,
                completed,
                failed,
                in_progress: counts.syncing,
            };
            classes.insert(name, status);
        }

        Ok(SyncStatus {
            online: shared.connectivity.is_online(),
            syncing: shared.syncing.load(Ordering::SeqCst),
            last_sync: *shared.last_sync.lock(),
            classes,
        })
    }

    /// Drops every cached remote listing.
    pub fn clear_caches(&self) {
        self.shared.cache.clear_all();
    }

    /// Flushes every batch processor without waiting for its timer.
    pub async fn flush_batches(&self) {
        let batchers: Vec<(String, Arc<Batcher>)> = self
            .shared
            .batchers
            .lock()
            .iter()
            .map(|(class, batcher)| (class.clone(), Arc::clone(batcher)))
            .collect();
        for (entity_class, batcher) in batchers {
            if let Err(error) = batcher.flush().await {
                debug!(entity_class, %error, "batch flush skipped");
            }
        }
    }

    /// Returns the remote listing for an entity class, cached for
    /// `listing_ttl`. `force_refresh` drops the cached copy first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoConnector`], or the connector's error when
    /// the listing is not cached and cannot be fetched (including when
    /// offline).
    pub async fn list_remote(
        &self,
        entity_class: &str,
        force_refresh: bool,
    ) -> EngineResult<Vec<Value>> {
        let shared = &self.shared;
        shared.ensure_open()?;
        let connector = shared
            .connector(entity_class)
            .ok_or_else(|| EngineError::NoConnector(entity_class.to_string()))?;

        let key = listing_key(entity_class);
        if force_refresh {
            shared.cache.delete(&key);
        }

        let timeout = shared.config.connector_timeout;
        let connectivity = shared.connectivity.clone();
        let listing = shared
            .cache
            .get_or_set(&key, Some(shared.config.listing_ttl), || async move {
                if !connectivity.is_online() {
                    return Err(ConnectorError::Network("device is offline".into()));
                }
                bounded(timeout, connector.list()).await
            })
            .await?;
        Ok(listing)
    }

    /// Compacts the queue with the configured retention policy.
    ///
    /// # Errors
    ///
    /// Returns queue errors.
    pub fn compact(&self) -> EngineResult<CompactionStats> {
        self.shared.ensure_open()?;
        Ok(self.shared.queue.compact(self.shared.config.retention)?)
    }

    /// Spawns the background task. Calling it again is a no-op.
    ///
    /// The task syncs once after start when online (if `sync_on_start`),
    /// after every return to online (debounced), every `sync_interval`, and
    /// with backoff after passes that left retryable failures.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after `close`.
    pub fn start(&self) -> EngineResult<()> {
        self.shared.ensure_open()?;
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_background(Arc::clone(&self.shared), shutdown_rx));
        *worker = Some(Worker { shutdown, handle });
        info!("sync orchestrator started");
        Ok(())
    }

    /// Stops the background task, waits for a running pass, flushes and
    /// stops the batch processors and closes the queue.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a queue error if the final sync of the log fails.
    pub async fn close(&self) -> EngineResult<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(true);
            if let Err(error) = worker.handle.await {
                warn!(%error, "background sync task ended abnormally");
            }
        }

        let _pass = self.shared.pass.lock().await;
        let batchers: Vec<Arc<Batcher>> = self
            .shared
            .batchers
            .lock()
            .drain()
            .map(|(_, batcher)| batcher)
            .collect();
        for batcher in batchers {
            let _ = batcher.close().await;
        }

        self.shared.queue.close()?;
        info!("sync orchestrator closed");
        Ok(())
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.shutdown.send(true);
        }
    }
}

impl Shared {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn connector(&self, entity_class: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.read().get(entity_class).cloned()
    }

    async fn sync_all(&self) -> EngineResult<SyncReport> {
        self.ensure_open()?;
        let _pass = self.pass.lock().await;
        self.ensure_open()?;

        if !self.connectivity.is_online() {
            debug!("offline, sync pass skipped");
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        }

        self.syncing.store(true, Ordering::SeqCst);
        let outcome = self.run_pass().await;
        self.syncing.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_pass(&self) -> EngineResult<SyncReport> {
        let started = Instant::now();
        let mut connectors: Vec<(String, Arc<dyn Connector>)> = self
            .connectors
            .read()
            .iter()
            .map(|(class, connector)| (class.clone(), Arc::clone(connector)))
            .collect();
        connectors.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = SyncReport::default();
        for (entity_class, connector) in connectors {
            report.merge(self.sync_class(&entity_class, connector).await?);
            if report.aborted {
                warn!(entity_class, "connectivity lost, sync pass aborted");
                break;
            }
        }

        if !report.aborted {
            *self.last_sync.lock() = Some(now_millis());
        }
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if report.synced + report.failed + report.failed_permanent > 0 {
            info!(
                synced = report.synced,
                failed = report.failed,
                failed_permanent = report.failed_permanent,
                aborted = report.aborted,
                elapsed_ms,
                "sync pass finished"
            );
        } else {
            debug!(elapsed_ms, "sync pass found nothing to deliver");
        }
        Ok(report)
    }

    async fn sync_class(
        &self,
        entity_class: &str,
        connector: Arc<dyn Connector>,
    ) -> EngineResult<SyncReport> {
        let records = self.queue.list_unsynced(entity_class)?;
        if records.is_empty() {
            return Ok(SyncReport::default());
        }

        // Retryable failures and claims left by an interrupted pass go back
        // to Pending before they are claimed again.
        let mut ready = Vec::with_capacity(records.len());
        for record in records {
            let record = match record.sync_state {
                SyncState::Failed | SyncState::Syncing => {
                    match self.queue.requeue(entity_class, &record.id) {
                        Ok(record) => record,
                        // Saved again or pruned since listing; `claim` sorts it out.
                        Err(QueueError::InvalidTransition { .. } | QueueError::NotFound { .. }) => {
                            record
                        }
                        Err(error) => return Err(error.into()),
                    }
                }
                SyncState::Pending | SyncState::Synced => record,
            };
            ready.push(record);
        }

        let batched = connector.supports_batch();
        debug!(entity_class, count = ready.len(), batched, "replaying queued records");
        let report = if batched {
            self.sync_batched(entity_class, connector, ready).await?
        } else {
            self.sync_single(entity_class, connector, ready).await?
        };

        if report.synced > 0 {
            self.cache.delete(&listing_key(entity_class));
        }
        Ok(report)
    }

    async fn sync_single(
        &self,
        entity_class: &str,
        connector: Arc<dyn Connector>,
        records: Vec<PendingRecord>,
    ) -> EngineResult<SyncReport> {
        let mut report = SyncReport::default();
        for record in records {
            if !self.connectivity.is_online() {
                report.aborted = true;
                break;
            }
            let Some(claimed) = self.claim(entity_class, &record.id)? else {
                continue;
            };
            let outcome = bounded(
                self.config.connector_timeout,
                connector.create(&claimed.payload),
            )
            .await;
            self.settle(&claimed, outcome, &mut report)?;
        }
        Ok(report)
    }

    /// Delivers records chunk by chunk through the class batcher. Each
    /// chunk is claimed only once the previous one settled and the device
    /// is still online, so losing connectivity leaves the rest `Pending`.
    async fn sync_batched(
        &self,
        entity_class: &str,
        connector: Arc<dyn Connector>,
        records: Vec<PendingRecord>,
    ) -> EngineResult<SyncReport> {
        let mut report = SyncReport::default();
        let batcher = self.batcher(entity_class, connector);
        let chunk_size = batcher.config().batch_size.max(1);

        for chunk in records.chunks(chunk_size) {
            if !self.connectivity.is_online() {
                report.aborted = true;
                break;
            }

            let mut claimed = Vec::with_capacity(chunk.len());
            for record in chunk {
                match self.claim(entity_class, &record.id) {
                    Ok(Some(record)) => claimed.push(record),
                    Ok(None) => {}
                    Err(error) => {
                        self.release(&claimed);
                        return Err(error);
                    }
                }
            }
            if claimed.is_empty() {
                continue;
            }

            let results: Vec<_> = claimed
                .iter()
                .map(|record| batcher.add(record.payload.clone()))
                .collect();
            if let Err(error) = batcher.flush().await {
                debug!(entity_class, %error, "batch flush skipped");
            }

            for (record, result) in claimed.iter().zip(results) {
                match result.await {
                    Ok(outcome) => self.settle(record, outcome, &mut report)?,
                    Err(BatchError::Closed) => {
                        self.queue.requeue(&record.entity_class, &record.id)?;
                        report.aborted = true;
                    }
                    Err(error) => {
                        self.record_failure(record, &error.to_string(), true, &mut report)?;
                    }
                }
            }
            if report.aborted {
                break;
            }
        }
        Ok(report)
    }

    /// `Pending -> Syncing`. `None` if the record changed or vanished since
    /// it was listed.
    fn claim(&self, entity_class: &str, id: &str) -> EngineResult<Option<PendingRecord>> {
        match self.queue.mark_syncing(entity_class, id) {
            Ok(record) => Ok(Some(record)),
            Err(QueueError::InvalidTransition { .. } | QueueError::NotFound { .. }) => {
                debug!(entity_class, id, "record changed since listing, skipped");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Puts claimed records back to `Pending`.
    fn release(&self, claimed: &[PendingRecord]) {
        for record in claimed {
            if let Err(error) = self.queue.requeue(&record.entity_class, &record.id) {
                warn!(entity_class = %record.entity_class, id = %record.id, %error, "could not release claimed record");
            }
        }
    }

    fn settle(
        &self,
        record: &PendingRecord,
        outcome: ConnectorResult<String>,
        report: &mut SyncReport,
    ) -> EngineResult<()> {
        let (entity_class, id) = (record.entity_class.as_str(), record.id.as_str());
        match outcome {
            Ok(remote_id) => match self.queue.mark_synced(entity_class, id) {
                Ok(_) => {
                    *self
                        .completed
                        .lock()
                        .entry(entity_class.to_string())
                        .or_default() += 1;
                    report.synced += 1;
                    debug!(entity_class, id, remote_id, "record delivered");
                }
                Err(QueueError::InvalidTransition { .. }) => {
                    debug!(entity_class, id, remote_id, "record saved again during delivery, kept queued");
                }
                Err(error) => return Err(error.into()),
            },
            Err(error) => {
                self.record_failure(record, &error.to_string(), error.is_retryable(), report)?;
            }
        }
        Ok(())
    }

    /// Records a failed delivery. Non-retryable errors and records out of
    /// attempts fail permanently.
    fn record_failure(
        &self,
        record: &PendingRecord,
        message: &str,
        retryable: bool,
        report: &mut SyncReport,
    ) -> EngineResult<()> {
        let (entity_class, id) = (record.entity_class.as_str(), record.id.as_str());
        let exhausted = record.attempts + 1 >= self.config.retry.max_attempts;
        let permanent = !retryable || exhausted;
        let result = if permanent {
            self.queue.mark_failed_permanent(entity_class, id, message)
        } else {
            self.queue.mark_failed(entity_class, id, message)
        };

        match result {
            Ok(updated) => {
                if permanent {
                    report.failed_permanent += 1;
                } else {
                    report.failed += 1;
                }
                warn!(
                    entity_class,
                    id,
                    attempts = updated.attempts,
                    permanent,
                    error = message,
                    "delivery failed"
                );
                Ok(())
            }
            Err(QueueError::InvalidTransition { .. }) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn batcher(&self, entity_class: &str, connector: Arc<dyn Connector>) -> Arc<Batcher> {
        let mut batchers = self.batchers.lock();
        if let Some(batcher) = batchers.get(entity_class) {
            return Arc::clone(batcher);
        }

        let timeout = self.config.connector_timeout;
        let processor = BatchProcessor::new(
            self.config.batch_config_for(entity_class),
            move |payloads: Vec<Value>| {
                let connector = Arc::clone(&connector);
                async move {
                    let count = payloads.len();
                    let results: Vec<ConnectorResult<String>> =
                        match bounded(timeout, connector.batch_create(&payloads)).await {
                            Ok(ids) => ids.into_iter().map(Ok).collect(),
                            Err(error) => vec![Err(error); count],
                        };
                    Ok::<_, Infallible>(results)
                }
            },
        );

        let processor = Arc::new(processor);
        batchers.insert(entity_class.to_string(), Arc::clone(&processor));
        processor
    }

    /// Runs a pass for the background task and returns when to retry, if
    /// retryable failures are left.
    async fn background_pass(&self, retry_round: &mut u32) -> Option<Instant> {
        match self.sync_all().await {
            Ok(report) if report.failed > 0 && !report.aborted => {
                if *retry_round >= self.config.retry.max_attempts {
                    return None;
                }
                let delay = self.config.retry.delay_for_attempt(*retry_round);
                *retry_round += 1;
                debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "retry pass scheduled");
                Some(Instant::now() + delay)
            }
            Ok(_) => {
                *retry_round = 0;
                None
            }
            Err(EngineError::Closed | EngineError::Queue(QueueError::Closed)) => None,
            Err(error) => {
                error!(%error, "background sync pass failed");
                None
            }
        }
    }
}

async fn run_background(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut online = shared.connectivity.subscribe();
    let now_online = *online.borrow_and_update();
    let mut scheduled = (shared.config.sync_on_start && now_online).then(Instant::now);
    let mut ticker = shared.config.sync_interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut retry_round = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                // Only real changes are published, so `true` here means the
                // device came back online.
                if *online.borrow_and_update() {
                    debug!(debounce = ?shared.config.reconnect_debounce, "back online, sync scheduled");
                    scheduled = Some(Instant::now() + shared.config.reconnect_debounce);
                    retry_round = 0;
                } else {
                    scheduled = None;
                }
            }
            () = sleep_until(scheduled) => {
                scheduled = shared.background_pass(&mut retry_round).await;
            }
            () = tick(&mut ticker) => {
                if shared.connectivity.is_online() {
                    if let Some(at) = shared.background_pass(&mut retry_round).await {
                        scheduled = Some(at);
                    }
                }
            }
        }
    }
    debug!("background sync task stopped");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Bounds a connector call; expiry becomes [`ConnectorError::Timeout`].
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = ConnectorResult<T>>,
) -> ConnectorResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(ConnectorError::Timeout(limit)))
}

fn listing_key(entity_class: &str) -> String {
    format!("listing:{entity_class}")
}
