//! Connector abstraction over the external systems records are delivered to.

use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Adapter for one external system (law-firm management, accounting,
/// calendar, document storage).
///
/// Implementations wrap whatever client the system needs. The orchestrator
/// bounds every call with its own timeout, so implementations do not need
/// one.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Creates one entity remotely and returns its remote id.
    async fn create(&self, payload: &Value) -> ConnectorResult<String>;

    /// Returns true if [`Connector::batch_create`] is implemented.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Creates several entities in one call and returns their remote ids in
    /// payload order.
    async fn batch_create(&self, payloads: &[Value]) -> ConnectorResult<Vec<String>> {
        let _ = payloads;
        Err(ConnectorError::Unsupported("batch_create"))
    }

    /// Lists the entities held by the remote system.
    async fn list(&self) -> ConnectorResult<Vec<Value>> {
        Err(ConnectorError::Unsupported("list"))
    }
}

/// A scripted connector for testing.
///
/// Each call consumes the next scripted outcome; when the script is empty
/// calls succeed. Successful creations are recorded so tests can check
/// exactly what reached the "remote" side.
#[derive(Debug, Default)]
pub struct MockConnector {
    batch: AtomicBool,
    delay: Mutex<Option<Duration>>,
    script: Mutex<VecDeque<Option<ConnectorError>>>,
    created: Mutex<Vec<Value>>,
    listing: Mutex<Vec<Value>>,
    next_id: AtomicU64,
    create_calls: AtomicU64,
    batch_calls: AtomicU64,
    list_calls: AtomicU64,
}

impl MockConnector {
    /// Creates a connector without batch support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector that advertises batch support.
    pub fn batching() -> Self {
        let connector = Self::default();
        connector.batch.store(true, Ordering::SeqCst);
        connector
    }

    /// Queues a successful outcome for the next call.
    pub fn then_succeed(&self) -> &Self {
        self.script.lock().push_back(None);
        self
    }

    /// Queues a failure for the next call.
    pub fn then_fail(&self, error: ConnectorError) -> &Self {
        self.script.lock().push_back(Some(error));
        self
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Sets what `list` returns.
    pub fn set_listing(&self, listing: Vec<Value>) {
        *self.listing.lock() = listing;
    }

    /// Payloads created successfully, in call order.
    pub fn created(&self) -> Vec<Value> {
        self.created.lock().clone()
    }

    /// Number of `create` calls.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `batch_create` calls.
    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of `list` calls.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) -> ConnectorResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Some(error)) => Err(error),
            Some(None) | None => Ok(()),
        }
    }

    fn record(&self, payload: &Value) -> String {
        self.created.lock().push(payload.clone());
        format!("remote-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn create(&self, payload: &Value) -> ConnectorResult<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        Ok(self.record(payload))
    }

    fn supports_batch(&self) -> bool {
        self.batch.load(Ordering::SeqCst)
    }

    async fn batch_create(&self, payloads: &[Value]) -> ConnectorResult<Vec<String>> {
        if !self.supports_batch() {
            return Err(ConnectorError::Unsupported("batch_create"));
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        Ok(payloads.iter().map(|payload| self.record(payload)).collect())
    }

    async fn list(&self) -> ConnectorResult<Vec<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        Ok(self.listing.lock().clone())
    }
}
