//! Work queues and the workers that drain them
//!
//! Items are claimed under a lease. A worker either finishes an item
//! (deleted) or asks for it to be requeued (released to the back of the
//! queue). Delivery is at-least-once, so workers must tolerate seeing an
//! item again.

use crate::import::ImportService;
use crate::post_import::PostImport;
use crate::resource::{DataResource, Perspective, ResourceMapper};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dkan_common::storage::JsonStoreExt;
use dkan_common::{DkanError, JobStatus, JsonStore, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const IMPORT_QUEUE: &str = "datastore_import";
pub const POST_IMPORT_QUEUE: &str = "post_import";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    /// Times the item has been claimed
    pub attempts: u32,
}

#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Add an item; returns its id
    async fn push(&self, data: Value) -> Result<String>;

    /// Lease the next available item
    async fn claim(&self, lease: Duration) -> Result<Option<QueueItem>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Give a claimed item back, behind everything already queued
    async fn release(&self, id: &str) -> Result<()>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

struct Entry {
    item: QueueItem,
    leased_until: Option<Instant>,
}

pub struct MemoryQueue {
    name: String,
    entries: Mutex<VecDeque<Entry>>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, data: Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.entries.lock().await.push_back(Entry {
            item: QueueItem {
                id: id.clone(),
                data,
                created_at: Utc::now(),
                attempts: 0,
            },
            leased_until: None,
        });
        debug!(queue = %self.name, item_id = %id, "Queued item");
        Ok(id)
    }

    async fn claim(&self, lease: Duration) -> Result<Option<QueueItem>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let available = entries
            .iter_mut()
            .find(|e| e.leased_until.is_none_or(|until| until <= now));
        Ok(available.map(|entry| {
            entry.leased_until = Some(now + lease);
            entry.item.attempts += 1;
            entry.item.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries.lock().await.retain(|e| e.item.id != id);
        Ok(())
    }

    async fn release(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let position = entries
            .iter()
            .position(|e| e.item.id == id)
            .ok_or_else(|| DkanError::not_found(format!("queue item {id} in {}", self.name)))?;
        if let Some(mut entry) = entries.remove(position) {
            entry.leased_until = None;
            entries.push_back(entry);
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().await.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredItem {
    item: QueueItem,
    leased_until: Option<DateTime<Utc>>,
}

/// Queue persisted in a [`JsonStore`], so items survive a restart
///
/// Keys sort by enqueue time; releasing an item stores it under a fresh key
/// and therefore a fresh id.
pub struct StoreQueue {
    name: String,
    store: Arc<dyn JsonStore>,
    /// Last key timestamp handed out; keys stay strictly increasing
    last_key: Mutex<i64>,
}

impl StoreQueue {
    pub fn new(name: impl Into<String>, store: Arc<dyn JsonStore>) -> Self {
        Self {
            name: name.into(),
            store,
            last_key: Mutex::new(0),
        }
    }

    fn next_key(last: &mut i64) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default().max(*last + 1);
        *last = nanos;
        format!("{nanos:020}_{}", Uuid::new_v4().simple())
    }
}

#[async_trait]
impl Queue for StoreQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, data: Value) -> Result<String> {
        let mut last = self.last_key.lock().await;
        let id = Self::next_key(&mut last);
        let stored = StoredItem {
            item: QueueItem {
                id: id.clone(),
                data,
                created_at: Utc::now(),
                attempts: 0,
            },
            leased_until: None,
        };
        self.store.store_as(&stored, &id).await?;
        debug!(queue = %self.name, item_id = %id, "Queued item");
        Ok(id)
    }

    async fn claim(&self, lease: Duration) -> Result<Option<QueueItem>> {
        let _lock = self.last_key.lock().await;
        let now = Utc::now();
        for (id, value) in self.store.retrieve_all().await? {
            let mut stored: StoredItem = serde_json::from_value(value)?;
            if stored.leased_until.is_some_and(|until| until > now) {
                continue;
            }
            let lease = chrono::Duration::from_std(lease)
                .map_err(|e| DkanError::config(format!("queue lease: {e}")))?;
            stored.leased_until = Some(now + lease);
            stored.item.attempts += 1;
            self.store.store_as(&stored, &id).await?;
            return Ok(Some(stored.item));
        }
        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _lock = self.last_key.lock().await;
        self.store.remove(id).await?;
        Ok(())
    }

    async fn release(&self, id: &str) -> Result<()> {
        let mut last = self.last_key.lock().await;
        let mut stored: StoredItem = self
            .store
            .retrieve_as(id)
            .await?
            .ok_or_else(|| DkanError::not_found(format!("queue item {id} in {}", self.name)))?;
        self.store.remove(id).await?;

        let key = Self::next_key(&mut last);
        stored.item.id = key.clone();
        stored.leased_until = None;
        self.store.store_as(&stored, &key).await
    }

    async fn len(&self) -> Result<usize> {
        self.store.count().await
    }
}

/// What happens to an item after processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Done,
    Requeue,
}

#[async_trait]
pub trait QueueWorker: Send + Sync {
    async fn process_item(&self, data: &Value) -> Result<WorkerOutcome>;
}

/// Queue payload naming a resource version
pub fn resource_item(resource: &DataResource) -> Value {
    json!({"identifier": resource.identifier, "version": resource.version})
}

async fn resource_from_item(mapper: &ResourceMapper, data: &Value) -> Result<DataResource> {
    let field = |name: &str| {
        data.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DkanError::import(format!("queue item has no '{name}': {data}")))
    };
    let (identifier, version) = (field("identifier")?, field("version")?);
    mapper
        .get(&identifier, &version, Perspective::Source)
        .await?
        .ok_or_else(|| DkanError::lookup(format!("resource {identifier}__{version} is not registered")))
}

/// Advances an import by one invocation per delivery
pub struct ImportQueueWorker {
    imports: ImportService,
    mapper: ResourceMapper,
    post_import: PostImport,
    post_import_queue: Arc<dyn Queue>,
}

impl ImportQueueWorker {
    pub fn new(
        imports: ImportService,
        mapper: ResourceMapper,
        post_import: PostImport,
        post_import_queue: Arc<dyn Queue>,
    ) -> Self {
        Self {
            imports,
            mapper,
            post_import,
            post_import_queue,
        }
    }
}

#[async_trait]
impl QueueWorker for ImportQueueWorker {
    async fn process_item(&self, data: &Value) -> Result<WorkerOutcome> {
        let resource = resource_from_item(&self.mapper, data).await?;
        let result = self.imports.import(&resource).await?;

        match result.status {
            JobStatus::Waiting | JobStatus::InProgress => Ok(WorkerOutcome::Requeue),
            JobStatus::Done => {
                // A recorded post-import always has a queue item behind it
                if self.post_import.result(&resource).await?.is_none() {
                    self.post_import_queue.push(resource_item(&resource)).await?;
                    self.post_import.mark_pending(&resource).await?;
                    info!(resource_id = %resource.identifier, version = %resource.version, "Queued post-import");
                }
                Ok(WorkerOutcome::Done)
            }
            JobStatus::Error | JobStatus::Stopped => {
                error!(
                    resource_id = %resource.identifier,
                    version = %resource.version,
                    status = %result.status,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Import did not complete"
                );
                Ok(WorkerOutcome::Done)
            }
        }
    }
}

/// Runs the post-import chain for one resource per delivery
pub struct PostImportQueueWorker {
    post_import: PostImport,
    mapper: ResourceMapper,
}

impl PostImportQueueWorker {
    pub fn new(post_import: PostImport, mapper: ResourceMapper) -> Self {
        Self { post_import, mapper }
    }
}

#[async_trait]
impl QueueWorker for PostImportQueueWorker {
    async fn process_item(&self, data: &Value) -> Result<WorkerOutcome> {
        let resource = resource_from_item(&self.mapper, data).await?;
        self.post_import.run(&resource).await?;
        Ok(WorkerOutcome::Done)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunnerStats {
    pub processed: usize,
    pub requeued: usize,
    pub failed: usize,
}

/// Drains a queue with one worker inside a time budget
pub struct QueueRunner {
    queue: Arc<dyn Queue>,
    worker: Arc<dyn QueueWorker>,
    lease: Duration,
}

impl QueueRunner {
    pub fn new(queue: Arc<dyn Queue>, worker: Arc<dyn QueueWorker>, lease: Duration) -> Self {
        Self { queue, worker, lease }
    }

    /// Process items until the queue is empty or `time_limit` has passed
    ///
    /// A failing item is logged and deleted; it never stops the run.
    pub async fn run(&self, time_limit: Duration) -> Result<RunnerStats> {
        let started = Instant::now();
        let mut stats = RunnerStats::default();

        while started.elapsed() < time_limit {
            let Some(item) = self.queue.claim(self.lease).await? else {
                break;
            };

            match self.worker.process_item(&item.data).await {
                Ok(WorkerOutcome::Done) => {
                    self.queue.delete(&item.id).await?;
                    stats.processed += 1;
                }
                Ok(WorkerOutcome::Requeue) => {
                    self.queue.release(&item.id).await?;
                    stats.requeued += 1;
                }
                Err(e) => {
                    warn!(queue = self.queue.name(), item_id = %item.id, error = %e, "Queue item failed");
                    self.queue.delete(&item.id).await?;
                    stats.failed += 1;
                }
            }
        }

        info!(
            queue = self.queue.name(),
            processed = stats.processed,
            requeued = stats.requeued,
            failed = stats.failed,
            remaining = self.queue.len().await?,
            "Queue run finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_claim_respects_lease() {
        let queue = MemoryQueue::new("q");
        let first = queue.push(json!(1)).await.unwrap();
        queue.push(json!(2)).await.unwrap();

        let claimed = queue.claim(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.attempts, 1);

        let next = queue.claim(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(next.data, json!(2));
        assert!(queue.claim(Duration::from_secs(60)).await.unwrap().is_none());
        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let queue = MemoryQueue::new("q");
        queue.push(json!("a")).await.unwrap();
        queue.claim(Duration::ZERO).await.unwrap().unwrap();
        let again = queue.claim(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn test_store_queue_orders_and_releases() {
        let queue = StoreQueue::new("q", Arc::new(dkan_common::storage::MemoryStore::new("q")));
        let a = queue.push(json!("a")).await.unwrap();
        queue.push(json!("b")).await.unwrap();

        let claimed = queue.claim(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(claimed.id, a);
        queue.release(&a).await.unwrap();

        let next = queue.claim(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(next.data, json!("b"));
        let last = queue.claim(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(last.data, json!("a"));
        assert_eq!(last.attempts, 2);
        assert!(queue.claim(Duration::from_secs(60)).await.unwrap().is_none());

        queue.delete(&next.id).await.unwrap();
        queue.delete(&last.id).await.unwrap();
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_release_moves_item_to_back() {
        let queue = MemoryQueue::new("q");
        let a = queue.push(json!("a")).await.unwrap();
        queue.push(json!("b")).await.unwrap();

        queue.claim(Duration::from_secs(60)).await.unwrap();
        queue.release(&a).await.unwrap();

        let next = queue.claim(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(next.data, json!("b"));
        assert!(queue.release("missing").await.is_err());
    }

    struct CountingWorker {
        calls: AtomicUsize,
        requeue_first: usize,
    }

    #[async_trait]
    impl QueueWorker for CountingWorker {
        async fn process_item(&self, data: &Value) -> Result<WorkerOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if data == &json!("bad") {
                return Err(DkanError::import("bad item"));
            }
            if call < self.requeue_first {
                Ok(WorkerOutcome::Requeue)
            } else {
                Ok(WorkerOutcome::Done)
            }
        }
    }

    #[tokio::test]
    async fn test_runner_drains_and_survives_failures() {
        let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new("q"));
        queue.push(json!("bad")).await.unwrap();
        queue.push(json!("good")).await.unwrap();

        let worker = Arc::new(CountingWorker {
            calls: AtomicUsize::new(0),
            requeue_first: 0,
        });
        let runner = QueueRunner::new(queue.clone(), worker, Duration::from_secs(60));
        let stats = runner.run(Duration::from_secs(10)).await.unwrap();

        assert_eq!(stats, RunnerStats { processed: 1, requeued: 0, failed: 1 });
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_runner_requeues() {
        let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new("q"));
        queue.push(json!("slow")).await.unwrap();

        let worker = Arc::new(CountingWorker {
            calls: AtomicUsize::new(0),
            requeue_first: 3,
        });
        let runner = QueueRunner::new(queue.clone(), worker.clone(), Duration::from_secs(60));
        let stats = runner.run(Duration::from_secs(10)).await.unwrap();

        assert_eq!(stats.requeued, 3);
        assert_eq!(stats.processed, 1);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_zero_budget_processes_nothing() {
        let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new("q"));
        queue.push(json!("x")).await.unwrap();
        let worker = Arc::new(CountingWorker {
            calls: AtomicUsize::new(0),
            requeue_first: 0,
        });
        let stats = QueueRunner::new(queue.clone(), worker, Duration::from_secs(1))
            .run(Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(stats, RunnerStats::default());
        assert_eq!(queue.len().await.unwrap(), 1);
    }
}
