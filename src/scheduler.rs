//! Batch scheduler — periodic FIFO batch draining with refill-on-empty.
//!
//! Both watcher loops (identity scanning and match resolution) run on
//! this scheduler: every tick it takes the next slice of the queue,
//! hands it to an async callback, and refills the queue from the live
//! source of truth once it runs dry. A tick never overlaps the previous
//! one; busy ticks are skipped, not bursted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Async callback invoked with each drained batch.
pub type ProcessFn<T> = Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Synchronous callback producing a fresh queue when the current one is empty.
pub type RefillFn<T> = Arc<dyn Fn() -> Vec<T> + Send + Sync>;

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle; all clones share one queue and one driver task.
pub struct BatchScheduler<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    label: String,
    batch_size: usize,
    interval: Duration,
    queue: Mutex<VecDeque<T>>,
    process: ProcessFn<T>,
    refill: RefillFn<T>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Clone for BatchScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> BatchScheduler<T> {
    pub fn new(
        label: impl Into<String>,
        batch_size: usize,
        interval: Duration,
        process: ProcessFn<T>,
        refill: RefillFn<T>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                batch_size: batch_size.max(1),
                interval,
                queue: Mutex::new(VecDeque::new()),
                process,
                refill,
                driver: Mutex::new(None),
            }),
        }
    }

    /// Replace the queue contents wholesale.
    pub fn initialize(&self, items: Vec<T>) {
        let mut queue = self.inner.queue.lock().unwrap();
        *queue = items.into();
    }

    /// Append items at the back of the queue.
    pub fn add_to_queue(&self, items: impl IntoIterator<Item = T>) {
        let mut queue = self.inner.queue.lock().unwrap();
        queue.extend(items);
    }

    /// Drop every queued item matching the predicate.
    pub fn remove_from_queue(&self, predicate: impl Fn(&T) -> bool) {
        let mut queue = self.inner.queue.lock().unwrap();
        queue.retain(|item| !predicate(item));
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    /// Spawn the driver task. Idempotent: a second call warns and no-ops.
    pub fn start(&self) {
        let mut driver = self.inner.driver.lock().unwrap();
        if driver.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!(scheduler = %self.inner.label, "Scheduler already running");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Consume the immediate first tick so the first batch runs
            // one full period after start, matching the refill cadence.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                inner.run_tick().await;
            }
        });

        debug!(scheduler = %self.inner.label, interval = ?self.inner.interval, "Scheduler started");
        *driver = Some(handle);
    }

    /// Abort the driver task. Safe to call when never started.
    pub fn stop(&self) {
        let mut driver = self.inner.driver.lock().unwrap();
        if let Some(handle) = driver.take() {
            handle.abort();
            debug!(scheduler = %self.inner.label, "Scheduler stopped");
        }
    }
}

impl<T: Send + 'static> Inner<T> {
    /// One tick: drain a batch, or refill when the queue has run dry.
    /// The callback is awaited in place, so ticks can never overlap.
    /// The refill callback runs without the queue lock held, so it may
    /// itself take locks that queue mutations are performed under.
    async fn run_tick(&self) {
        let batch = {
            let mut queue = self.queue.lock().unwrap();
            let take = self.batch_size.min(queue.len());
            queue.drain(..take).collect::<Vec<_>>()
        };

        if batch.is_empty() {
            let items = (self.refill)();
            let mut queue = self.queue.lock().unwrap();
            // Items enqueued while refilling take precedence; the next
            // dry tick re-derives from the source of truth anyway.
            if queue.is_empty() {
                *queue = items.into();
                debug!(scheduler = %self.label, refilled = queue.len(), "Queue refilled");
            }
            return;
        }

        if let Err(e) = (self.process)(batch).await {
            warn!(scheduler = %self.label, error = %e, "Batch callback failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
