//! Upload broker: bounded FIFO queue with broadcast delivery
//!
//! The broker owns every pending [`UploadTask`] and the set of registered
//! subscribers. A single dispatch cycle, running as one Tokio task, pops the
//! oldest task and hands it to *every* subscriber concurrently, waiting for
//! all of them before moving on. This is a broadcast bus, not a
//! competing-consumers queue: two workers subscribed to one broker will both
//! receive every upload.
//!
//! # Guarantees
//!
//! - At most one dispatch cycle is active at a time. `publish` and
//!   `subscribe` only start a cycle when none is running; otherwise they
//!   append to the queue and wake the running cycle.
//! - Tasks are delivered in publish order.
//! - Non-recovery publishes are refused with [`CapacityExceeded`] once
//!   `max_queue_size` tasks are pending.
//! - Tasks are not popped while nobody is subscribed; they wait for the
//!   first subscriber.
//!
//! A subscriber that never returns stalls the queue: there is no delivery
//! timeout.
//!
//! # Recovery
//!
//! [`Broker::open`] scans the staging directory before returning and
//! re-publishes every staged file, bypassing the capacity bound, so uploads
//! accepted before a crash are processed after restart.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::{CapacityExceeded, RecoveryScanError};
use crate::record::UploadTask;

/// Suffix of files the sink is still writing. Recovery discards them.
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

/// Receives every task the broker dispatches.
///
/// An `Err` (or a panic) is logged by the broker and does not affect other
/// subscribers or later tasks.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn on_task(&self, task: &UploadTask) -> anyhow::Result<()>;
}

/// Adapts an async closure into a [`Subscriber`]. Build one with [`from_fn`].
pub struct FnSubscriber<F>(F);

/// Wrap an async closure as a subscriber.
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Subscriber>
where
    F: Fn(UploadTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnSubscriber(f))
}

#[async_trait]
impl<F, Fut> Subscriber for FnSubscriber<F>
where
    F: Fn(UploadTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_task(&self, task: &UploadTask) -> anyhow::Result<()> {
        (self.0)(task.clone()).await
    }
}

/// Broker settings
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub staging_dir: PathBuf,
    pub max_queue_size: usize,
    pub idle_poll_interval: Duration,
}

impl From<&IngestConfig> for BrokerConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            staging_dir: config.staging.dir.clone(),
            max_queue_size: config.queue.max_queue_size,
            idle_poll_interval: config.queue.idle_poll_interval(),
        }
    }
}

/// Handle to the upload queue. Cloning is cheap and every clone shares the
/// same queue.
#[derive(Clone)]
pub struct Broker {
    shared: Arc<Shared>,
}

/// Returned by [`Broker::subscribe`]; pass it back to stop receiving tasks.
#[must_use = "dropping a Subscription without calling unsubscribe keeps the subscriber registered"]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    config: BrokerConfig,
    runtime: Handle,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<UploadTask>,
    subscribers: BTreeMap<u64, Arc<dyn Subscriber>>,
    next_subscriber_id: u64,
    dispatching: bool,
    in_flight: Option<String>,
}

impl QueueState {
    /// Claim the dispatch flag if there is work and nobody holds it.
    fn try_begin_dispatch(&mut self) -> bool {
        if self.dispatching || self.pending.is_empty() || self.subscribers.is_empty() {
            return false;
        }
        self.dispatching = true;
        true
    }
}

impl Broker {
    /// Create the broker and recover files left in the staging directory.
    ///
    /// The directory is created if missing. Failing to list it is fatal; a
    /// single file that cannot be recovered is logged and skipped.
    pub async fn open(config: BrokerConfig) -> Result<Self, RecoveryScanError> {
        let broker = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                wake: Notify::new(),
                config,
                runtime: Handle::current(),
            }),
        };
        broker.recover().await?;
        Ok(broker)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.shared.config.staging_dir
    }

    /// Queue a staged file for processing.
    ///
    /// Fails with [`CapacityExceeded`] when the queue is full, unless
    /// `bypass_capacity` is set. The check comes first, so a full queue also
    /// refuses ids that are already pending. Otherwise re-publishing a pending
    /// id replaces its path and keeps its place in line.
    pub fn publish(
        &self,
        path: impl Into<PathBuf>,
        id: impl Into<String>,
        bypass_capacity: bool,
    ) -> Result<(), CapacityExceeded> {
        let path = path.into();
        let id = id.into();
        let max_size = self.shared.config.max_queue_size;

        let (start, pending) = {
            let mut state = self.shared.state();
            if !bypass_capacity && state.pending.len() >= max_size {
                return Err(CapacityExceeded { max_size });
            }
            match state.pending.iter().position(|task| task.id == id) {
                Some(index) => state.pending[index].staging_path = path.clone(),
                None => state.pending.push_back(UploadTask::new(id.clone(), path.clone())),
            }
            (state.try_begin_dispatch(), state.pending.len())
        };

        info!(task_id = %id, path = %path.display(), pending, "Item published to queue");
        self.kick(start);
        Ok(())
    }

    /// Register a subscriber. It receives every task dispatched from now on.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Subscription {
        let (id, start) = {
            let mut state = self.shared.state();
            let id = state.next_subscriber_id;
            state.next_subscriber_id += 1;
            state.subscribers.insert(id, subscriber);
            (id, state.try_begin_dispatch())
        };

        info!(subscriber_id = id, "New subscriber registered");
        self.kick(start);
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of tasks waiting to be dispatched.
    pub fn size(&self) -> usize {
        self.shared.state().pending.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state().subscribers.len()
    }

    /// Whether a dispatch cycle is running (delivering or idle-waiting).
    pub fn is_dispatching(&self) -> bool {
        self.shared.state().dispatching
    }

    /// True when nothing is pending and no task is being delivered.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state();
        state.pending.is_empty() && state.in_flight.is_none()
    }

    fn kick(&self, start: bool) {
        if start {
            let shared = Arc::clone(&self.shared);
            self.shared.runtime.spawn(shared.dispatch_loop());
        } else {
            // Only an idle wait that is already registered is woken. No permit
            // is stored, so a publish during a delivery does not cut the next
            // idle wait short.
            self.shared.wake.notify_waiters();
        }
    }

    async fn recover(&self) -> Result<usize, RecoveryScanError> {
        let dir = self.shared.config.staging_dir.clone();
        let scan_error = |source: std::io::Error| RecoveryScanError {
            dir: dir.clone(),
            source,
        };

        tokio::fs::create_dir_all(&dir).await.map_err(scan_error)?;
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(scan_error)?;

        let mut staged = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.ends_with(PARTIAL_SUFFIX) {
                warn!(path = %path.display(), "Removing incomplete upload");
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    error!(path = %path.display(), error = %err, "Failed to remove incomplete upload");
                }
                continue;
            }
            if name.starts_with('.') {
                continue;
            }

            match entry.metadata().await {
                Ok(meta) if meta.is_file() => {
                    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    staged.push((modified, path));
                },
                Ok(_) => debug!(path = %path.display(), "Skipping non-file entry"),
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Error loading file into queue")
                },
            }
        }

        // Oldest first, approximating the order the uploads were accepted in.
        staged.sort();

        let mut recovered = 0;
        for (_, path) in staged {
            let Some(task_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                error!(path = %path.display(), "Error loading file into queue: file name is not valid UTF-8");
                continue;
            };
            let task_id = task_id.to_string();

            match self.publish(path.clone(), task_id.clone(), true) {
                Ok(()) => {
                    info!(task_id = %task_id, path = %path.display(), "Loaded existing file into queue");
                    recovered += 1;
                },
                Err(err) => error!(task_id = %task_id, error = %err, "Error loading file into queue"),
            }
        }

        info!(recovered, dir = %dir.display(), "Staging directory scan complete");
        Ok(recovered)
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch_loop(self: Arc<Self>) {
        debug!("Dispatch cycle started");

        loop {
            if let Some((task, subscribers)) = self.next_delivery() {
                self.deliver(task, subscribers).await;
                self.state().in_flight = None;
                continue;
            }

            // Nothing to do right now. Wait for a publish or subscribe, or for
            // the poll interval to elapse, then look once more before stopping.
            // The waiter is registered before the re-check so a publish landing
            // in between still wakes it.
            let woken = self.wake.notified();
            if self.has_work() {
                continue;
            }
            let _ = tokio::time::timeout(self.config.idle_poll_interval, woken).await;

            let mut state = self.state();
            if state.pending.is_empty() || state.subscribers.is_empty() {
                state.dispatching = false;
                if state.pending.is_empty() {
                    info!("Queue is empty");
                }
                break;
            }
        }

        debug!("Dispatch cycle stopped");
    }

    fn has_work(&self) -> bool {
        let state = self.state();
        !state.pending.is_empty() && !state.subscribers.is_empty()
    }

    fn next_delivery(&self) -> Option<(UploadTask, Vec<Arc<dyn Subscriber>>)> {
        let mut state = self.state();
        if state.subscribers.is_empty() {
            return None;
        }
        let task = state.pending.pop_front()?;
        state.in_flight = Some(task.id.clone());
        let subscribers = state.subscribers.values().cloned().collect();
        Some((task, subscribers))
    }

    async fn deliver(&self, task: UploadTask, subscribers: Vec<Arc<dyn Subscriber>>) {
        debug!(task_id = %task.id, subscribers = subscribers.len(), "Dispatching upload");
        let task = Arc::new(task);

        let handles: Vec<_> = subscribers
            .into_iter()
            .map(|subscriber| {
                let task = Arc::clone(&task);
                self.runtime
                    .spawn(async move { subscriber.on_task(&task).await })
            })
            .collect();

        for outcome in join_all(handles).await {
            match outcome {
                Ok(Ok(())) => {},
                Ok(Err(err)) => error!(task_id = %task.id, error = ?err, "Subscriber error"),
                Err(err) => error!(task_id = %task.id, error = %err, "Subscriber panicked"),
            }
        }
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop delivering tasks to this subscriber.
    ///
    /// A delivery already in progress runs to completion.
    pub fn unsubscribe(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared.state().subscribers.remove(&self.id).is_some() {
            info!(subscriber_id = self.id, "Subscriber unregistered");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn config(dir: &Path, max_queue_size: usize) -> BrokerConfig {
        BrokerConfig {
            staging_dir: dir.to_path_buf(),
            max_queue_size,
            idle_poll_interval: Duration::from_millis(10),
        }
    }

    fn recorder() -> (Arc<dyn Subscriber>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = from_fn(move |task: UploadTask| {
            let tx = tx.clone();
            async move {
                tx.send(task.id).ok();
                Ok(())
            }
        });
        (subscriber, rx)
    }

    async fn next_id(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_publish_over_capacity_is_rejected() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 3)).await.unwrap();

        for i in 0..3 {
            broker.publish(format!("/tmp/{i}.csv"), i.to_string(), false).unwrap();
        }
        let err = broker.publish("/tmp/3.csv", "3", false).unwrap_err();

        assert_eq!(err, CapacityExceeded { max_size: 3 });
        assert_eq!(broker.size(), 3);
    }

    #[tokio::test]
    async fn test_bypass_ignores_capacity() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 1)).await.unwrap();

        broker.publish("/tmp/a.csv", "a", false).unwrap();
        broker.publish("/tmp/b.csv", "b", true).unwrap();

        assert_eq!(broker.size(), 2);
        assert!(broker.publish("/tmp/c.csv", "c", false).is_err());
    }

    #[tokio::test]
    async fn test_republishing_pending_id_keeps_position() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 2)).await.unwrap();

        broker.publish("/tmp/a.csv", "a", false).unwrap();
        broker.publish("/tmp/a2.csv", "a", false).unwrap();
        assert_eq!(broker.size(), 1);
        broker.publish("/tmp/b.csv", "b", false).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = broker.subscribe(from_fn(move |task: UploadTask| {
            let tx = tx.clone();
            async move {
                tx.send(task).ok();
                Ok(())
            }
        }));

        let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, UploadTask::new("a", "/tmp/a2.csv"));
        let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.id, "b");
    }

    #[tokio::test]
    async fn test_republishing_pending_id_on_full_queue_is_rejected() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 2)).await.unwrap();

        broker.publish("/tmp/a.csv", "a", false).unwrap();
        broker.publish("/tmp/b.csv", "b", false).unwrap();

        let err = broker.publish("/tmp/a2.csv", "a", false).unwrap_err();
        assert_eq!(err, CapacityExceeded { max_size: 2 });
        assert_eq!(broker.size(), 2);

        // The rejected publish left the pending path untouched.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = broker.subscribe(from_fn(move |task: UploadTask| {
            let tx = tx.clone();
            async move {
                tx.send(task).ok();
                Ok(())
            }
        }));
        let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, UploadTask::new("a", "/tmp/a.csv"));

        // Recovery bypass still replaces in place on a full queue.
        broker.publish("/tmp/b2.csv", "b", true).unwrap();
        let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(second, UploadTask::new("b", "/tmp/b2.csv"));
    }

    #[tokio::test]
    async fn test_tasks_wait_for_first_subscriber() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 10)).await.unwrap();

        broker.publish("/tmp/a.csv", "a", false).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.size(), 1);
        assert!(!broker.is_dispatching());

        let (subscriber, mut rx) = recorder();
        let _subscription = broker.subscribe(subscriber);
        assert_eq!(next_id(&mut rx).await, "a");
    }

    #[tokio::test]
    async fn test_delivery_is_fifo() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 100)).await.unwrap();
        let (subscriber, mut rx) = recorder();
        let _subscription = broker.subscribe(subscriber);

        for i in 0..25 {
            broker.publish(format!("/tmp/{i}.csv"), format!("task-{i}"), false).unwrap();
            if i % 7 == 0 {
                tokio::task::yield_now().await;
            }
        }

        for i in 0..25 {
            assert_eq!(next_id(&mut rx).await, format!("task-{i}"));
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_every_task() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 10)).await.unwrap();
        let (first, mut first_rx) = recorder();
        let (second, mut second_rx) = recorder();
        let _a = broker.subscribe(first);
        let _b = broker.subscribe(second);
        assert_eq!(broker.subscriber_count(), 2);

        broker.publish("/tmp/x.csv", "x", false).unwrap();
        broker.publish("/tmp/y.csv", "y", false).unwrap();

        for rx in [&mut first_rx, &mut second_rx] {
            assert_eq!(next_id(rx).await, "x");
            assert_eq!(next_id(rx).await, "y");
        }
    }

    #[tokio::test]
    async fn test_failing_subscribers_do_not_stop_the_queue() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 10)).await.unwrap();

        let _failing = broker.subscribe(from_fn(|_task: UploadTask| async {
            Err(anyhow::anyhow!("store is down"))
        }));
        let _panicking = broker.subscribe(from_fn(|task: UploadTask| async move {
            if task.id == "boom" {
                panic!("subscriber panic");
            }
            Ok(())
        }));
        let (subscriber, mut rx) = recorder();
        let _healthy = broker.subscribe(subscriber);

        broker.publish("/tmp/boom.csv", "boom", false).unwrap();
        broker.publish("/tmp/next.csv", "next", false).unwrap();

        assert_eq!(next_id(&mut rx).await, "boom");
        assert_eq!(next_id(&mut rx).await, "next");
    }

    #[tokio::test]
    async fn test_unsubscribe_during_delivery_affects_only_later_tasks() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 10)).await.unwrap();

        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = {
            let (started, release, calls) = (started.clone(), release.clone(), calls.clone());
            from_fn(move |_task: UploadTask| {
                let (started, release, calls) = (started.clone(), release.clone(), calls.clone());
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    started.notify_one();
                    release.notified().await;
                    Ok(())
                }
            })
        };
        let slow_subscription = broker.subscribe(slow);
        let (subscriber, mut rx) = recorder();
        let _other = broker.subscribe(subscriber);

        broker.publish("/tmp/1.csv", "1", false).unwrap();
        timeout(WAIT, started.notified()).await.unwrap();

        slow_subscription.unsubscribe();
        assert_eq!(broker.subscriber_count(), 1);
        broker.publish("/tmp/2.csv", "2", false).unwrap();
        release.notify_one();

        assert_eq!(next_id(&mut rx).await, "1");
        assert_eq!(next_id(&mut rx).await, "2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_stops_when_drained() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(config(dir.path(), 10)).await.unwrap();
        let (subscriber, mut rx) = recorder();
        let _subscription = broker.subscribe(subscriber);

        broker.publish("/tmp/a.csv", "a", false).unwrap();
        assert_eq!(next_id(&mut rx).await, "a");

        timeout(WAIT, async {
            while broker.is_dispatching() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(broker.is_idle());

        // A later publish starts a fresh cycle.
        broker.publish("/tmp/b.csv", "b", false).unwrap();
        assert_eq!(next_id(&mut rx).await, "b");
    }

    #[tokio::test]
    async fn test_publish_during_delivery_keeps_idle_wait() {
        let dir = TempDir::new().unwrap();
        let broker = Broker::open(BrokerConfig {
            staging_dir: dir.path().to_path_buf(),
            max_queue_size: 10,
            idle_poll_interval: Duration::from_millis(500),
        })
        .await
        .unwrap();

        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gated = {
            let (started, release) = (started.clone(), release.clone());
            from_fn(move |task: UploadTask| {
                let (started, release, tx) = (started.clone(), release.clone(), tx.clone());
                async move {
                    if task.id == "a" {
                        started.notify_one();
                        release.notified().await;
                    }
                    tx.send(task.id).ok();
                    Ok(())
                }
            })
        };
        let _subscription = broker.subscribe(gated);

        broker.publish("/tmp/a.csv", "a", false).unwrap();
        timeout(WAIT, started.notified()).await.unwrap();
        broker.publish("/tmp/b.csv", "b", false).unwrap();
        release.notify_one();

        assert_eq!(next_id(&mut rx).await, "a");
        assert_eq!(next_id(&mut rx).await, "b");

        // The drained cycle sits in its idle wait instead of stopping at once.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(broker.is_dispatching());
        assert!(broker.is_idle());

        timeout(WAIT, async {
            while broker.is_dispatching() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_open_recovers_staged_files_past_capacity() {
        let dir = TempDir::new().unwrap();
        for name in ["first.csv", "second.csv", "third.csv"] {
            std::fs::write(dir.path().join(name), "row\n").unwrap();
            // Distinct modification times keep the recovery order stable.
            std::thread::sleep(Duration::from_millis(20));
        }
        std::fs::write(dir.path().join(".gitkeep"), "").unwrap();
        std::fs::write(dir.path().join(format!("half.csv{PARTIAL_SUFFIX}")), "ro").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let broker = Broker::open(config(dir.path(), 1)).await.unwrap();
        assert_eq!(broker.size(), 3);
        assert!(!dir.path().join(format!("half.csv{PARTIAL_SUFFIX}")).exists());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = broker.subscribe(from_fn(move |task: UploadTask| {
            let tx = tx.clone();
            async move {
                tx.send(task).ok();
                Ok(())
            }
        }));

        for expected in ["first", "second", "third"] {
            let task = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
            assert_eq!(task.id, expected);
            assert_eq!(task.staging_path, dir.path().join(format!("{expected}.csv")));
        }
    }

    #[tokio::test]
    async fn test_open_creates_missing_staging_dir() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("uploads");
        let broker = Broker::open(config(&staging, 5)).await.unwrap();
        assert!(staging.is_dir());
        assert_eq!(broker.size(), 0);
    }

    #[tokio::test]
    async fn test_open_fails_when_staging_path_is_a_file() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("uploads");
        std::fs::write(&not_a_dir, "").unwrap();

        let err = Broker::open(config(&not_a_dir, 5)).await.err().unwrap();
        assert_eq!(err.dir, not_a_dir);
    }
}
