//! The durable queue engine.
//!
//! A `QueueEngine` partitions work into lanes by [`QueueKey`]. Each lane is
//! processed by at most one runner task at a time, so at most one item per
//! key is ever active. Different keys run concurrently.
//!
//! # Item lifecycle
//!
//! 1. `enqueue` persists the item, then appends it to the in-memory lane and
//!    returns a [`Completion`] for that specific item.
//! 2. Once the engine is started, the lane runner takes the head item and
//!    hands its payload to the bound [`QueueWorker`].
//! 3. Success (or a veto skip) removes the item from storage and resolves
//!    the completion.
//! 4. Failure consults the [`RetryPolicy`]: retryable failures back off and
//!    retry the same head item; anything else stalls the lane, leaving the
//!    item at the head so the next process start retries it first.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_types::error::{ProcessError, QueueError};
use courier_types::event::BotEvent;
use courier_types::queue::{LaneSnapshot, Outcome, QueueItem, QueueItemState, QueueKey};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::Backoff;
use super::retry::{RetryContext, RetryPolicy};
use super::store::QueueStore;
use crate::event::EventBus;

/// The function a queue engine applies to each item.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for the async
/// method, consistent with the storage ports.
pub trait QueueWorker: Send + Sync + 'static {
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Process one item. `Ok(Outcome::Skipped)` is a terminal success.
    fn process(
        &self,
        key: &QueueKey,
        payload: &Self::Payload,
    ) -> impl std::future::Future<Output = Result<Outcome, ProcessError>> + Send;
}

type Waiter = oneshot::Sender<Result<Outcome, QueueError>>;

struct Entry {
    item: QueueItem,
    waiter: Option<Waiter>,
}

#[derive(Default)]
struct Lane {
    items: VecDeque<Entry>,
    /// A runner task currently owns this lane.
    running: bool,
    stalled: bool,
    /// `clear` was called while the runner was busy; purge between items.
    purge_requested: bool,
    purge_waiters: Vec<oneshot::Sender<()>>,
}

impl Lane {
    fn is_disposable(&self) -> bool {
        self.items.is_empty() && !self.running && !self.stalled && !self.purge_requested
    }
}

enum Next {
    Run(QueueItem),
    Idle,
    Purge,
}

enum HeadResult {
    Done(Outcome),
    Stalled(ProcessError),
    /// Shutdown or purge interrupted a backoff; the head was not finished.
    Interrupted,
}

struct Inner<W: QueueWorker, S: QueueStore> {
    name: String,
    store: S,
    worker: W,
    policy: Arc<dyn RetryPolicy>,
    backoff: Backoff,
    events: EventBus,
    lanes: DashMap<QueueKey, Lane>,
    /// Serializes store mutations that must line up with the in-memory lanes.
    write_lock: Mutex<()>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

/// Durable per-key FIFO queue driving a [`QueueWorker`].
///
/// Cheap to clone; clones share the same lanes and runners.
pub struct QueueEngine<W: QueueWorker, S: QueueStore> {
    inner: Arc<Inner<W, S>>,
}

impl<W: QueueWorker, S: QueueStore> Clone for QueueEngine<W, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: QueueWorker, S: QueueStore> QueueEngine<W, S> {
    /// Open an engine over `store`, loading every persisted item.
    ///
    /// Nothing is processed until [`start`](Self::start) is called.
    pub async fn open(
        name: impl Into<String>,
        store: S,
        worker: W,
        policy: Arc<dyn RetryPolicy>,
        backoff: Backoff,
        events: EventBus,
    ) -> Result<Self, QueueError> {
        let name = name.into();
        let lanes: DashMap<QueueKey, Lane> = DashMap::new();

        let persisted = store.load_all().await?;
        let restored = persisted.len();
        for mut item in persisted {
            item.state = QueueItemState::Pending;
            lanes.entry(item.key.clone()).or_default().items.push_back(Entry {
                item,
                waiter: None,
            });
        }
        if restored > 0 {
            info!(queue = %name, restored, "restored persisted queue items");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                store,
                worker,
                policy,
                backoff,
                events,
                lanes,
                write_lock: Mutex::new(()),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn worker(&self) -> &W {
        &self.inner.worker
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Durably append `payload` to `key`'s lane.
    ///
    /// Returns once the item is persisted. The returned [`Completion`]
    /// resolves when this item is processed (or skipped), and fails if the
    /// item stalls its lane or the lane is cleared first.
    pub async fn enqueue(
        &self,
        key: QueueKey,
        payload: &W::Payload,
    ) -> Result<Completion, QueueError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(QueueError::ShutDown(self.inner.name.clone()));
        }
        let value =
            serde_json::to_value(payload).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let item = QueueItem::new(key.clone(), value);
        let id = item.id;
        let (tx, rx) = oneshot::channel();

        {
            let _guard = self.inner.write_lock.lock().await;
            self.inner.store.append(&item).await?;
            self.inner
                .lanes
                .entry(key.clone())
                .or_default()
                .items
                .push_back(Entry {
                    item,
                    waiter: Some(tx),
                });
            // Shutdown may have drained the lanes between the check above
            // and the push; the item stays persisted for the next open.
            if self.inner.shutdown.is_cancelled() {
                if let Some(mut lane) = self.inner.lanes.get_mut(&key) {
                    self.inner.fail_waiters(&mut lane, |entry| entry.item.id == id);
                }
            }
        }

        debug!(queue = %self.inner.name, %key, item_id = %id, "enqueued item");
        self.inner.kick(&key);

        Ok(Completion {
            id,
            key,
            queue: self.inner.name.clone(),
            rx,
        })
    }

    /// Begin processing every lane. Calling it again is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(queue = %self.inner.name, lanes = self.inner.lanes.len(), "starting queue");
        let keys: Vec<QueueKey> = self.inner.lanes.iter().map(|l| l.key().clone()).collect();
        for key in keys {
            self.inner.kick(&key);
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Snapshot of pending counts, for one key or for every non-empty lane.
    pub fn queued(&self, key: Option<&QueueKey>) -> BTreeMap<QueueKey, LaneSnapshot> {
        let snapshot = |lane: &Lane| LaneSnapshot {
            pending: lane.items.len(),
            stalled: lane.stalled,
        };

        match key {
            Some(key) => self
                .inner
                .lanes
                .get(key)
                .filter(|lane| !lane.items.is_empty())
                .map(|lane| BTreeMap::from([(key.clone(), snapshot(lane.value()))]))
                .unwrap_or_default(),
            None => self
                .inner
                .lanes
                .iter()
                .filter(|lane| !lane.items.is_empty())
                .map(|lane| (lane.key().clone(), snapshot(lane.value())))
                .collect(),
        }
    }

    /// Number of items waiting in `key`'s lane.
    pub fn pending(&self, key: &QueueKey) -> usize {
        self.inner
            .lanes
            .get(key)
            .map(|lane| lane.items.len())
            .unwrap_or(0)
    }

    /// Whether `key`'s lane is halted on a permanent failure.
    pub fn is_stalled(&self, key: &QueueKey) -> bool {
        self.inner
            .lanes
            .get(key)
            .is_some_and(|lane| lane.stalled)
    }

    /// Remove every item of `key`, in memory and in storage.
    ///
    /// An active item is never preempted: if the lane is mid-flight, the
    /// purge happens between items and this call waits for it. Completions
    /// of purged items fail with [`QueueError::Purged`].
    pub async fn clear(&self, key: &QueueKey) -> Result<usize, QueueError> {
        let wait = {
            let _guard = self.inner.write_lock.lock().await;
            let busy = match self.inner.lanes.get_mut(key) {
                Some(mut lane) if lane.running => {
                    let (tx, rx) = oneshot::channel();
                    lane.purge_requested = true;
                    lane.purge_waiters.push(tx);
                    Some((rx, lane.items.len()))
                }
                _ => None,
            };
            match busy {
                Some(wait) => wait,
                None => return self.inner.purge_locked(key).await,
            }
        };

        let (rx, count) = wait;
        debug!(queue = %self.inner.name, %key, "waiting for in-flight item before clearing lane");
        let _ = rx.await;
        Ok(count)
    }

    /// Clear every lane.
    pub async fn clear_all(&self) -> Result<usize, QueueError> {
        let keys: Vec<QueueKey> = self.inner.lanes.iter().map(|l| l.key().clone()).collect();
        let mut removed = 0;
        for key in keys {
            removed += self.clear(&key).await?;
        }
        let _guard = self.inner.write_lock.lock().await;
        removed += self.inner.store.clear_all().await?;
        Ok(removed)
    }

    /// Stop processing. Backoff sleeps end immediately; in-flight worker
    /// calls finish but no further items are taken, and later enqueues are
    /// rejected. Persisted items stay for the next open.
    ///
    /// Completions of items that will not run fail with
    /// [`QueueError::ShutDown`]. An item whose worker call is in flight
    /// resolves with its own outcome.
    pub fn shutdown(&self) {
        info!(queue = %self.inner.name, "shutting down queue");
        self.inner.shutdown.cancel();
        for mut lane in self.inner.lanes.iter_mut() {
            let running = lane.running;
            self.inner.fail_waiters(&mut lane, |entry| {
                !(running && entry.item.state == QueueItemState::Active)
            });
        }
    }
}

impl<W: QueueWorker, S: QueueStore> Inner<W, S> {
    /// Spawn a runner for `key` if the lane has work and nobody owns it.
    fn kick(self: &Arc<Self>, key: &QueueKey) {
        if !self.started.load(Ordering::SeqCst) || self.shutdown.is_cancelled() {
            return;
        }

        let claimed = match self.lanes.get_mut(key) {
            Some(mut lane) if !lane.running && !lane.stalled && !lane.items.is_empty() => {
                lane.running = true;
                true
            }
            _ => false,
        };

        if claimed {
            let inner = Arc::clone(self);
            let key = key.clone();
            tokio::spawn(async move { inner.run_lane(key).await });
        }
    }

    async fn run_lane(self: Arc<Self>, key: QueueKey) {
        loop {
            let next = match self.lanes.get_mut(&key) {
                None => return,
                Some(lane) if lane.purge_requested => Next::Purge,
                Some(mut lane) if lane.stalled || self.shutdown.is_cancelled() => {
                    lane.running = false;
                    if !lane.stalled {
                        for entry in lane.items.iter_mut() {
                            entry.item.state = QueueItemState::Pending;
                        }
                        self.fail_waiters(&mut lane, |_| true);
                    }
                    return;
                }
                Some(mut lane) => match lane.items.front_mut() {
                    Some(entry) => {
                        entry.item.state = QueueItemState::Active;
                        Next::Run(entry.item.clone())
                    }
                    None => {
                        lane.running = false;
                        Next::Idle
                    }
                },
            };

            let head = match next {
                Next::Run(head) => head,
                Next::Idle => {
                    self.lanes.remove_if(&key, |_, lane| lane.is_disposable());
                    return;
                }
                Next::Purge => {
                    let _guard = self.write_lock.lock().await;
                    if let Err(e) = self.purge_locked(&key).await {
                        error!(queue = %self.name, %key, error = %e, "failed to purge lane");
                    }
                    return;
                }
            };

            let item_id = head.id;
            match self.process_head(&key, head).await {
                HeadResult::Done(outcome) => {
                    if let Err(e) = self.store.remove(&key, &item_id).await {
                        // The item may be replayed after a restart.
                        error!(queue = %self.name, %key, %item_id, error = %e, "failed to remove processed item");
                    }
                    let waiter = self.pop_head(&key, &item_id);
                    debug!(queue = %self.name, %key, %item_id, ?outcome, "item processed");
                    if let Some(waiter) = waiter {
                        let _ = waiter.send(Ok(outcome));
                    }
                }
                HeadResult::Stalled(err) => self.stall(&key, &item_id, err),
                HeadResult::Interrupted => {}
            }
        }
    }

    async fn process_head(&self, key: &QueueKey, mut item: QueueItem) -> HeadResult {
        let payload: W::Payload = match serde_json::from_value(item.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                return HeadResult::Stalled(ProcessError::Developer(format!(
                    "undecodable payload: {e}"
                )));
            }
        };

        loop {
            let err = match self.worker.process(key, &payload).await {
                Ok(outcome) => return HeadResult::Done(outcome),
                Err(err) => err,
            };

            item.attempts += 1;
            if let Err(e) = self.store.record_attempt(key, &item.id, item.attempts).await {
                warn!(queue = %self.name, %key, error = %e, "failed to persist attempt count");
            }
            if let Some(mut lane) = self.lanes.get_mut(key) {
                if let Some(entry) = lane.items.iter_mut().find(|e| e.item.id == item.id) {
                    entry.item.attempts = item.attempts;
                }
            }

            let retry = !matches!(err, ProcessError::Developer(_))
                && !self.backoff.exhausted(item.attempts)
                && self.policy.should_retry(&RetryContext {
                    queue: &self.name,
                    key,
                    attempts: item.attempts,
                    error: &err,
                });
            if !retry {
                return HeadResult::Stalled(err);
            }

            let delay = self.backoff.delay(item.attempts);
            warn!(
                queue = %self.name,
                %key,
                attempt = item.attempts,
                ?delay,
                error = %err,
                "attempt failed, backing off before retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => return HeadResult::Interrupted,
            }

            if self.lanes.get(key).is_some_and(|lane| lane.purge_requested) {
                return HeadResult::Interrupted;
            }
        }
    }

    /// Fail the completions of `lane`'s entries matching `select` with
    /// [`QueueError::ShutDown`].
    fn fail_waiters(&self, lane: &mut Lane, select: impl Fn(&Entry) -> bool) {
        for entry in lane.items.iter_mut().filter(|entry| select(entry)) {
            if let Some(waiter) = entry.waiter.take() {
                let _ = waiter.send(Err(QueueError::ShutDown(self.name.clone())));
            }
        }
    }

    fn pop_head(&self, key: &QueueKey, item_id: &Uuid) -> Option<Waiter> {
        let mut lane = self.lanes.get_mut(key)?;
        if lane.items.front().is_some_and(|e| e.item.id == *item_id) {
            lane.items.pop_front().and_then(|entry| entry.waiter)
        } else {
            None
        }
    }

    fn stall(&self, key: &QueueKey, item_id: &Uuid, err: ProcessError) {
        error!(
            queue = %self.name,
            %key,
            %item_id,
            error = %err,
            "item failed permanently, stalling lane until restart"
        );

        let waiter = self.lanes.get_mut(key).and_then(|mut lane| {
            lane.stalled = true;
            lane.items.front_mut().and_then(|entry| {
                entry.item.state = QueueItemState::Stalled;
                entry.waiter.take()
            })
        });

        if let Some(waiter) = waiter {
            let _ = waiter.send(Err(QueueError::Stalled {
                queue: self.name.clone(),
                key: key.to_string(),
                reason: err.to_string(),
            }));
        }

        self.events.publish(BotEvent::Error {
            action: self.name.clone(),
            key: Some(key.to_string()),
            message: err.to_string(),
        });
    }

    /// Drop the lane and its stored items. Caller holds `write_lock`.
    async fn purge_locked(&self, key: &QueueKey) -> Result<usize, QueueError> {
        let lane = self.lanes.remove(key).map(|(_, lane)| lane);
        let removed = self.store.clear(key).await?;

        if let Some(lane) = lane {
            for entry in lane.items {
                if let Some(waiter) = entry.waiter {
                    let _ = waiter.send(Err(QueueError::Purged {
                        queue: self.name.clone(),
                        key: key.to_string(),
                    }));
                }
            }
            for waiter in lane.purge_waiters {
                let _ = waiter.send(());
            }
        }

        debug!(queue = %self.name, %key, removed, "cleared lane");
        Ok(removed)
    }
}

/// Handle on one enqueued item.
#[derive(Debug)]
pub struct Completion {
    id: Uuid,
    key: QueueKey,
    queue: String,
    rx: oneshot::Receiver<Result<Outcome, QueueError>>,
}

impl Completion {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    /// Wait for the item to finish processing.
    pub async fn wait(self) -> Result<Outcome, QueueError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(QueueError::ShutDown(self.queue)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use courier_types::error::TransportError;
    use tokio::sync::Notify;

    use super::*;
    use crate::queue::retry::SendRetryPolicy;
    use crate::queue::store::MemoryQueueStore;

    /// Records calls and replays scripted failures per payload.
    #[derive(Clone, Default)]
    struct ScriptedWorker {
        calls: Arc<StdMutex<Vec<(String, u32)>>>,
        script: Arc<StdMutex<HashMap<u32, VecDeque<Result<Outcome, ProcessError>>>>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedWorker {
        fn script(&self, payload: u32, results: Vec<Result<Outcome, ProcessError>>) {
            self.script
                .lock()
                .unwrap()
                .insert(payload, results.into_iter().collect());
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl QueueWorker for ScriptedWorker {
        type Payload = u32;

        async fn process(&self, key: &QueueKey, payload: &u32) -> Result<Outcome, ProcessError> {
            self.calls
                .lock()
                .unwrap()
                .push((key.to_string(), *payload));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self
                .script
                .lock()
                .unwrap()
                .get_mut(payload)
                .and_then(|results| results.pop_front());
            next.unwrap_or(Ok(Outcome::Completed))
        }
    }

    async fn engine(
        worker: ScriptedWorker,
        store: MemoryQueueStore,
    ) -> QueueEngine<ScriptedWorker, MemoryQueueStore> {
        engine_with(worker, store, Backoff::default(), EventBus::new(16)).await
    }

    async fn engine_with(
        worker: ScriptedWorker,
        store: MemoryQueueStore,
        backoff: Backoff,
        events: EventBus,
    ) -> QueueEngine<ScriptedWorker, MemoryQueueStore> {
        QueueEngine::open("send", store, worker, Arc::new(SendRetryPolicy), backoff, events)
            .await
            .unwrap()
    }

    fn always_retry(_: &RetryContext<'_>) -> bool {
        true
    }

    fn transient() -> Result<Outcome, ProcessError> {
        Err(TransportError::Transient("connection reset".into()).into())
    }

    fn not_found() -> Result<Outcome, ProcessError> {
        Err(TransportError::NotFound("no such message".into()).into())
    }

    #[tokio::test]
    async fn processes_items_in_fifo_order_per_key() {
        let worker = ScriptedWorker::default();
        let queue = engine(worker.clone(), MemoryQueueStore::new()).await;
        queue.start();

        let a = queue.enqueue("alice".into(), &1).await.unwrap();
        let b = queue.enqueue("alice".into(), &2).await.unwrap();
        let c = queue.enqueue("alice".into(), &3).await.unwrap();

        assert_eq!(a.wait().await.unwrap(), Outcome::Completed);
        assert_eq!(b.wait().await.unwrap(), Outcome::Completed);
        assert_eq!(c.wait().await.unwrap(), Outcome::Completed);

        let payloads: Vec<u32> = worker.calls().into_iter().map(|(_, p)| p).collect();
        assert_eq!(payloads, vec![1, 2, 3]);
        assert!(queue.store().is_empty());
        assert!(queue.queued(None).is_empty());
    }

    #[tokio::test]
    async fn enqueue_persists_before_start_and_start_is_idempotent() {
        let worker = ScriptedWorker::default();
        let store = MemoryQueueStore::new();
        let queue = engine(worker.clone(), store.clone()).await;

        let done = queue.enqueue("bob".into(), &7).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(queue.pending(&"bob".into()), 1);
        tokio::task::yield_now().await;
        assert!(worker.calls().is_empty());

        queue.start();
        queue.start();
        done.wait().await.unwrap();
        assert_eq!(worker.calls(), vec![("bob".to_string(), 7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_same_head_without_advancing() {
        let worker = ScriptedWorker::default();
        worker.script(1, vec![transient(), transient()]);
        let queue = engine(worker.clone(), MemoryQueueStore::new()).await;
        queue.start();

        let first = queue.enqueue("alice".into(), &1).await.unwrap();
        let second = queue.enqueue("alice".into(), &2).await.unwrap();

        first.wait().await.unwrap();
        second.wait().await.unwrap();

        let payloads: Vec<u32> = worker.calls().into_iter().map(|(_, p)| p).collect();
        assert_eq!(payloads, vec![1, 1, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_grow_between_attempts() {
        let worker = ScriptedWorker::default();
        worker.script(1, vec![transient(), transient()]);
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let queue = engine_with(worker, MemoryQueueStore::new(), backoff, EventBus::new(16)).await;
        queue.start();

        let started = tokio::time::Instant::now();
        queue.enqueue("alice".into(), &1).await.unwrap().wait().await.unwrap();
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn permanent_failure_stalls_only_that_lane() {
        let worker = ScriptedWorker::default();
        worker.script(1, vec![not_found()]);
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let store = MemoryQueueStore::new();
        let queue = engine_with(worker.clone(), store.clone(), Backoff::default(), events).await;
        queue.start();

        let stuck = queue.enqueue("alice".into(), &1).await.unwrap();
        let behind = queue.enqueue("alice".into(), &2).await.unwrap();
        let other = queue.enqueue("bob".into(), &3).await.unwrap();

        let err = stuck.wait().await.unwrap_err();
        assert!(matches!(err, QueueError::Stalled { ref key, .. } if key == "alice"));
        other.wait().await.unwrap();

        match rx.recv().await.unwrap() {
            BotEvent::Error { action, key, .. } => {
                assert_eq!(action, "send");
                assert_eq!(key.as_deref(), Some("alice"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(queue.is_stalled(&"alice".into()));
        let snapshot = queue.queued(Some(&"alice".into()));
        assert_eq!(
            snapshot.get(&QueueKey::new("alice")),
            Some(&LaneSnapshot { pending: 2, stalled: true })
        );
        assert!(!worker.calls().contains(&("alice".to_string(), 2)));
        assert_eq!(store.len(), 2);
        drop(behind);
    }

    #[tokio::test]
    async fn developer_errors_stall_even_when_policy_would_retry() {
        let worker = ScriptedWorker::default();
        worker.script(1, vec![Err(ProcessError::Developer("handler crashed".into()))]);
        let queue = QueueEngine::open(
            "receive",
            MemoryQueueStore::new(),
            worker.clone(),
            Arc::new(always_retry),
            Backoff::default(),
            EventBus::new(16),
        )
        .await
        .unwrap();
        queue.start();

        let err = queue.enqueue("ted".into(), &1).await.unwrap().wait().await.unwrap_err();
        assert!(matches!(err, QueueError::Stalled { .. }));
        assert_eq!(worker.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_max_attempts_stalls() {
        let worker = ScriptedWorker::default();
        worker.script(1, vec![transient(), transient(), transient(), transient()]);
        let backoff = Backoff::default().with_max_attempts(Some(3));
        let queue = engine_with(worker.clone(), MemoryQueueStore::new(), backoff, EventBus::new(16)).await;
        queue.start();

        let err = queue.enqueue("ted".into(), &1).await.unwrap().wait().await.unwrap_err();
        assert!(matches!(err, QueueError::Stalled { .. }));
        assert_eq!(worker.calls().len(), 3);
    }

    #[tokio::test]
    async fn reopening_after_stall_retries_the_same_head_first() {
        let store = MemoryQueueStore::new();
        let worker = ScriptedWorker::default();
        worker.script(1, vec![not_found()]);
        let queue = engine(worker.clone(), store.clone()).await;
        queue.start();
        let stuck = queue.enqueue("alice".into(), &1).await.unwrap();
        queue.enqueue("alice".into(), &2).await.unwrap();
        assert!(stuck.wait().await.is_err());
        queue.shutdown();

        let restarted_worker = ScriptedWorker::default();
        let reopened = engine(restarted_worker.clone(), store.clone()).await;
        assert_eq!(reopened.pending(&"alice".into()), 2);
        reopened.start();
        let tail = reopened.enqueue("alice".into(), &3).await.unwrap();
        tail.wait().await.unwrap();

        let payloads: Vec<u32> = restarted_worker.calls().into_iter().map(|(_, p)| p).collect();
        assert_eq!(payloads, vec![1, 2, 3]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn skipped_items_are_dequeued() {
        let worker = ScriptedWorker::default();
        worker.script(1, vec![Ok(Outcome::Skipped)]);
        let store = MemoryQueueStore::new();
        let queue = engine(worker, store.clone()).await;
        queue.start();

        let outcome = queue.enqueue("ted".into(), &1).await.unwrap().wait().await.unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clear_idle_lane_rejects_pending_completions() {
        let worker = ScriptedWorker::default();
        let store = MemoryQueueStore::new();
        let queue = engine(worker.clone(), store.clone()).await;

        let pending = queue.enqueue("ted".into(), &1).await.unwrap();
        assert_eq!(queue.clear(&"ted".into()).await.unwrap(), 1);

        assert!(matches!(pending.wait().await, Err(QueueError::Purged { .. })));
        assert!(store.is_empty());
        queue.start();
        tokio::task::yield_now().await;
        assert!(worker.calls().is_empty());
    }

    #[tokio::test]
    async fn clear_waits_for_the_in_flight_item() {
        let gate = Arc::new(Notify::new());
        let worker = ScriptedWorker {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let store = MemoryQueueStore::new();
        let queue = engine(worker.clone(), store.clone()).await;
        queue.start();

        let active = queue.enqueue("ted".into(), &1).await.unwrap();
        let queued = queue.enqueue("ted".into(), &2).await.unwrap();
        while worker.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let clearing = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.clear(&"ted".into()).await })
        };
        tokio::task::yield_now().await;
        assert!(!clearing.is_finished());

        gate.notify_one();
        clearing.await.unwrap().unwrap();

        assert_eq!(active.wait().await.unwrap(), Outcome::Completed);
        assert!(matches!(queued.wait().await, Err(QueueError::Purged { .. })));
        assert_eq!(worker.calls(), vec![("ted".to_string(), 1)]);
        assert!(store.is_empty());
        assert_eq!(queue.pending(&"ted".into()), 0);
    }

    #[tokio::test]
    async fn shutdown_fails_waiting_completions_and_keeps_items() {
        let worker = ScriptedWorker::default();
        let store = MemoryQueueStore::new();
        let queue = engine(worker.clone(), store.clone()).await;

        let first = queue.enqueue("ted".into(), &1).await.unwrap();
        let second = queue.enqueue("alice".into(), &2).await.unwrap();
        queue.shutdown();

        assert!(matches!(first.wait().await, Err(QueueError::ShutDown(name)) if name == "send"));
        assert!(matches!(second.wait().await, Err(QueueError::ShutDown(_))));
        assert_eq!(store.len(), 2);
        assert!(worker.calls().is_empty());

        let late = queue.enqueue("ted".into(), &3).await;
        assert!(matches!(late, Err(QueueError::ShutDown(_))));
        assert_eq!(store.len(), 2);

        let reopened = engine(worker.clone(), store.clone()).await;
        reopened.start();
        while !store.is_empty() {
            tokio::task::yield_now().await;
        }
        let mut payloads: Vec<u32> = worker.calls().into_iter().map(|(_, p)| p).collect();
        payloads.sort();
        assert_eq!(payloads, vec![1, 2]);
    }

    #[tokio::test]
    async fn shutdown_lets_the_in_flight_item_finish() {
        let gate = Arc::new(Notify::new());
        let worker = ScriptedWorker {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let store = MemoryQueueStore::new();
        let queue = engine(worker.clone(), store.clone()).await;
        queue.start();

        let active = queue.enqueue("ted".into(), &1).await.unwrap();
        let queued = queue.enqueue("ted".into(), &2).await.unwrap();
        while worker.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        queue.shutdown();
        assert!(matches!(queued.wait().await, Err(QueueError::ShutDown(_))));

        gate.notify_one();
        assert_eq!(active.wait().await.unwrap(), Outcome::Completed);
        assert_eq!(worker.calls(), vec![("ted".to_string(), 1)]);
        assert_eq!(store.len(), 1);
    }
}
