//! `BotRuntime` wires the queues, workers, hooks and stores together.
//!
//! It is the facade an application talks to: enqueue sends and receives,
//! request seals, feed ledger callbacks back in, register hooks, and
//! subscribe to [`BotEvent`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use courier_types::config::RuntimeConfig;
use courier_types::error::BotError;
use courier_types::event::BotEvent;
use courier_types::message::{InboundWrapper, Outbound, validate_user_id};
use courier_types::queue::{LaneSnapshot, QueueKey};
use courier_types::seal::Seal;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::event::EventBus;
use crate::hook::HookPipeline;
use crate::queue::{
    Backoff, Completion, MemoryQueueStore, QueueEngine, QueueStore, ReceiveRetryPolicy,
    SealRetryPolicy, SendRetryPolicy,
};
use crate::seal::{MemorySealRepository, SealRepository, SealService, SealWorker};
use crate::storage::{MemorySharedStore, SharedStore};
use crate::strategy::{Strategy, StrategyRegistry};
use crate::user::{MemoryUserRepository, UserRepository, UserService};
use crate::worker::{Ledger, ReceiveJob, ReceiveWorker, SendJob, SendWorker, Transport};

/// The three queues a runtime drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Send,
    Receive,
    Seal,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Send, QueueKind::Receive, QueueKind::Seal];

    pub fn name(self) -> &'static str {
        match self {
            QueueKind::Send => "send",
            QueueKind::Receive => "receive",
            QueueKind::Seal => "seal",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(QueueKind::Send),
            "receive" => Ok(QueueKind::Receive),
            "seal" => Ok(QueueKind::Seal),
            other => Err(format!("invalid queue: '{other}'")),
        }
    }
}

/// Storage backends for one runtime. Each queue gets its own store.
pub struct RuntimeStores<U, S, H, Q> {
    pub users: U,
    pub seals: S,
    pub shared: H,
    pub send_queue: Q,
    pub receive_queue: Q,
    pub seal_queue: Q,
}

impl RuntimeStores<MemoryUserRepository, MemorySealRepository, MemorySharedStore, MemoryQueueStore> {
    /// Non-persistent stores; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            users: MemoryUserRepository::new(),
            seals: MemorySealRepository::new(),
            shared: MemorySharedStore::new(),
            send_queue: MemoryQueueStore::new(),
            receive_queue: MemoryQueueStore::new(),
            seal_queue: MemoryQueueStore::new(),
        }
    }
}

pub struct BotRuntime<
    T,
    L,
    U = MemoryUserRepository,
    S = MemorySealRepository,
    H = MemorySharedStore,
    Q = MemoryQueueStore,
> where
    T: Transport,
    L: Ledger,
    U: UserRepository,
    S: SealRepository,
    H: SharedStore,
    Q: QueueStore,
{
    config: RuntimeConfig,
    events: EventBus,
    hooks: HookPipeline,
    users: UserService<U>,
    shared: Arc<H>,
    strategies: StrategyRegistry,
    send_queue: QueueEngine<SendWorker<T, U>, Q>,
    receive_queue: QueueEngine<ReceiveWorker<U>, Q>,
    seals: SealService<S, L, Q>,
}

impl<T, L, U, S, H, Q> BotRuntime<T, L, U, S, H, Q>
where
    T: Transport,
    L: Ledger,
    U: UserRepository,
    S: SealRepository,
    H: SharedStore,
    Q: QueueStore,
{
    /// Open the runtime, restoring every persisted queue item.
    ///
    /// Queues start immediately only when `config.autostart` is set;
    /// otherwise call [`start`](Self::start) once hooks are registered.
    pub async fn open(
        config: RuntimeConfig,
        transport: T,
        ledger: L,
        stores: RuntimeStores<U, S, H, Q>,
    ) -> Result<Self, BotError> {
        let events = EventBus::new(config.event_capacity);
        let hooks = HookPipeline::new();
        let backoff = Backoff::from(&config.backoff);
        let users = UserService::new(Arc::new(stores.users), events.clone());

        let send_queue = QueueEngine::open(
            QueueKind::Send.name(),
            stores.send_queue,
            SendWorker::new(Arc::new(transport), users.clone(), hooks.clone(), events.clone()),
            Arc::new(SendRetryPolicy),
            backoff.clone(),
            events.clone(),
        )
        .await?;

        let receive_queue = QueueEngine::open(
            QueueKind::Receive.name(),
            stores.receive_queue,
            ReceiveWorker::new(users.clone(), hooks.clone(), events.clone()),
            Arc::new(ReceiveRetryPolicy),
            backoff.clone(),
            events.clone(),
        )
        .await?;

        let seal_repo = Arc::new(stores.seals);
        let transitions = Arc::new(Mutex::new(()));
        let seal_queue = QueueEngine::open(
            QueueKind::Seal.name(),
            stores.seal_queue,
            SealWorker::new(
                Arc::clone(&seal_repo),
                Arc::new(ledger),
                events.clone(),
                Arc::clone(&transitions),
            ),
            Arc::new(SealRetryPolicy),
            backoff,
            events.clone(),
        )
        .await?;
        let seals = SealService::new(
            seal_repo,
            seal_queue,
            hooks.clone(),
            events.clone(),
            config.reseal,
            transitions,
        );

        let runtime = Self {
            strategies: StrategyRegistry::new(hooks.clone()),
            shared: Arc::new(stores.shared),
            config,
            events,
            hooks,
            users,
            send_queue,
            receive_queue,
            seals,
        };

        if runtime.config.autostart {
            runtime.start();
        }
        Ok(runtime)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Start processing all three queues. Idempotent.
    pub fn start(&self) {
        info!("starting bot runtime");
        self.send_queue.start();
        self.receive_queue.start();
        self.seals.queue().start();
    }

    pub fn is_started(&self) -> bool {
        self.send_queue.is_started()
    }

    /// Queue `message` for delivery to `user_id`.
    ///
    /// Plain text is wrapped as a simple message. Invalid input is rejected
    /// here and never queued. The returned [`Completion`] resolves once this
    /// message has been delivered or vetoed.
    pub async fn send(
        &self,
        user_id: &str,
        message: impl Into<Outbound>,
    ) -> Result<Completion, BotError> {
        validate_user_id("userId", user_id)?;
        let message = message.into();
        if message.is_signed() {
            debug!(user_id, "stripping signature from outbound object");
        }
        let object = message.normalize()?;
        self.users.get_or_create(user_id).await?;

        let job = SendJob {
            user_id: user_id.to_string(),
            object,
        };
        let completion = self.send_queue.enqueue(QueueKey::new(user_id), &job).await?;
        debug!(user_id, "queued send");
        Ok(completion)
    }

    /// Queue an inbound wrapper for handling. It is keyed by its author.
    pub async fn receive(&self, raw: Value) -> Result<Completion, BotError> {
        let wrapper = InboundWrapper::from_value(raw.clone())?;
        self.users.get_or_create(&wrapper.author).await?;

        let completion = self
            .receive_queue
            .enqueue(QueueKey::new(wrapper.author.as_str()), &ReceiveJob { raw })
            .await?;
        debug!(user_id = %wrapper.author, "queued receive");
        Ok(completion)
    }

    /// Request anchoring of `link`. Resolves once the push is queued.
    pub async fn seal(&self, link: &str) -> Result<Completion, BotError> {
        Ok(self.seals.request(link).await?)
    }

    pub async fn on_wrote(&self, link: &str, tx_id: &str) -> Result<Seal, BotError> {
        Ok(self.seals.on_wrote(link, tx_id).await?)
    }

    pub async fn on_read(
        &self,
        link: &str,
        tx_id: &str,
        confirmations: u32,
    ) -> Result<Seal, BotError> {
        Ok(self.seals.on_read(link, tx_id, confirmations).await?)
    }

    pub fn seals(&self) -> &SealService<S, L, Q> {
        &self.seals
    }

    pub fn users(&self) -> &UserService<U> {
        &self.users
    }

    pub fn shared(&self) -> &H {
        &self.shared
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.events.subscribe()
    }

    /// Delete a user together with both of its queues and its history.
    ///
    /// Waits for any in-flight send or receive for the user to finish first.
    pub async fn delete_user(&self, user_id: &str) -> Result<bool, BotError> {
        let key = QueueKey::new(user_id);
        let sends = self.send_queue.clear(&key).await?;
        let receives = self.receive_queue.clear(&key).await?;
        debug!(user_id, sends, receives, "cleared user queues");
        Ok(self.users.delete(user_id).await?)
    }

    /// Delete every user and empty the send and receive queues.
    pub async fn clear_users(&self) -> Result<usize, BotError> {
        self.send_queue.clear_all().await?;
        self.receive_queue.clear_all().await?;
        Ok(self.users.clear().await?)
    }

    /// Pending items per key for one queue, or for a single key.
    pub fn queued(&self, kind: QueueKind, key: Option<&str>) -> BTreeMap<QueueKey, LaneSnapshot> {
        let key = key.map(QueueKey::new);
        match kind {
            QueueKind::Send => self.send_queue.queued(key.as_ref()),
            QueueKind::Receive => self.receive_queue.queued(key.as_ref()),
            QueueKind::Seal => self.seals.queue().queued(key.as_ref()),
        }
    }

    /// Install `strategy`, replacing any strategy with the same name.
    pub fn use_strategy(&self, strategy: &dyn Strategy) {
        self.strategies.install(strategy);
    }

    pub fn disable_strategy(&self, name: &str) -> bool {
        self.strategies.disable(name)
    }

    pub fn strategies(&self) -> Vec<String> {
        self.strategies.names()
    }

    /// Stop taking new items. Persisted work resumes on the next open.
    pub fn shutdown(&self) {
        info!("shutting down bot runtime");
        self.send_queue.shutdown();
        self.receive_queue.shutdown();
        self.seals.queue().shutdown();
    }
}
