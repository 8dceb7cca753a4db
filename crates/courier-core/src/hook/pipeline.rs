//! Ordered, asynchronous hook dispatch.
//!
//! Handlers run strictly one after another in registration order; each is
//! awaited before the next starts. Events whose name starts with `pre` are
//! veto points: any handler answering [`HookVerdict::Cancel`] stops the
//! chain and cancels the action.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use courier_types::error::{HookError, ValidationError};
use courier_types::seal::Seal;
use courier_types::user::User;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Error type handlers return; converted into [`HookError`] by the pipeline.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreSend,
    PreReceive,
    Receive,
    PostReceive,
    WroteSeal,
    ReadSeal,
}

impl HookEvent {
    pub const ALL: [HookEvent; 6] = [
        HookEvent::PreSend,
        HookEvent::PreReceive,
        HookEvent::Receive,
        HookEvent::PostReceive,
        HookEvent::WroteSeal,
        HookEvent::ReadSeal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HookEvent::PreSend => "presend",
            HookEvent::PreReceive => "prereceive",
            HookEvent::Receive => "receive",
            HookEvent::PostReceive => "postreceive",
            HookEvent::WroteSeal => "wroteseal",
            HookEvent::ReadSeal => "readseal",
        }
    }

    /// Veto events are the `pre*` ones.
    pub fn is_veto(self) -> bool {
        self.name().starts_with("pre")
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HookEvent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookEvent::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "event".to_string(),
                reason: format!("unknown hook event '{s}'"),
            })
    }
}

/// Passed to `presend` handlers.
#[derive(Debug, Clone)]
pub struct SendContext {
    pub user: User,
    pub object: Value,
}

/// Passed to `prereceive`, `receive` and `postreceive` handlers.
#[derive(Debug, Clone)]
pub struct ReceiveContext {
    pub user: User,
    pub link: Option<String>,
    /// The inner payload object, or `Null` when the wrapper carries none.
    pub object: Value,
    /// The signed message: the wrapper's `object`, signature included.
    pub message: Value,
    /// The wrapper exactly as the transport delivered it.
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub enum HookContext {
    Send(SendContext),
    Receive(ReceiveContext),
    Seal(Seal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookVerdict {
    #[default]
    Continue,
    Cancel,
}

/// An asynchronous hook handler.
///
/// Implemented for any `Fn(HookContext) -> impl Future<Output = Result<HookVerdict, HandlerError>>`.
pub trait Hook: Send + Sync + 'static {
    fn call(&self, ctx: HookContext) -> BoxFuture<'static, Result<HookVerdict, HandlerError>>;
}

impl<F, Fut> Hook for F
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HookVerdict, HandlerError>> + Send + 'static,
{
    fn call(&self, ctx: HookContext) -> BoxFuture<'static, Result<HookVerdict, HandlerError>> {
        Box::pin(self(ctx))
    }
}

type Handlers = HashMap<HookEvent, Vec<(u64, Arc<dyn Hook>)>>;

#[derive(Default)]
struct Registry {
    handlers: RwLock<Handlers>,
    next_id: AtomicU64,
}

impl Registry {
    // Every write is a single push or retain, so a poisoned map is still
    // consistent and is used as is.
    fn read(&self) -> RwLockReadGuard<'_, Handlers> {
        self.handlers.read().unwrap_or_else(|poisoned| {
            error!("hook registry lock poisoned; continuing with current handlers");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().unwrap_or_else(|poisoned| {
            error!("hook registry lock poisoned; continuing with current handlers");
            poisoned.into_inner()
        })
    }

    fn remove(&self, event: HookEvent, id: u64) -> bool {
        let mut handlers = self.write();
        let Some(list) = handlers.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        before != list.len()
    }
}

/// Registration token returned by [`HookPipeline::register`].
#[derive(Debug, Clone)]
pub struct HookHandle {
    id: u64,
    event: HookEvent,
    registry: Weak<Registry>,
}

impl HookHandle {
    pub fn event(&self) -> HookEvent {
        self.event
    }

    /// Remove the handler. Returns `false` if it was already removed.
    pub fn unregister(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.event, self.id))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

/// Ordered handler lists per [`HookEvent`].
#[derive(Clone, Default)]
pub struct HookPipeline {
    registry: Arc<Registry>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to the handlers for `event`.
    pub fn register(&self, event: HookEvent, hook: impl Hook) -> HookHandle {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .write()
            .entry(event)
            .or_default()
            .push((id, Arc::new(hook)));
        debug!(event = %event, id, "registered hook");
        HookHandle {
            id,
            event,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn unregister(&self, handle: &HookHandle) -> bool {
        self.registry.remove(handle.event, handle.id)
    }

    pub fn count(&self, event: HookEvent) -> usize {
        self.registry.read().get(&event).map_or(0, Vec::len)
    }

    /// Handlers registered now; later registrations do not affect a
    /// dispatch already in progress.
    fn snapshot(&self, event: HookEvent) -> Vec<Arc<dyn Hook>> {
        self.registry
            .read()
            .get(&event)
            .map(|list| list.iter().map(|(_, hook)| Arc::clone(hook)).collect())
            .unwrap_or_default()
    }

    /// Run a veto point. `Ok(true)` means proceed.
    ///
    /// Stops at the first handler that cancels or fails.
    pub async fn veto(&self, event: HookEvent, ctx: HookContext) -> Result<bool, HookError> {
        for hook in self.snapshot(event) {
            match hook.call(ctx.clone()).await {
                Ok(HookVerdict::Continue) => {}
                Ok(HookVerdict::Cancel) => {
                    debug!(event = %event, "hook vetoed action");
                    return Ok(false);
                }
                Err(e) => {
                    warn!(event = %event, error = %e, "veto hook failed");
                    return Err(HookError::new(event.name(), e.to_string()));
                }
            }
        }
        Ok(true)
    }

    /// Run every handler for `event` in order. The first failure aborts the
    /// remaining handlers.
    pub async fn run(&self, event: HookEvent, ctx: HookContext) -> Result<(), HookError> {
        for hook in self.snapshot(event) {
            if let Err(e) = hook.call(ctx.clone()).await {
                warn!(event = %event, error = %e, "hook failed");
                return Err(HookError::new(event.name(), e.to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(&str, usize)> = HookEvent::ALL
            .into_iter()
            .map(|event| (event.name(), self.count(event)))
            .filter(|(_, n)| *n > 0)
            .collect();
        f.debug_struct("HookPipeline").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    fn seal_ctx() -> HookContext {
        HookContext::Seal(Seal::requested("abc"))
    }

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        label: &'static str,
        verdict: HookVerdict,
    ) -> impl Hook {
        let log = Arc::clone(log);
        move |_ctx: HookContext| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(label.to_string());
                Ok::<_, HandlerError>(verdict)
            }
        }
    }

    #[test]
    fn event_names_round_trip_and_veto_flags() {
        for event in HookEvent::ALL {
            assert_eq!(event.name().parse::<HookEvent>().unwrap(), event);
        }
        assert!(HookEvent::PreSend.is_veto());
        assert!(HookEvent::PreReceive.is_veto());
        assert!(!HookEvent::Receive.is_veto());
        assert!(!HookEvent::WroteSeal.is_veto());
        assert!("sent".parse::<HookEvent>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn handlers_run_sequentially_in_registration_order() {
        let pipeline = HookPipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = Arc::clone(&log);
        pipeline.register(HookEvent::Receive, move |_ctx: HookContext| {
            let log = Arc::clone(&slow_log);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().unwrap().push("slow".to_string());
                Ok::<_, HandlerError>(HookVerdict::Continue)
            }
        });
        pipeline.register(HookEvent::Receive, recorder(&log, "fast", HookVerdict::Continue));

        pipeline.run(HookEvent::Receive, seal_ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn veto_stops_at_first_cancel() {
        let pipeline = HookPipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        pipeline.register(HookEvent::PreSend, recorder(&log, "a", HookVerdict::Continue));
        pipeline.register(HookEvent::PreSend, recorder(&log, "b", HookVerdict::Cancel));
        pipeline.register(HookEvent::PreSend, recorder(&log, "c", HookVerdict::Continue));

        assert!(!pipeline.veto(HookEvent::PreSend, seal_ctx()).await.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn veto_with_no_handlers_proceeds() {
        let pipeline = HookPipeline::new();
        assert!(pipeline.veto(HookEvent::PreReceive, seal_ctx()).await.unwrap());
    }

    #[tokio::test]
    async fn failure_aborts_remaining_handlers() {
        let pipeline = HookPipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        pipeline.register(HookEvent::ReadSeal, |_ctx: HookContext| async {
            Err::<HookVerdict, HandlerError>("boom".into())
        });
        pipeline.register(HookEvent::ReadSeal, recorder(&log, "after", HookVerdict::Continue));

        let err = pipeline.run(HookEvent::ReadSeal, seal_ctx()).await.unwrap_err();
        assert_eq!(err.event, "readseal");
        assert_eq!(err.message, "boom");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unregister_removes_only_that_handler() {
        let pipeline = HookPipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = pipeline.register(HookEvent::Receive, recorder(&log, "first", HookVerdict::Continue));
        pipeline.register(HookEvent::Receive, recorder(&log, "second", HookVerdict::Continue));

        assert!(first.unregister());
        assert!(!first.unregister());
        assert_eq!(pipeline.count(HookEvent::Receive), 1);

        pipeline.run(HookEvent::Receive, seal_ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[tokio::test]
    async fn poisoned_registry_keeps_accepting_handlers() {
        let pipeline = HookPipeline::new();
        let registry = Arc::clone(&pipeline.registry);
        let _ = std::thread::spawn(move || {
            let _guard = registry.handlers.write().unwrap();
            panic!("handler list writer panicked");
        })
        .join();
        assert!(pipeline.registry.handlers.is_poisoned());

        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = pipeline.register(HookEvent::Receive, recorder(&log, "late", HookVerdict::Continue));
        assert_eq!(pipeline.count(HookEvent::Receive), 1);

        pipeline.run(HookEvent::Receive, seal_ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
        assert!(handle.unregister());
    }
}
