//! Pluggable bot strategies.
//!
//! A strategy is a bundle of hook handlers installed together and removed
//! together. Installing a strategy under a name that is already in use
//! replaces the previous one.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::hook::{HookHandle, HookPipeline};

pub trait Strategy: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Register this strategy's handlers, returning their handles.
    fn install(&self, hooks: &HookPipeline) -> Vec<HookHandle>;
}

/// Strategies currently installed on one hook pipeline.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    hooks: HookPipeline,
    installed: Arc<Mutex<BTreeMap<String, Vec<HookHandle>>>>,
}

impl StrategyRegistry {
    pub fn new(hooks: HookPipeline) -> Self {
        Self {
            hooks,
            installed: Arc::default(),
        }
    }

    pub fn install(&self, strategy: &dyn Strategy) {
        let name = strategy.name().to_string();
        self.disable(&name);
        let handles = strategy.install(&self.hooks);
        info!(strategy = %name, handlers = handles.len(), "installed strategy");
        if let Ok(mut installed) = self.installed.lock() {
            installed.insert(name, handles);
        }
    }

    /// Remove every handler `name` installed. Returns whether it was installed.
    pub fn disable(&self, name: &str) -> bool {
        let handles = match self.installed.lock() {
            Ok(mut installed) => installed.remove(name),
            Err(_) => None,
        };
        match handles {
            Some(handles) => {
                for handle in &handles {
                    handle.unregister();
                }
                info!(strategy = name, "disabled strategy");
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.installed
            .lock()
            .map(|installed| installed.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{HandlerError, HookContext, HookEvent, HookVerdict};

    struct Mute;

    impl Strategy for Mute {
        fn name(&self) -> &str {
            "mute"
        }

        fn install(&self, hooks: &HookPipeline) -> Vec<HookHandle> {
            vec![hooks.register(HookEvent::PreSend, |_ctx: HookContext| async {
                Ok::<_, HandlerError>(HookVerdict::Cancel)
            })]
        }
    }

    #[test]
    fn reinstalling_replaces_and_disable_removes() {
        let hooks = HookPipeline::new();
        let strategies = StrategyRegistry::new(hooks.clone());

        strategies.install(&Mute);
        strategies.install(&Mute);
        assert_eq!(hooks.count(HookEvent::PreSend), 1);
        assert_eq!(strategies.names(), vec!["mute"]);

        assert!(strategies.disable("mute"));
        assert!(!strategies.disable("mute"));
        assert_eq!(hooks.count(HookEvent::PreSend), 0);
    }
}
