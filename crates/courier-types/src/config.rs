//! Runtime configuration types.
//!
//! `RuntimeConfig` represents `config.toml` in the data directory. Every
//! field has a default, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};

use crate::seal::ResealPolicy;

/// Top-level configuration for a bot runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Start processing queues as soon as the runtime is opened.
    #[serde(default)]
    pub autostart: bool,

    /// Capacity of the broadcast channel carrying [`crate::event::BotEvent`]s.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Whether a confirmed link may be sealed again.
    #[serde(default)]
    pub reseal: ResealPolicy,

    /// Retry timing shared by the send, receive, and seal queues.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            event_capacity: default_event_capacity(),
            reseal: ResealPolicy::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff between retries of a failed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Randomisation factor in `0.0..=1.0`. Zero keeps retries deterministic.
    #[serde(default)]
    pub jitter: f64,

    /// Give up (and stall the lane) after this many failed attempts.
    /// Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: 0.0,
            max_attempts: None,
        }
    }
}
