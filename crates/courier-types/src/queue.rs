//! Durable queue domain types.
//!
//! A queue is partitioned into lanes by [`QueueKey`]. Each lane is an
//! independent FIFO of [`QueueItem`]s; ordering is only guaranteed within a
//! lane.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier partitioning a queue into independent lanes.
///
/// For send and receive queues this is the user id; the seal queue uses a
/// single constant key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueKey(String);

impl QueueKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for QueueKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Processing state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemState {
    /// Waiting for its turn at the head of the lane.
    Pending,
    /// Currently being processed by the lane's worker.
    Active,
    /// Failed permanently; the lane is halted with this item at its head.
    Stalled,
}

impl fmt::Display for QueueItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueItemState::Pending => write!(f, "pending"),
            QueueItemState::Active => write!(f, "active"),
            QueueItemState::Stalled => write!(f, "stalled"),
        }
    }
}

/// A single durable unit of work in a lane.
///
/// The payload is stored as JSON so one storage port serves every queue;
/// the engine converts to and from its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// UUIDv7 item id (time-sortable).
    pub id: Uuid,
    pub key: QueueKey,
    pub payload: serde_json::Value,
    /// Number of failed processing attempts so far.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub state: QueueItemState,
}

impl QueueItem {
    /// Build a fresh pending item for `key`.
    pub fn new(key: QueueKey, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            key,
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
            state: QueueItemState::Pending,
        }
    }
}

/// Terminal successful outcome of processing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The worker performed the action.
    Completed,
    /// A veto hook cancelled the action. Still terminal: the item is dequeued.
    Skipped,
}

/// Introspection view of one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSnapshot {
    /// Items still in the lane, including the one being processed.
    pub pending: usize,
    pub stalled: bool,
}
