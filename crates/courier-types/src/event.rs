//! Events published by the runtime for external observers.
//!
//! `BotEvent` is purely for observability: strategies and monitoring
//! subscribe to it, while completion of work is reported through the values
//! returned by enqueue calls. All variants are Clone + Send + Sync for use
//! with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::seal::Seal;

/// Notifications emitted by the delivery runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    /// The ledger collaborator accepted a seal for submission.
    SealPushed { link: String },

    /// A seal was broadcast with a known transaction id.
    SealWrote { seal: Seal },

    /// A seal was observed on-chain.
    SealRead { seal: Seal },

    UserCreated { user_id: String },

    UserUpdated { user_id: String },

    UserDeleted { user_id: String },

    /// Every user (and every send/receive lane) was cleared.
    UsersCleared,

    /// An inbound message went through all receive handlers.
    Message {
        user_id: String,
        link: Option<String>,
        wrapper: serde_json::Value,
    },

    /// An outbound message was delivered by the transport.
    Sent {
        user_id: String,
        record: serde_json::Value,
    },

    /// A `presend` hook vetoed a send.
    SendSkipped { user_id: String },

    /// A `prereceive` hook vetoed a receive.
    ReceiveSkipped { user_id: String },

    /// A lane stalled or a post-action hook failed. Never swallowed.
    Error {
        /// `send`, `receive`, or `seal`.
        action: String,
        key: Option<String>,
        message: String,
    },
}

impl BotEvent {
    /// Stable dotted name of the event, e.g. `seal:push` or `user:delete`.
    pub fn name(&self) -> &'static str {
        match self {
            BotEvent::SealPushed { .. } => "seal:push",
            BotEvent::SealWrote { .. } => "seal:wrote",
            BotEvent::SealRead { .. } => "seal:read",
            BotEvent::UserCreated { .. } => "user:create",
            BotEvent::UserUpdated { .. } => "user:update",
            BotEvent::UserDeleted { .. } => "user:delete",
            BotEvent::UsersCleared => "user:clear",
            BotEvent::Message { .. } => "message",
            BotEvent::Sent { .. } => "sent",
            BotEvent::SendSkipped { .. } => "send:skip",
            BotEvent::ReceiveSkipped { .. } => "receive:skip",
            BotEvent::Error { .. } => "error",
        }
    }
}
