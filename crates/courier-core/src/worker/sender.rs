//! Outbound delivery: `presend` veto, transport call, history append.

use std::sync::Arc;

use courier_types::error::ProcessError;
use courier_types::event::BotEvent;
use courier_types::queue::{Outcome, QueueKey};
use courier_types::user::HistoryEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::transport::Transport;
use crate::event::EventBus;
use crate::hook::{HookContext, HookEvent, HookPipeline, SendContext};
use crate::queue::QueueWorker;
use crate::user::{UserRepository, UserService};

/// Payload of a send queue item. The object is already normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendJob {
    pub user_id: String,
    pub object: Value,
}

pub struct SendWorker<T, U> {
    transport: Arc<T>,
    users: UserService<U>,
    hooks: HookPipeline,
    events: EventBus,
}

impl<T: Transport, U: UserRepository> SendWorker<T, U> {
    pub fn new(
        transport: Arc<T>,
        users: UserService<U>,
        hooks: HookPipeline,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            users,
            hooks,
            events,
        }
    }
}

impl<T: Transport, U: UserRepository> QueueWorker for SendWorker<T, U> {
    type Payload = SendJob;

    async fn process(&self, _key: &QueueKey, job: &SendJob) -> Result<Outcome, ProcessError> {
        let user = self
            .users
            .get(&job.user_id)
            .await?
            .ok_or_else(|| ProcessError::UnknownUser(job.user_id.clone()))?;

        let ctx = HookContext::Send(SendContext {
            user,
            object: job.object.clone(),
        });
        if !self.hooks.veto(HookEvent::PreSend, ctx).await? {
            debug!(user_id = %job.user_id, "send vetoed by presend hook");
            self.events.publish(BotEvent::SendSkipped {
                user_id: job.user_id.clone(),
            });
            return Ok(Outcome::Skipped);
        }

        let record = self.transport.send(&job.user_id, &job.object).await?;
        self.users
            .append_history(&job.user_id, &HistoryEntry::outbound(record.clone()))
            .await?;

        info!(user_id = %job.user_id, "message sent");
        self.events.publish(BotEvent::Sent {
            user_id: job.user_id.clone(),
            record,
        });
        Ok(Outcome::Completed)
    }
}
