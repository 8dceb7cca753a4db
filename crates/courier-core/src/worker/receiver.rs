//! Inbound handling: `prereceive` veto, history append, then the `receive`
//! and `postreceive` handlers in order.

use courier_types::error::ProcessError;
use courier_types::event::BotEvent;
use courier_types::message::InboundWrapper;
use courier_types::queue::{Outcome, QueueKey};
use courier_types::user::HistoryEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::event::EventBus;
use crate::hook::{HookContext, HookEvent, HookPipeline, ReceiveContext};
use crate::queue::QueueWorker;
use crate::user::{UserRepository, UserService};

/// Payload of a receive queue item: the wrapper exactly as delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveJob {
    pub raw: Value,
}

pub struct ReceiveWorker<U> {
    users: UserService<U>,
    hooks: HookPipeline,
    events: EventBus,
}

impl<U: UserRepository> ReceiveWorker<U> {
    pub fn new(users: UserService<U>, hooks: HookPipeline, events: EventBus) -> Self {
        Self {
            users,
            hooks,
            events,
        }
    }
}

impl<U: UserRepository> QueueWorker for ReceiveWorker<U> {
    type Payload = ReceiveJob;

    async fn process(&self, _key: &QueueKey, job: &ReceiveJob) -> Result<Outcome, ProcessError> {
        let wrapper = InboundWrapper::from_value(job.raw.clone())
            .map_err(|e| ProcessError::Developer(e.to_string()))?;
        let user_id = wrapper.author.clone();
        let mut user = self
            .users
            .get(&user_id)
            .await?
            .ok_or_else(|| ProcessError::UnknownUser(user_id.clone()))?;

        let link = wrapper.message_link().map(str::to_string);
        let recorded = wrapper.to_history_value();

        let mut ctx = ReceiveContext {
            user: user.clone(),
            link: link.clone(),
            object: wrapper.payload(),
            message: wrapper.object.clone(),
            raw: job.raw.clone(),
        };
        if !self
            .hooks
            .veto(HookEvent::PreReceive, HookContext::Receive(ctx.clone()))
            .await?
        {
            debug!(%user_id, "receive vetoed by prereceive hook");
            self.events.publish(BotEvent::ReceiveSkipped { user_id });
            return Ok(Outcome::Skipped);
        }

        // A replay after a handler failure must not record the message twice.
        let replayed = link.as_deref().is_some_and(|l| user.has_inbound(l));
        if !replayed {
            let entry = HistoryEntry::inbound(recorded.clone(), link.clone());
            self.users.append_history(&user_id, &entry).await?;
            user.history.push(entry);
            ctx.user = user;
        }

        self.hooks
            .run(HookEvent::Receive, HookContext::Receive(ctx.clone()))
            .await?;
        self.hooks
            .run(HookEvent::PostReceive, HookContext::Receive(ctx))
            .await?;

        info!(%user_id, link = link.as_deref().unwrap_or("-"), "message received");
        self.events.publish(BotEvent::Message {
            user_id,
            link,
            wrapper: recorded,
        });
        Ok(Outcome::Completed)
    }
}
