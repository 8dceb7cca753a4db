//! Queue worker pushing requested seals to the ledger.

use std::sync::Arc;

use chrono::Utc;
use courier_types::error::{ProcessError, RepositoryError};
use courier_types::event::BotEvent;
use courier_types::queue::{Outcome, QueueKey};
use courier_types::seal::{Seal, SealStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::repository::SealRepository;
use crate::event::EventBus;
use crate::queue::QueueWorker;
use crate::worker::transport::Ledger;

/// Every seal push shares one lane.
pub const SEAL_QUEUE_KEY: &str = "seals";

/// Payload of a seal queue item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealJob {
    pub link: String,
}

pub struct SealWorker<R, L> {
    repo: Arc<R>,
    ledger: Arc<L>,
    events: EventBus,
    /// Shared with `SealService`; serializes status transitions.
    transitions: Arc<Mutex<()>>,
}

impl<R: SealRepository, L: Ledger> SealWorker<R, L> {
    pub fn new(
        repo: Arc<R>,
        ledger: Arc<L>,
        events: EventBus,
        transitions: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            repo,
            ledger,
            events,
            transitions,
        }
    }
}

impl<R: SealRepository, L: Ledger> QueueWorker for SealWorker<R, L> {
    type Payload = SealJob;

    async fn process(&self, _key: &QueueKey, job: &SealJob) -> Result<Outcome, ProcessError> {
        match self.repo.get(&job.link).await? {
            None => {
                warn!(link = %job.link, "seal record missing, dropping push");
                return Ok(Outcome::Skipped);
            }
            Some(seal) if seal.status != SealStatus::Requested => {
                debug!(link = %job.link, status = %seal.status, "seal already pushed");
                return Ok(Outcome::Completed);
            }
            Some(_) => {}
        }

        self.ledger.request_seal(&job.link).await?;

        let _guard = self.transitions.lock().await;
        if let Some(seal) = self.repo.get(&job.link).await? {
            if seal.status == SealStatus::Requested {
                mark_pushed(self.repo.as_ref(), &self.events, seal).await?;
            }
        }
        Ok(Outcome::Completed)
    }
}

/// Move a `Requested` seal to `Pushed` and announce it. Caller holds the
/// transition lock.
pub(crate) async fn mark_pushed<R: SealRepository>(
    repo: &R,
    events: &EventBus,
    mut seal: Seal,
) -> Result<Seal, RepositoryError> {
    seal.status = SealStatus::Pushed;
    seal.updated_at = Utc::now();
    repo.update(&seal).await?;
    info!(link = %seal.link, "seal pushed");
    events.publish(BotEvent::SealPushed {
        link: seal.link.clone(),
    });
    Ok(seal)
}
