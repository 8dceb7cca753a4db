//! The seal state machine.
//!
//! One record per link, moving strictly forward through
//! `Requested -> Pushed -> Written -> Confirmed`. Every transition runs under
//! a single lock shared with [`SealWorker`], so ledger callbacks and queue
//! pushes never interleave on the same record.

use std::sync::Arc;

use chrono::Utc;
use courier_types::error::{RepositoryError, SealError};
use courier_types::event::BotEvent;
use courier_types::queue::QueueKey;
use courier_types::seal::{ResealPolicy, Seal, SealStatus};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::repository::SealRepository;
use super::worker::{SEAL_QUEUE_KEY, SealJob, SealWorker, mark_pushed};
use crate::event::EventBus;
use crate::hook::{HookContext, HookEvent, HookPipeline};
use crate::queue::{Completion, QueueEngine, QueueStore};
use crate::worker::transport::Ledger;

pub struct SealService<R, L, Q>
where
    R: SealRepository,
    L: Ledger,
    Q: QueueStore,
{
    repo: Arc<R>,
    queue: QueueEngine<SealWorker<R, L>, Q>,
    hooks: HookPipeline,
    events: EventBus,
    reseal: ResealPolicy,
    transitions: Arc<Mutex<()>>,
}

impl<R, L, Q> SealService<R, L, Q>
where
    R: SealRepository,
    L: Ledger,
    Q: QueueStore,
{
    /// `transitions` must be the same lock the queue's [`SealWorker`] holds.
    pub fn new(
        repo: Arc<R>,
        queue: QueueEngine<SealWorker<R, L>, Q>,
        hooks: HookPipeline,
        events: EventBus,
        reseal: ResealPolicy,
        transitions: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            repo,
            queue,
            hooks,
            events,
            reseal,
            transitions,
        }
    }

    pub fn queue(&self) -> &QueueEngine<SealWorker<R, L>, Q> {
        &self.queue
    }

    /// Record a seal request for `link` and enqueue its push.
    ///
    /// Resolves once the push is durably queued; confirmation arrives later
    /// through [`on_wrote`](Self::on_wrote) and [`on_read`](Self::on_read).
    /// A link that is still in flight is rejected with
    /// [`SealError::AlreadyExists`].
    pub async fn request(&self, link: &str) -> Result<Completion, SealError> {
        validate_link(link)?;

        let _guard = self.transitions.lock().await;
        let previous = self.repo.get(link).await?;
        let fresh = Seal::requested(link);

        match &previous {
            None => self.repo.insert(&fresh).await.map_err(|e| match e {
                RepositoryError::Conflict(_) => SealError::AlreadyExists(link.to_string()),
                other => SealError::Storage(other),
            })?,
            Some(existing) if existing.status.is_in_flight() => {
                debug!(link, status = %existing.status, "rejecting duplicate seal request");
                return Err(SealError::AlreadyExists(link.to_string()));
            }
            Some(_) if self.reseal == ResealPolicy::Reject => {
                debug!(link, "rejecting reseal of confirmed link");
                return Err(SealError::AlreadyExists(link.to_string()));
            }
            Some(_) => {
                info!(link, "resealing confirmed link");
                self.repo.update(&fresh).await?;
            }
        }

        let job = SealJob {
            link: link.to_string(),
        };
        match self.queue.enqueue(QueueKey::new(SEAL_QUEUE_KEY), &job).await {
            Ok(completion) => {
                info!(link, "seal requested");
                Ok(completion)
            }
            Err(e) => {
                // Put the record back the way it was.
                let restored = match previous {
                    Some(previous) => self.repo.update(&previous).await,
                    None => self.repo.remove(link).await.map(|_| ()),
                };
                if let Err(restore_err) = restored {
                    error!(link, error = %restore_err, "failed to roll back seal record");
                }
                Err(e.into())
            }
        }
    }

    /// The ledger broadcast `link` as transaction `tx_id`.
    ///
    /// Moves the seal to `Written`. A notification for a seal the worker has
    /// not yet marked `Pushed` records the push first, so the observed
    /// statuses never skip a step. Repeating the same notification changes
    /// nothing, but re-runs the `wroteseal` hooks if they have not yet all
    /// succeeded for this transition.
    pub async fn on_wrote(&self, link: &str, tx_id: &str) -> Result<Seal, SealError> {
        validate_link(link)?;

        let (seal, replay) = {
            let _guard = self.transitions.lock().await;
            let mut seal = self
                .repo
                .get(link)
                .await?
                .ok_or_else(|| SealError::NotFound(link.to_string()))?;

            let replay = match seal.status {
                SealStatus::Requested => {
                    seal = mark_pushed(self.repo.as_ref(), &self.events, seal).await?;
                    false
                }
                SealStatus::Pushed => false,
                SealStatus::Written | SealStatus::Confirmed => {
                    if seal.tx_id.as_deref() != Some(tx_id) {
                        return Err(SealError::TxMismatch {
                            link: link.to_string(),
                            expected: seal.tx_id.unwrap_or_default(),
                            actual: tx_id.to_string(),
                        });
                    }
                    if seal.status == SealStatus::Confirmed || !seal.hooks_pending {
                        return Ok(seal);
                    }
                    true
                }
            };

            if !replay {
                seal.status = SealStatus::Written;
                seal.tx_id = Some(tx_id.to_string());
                seal.hooks_pending = true;
                seal.updated_at = Utc::now();
                self.repo.update(&seal).await?;
            }
            (seal, replay)
        };

        if replay {
            debug!(link, tx_id, "re-running wroteseal hooks");
        } else {
            info!(link, tx_id, "seal written");
            self.events.publish(BotEvent::SealWrote { seal: seal.clone() });
        }
        self.settle_hooks(HookEvent::WroteSeal, seal).await
    }

    /// The ledger observed `link` on-chain with `confirmations`.
    ///
    /// Moves a `Written` seal to `Confirmed`. For an already confirmed seal a
    /// higher count replaces the stored one without another transition, and
    /// `readseal` hooks that have not yet all succeeded run again.
    /// A seal that was never written is rejected.
    pub async fn on_read(
        &self,
        link: &str,
        tx_id: &str,
        confirmations: u32,
    ) -> Result<Seal, SealError> {
        validate_link(link)?;

        let (seal, replay) = {
            let _guard = self.transitions.lock().await;
            let mut seal = self
                .repo
                .get(link)
                .await?
                .ok_or_else(|| SealError::NotFound(link.to_string()))?;

            if let Some(existing) = seal.tx_id.as_deref() {
                if existing != tx_id {
                    return Err(SealError::TxMismatch {
                        link: link.to_string(),
                        expected: existing.to_string(),
                        actual: tx_id.to_string(),
                    });
                }
            }

            match seal.status {
                SealStatus::Requested | SealStatus::Pushed => {
                    return Err(SealError::InvalidTransition {
                        link: link.to_string(),
                        from: seal.status,
                        to: SealStatus::Confirmed,
                    });
                }
                SealStatus::Confirmed => {
                    if confirmations > seal.confirmations {
                        seal.confirmations = confirmations;
                        seal.updated_at = Utc::now();
                        self.repo.update(&seal).await?;
                        debug!(link, confirmations, "updated confirmation count");
                    }
                    if !seal.hooks_pending {
                        return Ok(seal);
                    }
                    (seal, true)
                }
                SealStatus::Written => {
                    seal.status = SealStatus::Confirmed;
                    seal.confirmations = confirmations;
                    seal.hooks_pending = true;
                    seal.updated_at = Utc::now();
                    self.repo.update(&seal).await?;
                    (seal, false)
                }
            }
        };

        if replay {
            debug!(link, tx_id, "re-running readseal hooks");
        } else {
            info!(link, tx_id, confirmations, "seal confirmed");
            self.events.publish(BotEvent::SealRead { seal: seal.clone() });
        }
        self.settle_hooks(HookEvent::ReadSeal, seal).await
    }

    pub async fn get(&self, link: &str) -> Result<Seal, SealError> {
        self.repo
            .get(link)
            .await?
            .ok_or_else(|| SealError::NotFound(link.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Seal>, SealError> {
        Ok(self.repo.list().await?)
    }

    /// Run `event`'s hooks, then clear the pending flag if the record is
    /// still in the status they were run for.
    async fn settle_hooks(&self, event: HookEvent, mut seal: Seal) -> Result<Seal, SealError> {
        self.run_hooks(event, &seal).await?;

        let _guard = self.transitions.lock().await;
        if let Some(mut current) = self.repo.get(&seal.link).await? {
            if current.status == seal.status && current.hooks_pending {
                current.hooks_pending = false;
                self.repo.update(&current).await?;
                return Ok(current);
            }
        }
        seal.hooks_pending = false;
        Ok(seal)
    }

    async fn run_hooks(&self, event: HookEvent, seal: &Seal) -> Result<(), SealError> {
        if let Err(e) = self.hooks.run(event, HookContext::Seal(seal.clone())).await {
            error!(link = %seal.link, error = %e, "seal hook failed");
            self.events.publish(BotEvent::Error {
                action: "seal".to_string(),
                key: Some(seal.link.clone()),
                message: e.to_string(),
            });
            return Err(e.into());
        }
        Ok(())
    }
}

fn validate_link(link: &str) -> Result<(), SealError> {
    if link.is_empty() {
        return Err(SealError::InvalidLink("link is empty".to_string()));
    }
    if link.chars().any(char::is_whitespace) {
        return Err(SealError::InvalidLink(format!(
            "link '{link}' contains whitespace"
        )));
    }
    Ok(())
}
