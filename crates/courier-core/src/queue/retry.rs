//! Retry predicates deciding whether a failed item is retried or stalls its lane.
//!
//! Classification is delegated entirely to a [`RetryPolicy`] injected per
//! traffic class. Developer errors never reach the policy: the engine stalls
//! on them unconditionally.

use courier_types::error::{LedgerError, ProcessError, TransportError};
use courier_types::queue::QueueKey;

/// Everything a policy may look at when an attempt fails.
#[derive(Debug)]
pub struct RetryContext<'a> {
    /// Name of the queue (`send`, `receive`, `seal`).
    pub queue: &'a str,
    pub key: &'a QueueKey,
    /// Failed attempts so far, including this one.
    pub attempts: u32,
    pub error: &'a ProcessError,
}

/// Decides whether a failed attempt should be retried.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool;
}

impl<F> RetryPolicy for F
where
    F: Fn(&RetryContext<'_>) -> bool + Send + Sync,
{
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        self(ctx)
    }
}

/// Outbound sends: retry unless the message can never be delivered.
///
/// Not-found, duplicate, and unknown-user failures are permanent for the
/// message; retrying them forever would only hide a stuck lane.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendRetryPolicy;

impl RetryPolicy for SendRetryPolicy {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        !matches!(
            ctx.error,
            ProcessError::Transport(
                TransportError::NotFound(_)
                    | TransportError::Duplicate(_)
                    | TransportError::UnknownUser(_)
            ) | ProcessError::UnknownUser(_)
        )
    }
}

/// Inbound receives: retry everything except a vanished user.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiveRetryPolicy;

impl RetryPolicy for ReceiveRetryPolicy {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        !matches!(ctx.error, ProcessError::UnknownUser(_))
    }
}

/// Seal pushes: retry unless the ledger rejected the submission outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealRetryPolicy;

impl RetryPolicy for SealRetryPolicy {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> bool {
        !matches!(ctx.error, ProcessError::Ledger(LedgerError::Rejected(_)))
    }
}
