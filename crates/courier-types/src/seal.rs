//! Seal records: requests to anchor a content digest on an external ledger.
//!
//! A seal moves strictly forward through
//! `Requested -> Pushed -> Written -> Confirmed`. The link is the natural
//! primary key and the idempotency boundary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealStatus {
    /// Recorded locally, push not yet accepted by the ledger collaborator.
    Requested,
    /// Accepted by the ledger collaborator for submission.
    Pushed,
    /// Broadcast; a transaction id is known.
    Written,
    /// Observed on-chain with at least one confirmation.
    Confirmed,
}

impl SealStatus {
    /// The only status this one may advance to.
    pub fn next(self) -> Option<SealStatus> {
        match self {
            SealStatus::Requested => Some(SealStatus::Pushed),
            SealStatus::Pushed => Some(SealStatus::Written),
            SealStatus::Written => Some(SealStatus::Confirmed),
            SealStatus::Confirmed => None,
        }
    }

    /// Whether a new request for the same link must be rejected outright.
    pub fn is_in_flight(self) -> bool {
        self != SealStatus::Confirmed
    }
}

impl fmt::Display for SealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SealStatus::Requested => write!(f, "requested"),
            SealStatus::Pushed => write!(f, "pushed"),
            SealStatus::Written => write!(f, "written"),
            SealStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

impl std::str::FromStr for SealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(SealStatus::Requested),
            "pushed" => Ok(SealStatus::Pushed),
            "written" => Ok(SealStatus::Written),
            "confirmed" => Ok(SealStatus::Confirmed),
            other => Err(format!("invalid seal status: '{other}'")),
        }
    }
}

/// One seal per link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    pub link: String,
    pub status: SealStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub confirmations: u32,
    /// The hooks of the last transition have not all succeeded yet. A
    /// repeated ledger callback for that transition runs them again.
    #[serde(default)]
    pub hooks_pending: bool,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Seal {
    /// A freshly requested seal for `link`.
    pub fn requested(link: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            link: link.into(),
            status: SealStatus::Requested,
            tx_id: None,
            confirmations: 0,
            hooks_pending: false,
            requested_at: now,
            updated_at: now,
        }
    }
}

/// What to do when a link is requested again after it was confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResealPolicy {
    /// Treat it as a new, independent anchoring request.
    #[default]
    Allow,
    /// Reject like any other duplicate.
    Reject,
}
