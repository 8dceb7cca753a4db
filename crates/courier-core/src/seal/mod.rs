//! Seal reconciliation: per-link anchoring requests tracked to confirmation.

pub mod repository;
pub mod service;
pub mod worker;

pub use repository::{MemorySealRepository, SealRepository};
pub use service::SealService;
pub use worker::{SEAL_QUEUE_KEY, SealJob, SealWorker};
