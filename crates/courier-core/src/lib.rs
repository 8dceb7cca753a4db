//! Delivery and anchoring core for courier.
//!
//! This crate owns the reliable machinery: per-key durable FIFO queues with
//! backoff and stall-on-fatal semantics, the veto/sequential hook pipeline,
//! the seal confirmation state machine, and the send/receive workers that
//! tie them together. Storage is reached only through the port traits
//! defined here; in-memory adapters ship alongside them, SQLite adapters
//! live in courier-infra.

pub mod event;
pub mod hook;
pub mod queue;
pub mod runtime;
pub mod seal;
pub mod storage;
pub mod strategy;
pub mod user;
pub mod worker;

pub use runtime::BotRuntime;
