//! Durable per-key FIFO queues.
//!
//! - `engine` -- `QueueEngine`: one in-flight item per key, backoff-governed
//!   retry, lane stall on non-retryable failure
//! - `store` -- `QueueStore` port plus the in-memory adapter
//! - `retry` -- `RetryPolicy` predicates per traffic class
//! - `backoff` -- capped exponential delays

pub mod backoff;
pub mod engine;
pub mod retry;
pub mod store;

pub use backoff::Backoff;
pub use engine::{Completion, QueueEngine, QueueWorker};
pub use retry::{ReceiveRetryPolicy, RetryContext, RetryPolicy, SealRetryPolicy, SendRetryPolicy};
pub use store::{MemoryQueueStore, QueueStore};
