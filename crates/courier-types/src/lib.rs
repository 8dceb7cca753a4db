//! Shared domain types for courier.
//!
//! This crate contains the domain types used across the delivery runtime:
//! queue items, users and their history, seals, runtime events, config, and
//! the error enums every layer speaks.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, uuid, chrono,
//! thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod queue;
pub mod seal;
pub mod user;
