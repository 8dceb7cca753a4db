//! Infrastructure adapters for courier.
//!
//! SQLite implementations of the storage ports in `courier-core`, the
//! `config.toml` loader, and data directory resolution.

pub mod config;
pub mod filesystem;
pub mod sqlite;
