//! Bot-wide key/value storage shared by strategies.

pub mod shared;

pub use shared::{MemorySharedStore, SharedStore};
