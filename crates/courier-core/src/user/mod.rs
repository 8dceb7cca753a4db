//! User records and message history.

pub mod repository;
pub mod service;

pub use repository::{MemoryUserRepository, UserRepository};
pub use service::UserService;
