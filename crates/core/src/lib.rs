//! Tasbih Core Library
//!
//! Counter models, the atomic counter store, and the counter service that
//! enforces the join/increment/reset/completion protocol.

pub mod error;
pub mod invariants;
pub mod models;
pub mod service;
pub mod storage;

pub use error::{Error, Result};
pub use models::*;
pub use service::CounterService;
pub use storage::{CounterStore, Database, MemoryStore, ProfileStore, SqliteStore};
