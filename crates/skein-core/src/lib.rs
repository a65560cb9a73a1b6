//! skein-core - Core library for Skein
//!
//! The offline-first sync engine shared by every Skein interface: a durable
//! local store, a write-intent operation queue, connectivity monitoring,
//! exit-flush triggers, and the reconciliation service that ties them
//! together.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit;
pub mod models;
pub mod net;
pub mod queue;
pub mod remote;
pub mod store;
pub mod sync;
mod util;

pub use config::EngineConfig;
pub use engine::{DraftSnapshot, SyncEngine};
pub use error::{Error, Result};
pub use models::{ConflictStrategy, SegmentId, Story, StoryId, StorySegment, SyncReport};
