//! Streak and rollup aggregation engine for Cadence.
//!
//! The engine keeps an append-only log of habit completion events,
//! derives a current/longest streak per habit on every write, and serves
//! cached day/week/month completion rollups per user. [`TrackerService`]
//! is the operation surface the HTTP layer calls.

mod db;
mod directory;
mod error;
mod event_store;
mod recalc;
mod rollup;
mod service;
mod streak;

pub use directory::{DirectoryResolver, DirectoryStore, RemoteDirectory};
pub use error::CadenceError;
pub use event_store::EventStore;
pub use recalc::Recalculator;
pub use rollup::{RollupCalculator, RollupStore};
pub use service::TrackerService;
pub use streak::{compute_streak, StreakOutcome, StreakStore, StreakTracker};

/// Result type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;
