//! Data layer for KinQuest (`PostgreSQL` + Redis-compatible cache).
//!
//! `PostgreSQL` is the source of truth for every document: individuals,
//! families, goals with their embedded checklists, adventure templates,
//! per-user adventure runs, and the achievement catalog. The cache holds
//! denormalized leaderboard and rank snapshots so read traffic stays off
//! the primary store. This crate provides the interface to both and owns
//! the completion unit of work that keeps them consistent.
//!
//! # Architecture
//!
//! ```text
//! Completion request
//!     |
//!     +-- CompletionService (one transaction per event, retried on races)
//!         |-- GoalStore / AdventureStore    (load + versioned save)
//!         |-- IndividualStore / FamilyStore (balances + aggregate counters)
//!         |-- RankService                   (dense rank rewrite)
//!         +-- LeaderboardCache              (best-effort snapshot refresh)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`individuals`] -- Individual document persistence
//! - [`families`] -- Family documents, aggregate counters, period resets
//! - [`goals`] -- Goal documents with embedded task checklists
//! - [`adventures`] -- Adventure templates and per-user runs
//! - [`catalog`] -- Achievement catalog persistence
//! - [`ranks`] -- Family rank recalculation
//! - [`leaderboard`] -- Redis-compatible leaderboard cache
//! - [`completion`] -- The completion unit of work
//! - [`error`] -- Shared error types

pub mod adventures;
pub mod catalog;
pub mod completion;
pub mod error;
pub mod families;
pub mod goals;
pub mod individuals;
pub mod leaderboard;
pub mod postgres;
pub mod ranks;

// Re-export primary types for convenience.
pub use adventures::AdventureStore;
pub use catalog::AchievementStore;
pub use completion::CompletionService;
pub use error::StoreError;
pub use families::FamilyStore;
pub use goals::GoalStore;
pub use individuals::IndividualStore;
pub use leaderboard::{LeaderboardCache, period_leaderboard};
pub use postgres::{PostgresConfig, PostgresPool};
pub use ranks::RankService;

/// A document paired with the version its load observed.
///
/// Saves hand the version back; the store refuses the write when the row
/// has moved on, and the caller retries from a fresh load.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    /// The deserialized document.
    pub record: T,
    /// The version column observed at load time.
    pub version: i64,
}
