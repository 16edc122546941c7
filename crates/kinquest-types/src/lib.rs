//! Shared type definitions for the KinQuest backend.
//!
//! This crate is the single source of truth for all types used across the
//! KinQuest workspace. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the family app client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Enumeration types (scopes, roles, statuses, period buckets)
//! - [`structs`] -- Core entity structs (individuals, families, goals, adventures)
//! - [`awards`] -- Reward and ranking payloads returned to the request layer

pub mod awards;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use awards::{
    AggregateOutcome, CompletionAward, CompletionReceipt, FamilyDelta, LeaderboardEntry,
    RankedMember,
};
pub use enums::{AdventureStatus, FamilyRole, PeriodBucket, Scope};
pub use ids::{AchievementId, AdventureId, ChallengeId, FamilyId, GoalId, TaskId, UserId};
pub use structs::{
    Achievement, Adventure, AdventureProgress, Challenge, ChallengeProgress, Family, FamilyMember,
    Goal, GoalOwner, GoalRewards, Individual, PeriodTotals, Rewards, Task, UnlockedAchievement,
    completion_percent,
};

#[cfg(test)]
mod tests {
    //! Integration tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs generates TypeScript bindings when types with
        // #[ts(export)] are used. Importing them here triggers generation.
        // The actual files are written to the `bindings/` directory
        // relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::UserId::export_all();
        let _ = crate::ids::FamilyId::export_all();
        let _ = crate::ids::GoalId::export_all();
        let _ = crate::ids::TaskId::export_all();
        let _ = crate::ids::AdventureId::export_all();
        let _ = crate::ids::ChallengeId::export_all();
        let _ = crate::ids::AchievementId::export_all();

        // Enums
        let _ = crate::enums::Scope::export_all();
        let _ = crate::enums::FamilyRole::export_all();
        let _ = crate::enums::AdventureStatus::export_all();
        let _ = crate::enums::PeriodBucket::export_all();

        // Structs
        let _ = crate::structs::Rewards::export_all();
        let _ = crate::structs::GoalRewards::export_all();
        let _ = crate::structs::Task::export_all();
        let _ = crate::structs::GoalOwner::export_all();
        let _ = crate::structs::Goal::export_all();
        let _ = crate::structs::Challenge::export_all();
        let _ = crate::structs::Adventure::export_all();
        let _ = crate::structs::ChallengeProgress::export_all();
        let _ = crate::structs::AdventureProgress::export_all();
        let _ = crate::structs::Achievement::export_all();
        let _ = crate::structs::UnlockedAchievement::export_all();
        let _ = crate::structs::Individual::export_all();
        let _ = crate::structs::PeriodTotals::export_all();
        let _ = crate::structs::FamilyMember::export_all();
        let _ = crate::structs::Family::export_all();

        // Awards
        let _ = crate::awards::FamilyDelta::export_all();
        let _ = crate::awards::CompletionAward::export_all();
        let _ = crate::awards::AggregateOutcome::export_all();
        let _ = crate::awards::RankedMember::export_all();
        let _ = crate::awards::LeaderboardEntry::export_all();
        let _ = crate::awards::CompletionReceipt::export_all();
    }
}
