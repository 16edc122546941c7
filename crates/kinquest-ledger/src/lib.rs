//! Reward, aggregate, and ranking engine for KinQuest.
//!
//! This crate holds the rules that keep stars, coins, completion
//! percentages, family totals, and ranks mutually consistent. It is pure
//! synchronous computation over already-loaded documents: no I/O, no
//! clocks, no global state. The data layer loads documents, calls in here,
//! and persists whatever comes back.
//!
//! # Engine parts
//!
//! | Part | Operation | Effect |
//! |------|-----------|--------|
//! | [`rewards`] | `complete_task` | Marks a task done, pays its reward, cascades to goal completion and achievement unlocks |
//! | [`rewards`] | `complete_challenge` | Marks a challenge done, cascades to adventure completion |
//! | [`aggregate`] | `apply_family_delta` | Folds one completion event into the family lifetime and period counters |
//! | [`aggregate`] | `reset_period` | Zeroes one period bucket at its calendar boundary |
//! | [`ranking`] | `dense_ranks` | Dense tie-aware ranking by (stars, tasks completed) descending |
//!
//! # Invariants
//!
//! - Task and challenge completion is monotonic: `false -> true` only, and
//!   a second attempt is an error, never a silent no-op.
//! - A goal's `progress` is exactly 100 iff every task is complete; a goal
//!   with no tasks stays at 0 and never auto-completes.
//! - Every operation takes owned snapshots and returns updated ones;
//!   nothing is mutated behind the caller's back.
//! - All counter arithmetic is checked; overflow surfaces as an error
//!   instead of wrapping.
//!
//! # Example
//!
//! ```
//! use kinquest_ledger::ranking::{Standing, dense_ranks};
//!
//! let standings = vec![
//!     Standing { id: "ada", stars: 100, tasks_completed: 5 },
//!     Standing { id: "ben", stars: 100, tasks_completed: 5 },
//!     Standing { id: "casey", stars: 90, tasks_completed: 1 },
//! ];
//!
//! // Ada and Ben tie for rank 1; Casey is rank 2, not rank 3.
//! let ranked = dense_ranks(&standings);
//! let ranks: Vec<u32> = ranked.iter().map(|r| r.rank).collect();
//! assert_eq!(ranks, vec![1, 1, 2]);
//! ```

pub mod aggregate;
pub mod catalog;
pub mod ranking;
pub mod rewards;

pub use aggregate::{apply_family_delta, reset_period};
pub use catalog::{AchievementCatalog, InMemoryCatalog};
pub use ranking::{Ranked, Standing, dense_ranks};
pub use rewards::{Actor, ChallengeCompletion, TaskCompletion, complete_challenge, complete_task};

use kinquest_types::{AchievementId, AdventureId, ChallengeId, GoalId, TaskId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The coarse category of an engine failure.
///
/// The request layer maps kinds to HTTP status codes; the engine itself
/// only ever produces the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced document or sub-unit does not resolve.
    NotFound,
    /// The operation was already performed; nothing changed.
    AlreadyCompleted,
    /// The documents contradict each other or the operation's preconditions.
    InvalidState,
    /// The data layer failed; the event was not applied.
    Persistence,
}

/// Errors produced while applying a completion event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The referenced task is not in the goal's checklist.
    #[error("task {task_id} not found in goal {goal_id}")]
    TaskNotFound {
        /// The goal that was searched.
        goal_id: GoalId,
        /// The missing task.
        task_id: TaskId,
    },

    /// The referenced challenge is not in the adventure template.
    #[error("challenge {challenge_id} not found in adventure {adventure_id}")]
    ChallengeNotFound {
        /// The adventure template that was searched.
        adventure_id: AdventureId,
        /// The missing challenge.
        challenge_id: ChallengeId,
    },

    /// A goal references an achievement the catalog no longer contains.
    #[error("achievement {achievement_id} not found in catalog")]
    AchievementNotFound {
        /// The dangling achievement reference.
        achievement_id: AchievementId,
    },

    /// The task was already completed; completion is monotonic.
    #[error("task {task_id} is already completed")]
    TaskAlreadyCompleted {
        /// The task that was re-submitted.
        task_id: TaskId,
    },

    /// The challenge was already completed; completion is monotonic.
    #[error("challenge {challenge_id} is already completed")]
    ChallengeAlreadyCompleted {
        /// The challenge that was re-submitted.
        challenge_id: ChallengeId,
    },

    /// The holder already unlocked this achievement.
    #[error("achievement {achievement_id} is already unlocked")]
    AchievementAlreadyUnlocked {
        /// The achievement that was unlocked before.
        achievement_id: AchievementId,
    },

    /// An open task was submitted against a goal already marked complete.
    #[error("goal {goal_id} is already completed but has open tasks")]
    GoalAlreadyCompleted {
        /// The inconsistent goal.
        goal_id: GoalId,
    },

    /// An open challenge was submitted against a run already marked complete.
    #[error("adventure {adventure_id} run is already completed but has open challenges")]
    AdventureAlreadyCompleted {
        /// The inconsistent adventure run.
        adventure_id: AdventureId,
    },

    /// The acting entity does not own the goal.
    #[error("actor does not own goal {goal_id}")]
    WrongActor {
        /// The goal whose owner disagrees with the actor.
        goal_id: GoalId,
    },

    /// The progress record belongs to a different adventure or user.
    #[error("progress record does not match adventure {adventure_id}")]
    RunMismatch {
        /// The adventure template the caller named.
        adventure_id: AdventureId,
    },

    /// The progress checklist disagrees with the template's challenge list.
    #[error(
        "progress for adventure {adventure_id} tracks {found} challenges, template has {expected}"
    )]
    ProgressDesync {
        /// The adventure whose run is out of sync.
        adventure_id: AdventureId,
        /// Challenge count in the template.
        expected: usize,
        /// Challenge count in the progress record.
        found: usize,
    },

    /// A counter would overflow; the event is rejected unapplied.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Which counter overflowed.
        context: &'static str,
    },
}

impl EngineError {
    /// The coarse category of this error, for status-code mapping.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TaskNotFound { .. }
            | Self::ChallengeNotFound { .. }
            | Self::AchievementNotFound { .. } => ErrorKind::NotFound,
            Self::TaskAlreadyCompleted { .. }
            | Self::ChallengeAlreadyCompleted { .. }
            | Self::AchievementAlreadyUnlocked { .. } => ErrorKind::AlreadyCompleted,
            Self::GoalAlreadyCompleted { .. }
            | Self::AdventureAlreadyCompleted { .. }
            | Self::WrongActor { .. }
            | Self::RunMismatch { .. }
            | Self::ProgressDesync { .. }
            | Self::ArithmeticOverflow { .. } => ErrorKind::InvalidState,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_partition_the_error_space() {
        let not_found = EngineError::TaskNotFound {
            goal_id: GoalId::new(),
            task_id: TaskId::new(),
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let dup = EngineError::TaskAlreadyCompleted {
            task_id: TaskId::new(),
        };
        assert_eq!(dup.kind(), ErrorKind::AlreadyCompleted);

        let desync = EngineError::ProgressDesync {
            adventure_id: AdventureId::new(),
            expected: 3,
            found: 2,
        };
        assert_eq!(desync.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn errors_render_their_ids() {
        let task_id = TaskId::new();
        let err = EngineError::TaskAlreadyCompleted { task_id };
        assert!(err.to_string().contains(&task_id.to_string()));
    }
}
