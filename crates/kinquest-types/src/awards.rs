//! Reward and ranking payloads returned to the request layer.
//!
//! Everything a completion event produces for JSON serialization lives
//! here: the award summary, the family aggregate outcome, and the ranked
//! standings the clients render as leaderboards.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{FamilyId, UserId};
use crate::structs::UnlockedAchievement;

// ---------------------------------------------------------------------------
// Family delta
// ---------------------------------------------------------------------------

/// The family-level effect of one completion event.
///
/// Derived from the award totals by the completion flow and applied to the
/// family's lifetime and period counters in one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FamilyDelta {
    /// Stars to add to the lifetime total and every period bucket.
    pub stars: u64,
    /// Whether a task completed, bumping every period task bucket by one.
    pub task_completed: bool,
}

impl FamilyDelta {
    /// Delta for a task completion event. Bumps the period task counters.
    pub const fn for_task(stars: u64) -> Self {
        Self {
            stars,
            task_completed: true,
        }
    }

    /// Delta for a challenge completion event.
    ///
    /// Challenges are not tasks; only the star counters move.
    pub const fn for_challenge(stars: u64) -> Self {
        Self {
            stars,
            task_completed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Completion award
// ---------------------------------------------------------------------------

/// What one completion call paid out, cascade included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CompletionAward {
    /// Total stars granted by this call (sub-unit plus any parent cascade).
    pub stars: u64,
    /// Total coins granted by this call (sub-unit plus any parent cascade).
    pub coins: u64,
    /// Whether this call completed the parent container (goal or adventure).
    pub parent_completed: bool,
    /// The achievement unlocked by the cascade, if any.
    pub unlocked: Option<UnlockedAchievement>,
}

impl CompletionAward {
    /// Whether the call granted anything at all.
    pub const fn is_empty(&self) -> bool {
        self.stars == 0 && self.coins == 0 && !self.parent_completed && self.unlocked.is_none()
    }
}

// ---------------------------------------------------------------------------
// Aggregate outcome
// ---------------------------------------------------------------------------

/// Whether the family aggregates were updated for a completion event.
///
/// Completing without a family is normal, not a failure; the skip is
/// reported here so callers and logs can see it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum AggregateOutcome {
    /// The family counters were updated.
    Applied {
        /// The family that absorbed the delta.
        family_id: FamilyId,
        /// Lifetime star total after the update.
        total_stars: u64,
    },
    /// The actor has no family; no aggregate was touched.
    SkippedNoFamily,
    /// The event added no stars and completed no task; the counters were
    /// left untouched.
    SkippedEmptyDelta,
}

impl AggregateOutcome {
    /// Whether the delta reached a family document.
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// One member's position in the family standings after a recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RankedMember {
    /// The ranked member.
    pub member_id: UserId,
    /// Lifetime stars at ranking time.
    pub stars: u64,
    /// Lifetime completed tasks at ranking time (tiebreak key).
    pub tasks_completed: u64,
    /// Dense rank, starting at 1. Ties share a rank; no gaps follow ties.
    pub rank: u32,
}

/// One family's position on a period leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LeaderboardEntry {
    /// The ranked family.
    pub family_id: FamilyId,
    /// Family display name.
    pub name: String,
    /// Stars in the requested period bucket.
    pub stars: u64,
    /// Tasks completed in the requested period bucket (tiebreak key).
    pub tasks_completed: u64,
    /// Dense rank, starting at 1.
    pub rank: u32,
}

// ---------------------------------------------------------------------------
// Completion receipt
// ---------------------------------------------------------------------------

/// The full result of one completion event, ready for the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CompletionReceipt {
    /// What the call paid out.
    pub award: CompletionAward,
    /// Whether the family aggregates absorbed the delta.
    pub aggregate: AggregateOutcome,
    /// Fresh family standings after rank recalculation.
    ///
    /// Empty when no member's counters changed or the actor has no
    /// family.
    pub ranks: Vec<RankedMember>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_delta_bumps_task_counters() {
        let delta = FamilyDelta::for_task(60);
        assert_eq!(delta.stars, 60);
        assert!(delta.task_completed);
    }

    #[test]
    fn challenge_delta_leaves_task_counters() {
        let delta = FamilyDelta::for_challenge(100);
        assert_eq!(delta.stars, 100);
        assert!(!delta.task_completed);
    }

    #[test]
    fn empty_award_detection() {
        let award = CompletionAward {
            stars: 0,
            coins: 0,
            parent_completed: false,
            unlocked: None,
        };
        assert!(award.is_empty());
    }

    #[test]
    fn skipped_outcomes_are_not_applied() {
        assert!(!AggregateOutcome::SkippedNoFamily.was_applied());
        assert!(!AggregateOutcome::SkippedEmptyDelta.was_applied());
        let applied = AggregateOutcome::Applied {
            family_id: FamilyId::new(),
            total_stars: 10,
        };
        assert!(applied.was_applied());
    }
}
