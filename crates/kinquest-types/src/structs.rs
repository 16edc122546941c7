//! Core entity structs for the KinQuest domain.
//!
//! Covers the reward-bearing documents (individuals, families, goals with
//! embedded tasks, adventures with per-user progress, achievements) and the
//! small value types shared between them. Progress percentages are
//! [`Decimal`] so that "exactly 100" is a well-defined comparison.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AdventureStatus, FamilyRole, PeriodBucket, Scope};
use crate::ids::{AchievementId, AdventureId, ChallengeId, FamilyId, GoalId, TaskId, UserId};

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

/// A star/coin grant attached to a completable unit.
///
/// Rewards are always present with explicit zero defaults; there is no
/// "missing rewards" state anywhere in the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Rewards {
    /// Stars granted on completion.
    pub stars: u64,
    /// Coins granted on completion.
    pub coins: u64,
}

impl Rewards {
    /// A zero reward.
    pub const ZERO: Self = Self { stars: 0, coins: 0 };

    /// Create a reward grant.
    pub const fn new(stars: u64, coins: u64) -> Self {
        Self { stars, coins }
    }
}

/// The reward attached to a goal, plus an optional achievement unlocked
/// when the goal completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GoalRewards {
    /// Stars granted when the goal completes.
    pub stars: u64,
    /// Coins granted when the goal completes.
    pub coins: u64,
    /// Achievement unlocked when the goal completes, if any.
    pub achievement_id: Option<AchievementId>,
}

// ---------------------------------------------------------------------------
// Tasks & Goals
// ---------------------------------------------------------------------------

/// A task embedded in a goal.
///
/// Completion is monotonic: once `is_completed` flips to `true` there is no
/// path back to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Task {
    /// Unique task identifier (unique within the owning goal).
    pub id: TaskId,
    /// Display title.
    pub title: String,
    /// Longer description shown in the task detail view.
    pub description: String,
    /// Whether the task has been completed.
    pub is_completed: bool,
    /// Reward granted when the task completes.
    pub rewards: Rewards,
    /// Real-world creation time.
    pub created_at: DateTime<Utc>,
    /// When the task was completed (`None` if open).
    pub completed_at: Option<DateTime<Utc>>,
}

/// The single owner of a goal.
///
/// A goal belongs to exactly one individual or exactly one family, never
/// both and never neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum GoalOwner {
    /// Owned by a single member.
    Individual(UserId),
    /// Owned by the family as a whole.
    Family(FamilyId),
}

/// A goal with its embedded task checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Goal {
    /// Unique goal identifier.
    pub id: GoalId,
    /// The individual or family this goal belongs to.
    pub owner: GoalOwner,
    /// Display title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Personal or family scope.
    pub kind: Scope,
    /// When the goal is due.
    pub due_date: DateTime<Utc>,
    /// Whether every task is complete and the goal reward was granted.
    pub is_completed: bool,
    /// When the goal was completed (`None` if open).
    pub completed_at: Option<DateTime<Utc>>,
    /// Completion percentage in the range 0 to 100.
    ///
    /// Derived from the task list: `100 * completed / total`. A goal with
    /// no tasks stays at 0 and never auto-completes.
    #[ts(as = "String")]
    pub progress: Decimal,
    /// Reward granted when the goal completes.
    pub rewards: GoalRewards,
    /// The embedded task checklist.
    pub tasks: Vec<Task>,
    /// Running count of completed tasks.
    ///
    /// Only maintained for individually-owned goals; family-owned goals
    /// leave it at 0.
    pub tasks_completed: u64,
    /// Real-world creation time.
    pub created_at: DateTime<Utc>,
}

impl Goal {
    /// Look up an embedded task by ID.
    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Look up an embedded task by ID for mutation.
    pub fn task_mut(&mut self, task_id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    /// Count of tasks currently marked complete.
    pub fn completed_task_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_completed).count()
    }
}

// ---------------------------------------------------------------------------
// Adventures & Challenges
// ---------------------------------------------------------------------------

/// A challenge within an adventure template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Challenge {
    /// Unique challenge identifier (unique within the adventure).
    pub id: ChallengeId,
    /// Display title.
    pub title: String,
    /// Longer description.
    pub description: String,
}

/// An adventure template from the catalog.
///
/// Templates are owned by nobody; individuals track their own run through
/// a template via [`AdventureProgress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Adventure {
    /// Unique adventure identifier.
    pub id: AdventureId,
    /// Display title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// The ordered challenge list.
    pub challenges: Vec<Challenge>,
    /// Reward granted when every challenge completes.
    pub rewards: Rewards,
    /// Real-world creation time.
    pub created_at: DateTime<Utc>,
}

impl Adventure {
    /// Look up a challenge by ID.
    pub fn challenge(&self, challenge_id: ChallengeId) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.id == challenge_id)
    }
}

/// Per-challenge completion state within an [`AdventureProgress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ChallengeProgress {
    /// The challenge this state tracks.
    pub challenge_id: ChallengeId,
    /// Whether the challenge has been completed.
    pub is_completed: bool,
    /// When the challenge was completed (`None` if open).
    pub completed_at: Option<DateTime<Utc>>,
}

/// One individual's run through an adventure template.
///
/// The reward fields are a snapshot of the template's rewards taken when
/// the run starts, so later template edits do not change what an
/// in-flight run pays out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AdventureProgress {
    /// The adventure template this run follows.
    pub adventure_id: AdventureId,
    /// The individual running the adventure.
    pub user_id: UserId,
    /// Per-challenge completion state, one entry per template challenge.
    pub challenges: Vec<ChallengeProgress>,
    /// Completion percentage in the range 0 to 100.
    #[ts(as = "String")]
    pub progress: Decimal,
    /// Lifecycle state of the run.
    pub status: AdventureStatus,
    /// Whether the final challenge has completed and the adventure reward
    /// was granted.
    pub is_adventure_completed: bool,
    /// Stars granted on adventure completion (snapshot of the template).
    pub stars_reward: u64,
    /// Coins granted on adventure completion (snapshot of the template).
    pub coins_reward: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed (`None` if in progress).
    pub completed_at: Option<DateTime<Utc>>,
}

impl AdventureProgress {
    /// Start a fresh run of the given template.
    ///
    /// All challenges begin incomplete and the template's rewards are
    /// snapshotted into the run.
    pub fn start(adventure: &Adventure, user_id: UserId, now: DateTime<Utc>) -> Self {
        let challenges = adventure
            .challenges
            .iter()
            .map(|c| ChallengeProgress {
                challenge_id: c.id,
                is_completed: false,
                completed_at: None,
            })
            .collect();
        Self {
            adventure_id: adventure.id,
            user_id,
            challenges,
            progress: Decimal::ZERO,
            status: AdventureStatus::InProgress,
            is_adventure_completed: false,
            stars_reward: adventure.rewards.stars,
            coins_reward: adventure.rewards.coins,
            started_at: now,
            completed_at: None,
        }
    }

    /// Look up per-challenge state by ID.
    pub fn challenge(&self, challenge_id: ChallengeId) -> Option<&ChallengeProgress> {
        self.challenges.iter().find(|c| c.challenge_id == challenge_id)
    }

    /// Look up per-challenge state by ID for mutation.
    pub fn challenge_mut(&mut self, challenge_id: ChallengeId) -> Option<&mut ChallengeProgress> {
        self.challenges
            .iter_mut()
            .find(|c| c.challenge_id == challenge_id)
    }

    /// Count of challenges currently marked complete.
    pub fn completed_challenge_count(&self) -> usize {
        self.challenges.iter().filter(|c| c.is_completed).count()
    }
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

/// An achievement definition from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Achievement {
    /// Unique achievement identifier.
    pub id: AchievementId,
    /// Display title.
    pub title: String,
    /// Personal or family scope.
    pub kind: Scope,
    /// Human-readable unlock criteria shown in the client.
    pub criteria: String,
    /// Reward granted when the achievement unlocks.
    pub rewards: Rewards,
    /// Real-world creation time.
    pub created_at: DateTime<Utc>,
}

/// An unlocked achievement held by an individual or family.
///
/// Append-only: at most one record per (holder, achievement) pair, created
/// once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UnlockedAchievement {
    /// The achievement that was unlocked.
    pub achievement_id: AchievementId,
    /// When the unlock happened.
    pub unlocked_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Individuals
// ---------------------------------------------------------------------------

/// A user with their reward balances and family link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Individual {
    /// Unique user identifier.
    pub id: UserId,
    /// Display name.
    pub display_name: String,
    /// The family this user belongs to (`None` if unaffiliated).
    pub family_id: Option<FamilyId>,
    /// Lifetime stars earned.
    pub stars: u64,
    /// Spendable coin balance.
    pub coins: u64,
    /// Lifetime count of completed tasks.
    pub tasks_completed: u64,
    /// Cached dense rank within the family (0 = unranked).
    pub rank_in_family: u32,
    /// Achievements this user has unlocked.
    pub unlocked: Vec<UnlockedAchievement>,
    /// Real-world creation time.
    pub created_at: DateTime<Utc>,
}

impl Individual {
    /// Whether this user has already unlocked the given achievement.
    pub fn has_unlocked(&self, achievement_id: AchievementId) -> bool {
        self.unlocked
            .iter()
            .any(|u| u.achievement_id == achievement_id)
    }
}

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

/// Per-bucket counters for the rolling leaderboard windows.
///
/// Every completion event increments all four buckets; the scheduled
/// resets zero each bucket at its calendar boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PeriodTotals {
    /// Counter for the current day.
    pub daily: u64,
    /// Counter for the current week.
    pub weekly: u64,
    /// Counter for the current month.
    pub monthly: u64,
    /// Counter for the current year.
    pub yearly: u64,
}

impl PeriodTotals {
    /// Read the counter for one bucket.
    pub const fn bucket(&self, bucket: PeriodBucket) -> u64 {
        match bucket {
            PeriodBucket::Daily => self.daily,
            PeriodBucket::Weekly => self.weekly,
            PeriodBucket::Monthly => self.monthly,
            PeriodBucket::Yearly => self.yearly,
        }
    }

    /// Mutable access to the counter for one bucket.
    pub const fn bucket_mut(&mut self, bucket: PeriodBucket) -> &mut u64 {
        match bucket {
            PeriodBucket::Daily => &mut self.daily,
            PeriodBucket::Weekly => &mut self.weekly,
            PeriodBucket::Monthly => &mut self.monthly,
            PeriodBucket::Yearly => &mut self.yearly,
        }
    }
}

/// A member entry within a family document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FamilyMember {
    /// The member's user ID.
    pub member_id: UserId,
    /// The member's role in the family.
    pub role: FamilyRole,
    /// Cached dense rank within the family (0 = unranked).
    pub rank: u32,
}

/// A family unit with its aggregate counters and member roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Family {
    /// Unique family identifier.
    pub id: FamilyId,
    /// Display name.
    pub name: String,
    /// Lifetime stars across all members plus family-owned goal rewards.
    ///
    /// Moves in the same transaction as the completing member's save, so
    /// it never under- or over-counts a settled event.
    pub total_stars: u64,
    /// Shared family coin balance (family-owned goal rewards).
    pub coins: u64,
    /// Stars earned per rolling period window.
    pub period_stars: PeriodTotals,
    /// Tasks completed per rolling period window.
    pub period_tasks: PeriodTotals,
    /// The member roster with cached ranks.
    pub members: Vec<FamilyMember>,
    /// Achievements this family has unlocked.
    pub unlocked: Vec<UnlockedAchievement>,
    /// Real-world creation time.
    pub created_at: DateTime<Utc>,
}

impl Family {
    /// Look up a roster entry by member ID.
    pub fn member(&self, member_id: UserId) -> Option<&FamilyMember> {
        self.members.iter().find(|m| m.member_id == member_id)
    }

    /// Whether this family has already unlocked the given achievement.
    pub fn has_unlocked(&self, achievement_id: AchievementId) -> bool {
        self.unlocked
            .iter()
            .any(|u| u.achievement_id == achievement_id)
    }
}

// ---------------------------------------------------------------------------
// Progress arithmetic
// ---------------------------------------------------------------------------

/// Completion percentage for `completed` out of `total` sub-units.
///
/// Computed in [`Decimal`] so the result is exact: `total` fully completed
/// sub-units yield exactly 100. An empty container (`total == 0`) yields 0,
/// never 100 and never a division error.
pub fn completion_percent(completed: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    let completed = Decimal::from(completed);
    let total = Decimal::from(total);
    completed
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(total))
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn task(completed: bool) -> Task {
        Task {
            id: TaskId::new(),
            title: String::from("Feed the cat"),
            description: String::new(),
            is_completed: completed,
            rewards: Rewards::new(10, 5),
            created_at: now(),
            completed_at: None,
        }
    }

    fn goal_with_tasks(tasks: Vec<Task>) -> Goal {
        Goal {
            id: GoalId::new(),
            owner: GoalOwner::Individual(UserId::new()),
            title: String::from("Morning routine"),
            description: String::new(),
            kind: Scope::Personal,
            due_date: now(),
            is_completed: false,
            completed_at: None,
            progress: Decimal::ZERO,
            rewards: GoalRewards::default(),
            tasks,
            tasks_completed: 0,
            created_at: now(),
        }
    }

    // ----------
    // Progress arithmetic
    // ----------

    #[test]
    fn completion_percent_empty_is_zero() {
        assert_eq!(completion_percent(0, 0), Decimal::ZERO);
    }

    #[test]
    fn completion_percent_full_is_exactly_one_hundred() {
        assert_eq!(completion_percent(3, 3), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn completion_percent_half() {
        assert_eq!(completion_percent(1, 2), Decimal::from(50));
    }

    #[test]
    fn completion_percent_thirds_is_exact_decimal() {
        // 100/3 in Decimal, not a float approximation.
        let third = completion_percent(1, 3);
        assert!(third > Decimal::from(33));
        assert!(third < Decimal::from(34));
    }

    // ----------
    // Goal helpers
    // ----------

    #[test]
    fn goal_task_lookup_by_id() {
        let t = task(false);
        let tid = t.id;
        let goal = goal_with_tasks(vec![t, task(true)]);
        assert!(goal.task(tid).is_some());
        assert!(goal.task(TaskId::new()).is_none());
    }

    #[test]
    fn goal_counts_completed_tasks() {
        let goal = goal_with_tasks(vec![task(true), task(false), task(true)]);
        assert_eq!(goal.completed_task_count(), 2);
    }

    // ----------
    // Period totals
    // ----------

    #[test]
    fn period_bucket_accessors_agree() {
        let mut totals = PeriodTotals::default();
        *totals.bucket_mut(PeriodBucket::Weekly) = 7;
        assert_eq!(totals.bucket(PeriodBucket::Weekly), 7);
        assert_eq!(totals.bucket(PeriodBucket::Daily), 0);
    }

    // ----------
    // Adventure progress
    // ----------

    #[test]
    fn fresh_run_snapshots_template_rewards() {
        let adventure = Adventure {
            id: AdventureId::new(),
            title: String::from("Backyard explorer"),
            description: String::new(),
            challenges: vec![
                Challenge {
                    id: ChallengeId::new(),
                    title: String::from("Find three leaves"),
                    description: String::new(),
                },
                Challenge {
                    id: ChallengeId::new(),
                    title: String::from("Spot a bird"),
                    description: String::new(),
                },
            ],
            rewards: Rewards::new(100, 40),
            created_at: now(),
        };
        let run = AdventureProgress::start(&adventure, UserId::new(), now());
        assert_eq!(run.challenges.len(), 2);
        assert_eq!(run.stars_reward, 100);
        assert_eq!(run.coins_reward, 40);
        assert_eq!(run.status, AdventureStatus::InProgress);
        assert_eq!(run.completed_challenge_count(), 0);
        assert_eq!(run.progress, Decimal::ZERO);
    }

    #[test]
    fn unlock_membership_checks() {
        let achievement_id = AchievementId::new();
        let individual = Individual {
            id: UserId::new(),
            display_name: String::from("Ada"),
            family_id: None,
            stars: 0,
            coins: 0,
            tasks_completed: 0,
            rank_in_family: 0,
            unlocked: vec![UnlockedAchievement {
                achievement_id,
                unlocked_at: now(),
            }],
            created_at: now(),
        };
        assert!(individual.has_unlocked(achievement_id));
        assert!(!individual.has_unlocked(AchievementId::new()));
    }
}
