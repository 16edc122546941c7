//! Reward application: task and challenge completion with cascades.
//!
//! Completing the last sub-unit of a container completes the container
//! and pays its reward on top -- task into goal (plus an optional
//! achievement unlock), challenge into adventure. Both operations take
//! owned document snapshots and hand back updated ones together with a
//! [`CompletionAward`] summarizing everything the call paid out.
//!
//! # Invariants
//!
//! - Completion is monotonic. A second submission is rejected with an
//!   already-completed error so callers can tell a double submit from a
//!   first success.
//! - Progress is recomputed from the checklist, never incremented. An
//!   empty checklist stays at 0 and the container never auto-completes.
//! - On any error the inputs are dropped unchanged; there is no partial
//!   application.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use kinquest_types::awards::CompletionAward;
use kinquest_types::enums::AdventureStatus;
use kinquest_types::ids::{AchievementId, ChallengeId, FamilyId, TaskId};
use kinquest_types::structs::{
    Adventure, AdventureProgress, Family, Goal, GoalOwner, Individual, UnlockedAchievement,
    completion_percent,
};

use crate::catalog::AchievementCatalog;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// The entity credited by a completion event.
///
/// Individual actors bank stars and coins on their own balances. Family
/// actors bank coins directly; their stars reach `total_stars` through
/// the family delta carried in the award, so the family total counts
/// every star exactly once no matter who earned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// A single member completing their own goal or adventure.
    Individual(Individual),
    /// A family completing a family-owned goal.
    Family(Family),
}

impl Actor {
    /// The family whose aggregates absorb this actor's completion events.
    ///
    /// `None` for an unaffiliated individual; the aggregate update is
    /// skipped in that case.
    pub const fn family_id(&self) -> Option<FamilyId> {
        match self {
            Self::Individual(individual) => individual.family_id,
            Self::Family(family) => Some(family.id),
        }
    }

    /// Whether this actor already unlocked the given achievement.
    pub fn has_unlocked(&self, achievement_id: AchievementId) -> bool {
        match self {
            Self::Individual(individual) => individual.has_unlocked(achievement_id),
            Self::Family(family) => family.has_unlocked(achievement_id),
        }
    }

    /// Add a reward to the actor's balances.
    ///
    /// Family stars are intentionally not banked here; `total_stars`
    /// moves only via the family delta, never twice.
    fn credit(&mut self, stars: u64, coins: u64) -> Result<(), EngineError> {
        match self {
            Self::Individual(individual) => {
                individual.stars = individual.stars.checked_add(stars).ok_or(
                    EngineError::ArithmeticOverflow {
                        context: "individual stars",
                    },
                )?;
                individual.coins = individual.coins.checked_add(coins).ok_or(
                    EngineError::ArithmeticOverflow {
                        context: "individual coins",
                    },
                )?;
            }
            Self::Family(family) => {
                family.coins =
                    family
                        .coins
                        .checked_add(coins)
                        .ok_or(EngineError::ArithmeticOverflow {
                            context: "family coins",
                        })?;
            }
        }
        Ok(())
    }

    /// Record an unlocked achievement on the actor.
    fn push_unlock(&mut self, unlocked: UnlockedAchievement) {
        match self {
            Self::Individual(individual) => individual.unlocked.push(unlocked),
            Self::Family(family) => family.unlocked.push(unlocked),
        }
    }
}

// ---------------------------------------------------------------------------
// Task completion
// ---------------------------------------------------------------------------

/// Updated documents and award summary from a task completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    /// The goal with the task marked, progress recomputed, and (on full
    /// completion) the goal itself closed out.
    pub goal: Goal,
    /// The actor with all of the call's rewards credited.
    pub actor: Actor,
    /// Everything the call paid out, cascade included.
    pub award: CompletionAward,
}

/// Complete one task of a goal, cascading into goal completion.
///
/// # Order of operations
///
/// 1. The actor must own the goal
/// 2. The task must exist and still be open
/// 3. The goal must not already be marked complete
/// 4. Mark the task, credit its reward
/// 5. Individual actors bump their own and the goal's task counters
/// 6. Recompute goal progress from the checklist
/// 7. At exactly 100: close the goal, credit its reward, unlock its
///    achievement if one is attached
///
/// # Errors
///
/// [`EngineError::TaskNotFound`] for a dangling task reference,
/// [`EngineError::TaskAlreadyCompleted`] on double submission,
/// [`EngineError::GoalAlreadyCompleted`] when an open task sits inside a
/// closed goal, [`EngineError::WrongActor`] when the actor does not own
/// the goal, and [`EngineError::AchievementNotFound`] /
/// [`EngineError::AchievementAlreadyUnlocked`] from the unlock cascade.
pub fn complete_task<C: AchievementCatalog>(
    goal: Goal,
    task_id: TaskId,
    actor: Actor,
    catalog: &C,
    now: DateTime<Utc>,
) -> Result<TaskCompletion, EngineError> {
    let mut goal = goal;
    let mut actor = actor;
    let goal_id = goal.id;

    // 1. Ownership check: the handler resolves the acting entity from the
    //    goal's owner, so a mismatch here means crossed documents.
    ensure_owner(&goal, &actor)?;

    // 2. + 3. Locate the task and reject double submission before
    //    touching anything.
    let goal_was_completed = goal.is_completed;
    let task_rewards = {
        let Some(task) = goal.task_mut(task_id) else {
            return Err(EngineError::TaskNotFound { goal_id, task_id });
        };
        if task.is_completed {
            return Err(EngineError::TaskAlreadyCompleted { task_id });
        }
        if goal_was_completed {
            return Err(EngineError::GoalAlreadyCompleted { goal_id });
        }

        // 4. Mark the task.
        task.is_completed = true;
        task.completed_at = Some(now);
        task.rewards
    };

    actor.credit(task_rewards.stars, task_rewards.coins)?;
    let mut stars = task_rewards.stars;
    let mut coins = task_rewards.coins;

    // 5. Task counters move for individual actors only.
    if let Actor::Individual(individual) = &mut actor {
        individual.tasks_completed = individual.tasks_completed.checked_add(1).ok_or(
            EngineError::ArithmeticOverflow {
                context: "individual tasks_completed",
            },
        )?;
        goal.tasks_completed =
            goal.tasks_completed
                .checked_add(1)
                .ok_or(EngineError::ArithmeticOverflow {
                    context: "goal tasks_completed",
                })?;
    }

    // 6. Progress is derived state, recomputed from the checklist.
    goal.progress = completion_percent(goal.completed_task_count(), goal.tasks.len());

    // 7. Cascade: the last task closes the goal and pays its reward.
    let mut unlocked = None;
    let parent_completed = goal.progress == Decimal::ONE_HUNDRED;
    if parent_completed {
        goal.is_completed = true;
        goal.completed_at = Some(now);

        actor.credit(goal.rewards.stars, goal.rewards.coins)?;
        stars = stars
            .checked_add(goal.rewards.stars)
            .ok_or(EngineError::ArithmeticOverflow {
                context: "award stars",
            })?;
        coins = coins
            .checked_add(goal.rewards.coins)
            .ok_or(EngineError::ArithmeticOverflow {
                context: "award coins",
            })?;

        if let Some(achievement_id) = goal.rewards.achievement_id {
            let (unlock, bonus_stars, bonus_coins) =
                unlock_achievement(&mut actor, achievement_id, catalog, now)?;
            unlocked = Some(unlock);
            stars = stars
                .checked_add(bonus_stars)
                .ok_or(EngineError::ArithmeticOverflow {
                    context: "award stars",
                })?;
            coins = coins
                .checked_add(bonus_coins)
                .ok_or(EngineError::ArithmeticOverflow {
                    context: "award coins",
                })?;
        }
    }

    Ok(TaskCompletion {
        goal,
        actor,
        award: CompletionAward {
            stars,
            coins,
            parent_completed,
            unlocked,
        },
    })
}

/// Verify that the actor is the goal's owner.
fn ensure_owner(goal: &Goal, actor: &Actor) -> Result<(), EngineError> {
    let owns = match (goal.owner, actor) {
        (GoalOwner::Individual(user_id), Actor::Individual(individual)) => {
            individual.id == user_id
        }
        (GoalOwner::Family(family_id), Actor::Family(family)) => family.id == family_id,
        _ => false,
    };
    if owns {
        Ok(())
    } else {
        Err(EngineError::WrongActor { goal_id: goal.id })
    }
}

/// Unlock an achievement on the actor and credit its reward.
///
/// Returns the unlock record plus the bonus stars/coins it granted.
fn unlock_achievement<C: AchievementCatalog>(
    actor: &mut Actor,
    achievement_id: AchievementId,
    catalog: &C,
    now: DateTime<Utc>,
) -> Result<(UnlockedAchievement, u64, u64), EngineError> {
    // A dangling reference is reported, never skipped.
    let Some(achievement) = catalog.achievement(achievement_id) else {
        return Err(EngineError::AchievementNotFound { achievement_id });
    };
    if actor.has_unlocked(achievement_id) {
        return Err(EngineError::AchievementAlreadyUnlocked { achievement_id });
    }

    let rewards = achievement.rewards;
    actor.credit(rewards.stars, rewards.coins)?;
    let unlock = UnlockedAchievement {
        achievement_id,
        unlocked_at: now,
    };
    actor.push_unlock(unlock);
    Ok((unlock, rewards.stars, rewards.coins))
}

// ---------------------------------------------------------------------------
// Challenge completion
// ---------------------------------------------------------------------------

/// Updated documents and award summary from a challenge completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeCompletion {
    /// The run with the challenge marked and progress recomputed; freshly
    /// created when the call started the adventure implicitly.
    pub run: AdventureProgress,
    /// The individual with any adventure reward credited.
    pub individual: Individual,
    /// Everything the call paid out. Challenges themselves carry no
    /// reward, so this is zero unless the adventure completed.
    pub award: CompletionAward,
}

/// Complete one challenge of an adventure run, cascading into adventure
/// completion.
///
/// `run` is `None` when the individual has not started the adventure; a
/// fresh run is created from the template first, so the first challenge
/// completion doubles as the start. Adventures pay only on full
/// completion -- the reward snapshot taken at start time, not the
/// template's current values.
///
/// # Errors
///
/// [`EngineError::ChallengeNotFound`] for a challenge missing from the
/// template, [`EngineError::ChallengeAlreadyCompleted`] on double
/// submission, [`EngineError::AdventureAlreadyCompleted`] when an open
/// challenge sits inside a closed run, [`EngineError::RunMismatch`] when
/// the run belongs to a different adventure or user, and
/// [`EngineError::ProgressDesync`] when the run's checklist disagrees
/// with the template.
pub fn complete_challenge(
    run: Option<AdventureProgress>,
    adventure: &Adventure,
    challenge_id: ChallengeId,
    individual: Individual,
    now: DateTime<Utc>,
) -> Result<ChallengeCompletion, EngineError> {
    let mut individual = individual;

    // 1. Implicit start: no run yet means this completion begins one.
    let mut run = match run {
        Some(existing) => {
            if existing.adventure_id != adventure.id || existing.user_id != individual.id {
                return Err(EngineError::RunMismatch {
                    adventure_id: adventure.id,
                });
            }
            existing
        }
        None => AdventureProgress::start(adventure, individual.id, now),
    };

    // 2. The template must define the challenge.
    if adventure.challenge(challenge_id).is_none() {
        return Err(EngineError::ChallengeNotFound {
            adventure_id: adventure.id,
            challenge_id,
        });
    }

    // 3. The run must track the same checklist as the template.
    if run.challenges.len() != adventure.challenges.len() {
        return Err(EngineError::ProgressDesync {
            adventure_id: adventure.id,
            expected: adventure.challenges.len(),
            found: run.challenges.len(),
        });
    }

    // 4. Locate the entry and reject double submission before touching
    //    anything.
    let run_was_completed = run.is_adventure_completed;
    {
        let Some(entry) = run.challenge_mut(challenge_id) else {
            return Err(EngineError::ProgressDesync {
                adventure_id: adventure.id,
                expected: adventure.challenges.len(),
                found: 0,
            });
        };
        if entry.is_completed {
            return Err(EngineError::ChallengeAlreadyCompleted { challenge_id });
        }
        if run_was_completed {
            return Err(EngineError::AdventureAlreadyCompleted {
                adventure_id: adventure.id,
            });
        }

        entry.is_completed = true;
        entry.completed_at = Some(now);
    }

    // 5. Progress is derived state, recomputed from the checklist.
    run.progress = completion_percent(run.completed_challenge_count(), run.challenges.len());

    // 6. Cascade: the last challenge closes the run and pays the
    //    snapshotted reward.
    let mut stars = 0;
    let mut coins = 0;
    let parent_completed = run.progress == Decimal::ONE_HUNDRED;
    if parent_completed {
        run.is_adventure_completed = true;
        run.status = AdventureStatus::Completed;
        run.completed_at = Some(now);

        individual.stars =
            individual
                .stars
                .checked_add(run.stars_reward)
                .ok_or(EngineError::ArithmeticOverflow {
                    context: "individual stars",
                })?;
        individual.coins =
            individual
                .coins
                .checked_add(run.coins_reward)
                .ok_or(EngineError::ArithmeticOverflow {
                    context: "individual coins",
                })?;
        stars = run.stars_reward;
        coins = run.coins_reward;
    }

    Ok(ChallengeCompletion {
        run,
        individual,
        award: CompletionAward {
            stars,
            coins,
            parent_completed,
            unlocked: None,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kinquest_types::enums::Scope;
    use kinquest_types::ids::{AdventureId, FamilyId, GoalId, UserId};
    use kinquest_types::structs::{
        Achievement, Challenge, GoalRewards, PeriodTotals, Rewards, Task,
    };

    use crate::catalog::InMemoryCatalog;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn individual() -> Individual {
        Individual {
            id: UserId::new(),
            display_name: String::from("Ada"),
            family_id: None,
            stars: 0,
            coins: 0,
            tasks_completed: 0,
            rank_in_family: 0,
            unlocked: Vec::new(),
            created_at: now(),
        }
    }

    fn family() -> Family {
        Family {
            id: FamilyId::new(),
            name: String::from("The Larssons"),
            total_stars: 0,
            coins: 0,
            period_stars: PeriodTotals::default(),
            period_tasks: PeriodTotals::default(),
            members: Vec::new(),
            unlocked: Vec::new(),
            created_at: now(),
        }
    }

    fn task(stars: u64, coins: u64) -> Task {
        Task {
            id: TaskId::new(),
            title: String::from("Water the plants"),
            description: String::new(),
            is_completed: false,
            rewards: Rewards::new(stars, coins),
            created_at: now(),
            completed_at: None,
        }
    }

    fn goal_for(owner: GoalOwner, rewards: GoalRewards, tasks: Vec<Task>) -> Goal {
        Goal {
            id: GoalId::new(),
            owner,
            title: String::from("Green thumb week"),
            description: String::new(),
            kind: Scope::Personal,
            due_date: now(),
            is_completed: false,
            completed_at: None,
            progress: Decimal::ZERO,
            rewards,
            tasks,
            tasks_completed: 0,
            created_at: now(),
        }
    }

    fn adventure(challenge_count: usize, stars: u64, coins: u64) -> Adventure {
        let challenges = (0..challenge_count)
            .map(|_| Challenge {
                id: ChallengeId::new(),
                title: String::from("Explore"),
                description: String::new(),
            })
            .collect();
        Adventure {
            id: AdventureId::new(),
            title: String::from("Backyard explorer"),
            description: String::new(),
            challenges,
            rewards: Rewards::new(stars, coins),
            created_at: now(),
        }
    }

    // ----------
    // Task completion
    // ----------

    #[test]
    fn sole_task_completion_cascades_into_goal() {
        let user = individual();
        let user_id = user.id;
        let goal = goal_for(
            GoalOwner::Individual(user_id),
            GoalRewards {
                stars: 50,
                coins: 20,
                achievement_id: None,
            },
            vec![task(10, 5)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();
        let catalog = InMemoryCatalog::new();

        let done = complete_task(goal, task_id, Actor::Individual(user), &catalog, now())
            .unwrap();

        assert!(done.goal.is_completed);
        assert_eq!(done.goal.progress, Decimal::ONE_HUNDRED);
        assert!(done.goal.completed_at.is_some());
        assert_eq!(done.goal.tasks_completed, 1);
        assert_eq!(done.award.stars, 60);
        assert_eq!(done.award.coins, 25);
        assert!(done.award.parent_completed);

        match done.actor {
            Actor::Individual(updated) => {
                assert_eq!(updated.stars, 60);
                assert_eq!(updated.coins, 25);
                assert_eq!(updated.tasks_completed, 1);
            }
            other => panic!("Expected an individual actor, got {other:?}"),
        }
    }

    #[test]
    fn partial_completion_pays_only_the_task() {
        let user = individual();
        let user_id = user.id;
        let goal = goal_for(
            GoalOwner::Individual(user_id),
            GoalRewards {
                stars: 50,
                coins: 20,
                achievement_id: None,
            },
            vec![task(10, 5), task(10, 5)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();
        let catalog = InMemoryCatalog::new();

        let done = complete_task(goal, task_id, Actor::Individual(user), &catalog, now())
            .unwrap();

        assert!(!done.goal.is_completed);
        assert_eq!(done.goal.progress, Decimal::from(50));
        assert_eq!(done.award.stars, 10);
        assert_eq!(done.award.coins, 5);
        assert!(!done.award.parent_completed);
        assert!(done.award.unlocked.is_none());
    }

    #[test]
    fn double_submission_is_rejected_with_no_stat_change() {
        let user = individual();
        let user_id = user.id;
        let goal = goal_for(
            GoalOwner::Individual(user_id),
            GoalRewards::default(),
            vec![task(10, 5), task(10, 5)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();
        let catalog = InMemoryCatalog::new();

        let first = complete_task(goal, task_id, Actor::Individual(user), &catalog, now())
            .unwrap();
        let stars_after_first = match &first.actor {
            Actor::Individual(updated) => updated.stars,
            other => panic!("Expected an individual actor, got {other:?}"),
        };

        let second = complete_task(first.goal, task_id, first.actor, &catalog, now());
        assert!(matches!(
            second,
            Err(EngineError::TaskAlreadyCompleted { .. })
        ));
        assert_eq!(stars_after_first, 10);
    }

    #[test]
    fn unknown_task_is_not_found() {
        let user = individual();
        let goal = goal_for(
            GoalOwner::Individual(user.id),
            GoalRewards::default(),
            vec![task(10, 5)],
        );
        let catalog = InMemoryCatalog::new();
        let result = complete_task(
            goal,
            TaskId::new(),
            Actor::Individual(user),
            &catalog,
            now(),
        );
        assert!(matches!(result, Err(EngineError::TaskNotFound { .. })));
    }

    #[test]
    fn open_task_in_closed_goal_is_invalid_state() {
        let user = individual();
        let mut goal = goal_for(
            GoalOwner::Individual(user.id),
            GoalRewards::default(),
            vec![task(10, 5)],
        );
        goal.is_completed = true;
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();
        let catalog = InMemoryCatalog::new();

        let result = complete_task(goal, task_id, Actor::Individual(user), &catalog, now());
        assert!(matches!(
            result,
            Err(EngineError::GoalAlreadyCompleted { .. })
        ));
    }

    #[test]
    fn wrong_owner_is_rejected() {
        let user = individual();
        let goal = goal_for(
            GoalOwner::Individual(UserId::new()),
            GoalRewards::default(),
            vec![task(10, 5)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();
        let catalog = InMemoryCatalog::new();

        let result = complete_task(goal, task_id, Actor::Individual(user), &catalog, now());
        assert!(matches!(result, Err(EngineError::WrongActor { .. })));
    }

    #[test]
    fn goal_completion_unlocks_attached_achievement() {
        let achievement = Achievement {
            id: AchievementId::new(),
            title: String::from("Gardener"),
            kind: Scope::Personal,
            criteria: String::from("Finish a gardening goal"),
            rewards: Rewards::new(25, 10),
            created_at: now(),
        };
        let achievement_id = achievement.id;
        let catalog = InMemoryCatalog::from_achievements(vec![achievement]);

        let user = individual();
        let goal = goal_for(
            GoalOwner::Individual(user.id),
            GoalRewards {
                stars: 50,
                coins: 20,
                achievement_id: Some(achievement_id),
            },
            vec![task(10, 5)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();

        let done = complete_task(goal, task_id, Actor::Individual(user), &catalog, now())
            .unwrap();

        // 10 task + 50 goal + 25 achievement
        assert_eq!(done.award.stars, 85);
        assert_eq!(done.award.coins, 35);
        assert!(
            done.award
                .unlocked
                .is_some_and(|u| u.achievement_id == achievement_id)
        );
        match done.actor {
            Actor::Individual(updated) => {
                assert!(updated.has_unlocked(achievement_id));
                assert_eq!(updated.stars, 85);
            }
            other => panic!("Expected an individual actor, got {other:?}"),
        }
    }

    #[test]
    fn dangling_achievement_reference_fails_the_completion() {
        let user = individual();
        let goal = goal_for(
            GoalOwner::Individual(user.id),
            GoalRewards {
                stars: 50,
                coins: 20,
                achievement_id: Some(AchievementId::new()),
            },
            vec![task(10, 5)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();
        let catalog = InMemoryCatalog::new();

        let result = complete_task(goal, task_id, Actor::Individual(user), &catalog, now());
        assert!(matches!(
            result,
            Err(EngineError::AchievementNotFound { .. })
        ));
    }

    #[test]
    fn repeat_unlock_is_rejected() {
        let achievement = Achievement {
            id: AchievementId::new(),
            title: String::from("Gardener"),
            kind: Scope::Personal,
            criteria: String::new(),
            rewards: Rewards::ZERO,
            created_at: now(),
        };
        let achievement_id = achievement.id;
        let catalog = InMemoryCatalog::from_achievements(vec![achievement]);

        let mut user = individual();
        user.unlocked.push(UnlockedAchievement {
            achievement_id,
            unlocked_at: now(),
        });
        let goal = goal_for(
            GoalOwner::Individual(user.id),
            GoalRewards {
                stars: 0,
                coins: 0,
                achievement_id: Some(achievement_id),
            },
            vec![task(1, 0)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();

        let result = complete_task(goal, task_id, Actor::Individual(user), &catalog, now());
        assert!(matches!(
            result,
            Err(EngineError::AchievementAlreadyUnlocked { .. })
        ));
    }

    #[test]
    fn family_owned_goal_credits_family_balances() {
        let fam = family();
        let fam_id = fam.id;
        let goal = goal_for(
            GoalOwner::Family(fam_id),
            GoalRewards {
                stars: 30,
                coins: 12,
                achievement_id: None,
            },
            vec![task(10, 5)],
        );
        let task_id = goal.tasks.first().map(|t| t.id).unwrap();
        let catalog = InMemoryCatalog::new();

        let done = complete_task(goal, task_id, Actor::Family(fam), &catalog, now()).unwrap();

        // Family actors skip the per-goal task counter.
        assert_eq!(done.goal.tasks_completed, 0);
        // The full star amount rides the award into the family delta.
        assert_eq!(done.award.stars, 40);
        assert_eq!(done.award.coins, 17);
        match done.actor {
            Actor::Family(updated) => {
                assert_eq!(updated.total_stars, 0);
                assert_eq!(updated.coins, 17);
            }
            other => panic!("Expected a family actor, got {other:?}"),
        }
    }

    #[test]
    fn empty_checklist_never_completes() {
        let user = individual();
        let goal = goal_for(
            GoalOwner::Individual(user.id),
            GoalRewards::default(),
            Vec::new(),
        );
        let catalog = InMemoryCatalog::new();
        let result = complete_task(
            goal,
            TaskId::new(),
            Actor::Individual(user),
            &catalog,
            now(),
        );
        // No such task; and even in principle an empty goal has progress 0.
        assert!(matches!(result, Err(EngineError::TaskNotFound { .. })));
    }

    // ----------
    // Challenge completion
    // ----------

    #[test]
    fn first_challenge_starts_the_run_implicitly() {
        let adv = adventure(2, 100, 40);
        let challenge_id = adv.challenges.first().map(|c| c.id).unwrap();
        let user = individual();

        let done = complete_challenge(None, &adv, challenge_id, user, now()).unwrap();
        assert_eq!(done.run.completed_challenge_count(), 1);
        assert_eq!(done.run.progress, Decimal::from(50));
        assert_eq!(done.run.status, AdventureStatus::InProgress);
        assert!(!done.run.is_adventure_completed);
        // Challenges pay nothing until the adventure completes.
        assert_eq!(done.award.stars, 0);
        assert_eq!(done.individual.stars, 0);
    }

    #[test]
    fn last_challenge_pays_the_snapshot_reward() {
        let adv = adventure(2, 100, 40);
        let first_id = adv.challenges.first().map(|c| c.id).unwrap();
        let second_id = adv.challenges.last().map(|c| c.id).unwrap();
        let user = individual();

        let first = complete_challenge(None, &adv, first_id, user, now()).unwrap();
        let done = complete_challenge(Some(first.run), &adv, second_id, first.individual, now())
            .unwrap();

        assert!(done.run.is_adventure_completed);
        assert_eq!(done.run.status, AdventureStatus::Completed);
        assert_eq!(done.run.progress, Decimal::ONE_HUNDRED);
        assert!(done.run.completed_at.is_some());
        assert_eq!(done.award.stars, 100);
        assert_eq!(done.award.coins, 40);
        assert!(done.award.parent_completed);
        assert_eq!(done.individual.stars, 100);
        assert_eq!(done.individual.coins, 40);
    }

    #[test]
    fn snapshot_reward_survives_template_edits() {
        let mut adv = adventure(1, 100, 40);
        let challenge_id = adv.challenges.first().map(|c| c.id).unwrap();
        let user = individual();
        let run = AdventureProgress::start(&adv, user.id, now());

        // Template reward changes after the run started.
        adv.rewards = Rewards::new(999, 999);

        let done = complete_challenge(Some(run), &adv, challenge_id, user, now()).unwrap();
        assert_eq!(done.award.stars, 100);
        assert_eq!(done.award.coins, 40);
    }

    #[test]
    fn repeat_challenge_submission_is_rejected() {
        let adv = adventure(2, 100, 40);
        let challenge_id = adv.challenges.first().map(|c| c.id).unwrap();
        let user = individual();

        let first = complete_challenge(None, &adv, challenge_id, user, now()).unwrap();
        let second = complete_challenge(
            Some(first.run),
            &adv,
            challenge_id,
            first.individual,
            now(),
        );
        assert!(matches!(
            second,
            Err(EngineError::ChallengeAlreadyCompleted { .. })
        ));
    }

    #[test]
    fn unknown_challenge_is_not_found() {
        let adv = adventure(1, 10, 0);
        let user = individual();
        let result = complete_challenge(None, &adv, ChallengeId::new(), user, now());
        assert!(matches!(
            result,
            Err(EngineError::ChallengeNotFound { .. })
        ));
    }

    #[test]
    fn foreign_run_is_rejected() {
        let adv = adventure(1, 10, 0);
        let other_adv = adventure(1, 10, 0);
        let challenge_id = adv.challenges.first().map(|c| c.id).unwrap();
        let user = individual();
        let foreign_run = AdventureProgress::start(&other_adv, user.id, now());

        let result = complete_challenge(Some(foreign_run), &adv, challenge_id, user, now());
        assert!(matches!(result, Err(EngineError::RunMismatch { .. })));
    }

    #[test]
    fn desynced_checklist_is_rejected() {
        let adv = adventure(2, 10, 0);
        let challenge_id = adv.challenges.first().map(|c| c.id).unwrap();
        let user = individual();
        let mut run = AdventureProgress::start(&adv, user.id, now());
        run.challenges.pop();

        let result = complete_challenge(Some(run), &adv, challenge_id, user, now());
        assert!(matches!(result, Err(EngineError::ProgressDesync { .. })));
    }
}
