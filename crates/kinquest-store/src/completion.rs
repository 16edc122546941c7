//! The completion flow: load, apply, persist, settle.
//!
//! One call here is one completion event. The documents the event
//! touches are loaded, the engine applies the reward cascade to the
//! in-memory snapshots, and every resulting write lands in a single
//! transaction guarded by the versions observed at load time. A version
//! that moved means another event raced this one: the transaction rolls
//! back and the whole attempt is retried from fresh loads, so no award
//! is applied twice and no partial event is ever observable.
//!
//! Rank recalculation runs after the commit (it derives from committed
//! counters) and its failure fails the call. Cache refreshes are
//! best-effort: every cached key can be rebuilt from PostgreSQL, so a
//! refresh failure is logged and the receipt still returned.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kinquest_ledger::{
    Actor, ChallengeCompletion, InMemoryCatalog, TaskCompletion, apply_family_delta,
};
use kinquest_types::awards::{
    AggregateOutcome, CompletionAward, CompletionReceipt, FamilyDelta, RankedMember,
};
use kinquest_types::enums::PeriodBucket;
use kinquest_types::ids::{AdventureId, ChallengeId, FamilyId, GoalId, TaskId, UserId};
use kinquest_types::structs::{Goal, GoalOwner};
use rand::Rng;

use crate::adventures::{AdventureStore, insert_run, save_run};
use crate::catalog::AchievementStore;
use crate::error::StoreError;
use crate::families::{FamilyStore, bump_family_counters, save_family};
use crate::goals::{GoalStore, save_goal};
use crate::individuals::{IndividualStore, save_individual};
use crate::leaderboard::LeaderboardCache;
use crate::postgres::PostgresPool;
use crate::ranks::RankService;

/// Retries after a version conflict before giving up.
///
/// The pool's acquire ceiling is sized against this ladder; see
/// `postgres::PostgresConfig::DEFAULT_ACQUIRE_TIMEOUT`.
pub(crate) const MAX_RETRIES: u32 = 3;

/// Retry backoff bounds, jittered so racing writers do not reconverge.
const RETRY_JITTER_MIN_MS: u64 = 10;
pub(crate) const RETRY_JITTER_MAX_MS: u64 = 50;

/// Entries kept per cached period leaderboard.
const LEADERBOARD_LIMIT: i64 = 100;

/// Executes completion events against the store.
#[derive(Clone)]
pub struct CompletionService {
    pool: PostgresPool,
    cache: Option<LeaderboardCache>,
}

impl CompletionService {
    /// Create a service without a leaderboard cache.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool, cache: None }
    }

    /// Attach a leaderboard cache, refreshed after applied events.
    #[must_use]
    pub fn with_cache(mut self, cache: LeaderboardCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Complete one task of a goal.
    ///
    /// Loads the goal and its owner, applies the reward cascade, and
    /// persists every touched document in one transaction. A concurrent
    /// event that moves a version under this call rolls the transaction
    /// back; the whole attempt is retried from fresh loads a bounded
    /// number of times.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Engine`] when the engine rejects the event
    /// (double submission, wrong owner, dangling references).
    /// Returns [`StoreError::NotFound`] when the goal or its owner does
    /// not exist.
    /// Returns [`StoreError::VersionConflict`] when retries run out.
    pub async fn complete_task(
        &self,
        goal_id: GoalId,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<CompletionReceipt, StoreError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_complete_task(goal_id, task_id, now).await {
                Err(StoreError::VersionConflict { entity, id }) if attempt < MAX_RETRIES => {
                    attempt = attempt.saturating_add(1);
                    tracing::debug!(entity, id = %id, attempt, "Version conflict; retrying task completion");
                    let jitter_ms =
                        rand::rng().random_range(RETRY_JITTER_MIN_MS..=RETRY_JITTER_MAX_MS);
                    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Complete one challenge of an adventure run.
    ///
    /// A missing run means the user has not started the adventure; the
    /// engine starts one implicitly, so the first challenge completion
    /// doubles as the start. Persistence and retry behavior match
    /// [`Self::complete_task`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Engine`] when the engine rejects the event
    /// (double submission, unknown challenge, desynced run).
    /// Returns [`StoreError::NotFound`] when the adventure or the user
    /// does not exist.
    /// Returns [`StoreError::VersionConflict`] when retries run out.
    pub async fn complete_challenge(
        &self,
        adventure_id: AdventureId,
        challenge_id: ChallengeId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CompletionReceipt, StoreError> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .try_complete_challenge(adventure_id, challenge_id, user_id, now)
                .await
            {
                Err(StoreError::VersionConflict { entity, id }) if attempt < MAX_RETRIES => {
                    attempt = attempt.saturating_add(1);
                    tracing::debug!(entity, id = %id, attempt, "Version conflict; retrying challenge completion");
                    let jitter_ms =
                        rand::rng().random_range(RETRY_JITTER_MIN_MS..=RETRY_JITTER_MAX_MS);
                    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// One attempt at a task completion event.
    async fn try_complete_task(
        &self,
        goal_id: GoalId,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<CompletionReceipt, StoreError> {
        let loaded_goal = GoalStore::new(self.pool.pool()).load(goal_id).await?;
        let goal_version = loaded_goal.version;

        let (actor, actor_version) = match loaded_goal.record.owner {
            GoalOwner::Individual(user_id) => {
                let loaded = IndividualStore::new(self.pool.pool()).load(user_id).await?;
                (Actor::Individual(loaded.record), loaded.version)
            }
            GoalOwner::Family(family_id) => {
                let loaded = FamilyStore::new(self.pool.pool()).load(family_id).await?;
                (Actor::Family(loaded.record), loaded.version)
            }
        };

        let catalog = self.catalog_for(&loaded_goal.record).await?;

        let TaskCompletion { goal, actor, award } =
            kinquest_ledger::complete_task(loaded_goal.record, task_id, actor, &catalog, now)?;

        let mut tx = self.pool.pool().begin().await?;
        save_goal(&mut tx, &goal, goal_version).await?;

        let (aggregate, rank_family) = match actor {
            Actor::Individual(individual) => {
                save_individual(&mut tx, &individual, actor_version).await?;
                match individual.family_id {
                    Some(family_id) => {
                        let outcome = bump_family_counters(
                            &mut tx,
                            family_id,
                            FamilyDelta::for_task(award.stars),
                        )
                        .await?;
                        (outcome, Some(family_id))
                    }
                    None => {
                        tracing::debug!(user_id = %individual.id, "No family; aggregate skipped");
                        (AggregateOutcome::SkippedNoFamily, None)
                    }
                }
            }
            Actor::Family(family) => {
                // The engine banked the award's coins on the family; its
                // stars arrive through the same delta path individual
                // events use, so each star lands in total_stars once.
                let merged = apply_family_delta(family, FamilyDelta::for_task(award.stars))?;
                save_family(&mut tx, &merged, actor_version).await?;
                let outcome = AggregateOutcome::Applied {
                    family_id: merged.id,
                    total_stars: merged.total_stars,
                };
                // Member counters did not move; cached ranks stay valid.
                (outcome, None)
            }
        };

        tx.commit().await?;

        self.settle_after_commit(award, aggregate, rank_family).await
    }

    /// One attempt at a challenge completion event.
    async fn try_complete_challenge(
        &self,
        adventure_id: AdventureId,
        challenge_id: ChallengeId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<CompletionReceipt, StoreError> {
        let adventures = AdventureStore::new(self.pool.pool());
        let adventure = adventures.load(adventure_id).await?;
        let loaded_user = IndividualStore::new(self.pool.pool()).load(user_id).await?;
        let user_version = loaded_user.version;
        let (run, run_version) = adventures
            .run(adventure_id, user_id)
            .await?
            .map_or((None, None), |v| (Some(v.record), Some(v.version)));

        let ChallengeCompletion {
            run,
            individual,
            award,
        } = kinquest_ledger::complete_challenge(
            run,
            &adventure,
            challenge_id,
            loaded_user.record,
            now,
        )?;

        let mut tx = self.pool.pool().begin().await?;

        match run_version {
            Some(expected) => {
                save_run(&mut tx, &run, expected).await?;
            }
            None => {
                insert_run(&mut tx, &run).await?;
            }
        }

        // The individual moves only when the cascade paid out; mid-run
        // completions live entirely in the run document.
        if !award.is_empty() {
            save_individual(&mut tx, &individual, user_version).await?;
        }

        let (aggregate, rank_family) = match individual.family_id {
            Some(family_id) => {
                let outcome = bump_family_counters(
                    &mut tx,
                    family_id,
                    FamilyDelta::for_challenge(award.stars),
                )
                .await?;
                let rank_family = outcome.was_applied().then_some(family_id);
                (outcome, rank_family)
            }
            None => (AggregateOutcome::SkippedNoFamily, None),
        };

        tx.commit().await?;

        self.settle_after_commit(award, aggregate, rank_family).await
    }

    /// Build the catalog slice a goal needs: its referenced achievement,
    /// when the reference resolves.
    ///
    /// A dangling reference is not an error here; the engine reports it
    /// if and only if the completion actually reaches the unlock.
    async fn catalog_for(&self, goal: &Goal) -> Result<InMemoryCatalog, StoreError> {
        let Some(achievement_id) = goal.rewards.achievement_id else {
            return Ok(InMemoryCatalog::new());
        };
        match AchievementStore::new(self.pool.pool()).load(achievement_id).await {
            Ok(achievement) => Ok(InMemoryCatalog::from_achievements(vec![achievement])),
            Err(StoreError::NotFound { .. }) => Ok(InMemoryCatalog::new()),
            Err(e) => Err(e),
        }
    }

    /// Settle a committed event: recalculate ranks where member counters
    /// moved, refresh the cache, and assemble the receipt.
    async fn settle_after_commit(
        &self,
        award: CompletionAward,
        aggregate: AggregateOutcome,
        rank_family: Option<FamilyId>,
    ) -> Result<CompletionReceipt, StoreError> {
        let ranks = match rank_family {
            Some(family_id) => {
                RankService::new(self.pool.pool())
                    .recalculate(family_id)
                    .await?
            }
            None => Vec::new(),
        };

        if let Some(cache) = &self.cache {
            self.refresh_cache(cache, aggregate, rank_family, &ranks).await;
        }

        tracing::info!(
            stars = award.stars,
            coins = award.coins,
            cascaded = award.parent_completed,
            aggregate_applied = aggregate.was_applied(),
            "Completion event settled"
        );

        Ok(CompletionReceipt {
            award,
            aggregate,
            ranks,
        })
    }

    /// Refresh the cache keys the event touched. Best-effort: every
    /// cached key can be rebuilt from PostgreSQL, so failures are
    /// logged, never returned.
    async fn refresh_cache(
        &self,
        cache: &LeaderboardCache,
        aggregate: AggregateOutcome,
        rank_family: Option<FamilyId>,
        ranks: &[RankedMember],
    ) {
        if aggregate.was_applied() {
            let families = FamilyStore::new(self.pool.pool());
            for bucket in PeriodBucket::ALL {
                match families.period_standings(bucket, LEADERBOARD_LIMIT).await {
                    Ok(entries) => {
                        if let Err(e) = cache.store_leaderboard(bucket, &entries).await {
                            tracing::warn!(bucket = ?bucket, error = %e, "Leaderboard cache write failed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(bucket = ?bucket, error = %e, "Leaderboard rebuild query failed");
                    }
                }
            }
        }

        if let Some(family_id) = rank_family
            && let Err(e) = cache.store_family_ranks(family_id, ranks).await
        {
            tracing::warn!(family_id = %family_id, error = %e, "Family rank cache write failed");
        }
    }
}
