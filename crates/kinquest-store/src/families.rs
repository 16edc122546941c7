//! Family document persistence and aggregate counter arithmetic.
//!
//! The family row has two write paths with different concurrency stories.
//! Document saves (name, unlocks, counter snapshots from an in-memory
//! merge) go through the versioned CAS like every other document. Counter
//! bumps from completion events are atomic SQL arithmetic instead, so
//! concurrent events add up rather than conflict. Both paths move the
//! version column, which keeps the CAS honest about counter movement.
//!
//! The period resets and the leaderboard read also live here; both are
//! plain column operations on the bucket counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kinquest_ledger::{Standing, dense_ranks};
use kinquest_types::awards::{AggregateOutcome, FamilyDelta, LeaderboardEntry};
use kinquest_types::enums::{FamilyRole, PeriodBucket};
use kinquest_types::ids::{FamilyId, UserId};
use kinquest_types::structs::{Family, FamilyMember, PeriodTotals, UnlockedAchievement};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::Versioned;
use crate::error::StoreError;

/// Delta for a task completion: stars into every star bucket, one task
/// into every task bucket.
const APPLY_DELTA_WITH_TASK_SQL: &str = r"UPDATE families
    SET total_stars = total_stars + $2,
        daily_stars = daily_stars + $2,
        weekly_stars = weekly_stars + $2,
        monthly_stars = monthly_stars + $2,
        yearly_stars = yearly_stars + $2,
        daily_tasks = daily_tasks + 1,
        weekly_tasks = weekly_tasks + 1,
        monthly_tasks = monthly_tasks + 1,
        yearly_tasks = yearly_tasks + 1,
        version = version + 1
    WHERE id = $1
    RETURNING total_stars";

/// Delta for a challenge completion: challenges are not tasks, so only
/// the star counters move.
const APPLY_DELTA_STARS_ONLY_SQL: &str = r"UPDATE families
    SET total_stars = total_stars + $2,
        daily_stars = daily_stars + $2,
        weekly_stars = weekly_stars + $2,
        monthly_stars = monthly_stars + $2,
        yearly_stars = yearly_stars + $2,
        version = version + 1
    WHERE id = $1
    RETURNING total_stars";

/// Operations on the `families` and `family_members` tables.
pub struct FamilyStore<'a> {
    pool: &'a PgPool,
}

impl<'a> FamilyStore<'a> {
    /// Create a new family store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =======================================================================
    // Documents
    // =======================================================================

    /// Insert a new family at version 1, roster entries included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if an insert fails.
    pub async fn insert(&self, family: &Family) -> Result<(), StoreError> {
        let unlocked = serde_json::to_value(&family.unlocked)?;

        sqlx::query(
            r"INSERT INTO families
              (id, name, total_stars, coins,
               daily_stars, weekly_stars, monthly_stars, yearly_stars,
               daily_tasks, weekly_tasks, monthly_tasks, yearly_tasks,
               unlocked, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(family.id.into_inner())
        .bind(&family.name)
        .bind(i64::try_from(family.total_stars).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.coins).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_stars.daily).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_stars.weekly).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_stars.monthly).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_stars.yearly).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_tasks.daily).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_tasks.weekly).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_tasks.monthly).unwrap_or(i64::MAX))
        .bind(i64::try_from(family.period_tasks.yearly).unwrap_or(i64::MAX))
        .bind(unlocked)
        .bind(family.created_at)
        .execute(self.pool)
        .await?;

        for member in &family.members {
            self.insert_member(family.id, member).await?;
        }

        tracing::debug!(family_id = %family.id, members = family.members.len(), "Inserted family");
        Ok(())
    }

    /// Add one roster entry to an existing family.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert_member(
        &self,
        family_id: FamilyId,
        member: &FamilyMember,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO family_members (family_id, member_id, role, rank)
              VALUES ($1, $2, $3, $4)",
        )
        .bind(family_id.into_inner())
        .bind(member.member_id.into_inner())
        .bind(role_to_db(member.role))
        .bind(i32::try_from(member.rank).unwrap_or(i32::MAX))
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Load a family with its roster and current row version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such family exists.
    /// Returns [`StoreError::Postgres`] if a query fails.
    pub async fn load(&self, family_id: FamilyId) -> Result<Versioned<Family>, StoreError> {
        let row = sqlx::query_as::<_, FamilyRow>(
            r"SELECT id, name, total_stars, coins,
                     daily_stars, weekly_stars, monthly_stars, yearly_stars,
                     daily_tasks, weekly_tasks, monthly_tasks, yearly_tasks,
                     unlocked, version, created_at
              FROM families
              WHERE id = $1",
        )
        .bind(family_id.into_inner())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            entity: "family",
            id: family_id.to_string(),
        })?;

        let members = sqlx::query_as::<_, MemberRow>(
            r"SELECT member_id, role, rank
              FROM family_members
              WHERE family_id = $1
              ORDER BY rank, member_id",
        )
        .bind(family_id.into_inner())
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(MemberRow::into_member)
        .collect::<Result<Vec<_>, _>>()?;

        row.into_versioned(members)
    }

    /// Save a family document against the version observed at load time.
    ///
    /// Returns the new row version. The roster is maintained through
    /// [`Self::insert_member`] and the rank recalculator, not through
    /// saves.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if the row moved past
    /// `expected_version` since the load.
    /// Returns [`StoreError::Postgres`] if the update fails.
    pub async fn save(&self, family: &Family, expected_version: i64) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        save_family(&mut conn, family, expected_version).await
    }

    // =======================================================================
    // Aggregate counters
    // =======================================================================

    /// Fold one completion event into the family counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such family exists.
    /// Returns [`StoreError::Postgres`] if the update fails.
    pub async fn apply_delta(
        &self,
        family_id: FamilyId,
        delta: FamilyDelta,
    ) -> Result<AggregateOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        bump_family_counters(&mut conn, family_id, delta).await
    }

    /// Zero one period bucket across every family that has non-zero
    /// counters for it. Returns the number of families touched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the update fails.
    pub async fn reset_period(&self, bucket: PeriodBucket) -> Result<u64, StoreError> {
        let result = sqlx::query(reset_sql(bucket)).execute(self.pool).await?;
        let families = result.rows_affected();
        tracing::info!(bucket = ?bucket, families, "Reset period counters");
        Ok(families)
    }

    /// The cross-family standings for one period bucket, dense-ranked
    /// best-first, at most `limit` entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn period_standings(
        &self,
        bucket: PeriodBucket,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let rows = sqlx::query_as::<_, StandingRow>(standings_sql(bucket))
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        let mut names: BTreeMap<FamilyId, String> = BTreeMap::new();
        let standings: Vec<Standing<FamilyId>> = rows
            .into_iter()
            .map(|row| {
                let id = FamilyId::from(row.id);
                names.insert(id, row.name);
                Standing {
                    id,
                    stars: u64::try_from(row.stars).unwrap_or(0),
                    tasks_completed: u64::try_from(row.tasks).unwrap_or(0),
                }
            })
            .collect();

        let entries = dense_ranks(&standings)
            .into_iter()
            .map(|ranked| LeaderboardEntry {
                family_id: ranked.id,
                name: names.remove(&ranked.id).unwrap_or_default(),
                stars: ranked.stars,
                tasks_completed: ranked.tasks_completed,
                rank: ranked.rank,
            })
            .collect();

        Ok(entries)
    }
}

/// Versioned save issued on the given connection, so a completion event
/// can cover several documents with one transaction.
pub(crate) async fn save_family(
    conn: &mut PgConnection,
    family: &Family,
    expected_version: i64,
) -> Result<i64, StoreError> {
    let unlocked = serde_json::to_value(&family.unlocked)?;

    let new_version: Option<i64> = sqlx::query_scalar(
        r"UPDATE families
          SET name = $2, total_stars = $3, coins = $4,
              daily_stars = $5, weekly_stars = $6, monthly_stars = $7, yearly_stars = $8,
              daily_tasks = $9, weekly_tasks = $10, monthly_tasks = $11, yearly_tasks = $12,
              unlocked = $13,
              version = version + 1
          WHERE id = $1 AND version = $14
          RETURNING version",
    )
    .bind(family.id.into_inner())
    .bind(&family.name)
    .bind(i64::try_from(family.total_stars).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.coins).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_stars.daily).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_stars.weekly).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_stars.monthly).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_stars.yearly).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_tasks.daily).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_tasks.weekly).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_tasks.monthly).unwrap_or(i64::MAX))
    .bind(i64::try_from(family.period_tasks.yearly).unwrap_or(i64::MAX))
    .bind(unlocked)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;

    new_version.map_or_else(
        || {
            Err(StoreError::VersionConflict {
                entity: "family",
                id: family.id.to_string(),
            })
        },
        |version| {
            tracing::debug!(family_id = %family.id, version, "Saved family");
            Ok(version)
        },
    )
}

/// Atomic counter bump issued on the given connection.
///
/// An empty delta (no stars, no task) touches nothing and reports the
/// skip; otherwise the SQL adds to every affected bucket in one
/// statement, so concurrent events never lose increments.
pub(crate) async fn bump_family_counters(
    conn: &mut PgConnection,
    family_id: FamilyId,
    delta: FamilyDelta,
) -> Result<AggregateOutcome, StoreError> {
    if delta.stars == 0 && !delta.task_completed {
        return Ok(AggregateOutcome::SkippedEmptyDelta);
    }

    let sql = if delta.task_completed {
        APPLY_DELTA_WITH_TASK_SQL
    } else {
        APPLY_DELTA_STARS_ONLY_SQL
    };

    let total: Option<i64> = sqlx::query_scalar(sql)
        .bind(family_id.into_inner())
        .bind(i64::try_from(delta.stars).unwrap_or(i64::MAX))
        .fetch_optional(&mut *conn)
        .await?;

    total.map_or_else(
        || {
            Err(StoreError::NotFound {
                entity: "family",
                id: family_id.to_string(),
            })
        },
        |total| {
            let total_stars = u64::try_from(total).unwrap_or(0);
            tracing::debug!(
                family_id = %family_id,
                stars = delta.stars,
                task = delta.task_completed,
                total_stars,
                "Applied family delta"
            );
            Ok(AggregateOutcome::Applied {
                family_id,
                total_stars,
            })
        },
    )
}

const fn reset_sql(bucket: PeriodBucket) -> &'static str {
    match bucket {
        PeriodBucket::Daily => {
            r"UPDATE families
              SET daily_stars = 0, daily_tasks = 0, version = version + 1
              WHERE daily_stars <> 0 OR daily_tasks <> 0"
        }
        PeriodBucket::Weekly => {
            r"UPDATE families
              SET weekly_stars = 0, weekly_tasks = 0, version = version + 1
              WHERE weekly_stars <> 0 OR weekly_tasks <> 0"
        }
        PeriodBucket::Monthly => {
            r"UPDATE families
              SET monthly_stars = 0, monthly_tasks = 0, version = version + 1
              WHERE monthly_stars <> 0 OR monthly_tasks <> 0"
        }
        PeriodBucket::Yearly => {
            r"UPDATE families
              SET yearly_stars = 0, yearly_tasks = 0, version = version + 1
              WHERE yearly_stars <> 0 OR yearly_tasks <> 0"
        }
    }
}

const fn standings_sql(bucket: PeriodBucket) -> &'static str {
    match bucket {
        PeriodBucket::Daily => {
            r"SELECT id, name, daily_stars AS stars, daily_tasks AS tasks
              FROM families
              ORDER BY daily_stars DESC, daily_tasks DESC, id
              LIMIT $1"
        }
        PeriodBucket::Weekly => {
            r"SELECT id, name, weekly_stars AS stars, weekly_tasks AS tasks
              FROM families
              ORDER BY weekly_stars DESC, weekly_tasks DESC, id
              LIMIT $1"
        }
        PeriodBucket::Monthly => {
            r"SELECT id, name, monthly_stars AS stars, monthly_tasks AS tasks
              FROM families
              ORDER BY monthly_stars DESC, monthly_tasks DESC, id
              LIMIT $1"
        }
        PeriodBucket::Yearly => {
            r"SELECT id, name, yearly_stars AS stars, yearly_tasks AS tasks
              FROM families
              ORDER BY yearly_stars DESC, yearly_tasks DESC, id
              LIMIT $1"
        }
    }
}

const fn role_to_db(role: FamilyRole) -> &'static str {
    match role {
        FamilyRole::Parent => "parent",
        FamilyRole::Child => "child",
    }
}

fn role_from_db(raw: &str) -> Result<FamilyRole, StoreError> {
    match raw {
        "parent" => Ok(FamilyRole::Parent),
        "child" => Ok(FamilyRole::Child),
        other => Err(StoreError::Config(format!(
            "unknown family role '{other}' in database"
        ))),
    }
}

/// A row from the `families` table.
#[derive(Debug, sqlx::FromRow)]
struct FamilyRow {
    id: Uuid,
    name: String,
    total_stars: i64,
    coins: i64,
    daily_stars: i64,
    weekly_stars: i64,
    monthly_stars: i64,
    yearly_stars: i64,
    daily_tasks: i64,
    weekly_tasks: i64,
    monthly_tasks: i64,
    yearly_tasks: i64,
    unlocked: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
}

impl FamilyRow {
    fn into_versioned(self, members: Vec<FamilyMember>) -> Result<Versioned<Family>, StoreError> {
        let unlocked: Vec<UnlockedAchievement> = serde_json::from_value(self.unlocked)?;
        let record = Family {
            id: FamilyId::from(self.id),
            name: self.name,
            total_stars: u64::try_from(self.total_stars).unwrap_or(0),
            coins: u64::try_from(self.coins).unwrap_or(0),
            period_stars: PeriodTotals {
                daily: u64::try_from(self.daily_stars).unwrap_or(0),
                weekly: u64::try_from(self.weekly_stars).unwrap_or(0),
                monthly: u64::try_from(self.monthly_stars).unwrap_or(0),
                yearly: u64::try_from(self.yearly_stars).unwrap_or(0),
            },
            period_tasks: PeriodTotals {
                daily: u64::try_from(self.daily_tasks).unwrap_or(0),
                weekly: u64::try_from(self.weekly_tasks).unwrap_or(0),
                monthly: u64::try_from(self.monthly_tasks).unwrap_or(0),
                yearly: u64::try_from(self.yearly_tasks).unwrap_or(0),
            },
            members,
            unlocked,
            created_at: self.created_at,
        };
        Ok(Versioned {
            record,
            version: self.version,
        })
    }
}

/// A standings row from the `families` table, one period bucket's
/// counters aliased to `stars` and `tasks`.
#[derive(Debug, sqlx::FromRow)]
struct StandingRow {
    id: Uuid,
    name: String,
    stars: i64,
    tasks: i64,
}

/// A roster row from the `family_members` table.
#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    member_id: Uuid,
    role: String,
    rank: i32,
}

impl MemberRow {
    fn into_member(self) -> Result<FamilyMember, StoreError> {
        Ok(FamilyMember {
            member_id: UserId::from(self.member_id),
            role: role_from_db(&self.role)?,
            rank: u32::try_from(self.rank).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_roundtrip_through_their_db_strings() {
        for role in [FamilyRole::Parent, FamilyRole::Child] {
            let parsed = role_from_db(role_to_db(role));
            assert_eq!(parsed.ok(), Some(role));
        }
    }

    #[test]
    fn unknown_role_string_is_rejected() {
        let result = role_from_db("grandparent");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn reset_sql_touches_only_its_bucket() {
        let sql = reset_sql(PeriodBucket::Weekly);
        assert!(sql.contains("weekly_stars = 0"));
        assert!(sql.contains("weekly_tasks = 0"));
        assert!(!sql.contains("daily"));
        assert!(!sql.contains("monthly"));
        assert!(!sql.contains("yearly"));
    }

    #[test]
    fn standings_sql_orders_by_the_bucket_counters() {
        let sql = standings_sql(PeriodBucket::Monthly);
        assert!(sql.contains("monthly_stars DESC, monthly_tasks DESC"));
    }
}
