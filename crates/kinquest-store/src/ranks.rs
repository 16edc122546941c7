//! Family rank recalculation.
//!
//! Ranks order members within a family by lifetime counters, stars
//! first and completed tasks as the tiebreak. The computed dense rank
//! is cached in two places clients read without joining: the
//! individual row and the family roster entry. This service recomputes
//! both from the live counters.

use kinquest_ledger::{Standing, dense_ranks};
use kinquest_types::awards::RankedMember;
use kinquest_types::ids::{FamilyId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

/// Recomputes and persists the cached member ranks of a family.
pub struct RankService<'a> {
    pool: &'a PgPool,
}

impl<'a> RankService<'a> {
    /// Create a new rank service bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Recalculate every member's rank from the live counters and write
    /// the cached rank columns.
    ///
    /// Returns the fresh standings best-first. A family with no members
    /// ranks to an empty list without touching the database.
    ///
    /// Rank columns are caches of derived data; rewriting them does not
    /// move document versions, so a recalculation never conflicts with
    /// a concurrent completion save.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if a query fails.
    pub async fn recalculate(&self, family_id: FamilyId) -> Result<Vec<RankedMember>, StoreError> {
        let rows = sqlx::query_as::<_, MemberCountersRow>(
            r"SELECT id, stars, tasks_completed
              FROM individuals
              WHERE family_id = $1
              ORDER BY id",
        )
        .bind(family_id.into_inner())
        .fetch_all(self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let standings: Vec<Standing<UserId>> = rows
            .into_iter()
            .map(|row| Standing {
                id: UserId::from(row.id),
                stars: u64::try_from(row.stars).unwrap_or(0),
                tasks_completed: u64::try_from(row.tasks_completed).unwrap_or(0),
            })
            .collect();

        let ranked = dense_ranks(&standings);

        let ids: Vec<Uuid> = ranked.iter().map(|r| r.id.into_inner()).collect();
        let ranks: Vec<i32> = ranked
            .iter()
            .map(|r| i32::try_from(r.rank).unwrap_or(i32::MAX))
            .collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"UPDATE individuals AS i
              SET rank_in_family = u.rank
              FROM UNNEST($1::UUID[], $2::INT[]) AS u(id, rank)
              WHERE i.id = u.id",
        )
        .bind(&ids)
        .bind(&ranks)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"UPDATE family_members AS m
              SET rank = u.rank
              FROM UNNEST($2::UUID[], $3::INT[]) AS u(member_id, rank)
              WHERE m.family_id = $1 AND m.member_id = u.member_id",
        )
        .bind(family_id.into_inner())
        .bind(&ids)
        .bind(&ranks)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            family_id = %family_id,
            members = ranked.len(),
            "Recalculated family ranks"
        );

        Ok(ranked.into_iter().map(RankedMember::from).collect())
    }
}

/// The ranking inputs for one member.
#[derive(Debug, sqlx::FromRow)]
struct MemberCountersRow {
    id: Uuid,
    stars: i64,
    tasks_completed: i64,
}
