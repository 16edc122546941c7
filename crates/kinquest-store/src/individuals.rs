//! Individual document persistence.
//!
//! Balances and counters are plain columns so they index and aggregate
//! cheaply; the unlock list rides along as JSONB. Every row carries a
//! version column, and saves are optimistic: the write only lands when
//! the version still matches the one the load observed.

use chrono::{DateTime, Utc};
use kinquest_types::ids::{FamilyId, UserId};
use kinquest_types::structs::{Individual, UnlockedAchievement};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::Versioned;
use crate::error::StoreError;

/// Operations on the `individuals` table.
pub struct IndividualStore<'a> {
    pool: &'a PgPool,
}

impl<'a> IndividualStore<'a> {
    /// Create a new individual store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new individual at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert(&self, individual: &Individual) -> Result<(), StoreError> {
        let unlocked = serde_json::to_value(&individual.unlocked)?;

        sqlx::query(
            r"INSERT INTO individuals
              (id, display_name, family_id, stars, coins, tasks_completed, rank_in_family, unlocked, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(individual.id.into_inner())
        .bind(&individual.display_name)
        .bind(individual.family_id.map(FamilyId::into_inner))
        .bind(i64::try_from(individual.stars).unwrap_or(i64::MAX))
        .bind(i64::try_from(individual.coins).unwrap_or(i64::MAX))
        .bind(i64::try_from(individual.tasks_completed).unwrap_or(i64::MAX))
        .bind(i32::try_from(individual.rank_in_family).unwrap_or(i32::MAX))
        .bind(unlocked)
        .bind(individual.created_at)
        .execute(self.pool)
        .await?;

        tracing::debug!(user_id = %individual.id, "Inserted individual");
        Ok(())
    }

    /// Load an individual together with its current row version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such individual exists.
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn load(&self, user_id: UserId) -> Result<Versioned<Individual>, StoreError> {
        let row = sqlx::query_as::<_, IndividualRow>(
            r"SELECT id, display_name, family_id, stars, coins, tasks_completed,
                     rank_in_family, unlocked, version, created_at
              FROM individuals
              WHERE id = $1",
        )
        .bind(user_id.into_inner())
        .fetch_optional(self.pool)
        .await?;

        row.map_or_else(
            || {
                Err(StoreError::NotFound {
                    entity: "individual",
                    id: user_id.to_string(),
                })
            },
            IndividualRow::into_versioned,
        )
    }

    /// Save an individual against the version observed at load time.
    ///
    /// Returns the new row version. A save against a row that was deleted
    /// in the meantime reports a conflict as well.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if the row moved past
    /// `expected_version` since the load.
    /// Returns [`StoreError::Postgres`] if the update fails.
    pub async fn save(
        &self,
        individual: &Individual,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        save_individual(&mut conn, individual, expected_version).await
    }
}

/// Versioned save issued on the given connection, so a completion event
/// can cover several documents with one transaction.
pub(crate) async fn save_individual(
    conn: &mut PgConnection,
    individual: &Individual,
    expected_version: i64,
) -> Result<i64, StoreError> {
    let unlocked = serde_json::to_value(&individual.unlocked)?;

    let new_version: Option<i64> = sqlx::query_scalar(
        r"UPDATE individuals
          SET display_name = $2, family_id = $3, stars = $4, coins = $5,
              tasks_completed = $6, rank_in_family = $7, unlocked = $8,
              version = version + 1
          WHERE id = $1 AND version = $9
          RETURNING version",
    )
    .bind(individual.id.into_inner())
    .bind(&individual.display_name)
    .bind(individual.family_id.map(FamilyId::into_inner))
    .bind(i64::try_from(individual.stars).unwrap_or(i64::MAX))
    .bind(i64::try_from(individual.coins).unwrap_or(i64::MAX))
    .bind(i64::try_from(individual.tasks_completed).unwrap_or(i64::MAX))
    .bind(i32::try_from(individual.rank_in_family).unwrap_or(i32::MAX))
    .bind(unlocked)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;

    new_version.map_or_else(
        || {
            Err(StoreError::VersionConflict {
                entity: "individual",
                id: individual.id.to_string(),
            })
        },
        |version| {
            tracing::debug!(user_id = %individual.id, version, "Saved individual");
            Ok(version)
        },
    )
}

/// A row from the `individuals` table.
#[derive(Debug, sqlx::FromRow)]
struct IndividualRow {
    id: Uuid,
    display_name: String,
    family_id: Option<Uuid>,
    stars: i64,
    coins: i64,
    tasks_completed: i64,
    rank_in_family: i32,
    unlocked: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
}

impl IndividualRow {
    fn into_versioned(self) -> Result<Versioned<Individual>, StoreError> {
        let unlocked: Vec<UnlockedAchievement> = serde_json::from_value(self.unlocked)?;
        let record = Individual {
            id: UserId::from(self.id),
            display_name: self.display_name,
            family_id: self.family_id.map(FamilyId::from),
            stars: u64::try_from(self.stars).unwrap_or(0),
            coins: u64::try_from(self.coins).unwrap_or(0),
            tasks_completed: u64::try_from(self.tasks_completed).unwrap_or(0),
            rank_in_family: u32::try_from(self.rank_in_family).unwrap_or(0),
            unlocked,
            created_at: self.created_at,
        };
        Ok(Versioned {
            record,
            version: self.version,
        })
    }
}
