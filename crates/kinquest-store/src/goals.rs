//! Goal document persistence.
//!
//! A goal and its embedded task checklist travel as one JSONB document;
//! the owner columns and the completion flag are lifted out so queries
//! can filter without touching the document body. The CHECK constraint
//! on the table enforces the exactly-one-owner rule at the storage layer
//! as well.

use kinquest_types::ids::GoalId;
use kinquest_types::structs::{Goal, GoalOwner};
use sqlx::{PgConnection, PgPool};

use crate::Versioned;
use crate::error::StoreError;

/// Operations on the `goals` table.
pub struct GoalStore<'a> {
    pool: &'a PgPool,
}

impl<'a> GoalStore<'a> {
    /// Create a new goal store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new goal at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the document fails to
    /// serialize.
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert(&self, goal: &Goal) -> Result<(), StoreError> {
        let doc = serde_json::to_value(goal)?;
        let (owner_user_id, owner_family_id) = match goal.owner {
            GoalOwner::Individual(user_id) => (Some(user_id.into_inner()), None),
            GoalOwner::Family(family_id) => (None, Some(family_id.into_inner())),
        };

        sqlx::query(
            r"INSERT INTO goals
              (id, owner_user_id, owner_family_id, is_completed, doc, created_at)
              VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(goal.id.into_inner())
        .bind(owner_user_id)
        .bind(owner_family_id)
        .bind(goal.is_completed)
        .bind(doc)
        .bind(goal.created_at)
        .execute(self.pool)
        .await?;

        tracing::debug!(goal_id = %goal.id, tasks = goal.tasks.len(), "Inserted goal");
        Ok(())
    }

    /// Load a goal together with its current row version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such goal exists.
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn load(&self, goal_id: GoalId) -> Result<Versioned<Goal>, StoreError> {
        let row: Option<(serde_json::Value, i64)> =
            sqlx::query_as(r"SELECT doc, version FROM goals WHERE id = $1")
                .bind(goal_id.into_inner())
                .fetch_optional(self.pool)
                .await?;

        row.map_or_else(
            || {
                Err(StoreError::NotFound {
                    entity: "goal",
                    id: goal_id.to_string(),
                })
            },
            |(doc, version)| {
                let record: Goal = serde_json::from_value(doc)?;
                Ok(Versioned { record, version })
            },
        )
    }

    /// Save a goal against the version observed at load time.
    ///
    /// Returns the new row version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if the row moved past
    /// `expected_version` since the load.
    /// Returns [`StoreError::Postgres`] if the update fails.
    pub async fn save(&self, goal: &Goal, expected_version: i64) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        save_goal(&mut conn, goal, expected_version).await
    }
}

/// Versioned save issued on the given connection, so a completion event
/// can cover several documents with one transaction.
pub(crate) async fn save_goal(
    conn: &mut PgConnection,
    goal: &Goal,
    expected_version: i64,
) -> Result<i64, StoreError> {
    let doc = serde_json::to_value(goal)?;

    let new_version: Option<i64> = sqlx::query_scalar(
        r"UPDATE goals
          SET is_completed = $2, doc = $3, updated_at = now(), version = version + 1
          WHERE id = $1 AND version = $4
          RETURNING version",
    )
    .bind(goal.id.into_inner())
    .bind(goal.is_completed)
    .bind(doc)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;

    new_version.map_or_else(
        || {
            Err(StoreError::VersionConflict {
                entity: "goal",
                id: goal.id.to_string(),
            })
        },
        |version| {
            tracing::debug!(goal_id = %goal.id, version, "Saved goal");
            Ok(version)
        },
    )
}
