//! Adventure template and per-user run persistence.
//!
//! Templates are catalog rows: owned by nobody, written once, read by
//! ID. Runs are keyed by (adventure, user) and carry the usual version
//! column; a missing run row is a valid state, it means the user has
//! not started that adventure yet.

use kinquest_types::ids::{AdventureId, UserId};
use kinquest_types::structs::{Adventure, AdventureProgress};
use sqlx::{PgConnection, PgPool};

use crate::Versioned;
use crate::error::StoreError;

/// Operations on the `adventures` and `adventure_runs` tables.
pub struct AdventureStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AdventureStore<'a> {
    /// Create a new adventure store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =======================================================================
    // Templates
    // =======================================================================

    /// Insert an adventure template.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert(&self, adventure: &Adventure) -> Result<(), StoreError> {
        let doc = serde_json::to_value(adventure)?;

        sqlx::query(r"INSERT INTO adventures (id, doc, created_at) VALUES ($1, $2, $3)")
            .bind(adventure.id.into_inner())
            .bind(doc)
            .bind(adventure.created_at)
            .execute(self.pool)
            .await?;

        tracing::debug!(
            adventure_id = %adventure.id,
            challenges = adventure.challenges.len(),
            "Inserted adventure template"
        );
        Ok(())
    }

    /// Load an adventure template.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such adventure exists.
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn load(&self, adventure_id: AdventureId) -> Result<Adventure, StoreError> {
        let doc: Option<serde_json::Value> =
            sqlx::query_scalar(r"SELECT doc FROM adventures WHERE id = $1")
                .bind(adventure_id.into_inner())
                .fetch_optional(self.pool)
                .await?;

        doc.map_or_else(
            || {
                Err(StoreError::NotFound {
                    entity: "adventure",
                    id: adventure_id.to_string(),
                })
            },
            |doc| Ok(serde_json::from_value(doc)?),
        )
    }

    // =======================================================================
    // Runs
    // =======================================================================

    /// Load one user's run through an adventure, if they have started it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn run(
        &self,
        adventure_id: AdventureId,
        user_id: UserId,
    ) -> Result<Option<Versioned<AdventureProgress>>, StoreError> {
        let row: Option<(serde_json::Value, i64)> = sqlx::query_as(
            r"SELECT doc, version FROM adventure_runs
              WHERE adventure_id = $1 AND user_id = $2",
        )
        .bind(adventure_id.into_inner())
        .bind(user_id.into_inner())
        .fetch_optional(self.pool)
        .await?;

        row.map_or_else(
            || Ok(None),
            |(doc, version)| {
                let record: AdventureProgress = serde_json::from_value(doc)?;
                Ok(Some(Versioned { record, version }))
            },
        )
    }

    /// Insert a fresh run at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if a run for this
    /// (adventure, user) pair already exists.
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert_run(&self, run: &AdventureProgress) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_run(&mut conn, run).await
    }

    /// Save a run against the version observed at load time.
    ///
    /// Returns the new row version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] if the row moved past
    /// `expected_version` since the load.
    /// Returns [`StoreError::Postgres`] if the update fails.
    pub async fn save_run(
        &self,
        run: &AdventureProgress,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        save_run(&mut conn, run, expected_version).await
    }
}

/// Run insert issued on the given connection, so a completion event can
/// cover several documents with one transaction.
///
/// Two racing first-challenge completions both arrive here with no run
/// loaded; `ON CONFLICT DO NOTHING` turns the loser into a version
/// conflict, and its retry then sees the winner's run.
pub(crate) async fn insert_run(
    conn: &mut PgConnection,
    run: &AdventureProgress,
) -> Result<(), StoreError> {
    let doc = serde_json::to_value(run)?;

    let result = sqlx::query(
        r"INSERT INTO adventure_runs (adventure_id, user_id, doc)
          VALUES ($1, $2, $3)
          ON CONFLICT (adventure_id, user_id) DO NOTHING",
    )
    .bind(run.adventure_id.into_inner())
    .bind(run.user_id.into_inner())
    .bind(doc)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::VersionConflict {
            entity: "adventure run",
            id: format!("{}/{}", run.adventure_id, run.user_id),
        });
    }

    tracing::debug!(
        adventure_id = %run.adventure_id,
        user_id = %run.user_id,
        "Inserted adventure run"
    );
    Ok(())
}

/// Versioned run save issued on the given connection.
pub(crate) async fn save_run(
    conn: &mut PgConnection,
    run: &AdventureProgress,
    expected_version: i64,
) -> Result<i64, StoreError> {
    let doc = serde_json::to_value(run)?;

    let new_version: Option<i64> = sqlx::query_scalar(
        r"UPDATE adventure_runs
          SET doc = $3, updated_at = now(), version = version + 1
          WHERE adventure_id = $1 AND user_id = $2 AND version = $4
          RETURNING version",
    )
    .bind(run.adventure_id.into_inner())
    .bind(run.user_id.into_inner())
    .bind(doc)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;

    new_version.map_or_else(
        || {
            Err(StoreError::VersionConflict {
                entity: "adventure run",
                id: format!("{}/{}", run.adventure_id, run.user_id),
            })
        },
        |version| {
            tracing::debug!(
                adventure_id = %run.adventure_id,
                user_id = %run.user_id,
                version,
                "Saved adventure run"
            );
            Ok(version)
        },
    )
}
