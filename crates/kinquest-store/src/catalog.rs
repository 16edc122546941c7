//! Achievement catalog persistence.
//!
//! Achievements are catalog rows like adventure templates. The completion
//! flow loads the definitions it needs into an [`InMemoryCatalog`] before
//! the engine runs, keeping the engine free of connection handles.

use kinquest_ledger::InMemoryCatalog;
use kinquest_types::ids::AchievementId;
use kinquest_types::structs::Achievement;
use sqlx::PgPool;

use crate::error::StoreError;

/// Operations on the `achievements` table.
pub struct AchievementStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AchievementStore<'a> {
    /// Create a new achievement store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an achievement definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert(&self, achievement: &Achievement) -> Result<(), StoreError> {
        let doc = serde_json::to_value(achievement)?;

        sqlx::query(r"INSERT INTO achievements (id, doc, created_at) VALUES ($1, $2, $3)")
            .bind(achievement.id.into_inner())
            .bind(doc)
            .bind(achievement.created_at)
            .execute(self.pool)
            .await?;

        tracing::debug!(achievement_id = %achievement.id, "Inserted achievement");
        Ok(())
    }

    /// Load one achievement definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such achievement exists.
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn load(&self, achievement_id: AchievementId) -> Result<Achievement, StoreError> {
        let doc: Option<serde_json::Value> =
            sqlx::query_scalar(r"SELECT doc FROM achievements WHERE id = $1")
                .bind(achievement_id.into_inner())
                .fetch_optional(self.pool)
                .await?;

        doc.map_or_else(
            || {
                Err(StoreError::NotFound {
                    entity: "achievement",
                    id: achievement_id.to_string(),
                })
            },
            |doc| Ok(serde_json::from_value(doc)?),
        )
    }

    /// Load every definition into an in-memory catalog.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn load_catalog(&self) -> Result<InMemoryCatalog, StoreError> {
        let docs: Vec<serde_json::Value> = sqlx::query_scalar(r"SELECT doc FROM achievements")
            .fetch_all(self.pool)
            .await?;

        let achievements = docs
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Achievement>, _>>()?;

        tracing::debug!(achievements = achievements.len(), "Loaded achievement catalog");
        Ok(InMemoryCatalog::from_achievements(achievements))
    }
}
