//! Error types for the data layer.
//!
//! All errors are propagated via [`StoreError`] which wraps the underlying
//! [`sqlx`], [`fred`], and engine errors with additional context about
//! which document the operation was working on.

use kinquest_ledger::{EngineError, ErrorKind};

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A cache operation failed.
    #[error("Cache error: {0}")]
    Cache(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The engine rejected the completion event.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// A referenced document does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// The collection that was searched.
        entity: &'static str,
        /// The missing document's ID.
        id: String,
    },

    /// A versioned save lost its optimistic-concurrency race.
    #[error("{entity} {id} was modified concurrently")]
    VersionConflict {
        /// The collection holding the contended document.
        entity: &'static str,
        /// The contended document's ID.
        id: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// The coarse category of this error, for status-code mapping.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine(e) => e.kind(),
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Postgres(_)
            | Self::Migration(_)
            | Self::Cache(_)
            | Self::Serialization(_)
            | Self::VersionConflict { .. }
            | Self::Config(_) => ErrorKind::Persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use kinquest_types::ids::TaskId;

    use super::*;

    #[test]
    fn engine_errors_keep_their_kind() {
        let task_id = TaskId::new();
        let err = StoreError::Engine(EngineError::TaskAlreadyCompleted { task_id });
        assert_eq!(err.kind(), ErrorKind::AlreadyCompleted);
        assert!(err.to_string().contains(&task_id.to_string()));
    }

    #[test]
    fn store_failures_map_to_persistence() {
        let err = StoreError::VersionConflict {
            entity: "individual",
            id: String::from("abc"),
        };
        assert_eq!(err.kind(), ErrorKind::Persistence);

        let missing = StoreError::NotFound {
            entity: "goal",
            id: String::from("abc"),
        };
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
