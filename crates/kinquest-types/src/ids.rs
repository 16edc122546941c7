//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity in the system has a strongly-typed ID to prevent accidental
//! mixing of identifiers at compile time. All IDs use UUID v7 (time-ordered)
//! for efficient database indexing.
//!
//! Inserts from this codebase always bind an app-generated v7 ID; the
//! `gen_random_uuid()` column defaults only cover rows created by hand.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an individual user.
    UserId
}

define_id! {
    /// Unique identifier for a family unit.
    FamilyId
}

define_id! {
    /// Unique identifier for a goal.
    GoalId
}

define_id! {
    /// Unique identifier for a task embedded in a goal.
    TaskId
}

define_id! {
    /// Unique identifier for an adventure template.
    AdventureId
}

define_id! {
    /// Unique identifier for a challenge within an adventure.
    ChallengeId
}

define_id! {
    /// Unique identifier for an achievement in the catalog.
    AchievementId
}
