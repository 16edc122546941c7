//! Enumeration types for the KinQuest domain.
//!
//! Every loosely-shaped "type" field from the client data model is a closed
//! enum here. Serialization uses the variant names verbatim, so the database
//! and the `TypeScript` bindings agree on the wire strings.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Whether a goal or achievement belongs to a single member or to the
/// whole family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Scope {
    /// Belongs to one individual member.
    Personal,
    /// Shared by the whole family.
    Family,
}

// ---------------------------------------------------------------------------
// Family roles
// ---------------------------------------------------------------------------

/// The role of a member within their family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum FamilyRole {
    /// Adult member; can manage goals and approve completions.
    Parent,
    /// Child member; completes tasks and earns rewards.
    Child,
}

// ---------------------------------------------------------------------------
// Adventure status
// ---------------------------------------------------------------------------

/// Lifecycle state of an individual's run through an adventure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum AdventureStatus {
    /// At least one challenge remains incomplete.
    InProgress,
    /// Every challenge is complete and the adventure reward was granted.
    Completed,
}

// ---------------------------------------------------------------------------
// Period buckets
// ---------------------------------------------------------------------------

/// A rolling time window for family leaderboard counters.
///
/// Each bucket accumulates independently on every completion event and is
/// zeroed by its scheduled reset at the calendar boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum PeriodBucket {
    /// Reset every day at 00:00.
    Daily,
    /// Reset every Sunday at 00:00.
    Weekly,
    /// Reset on the 1st of every month at 00:00.
    Monthly,
    /// Reset on January 1 at 00:00.
    Yearly,
}

impl PeriodBucket {
    /// All buckets in reset-frequency order.
    pub const ALL: [Self; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_list_covers_all_variants() {
        assert_eq!(PeriodBucket::ALL.len(), 4);
        assert!(PeriodBucket::ALL.contains(&PeriodBucket::Daily));
        assert!(PeriodBucket::ALL.contains(&PeriodBucket::Yearly));
    }

    #[test]
    fn scope_serializes_as_variant_name() {
        let json = serde_json::to_string(&Scope::Personal).unwrap_or_default();
        assert_eq!(json, "\"Personal\"");
    }
}
