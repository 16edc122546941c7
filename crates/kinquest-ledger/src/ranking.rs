//! Dense tie-aware ranking over reward standings.
//!
//! The same rule serves both leaderboards in the product: members ranked
//! within their family by lifetime counters, and families ranked against
//! each other by period counters. Ordering is by `(stars, tasks_completed)`
//! descending -- stars decide, completed tasks break ties.
//!
//! Ranks are **dense**: tied entries share a rank and the next distinct
//! entry gets the previous rank plus one. Two members tied at the top are
//! both rank 1 and the runner-up is rank 2, not rank 3.

use kinquest_types::awards::RankedMember;
use kinquest_types::ids::UserId;

// ---------------------------------------------------------------------------
// Standings
// ---------------------------------------------------------------------------

/// One entity's counters entering a ranking pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing<Id> {
    /// The entity being ranked.
    pub id: Id,
    /// Primary sort key, descending.
    pub stars: u64,
    /// Tiebreak sort key, descending.
    pub tasks_completed: u64,
}

impl<Id> Standing<Id> {
    /// The composite sort key, larger means better.
    pub const fn sort_key(&self) -> (u64, u64) {
        (self.stars, self.tasks_completed)
    }
}

/// One entity's position after a ranking pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranked<Id> {
    /// The ranked entity.
    pub id: Id,
    /// Stars at ranking time.
    pub stars: u64,
    /// Completed tasks at ranking time.
    pub tasks_completed: u64,
    /// Dense rank, starting at 1.
    pub rank: u32,
}

impl From<Ranked<UserId>> for RankedMember {
    fn from(ranked: Ranked<UserId>) -> Self {
        Self {
            member_id: ranked.id,
            stars: ranked.stars,
            tasks_completed: ranked.tasks_completed,
            rank: ranked.rank,
        }
    }
}

// ---------------------------------------------------------------------------
// Dense ranking
// ---------------------------------------------------------------------------

/// Assign dense ranks to the given standings.
///
/// The result is sorted best-first. Entries with identical
/// `(stars, tasks_completed)` share a rank; the entry after a tied group
/// gets the group's rank plus one. Re-running on unchanged standings
/// produces identical output, and entries that tie keep their input order
/// relative to each other (the sort is stable).
pub fn dense_ranks<Id: Copy>(standings: &[Standing<Id>]) -> Vec<Ranked<Id>> {
    let mut sorted: Vec<Standing<Id>> = standings.to_vec();
    sorted.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));

    let mut ranked = Vec::with_capacity(sorted.len());
    let mut rank: u32 = 0;
    let mut previous_key: Option<(u64, u64)> = None;

    for standing in sorted {
        let key = standing.sort_key();
        if previous_key != Some(key) {
            rank = rank.saturating_add(1);
            previous_key = Some(key);
        }
        ranked.push(Ranked {
            id: standing.id,
            stars: standing.stars,
            tasks_completed: standing.tasks_completed,
            rank,
        });
    }

    ranked
}
