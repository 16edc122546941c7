//! Achievement catalog lookup seam.
//!
//! Goal completion can unlock an achievement, so the reward applier needs
//! to resolve achievement references while it runs. The [`AchievementCatalog`]
//! trait abstracts where those definitions come from -- the data layer
//! provides a database-backed snapshot, tests use [`InMemoryCatalog`].
//!
//! Lookups are synchronous: the catalog is a snapshot loaded before the
//! engine runs, never a live connection.

use std::collections::BTreeMap;

use kinquest_types::{Achievement, AchievementId};

/// A resolvable set of achievement definitions.
pub trait AchievementCatalog {
    /// Look up an achievement by ID.
    ///
    /// Returns `None` when the catalog does not contain the ID; the reward
    /// applier turns that into a dangling-reference error rather than
    /// skipping the unlock.
    fn achievement(&self, id: AchievementId) -> Option<&Achievement>;
}

/// A catalog held entirely in memory.
///
/// The data layer builds one of these from the achievements referenced by
/// the documents it loads; tests build them directly.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    achievements: BTreeMap<AchievementId, Achievement>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub const fn new() -> Self {
        Self {
            achievements: BTreeMap::new(),
        }
    }

    /// Build a catalog from a list of definitions.
    pub fn from_achievements(achievements: Vec<Achievement>) -> Self {
        let achievements = achievements.into_iter().map(|a| (a.id, a)).collect();
        Self { achievements }
    }

    /// Add one definition, replacing any previous entry with the same ID.
    pub fn insert(&mut self, achievement: Achievement) {
        self.achievements.insert(achievement.id, achievement);
    }

    /// Number of definitions in the catalog.
    pub fn len(&self) -> usize {
        self.achievements.len()
    }

    /// Whether the catalog holds no definitions.
    pub fn is_empty(&self) -> bool {
        self.achievements.is_empty()
    }
}

impl AchievementCatalog for InMemoryCatalog {
    fn achievement(&self, id: AchievementId) -> Option<&Achievement> {
        self.achievements.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kinquest_types::{Rewards, Scope};

    use super::*;

    fn achievement(title: &str) -> Achievement {
        Achievement {
            id: AchievementId::new(),
            title: String::from(title),
            kind: Scope::Personal,
            criteria: String::from("Complete a goal"),
            rewards: Rewards::new(25, 10),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lookup_finds_inserted_definitions() {
        let first = achievement("Early Bird");
        let id = first.id;
        let catalog = InMemoryCatalog::from_achievements(vec![first, achievement("Night Owl")]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.achievement(id).is_some());
    }

    #[test]
    fn lookup_misses_unknown_ids() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.achievement(AchievementId::new()).is_none());
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut first = achievement("Early Bird");
        let id = first.id;
        let mut catalog = InMemoryCatalog::new();
        catalog.insert(first.clone());
        first.title = String::from("Earlier Bird");
        catalog.insert(first);
        assert_eq!(catalog.len(), 1);
        assert!(
            catalog
                .achievement(id)
                .is_some_and(|a| a.title == "Earlier Bird")
        );
    }
}
