//! Leaderboard cache (Redis-compatible) operations.
//!
//! The cache holds the rendered standings payloads the clients poll:
//! the four period leaderboards and the per-family member ranks.
//! PostgreSQL stays the source of truth and every key here can be
//! rebuilt from it, so writes are refreshes and a miss is an ordinary
//! answer, not an error.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `leaderboard:daily` | JSON | Daily family standings |
//! | `leaderboard:weekly` | JSON | Weekly family standings |
//! | `leaderboard:monthly` | JSON | Monthly family standings |
//! | `leaderboard:yearly` | JSON | Yearly family standings |
//! | `family:{id}:ranks` | JSON | Member standings within one family |

use fred::prelude::*;
use kinquest_types::awards::{LeaderboardEntry, RankedMember};
use kinquest_types::enums::PeriodBucket;
use kinquest_types::ids::FamilyId;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::families::FamilyStore;

/// Connection handle to the leaderboard cache.
///
/// Wraps a [`fred::prelude::Client`] and provides typed operations for
/// the key patterns above.
#[derive(Clone)]
pub struct LeaderboardCache {
    client: Client,
}

impl LeaderboardCache {
    /// Connect to the cache at the given URL.
    ///
    /// The URL follows the Redis URL scheme: `redis://host:port` or
    /// `redis://host:port/db`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Cache`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid cache URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to leaderboard cache");
        Ok(Self { client })
    }

    // =========================================================================
    // Generic JSON get/set/delete
    // =========================================================================

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if serialization fails.
    /// Returns [`StoreError::Cache`] if the write fails.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// Returns `None` when the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if deserialization fails.
    /// Returns [`StoreError::Cache`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or_else(|| Ok(None), |s| Ok(Some(serde_json::from_str(&s)?)))
    }

    /// Delete a key from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    // =========================================================================
    // Period leaderboards -- leaderboard:{bucket}
    // =========================================================================

    /// Store the rendered standings for one period bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the write fails.
    pub async fn store_leaderboard(
        &self,
        bucket: PeriodBucket,
        entries: &[LeaderboardEntry],
    ) -> Result<(), StoreError> {
        self.set_json(bucket_key(bucket), &entries).await
    }

    /// Read the cached standings for one period bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if deserialization or the read fails.
    pub async fn leaderboard(
        &self,
        bucket: PeriodBucket,
    ) -> Result<Option<Vec<LeaderboardEntry>>, StoreError> {
        self.get_json(bucket_key(bucket)).await
    }

    /// Drop the cached standings for one period bucket.
    ///
    /// Called by the scheduled resets; the next refresh repopulates the
    /// key from PostgreSQL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the delete fails.
    pub async fn clear_bucket(&self, bucket: PeriodBucket) -> Result<(), StoreError> {
        self.delete(bucket_key(bucket)).await
    }

    // =========================================================================
    // Family member ranks -- family:{id}:ranks
    // =========================================================================

    /// Store the member standings for one family.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or the write fails.
    pub async fn store_family_ranks(
        &self,
        family_id: FamilyId,
        ranks: &[RankedMember],
    ) -> Result<(), StoreError> {
        self.set_json(&family_ranks_key(family_id), &ranks).await
    }

    /// Read the cached member standings for one family.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if deserialization or the read fails.
    pub async fn family_ranks(
        &self,
        family_id: FamilyId,
    ) -> Result<Option<Vec<RankedMember>>, StoreError> {
        self.get_json(&family_ranks_key(family_id)).await
    }

    /// Flush all keys from the cache instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

/// Serve the standings for one period bucket, cache first.
///
/// A miss falls back to PostgreSQL and repopulates the key, so the first
/// read after a period reset rebuilds that bucket's leaderboard. The
/// repopulation is best-effort; a cache write failure still returns the
/// fresh standings.
///
/// # Errors
///
/// Returns [`StoreError`] if the cache read or the PostgreSQL query
/// fails.
pub async fn period_leaderboard(
    cache: &LeaderboardCache,
    families: &FamilyStore<'_>,
    bucket: PeriodBucket,
    limit: i64,
) -> Result<Vec<LeaderboardEntry>, StoreError> {
    if let Some(entries) = cache.leaderboard(bucket).await? {
        return Ok(entries);
    }

    let entries = families.period_standings(bucket, limit).await?;
    if let Err(e) = cache.store_leaderboard(bucket, &entries).await {
        tracing::warn!(bucket = ?bucket, error = %e, "Leaderboard cache refresh failed");
    }
    Ok(entries)
}

const fn bucket_key(bucket: PeriodBucket) -> &'static str {
    match bucket {
        PeriodBucket::Daily => "leaderboard:daily",
        PeriodBucket::Weekly => "leaderboard:weekly",
        PeriodBucket::Monthly => "leaderboard:monthly",
        PeriodBucket::Yearly => "leaderboard:yearly",
    }
}

fn family_ranks_key(family_id: FamilyId) -> String {
    format!("family:{family_id}:ranks")
}
