//! Period reset scheduling.
//!
//! Family period counters roll over at fixed UTC calendar boundaries.
//! The scheduler computes the next boundary for each bucket, sleeps until
//! the earliest one, and zeroes every bucket due at that instant. The
//! cron expressions below document the timing contract; the run loop
//! derives the same instants directly with calendar math.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use kinquest_store::{FamilyStore, LeaderboardCache, PostgresPool};
use kinquest_types::enums::PeriodBucket;
use tracing::{debug, error, info, warn};

use crate::error::WorkerError;

/// Cron schedule for the daily reset (every day at 00:00 UTC).
pub const DAILY_SCHEDULE: &str = "0 0 * * *";

/// Cron schedule for the weekly reset (Sunday at 00:00 UTC).
pub const WEEKLY_SCHEDULE: &str = "0 0 * * 0";

/// Cron schedule for the monthly reset (first of the month at 00:00 UTC).
pub const MONTHLY_SCHEDULE: &str = "0 0 1 * *";

/// Cron schedule for the yearly reset (January 1 at 00:00 UTC).
pub const YEARLY_SCHEDULE: &str = "0 0 1 1 *";

/// Attempts per reset before giving up until the next boundary.
const MAX_ATTEMPTS: u32 = 3;

/// Delay between reset retries.
const RETRY_DELAY_SECS: u64 = 5;

/// Cron expression describing when a bucket's counters reset.
pub const fn schedule_for(bucket: PeriodBucket) -> &'static str {
    match bucket {
        PeriodBucket::Daily => DAILY_SCHEDULE,
        PeriodBucket::Weekly => WEEKLY_SCHEDULE,
        PeriodBucket::Monthly => MONTHLY_SCHEDULE,
        PeriodBucket::Yearly => YEARLY_SCHEDULE,
    }
}

/// Next boundary instant for a bucket, strictly after the given time.
///
/// Boundaries are UTC midnights: every day for daily, Sunday for weekly,
/// the first of the month for monthly, January 1 for yearly. Returns
/// `None` only when the computed date falls outside chrono's range.
pub fn next_reset(bucket: PeriodBucket, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = match bucket {
        PeriodBucket::Daily => after.date_naive().succ_opt()?,
        PeriodBucket::Weekly => {
            let mut day = after.date_naive().succ_opt()?;
            while day.weekday() != Weekday::Sun {
                day = day.succ_opt()?;
            }
            day
        }
        PeriodBucket::Monthly => {
            let current = after.date_naive();
            if current.month() == 12 {
                NaiveDate::from_ymd_opt(current.year().checked_add(1)?, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(current.year(), current.month().checked_add(1)?, 1)?
            }
        }
        PeriodBucket::Yearly => {
            NaiveDate::from_ymd_opt(after.date_naive().year().checked_add(1)?, 1, 1)?
        }
    };

    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Periodically zeroes family period counters at calendar boundaries.
///
/// One scheduler instance drives all four buckets from a single loop:
/// it sleeps until the next midnight boundary, resets every bucket due
/// at that instant, then re-arms for the following boundary.
pub struct ResetScheduler {
    pool: PostgresPool,
    cache: Option<LeaderboardCache>,
}

impl ResetScheduler {
    /// Create a scheduler over the given pool, with no cache attached.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool, cache: None }
    }

    /// Attach a leaderboard cache to clear after each successful reset.
    #[must_use]
    pub fn with_cache(mut self, cache: LeaderboardCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run the scheduler loop forever.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Schedule`] if a boundary instant cannot be
    /// computed, which only happens at the edge of chrono's date range.
    pub async fn run(&self) -> Result<(), WorkerError> {
        for bucket in PeriodBucket::ALL {
            info!(
                bucket = ?bucket,
                schedule = schedule_for(bucket),
                "Reset job registered"
            );
        }

        loop {
            let now = Utc::now();
            // Every boundary is a midnight, so the next daily boundary is
            // the earliest wakeup across all four buckets.
            let due_at = next_reset(PeriodBucket::Daily, now).ok_or(WorkerError::Schedule {
                bucket: PeriodBucket::Daily,
            })?;

            let mut due = Vec::new();
            for bucket in PeriodBucket::ALL {
                let boundary =
                    next_reset(bucket, now).ok_or(WorkerError::Schedule { bucket })?;
                if boundary == due_at {
                    due.push(bucket);
                }
            }

            let wait = due_at.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO);
            debug!(due_at = %due_at, buckets = ?due, "Sleeping until next reset boundary");
            tokio::time::sleep(wait).await;

            for bucket in due {
                self.reset_bucket(bucket).await;
            }
        }
    }

    /// Reset one bucket, retrying transient failures a few times.
    ///
    /// A reset that still fails after the last attempt is abandoned; the
    /// counters keep accumulating until the next boundary. The cache is
    /// only cleared after a successful reset, so a stale leaderboard is
    /// never served next to zeroed counters.
    async fn reset_bucket(&self, bucket: PeriodBucket) {
        let families = FamilyStore::new(self.pool.pool());

        let mut attempt: u32 = 1;
        loop {
            match families.reset_period(bucket).await {
                Ok(_) => break,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(bucket = ?bucket, attempt, error = %e, "Period reset failed, retrying");
                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
                }
                Err(e) => {
                    error!(
                        bucket = ?bucket,
                        error = %e,
                        "Period reset failed, leaving counters until the next boundary"
                    );
                    return;
                }
            }
        }

        if let Some(cache) = &self.cache
            && let Err(e) = cache.clear_bucket(bucket).await
        {
            warn!(bucket = ?bucket, error = %e, "Leaderboard cache clear failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(year: i32, month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn daily_resets_at_the_next_midnight() {
        assert_eq!(
            next_reset(PeriodBucket::Daily, at(2026, 8, 22, 15, 30)),
            Some(at(2026, 8, 23, 0, 0))
        );
    }

    #[test]
    fn boundary_instants_are_strictly_after() {
        assert_eq!(
            next_reset(PeriodBucket::Daily, at(2026, 8, 22, 0, 0)),
            Some(at(2026, 8, 23, 0, 0))
        );
        assert_eq!(
            next_reset(PeriodBucket::Yearly, at(2026, 1, 1, 0, 0)),
            Some(at(2027, 1, 1, 0, 0))
        );
    }

    #[test]
    fn weekly_resets_on_sunday() {
        // 2026-08-23 is a Sunday.
        assert_eq!(
            next_reset(PeriodBucket::Weekly, at(2026, 8, 22, 15, 30)),
            Some(at(2026, 8, 23, 0, 0))
        );
    }

    #[test]
    fn weekly_from_sunday_waits_a_full_week() {
        assert_eq!(
            next_reset(PeriodBucket::Weekly, at(2026, 8, 23, 0, 0)),
            Some(at(2026, 8, 30, 0, 0))
        );
    }

    #[test]
    fn monthly_resets_on_the_first() {
        assert_eq!(
            next_reset(PeriodBucket::Monthly, at(2026, 8, 22, 15, 30)),
            Some(at(2026, 9, 1, 0, 0))
        );
    }

    #[test]
    fn monthly_rolls_into_january() {
        assert_eq!(
            next_reset(PeriodBucket::Monthly, at(2026, 12, 15, 8, 0)),
            Some(at(2027, 1, 1, 0, 0))
        );
    }

    #[test]
    fn yearly_resets_on_january_first() {
        assert_eq!(
            next_reset(PeriodBucket::Yearly, at(2026, 3, 1, 12, 0)),
            Some(at(2027, 1, 1, 0, 0))
        );
    }

    #[test]
    fn new_years_midnight_fires_three_buckets_at_once() {
        let after = at(2025, 12, 31, 23, 0);
        let midnight = at(2026, 1, 1, 0, 0);

        assert_eq!(next_reset(PeriodBucket::Daily, after), Some(midnight));
        assert_eq!(next_reset(PeriodBucket::Monthly, after), Some(midnight));
        assert_eq!(next_reset(PeriodBucket::Yearly, after), Some(midnight));
        // 2026-01-01 is a Thursday; the weekly boundary waits for Sunday.
        assert_eq!(
            next_reset(PeriodBucket::Weekly, after),
            Some(at(2026, 1, 4, 0, 0))
        );
    }

    #[test]
    fn schedule_strings_cover_every_bucket() {
        assert_eq!(schedule_for(PeriodBucket::Daily), "0 0 * * *");
        assert_eq!(schedule_for(PeriodBucket::Weekly), "0 0 * * 0");
        assert_eq!(schedule_for(PeriodBucket::Monthly), "0 0 1 * *");
        assert_eq!(schedule_for(PeriodBucket::Yearly), "0 0 1 1 *");
    }
}
