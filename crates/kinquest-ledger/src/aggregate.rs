//! Family aggregate counters: lifetime totals and period buckets.
//!
//! Every completion event by a family-affiliated actor folds into the
//! family document in one step: the lifetime star total, the four period
//! star buckets, and (for task completions) the four period task buckets.
//! There is no conditional bucket logic here -- all buckets move on every
//! event, and the scheduled resets zero each bucket at its calendar
//! boundary.

use kinquest_types::awards::FamilyDelta;
use kinquest_types::enums::PeriodBucket;
use kinquest_types::structs::Family;

use crate::EngineError;

/// Fold one completion event into a family's counters.
///
/// # Order of operations
///
/// 1. Lifetime `total_stars` grows by `delta.stars` (checked)
/// 2. Every period star bucket grows by `delta.stars`
/// 3. If a task completed, every period task bucket grows by one
///
/// The period buckets saturate instead of erroring: they are bounded by
/// their scheduled resets, and a pinned bucket is strictly better than a
/// rejected completion.
pub fn apply_family_delta(family: Family, delta: FamilyDelta) -> Result<Family, EngineError> {
    let mut family = family;

    // 1. Lifetime total
    family.total_stars = family
        .total_stars
        .checked_add(delta.stars)
        .ok_or(EngineError::ArithmeticOverflow {
            context: "family total_stars",
        })?;

    // 2. Period star buckets
    for bucket in PeriodBucket::ALL {
        let counter = family.period_stars.bucket_mut(bucket);
        *counter = counter.saturating_add(delta.stars);
    }

    // 3. Period task buckets
    if delta.task_completed {
        for bucket in PeriodBucket::ALL {
            let counter = family.period_tasks.bucket_mut(bucket);
            *counter = counter.saturating_add(1);
        }
    }

    Ok(family)
}

/// Zero one period bucket in both the star and task counters.
///
/// Called by the scheduled boundary jobs; the lifetime total and the
/// other buckets are untouched.
pub fn reset_period(family: Family, bucket: PeriodBucket) -> Family {
    let mut family = family;
    *family.period_stars.bucket_mut(bucket) = 0;
    *family.period_tasks.bucket_mut(bucket) = 0;
    family
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kinquest_types::ids::FamilyId;
    use kinquest_types::structs::PeriodTotals;

    use super::*;

    fn family() -> Family {
        Family {
            id: FamilyId::new(),
            name: String::from("The Larssons"),
            total_stars: 200,
            coins: 0,
            period_stars: PeriodTotals::default(),
            period_tasks: PeriodTotals::default(),
            members: Vec::new(),
            unlocked: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn task_delta_moves_every_counter() {
        let updated = apply_family_delta(family(), FamilyDelta::for_task(10));
        assert!(updated.is_ok());
        let updated = updated.unwrap_or_else(|_| family());
        assert_eq!(updated.total_stars, 210);
        for bucket in PeriodBucket::ALL {
            assert_eq!(updated.period_stars.bucket(bucket), 10);
            assert_eq!(updated.period_tasks.bucket(bucket), 1);
        }
    }

    #[test]
    fn challenge_delta_skips_task_buckets() {
        let updated = apply_family_delta(family(), FamilyDelta::for_challenge(100));
        assert!(updated.is_ok());
        let updated = updated.unwrap_or_else(|_| family());
        assert_eq!(updated.total_stars, 300);
        for bucket in PeriodBucket::ALL {
            assert_eq!(updated.period_stars.bucket(bucket), 100);
            assert_eq!(updated.period_tasks.bucket(bucket), 0);
        }
    }

    #[test]
    fn zero_star_delta_still_counts_the_task() {
        let updated = apply_family_delta(family(), FamilyDelta::for_task(0));
        assert!(updated.is_ok());
        let updated = updated.unwrap_or_else(|_| family());
        assert_eq!(updated.total_stars, 200);
        assert_eq!(updated.period_tasks.daily, 1);
    }

    #[test]
    fn lifetime_overflow_is_rejected() {
        let mut f = family();
        f.total_stars = u64::MAX;
        let result = apply_family_delta(f, FamilyDelta::for_task(1));
        assert!(matches!(
            result,
            Err(EngineError::ArithmeticOverflow { .. })
        ));
    }

    #[test]
    fn reset_zeroes_only_the_named_bucket() {
        let mut f = family();
        f.period_stars = PeriodTotals {
            daily: 5,
            weekly: 15,
            monthly: 50,
            yearly: 500,
        };
        f.period_tasks = PeriodTotals {
            daily: 1,
            weekly: 3,
            monthly: 10,
            yearly: 100,
        };

        let f = reset_period(f, PeriodBucket::Weekly);

        assert_eq!(f.period_stars.weekly, 0);
        assert_eq!(f.period_tasks.weekly, 0);
        assert_eq!(f.period_stars.daily, 5);
        assert_eq!(f.period_stars.monthly, 50);
        assert_eq!(f.period_tasks.yearly, 100);
        assert_eq!(f.total_stars, 200);
    }

    #[test]
    fn deltas_accumulate_across_events() {
        let f = apply_family_delta(family(), FamilyDelta::for_task(10))
            .and_then(|f| apply_family_delta(f, FamilyDelta::for_task(5)))
            .and_then(|f| apply_family_delta(f, FamilyDelta::for_challenge(40)));
        assert!(f.is_ok());
        let f = f.unwrap_or_else(|_| family());
        assert_eq!(f.total_stars, 255);
        assert_eq!(f.period_stars.daily, 55);
        assert_eq!(f.period_tasks.daily, 2);
    }
}
