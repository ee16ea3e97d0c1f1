//! FIFO-by-expiry quota selection.

use super::EpochAccountant;
use crate::models::{Epoch, MeteredService, Quota, Subscription};
use chrono::{DateTime, Utc};

/// Among active quotas expiring in or after the current epoch that still
/// have credits, the one expiring soonest. Ties keep insertion order.
pub fn oldest_active_unfilled_quota(
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> Option<&Quota> {
    let epoch = EpochAccountant::current_epoch(subscription, now);
    soonest_expiring(subscription.quotas(), &epoch, now, |q| !q.is_used_up())
}

/// Debit target for `service`: like [`oldest_active_unfilled_quota`], but
/// only among the quotas `accountant` counts for the current epoch, so a
/// debit always moves the balance admission control sees.
pub fn oldest_active_quota_for<'a>(
    accountant: &EpochAccountant,
    subscription: &'a Subscription,
    service: MeteredService,
    now: DateTime<Utc>,
) -> Option<&'a Quota> {
    let epoch = EpochAccountant::current_epoch(subscription, now);
    soonest_expiring(
        accountant.quotas_in_epoch(subscription, &epoch),
        &epoch,
        now,
        |q| matches!(q.available_credits(service), Ok(c) if c > 0),
    )
}

fn soonest_expiring<'a, I, F>(
    quotas: I,
    epoch: &Epoch,
    now: DateTime<Utc>,
    unfilled: F,
) -> Option<&'a Quota>
where
    I: IntoIterator<Item = &'a Quota>,
    F: Fn(&Quota) -> bool,
{
    quotas
        .into_iter()
        .filter(|q| q.created_timestamp() <= now && q.expiry_timestamp() >= epoch.start)
        .filter(|q| unfilled(*q))
        .min_by_key(|q| q.expiry_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BillingDuration, CreateQuota, CreateSubscription, Entitlements, SubscriptionStatus,
        SubscriptionTier, UsageRecord,
    };
    use crate::services::QuotaSelection;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn quota(credits: i64, created: i64, expiry: i64, used: i64) -> Quota {
        let mut input = CreateQuota::single(MeteredService::Veri, credits, day(created), day(expiry));
        if used > 0 {
            input.usage = vec![UsageRecord::new(MeteredService::Veri, used, day(created))];
        }
        Quota::new(input).unwrap()
    }

    fn subscription(quotas: Vec<Quota>) -> Subscription {
        Subscription::new(CreateSubscription {
            id: Uuid::new_v4(),
            tier: SubscriptionTier::Pro,
            addon_tier: None,
            entitlements: Entitlements::default(),
            extra_seats: 0,
            status: SubscriptionStatus::Active,
            duration: BillingDuration::Monthly,
            created_timestamp: day(0),
            expiry_timestamp: day(31),
            quotas,
        })
        .unwrap()
    }

    fn overlapping() -> EpochAccountant {
        EpochAccountant::new(QuotaSelection::Overlapping)
    }

    #[test]
    fn test_picks_soonest_expiry() {
        let later = quota(10, 0, 45, 0);
        let sooner = quota(10, 0, 31, 0);
        let sooner_id = sooner.id();
        let sub = subscription(vec![later, sooner]);

        let picked = oldest_active_unfilled_quota(&sub, day(5)).unwrap();
        assert_eq!(picked.id(), sooner_id);
    }

    #[test]
    fn test_skips_used_up_quotas() {
        let drained = quota(10, 0, 31, 10);
        let fresh = quota(10, 0, 45, 0);
        let fresh_id = fresh.id();
        let sub = subscription(vec![drained, fresh]);

        assert_eq!(oldest_active_unfilled_quota(&sub, day(5)).unwrap().id(), fresh_id);
        assert_eq!(
            oldest_active_quota_for(&overlapping(), &sub, MeteredService::Veri, day(5))
                .unwrap()
                .id(),
            fresh_id
        );
    }

    #[test]
    fn test_skips_quotas_from_previous_periods() {
        // Epoch starts one month before the subscription expiry (day 31).
        let stale = quota(10, -60, -30, 0);
        let sub = subscription(vec![stale]);
        assert!(oldest_active_unfilled_quota(&sub, day(5)).is_none());
    }

    #[test]
    fn test_skips_quotas_not_yet_started() {
        let future = quota(10, 10, 45, 0);
        let sub = subscription(vec![future]);
        assert!(oldest_active_unfilled_quota(&sub, day(5)).is_none());
        assert!(oldest_active_unfilled_quota(&sub, day(10)).is_some());
    }

    #[test]
    fn test_none_when_everything_is_used_up() {
        let sub = subscription(vec![quota(3, 0, 31, 3), quota(2, 0, 40, 2)]);
        assert!(oldest_active_unfilled_quota(&sub, day(5)).is_none());
    }

    #[test]
    fn test_debit_target_comes_from_counted_quotas() {
        // Closed by day 10 and counted; the open quota is not.
        let closed = quota(5, 0, 8, 0);
        let open = quota(5, 0, 31, 0);
        let closed_id = closed.id();
        let sub = subscription(vec![open, closed]);
        let accountant = EpochAccountant::default();

        assert!(
            oldest_active_quota_for(&accountant, &sub, MeteredService::Veri, day(5)).is_none()
        );
        assert_eq!(
            oldest_active_quota_for(&accountant, &sub, MeteredService::Veri, day(10))
                .unwrap()
                .id(),
            closed_id
        );
    }
}
