//! Admission control integration tests for quota-service.

mod common;

use common::{
    day, full_entitlements, overlapping_admission, registry_with, subscription_with, veri_quota,
};
use quota_service::models::{
    BillingDuration, CreateQuota, CreateSubscription, Epoch, MeteredService, Quota, Service,
    ServiceCredits, Subscription, SubscriptionStatus, SubscriptionTier, UsageRecord,
};
use quota_service::services::{AdmissionControl, EpochAccountant, SubscriptionRegistry};
use quota_service::QuotaError;
use uuid::Uuid;

const ALL_SERVICES: [Service; 5] = [
    Service::Veri,
    Service::StashPool,
    Service::StashAlert,
    Service::AtsIntegration,
    Service::BoostedVacancies,
];

#[test]
fn ten_credits_drained_by_three_records_deny_the_fourth_request() {
    let quota = veri_quota(10, 0, 30);
    let quota_id = quota.id();
    let subscription = subscription_with(vec![quota]);
    let id = subscription.id();
    let registry = registry_with(subscription);

    for (amount, at) in [(4, 5), (4, 10), (2, 15)] {
        assert!(registry.can_access_service_at(id, Service::Veri, day(at)));
        let receipt = registry
            .consume_at(id, Service::Veri, amount, day(at))
            .expect("credits available");
        assert_eq!(receipt.quota_id, quota_id);
    }

    let snapshot = registry.snapshot(id).unwrap();
    let quota = snapshot.quota(quota_id).unwrap();
    assert_eq!(quota.aggregate_usage(MeteredService::Veri), 10);
    assert_eq!(quota.available_credits(MeteredService::Veri), Ok(0));
    assert!(quota.is_used_up());

    assert!(!registry.can_access_service_at(id, Service::Veri, day(16)));
    assert!(matches!(
        registry.consume_at(id, Service::Veri, 1, day(16)),
        Err(QuotaError::OverQuota {
            granted: 10,
            consumed: 10,
            requested: 1,
            ..
        })
    ));
}

#[test]
fn inactive_subscription_denies_everything_despite_unused_credits() {
    let mut subscription = subscription_with(vec![veri_quota(10, 0, 30)]);
    subscription.cancel();
    let admission = overlapping_admission();

    for service in ALL_SERVICES {
        assert!(!admission.can_access_service_at(&subscription, service, day(3)));
    }
}

#[test]
fn active_but_expired_subscription_fails_closed() {
    let subscription = subscription_with(vec![veri_quota(10, 0, 30)]);
    let admission = overlapping_admission();

    for service in ALL_SERVICES {
        assert!(admission.can_access_service_at(&subscription, service, day(29)));
        assert!(!admission.can_access_service_at(&subscription, service, day(31)));
    }
}

#[test]
fn repeated_checks_without_usage_agree() {
    let subscription = subscription_with(vec![veri_quota(1, 0, 30)]);
    let admission = overlapping_admission();

    let first = admission.can_access_service_at(&subscription, Service::Veri, day(7));
    for _ in 0..20 {
        assert_eq!(
            admission.can_access_service_at(&subscription, Service::Veri, day(7)),
            first
        );
    }
    assert!(first);
}

#[test]
fn boosted_vacancies_follow_the_multiplier() {
    let subscription = subscription_with(vec![]);
    let admission = AdmissionControl::default();
    assert!(admission.can_access_service_at(&subscription, Service::BoostedVacancies, day(1)));

    let unboosted = Subscription::new(CreateSubscription {
        id: Uuid::new_v4(),
        tier: SubscriptionTier::Basic,
        addon_tier: None,
        entitlements: quota_service::models::Entitlements {
            boosted_vacancy_multiplier: 0.0,
            ..full_entitlements()
        },
        extra_seats: 0,
        status: SubscriptionStatus::Active,
        duration: BillingDuration::Monthly,
        created_timestamp: day(0),
        expiry_timestamp: day(30),
        quotas: vec![],
    })
    .unwrap();
    assert!(!admission.can_access_service_at(&unboosted, Service::BoostedVacancies, day(1)));
    assert!(admission.can_access_service_at(&unboosted, Service::StashPool, day(1)));
}

#[test]
fn default_selection_only_counts_quotas_closed_by_epoch_end() {
    let subscription = subscription_with(vec![veri_quota(10, 0, 30)]);
    let now = day(16);
    let epoch = EpochAccountant::current_epoch(&subscription, now);

    let closed = EpochAccountant::default();
    assert!(closed.quotas_in_epoch(&subscription, &epoch).is_empty());
    assert_eq!(
        closed.available_credits_for(&subscription, &epoch, MeteredService::Veri),
        Ok(0)
    );
    assert!(!AdmissionControl::default().can_access_service_at(&subscription, Service::Veri, now));

    // The same quota counts once an epoch reaches its expiry.
    let resolved = Epoch::new(epoch.start, day(30));
    assert_eq!(
        closed.available_credits_for(&subscription, &resolved, MeteredService::Veri),
        Ok(10)
    );
}

#[test]
fn usage_at_epoch_end_counts_and_one_millisecond_later_does_not() {
    let end = day(30);
    let mut quota = veri_quota(10, 0, 30);
    quota.record_usage(MeteredService::Veri, 3, end).unwrap();
    quota
        .record_usage(MeteredService::Veri, 5, end + chrono::Duration::milliseconds(1))
        .unwrap();
    let subscription = subscription_with(vec![quota]);

    let accountant = EpochAccountant::default();
    let epoch = Epoch::new(day(0), end);
    let usage = accountant.usage_in_epoch(&subscription, &epoch);
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].timestamp, end);
}

#[test]
fn soonest_expiring_quota_is_debited_first() {
    let addon = veri_quota(5, 0, 45);
    let base = veri_quota(5, 0, 20);
    let (addon_id, base_id) = (addon.id(), base.id());
    let subscription = subscription_with(vec![addon, base]);
    let id = subscription.id();
    let registry = registry_with(subscription);

    let first = registry.consume_at(id, Service::Veri, 5, day(3)).unwrap();
    assert_eq!(first.quota_id, base_id);

    let second = registry.consume_at(id, Service::Veri, 1, day(4)).unwrap();
    assert_eq!(second.quota_id, addon_id);
}

#[test]
fn reporting_lists_credits_per_metered_service() {
    let subscription = subscription_with(vec![veri_quota(10, 0, 30), veri_quota(5, 3, 30)]);
    let id = subscription.id();
    let registry = registry_with(subscription);
    registry.consume_at(id, Service::Veri, 4, day(5)).unwrap();

    assert_eq!(
        registry.all_available_credits_at(id, day(6)).unwrap(),
        vec![ServiceCredits {
            service: MeteredService::Veri,
            available_credits: 11,
        }]
    );
}

fn reported_veri(registry: &SubscriptionRegistry, id: Uuid, at: i64) -> i64 {
    registry.all_available_credits_at(id, day(at)).unwrap()[0].available_credits
}

#[test]
fn overflowing_grant_totals_fail_closed() {
    let subscription = subscription_with(vec![veri_quota(i64::MAX, 0, 30), veri_quota(1, 0, 30)]);
    let id = subscription.id();
    let registry = registry_with(subscription);

    assert!(!registry.can_access_service_at(id, Service::Veri, day(3)));
    assert!(registry.can_access_service_at(id, Service::StashPool, day(3)));
    assert!(matches!(
        registry.consume_at(id, Service::Veri, 1, day(3)),
        Err(QuotaError::MalformedSubscription(_))
    ));
    assert!(matches!(
        registry.all_available_credits_at(id, day(3)),
        Err(QuotaError::MalformedSubscription(_))
    ));
}

#[test]
fn overflowing_usage_snapshot_is_rejected() {
    let snapshot = serde_json::json!({
        "tier": "pro",
        "status": "active",
        "duration": "monthly",
        "created_timestamp": day(0).timestamp_millis(),
        "expiry_timestamp": day(30).timestamp_millis(),
        "quotas": [{
            "grant": { "veri": 1 },
            "created_timestamp": day(0).timestamp_millis(),
            "expiry_timestamp": day(30).timestamp_millis(),
            "usage": [
                { "service": "veri", "amount": i64::MAX, "timestamp": day(2).timestamp_millis() },
                { "service": "veri", "amount": 1, "timestamp": day(2).timestamp_millis() },
            ],
        }],
    });
    assert!(serde_json::from_value::<Subscription>(snapshot).is_err());
}

#[test]
fn every_successful_consume_moves_the_admitted_balance() {
    // Closed by day 10 and counted by the default selection.
    let closed = veri_quota(5, 0, 8);
    let open = veri_quota(3, 0, 30);
    let (closed_id, open_id) = (closed.id(), open.id());
    let subscription = subscription_with(vec![open, closed]);
    let id = subscription.id();
    let registry = SubscriptionRegistry::default();
    registry.insert(subscription).unwrap();

    for _ in 0..6 {
        let admitted = registry.can_access_service_at(id, Service::Veri, day(10));
        let before = reported_veri(&registry, id, 10);
        match registry.consume_at(id, Service::Veri, 1, day(10)) {
            Ok(receipt) => {
                assert!(admitted);
                assert_eq!(receipt.quota_id, closed_id);
                assert_eq!(reported_veri(&registry, id, 10), before - 1);
            }
            Err(e) => {
                assert!(matches!(e, QuotaError::OverQuota { .. }));
                assert!(!admitted);
                assert_eq!(before, 0);
            }
        }
    }

    let snapshot = registry.snapshot(id).unwrap();
    assert!(snapshot.quota(closed_id).unwrap().is_used_up());
    assert!(snapshot.quota(open_id).unwrap().usage().is_empty());
}

#[test]
fn uncounted_open_quota_is_never_debited() {
    // Drained before the epoch began, so the epoch still reports its grant.
    let mut drained = CreateQuota::single(MeteredService::Veri, 10, day(-20), day(5));
    drained.usage = vec![UsageRecord::new(MeteredService::Veri, 10, day(-10))];
    let drained = Quota::new(drained).unwrap();
    let open = veri_quota(3, 0, 30);
    let open_id = open.id();
    let subscription = subscription_with(vec![drained, open]);
    let id = subscription.id();
    let registry = SubscriptionRegistry::default();
    registry.insert(subscription).unwrap();

    for _ in 0..5 {
        assert!(matches!(
            registry.consume_at(id, Service::Veri, 1, day(10)),
            Err(QuotaError::OverQuota { .. })
        ));
        assert_eq!(reported_veri(&registry, id, 10), 10);
    }
    let snapshot = registry.snapshot(id).unwrap();
    assert!(snapshot.quota(open_id).unwrap().usage().is_empty());
}
