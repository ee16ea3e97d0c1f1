//! Test helper module for quota-service integration tests.
//!
//! Provides subscription and quota fixtures on a fixed calendar.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use quota_service::models::{
    BillingDuration, CreateQuota, CreateSubscription, Entitlements, MeteredService, Quota,
    Subscription, SubscriptionStatus, SubscriptionTier,
};
use quota_service::services::{AdmissionControl, QuotaSelection, SubscriptionRegistry};
use std::sync::Once;
use uuid::Uuid;

static TRACING: Once = Once::new();

/// Route engine logs to the test writer. Honors RUST_LOG.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Day `n` of the billing calendar, midnight UTC. Day 0 is 2024-01-01.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn veri_quota(credits: i64, created: i64, expiry: i64) -> Quota {
    Quota::new(CreateQuota::single(
        MeteredService::Veri,
        credits,
        day(created),
        day(expiry),
    ))
    .expect("valid quota fixture")
}

pub fn full_entitlements() -> Entitlements {
    Entitlements {
        stash_pool: true,
        stash_alert: true,
        ats_integration: true,
        boosted_vacancy_multiplier: 2.0,
    }
}

/// Active monthly subscription for days 0..=30 holding `quotas`.
pub fn subscription_with(quotas: Vec<Quota>) -> Subscription {
    Subscription::new(CreateSubscription {
        id: Uuid::new_v4(),
        tier: SubscriptionTier::Pro,
        addon_tier: None,
        entitlements: full_entitlements(),
        extra_seats: 0,
        status: SubscriptionStatus::Active,
        duration: BillingDuration::Monthly,
        created_timestamp: day(0),
        expiry_timestamp: day(30),
        quotas,
    })
    .expect("valid subscription fixture")
}

pub fn overlapping_admission() -> AdmissionControl {
    AdmissionControl::with_selection(QuotaSelection::Overlapping)
}

/// Registry counting open quotas, loaded with one subscription.
pub fn registry_with(subscription: Subscription) -> SubscriptionRegistry {
    init_test_tracing();
    let registry = SubscriptionRegistry::new(overlapping_admission());
    registry.insert(subscription).expect("insert fixture");
    registry
}
