//! In-memory subscription registry with per-subscription serialization.
//!
//! Every check-then-append sequence for one subscription runs under that
//! subscription's mutex, so two concurrent consumers can never both spend
//! the last credit. Different subscriptions live behind different mutexes
//! and never contend.

use super::metrics::{record_accounting_error, record_usage};
use super::selection::oldest_active_quota_for;
use super::{AdmissionControl, EpochAccountant};
use crate::config::QuotaConfig;
use crate::error::QuotaError;
use crate::models::{
    AddonTier, Entitlements, Quota, Service, ServiceCredits, Subscription, SubscriptionTier,
    UsageReceipt,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

type SharedSubscription = Arc<Mutex<Subscription>>;

/// Subscriptions keyed by id, each behind its own lock.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<Uuid, SharedSubscription>,
    admission: AdmissionControl,
}

impl SubscriptionRegistry {
    pub fn new(admission: AdmissionControl) -> Self {
        Self {
            subscriptions: DashMap::new(),
            admission,
        }
    }

    pub fn from_config(config: &QuotaConfig) -> Self {
        Self::new(AdmissionControl::with_selection(config.quota_selection))
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Load a snapshot, replacing any previous state for the same id.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id()))]
    pub fn insert(&self, subscription: Subscription) -> Result<(), QuotaError> {
        let id = subscription.id();
        let existing = match self.subscriptions.entry(id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(subscription)));
                info!("Subscription loaded");
                return Ok(());
            }
        };

        let mut guard = existing.lock().map_err(|_| QuotaError::LockPoisoned(id))?;
        *guard = subscription;
        info!("Subscription snapshot replaced");
        Ok(())
    }

    /// Drop a subscription and return its final state.
    #[instrument(skip(self), fields(subscription_id = %id))]
    pub fn remove(&self, id: Uuid) -> Result<Subscription, QuotaError> {
        let (_, shared) = self
            .subscriptions
            .remove(&id)
            .ok_or(QuotaError::SubscriptionNotFound(id))?;

        let guard = shared.lock().map_err(|_| {
            let e = QuotaError::LockPoisoned(id);
            record_accounting_error(e.kind());
            error!(error = %e, "Subscription removed with its state discarded");
            e
        })?;
        info!("Subscription removed");
        Ok(guard.clone())
    }

    pub fn snapshot(&self, id: Uuid) -> Result<Subscription, QuotaError> {
        self.with_subscription(id, |subscription| Ok(subscription.clone()))
    }

    /// Read-only admission check. Unknown ids and poisoned locks deny.
    pub fn can_access_service(&self, id: Uuid, service: Service) -> bool {
        self.can_access_service_at(id, service, Utc::now())
    }

    pub fn can_access_service_at(&self, id: Uuid, service: Service, now: DateTime<Utc>) -> bool {
        match self.with_subscription(id, |subscription| {
            Ok(self.admission.can_access_service_at(subscription, service, now))
        }) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(subscription_id = %id, service = %service, error = %e, "Access denied");
                false
            }
        }
    }

    /// Admit and debit in one step: the admission check, FIFO quota
    /// selection and the append all happen under the subscription's lock.
    pub fn consume(
        &self,
        id: Uuid,
        service: Service,
        amount: i64,
    ) -> Result<UsageReceipt, QuotaError> {
        self.consume_at(id, service, amount, Utc::now())
    }

    #[instrument(skip(self), fields(subscription_id = %id, service = %service))]
    pub fn consume_at(
        &self,
        id: Uuid,
        service: Service,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<UsageReceipt, QuotaError> {
        let metered = service
            .metered()
            .ok_or(QuotaError::ServiceNotMetered(service))?;
        if amount < 0 {
            return Err(QuotaError::InvalidUsageAmount {
                service: metered,
                amount,
            });
        }

        let result = self.with_subscription(id, |subscription| {
            if !subscription.is_active() || subscription.is_expired_at(now) {
                return Err(QuotaError::SubscriptionInactive(id));
            }

            let accountant = self.admission.accountant();
            let epoch = EpochAccountant::current_epoch(subscription, now);
            let available = accountant.available_credits_for(subscription, &epoch, metered)?;
            let granted = accountant
                .aggregate_grant(subscription, &epoch)?
                .get(&metered)
                .copied()
                .unwrap_or(0);
            let consumed = accountant
                .aggregate_usage(subscription, &epoch)?
                .get(&metered)
                .copied()
                .unwrap_or(0);
            let over_quota = || QuotaError::OverQuota {
                quota_id: None,
                service: metered,
                granted,
                consumed,
                requested: amount,
            };

            if available <= 0 || amount > available {
                return Err(over_quota());
            }

            let quota_id = oldest_active_quota_for(accountant, subscription, metered, now)
                .map(Quota::id)
                .ok_or_else(over_quota)?;

            let record = subscription
                .quota_mut(quota_id)?
                .record_usage(metered, amount, now)?
                .clone();

            Ok(UsageReceipt {
                subscription_id: id,
                quota_id,
                record,
            })
        });

        self.observe(&result, amount);
        result
    }

    /// Append usage to a specific quota, re-validating its balance under the
    /// subscription's lock.
    #[instrument(skip(self), fields(subscription_id = %id, quota_id = %quota_id))]
    pub fn record_usage(
        &self,
        id: Uuid,
        quota_id: Uuid,
        service: Service,
        amount: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<UsageReceipt, QuotaError> {
        let metered = service
            .metered()
            .ok_or(QuotaError::ServiceNotMetered(service))?;

        let result = self.with_subscription(id, |subscription| {
            let record = subscription
                .quota_mut(quota_id)?
                .record_usage(metered, amount, timestamp)?
                .clone();

            Ok(UsageReceipt {
                subscription_id: id,
                quota_id,
                record,
            })
        });

        self.observe(&result, amount);
        result
    }

    #[instrument(skip(self, quota), fields(subscription_id = %id, quota_id = %quota.id()))]
    pub fn add_quota(&self, id: Uuid, quota: Quota) -> Result<(), QuotaError> {
        self.with_subscription(id, |subscription| subscription.add_quota(quota))?;
        info!("Quota added");
        Ok(())
    }

    #[instrument(skip(self, quota), fields(subscription_id = %id, quota_id = %quota.id()))]
    pub fn renew(
        &self,
        id: Uuid,
        new_expiry: DateTime<Utc>,
        quota: Quota,
    ) -> Result<(), QuotaError> {
        self.with_subscription(id, |subscription| subscription.renew(new_expiry, quota))?;
        info!(new_expiry = %new_expiry, "Subscription renewed");
        Ok(())
    }

    #[instrument(skip(self, quota), fields(subscription_id = %id, addon = addon.as_str()))]
    pub fn purchase_addon(
        &self,
        id: Uuid,
        addon: AddonTier,
        quota: Quota,
    ) -> Result<(), QuotaError> {
        self.with_subscription(id, |subscription| subscription.purchase_addon(addon, quota))?;
        info!("Addon purchased");
        Ok(())
    }

    #[instrument(skip(self, entitlements, quota), fields(subscription_id = %id, tier = tier.as_str()))]
    pub fn change_tier(
        &self,
        id: Uuid,
        tier: SubscriptionTier,
        entitlements: Entitlements,
        quota: Option<Quota>,
    ) -> Result<(), QuotaError> {
        self.with_subscription(id, |subscription| {
            subscription.change_tier(tier, entitlements, quota)
        })?;
        info!("Subscription tier changed");
        Ok(())
    }

    #[instrument(skip(self), fields(subscription_id = %id))]
    pub fn cancel(&self, id: Uuid) -> Result<(), QuotaError> {
        self.with_subscription(id, |subscription| {
            subscription.cancel();
            Ok(())
        })?;
        info!("Subscription cancelled");
        Ok(())
    }

    pub fn all_available_credits(&self, id: Uuid) -> Result<Vec<ServiceCredits>, QuotaError> {
        self.all_available_credits_at(id, Utc::now())
    }

    pub fn all_available_credits_at(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceCredits>, QuotaError> {
        self.with_subscription(id, |subscription| {
            self.admission.all_available_credits_at(subscription, now)
        })
    }

    fn with_subscription<R, F>(&self, id: Uuid, f: F) -> Result<R, QuotaError>
    where
        F: FnOnce(&mut Subscription) -> Result<R, QuotaError>,
    {
        // Clone the handle so the map shard is released before we block.
        let shared = self
            .subscriptions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(QuotaError::SubscriptionNotFound(id))?;

        let mut guard = shared.lock().map_err(|_| QuotaError::LockPoisoned(id))?;
        f(&mut guard)
    }

    fn observe(&self, result: &Result<UsageReceipt, QuotaError>, amount: i64) {
        match result {
            Ok(receipt) => {
                record_usage(receipt.record.service.as_str(), amount);
                info!(
                    quota_id = %receipt.quota_id,
                    amount = amount,
                    "Usage recorded"
                );
            }
            Err(e)
                if matches!(
                    e,
                    QuotaError::OverQuota { .. }
                        | QuotaError::MalformedSubscription(_)
                        | QuotaError::LockPoisoned(_)
                ) =>
            {
                record_accounting_error(e.kind());
                error!(error = %e, amount = amount, "Usage rejected");
            }
            Err(e) => {
                warn!(error = %e, amount = amount, "Usage rejected");
            }
        }
    }
}
