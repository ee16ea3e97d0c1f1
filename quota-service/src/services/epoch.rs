//! Epoch accounting: which quotas and usage belong to a billing window.

use crate::error::QuotaError;
use crate::models::{sum_usage_by_service, Epoch, MeteredService, Quota, Subscription, UsageRecord};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Predicate deciding which quotas count towards an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaSelection {
    /// Quotas whose expiry is at or before the epoch end. Quotas expiring
    /// after the end belong to a future period, even if already purchased.
    #[default]
    ClosedByEpochEnd,
    /// Quotas whose window overlaps the epoch at all.
    Overlapping,
}

impl QuotaSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaSelection::ClosedByEpochEnd => "closed_by_epoch_end",
            QuotaSelection::Overlapping => "overlapping",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "overlapping" => QuotaSelection::Overlapping,
            _ => QuotaSelection::ClosedByEpochEnd,
        }
    }

    fn includes(&self, quota: &Quota, epoch: &Epoch) -> bool {
        match self {
            QuotaSelection::ClosedByEpochEnd => quota.expiry_timestamp() <= epoch.end,
            QuotaSelection::Overlapping => quota.overlaps(epoch),
        }
    }
}

/// Pure aggregation over a subscription's quotas for a given epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochAccountant {
    selection: QuotaSelection,
}

impl EpochAccountant {
    pub fn new(selection: QuotaSelection) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> QuotaSelection {
        self.selection
    }

    /// The billing period in progress at `now`, anchored on the period end:
    /// `[expiry - 1 month, now]`.
    pub fn current_epoch(subscription: &Subscription, now: DateTime<Utc>) -> Epoch {
        let start = subscription
            .expiry_timestamp()
            .checked_sub_months(Months::new(1))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Epoch::new(start, now)
    }

    pub fn quotas_in_epoch<'a>(
        &self,
        subscription: &'a Subscription,
        epoch: &Epoch,
    ) -> Vec<&'a Quota> {
        subscription
            .quotas()
            .iter()
            .filter(|q| self.selection.includes(q, epoch))
            .collect()
    }

    /// Per-service grant totals. Totals that overflow `i64` mark the
    /// subscription as malformed.
    pub fn aggregate_grant(
        &self,
        subscription: &Subscription,
        epoch: &Epoch,
    ) -> Result<BTreeMap<MeteredService, i64>, QuotaError> {
        self.quotas_in_epoch(subscription, epoch)
            .into_iter()
            .flat_map(|q| q.grants().iter())
            .try_fold(BTreeMap::new(), |mut totals, (service, credits)| {
                let total = totals.entry(*service).or_insert(0i64);
                *total = total.checked_add(*credits).ok_or_else(|| {
                    QuotaError::malformed(format!(
                        "subscription {} grant total for {} overflows",
                        subscription.id(),
                        service
                    ))
                })?;
                Ok(totals)
            })
    }

    /// Usage from the epoch's quotas stamped within `epoch`, bounds inclusive.
    pub fn usage_in_epoch<'a>(
        &self,
        subscription: &'a Subscription,
        epoch: &Epoch,
    ) -> Vec<&'a UsageRecord> {
        self.quotas_in_epoch(subscription, epoch)
            .into_iter()
            .flat_map(|q| q.usage().iter())
            .filter(|r| epoch.contains(r.timestamp))
            .collect()
    }

    pub fn aggregate_usage(
        &self,
        subscription: &Subscription,
        epoch: &Epoch,
    ) -> Result<BTreeMap<MeteredService, i64>, QuotaError> {
        sum_usage_by_service(self.usage_in_epoch(subscription, epoch)).ok_or_else(|| {
            QuotaError::malformed(format!(
                "subscription {} usage totals overflow",
                subscription.id()
            ))
        })
    }

    /// Grant minus usage for every metered service.
    ///
    /// A negative balance means the ledger was overdrawn and is returned as
    /// [`QuotaError::OverQuota`].
    pub fn available_credits(
        &self,
        subscription: &Subscription,
        epoch: &Epoch,
    ) -> Result<BTreeMap<MeteredService, i64>, QuotaError> {
        let grant = self.aggregate_grant(subscription, epoch)?;
        let usage = self.aggregate_usage(subscription, epoch)?;

        MeteredService::ALL
            .iter()
            .chain(grant.keys())
            .chain(usage.keys())
            .map(|service| {
                let granted = grant.get(service).copied().unwrap_or(0);
                let consumed = usage.get(service).copied().unwrap_or(0);
                if consumed > granted {
                    return Err(QuotaError::OverQuota {
                        quota_id: None,
                        service: *service,
                        granted,
                        consumed,
                        requested: 0,
                    });
                }
                Ok((*service, granted - consumed))
            })
            .collect()
    }

    pub fn available_credits_for(
        &self,
        subscription: &Subscription,
        epoch: &Epoch,
        service: MeteredService,
    ) -> Result<i64, QuotaError> {
        Ok(self
            .available_credits(subscription, epoch)?
            .get(&service)
            .copied()
            .unwrap_or(0))
    }
}
