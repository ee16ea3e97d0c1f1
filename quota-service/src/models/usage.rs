//! Usage record model.

use super::MeteredService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A service consumed `amount` credits at `timestamp`. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub service: MeteredService,
    pub amount: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(service: MeteredService, amount: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            service,
            amount,
            timestamp,
        }
    }
}

/// Where a debit landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReceipt {
    pub subscription_id: Uuid,
    pub quota_id: Uuid,
    pub record: UsageRecord,
}

/// Credits available for one metered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredits {
    pub service: MeteredService,
    pub available_credits: i64,
}

/// Sum of amounts for `service` over `records`. `None` on overflow.
pub fn sum_usage<'a, I>(records: I, service: MeteredService) -> Option<i64>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    records
        .into_iter()
        .filter(|r| r.service == service)
        .try_fold(0i64, |total, r| total.checked_add(r.amount))
}

/// Per-service totals over `records`. `None` on overflow.
pub fn sum_usage_by_service<'a, I>(records: I) -> Option<BTreeMap<MeteredService, i64>>
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    records.into_iter().try_fold(BTreeMap::new(), |mut totals, r| {
        let total = totals.entry(r.service).or_insert(0i64);
        *total = total.checked_add(r.amount)?;
        Some(totals)
    })
}
