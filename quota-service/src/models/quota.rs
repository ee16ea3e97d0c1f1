//! Quota model: a time-boxed credit grant and the usage debited against it.

use super::usage::{sum_usage, sum_usage_by_service, UsageRecord};
use super::{Epoch, MeteredService};
use crate::error::QuotaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Input for creating a quota, and the shape quotas are stored in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuota {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub grant: BTreeMap<MeteredService, i64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expiry_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub usage: Vec<UsageRecord>,
}

impl CreateQuota {
    /// A fresh quota granting `credits` of one service.
    pub fn single(
        service: MeteredService,
        credits: i64,
        created_timestamp: DateTime<Utc>,
        expiry_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            grant: BTreeMap::from([(service, credits)]),
            created_timestamp,
            expiry_timestamp,
            usage: Vec::new(),
        }
    }
}

/// Quota grant.
///
/// Only constructible through [`Quota::new`], so every instance satisfies
/// `created_timestamp <= expiry_timestamp`, non-negative grants and
/// non-negative usage amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CreateQuota")]
pub struct Quota {
    id: Uuid,
    grant: BTreeMap<MeteredService, i64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expiry_timestamp: DateTime<Utc>,
    usage: Vec<UsageRecord>,
}

impl TryFrom<CreateQuota> for Quota {
    type Error = QuotaError;

    fn try_from(input: CreateQuota) -> Result<Self, Self::Error> {
        Quota::new(input)
    }
}

impl Quota {
    /// Validate and build a quota.
    pub fn new(input: CreateQuota) -> Result<Self, QuotaError> {
        if input.created_timestamp > input.expiry_timestamp {
            return Err(QuotaError::malformed(format!(
                "quota {} created after it expires ({} > {})",
                input.id, input.created_timestamp, input.expiry_timestamp
            )));
        }

        if let Some((service, credits)) = input.grant.iter().find(|(_, c)| **c < 0) {
            return Err(QuotaError::malformed(format!(
                "quota {} grants negative {} credits ({})",
                input.id, service, credits
            )));
        }

        if let Some(record) = input.usage.iter().find(|r| r.amount < 0) {
            return Err(QuotaError::malformed(format!(
                "quota {} holds negative {} usage ({})",
                input.id, record.service, record.amount
            )));
        }

        if sum_usage_by_service(&input.usage).is_none() {
            return Err(QuotaError::malformed(format!(
                "quota {} usage totals overflow",
                input.id
            )));
        }

        Ok(Self {
            id: input.id,
            grant: input.grant,
            created_timestamp: input.created_timestamp,
            expiry_timestamp: input.expiry_timestamp,
            usage: input.usage,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn grants(&self) -> &BTreeMap<MeteredService, i64> {
        &self.grant
    }

    /// Credits issued for `service`; zero when the quota does not grant it.
    pub fn grant(&self, service: MeteredService) -> i64 {
        self.grant.get(&service).copied().unwrap_or(0)
    }

    pub fn created_timestamp(&self) -> DateTime<Utc> {
        self.created_timestamp
    }

    pub fn expiry_timestamp(&self) -> DateTime<Utc> {
        self.expiry_timestamp
    }

    /// Usage in arrival order.
    pub fn usage(&self) -> &[UsageRecord] {
        &self.usage
    }

    /// Whether the quota window intersects `epoch`, bounds inclusive.
    pub fn overlaps(&self, epoch: &Epoch) -> bool {
        self.created_timestamp <= epoch.end && self.expiry_timestamp >= epoch.start
    }

    /// Total usage for `service`. Construction rejects overflowing totals
    /// and appends never exceed the grant, so the saturating fallback is
    /// never reached.
    pub fn aggregate_usage(&self, service: MeteredService) -> i64 {
        sum_usage(&self.usage, service).unwrap_or(i64::MAX)
    }

    /// Credits left for `service`.
    ///
    /// An overdrawn quota is reported as [`QuotaError::OverQuota`], never as a
    /// negative number and never clamped to zero.
    pub fn available_credits(&self, service: MeteredService) -> Result<i64, QuotaError> {
        let granted = self.grant(service);
        let consumed = self.aggregate_usage(service);
        let available = granted - consumed;

        if available < 0 {
            return Err(QuotaError::OverQuota {
                quota_id: Some(self.id),
                service,
                granted,
                consumed,
                requested: 0,
            });
        }

        Ok(available)
    }

    /// True when no granted service has credits left. Overdrawn services
    /// count as used up.
    pub fn is_used_up(&self) -> bool {
        self.grant
            .keys()
            .all(|service| !matches!(self.available_credits(*service), Ok(c) if c > 0))
    }

    /// Append a usage record, re-validating the balance first.
    pub fn record_usage(
        &mut self,
        service: MeteredService,
        amount: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<&UsageRecord, QuotaError> {
        if amount < 0 {
            return Err(QuotaError::InvalidUsageAmount { service, amount });
        }

        let granted = self.grant(service);
        let consumed = self.aggregate_usage(service);
        if consumed > granted || amount > granted - consumed {
            return Err(QuotaError::OverQuota {
                quota_id: Some(self.id),
                service,
                granted,
                consumed,
                requested: amount,
            });
        }

        self.usage.push(UsageRecord::new(service, amount, timestamp));
        Ok(&self.usage[self.usage.len() - 1])
    }
}
