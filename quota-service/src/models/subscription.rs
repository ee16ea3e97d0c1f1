//! Subscription model.

use super::Quota;
use crate::error::QuotaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "free" => Some(SubscriptionTier::Free),
            "basic" => Some(SubscriptionTier::Basic),
            "pro" => Some(SubscriptionTier::Pro),
            "enterprise" => Some(SubscriptionTier::Enterprise),
            _ => None,
        }
    }
}

/// Secondary addon purchased on top of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonTier {
    VerificationPack,
    BoostPack,
}

impl AddonTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddonTier::VerificationPack => "verification_pack",
            AddonTier::BoostPack => "boost_pack",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "verification_pack" => Some(AddonTier::VerificationPack),
            "boost_pack" => Some(AddonTier::BoostPack),
            _ => None,
        }
    }
}

/// Subscription status. Expiry is derived, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "inactive" => Some(SubscriptionStatus::Inactive),
            _ => None,
        }
    }
}

/// Billing duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingDuration {
    Monthly,
    Yearly,
}

impl BillingDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingDuration::Monthly => "monthly",
            BillingDuration::Yearly => "yearly",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingDuration::Monthly),
            "yearly" => Some(BillingDuration::Yearly),
            _ => None,
        }
    }
}

/// Static, non-metered entitlements of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Entitlements {
    #[serde(default)]
    pub stash_pool: bool,
    #[serde(default)]
    pub stash_alert: bool,
    #[serde(default)]
    pub ats_integration: bool,
    #[serde(default)]
    pub boosted_vacancy_multiplier: f64,
}

impl Entitlements {
    /// Boosted vacancies are granted when the multiplier is positive.
    pub fn boosted_vacancies(&self) -> bool {
        self.boosted_vacancy_multiplier > 0.0
    }
}

/// Input for creating a subscription, and the shape subscriptions are stored in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscription {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub addon_tier: Option<AddonTier>,
    #[serde(flatten)]
    pub entitlements: Entitlements,
    #[serde(default)]
    pub extra_seats: i64,
    pub status: SubscriptionStatus,
    pub duration: BillingDuration,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expiry_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub quotas: Vec<Quota>,
}

/// Subscription aggregate.
///
/// Built only through [`Subscription::new`] (or deserialization, which goes
/// through the same checks). Quotas are append-only; the aggregate is never
/// deleted, only cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CreateSubscription")]
pub struct Subscription {
    id: Uuid,
    tier: SubscriptionTier,
    addon_tier: Option<AddonTier>,
    #[serde(flatten)]
    entitlements: Entitlements,
    extra_seats: u32,
    status: SubscriptionStatus,
    duration: BillingDuration,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expiry_timestamp: DateTime<Utc>,
    quotas: Vec<Quota>,
}

impl TryFrom<CreateSubscription> for Subscription {
    type Error = QuotaError;

    fn try_from(input: CreateSubscription) -> Result<Self, Self::Error> {
        Subscription::new(input)
    }
}

impl Subscription {
    /// Validate and build a subscription.
    pub fn new(input: CreateSubscription) -> Result<Self, QuotaError> {
        if input.created_timestamp > input.expiry_timestamp {
            return Err(QuotaError::malformed(format!(
                "subscription {} created after it expires ({} > {})",
                input.id, input.created_timestamp, input.expiry_timestamp
            )));
        }

        let extra_seats = u32::try_from(input.extra_seats).map_err(|_| {
            QuotaError::malformed(format!(
                "subscription {} has invalid extra seats ({})",
                input.id, input.extra_seats
            ))
        })?;

        validate_entitlements(input.id, &input.entitlements)?;

        let mut seen = HashSet::with_capacity(input.quotas.len());
        if let Some(dup) = input.quotas.iter().find(|q| !seen.insert(q.id())) {
            return Err(QuotaError::malformed(format!(
                "subscription {} holds quota {} twice",
                input.id,
                dup.id()
            )));
        }

        Ok(Self {
            id: input.id,
            tier: input.tier,
            addon_tier: input.addon_tier,
            entitlements: input.entitlements,
            extra_seats,
            status: input.status,
            duration: input.duration,
            created_timestamp: input.created_timestamp,
            expiry_timestamp: input.expiry_timestamp,
            quotas: input.quotas,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tier(&self) -> SubscriptionTier {
        self.tier
    }

    pub fn addon_tier(&self) -> Option<AddonTier> {
        self.addon_tier
    }

    pub fn entitlements(&self) -> &Entitlements {
        &self.entitlements
    }

    pub fn extra_seats(&self) -> u32 {
        self.extra_seats
    }

    pub fn total_seats(&self) -> u32 {
        self.extra_seats.saturating_add(1)
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn duration(&self) -> BillingDuration {
        self.duration
    }

    pub fn created_timestamp(&self) -> DateTime<Utc> {
        self.created_timestamp
    }

    pub fn expiry_timestamp(&self) -> DateTime<Utc> {
        self.expiry_timestamp
    }

    pub fn quotas(&self) -> &[Quota] {
        &self.quotas
    }

    pub fn quota(&self, quota_id: Uuid) -> Option<&Quota> {
        self.quotas.iter().find(|q| q.id() == quota_id)
    }

    pub(crate) fn quota_mut(&mut self, quota_id: Uuid) -> Result<&mut Quota, QuotaError> {
        let subscription_id = self.id;
        self.quotas
            .iter_mut()
            .find(|q| q.id() == quota_id)
            .ok_or(QuotaError::QuotaNotFound {
                subscription_id,
                quota_id,
            })
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// The billing period has lapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_timestamp
    }

    /// Renewal: extend the period and append the new period's quota.
    pub fn renew(&mut self, new_expiry: DateTime<Utc>, quota: Quota) -> Result<(), QuotaError> {
        self.ensure_active()?;

        if new_expiry < self.expiry_timestamp {
            return Err(QuotaError::malformed(format!(
                "renewal of subscription {} moves expiry backwards ({} < {})",
                self.id, new_expiry, self.expiry_timestamp
            )));
        }

        self.push_quota(quota)?;
        self.expiry_timestamp = new_expiry;
        Ok(())
    }

    /// Top-up: append a quota without touching the billing period.
    pub fn add_quota(&mut self, quota: Quota) -> Result<(), QuotaError> {
        self.ensure_active()?;
        self.push_quota(quota)
    }

    pub fn purchase_addon(&mut self, addon: AddonTier, quota: Quota) -> Result<(), QuotaError> {
        self.ensure_active()?;
        self.push_quota(quota)?;
        self.addon_tier = Some(addon);
        Ok(())
    }

    /// Upgrade or downgrade.
    pub fn change_tier(
        &mut self,
        tier: SubscriptionTier,
        entitlements: Entitlements,
        quota: Option<Quota>,
    ) -> Result<(), QuotaError> {
        self.ensure_active()?;
        validate_entitlements(self.id, &entitlements)?;

        if let Some(quota) = quota {
            self.push_quota(quota)?;
        }

        self.tier = tier;
        self.entitlements = entitlements;
        Ok(())
    }

    /// Cancellation is terminal; re-subscribing builds a new aggregate.
    pub fn cancel(&mut self) {
        self.status = SubscriptionStatus::Inactive;
    }

    fn ensure_active(&self) -> Result<(), QuotaError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(QuotaError::SubscriptionInactive(self.id))
        }
    }

    fn push_quota(&mut self, quota: Quota) -> Result<(), QuotaError> {
        if self.quota(quota.id()).is_some() {
            return Err(QuotaError::malformed(format!(
                "subscription {} already holds quota {}",
                self.id,
                quota.id()
            )));
        }
        self.quotas.push(quota);
        Ok(())
    }
}

fn validate_entitlements(id: Uuid, entitlements: &Entitlements) -> Result<(), QuotaError> {
    let multiplier = entitlements.boosted_vacancy_multiplier;
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(QuotaError::malformed(format!(
            "subscription {} has invalid boosted vacancy multiplier ({})",
            id, multiplier
        )));
    }
    Ok(())
}
