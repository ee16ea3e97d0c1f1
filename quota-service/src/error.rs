//! Error taxonomy for quota accounting.

use crate::models::{MeteredService, Service};
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the accounting engine.
///
/// Admission control never surfaces these to end users; they are returned to
/// the calling code, which owns the decision to compensate, alert, or retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("Invalid usage amount {amount} for {service}: amounts must be non-negative")]
    InvalidUsageAmount { service: MeteredService, amount: i64 },

    #[error("Over quota for {service} (quota {quota_id:?}): granted {granted}, consumed {consumed}, requested {requested}")]
    OverQuota {
        quota_id: Option<Uuid>,
        service: MeteredService,
        granted: i64,
        consumed: i64,
        requested: i64,
    },

    #[error("Malformed subscription data: {0}")]
    MalformedSubscription(String),

    #[error("Subscription {0} is inactive")]
    SubscriptionInactive(Uuid),

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(Uuid),

    #[error("Quota {quota_id} not found on subscription {subscription_id}")]
    QuotaNotFound {
        subscription_id: Uuid,
        quota_id: Uuid,
    },

    #[error("Service {0} is not metered")]
    ServiceNotMetered(Service),

    #[error("Subscription {0} lock poisoned")]
    LockPoisoned(Uuid),
}

impl QuotaError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QuotaError::InvalidUsageAmount { .. } => "invalid_usage_amount",
            QuotaError::OverQuota { .. } => "over_quota",
            QuotaError::MalformedSubscription(_) => "malformed_subscription",
            QuotaError::SubscriptionInactive(_) => "subscription_inactive",
            QuotaError::SubscriptionNotFound(_) => "subscription_not_found",
            QuotaError::QuotaNotFound { .. } => "quota_not_found",
            QuotaError::ServiceNotMetered(_) => "service_not_metered",
            QuotaError::LockPoisoned(_) => "lock_poisoned",
        }
    }

    /// Whether a caller may reasonably retry after reloading state.
    ///
    /// Only a lost race is retryable; everything else is a caller bug or a
    /// data fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuotaError::OverQuota { .. })
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        QuotaError::MalformedSubscription(message.into())
    }
}

impl From<QuotaError> for AppError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::InvalidUsageAmount { .. }
            | QuotaError::MalformedSubscription(_)
            | QuotaError::ServiceNotMetered(_) => AppError::BadRequest(anyhow::Error::new(err)),
            QuotaError::OverQuota { .. } => AppError::Conflict(anyhow::Error::new(err)),
            QuotaError::SubscriptionInactive(_) => AppError::Forbidden(anyhow::Error::new(err)),
            QuotaError::SubscriptionNotFound(_) | QuotaError::QuotaNotFound { .. } => {
                AppError::NotFound(anyhow::Error::new(err))
            }
            QuotaError::LockPoisoned(_) => AppError::InternalError(anyhow::Error::new(err)),
        }
    }
}
