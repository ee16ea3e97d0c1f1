//! Domain models for quota-service.

mod epoch;
mod quota;
mod service;
mod subscription;
mod usage;

pub use epoch::Epoch;
pub use quota::{CreateQuota, Quota};
pub use service::{MeteredService, Service};
pub use subscription::{
    AddonTier, BillingDuration, CreateSubscription, Entitlements, Subscription,
    SubscriptionStatus, SubscriptionTier,
};
pub use usage::{sum_usage, sum_usage_by_service, ServiceCredits, UsageReceipt, UsageRecord};
