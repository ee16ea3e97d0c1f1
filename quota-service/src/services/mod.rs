//! Services module for quota-service.

pub mod admission;
pub mod epoch;
pub mod metrics;
pub mod registry;
pub mod selection;

pub use admission::AdmissionControl;
pub use epoch::{EpochAccountant, QuotaSelection};
pub use metrics::{
    get_metrics, init_metrics, record_accounting_error, record_admission, record_usage,
};
pub use registry::SubscriptionRegistry;
pub use selection::{oldest_active_quota_for, oldest_active_unfilled_quota};
