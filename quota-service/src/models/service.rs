//! Service identifiers known to admission control.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Services whose usage is rationed in credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteredService {
    /// Candidate verification credits.
    Veri,
}

impl MeteredService {
    /// Every metered service, in reporting order.
    pub const ALL: [MeteredService; 1] = [MeteredService::Veri];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeteredService::Veri => "veri",
        }
    }
}

impl fmt::Display for MeteredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any gated capability an organization may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Veri,
    StashPool,
    StashAlert,
    AtsIntegration,
    BoostedVacancies,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Veri => "veri",
            Service::StashPool => "stash_pool",
            Service::StashAlert => "stash_alert",
            Service::AtsIntegration => "ats_integration",
            Service::BoostedVacancies => "boosted_vacancies",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "veri" => Some(Service::Veri),
            "stash_pool" => Some(Service::StashPool),
            "stash_alert" => Some(Service::StashAlert),
            "ats_integration" => Some(Service::AtsIntegration),
            "boosted_vacancies" => Some(Service::BoostedVacancies),
            _ => None,
        }
    }

    /// The metered counterpart of this service, if it is consumption-tracked.
    pub fn metered(&self) -> Option<MeteredService> {
        match self {
            Service::Veri => Some(MeteredService::Veri),
            _ => None,
        }
    }
}

impl From<MeteredService> for Service {
    fn from(service: MeteredService) -> Self {
        match service {
            MeteredService::Veri => Service::Veri,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
