//! Configuration module for quota-service.

use crate::services::QuotaSelection;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::env;

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub quota_selection: QuotaSelection,
}

impl QuotaConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "quota-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            quota_selection: env::var("QUOTA_SELECTION")
                .map(|s| QuotaSelection::from_string(&s))
                .unwrap_or_default(),
        })
    }

    /// Install the global tracing subscriber from the loaded settings.
    pub fn init_observability(&self) -> Result<(), AppError> {
        init_tracing(
            &self.service_name,
            &self.common.log_level,
            self.common.otlp_endpoint.as_deref(),
        )
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            service_name: "quota-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            quota_selection: QuotaSelection::default(),
        }
    }
}
