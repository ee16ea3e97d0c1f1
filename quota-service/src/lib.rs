//! Quota Service - Subscription entitlements and metered credit accounting.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::QuotaError;
