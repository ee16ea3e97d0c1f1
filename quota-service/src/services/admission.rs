//! Admission control: may an organization use a service right now?

use super::metrics::{record_accounting_error, record_admission};
use super::{EpochAccountant, QuotaSelection};
use crate::error::QuotaError;
use crate::models::{MeteredService, Service, ServiceCredits, Subscription};
use chrono::{DateTime, Utc};
use tracing::{debug, error};

/// Read-only decision point consulted before every gated action.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionControl {
    accountant: EpochAccountant,
}

impl AdmissionControl {
    pub fn new(accountant: EpochAccountant) -> Self {
        Self { accountant }
    }

    pub fn with_selection(selection: QuotaSelection) -> Self {
        Self::new(EpochAccountant::new(selection))
    }

    pub fn accountant(&self) -> &EpochAccountant {
        &self.accountant
    }

    pub fn can_access_service(&self, subscription: &Subscription, service: Service) -> bool {
        self.can_access_service_at(subscription, service, Utc::now())
    }

    /// Fails closed: inactive or expired subscriptions and accounting faults
    /// all resolve to `false`.
    pub fn can_access_service_at(
        &self,
        subscription: &Subscription,
        service: Service,
        now: DateTime<Utc>,
    ) -> bool {
        let allowed = self.decide(subscription, service, now);
        record_admission(service.as_str(), allowed);
        allowed
    }

    fn decide(&self, subscription: &Subscription, service: Service, now: DateTime<Utc>) -> bool {
        if !subscription.is_active() || subscription.is_expired_at(now) {
            debug!(
                subscription_id = %subscription.id(),
                service = %service,
                status = subscription.status().as_str(),
                "Access denied: subscription inactive or expired"
            );
            return false;
        }

        let entitlements = subscription.entitlements();
        match service {
            Service::StashPool => entitlements.stash_pool,
            Service::StashAlert => entitlements.stash_alert,
            Service::AtsIntegration => entitlements.ats_integration,
            Service::BoostedVacancies => entitlements.boosted_vacancies(),
            Service::Veri => match self.current_credits(subscription, MeteredService::Veri, now) {
                Ok(available) => available > 0,
                Err(e) => {
                    record_accounting_error(e.kind());
                    error!(
                        subscription_id = %subscription.id(),
                        service = %service,
                        error = %e,
                        "Accounting fault during admission check"
                    );
                    false
                }
            },
        }
    }

    /// Credits left for `service` in the epoch in progress at `now`,
    /// regardless of subscription status.
    pub fn current_credits(
        &self,
        subscription: &Subscription,
        service: MeteredService,
        now: DateTime<Utc>,
    ) -> Result<i64, QuotaError> {
        let epoch = EpochAccountant::current_epoch(subscription, now);
        self.accountant
            .available_credits_for(subscription, &epoch, service)
    }

    pub fn all_available_credits(
        &self,
        subscription: &Subscription,
    ) -> Result<Vec<ServiceCredits>, QuotaError> {
        self.all_available_credits_at(subscription, Utc::now())
    }

    /// Reporting view of every metered service. Inactive or expired
    /// subscriptions report zero, matching what admission would allow.
    pub fn all_available_credits_at(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceCredits>, QuotaError> {
        let usable = subscription.is_active() && !subscription.is_expired_at(now);
        let epoch = EpochAccountant::current_epoch(subscription, now);
        let credits = self.accountant.available_credits(subscription, &epoch)?;

        Ok(credits
            .into_iter()
            .map(|(service, available)| ServiceCredits {
                service,
                available_credits: if usable { available } else { 0 },
            })
            .collect())
    }
}
