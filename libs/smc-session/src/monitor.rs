//! Usage monitor for one monitoring key
//!
//! Monitors meter traffic for the policy peer. They never gate continuation
//! of service; they only trigger usage reports.

use smc_proto::{MonitoringLevel, StoredMonitor};

use crate::credit::SessionCredit;
use crate::criteria::SessionCreditUpdateCriteria;

/// One monitoring key's bucket ledger plus its scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Monitor {
    pub credit: SessionCredit,
    pub level: MonitoringLevel,
}

impl Monitor {
    pub fn new(level: MonitoringLevel) -> Self {
        Self { credit: SessionCredit::new(), level }
    }

    pub fn unmarshal(marshaled: &StoredMonitor) -> Self {
        Self { credit: SessionCredit::unmarshal(&marshaled.credit), level: marshaled.level }
    }

    pub fn marshal(&self) -> StoredMonitor {
        StoredMonitor { credit: self.credit.marshal(), level: self.level }
    }

    /// A diff primed with the ledger's current values and zero deltas.
    pub fn get_update_criteria(&self) -> SessionCreditUpdateCriteria {
        SessionCreditUpdateCriteria {
            reporting: self.credit.is_reporting(),
            report_last_credit: self.credit.is_report_last_credit(),
            grant_tracking_type: self.credit.get_grant_tracking_type(),
            received_granted_units: *self.credit.get_received_granted_units(),
            ..Default::default()
        }
    }

    /// Whether this monitor owes the policy peer a report.
    pub fn should_report(&self, threshold_ratio: f32) -> bool {
        if self.credit.is_reporting() {
            return false;
        }
        self.credit.is_report_last_credit() || self.credit.is_quota_exhausted(threshold_ratio)
    }

    /// Replay a credit diff onto this (freshly read) monitor.
    pub fn merge(&mut self, uc: &SessionCreditUpdateCriteria) {
        self.credit.merge(uc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smc_proto::{CreditUnit, GrantedUnits};

    #[test]
    fn test_should_report_on_threshold() {
        let mut monitor = Monitor::new(MonitoringLevel::RuleLevel);
        let mut uc = SessionCreditUpdateCriteria::default();
        let gsu = GrantedUnits { total: CreditUnit::valid(1000), ..Default::default() };
        monitor.credit.receive_credit(&gsu, &mut uc);
        assert!(!monitor.should_report(0.8));

        monitor.credit.add_used_credit(900, 0, &mut uc);
        assert!(monitor.should_report(0.8));

        // A report in flight holds further reports
        monitor.credit.get_usage_for_reporting(&mut uc);
        assert!(!monitor.should_report(0.8));
    }

    #[test]
    fn test_should_report_last_credit() {
        let mut monitor = Monitor::new(MonitoringLevel::SessionLevel);
        let mut uc = SessionCreditUpdateCriteria::default();
        monitor.credit.set_report_last_credit(true, &mut uc);
        assert!(monitor.should_report(0.8));
    }
}
