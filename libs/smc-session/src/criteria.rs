//! Update criteria: the write-ahead diff structures
//!
//! Every mutation of a credit or a session is expressed first as a diff
//! object; the storage layer replays the diff onto a freshly read copy and
//! persists that. A crash between the in-memory mutation and the write
//! leaves the stored record untouched, so no partial write is ever
//! observed.

use std::collections::{HashMap, HashSet};

use smc_proto::{
    CreditKey, EventTrigger, EventTriggerState, FinalActionInfo, GrantTrackingType, GrantedUnits,
    PolicyRule, PolicyType, ReAuthState, RuleLifetime, ServiceState, SessionConfig,
    SessionFsmState, StatsPerPolicy, StoredChargingGrant, StoredMonitor, BUCKET_COUNT,
};

/// Identifies one policy within a session's bearer bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyId {
    pub policy_type: PolicyType,
    pub rule_id: String,
}

impl PolicyId {
    pub fn new(policy_type: PolicyType, rule_id: &str) -> Self {
        Self { policy_type, rule_id: rule_id.to_string() }
    }
}

/// Diff of one mutation cycle against a single credit or monitor ledger.
///
/// Grant-level fields (`is_final`, `service_state`, ...) carry the value as
/// of the end of the cycle and are copied wholesale on merge; bucket
/// changes are additive deltas. `REPORTING_*` volumes are deliberately
/// absent from the deltas - in-flight reports are not persisted, so a
/// crashed process re-reports them after restart.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCreditUpdateCriteria {
    pub is_final: bool,
    pub final_action_info: FinalActionInfo,
    pub reauth_state: ReAuthState,
    pub service_state: ServiceState,
    pub expiry_time: u64,
    pub reporting: bool,
    pub suspended: bool,
    pub report_last_credit: bool,
    pub grant_tracking_type: GrantTrackingType,
    pub received_granted_units: GrantedUnits,
    /// Additive per-bucket deltas, indexed by `Bucket`
    pub bucket_deltas: [u64; BUCKET_COUNT],
    /// The credit/monitor is to be removed rather than updated
    pub deleted: bool,
}

impl Default for SessionCreditUpdateCriteria {
    fn default() -> Self {
        Self {
            is_final: false,
            final_action_info: FinalActionInfo::default(),
            reauth_state: ReAuthState::default(),
            service_state: ServiceState::default(),
            expiry_time: 0,
            reporting: false,
            suspended: false,
            report_last_credit: false,
            grant_tracking_type: GrantTrackingType::default(),
            received_granted_units: GrantedUnits::default(),
            bucket_deltas: [0; BUCKET_COUNT],
            deleted: false,
        }
    }
}

impl SessionCreditUpdateCriteria {
    pub fn add_delta(&mut self, bucket: smc_proto::Bucket, value: u64) {
        self.bucket_deltas[bucket as usize] += value;
    }

    pub fn delta(&self, bucket: smc_proto::Bucket) -> u64 {
        self.bucket_deltas[bucket as usize]
    }
}

/// Diff of one mutation cycle against a whole session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStateUpdateCriteria {
    pub is_fsm_updated: bool,
    pub updated_fsm_state: SessionFsmState,
    pub is_config_updated: bool,
    pub updated_config: SessionConfig,
    /// One increment per outbound request produced in this cycle
    pub request_number_increment: u32,

    pub static_rules_to_install: HashSet<String>,
    pub static_rules_to_uninstall: HashSet<String>,
    pub new_scheduled_static_rules: HashSet<String>,
    pub dynamic_rules_to_install: Vec<PolicyRule>,
    pub dynamic_rules_to_uninstall: HashSet<String>,
    pub new_scheduled_dynamic_rules: Vec<PolicyRule>,
    pub gy_dynamic_rules_to_install: Vec<PolicyRule>,
    pub gy_dynamic_rules_to_uninstall: HashSet<String>,
    pub new_rule_lifetimes: HashMap<String, RuleLifetime>,

    pub charging_credit_to_install: HashMap<CreditKey, StoredChargingGrant>,
    pub charging_credit_map: HashMap<CreditKey, SessionCreditUpdateCriteria>,
    pub monitor_credit_to_install: HashMap<String, StoredMonitor>,
    pub monitor_credit_map: HashMap<String, SessionCreditUpdateCriteria>,
    pub is_session_level_key_updated: bool,
    pub updated_session_level_key: Option<String>,

    pub is_bearer_mapping_updated: bool,
    pub bearer_id_by_policy: HashMap<PolicyId, u32>,

    pub is_pending_event_triggers_updated: bool,
    pub pending_event_triggers: HashMap<EventTrigger, EventTriggerState>,
    pub updated_revalidation_time: Option<u64>,

    pub updated_policy_version_and_stats: Option<HashMap<String, StatsPerPolicy>>,
    pub updated_pdp_end_time: u64,

    /// The session reached a terminal state; the store erases it on apply
    pub is_session_ended: bool,
}

impl SessionStateUpdateCriteria {
    /// True when applying this diff would not change the stored record.
    pub fn is_empty(&self) -> bool {
        *self == SessionStateUpdateCriteria::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smc_proto::Bucket;

    #[test]
    fn test_default_criteria_is_empty() {
        let uc = SessionStateUpdateCriteria::default();
        assert!(uc.is_empty());
    }

    #[test]
    fn test_credit_criteria_deltas() {
        let mut uc = SessionCreditUpdateCriteria::default();
        uc.add_delta(Bucket::UsedTx, 100);
        uc.add_delta(Bucket::UsedTx, 50);
        assert_eq!(uc.delta(Bucket::UsedTx), 150);
        assert_eq!(uc.delta(Bucket::UsedRx), 0);
    }
}
