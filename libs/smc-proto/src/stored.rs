//! Persisted session records
//!
//! The storage layer serializes these records field-by-field as JSON so
//! that the schema can keep evolving additively: every field carries
//! `#[serde(default)]`, letting new fields deserialize safely from records
//! written by older builds. Maps keyed by non-string keys (credit keys,
//! policy ids) are stored as entry vectors to keep the encoding
//! self-describing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::messages::{GrantedUnits, PolicyRule};
use crate::types::{
    Bucket, CreditLimitType, EventTrigger, EventTriggerState, FinalActionInfo, GrantTrackingType,
    MonitoringLevel, PolicyType, ReAuthState, RuleLifetime, ServiceState, SessionConfig,
    SessionFsmState, StatsPerPolicy, BUCKET_COUNT,
};

// ============================================================================
// Credit / Grant / Monitor
// ============================================================================

/// Persisted form of one bucket ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSessionCredit {
    #[serde(default)]
    pub reporting: bool,
    #[serde(default)]
    pub credit_limit_type: CreditLimitType,
    #[serde(default)]
    pub used_tx: u64,
    #[serde(default)]
    pub used_rx: u64,
    #[serde(default)]
    pub allowed_total: u64,
    #[serde(default)]
    pub allowed_tx: u64,
    #[serde(default)]
    pub allowed_rx: u64,
    #[serde(default)]
    pub reporting_tx: u64,
    #[serde(default)]
    pub reporting_rx: u64,
    #[serde(default)]
    pub reported_tx: u64,
    #[serde(default)]
    pub reported_rx: u64,
    #[serde(default)]
    pub allowed_floor_total: u64,
    #[serde(default)]
    pub allowed_floor_tx: u64,
    #[serde(default)]
    pub allowed_floor_rx: u64,
    #[serde(default)]
    pub grant_tracking_type: GrantTrackingType,
    #[serde(default)]
    pub received_granted_units: GrantedUnits,
    #[serde(default)]
    pub report_last_credit: bool,
}

impl StoredSessionCredit {
    /// Bucket values in `Bucket` index order.
    pub fn bucket_array(&self) -> [u64; BUCKET_COUNT] {
        [
            self.used_tx,
            self.used_rx,
            self.allowed_total,
            self.allowed_tx,
            self.allowed_rx,
            self.reporting_tx,
            self.reporting_rx,
            self.reported_tx,
            self.reported_rx,
            self.allowed_floor_total,
            self.allowed_floor_tx,
            self.allowed_floor_rx,
        ]
    }

    pub fn set_bucket_array(&mut self, buckets: &[u64; BUCKET_COUNT]) {
        self.used_tx = buckets[Bucket::UsedTx as usize];
        self.used_rx = buckets[Bucket::UsedRx as usize];
        self.allowed_total = buckets[Bucket::AllowedTotal as usize];
        self.allowed_tx = buckets[Bucket::AllowedTx as usize];
        self.allowed_rx = buckets[Bucket::AllowedRx as usize];
        self.reporting_tx = buckets[Bucket::ReportingTx as usize];
        self.reporting_rx = buckets[Bucket::ReportingRx as usize];
        self.reported_tx = buckets[Bucket::ReportedTx as usize];
        self.reported_rx = buckets[Bucket::ReportedRx as usize];
        self.allowed_floor_total = buckets[Bucket::AllowedFloorTotal as usize];
        self.allowed_floor_tx = buckets[Bucket::AllowedFloorTx as usize];
        self.allowed_floor_rx = buckets[Bucket::AllowedFloorRx as usize];
    }
}

/// Persisted form of one charging grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredChargingGrant {
    #[serde(default)]
    pub credit: StoredSessionCredit,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub final_action_info: FinalActionInfo,
    /// Unix seconds; zero means no validity timer
    #[serde(default)]
    pub expiry_time: u64,
    #[serde(default)]
    pub service_state: ServiceState,
    #[serde(default)]
    pub reauth_state: ReAuthState,
    #[serde(default)]
    pub suspended: bool,
}

/// Persisted form of one usage monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredMonitor {
    #[serde(default)]
    pub credit: StoredSessionCredit,
    #[serde(default)]
    pub level: MonitoringLevel,
}

// ============================================================================
// Map entries
// ============================================================================

/// Charging-credit map entry, keyed by rating group + service identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCreditEntry {
    pub rating_group: u32,
    #[serde(default)]
    pub service_identifier: u32,
    pub grant: StoredChargingGrant,
}

/// Monitor map entry, keyed by monitoring key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredMonitorEntry {
    pub key: String,
    pub monitor: StoredMonitor,
}

/// Bearer map entry, keyed by policy type + rule id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBearerEntry {
    pub policy_type: PolicyType,
    pub rule_id: String,
    pub bearer_id: u32,
}

/// Pending event trigger entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredEventTrigger {
    pub trigger: EventTrigger,
    pub state: EventTriggerState,
}

// ============================================================================
// Session
// ============================================================================

/// Persisted form of one session. This is the unit the storage backends
/// read and write; a subscriber maps to a vector of these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSessionState {
    #[serde(default)]
    pub imsi: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub fsm_state: SessionFsmState,
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub request_number: u32,
    #[serde(default)]
    pub credit_map: Vec<StoredCreditEntry>,
    #[serde(default)]
    pub monitor_map: Vec<StoredMonitorEntry>,
    #[serde(default)]
    pub session_level_key: Option<String>,
    #[serde(default)]
    pub static_rule_ids: Vec<String>,
    #[serde(default)]
    pub scheduled_static_rules: Vec<String>,
    #[serde(default)]
    pub dynamic_rules: Vec<PolicyRule>,
    #[serde(default)]
    pub scheduled_dynamic_rules: Vec<PolicyRule>,
    #[serde(default)]
    pub gy_dynamic_rules: Vec<PolicyRule>,
    #[serde(default)]
    pub rule_lifetimes: HashMap<String, RuleLifetime>,
    #[serde(default)]
    pub bearer_id_by_policy: Vec<StoredBearerEntry>,
    #[serde(default)]
    pub pending_event_triggers: Vec<StoredEventTrigger>,
    #[serde(default)]
    pub revalidation_time: u64,
    #[serde(default)]
    pub policy_version_and_stats: HashMap<String, StatsPerPolicy>,
    #[serde(default)]
    pub pdp_start_time: u64,
    #[serde(default)]
    pub pdp_end_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::CreditUnit;

    fn sample_credit() -> StoredSessionCredit {
        StoredSessionCredit {
            reporting: true,
            credit_limit_type: CreditLimitType::Finite,
            used_tx: 1,
            used_rx: 2,
            allowed_total: 3,
            allowed_tx: 4,
            allowed_rx: 5,
            reporting_tx: 6,
            reporting_rx: 7,
            reported_tx: 8,
            reported_rx: 9,
            allowed_floor_total: 10,
            allowed_floor_tx: 11,
            allowed_floor_rx: 12,
            grant_tracking_type: GrantTrackingType::TxAndRx,
            received_granted_units: GrantedUnits {
                total: CreditUnit::valid(1000),
                ..Default::default()
            },
            report_last_credit: false,
        }
    }

    #[test]
    fn test_stored_credit_roundtrip() {
        let credit = sample_credit();
        let encoded = serde_json::to_string(&credit).unwrap();
        let decoded: StoredSessionCredit = serde_json::from_str(&encoded).unwrap();
        assert_eq!(credit, decoded);
        assert_eq!(credit.bucket_array(), decoded.bucket_array());
        assert_eq!(decoded.grant_tracking_type, GrantTrackingType::TxAndRx);
    }

    #[test]
    fn test_stored_credit_from_older_record() {
        // A record written before grant tracking or floors existed must
        // still deserialize, with defaults for the missing fields.
        let old = r#"{"used_tx": 100, "used_rx": 200, "allowed_total": 1000}"#;
        let decoded: StoredSessionCredit = serde_json::from_str(old).unwrap();
        assert_eq!(decoded.used_tx, 100);
        assert_eq!(decoded.allowed_total, 1000);
        assert_eq!(decoded.grant_tracking_type, GrantTrackingType::TrackingUnset);
        assert_eq!(decoded.allowed_floor_total, 0);
        assert!(!decoded.report_last_credit);
    }

    #[test]
    fn test_stored_session_roundtrip() {
        let mut session = StoredSessionState {
            imsi: "IMSI001010000000001".to_string(),
            session_id: "IMSI001010000000001-12345".to_string(),
            fsm_state: SessionFsmState::Active,
            request_number: 7,
            session_level_key: Some("m1".to_string()),
            static_rule_ids: vec!["rule1".to_string()],
            revalidation_time: 1_500_000_000,
            ..Default::default()
        };
        session.credit_map.push(StoredCreditEntry {
            rating_group: 1,
            service_identifier: 0,
            grant: StoredChargingGrant { credit: sample_credit(), ..Default::default() },
        });
        session.monitor_map.push(StoredMonitorEntry {
            key: "m1".to_string(),
            monitor: StoredMonitor {
                credit: sample_credit(),
                level: MonitoringLevel::SessionLevel,
            },
        });
        session.rule_lifetimes.insert(
            "rule1".to_string(),
            RuleLifetime { activation_time: 5, deactivation_time: 0 },
        );
        session.pending_event_triggers.push(StoredEventTrigger {
            trigger: EventTrigger::RevalidationTimeout,
            state: EventTriggerState::Pending,
        });

        let encoded = serde_json::to_string(&session).unwrap();
        let decoded: StoredSessionState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(session, decoded);
    }

    #[test]
    fn test_stored_session_from_older_record() {
        let old = r#"{"imsi": "IMSI001", "session_id": "IMSI001-1", "request_number": 3}"#;
        let decoded: StoredSessionState = serde_json::from_str(old).unwrap();
        assert_eq!(decoded.request_number, 3);
        assert!(decoded.credit_map.is_empty());
        assert!(decoded.pending_event_triggers.is_empty());
        assert_eq!(decoded.fsm_state, SessionFsmState::Active);
    }
}
