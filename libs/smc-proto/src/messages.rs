//! Decoded message forms exchanged with the policy and charging peers
//!
//! Inbound: credit-control answers, usage-monitoring answers and rule
//! installs, already decoded from the wire by the serving process.
//! Outbound: the usage updates, monitor reports, termination requests and
//! enforcement actions the core produces. None of these types know their
//! wire encoding.

use serde::{Deserialize, Serialize};

use crate::types::{
    CreditKey, CreditLimitType, CreditUsageType, EventTrigger, FinalUnitAction, MonitoringAction,
    MonitoringLevel, PolicyTrackingType, RedirectServer, ServiceActionType, SessionConfig,
};

// ============================================================================
// Granted units
// ============================================================================

/// One leg of a granted-service-unit, with its presence flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditUnit {
    pub is_valid: bool,
    pub volume: u64,
}

impl CreditUnit {
    pub fn valid(volume: u64) -> Self {
        Self { is_valid: true, volume }
    }
}

/// Granted service units, possibly split by total/tx/rx legs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedUnits {
    pub total: CreditUnit,
    pub tx: CreditUnit,
    pub rx: CreditUnit,
}

impl GrantedUnits {
    /// At least one leg carries a valid value.
    pub fn any_valid(&self) -> bool {
        self.total.is_valid || self.tx.is_valid || self.rx.is_valid
    }

    /// Every valid leg is zero (or no leg is valid) - an empty grant.
    pub fn is_empty(&self) -> bool {
        !(self.total.is_valid && self.total.volume > 0)
            && !(self.tx.is_valid && self.tx.volume > 0)
            && !(self.rx.is_valid && self.rx.volume > 0)
    }
}

// ============================================================================
// Inbound: credit-control
// ============================================================================

/// Charging grant carried in a credit-control answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargingCredit {
    pub granted_units: GrantedUnits,
    /// Seconds of validity; zero means no validity timer
    pub validity_time: u32,
    pub is_final: bool,
    pub final_action: FinalUnitAction,
    pub redirect_server: RedirectServer,
    pub restrict_rules: Vec<String>,
}

/// Decoded credit-control answer for one charging key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditUpdateResponse {
    pub success: bool,
    /// Subscriber id (IMSI)
    pub sid: String,
    pub session_id: String,
    pub charging_key: u32,
    pub service_identifier: Option<u32>,
    pub result_code: u32,
    pub limit_type: CreditLimitType,
    pub credit: ChargingCredit,
}

impl CreditUpdateResponse {
    pub fn credit_key(&self) -> CreditKey {
        CreditKey {
            rating_group: self.charging_key,
            service_identifier: self.service_identifier.unwrap_or(0),
        }
    }
}

// ============================================================================
// Inbound: usage monitoring
// ============================================================================

/// Monitoring grant carried in a usage-monitoring answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMonitoringCredit {
    pub action: MonitoringAction,
    pub monitoring_key: String,
    pub level: MonitoringLevel,
    pub granted_units: GrantedUnits,
}

/// Decoded usage-monitoring answer for one monitoring key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMonitoringUpdateResponse {
    pub success: bool,
    pub sid: String,
    pub session_id: String,
    pub result_code: u32,
    pub credit: UsageMonitoringCredit,
    pub event_triggers: Vec<EventTrigger>,
    /// Unix seconds; zero when the answer carries no revalidation time
    pub revalidation_time: u64,
}

// ============================================================================
// Rules
// ============================================================================

/// Policy rule definition as delivered by the policy peer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub priority: u32,
    pub rating_group: u32,
    #[serde(default)]
    pub service_identifier: Option<u32>,
    #[serde(default)]
    pub monitoring_key: Option<String>,
    #[serde(default)]
    pub tracking_type: PolicyTrackingType,
    #[serde(default)]
    pub redirect: Option<RedirectServer>,
    #[serde(default)]
    pub qos: Option<FlowQos>,
}

impl PolicyRule {
    /// Charging key, when the rule's traffic is metered by the OCS.
    pub fn charging_key(&self) -> Option<CreditKey> {
        match self.tracking_type {
            PolicyTrackingType::OnlyOcs | PolicyTrackingType::OcsAndPcrf => Some(CreditKey {
                rating_group: self.rating_group,
                service_identifier: self.service_identifier.unwrap_or(0),
            }),
            _ => None,
        }
    }

    /// Monitoring key, when the rule's traffic is metered by the PCRF.
    pub fn monitoring_key(&self) -> Option<&str> {
        match self.tracking_type {
            PolicyTrackingType::OnlyPcrf | PolicyTrackingType::OcsAndPcrf => {
                self.monitoring_key.as_deref()
            }
            _ => None,
        }
    }
}

/// QoS parameters attached to a dedicated-bearer rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowQos {
    pub qci: u32,
    pub max_req_bw_ul: u64,
    pub max_req_bw_dl: u64,
}

/// Install request for a rule known to the static rule store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticRuleInstall {
    pub rule_id: String,
    pub activation_time: u64,
    pub deactivation_time: u64,
}

/// Install request carrying a full rule definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicRuleInstall {
    pub policy_rule: PolicyRule,
    pub activation_time: u64,
    pub deactivation_time: u64,
}

// ============================================================================
// Outbound: usage reporting
// ============================================================================

/// Usage figures reported to the charging peer for one key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditUsage {
    pub bytes_tx: u64,
    pub bytes_rx: u64,
    pub update_type: CreditUsageType,
    pub charging_key: u32,
    pub service_identifier: Option<u32>,
}

/// Units the core asks for alongside a usage report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedUnits {
    pub total: u64,
    pub tx: u64,
    pub rx: u64,
}

/// One outbound credit usage update; consumes one request number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditUsageUpdate {
    pub session_id: String,
    pub request_number: u32,
    pub sid: String,
    pub usage: CreditUsage,
    pub requested_units: RequestedUnits,
    pub config: SessionConfig,
}

/// Usage figures reported to the policy peer for one monitoring key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMonitorUpdate {
    pub monitoring_key: String,
    pub level: MonitoringLevel,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
}

/// One outbound usage-monitor update; consumes one request number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMonitoringUpdateRequest {
    pub session_id: String,
    pub request_number: u32,
    pub sid: String,
    pub event_trigger: Option<EventTrigger>,
    /// Absent for a bare event-trigger report
    pub update: Option<UsageMonitorUpdate>,
    pub config: SessionConfig,
}

/// Aggregated outbound updates for one reporting cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSessionRequest {
    pub updates: Vec<CreditUsageUpdate>,
    pub usage_monitors: Vec<UsageMonitoringUpdateRequest>,
}

impl UpdateSessionRequest {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.usage_monitors.is_empty()
    }
}

/// Final report flushed when a session terminates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTerminateRequest {
    pub session_id: String,
    pub request_number: u32,
    pub sid: String,
    pub monitor_usages: Vec<UsageMonitorUpdate>,
    pub credit_usages: Vec<CreditUsage>,
    pub config: SessionConfig,
}

// ============================================================================
// Outbound: enforcement actions
// ============================================================================

/// Pending enforcement action emitted by the core. Delivery to the data
/// plane happens after the in-memory/storage cycle completes, never
/// interleaved with it.
#[derive(Debug, Clone)]
pub struct ServiceAction {
    pub action_type: ServiceActionType,
    pub credit_key: CreditKey,
    pub imsi: String,
    pub session_id: String,
    pub ip_addr: Option<std::net::Ipv4Addr>,
    pub redirect_server: Option<RedirectServer>,
    pub restrict_rule_ids: Vec<String>,
    /// Static rule ids attached to the credit key
    pub rule_ids: Vec<String>,
    /// Dynamic rule definitions attached to the credit key
    pub rule_definitions: Vec<PolicyRule>,
}

impl ServiceAction {
    pub fn new(action_type: ServiceActionType, imsi: &str, session_id: &str) -> Self {
        Self {
            action_type,
            credit_key: CreditKey::default(),
            imsi: imsi.to_string(),
            session_id: session_id.to_string(),
            ip_addr: None,
            redirect_server: None,
            restrict_rule_ids: Vec::new(),
            rule_ids: Vec::new(),
            rule_definitions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_units_emptiness() {
        let empty = GrantedUnits::default();
        assert!(!empty.any_valid());
        assert!(empty.is_empty());

        let zero_total = GrantedUnits { total: CreditUnit::valid(0), ..Default::default() };
        assert!(zero_total.any_valid());
        assert!(zero_total.is_empty());

        let tx_grant = GrantedUnits { tx: CreditUnit::valid(500), ..Default::default() };
        assert!(tx_grant.any_valid());
        assert!(!tx_grant.is_empty());
    }

    #[test]
    fn test_policy_rule_key_resolution() {
        let rule = PolicyRule {
            id: "rule1".to_string(),
            rating_group: 5,
            monitoring_key: Some("m1".to_string()),
            tracking_type: PolicyTrackingType::OcsAndPcrf,
            ..Default::default()
        };
        assert_eq!(rule.charging_key(), Some(CreditKey::from_rating_group(5)));
        assert_eq!(rule.monitoring_key(), Some("m1"));

        let untracked = PolicyRule {
            id: "rule2".to_string(),
            rating_group: 5,
            monitoring_key: Some("m1".to_string()),
            tracking_type: PolicyTrackingType::NoTracking,
            ..Default::default()
        };
        assert_eq!(untracked.charging_key(), None);
        assert_eq!(untracked.monitoring_key(), None);
    }

    #[test]
    fn test_credit_key_from_response_wildcard() {
        let response = CreditUpdateResponse {
            charging_key: 3,
            service_identifier: None,
            ..Default::default()
        };
        assert_eq!(response.credit_key(), CreditKey::new(3, 9));
        assert_eq!(response.credit_key().service_identifier, 0);
    }
}
