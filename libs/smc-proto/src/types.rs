//! Core session/charging value types
//!
//! Credit keys, bucket counters, grant tracking, service states and the
//! session FSM states shared across the session core and the storage layer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

// ============================================================================
// Credit Key
// ============================================================================

/// Identifier of one billing bucket on the online-charging (Gy) side.
///
/// A `service_identifier` of zero is a wildcard: `(rg, 0)` and `(rg, si)`
/// compare equal for any `si`. The hash covers `rating_group` only so that
/// hashing stays consistent with the asymmetric equality.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CreditKey {
    pub rating_group: u32,
    pub service_identifier: u32,
}

impl CreditKey {
    pub fn new(rating_group: u32, service_identifier: u32) -> Self {
        Self { rating_group, service_identifier }
    }

    /// Key with a wildcard service identifier.
    pub fn from_rating_group(rating_group: u32) -> Self {
        Self { rating_group, service_identifier: 0 }
    }
}

impl PartialEq for CreditKey {
    fn eq(&self, other: &Self) -> bool {
        if self.rating_group != other.rating_group {
            return false;
        }
        // Zero service identifier on either side is a wildcard
        self.service_identifier == 0
            || other.service_identifier == 0
            || self.service_identifier == other.service_identifier
    }
}

impl Eq for CreditKey {}

impl Hash for CreditKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Only the rating group participates; see the wildcard equality above
        self.rating_group.hash(state);
    }
}

impl From<u32> for CreditKey {
    fn from(rating_group: u32) -> Self {
        Self::from_rating_group(rating_group)
    }
}

impl fmt::Display for CreditKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.service_identifier == 0 {
            write!(f, "rg={}", self.rating_group)
        } else {
            write!(f, "rg={} si={}", self.rating_group, self.service_identifier)
        }
    }
}

// ============================================================================
// Buckets
// ============================================================================

/// Named counters kept per credit.
///
/// `USED = REPORTED + REPORTING + unreported` holds per leg at all times;
/// the `AllowedFloor*` counters snapshot the previous `Allowed*` value
/// immediately before the most recent non-zero grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum Bucket {
    UsedTx = 0,
    UsedRx = 1,
    AllowedTotal = 2,
    AllowedTx = 3,
    AllowedRx = 4,
    ReportingTx = 5,
    ReportingRx = 6,
    ReportedTx = 7,
    ReportedRx = 8,
    AllowedFloorTotal = 9,
    AllowedFloorTx = 10,
    AllowedFloorRx = 11,
}

/// Number of bucket counters per credit.
pub const BUCKET_COUNT: usize = 12;

impl Bucket {
    /// All buckets in index order.
    pub const ALL: [Bucket; BUCKET_COUNT] = [
        Bucket::UsedTx,
        Bucket::UsedRx,
        Bucket::AllowedTotal,
        Bucket::AllowedTx,
        Bucket::AllowedRx,
        Bucket::ReportingTx,
        Bucket::ReportingRx,
        Bucket::ReportedTx,
        Bucket::ReportedRx,
        Bucket::AllowedFloorTotal,
        Bucket::AllowedFloorTx,
        Bucket::AllowedFloorRx,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Bucket::UsedTx => "USED_TX",
            Bucket::UsedRx => "USED_RX",
            Bucket::AllowedTotal => "ALLOWED_TOTAL",
            Bucket::AllowedTx => "ALLOWED_TX",
            Bucket::AllowedRx => "ALLOWED_RX",
            Bucket::ReportingTx => "REPORTING_TX",
            Bucket::ReportingRx => "REPORTING_RX",
            Bucket::ReportedTx => "REPORTED_TX",
            Bucket::ReportedRx => "REPORTED_RX",
            Bucket::AllowedFloorTotal => "ALLOWED_FLOOR_TOTAL",
            Bucket::AllowedFloorTx => "ALLOWED_FLOOR_TX",
            Bucket::AllowedFloorRx => "ALLOWED_FLOOR_RX",
        }
    }
}

// ============================================================================
// Grant Tracking
// ============================================================================

/// Which legs of a grant gate quota exhaustion.
///
/// Inferred from which legs of the granted-units carried valid values;
/// sticky across grants that carry no valid leg at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrantTrackingType {
    TotalOnly,
    TxOnly,
    RxOnly,
    TxAndRx,
    AllTotalTxRx,
    #[default]
    TrackingUnset,
}

impl GrantTrackingType {
    pub fn name(&self) -> &'static str {
        match self {
            GrantTrackingType::TotalOnly => "TOTAL_ONLY",
            GrantTrackingType::TxOnly => "TX_ONLY",
            GrantTrackingType::RxOnly => "RX_ONLY",
            GrantTrackingType::TxAndRx => "TX_AND_RX",
            GrantTrackingType::AllTotalTxRx => "ALL_TOTAL_TX_RX",
            GrantTrackingType::TrackingUnset => "TRACKING_UNSET",
        }
    }
}

/// Classification of the grant carried by a credit-control answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CreditLimitType {
    #[default]
    Finite,
    /// Credit never exhausts and usage is not metered against a grant.
    InfiniteUnlimited,
    /// Credit never exhausts but usage is still reported.
    InfiniteMetered,
}

// ============================================================================
// Final Unit Action
// ============================================================================

/// Final-Unit-Action values (3GPP TS 32.299)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum FinalUnitAction {
    #[default]
    Terminate = 0,
    Redirect = 1,
    RestrictAccess = 2,
}

/// Redirect-Address-Type values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum RedirectAddressType {
    #[default]
    Ipv4 = 0,
    Ipv6 = 1,
    Url = 2,
    SipUri = 3,
}

/// Redirect-Server grouped value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectServer {
    pub address_type: RedirectAddressType,
    pub server_address: String,
}

/// What to do once a final grant is fully consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalActionInfo {
    pub final_action: FinalUnitAction,
    /// Populated when `final_action` is `Redirect`
    pub redirect_server: RedirectServer,
    /// Rule ids to keep installed when `final_action` is `RestrictAccess`
    pub restrict_rules: Vec<String>,
}

// ============================================================================
// Service / Re-Auth State
// ============================================================================

/// Per-grant service state driven by the grant state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceState {
    #[default]
    Enabled,
    NeedsDeactivation,
    NeedsSuspension,
    NeedsActivation,
    Disabled,
    Redirected,
    Restricted,
}

impl ServiceState {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceState::Enabled => "SERVICE_ENABLED",
            ServiceState::NeedsDeactivation => "SERVICE_NEEDS_DEACTIVATION",
            ServiceState::NeedsSuspension => "SERVICE_NEEDS_SUSPENSION",
            ServiceState::NeedsActivation => "SERVICE_NEEDS_ACTIVATION",
            ServiceState::Disabled => "SERVICE_DISABLED",
            ServiceState::Redirected => "SERVICE_REDIRECTED",
            ServiceState::Restricted => "SERVICE_RESTRICTED",
        }
    }
}

/// Re-authorization request state for one grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReAuthState {
    #[default]
    ReauthNotNeeded,
    ReauthRequired,
    ReauthProcessing,
}

/// Outcome of a re-auth entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReAuthResult {
    UpdateInitiated,
    UpdateNotNeeded,
}

// ============================================================================
// Actions and update classification
// ============================================================================

/// Action the core asks the enforcement plane to take for a charging key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceActionType {
    ContinueService,
    TerminateService,
    ActivateService,
    Redirect,
    RestrictAccess,
}

impl ServiceActionType {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceActionType::ContinueService => "CONTINUE_SERVICE",
            ServiceActionType::TerminateService => "TERMINATE_SERVICE",
            ServiceActionType::ActivateService => "ACTIVATE_SERVICE",
            ServiceActionType::Redirect => "REDIRECT",
            ServiceActionType::RestrictAccess => "RESTRICT_ACCESS",
        }
    }
}

/// Why a credit needs an outbound usage update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditUpdateType {
    QuotaExhausted,
    ReauthRequired,
    ValidityTimerExpired,
}

/// Reporting reason attached to an outbound credit usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CreditUsageType {
    #[default]
    QuotaExhausted,
    Terminated,
    ReauthRequired,
    ValidityTimerExpired,
}

impl From<CreditUpdateType> for CreditUsageType {
    fn from(update_type: CreditUpdateType) -> Self {
        match update_type {
            CreditUpdateType::QuotaExhausted => CreditUsageType::QuotaExhausted,
            CreditUpdateType::ReauthRequired => CreditUsageType::ReauthRequired,
            CreditUpdateType::ValidityTimerExpired => CreditUsageType::ValidityTimerExpired,
        }
    }
}

// ============================================================================
// Monitoring
// ============================================================================

/// Scope of a PCRF usage-monitoring bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitoringLevel {
    #[default]
    SessionLevel,
    RuleLevel,
}

/// Action carried by an inbound usage-monitoring credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum MonitoringAction {
    #[default]
    Continue = 0,
    Disable = 1,
    Force = 2,
}

// ============================================================================
// Event Triggers
// ============================================================================

/// Policy event triggers the core reacts to (trimmed to the supported set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventTrigger {
    RevalidationTimeout = 17,
    UsageReport = 33,
}

impl EventTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            EventTrigger::RevalidationTimeout => "REVALIDATION_TIMEOUT",
            EventTrigger::UsageReport => "USAGE_REPORT",
        }
    }
}

/// Lifecycle of one pending event trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTriggerState {
    Pending,
    Ready,
    Cleared,
}

// ============================================================================
// Session FSM
// ============================================================================

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionFsmState {
    #[default]
    Active,
    TerminationScheduled,
    TerminatingFlowActive,
    TerminatingAggregatingStats,
    TerminatingFlowDeleted,
    Terminated,
}

impl SessionFsmState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionFsmState::Active => "SESSION_ACTIVE",
            SessionFsmState::TerminationScheduled => "SESSION_TERMINATION_SCHEDULED",
            SessionFsmState::TerminatingFlowActive => "SESSION_TERMINATING_FLOW_ACTIVE",
            SessionFsmState::TerminatingAggregatingStats => {
                "SESSION_TERMINATING_AGGREGATING_STATS"
            }
            SessionFsmState::TerminatingFlowDeleted => "SESSION_TERMINATING_FLOW_DELETED",
            SessionFsmState::Terminated => "SESSION_TERMINATED",
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Activation window of one installed rule; a zero deactivation time means
/// no expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLifetime {
    pub activation_time: u64,
    pub deactivation_time: u64,
}

impl RuleLifetime {
    pub fn new(activation_time: u64, deactivation_time: u64) -> Self {
        Self { activation_time, deactivation_time }
    }

    /// Rule should be carrying traffic at `time`.
    pub fn should_be_active(&self, time: u64) -> bool {
        self.activation_time < time && !self.should_be_deactivated(time)
    }

    /// Rule has expired at `time`.
    pub fn should_be_deactivated(&self, time: u64) -> bool {
        self.deactivation_time > 0 && self.deactivation_time < time
    }
}

/// Which collaborator meters a rule's traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolicyTrackingType {
    #[default]
    NoTracking,
    /// Charging only (Gy)
    OnlyOcs,
    /// Usage monitoring only (Gx)
    OnlyPcrf,
    OcsAndPcrf,
}

/// Rule family a policy belongs to, for bearer bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    Static,
    Dynamic,
}

/// Per-version usage counters for one rule, used to detect stale acks from
/// the data plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    pub tx: u64,
    pub rx: u64,
    pub dropped_tx: u64,
    pub dropped_rx: u64,
}

impl RuleStats {
    pub fn add(&mut self, tx: u64, rx: u64, dropped_tx: u64, dropped_rx: u64) {
        self.tx += tx;
        self.rx += rx;
        self.dropped_tx += dropped_tx;
        self.dropped_rx += dropped_rx;
    }
}

/// Version counter plus per-version stats for one rule id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsPerPolicy {
    pub current_version: u32,
    pub last_reported_version: u32,
    #[serde(default)]
    pub stats_map: std::collections::HashMap<u32, RuleStats>,
}

// ============================================================================
// Session Config
// ============================================================================

/// Radio access technology of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RatType {
    #[default]
    Lte,
    Wlan,
    Nr,
}

/// Immutable snapshot of the session's access parameters, taken at
/// establishment and persisted with the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub ue_ipv4: Option<Ipv4Addr>,
    #[serde(default)]
    pub ue_ipv6: Option<Ipv6Addr>,
    #[serde(default)]
    pub spgw_ipv4: Option<Ipv4Addr>,
    #[serde(default)]
    pub apn: String,
    #[serde(default)]
    pub msisdn: String,
    #[serde(default)]
    pub imei: String,
    #[serde(default)]
    pub plmn_id: String,
    #[serde(default)]
    pub imsi_plmn_id: String,
    #[serde(default)]
    pub user_location: String,
    /// WLAN MAC address, empty outside carrier-wifi sessions
    #[serde(default)]
    pub hardware_addr: String,
    #[serde(default)]
    pub radius_session_id: String,
    #[serde(default)]
    pub rat_type: RatType,
    /// Default bearer id (LTE)
    #[serde(default)]
    pub bearer_id: u32,
    /// Local tunnel endpoint id of the default bearer
    #[serde(default)]
    pub tunnel_id: u32,
}

impl SessionConfig {
    /// Carrier-wifi sessions are keyed by MAC rather than bearer ids.
    pub fn is_wlan(&self) -> bool {
        self.rat_type == RatType::Wlan
    }
}
