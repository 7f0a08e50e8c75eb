//! Session aggregate
//!
//! `SessionState` owns the active/scheduled rule sets, the charging-grant
//! and monitor maps, the session FSM and the outbound request building for
//! one PDN/PDU session. Every mutation goes through a
//! `SessionStateUpdateCriteria` diff; the storage layer replays the diff
//! onto a freshly read copy via `merge_updates`.

use std::collections::{HashMap, HashSet};

use log::{debug, error, info, warn};

use smc_proto::{
    Bucket, CreditKey, CreditUpdateResponse, CreditUsageUpdate, EventTrigger, EventTriggerState,
    MonitoringAction, MonitoringLevel, PolicyRule, PolicyType, ReAuthResult, ReAuthState,
    RuleLifetime, ServiceAction, ServiceActionType, ServiceState, SessionConfig, SessionFsmState,
    SessionTerminateRequest, StatsPerPolicy, StoredBearerEntry, StoredCreditEntry,
    StoredEventTrigger, StoredMonitorEntry, StoredSessionState, UpdateSessionRequest,
    UsageMonitorUpdate, UsageMonitoringUpdateRequest, UsageMonitoringUpdateResponse,
};

use crate::config::SessionCreditConfig;
use crate::criteria::{PolicyId, SessionCreditUpdateCriteria, SessionStateUpdateCriteria};
use crate::grant::{ChargingGrant, CreditValidity};
use crate::monitor::Monitor;
use crate::rules::{DynamicRuleStore, StaticRuleStore};

/// Usage rollup across the keys referenced by the session's rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TotalCreditUsage {
    pub monitoring_tx: u64,
    pub monitoring_rx: u64,
    pub charging_tx: u64,
    pub charging_rx: u64,
}

/// One subscriber data session and all of its accounting state.
#[derive(Debug, Clone)]
pub struct SessionState {
    imsi: String,
    session_id: String,
    /// Monotonic; one increment per outbound request
    request_number: u32,
    curr_state: SessionFsmState,
    config: SessionConfig,
    static_rules: StaticRuleStore,
    active_static_rules: Vec<String>,
    scheduled_static_rules: HashSet<String>,
    dynamic_rules: DynamicRuleStore,
    scheduled_dynamic_rules: DynamicRuleStore,
    gy_dynamic_rules: DynamicRuleStore,
    rule_lifetimes: HashMap<String, RuleLifetime>,
    credit_map: HashMap<CreditKey, ChargingGrant>,
    monitor_map: HashMap<String, Monitor>,
    session_level_key: Option<String>,
    pending_event_triggers: HashMap<EventTrigger, EventTriggerState>,
    revalidation_time: u64,
    bearer_id_by_policy: HashMap<PolicyId, u32>,
    policy_version_and_stats: HashMap<String, StatsPerPolicy>,
    pdp_start_time: u64,
    pdp_end_time: u64,
}

impl SessionState {
    pub fn new(
        imsi: &str,
        session_id: &str,
        config: SessionConfig,
        static_rules: StaticRuleStore,
        pdp_start_time: u64,
    ) -> Self {
        Self {
            imsi: imsi.to_string(),
            session_id: session_id.to_string(),
            // Request 0 is the session-initialization call
            request_number: 1,
            curr_state: SessionFsmState::Active,
            config,
            static_rules,
            active_static_rules: Vec::new(),
            scheduled_static_rules: HashSet::new(),
            dynamic_rules: DynamicRuleStore::new(),
            scheduled_dynamic_rules: DynamicRuleStore::new(),
            gy_dynamic_rules: DynamicRuleStore::new(),
            rule_lifetimes: HashMap::new(),
            credit_map: HashMap::new(),
            monitor_map: HashMap::new(),
            session_level_key: None,
            pending_event_triggers: HashMap::new(),
            revalidation_time: 0,
            bearer_id_by_policy: HashMap::new(),
            policy_version_and_stats: HashMap::new(),
            pdp_start_time,
            pdp_end_time: 0,
        }
    }

    // ========================================================================
    // Marshaling
    // ========================================================================

    pub fn unmarshal(marshaled: &StoredSessionState, static_rules: StaticRuleStore) -> Self {
        let mut session = Self::new(
            &marshaled.imsi,
            &marshaled.session_id,
            marshaled.config.clone(),
            static_rules,
            marshaled.pdp_start_time,
        );
        session.request_number = marshaled.request_number;
        session.curr_state = marshaled.fsm_state;
        session.pdp_end_time = marshaled.pdp_end_time;
        session.session_level_key = marshaled.session_level_key.clone();
        session.revalidation_time = marshaled.revalidation_time;
        session.policy_version_and_stats = marshaled.policy_version_and_stats.clone();

        for entry in &marshaled.credit_map {
            session.credit_map.insert(
                CreditKey::new(entry.rating_group, entry.service_identifier),
                ChargingGrant::unmarshal(&entry.grant),
            );
        }
        for entry in &marshaled.monitor_map {
            session.monitor_map.insert(entry.key.clone(), Monitor::unmarshal(&entry.monitor));
        }
        session.active_static_rules = marshaled.static_rule_ids.clone();
        session.scheduled_static_rules =
            marshaled.scheduled_static_rules.iter().cloned().collect();
        for rule in &marshaled.dynamic_rules {
            session.dynamic_rules.insert_rule(rule.clone());
        }
        for rule in &marshaled.scheduled_dynamic_rules {
            session.scheduled_dynamic_rules.insert_rule(rule.clone());
        }
        for rule in &marshaled.gy_dynamic_rules {
            session.gy_dynamic_rules.insert_rule(rule.clone());
        }
        session.rule_lifetimes = marshaled.rule_lifetimes.clone();
        for entry in &marshaled.bearer_id_by_policy {
            session.bearer_id_by_policy.insert(
                PolicyId::new(entry.policy_type, &entry.rule_id),
                entry.bearer_id,
            );
        }
        for entry in &marshaled.pending_event_triggers {
            session.pending_event_triggers.insert(entry.trigger, entry.state);
        }
        session
    }

    pub fn marshal(&self) -> StoredSessionState {
        let mut marshaled = StoredSessionState {
            imsi: self.imsi.clone(),
            session_id: self.session_id.clone(),
            fsm_state: self.curr_state,
            config: self.config.clone(),
            request_number: self.request_number,
            session_level_key: self.session_level_key.clone(),
            static_rule_ids: self.active_static_rules.clone(),
            scheduled_static_rules: self.scheduled_static_rules.iter().cloned().collect(),
            dynamic_rules: self.dynamic_rules.get_rules(),
            scheduled_dynamic_rules: self.scheduled_dynamic_rules.get_rules(),
            gy_dynamic_rules: self.gy_dynamic_rules.get_rules(),
            rule_lifetimes: self.rule_lifetimes.clone(),
            revalidation_time: self.revalidation_time,
            policy_version_and_stats: self.policy_version_and_stats.clone(),
            pdp_start_time: self.pdp_start_time,
            pdp_end_time: self.pdp_end_time,
            ..Default::default()
        };
        for (key, grant) in &self.credit_map {
            marshaled.credit_map.push(StoredCreditEntry {
                rating_group: key.rating_group,
                service_identifier: key.service_identifier,
                grant: grant.marshal(),
            });
        }
        for (key, monitor) in &self.monitor_map {
            marshaled
                .monitor_map
                .push(StoredMonitorEntry { key: key.clone(), monitor: monitor.marshal() });
        }
        for (policy_id, bearer_id) in &self.bearer_id_by_policy {
            marshaled.bearer_id_by_policy.push(StoredBearerEntry {
                policy_type: policy_id.policy_type,
                rule_id: policy_id.rule_id.clone(),
                bearer_id: *bearer_id,
            });
        }
        for (trigger, state) in &self.pending_event_triggers {
            marshaled
                .pending_event_triggers
                .push(StoredEventTrigger { trigger: *trigger, state: *state });
        }
        marshaled
    }

    // ========================================================================
    // Identity / config
    // ========================================================================

    pub fn get_imsi(&self) -> &str {
        &self.imsi
    }

    pub fn get_session_id(&self) -> &str {
        &self.session_id
    }

    pub fn get_config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SessionConfig, uc: &mut SessionStateUpdateCriteria) {
        uc.is_config_updated = true;
        uc.updated_config = config.clone();
        self.config = config;
    }

    pub fn get_request_number(&self) -> u32 {
        self.request_number
    }

    pub fn get_pdp_start_time(&self) -> u64 {
        self.pdp_start_time
    }

    pub fn get_pdp_end_time(&self) -> u64 {
        self.pdp_end_time
    }

    pub fn is_radius_cwf_session(&self) -> bool {
        self.config.is_wlan()
    }

    // ========================================================================
    // FSM
    // ========================================================================

    pub fn get_state(&self) -> SessionFsmState {
        self.curr_state
    }

    pub fn is_active(&self) -> bool {
        self.curr_state == SessionFsmState::Active
    }

    pub fn is_terminating(&self) -> bool {
        !(self.is_active() || self.curr_state == SessionFsmState::TerminationScheduled)
    }

    pub fn set_fsm_state(
        &mut self,
        new_state: SessionFsmState,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if self.curr_state != new_state {
            debug!(
                "Session {} FSM state change from {} to {}",
                self.session_id,
                self.curr_state.name(),
                new_state.name()
            );
            self.curr_state = new_state;
            uc.is_fsm_updated = true;
            uc.updated_fsm_state = new_state;
        }
    }

    pub fn start_termination(&mut self, now: u64, uc: &mut SessionStateUpdateCriteria) {
        self.set_fsm_state(SessionFsmState::TerminatingFlowActive, uc);
        self.pdp_end_time = now;
        uc.updated_pdp_end_time = now;
    }

    pub fn mark_as_awaiting_termination(&mut self, uc: &mut SessionStateUpdateCriteria) {
        self.set_fsm_state(SessionFsmState::TerminationScheduled, uc);
    }

    /// A usage report for a terminating session has started arriving.
    pub fn new_report(&mut self, uc: &mut SessionStateUpdateCriteria) {
        if self.curr_state == SessionFsmState::TerminatingFlowActive {
            self.set_fsm_state(SessionFsmState::TerminatingAggregatingStats, uc);
        }
    }

    /// The usage report for a terminating session has been fully absorbed.
    pub fn finish_report(&mut self, uc: &mut SessionStateUpdateCriteria) {
        if self.curr_state == SessionFsmState::TerminatingAggregatingStats {
            self.set_fsm_state(SessionFsmState::TerminatingFlowDeleted, uc);
        }
    }

    pub fn can_complete_termination(&self) -> bool {
        self.curr_state == SessionFsmState::TerminatingFlowDeleted
    }

    /// Terminate the session and build its final report. Returns `None`
    /// when the session is still active or already terminated; the
    /// termination request is produced exactly once.
    pub fn complete_termination(
        &mut self,
        uc: &mut SessionStateUpdateCriteria,
    ) -> Option<SessionTerminateRequest> {
        match self.curr_state {
            SessionFsmState::Active => {
                error!(
                    "{} Unexpected ACTIVE state while completing termination",
                    self.session_id
                );
                return None;
            }
            SessionFsmState::Terminated => return None,
            SessionFsmState::TerminatingFlowActive
            | SessionFsmState::TerminatingAggregatingStats => {
                info!(
                    "{} Forcefully terminating session before its usage report arrived",
                    self.session_id
                );
            }
            _ => {}
        }
        self.set_fsm_state(SessionFsmState::Terminated, uc);
        uc.is_session_ended = true;
        Some(self.make_termination_request(uc))
    }

    // ========================================================================
    // Rule lifecycle
    // ========================================================================

    pub fn is_static_rule_installed(&self, rule_id: &str) -> bool {
        self.active_static_rules.iter().any(|id| id == rule_id)
    }

    pub fn is_static_rule_scheduled(&self, rule_id: &str) -> bool {
        self.scheduled_static_rules.contains(rule_id)
    }

    pub fn is_dynamic_rule_installed(&self, rule_id: &str) -> bool {
        self.dynamic_rules.has_rule(rule_id)
    }

    pub fn is_dynamic_rule_scheduled(&self, rule_id: &str) -> bool {
        self.scheduled_dynamic_rules.has_rule(rule_id)
    }

    pub fn is_gy_dynamic_rule_installed(&self, rule_id: &str) -> bool {
        self.gy_dynamic_rules.has_rule(rule_id)
    }

    pub fn get_rule_lifetime(&self, rule_id: &str) -> Option<&RuleLifetime> {
        self.rule_lifetimes.get(rule_id)
    }

    pub fn activate_static_rule(
        &mut self,
        rule_id: &str,
        lifetime: RuleLifetime,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if self.is_static_rule_installed(rule_id) {
            return;
        }
        self.rule_lifetimes.insert(rule_id.to_string(), lifetime);
        self.active_static_rules.push(rule_id.to_string());
        uc.static_rules_to_install.insert(rule_id.to_string());
        uc.new_rule_lifetimes.insert(rule_id.to_string(), lifetime);
        self.increment_rule_version(rule_id, uc);
    }

    pub fn schedule_static_rule(
        &mut self,
        rule_id: &str,
        lifetime: RuleLifetime,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        self.rule_lifetimes.insert(rule_id.to_string(), lifetime);
        self.scheduled_static_rules.insert(rule_id.to_string());
        uc.new_scheduled_static_rules.insert(rule_id.to_string());
        uc.new_rule_lifetimes.insert(rule_id.to_string(), lifetime);
    }

    pub fn deactivate_static_rule(
        &mut self,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        let Some(position) = self.active_static_rules.iter().position(|id| id == rule_id)
        else {
            return false;
        };
        self.active_static_rules.remove(position);
        uc.static_rules_to_uninstall.insert(rule_id.to_string());
        self.increment_rule_version(rule_id, uc);
        true
    }

    pub fn deactivate_scheduled_static_rule(
        &mut self,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        if !self.scheduled_static_rules.remove(rule_id) {
            return false;
        }
        uc.static_rules_to_uninstall.insert(rule_id.to_string());
        true
    }

    pub fn insert_dynamic_rule(
        &mut self,
        rule: PolicyRule,
        lifetime: RuleLifetime,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if self.is_dynamic_rule_installed(&rule.id) {
            return;
        }
        self.rule_lifetimes.insert(rule.id.clone(), lifetime);
        uc.new_rule_lifetimes.insert(rule.id.clone(), lifetime);
        uc.dynamic_rules_to_install.push(rule.clone());
        self.increment_rule_version(&rule.id, uc);
        self.dynamic_rules.insert_rule(rule);
    }

    pub fn schedule_dynamic_rule(
        &mut self,
        rule: PolicyRule,
        lifetime: RuleLifetime,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        self.rule_lifetimes.insert(rule.id.clone(), lifetime);
        uc.new_rule_lifetimes.insert(rule.id.clone(), lifetime);
        uc.new_scheduled_dynamic_rules.push(rule.clone());
        self.scheduled_dynamic_rules.insert_rule(rule);
    }

    pub fn insert_gy_dynamic_rule(
        &mut self,
        rule: PolicyRule,
        lifetime: RuleLifetime,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if self.is_gy_dynamic_rule_installed(&rule.id) {
            debug!("Tried to insert gy dynamic rule {} but it already existed", rule.id);
            return;
        }
        self.rule_lifetimes.insert(rule.id.clone(), lifetime);
        uc.new_rule_lifetimes.insert(rule.id.clone(), lifetime);
        uc.gy_dynamic_rules_to_install.push(rule.clone());
        self.gy_dynamic_rules.insert_rule(rule);
    }

    pub fn remove_dynamic_rule(
        &mut self,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) -> Option<PolicyRule> {
        let removed = self.dynamic_rules.remove_rule(rule_id);
        if removed.is_some() {
            uc.dynamic_rules_to_uninstall.insert(rule_id.to_string());
            self.increment_rule_version(rule_id, uc);
        }
        removed
    }

    pub fn remove_scheduled_dynamic_rule(
        &mut self,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) -> Option<PolicyRule> {
        let removed = self.scheduled_dynamic_rules.remove_rule(rule_id);
        if removed.is_some() {
            uc.dynamic_rules_to_uninstall.insert(rule_id.to_string());
        }
        removed
    }

    pub fn remove_gy_dynamic_rule(
        &mut self,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) -> Option<PolicyRule> {
        let removed = self.gy_dynamic_rules.remove_rule(rule_id);
        if removed.is_some() {
            uc.gy_dynamic_rules_to_uninstall.insert(rule_id.to_string());
        }
        removed
    }

    fn install_scheduled_static_rule(
        &mut self,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if !self.scheduled_static_rules.remove(rule_id) {
            error!("Failed to mark scheduled static rule {} as installed", rule_id);
            return;
        }
        self.active_static_rules.push(rule_id.to_string());
        uc.static_rules_to_install.insert(rule_id.to_string());
        self.increment_rule_version(rule_id, uc);
    }

    fn install_scheduled_dynamic_rule(
        &mut self,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        let Some(rule) = self.scheduled_dynamic_rules.remove_rule(rule_id) else {
            error!("Failed to mark scheduled dynamic rule {} as installed", rule_id);
            return;
        };
        uc.dynamic_rules_to_install.push(rule.clone());
        self.increment_rule_version(rule_id, uc);
        self.dynamic_rules.insert_rule(rule);
    }

    fn should_rule_be_active(&self, rule_id: &str, time: u64) -> bool {
        self.rule_lifetimes
            .get(rule_id)
            .map(|lifetime| lifetime.should_be_active(time))
            .unwrap_or(false)
    }

    fn should_rule_be_deactivated(&self, rule_id: &str, time: u64) -> bool {
        self.rule_lifetimes
            .get(rule_id)
            .map(|lifetime| lifetime.should_be_deactivated(time))
            .unwrap_or(false)
    }

    /// Move every rule to the state its lifetime dictates at `now`.
    /// Idempotent; behavior is undefined if `now` moves backwards between
    /// calls. A deactivated rule never re-activates without a new install.
    pub fn sync_rules_to_time(&mut self, now: u64, uc: &mut SessionStateUpdateCriteria) {
        // Active static rules that expired
        let expired: Vec<String> = self
            .active_static_rules
            .iter()
            .filter(|id| self.should_rule_be_deactivated(id, now))
            .cloned()
            .collect();
        for rule_id in expired {
            self.deactivate_static_rule(&rule_id, uc);
        }
        // Scheduled static rules that reached their window (or missed it)
        let scheduled: Vec<String> = self.scheduled_static_rules.iter().cloned().collect();
        for rule_id in scheduled {
            if self.should_rule_be_active(&rule_id, now) {
                self.install_scheduled_static_rule(&rule_id, uc);
            } else if self.should_rule_be_deactivated(&rule_id, now) {
                self.scheduled_static_rules.remove(&rule_id);
                uc.static_rules_to_uninstall.insert(rule_id);
            }
        }
        // Active dynamic rules that expired
        for rule_id in self.dynamic_rules.get_rule_ids() {
            if self.should_rule_be_deactivated(&rule_id, now) {
                self.remove_dynamic_rule(&rule_id, uc);
            }
        }
        // Scheduled dynamic rules
        for rule_id in self.scheduled_dynamic_rules.get_rule_ids() {
            if self.should_rule_be_active(&rule_id, now) {
                self.install_scheduled_dynamic_rule(&rule_id, uc);
            } else if self.should_rule_be_deactivated(&rule_id, now) {
                self.remove_scheduled_dynamic_rule(&rule_id, uc);
            }
        }
    }

    pub fn get_active_static_rules(&self) -> &[String] {
        &self.active_static_rules
    }

    pub fn get_dynamic_rules(&self) -> &DynamicRuleStore {
        &self.dynamic_rules
    }

    pub fn get_gy_dynamic_rules(&self) -> &DynamicRuleStore {
        &self.gy_dynamic_rules
    }

    pub fn total_monitored_rules_count(&self) -> usize {
        let monitored_static = self
            .active_static_rules
            .iter()
            .filter(|id| self.static_rules.get_monitoring_key_for_rule_id(id).is_some())
            .count();
        self.dynamic_rules.monitored_rules_count() + monitored_static
    }

    pub fn active_monitored_rules_exist(&self) -> bool {
        self.total_monitored_rules_count() > 0
    }

    // ========================================================================
    // Policy versions and stats
    // ========================================================================

    pub fn get_current_rule_version(&self, rule_id: &str) -> u32 {
        self.policy_version_and_stats
            .get(rule_id)
            .map(|entry| entry.current_version)
            .unwrap_or(0)
    }

    fn increment_rule_version(&mut self, rule_id: &str, uc: &mut SessionStateUpdateCriteria) {
        let entry = self.policy_version_and_stats.entry(rule_id.to_string()).or_default();
        entry.current_version += 1;
        uc.updated_policy_version_and_stats = Some(self.policy_version_and_stats.clone());
    }

    fn record_rule_stats(
        &mut self,
        rule_id: &str,
        used_tx: u64,
        used_rx: u64,
        dropped_tx: u64,
        dropped_rx: u64,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        let entry = self.policy_version_and_stats.entry(rule_id.to_string()).or_default();
        if entry.current_version == 0 {
            // Usage for a rule installed outside this session's bookkeeping
            entry.current_version = 1;
        }
        entry
            .stats_map
            .entry(entry.current_version)
            .or_default()
            .add(used_tx, used_rx, dropped_tx, dropped_rx);
        uc.updated_policy_version_and_stats = Some(self.policy_version_and_stats.clone());
    }

    // ========================================================================
    // Usage accounting
    // ========================================================================

    /// Credit the rule's charging key, its monitoring key and the
    /// session-level monitor (when distinct) with reported usage. Rules
    /// with neither key still land in the per-rule stats counters.
    pub fn add_rule_usage(
        &mut self,
        rule_id: &str,
        used_tx: u64,
        used_rx: u64,
        dropped_tx: u64,
        dropped_rx: u64,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if self.curr_state == SessionFsmState::TerminatingAggregatingStats {
            self.set_fsm_state(SessionFsmState::TerminatingFlowActive, uc);
        }
        self.record_rule_stats(rule_id, used_tx, used_rx, dropped_tx, dropped_rx, uc);

        let charging_key = self
            .dynamic_rules
            .get_charging_key_for_rule_id(rule_id)
            .or_else(|| self.static_rules.get_charging_key_for_rule_id(rule_id));
        if let Some(key) = charging_key {
            info!(
                "Updating used charging credit for rule={} {}",
                rule_id, key
            );
            if let Some(grant) = self.credit_map.get_mut(&key) {
                let credit_uc = uc
                    .charging_credit_map
                    .entry(key)
                    .or_insert_with(|| grant.get_update_criteria());
                grant.credit.add_used_credit(used_tx, used_rx, credit_uc);
            }
        }

        let monitoring_key = self
            .dynamic_rules
            .get_monitoring_key_for_rule_id(rule_id)
            .or_else(|| self.static_rules.get_monitoring_key_for_rule_id(rule_id));
        if let Some(mkey) = &monitoring_key {
            debug!("Updating used monitoring credit for rule={} mkey={}", rule_id, mkey);
            self.add_to_monitor(mkey, used_tx, used_rx, uc);
        }
        if let Some(session_key) = self.session_level_key.clone() {
            if monitoring_key.as_deref() != Some(session_key.as_str()) {
                self.add_to_monitor(&session_key, used_tx, used_rx, uc);
            }
        }
    }

    /// Sum usage over the unique charging/monitoring keys referenced by
    /// the session's installed rules.
    pub fn get_total_credit_usage(&self) -> TotalCreditUsage {
        let mut charging_keys: HashSet<CreditKey> = HashSet::new();
        let mut monitoring_keys: HashSet<String> = HashSet::new();

        for rule_id in &self.active_static_rules {
            if let Some(key) = self.static_rules.get_charging_key_for_rule_id(rule_id) {
                charging_keys.insert(key);
            }
            if let Some(mkey) = self.static_rules.get_monitoring_key_for_rule_id(rule_id) {
                monitoring_keys.insert(mkey);
            }
        }
        for rule_id in self.dynamic_rules.get_rule_ids() {
            if let Some(key) = self.dynamic_rules.get_charging_key_for_rule_id(&rule_id) {
                charging_keys.insert(key);
            }
            if let Some(mkey) = self.dynamic_rules.get_monitoring_key_for_rule_id(&rule_id) {
                monitoring_keys.insert(mkey);
            }
        }

        let mut usage = TotalCreditUsage::default();
        for key in charging_keys {
            usage.charging_tx += self.get_charging_credit(&key, Bucket::UsedTx);
            usage.charging_rx += self.get_charging_credit(&key, Bucket::UsedRx);
        }
        for mkey in monitoring_keys {
            usage.monitoring_tx += self.get_monitor(&mkey, Bucket::UsedTx);
            usage.monitoring_rx += self.get_monitor(&mkey, Bucket::UsedRx);
        }
        usage
    }

    // ========================================================================
    // Charging credits
    // ========================================================================

    pub fn get_charging_credit(&self, key: &CreditKey, bucket: Bucket) -> u64 {
        self.credit_map
            .get(key)
            .map(|grant| grant.credit.get_credit(bucket))
            .unwrap_or(0)
    }

    pub fn get_credit_key_count(&self) -> usize {
        self.credit_map.len() + self.monitor_map.len()
    }

    pub fn is_credit_suspended(&self, key: &CreditKey) -> bool {
        self.credit_map.get(key).map(|grant| grant.suspended).unwrap_or(false)
    }

    pub fn is_credit_state_redirected(&self, key: &CreditKey) -> bool {
        self.credit_map
            .get(key)
            .map(|grant| grant.is_service_redirected())
            .unwrap_or(false)
    }

    /// Apply a credit-control answer for one charging key.
    pub fn receive_charging_credit(
        &mut self,
        update: &CreditUpdateResponse,
        now: u64,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        let key = update.credit_key();
        if !self.credit_map.contains_key(&key) {
            return self.init_charging_credit(update, now, uc);
        }
        let validity = ChargingGrant::get_credit_response_validity(update);
        let Some(grant) = self.credit_map.get_mut(&key) else {
            return false;
        };
        let credit_uc =
            uc.charging_credit_map.entry(key).or_insert_with(|| grant.get_update_criteria());
        match validity {
            CreditValidity::Invalid => {
                error!(
                    "{} Invalid credit update for {} (code {}); dropping",
                    self.session_id, key, update.result_code
                );
                grant.credit.mark_failure(update.result_code, credit_uc);
                false
            }
            CreditValidity::Transient => {
                warn!(
                    "{} Transient credit result for {} (code {}); suspending",
                    self.session_id, key, update.result_code
                );
                if update.success {
                    grant.receive_charging_grant(&update.credit, now, credit_uc);
                } else {
                    grant.credit.mark_failure(update.result_code, credit_uc);
                }
                if grant.service_state == ServiceState::Enabled {
                    grant.set_service_state(ServiceState::NeedsSuspension, credit_uc);
                }
                update.success
            }
            CreditValidity::Valid => {
                let gsu = &update.credit.granted_units;
                debug!(
                    "Received charging credit total={} tx={} rx={} for {} {}",
                    gsu.total.volume, gsu.tx.volume, gsu.rx.volume, self.imsi, key
                );
                let was_suspended = grant.suspended;
                grant.receive_charging_grant(&update.credit, now, credit_uc);
                if was_suspended {
                    // Re-enable service now that quota flows again
                    grant.set_service_state(ServiceState::NeedsActivation, credit_uc);
                }
                true
            }
        }
    }

    fn init_charging_credit(
        &mut self,
        update: &CreditUpdateResponse,
        now: u64,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        let key = update.credit_key();
        let validity = ChargingGrant::get_credit_response_validity(update);
        if validity == CreditValidity::Invalid {
            error!("Credit init failed for {} and {}", self.imsi, key);
            return false;
        }
        info!("Initialized a charging credit for {} and {}", self.imsi, key);

        let mut grant = ChargingGrant::new(update.limit_type);
        let mut credit_uc = SessionCreditUpdateCriteria::default();
        grant.receive_charging_grant(&update.credit, now, &mut credit_uc);
        if validity == CreditValidity::Transient {
            grant.set_suspended(true, &mut credit_uc);
        }
        uc.charging_credit_to_install.insert(key, grant.marshal());
        self.credit_map.insert(key, grant);
        true
    }

    pub fn reset_reporting_charging_credit(
        &mut self,
        key: &CreditKey,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        let Some(grant) = self.credit_map.get_mut(key) else {
            error!(
                "Could not reset credit for {} and {} because it wasn't found",
                self.imsi, key
            );
            return false;
        };
        let credit_uc =
            uc.charging_credit_map.entry(*key).or_insert_with(|| grant.get_update_criteria());
        grant.credit.reset_reporting_credit(credit_uc);
        true
    }

    /// Engage a re-auth for one charging key; unknown keys get an empty
    /// grant so the update request still goes out.
    pub fn reauth_key(
        &mut self,
        key: &CreditKey,
        uc: &mut SessionStateUpdateCriteria,
    ) -> ReAuthResult {
        if let Some(grant) = self.credit_map.get_mut(key) {
            if grant.credit.is_reporting() {
                return ReAuthResult::UpdateNotNeeded;
            }
            let credit_uc =
                uc.charging_credit_map.entry(*key).or_insert_with(|| grant.get_update_criteria());
            grant.reauth(credit_uc);
            return ReAuthResult::UpdateInitiated;
        }
        let mut grant = ChargingGrant::default();
        let mut scratch = SessionCreditUpdateCriteria::default();
        grant.reauth(&mut scratch);
        uc.charging_credit_to_install.insert(*key, grant.marshal());
        self.credit_map.insert(*key, grant);
        ReAuthResult::UpdateInitiated
    }

    /// Engage a re-auth for every charging key that is not mid-report.
    pub fn reauth_all(&mut self, uc: &mut SessionStateUpdateCriteria) -> ReAuthResult {
        let mut result = ReAuthResult::UpdateNotNeeded;
        for (key, grant) in self.credit_map.iter_mut() {
            if grant.credit.is_reporting() {
                continue;
            }
            let credit_uc =
                uc.charging_credit_map.entry(*key).or_insert_with(|| grant.get_update_criteria());
            grant.reauth(credit_uc);
            result = ReAuthResult::UpdateInitiated;
        }
        result
    }

    // ========================================================================
    // Monitors
    // ========================================================================

    pub fn get_monitor(&self, key: &str, bucket: Bucket) -> u64 {
        self.monitor_map
            .get(key)
            .map(|monitor| monitor.credit.get_credit(bucket))
            .unwrap_or(0)
    }

    pub fn get_session_level_key(&self) -> Option<&str> {
        self.session_level_key.as_deref()
    }

    pub fn add_to_monitor(
        &mut self,
        key: &str,
        used_tx: u64,
        used_rx: u64,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        let Some(monitor) = self.monitor_map.get_mut(key) else {
            return false;
        };
        let credit_uc = uc
            .monitor_credit_map
            .entry(key.to_string())
            .or_insert_with(|| monitor.get_update_criteria());
        monitor.credit.add_used_credit(used_tx, used_rx, credit_uc);
        true
    }

    pub fn set_monitor(
        &mut self,
        key: &str,
        monitor: Monitor,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        uc.monitor_credit_to_install.insert(key.to_string(), monitor.marshal());
        self.monitor_map.insert(key.to_string(), monitor);
    }

    pub fn reset_reporting_monitor(
        &mut self,
        key: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        let Some(monitor) = self.monitor_map.get_mut(key) else {
            error!(
                "Could not reset monitor for {} and key {} because it wasn't found",
                self.imsi, key
            );
            return false;
        };
        let credit_uc = uc
            .monitor_credit_map
            .entry(key.to_string())
            .or_insert_with(|| monitor.get_update_criteria());
        monitor.credit.reset_reporting_credit(credit_uc);
        true
    }

    /// Apply a usage-monitoring answer for one monitoring key.
    pub fn receive_monitor(
        &mut self,
        update: &UsageMonitoringUpdateResponse,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        if update.success {
            for trigger in &update.event_triggers {
                if *trigger == EventTrigger::RevalidationTimeout {
                    self.add_new_event_trigger(*trigger, uc);
                }
            }
            if update.revalidation_time > 0 {
                self.set_revalidation_time(update.revalidation_time, uc);
            }
            if update.credit.level == MonitoringLevel::SessionLevel {
                self.update_session_level_key(update, uc);
            }
        }

        let mkey = update.credit.monitoring_key.clone();
        if !self.monitor_map.contains_key(&mkey) {
            return self.init_new_monitor(update, uc);
        }
        let Some(monitor) = self.monitor_map.get_mut(&mkey) else {
            return false;
        };
        let credit_uc = uc
            .monitor_credit_map
            .entry(mkey.clone())
            .or_insert_with(|| monitor.get_update_criteria());
        if !update.success {
            monitor.credit.mark_failure(update.result_code, credit_uc);
            return false;
        }
        let gsu = &update.credit.granted_units;
        debug!(
            "Received monitor credit total={} tx={} rx={} for {} mkey={}",
            gsu.total.volume, gsu.tx.volume, gsu.rx.volume, self.imsi, mkey
        );
        monitor.credit.receive_credit(gsu, credit_uc);
        if update.credit.action == MonitoringAction::Disable {
            // Keep the monitor around until its final report is flushed
            monitor.credit.set_report_last_credit(true, credit_uc);
        }
        true
    }

    fn init_new_monitor(
        &mut self,
        update: &UsageMonitoringUpdateResponse,
        uc: &mut SessionStateUpdateCriteria,
    ) -> bool {
        let mkey = &update.credit.monitoring_key;
        if !update.success {
            error!("Monitoring init failed for {} and key {}", self.imsi, mkey);
            return false;
        }
        if update.credit.action == MonitoringAction::Disable {
            warn!(
                "Monitoring init has action disabled for {} and key {}",
                self.imsi, mkey
            );
            return false;
        }
        debug!("Initialized a monitoring credit for {} and key {}", self.imsi, mkey);

        let mut monitor = Monitor::new(update.credit.level);
        // Validity time and final units are not used for monitors
        let mut scratch = SessionCreditUpdateCriteria::default();
        monitor.credit.receive_credit(&update.credit.granted_units, &mut scratch);

        uc.monitor_credit_to_install.insert(mkey.clone(), monitor.marshal());
        self.monitor_map.insert(mkey.clone(), monitor);
        true
    }

    fn update_session_level_key(
        &mut self,
        update: &UsageMonitoringUpdateResponse,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        let new_key = &update.credit.monitoring_key;
        if update.credit.action == MonitoringAction::Disable {
            if self.session_level_key.as_deref() == Some(new_key.as_str()) {
                self.session_level_key = None;
                uc.is_session_level_key_updated = true;
                uc.updated_session_level_key = None;
            }
            return;
        }
        if let Some(existing) = &self.session_level_key {
            if existing != new_key {
                warn!("Session level monitoring key already exists, updating");
            }
        }
        self.session_level_key = Some(new_key.clone());
        uc.is_session_level_key_updated = true;
        uc.updated_session_level_key = Some(new_key.clone());
    }

    // ========================================================================
    // Event triggers
    // ========================================================================

    pub fn add_new_event_trigger(
        &mut self,
        trigger: EventTrigger,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        info!("Event trigger {} is pending for {}", trigger.name(), self.session_id);
        self.set_event_trigger(trigger, EventTriggerState::Pending, uc);
    }

    pub fn mark_event_trigger_as_triggered(
        &mut self,
        trigger: EventTrigger,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if self.pending_event_triggers.get(&trigger) != Some(&EventTriggerState::Pending) {
            warn!(
                "Event trigger {} requested to fire is not pending for {}",
                trigger.name(),
                self.session_id
            );
        }
        self.set_event_trigger(trigger, EventTriggerState::Ready, uc);
    }

    pub fn remove_event_trigger(
        &mut self,
        trigger: EventTrigger,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        info!("Event trigger {} is removed for {}", trigger.name(), self.session_id);
        self.pending_event_triggers.remove(&trigger);
        uc.is_pending_event_triggers_updated = true;
        uc.pending_event_triggers.insert(trigger, EventTriggerState::Cleared);
    }

    fn set_event_trigger(
        &mut self,
        trigger: EventTrigger,
        state: EventTriggerState,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        self.pending_event_triggers.insert(trigger, state);
        uc.is_pending_event_triggers_updated = true;
        uc.pending_event_triggers.insert(trigger, state);
    }

    pub fn get_event_trigger_state(&self, trigger: EventTrigger) -> Option<EventTriggerState> {
        self.pending_event_triggers.get(&trigger).copied()
    }

    pub fn set_revalidation_time(&mut self, time: u64, uc: &mut SessionStateUpdateCriteria) {
        self.revalidation_time = time;
        uc.updated_revalidation_time = Some(time);
    }

    pub fn get_revalidation_time(&self) -> u64 {
        self.revalidation_time
    }

    // ========================================================================
    // Bearers
    // ========================================================================

    pub fn bind_policy_to_bearer(
        &mut self,
        policy_type: PolicyType,
        rule_id: &str,
        bearer_id: u32,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        self.bearer_id_by_policy.insert(PolicyId::new(policy_type, rule_id), bearer_id);
        uc.is_bearer_mapping_updated = true;
        uc.bearer_id_by_policy = self.bearer_id_by_policy.clone();
    }

    pub fn remove_bearer_binding(
        &mut self,
        policy_type: PolicyType,
        rule_id: &str,
        uc: &mut SessionStateUpdateCriteria,
    ) -> Option<u32> {
        let removed = self.bearer_id_by_policy.remove(&PolicyId::new(policy_type, rule_id));
        if removed.is_some() {
            uc.is_bearer_mapping_updated = true;
            uc.bearer_id_by_policy = self.bearer_id_by_policy.clone();
        }
        removed
    }

    pub fn get_bearer_id_for_policy(
        &self,
        policy_type: PolicyType,
        rule_id: &str,
    ) -> Option<u32> {
        self.bearer_id_by_policy.get(&PolicyId::new(policy_type, rule_id)).copied()
    }

    pub fn has_bearer_id(&self, bearer_id: u32) -> bool {
        self.config.bearer_id == bearer_id
            || self.bearer_id_by_policy.values().any(|id| *id == bearer_id)
    }

    // ========================================================================
    // Outbound updates
    // ========================================================================

    /// Collect every due update and enforcement action for this session.
    /// Only active sessions report; terminating sessions flush through
    /// `make_termination_request`.
    pub fn get_updates(
        &mut self,
        config: &SessionCreditConfig,
        now: u64,
        update_request_out: &mut UpdateSessionRequest,
        actions_out: &mut Vec<ServiceAction>,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        if self.curr_state != SessionFsmState::Active {
            return;
        }
        self.get_charging_updates(config, now, update_request_out, actions_out, uc);
        self.get_monitor_updates(config, update_request_out, uc);
    }

    fn get_charging_updates(
        &mut self,
        config: &SessionCreditConfig,
        now: u64,
        update_request_out: &mut UpdateSessionRequest,
        actions_out: &mut Vec<ServiceAction>,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        let SessionState {
            imsi,
            session_id,
            request_number,
            config: session_config,
            credit_map,
            static_rules,
            dynamic_rules,
            ..
        } = self;

        for (key, grant) in credit_map.iter_mut() {
            let credit_uc =
                uc.charging_credit_map.entry(*key).or_insert_with(|| grant.get_update_criteria());

            if grant.should_deactivate_service(config) {
                grant.set_service_state(ServiceState::NeedsDeactivation, credit_uc);
            }
            let action_type = grant.get_action(credit_uc);
            match action_type {
                ServiceActionType::ContinueService => {
                    let Some(update_type) =
                        grant.get_update_type(config.usage_reporting_threshold, now)
                    else {
                        continue;
                    };
                    debug!("Subscriber {} {} updating due to {:?}", imsi, key, update_type);
                    if grant.reauth_state == ReAuthState::ReauthRequired {
                        grant.set_reauth(ReAuthState::ReauthProcessing, credit_uc);
                    }
                    let mut usage = grant.get_credit_usage(update_type.into(), false, credit_uc);
                    usage.charging_key = key.rating_group;
                    usage.service_identifier =
                        (key.service_identifier != 0).then_some(key.service_identifier);
                    update_request_out.updates.push(CreditUsageUpdate {
                        session_id: session_id.clone(),
                        request_number: *request_number,
                        sid: imsi.clone(),
                        usage,
                        requested_units: config.requested_units,
                        config: session_config.clone(),
                    });
                    *request_number += 1;
                    uc.request_number_increment += 1;
                }
                ServiceActionType::Redirect
                | ServiceActionType::RestrictAccess
                | ServiceActionType::TerminateService
                | ServiceActionType::ActivateService => {
                    info!("Subscriber {} {} action {}", imsi, key, action_type.name());
                    let mut action = ServiceAction::new(action_type, imsi, session_id);
                    action.credit_key = *key;
                    action.ip_addr = session_config.ue_ipv4;
                    if action_type == ServiceActionType::Redirect {
                        action.redirect_server =
                            Some(grant.final_action_info.redirect_server.clone());
                    }
                    if action_type == ServiceActionType::RestrictAccess {
                        action.restrict_rule_ids = grant.final_action_info.restrict_rules.clone();
                    }
                    action.rule_ids = static_rules.get_rule_ids_for_charging_key(key);
                    action.rule_definitions =
                        dynamic_rules.get_rule_definitions_for_charging_key(key);
                    actions_out.push(action);
                }
            }
        }
    }

    fn get_monitor_updates(
        &mut self,
        config: &SessionCreditConfig,
        update_request_out: &mut UpdateSessionRequest,
        uc: &mut SessionStateUpdateCriteria,
    ) {
        let SessionState {
            imsi,
            session_id,
            request_number,
            config: session_config,
            monitor_map,
            pending_event_triggers,
            ..
        } = self;

        let mut to_remove: Vec<String> = Vec::new();
        for (mkey, monitor) in monitor_map.iter_mut() {
            let credit_uc = uc
                .monitor_credit_map
                .entry(mkey.clone())
                .or_insert_with(|| monitor.get_update_criteria());
            if !monitor.should_report(config.usage_reporting_threshold) {
                continue;
            }
            let report_last = monitor.credit.is_report_last_credit();
            debug!("Subscriber {} monitoring key {} updating", imsi, mkey);
            let usage = if report_last {
                monitor.credit.get_all_unreported_usage_for_reporting(credit_uc)
            } else {
                monitor.credit.get_usage_for_reporting(credit_uc)
            };
            update_request_out.usage_monitors.push(UsageMonitoringUpdateRequest {
                session_id: session_id.clone(),
                request_number: *request_number,
                sid: imsi.clone(),
                event_trigger: Some(EventTrigger::UsageReport),
                update: Some(UsageMonitorUpdate {
                    monitoring_key: mkey.clone(),
                    level: monitor.level,
                    bytes_tx: usage.bytes_tx,
                    bytes_rx: usage.bytes_rx,
                }),
                config: session_config.clone(),
            });
            *request_number += 1;
            uc.request_number_increment += 1;

            if report_last {
                // Final report flushed; the monitor can go now
                credit_uc.deleted = true;
                to_remove.push(mkey.clone());
            }
        }
        for mkey in to_remove {
            monitor_map.remove(&mkey);
        }

        // A ready revalidation timeout produces one bare trigger report
        if pending_event_triggers.get(&EventTrigger::RevalidationTimeout)
            == Some(&EventTriggerState::Ready)
        {
            update_request_out.usage_monitors.push(UsageMonitoringUpdateRequest {
                session_id: session_id.clone(),
                request_number: *request_number,
                sid: imsi.clone(),
                event_trigger: Some(EventTrigger::RevalidationTimeout),
                update: None,
                config: session_config.clone(),
            });
            *request_number += 1;
            uc.request_number_increment += 1;
            pending_event_triggers.remove(&EventTrigger::RevalidationTimeout);
            uc.is_pending_event_triggers_updated = true;
            uc.pending_event_triggers
                .insert(EventTrigger::RevalidationTimeout, EventTriggerState::Cleared);
        }
    }

    /// Flush every charging and monitoring key's unreported usage,
    /// bypassing the reporting cap. The one place a session may report
    /// more than it was granted.
    pub fn make_termination_request(
        &mut self,
        uc: &mut SessionStateUpdateCriteria,
    ) -> SessionTerminateRequest {
        let SessionState {
            imsi,
            session_id,
            request_number,
            config: session_config,
            credit_map,
            monitor_map,
            ..
        } = self;

        let mut request = SessionTerminateRequest {
            session_id: session_id.clone(),
            request_number: *request_number,
            sid: imsi.clone(),
            config: session_config.clone(),
            ..Default::default()
        };
        for (mkey, monitor) in monitor_map.iter_mut() {
            let credit_uc = uc
                .monitor_credit_map
                .entry(mkey.clone())
                .or_insert_with(|| monitor.get_update_criteria());
            let usage = monitor.credit.get_all_unreported_usage_for_reporting(credit_uc);
            request.monitor_usages.push(UsageMonitorUpdate {
                monitoring_key: mkey.clone(),
                level: monitor.level,
                bytes_tx: usage.bytes_tx,
                bytes_rx: usage.bytes_rx,
            });
        }
        for (key, grant) in credit_map.iter_mut() {
            let credit_uc =
                uc.charging_credit_map.entry(*key).or_insert_with(|| grant.get_update_criteria());
            let mut usage = grant.get_credit_usage(
                smc_proto::CreditUsageType::Terminated,
                true,
                credit_uc,
            );
            usage.charging_key = key.rating_group;
            usage.service_identifier =
                (key.service_identifier != 0).then_some(key.service_identifier);
            request.credit_usages.push(usage);
        }
        *request_number += 1;
        uc.request_number_increment += 1;
        request
    }

    // ========================================================================
    // Diff replay (storage side)
    // ========================================================================

    /// Replay one mutation cycle's diff onto this (freshly read) session.
    /// `is_session_ended` is handled by the storage façade, which erases
    /// the session instead of merging it.
    pub fn merge_updates(&mut self, uc: &SessionStateUpdateCriteria) {
        if uc.is_config_updated {
            self.config = uc.updated_config.clone();
        }
        if uc.is_fsm_updated {
            self.curr_state = uc.updated_fsm_state;
        }
        self.request_number += uc.request_number_increment;
        if uc.updated_pdp_end_time > 0 {
            self.pdp_end_time = uc.updated_pdp_end_time;
        }

        for (rule_id, lifetime) in &uc.new_rule_lifetimes {
            self.rule_lifetimes.insert(rule_id.clone(), *lifetime);
        }
        for rule_id in &uc.static_rules_to_install {
            if !self.is_static_rule_installed(rule_id) {
                self.active_static_rules.push(rule_id.clone());
            }
            self.scheduled_static_rules.remove(rule_id);
        }
        for rule_id in &uc.new_scheduled_static_rules {
            self.scheduled_static_rules.insert(rule_id.clone());
        }
        for rule_id in &uc.static_rules_to_uninstall {
            self.active_static_rules.retain(|id| id != rule_id);
            self.scheduled_static_rules.remove(rule_id);
        }
        for rule in &uc.dynamic_rules_to_install {
            self.scheduled_dynamic_rules.remove_rule(&rule.id);
            self.dynamic_rules.insert_rule(rule.clone());
        }
        for rule in &uc.new_scheduled_dynamic_rules {
            self.scheduled_dynamic_rules.insert_rule(rule.clone());
        }
        for rule_id in &uc.dynamic_rules_to_uninstall {
            self.dynamic_rules.remove_rule(rule_id);
            self.scheduled_dynamic_rules.remove_rule(rule_id);
        }
        for rule in &uc.gy_dynamic_rules_to_install {
            self.gy_dynamic_rules.insert_rule(rule.clone());
        }
        for rule_id in &uc.gy_dynamic_rules_to_uninstall {
            self.gy_dynamic_rules.remove_rule(rule_id);
        }

        for (key, stored) in &uc.charging_credit_to_install {
            self.credit_map.insert(*key, ChargingGrant::unmarshal(stored));
        }
        for (key, credit_uc) in &uc.charging_credit_map {
            if credit_uc.deleted {
                self.credit_map.remove(key);
                continue;
            }
            if let Some(grant) = self.credit_map.get_mut(key) {
                grant.merge(credit_uc);
            }
        }
        for (mkey, stored) in &uc.monitor_credit_to_install {
            self.monitor_map.insert(mkey.clone(), Monitor::unmarshal(stored));
        }
        for (mkey, credit_uc) in &uc.monitor_credit_map {
            if credit_uc.deleted {
                self.monitor_map.remove(mkey);
                continue;
            }
            if let Some(monitor) = self.monitor_map.get_mut(mkey) {
                monitor.merge(credit_uc);
            }
        }
        if uc.is_session_level_key_updated {
            self.session_level_key = uc.updated_session_level_key.clone();
        }

        if uc.is_bearer_mapping_updated {
            self.bearer_id_by_policy = uc.bearer_id_by_policy.clone();
        }
        if uc.is_pending_event_triggers_updated {
            for (trigger, state) in &uc.pending_event_triggers {
                if *state == EventTriggerState::Cleared {
                    self.pending_event_triggers.remove(trigger);
                } else {
                    self.pending_event_triggers.insert(*trigger, *state);
                }
            }
        }
        if let Some(time) = uc.updated_revalidation_time {
            self.revalidation_time = time;
        }
        if let Some(stats) = &uc.updated_policy_version_and_stats {
            self.policy_version_and_stats = stats.clone();
        }
    }
}
