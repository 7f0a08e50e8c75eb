//! Final-unit/grant state machine for one charging key
//!
//! A `ChargingGrant` wraps one bucket ledger with the final-unit-action
//! metadata, validity-timer expiry and service-state transitions. The
//! transition table is a pure function of the current state; every emitted
//! action is consumed by the call that returns it, so asking twice without
//! an intervening event yields `ContinueService`.

use log::{debug, info};

use smc_proto::{
    is_permanent_failure, is_transient_failure, ChargingCredit, CreditLimitType,
    CreditUpdateResponse, CreditUpdateType, CreditUsage, CreditUsageType, FinalActionInfo,
    FinalUnitAction, ReAuthState, ServiceActionType, ServiceState, StoredChargingGrant,
};

use crate::config::SessionCreditConfig;
use crate::credit::SessionCredit;
use crate::criteria::SessionCreditUpdateCriteria;

/// Classification of an inbound credit-control answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditValidity {
    Valid,
    /// Permanent failure or a meaningless empty grant; drop, never retry
    Invalid,
    /// Transient failure or an empty grant carrying a final action /
    /// suspension; accepted conservatively
    Transient,
}

/// One charging key's grant: ledger plus final-unit and service state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargingGrant {
    pub credit: SessionCredit,
    pub is_final_grant: bool,
    pub final_action_info: FinalActionInfo,
    /// Unix seconds at which the validity timer fires; zero when unset
    pub expiry_time: u64,
    pub service_state: ServiceState,
    pub reauth_state: ReAuthState,
    pub suspended: bool,
}

impl ChargingGrant {
    pub fn new(limit_type: CreditLimitType) -> Self {
        Self { credit: SessionCredit::new_with_limit(limit_type), ..Default::default() }
    }

    pub fn unmarshal(marshaled: &StoredChargingGrant) -> Self {
        Self {
            credit: SessionCredit::unmarshal(&marshaled.credit),
            is_final_grant: marshaled.is_final,
            final_action_info: marshaled.final_action_info.clone(),
            expiry_time: marshaled.expiry_time,
            service_state: marshaled.service_state,
            reauth_state: marshaled.reauth_state,
            suspended: marshaled.suspended,
        }
    }

    pub fn marshal(&self) -> StoredChargingGrant {
        StoredChargingGrant {
            credit: self.credit.marshal(),
            is_final: self.is_final_grant,
            final_action_info: self.final_action_info.clone(),
            expiry_time: self.expiry_time,
            service_state: self.service_state,
            reauth_state: self.reauth_state,
            suspended: self.suspended,
        }
    }

    /// A diff primed with the grant's current values and zero deltas.
    pub fn get_update_criteria(&self) -> SessionCreditUpdateCriteria {
        SessionCreditUpdateCriteria {
            is_final: self.is_final_grant,
            final_action_info: self.final_action_info.clone(),
            reauth_state: self.reauth_state,
            service_state: self.service_state,
            expiry_time: self.expiry_time,
            reporting: self.credit.is_reporting(),
            suspended: self.suspended,
            report_last_credit: self.credit.is_report_last_credit(),
            grant_tracking_type: self.credit.get_grant_tracking_type(),
            received_granted_units: *self.credit.get_received_granted_units(),
            ..Default::default()
        }
    }

    // ========================================================================
    // Inbound grants
    // ========================================================================

    /// Classify a credit-control answer before applying it.
    pub fn get_credit_response_validity(update: &CreditUpdateResponse) -> CreditValidity {
        if !update.success || is_permanent_failure(update.result_code) {
            if is_transient_failure(update.result_code) {
                return CreditValidity::Transient;
            }
            return CreditValidity::Invalid;
        }
        let credit = &update.credit;
        if !credit.granted_units.is_empty() {
            return CreditValidity::Valid;
        }
        // Empty grant: only meaningful when it carries a final action or a
        // suspension-class limit type
        if credit.is_final || update.limit_type != CreditLimitType::Finite {
            return CreditValidity::Transient;
        }
        CreditValidity::Invalid
    }

    /// Apply a successful grant: final-unit metadata, validity timer and
    /// the ledger update. Clears a processing re-auth.
    pub fn receive_charging_grant(
        &mut self,
        credit: &ChargingCredit,
        now: u64,
        uc: &mut SessionCreditUpdateCriteria,
    ) {
        self.is_final_grant = credit.is_final;
        self.final_action_info = FinalActionInfo {
            final_action: credit.final_action,
            redirect_server: if credit.final_action == FinalUnitAction::Redirect {
                credit.redirect_server.clone()
            } else {
                Default::default()
            },
            restrict_rules: if credit.final_action == FinalUnitAction::RestrictAccess {
                credit.restrict_rules.clone()
            } else {
                Vec::new()
            },
        };
        self.expiry_time = if credit.validity_time > 0 {
            now + u64::from(credit.validity_time)
        } else {
            0
        };
        if self.reauth_state == ReAuthState::ReauthProcessing {
            self.set_reauth(ReAuthState::ReauthNotNeeded, uc);
        }

        uc.is_final = self.is_final_grant;
        uc.final_action_info = self.final_action_info.clone();
        uc.expiry_time = self.expiry_time;

        self.credit.receive_credit(&credit.granted_units, uc);
    }

    // ========================================================================
    // State machine
    // ========================================================================

    /// Return the pending action and advance the state. The action is
    /// consumed: a second call without an intervening state-setting event
    /// returns `ContinueService`.
    pub fn get_action(&mut self, uc: &mut SessionCreditUpdateCriteria) -> ServiceActionType {
        match self.service_state {
            ServiceState::NeedsDeactivation => {
                if !self.is_final_grant {
                    self.set_service_state(ServiceState::Disabled, uc);
                    return ServiceActionType::TerminateService;
                }
                match self.final_action_info.final_action {
                    FinalUnitAction::Terminate => {
                        self.set_service_state(ServiceState::Disabled, uc);
                        ServiceActionType::TerminateService
                    }
                    FinalUnitAction::Redirect => {
                        self.set_service_state(ServiceState::Redirected, uc);
                        ServiceActionType::Redirect
                    }
                    FinalUnitAction::RestrictAccess => {
                        self.set_service_state(ServiceState::Restricted, uc);
                        ServiceActionType::RestrictAccess
                    }
                }
            }
            ServiceState::NeedsSuspension => {
                self.set_suspended(true, uc);
                match self.final_action_info.final_action {
                    // A suspended credit with a terminate action waits for
                    // the peer to recover instead of cutting the session
                    FinalUnitAction::Terminate => {
                        self.set_service_state(ServiceState::Disabled, uc);
                        ServiceActionType::ContinueService
                    }
                    FinalUnitAction::Redirect => {
                        self.set_service_state(ServiceState::Redirected, uc);
                        ServiceActionType::Redirect
                    }
                    FinalUnitAction::RestrictAccess => {
                        self.set_service_state(ServiceState::Restricted, uc);
                        ServiceActionType::RestrictAccess
                    }
                }
            }
            ServiceState::NeedsActivation => {
                self.set_suspended(false, uc);
                self.set_service_state(ServiceState::Enabled, uc);
                ServiceActionType::ActivateService
            }
            _ => ServiceActionType::ContinueService,
        }
    }

    /// Whether the exhausted grant should move to `NeedsDeactivation`.
    /// Only an enabled service deactivates, so an already-applied
    /// terminate/redirect/restrict never re-triggers.
    pub fn should_deactivate_service(&self, config: &SessionCreditConfig) -> bool {
        if !self.is_final_grant {
            return false;
        }
        if self.service_state != ServiceState::Enabled {
            return false;
        }
        if !self.credit.is_quota_exhausted(1.0) {
            return false;
        }
        match self.final_action_info.final_action {
            FinalUnitAction::Terminate => config.terminate_service_when_quota_exhausted,
            FinalUnitAction::Redirect | FinalUnitAction::RestrictAccess => true,
        }
    }

    /// Whether an outbound update is due, and why.
    pub fn get_update_type(
        &self,
        threshold_ratio: f32,
        now: u64,
    ) -> Option<CreditUpdateType> {
        if self.credit.is_reporting() {
            // One report in flight at a time
            return None;
        }
        if self.reauth_state == ReAuthState::ReauthRequired {
            return Some(CreditUpdateType::ReauthRequired);
        }
        if self.expiry_time != 0 && self.expiry_time <= now {
            return Some(CreditUpdateType::ValidityTimerExpired);
        }
        if self.is_final_grant {
            // Nothing more to request on a final grant
            return None;
        }
        if self.credit.is_quota_exhausted(threshold_ratio) {
            return Some(CreditUpdateType::QuotaExhausted);
        }
        None
    }

    /// Build the usage figures for one outbound update. Final grants and
    /// termination bypass the reporting cap.
    pub fn get_credit_usage(
        &mut self,
        update_type: CreditUsageType,
        is_terminate: bool,
        uc: &mut SessionCreditUpdateCriteria,
    ) -> CreditUsage {
        let usage = if is_terminate || self.is_final_grant {
            self.credit.get_all_unreported_usage_for_reporting(uc)
        } else {
            self.credit.get_usage_for_reporting(uc)
        };
        CreditUsage {
            bytes_tx: usage.bytes_tx,
            bytes_rx: usage.bytes_rx,
            update_type,
            charging_key: 0,
            service_identifier: None,
        }
    }

    // ========================================================================
    // Setters (mirror every change into the diff)
    // ========================================================================

    pub fn set_service_state(
        &mut self,
        new_state: ServiceState,
        uc: &mut SessionCreditUpdateCriteria,
    ) {
        if self.service_state != new_state {
            debug!(
                "Service state change from {} to {}",
                self.service_state.name(),
                new_state.name()
            );
        }
        self.service_state = new_state;
        uc.service_state = new_state;
    }

    pub fn set_reauth(&mut self, state: ReAuthState, uc: &mut SessionCreditUpdateCriteria) {
        self.reauth_state = state;
        uc.reauth_state = state;
    }

    pub fn set_suspended(&mut self, suspended: bool, uc: &mut SessionCreditUpdateCriteria) {
        if self.suspended != suspended {
            info!("Credit {}", if suspended { "suspended" } else { "unsuspended" });
        }
        self.suspended = suspended;
        uc.suspended = suspended;
    }

    /// Engage a re-auth cycle requested by the charging peer.
    pub fn reauth(&mut self, uc: &mut SessionCreditUpdateCriteria) {
        self.set_reauth(ReAuthState::ReauthRequired, uc);
    }

    pub fn is_service_redirected(&self) -> bool {
        self.service_state == ServiceState::Redirected
    }

    /// Replay a credit diff onto this (freshly read) grant.
    pub fn merge(&mut self, uc: &SessionCreditUpdateCriteria) {
        self.is_final_grant = uc.is_final;
        self.final_action_info = uc.final_action_info.clone();
        self.reauth_state = uc.reauth_state;
        self.service_state = uc.service_state;
        self.expiry_time = uc.expiry_time;
        self.suspended = uc.suspended;
        self.credit.merge(uc);
    }
}
