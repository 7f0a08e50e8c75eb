//! Bucket ledger for one credit key
//!
//! `SessionCredit` keeps the used/allowed/reporting/reported counters for a
//! single charging or monitoring key and implements the quota-exhaustion
//! and reporting-limit math. It knows nothing about sessions or rules.

use log::{debug, error, warn};

use smc_proto::{
    is_transient_failure, Bucket, CreditLimitType, GrantTrackingType, GrantedUnits,
    StoredSessionCredit, BUCKET_COUNT,
};

use crate::criteria::SessionCreditUpdateCriteria;

/// Byte counts for one report, split by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub bytes_tx: u64,
    pub bytes_rx: u64,
}

/// Per-credit-key counters plus quota-exhaustion and reporting-limit math.
///
/// Invariant per leg: `USED = REPORTED + REPORTING + unreported`. All
/// counters are monotonic, which is what lets the update criteria carry
/// additive deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCredit {
    reporting: bool,
    credit_limit_type: CreditLimitType,
    buckets: [u64; BUCKET_COUNT],
    grant_tracking_type: GrantTrackingType,
    received_granted_units: GrantedUnits,
    report_last_credit: bool,
}

impl SessionCredit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_limit(credit_limit_type: CreditLimitType) -> Self {
        Self { credit_limit_type, ..Default::default() }
    }

    pub fn unmarshal(marshaled: &StoredSessionCredit) -> Self {
        Self {
            reporting: marshaled.reporting,
            credit_limit_type: marshaled.credit_limit_type,
            buckets: marshaled.bucket_array(),
            grant_tracking_type: marshaled.grant_tracking_type,
            received_granted_units: marshaled.received_granted_units,
            report_last_credit: marshaled.report_last_credit,
        }
    }

    pub fn marshal(&self) -> StoredSessionCredit {
        let mut marshaled = StoredSessionCredit {
            reporting: self.reporting,
            credit_limit_type: self.credit_limit_type,
            grant_tracking_type: self.grant_tracking_type,
            received_granted_units: self.received_granted_units,
            report_last_credit: self.report_last_credit,
            ..Default::default()
        };
        marshaled.set_bucket_array(&self.buckets);
        marshaled
    }

    pub fn get_credit(&self, bucket: Bucket) -> u64 {
        self.buckets[bucket as usize]
    }

    pub fn is_reporting(&self) -> bool {
        self.reporting
    }

    pub fn get_credit_limit_type(&self) -> CreditLimitType {
        self.credit_limit_type
    }

    pub fn get_grant_tracking_type(&self) -> GrantTrackingType {
        self.grant_tracking_type
    }

    pub fn get_received_granted_units(&self) -> &GrantedUnits {
        &self.received_granted_units
    }

    pub fn is_report_last_credit(&self) -> bool {
        self.report_last_credit
    }

    pub fn set_report_last_credit(&mut self, value: bool, uc: &mut SessionCreditUpdateCriteria) {
        self.report_last_credit = value;
        uc.report_last_credit = value;
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Apply a received grant: snapshot the allowed floors for the valid
    /// non-zero legs, extend the allowances, settle the in-flight report
    /// (a granted answer acknowledges the previous report) and re-derive
    /// the tracking type.
    pub fn receive_credit(&mut self, gsu: &GrantedUnits, uc: &mut SessionCreditUpdateCriteria) {
        self.grant_tracking_type = self.determine_grant_tracking_type(gsu);
        self.received_granted_units = *gsu;
        uc.grant_tracking_type = self.grant_tracking_type;
        uc.received_granted_units = *gsu;

        // Floors keep the pre-grant allowance so the size of the latest
        // grant stays computable for partial grants. Stale or absent legs
        // keep their old floor.
        if gsu.total.is_valid && gsu.total.volume > 0 {
            self.snap_floor(Bucket::AllowedFloorTotal, Bucket::AllowedTotal, uc);
        }
        if gsu.tx.is_valid && gsu.tx.volume > 0 {
            self.snap_floor(Bucket::AllowedFloorTx, Bucket::AllowedTx, uc);
        }
        if gsu.rx.is_valid && gsu.rx.volume > 0 {
            self.snap_floor(Bucket::AllowedFloorRx, Bucket::AllowedRx, uc);
        }

        if gsu.total.is_valid {
            self.add_to_bucket(Bucket::AllowedTotal, gsu.total.volume, uc);
        }
        if gsu.tx.is_valid {
            self.add_to_bucket(Bucket::AllowedTx, gsu.tx.volume, uc);
        }
        if gsu.rx.is_valid {
            self.add_to_bucket(Bucket::AllowedRx, gsu.rx.volume, uc);
        }

        // The previous report has been absorbed by the peer
        let reporting_tx = self.buckets[Bucket::ReportingTx as usize];
        let reporting_rx = self.buckets[Bucket::ReportingRx as usize];
        self.add_to_bucket(Bucket::ReportedTx, reporting_tx, uc);
        self.add_to_bucket(Bucket::ReportedRx, reporting_rx, uc);
        self.reset_reporting_credit(uc);

        debug!(
            "Received grant total={}/{} tx={}/{} rx={}/{} tracking={}",
            gsu.total.is_valid,
            gsu.total.volume,
            gsu.tx.is_valid,
            gsu.tx.volume,
            gsu.rx.is_valid,
            gsu.rx.volume,
            self.grant_tracking_type.name()
        );
    }

    /// Record usage reported by the data plane.
    pub fn add_used_credit(&mut self, used_tx: u64, used_rx: u64, uc: &mut SessionCreditUpdateCriteria) {
        self.add_to_bucket(Bucket::UsedTx, used_tx, uc);
        self.add_to_bucket(Bucket::UsedRx, used_rx, uc);
    }

    /// Drop the in-flight report state. The usage stays in the USED
    /// buckets and counts as unreported again.
    pub fn reset_reporting_credit(&mut self, uc: &mut SessionCreditUpdateCriteria) {
        self.buckets[Bucket::ReportingTx as usize] = 0;
        self.buckets[Bucket::ReportingRx as usize] = 0;
        self.reporting = false;
        uc.reporting = false;
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Usage to put on the wire for a routine (non-final) report. Capped to
    /// the granted allowance; the overshoot stays unreported until the
    /// session ends.
    pub fn get_usage_for_reporting(&mut self, uc: &mut SessionCreditUpdateCriteria) -> Usage {
        let mut usage = self.get_unreported_usage();
        self.apply_reporting_limits(&mut usage);
        self.mark_usage_reporting(usage, uc);
        usage
    }

    /// Usage to put on the wire for a final-grant or termination report.
    /// Never capped: over-usage must reach billing, not be swallowed.
    pub fn get_all_unreported_usage_for_reporting(
        &mut self,
        uc: &mut SessionCreditUpdateCriteria,
    ) -> Usage {
        let usage = self.get_unreported_usage();
        self.mark_usage_reporting(usage, uc);
        usage
    }

    fn mark_usage_reporting(&mut self, usage: Usage, uc: &mut SessionCreditUpdateCriteria) {
        self.buckets[Bucket::ReportingTx as usize] += usage.bytes_tx;
        self.buckets[Bucket::ReportingRx as usize] += usage.bytes_rx;
        self.reporting = true;
        // In-flight volumes carry no bucket deltas; only the flag travels
        uc.reporting = true;
    }

    fn get_unreported_usage(&self) -> Usage {
        let tx_settled = self.buckets[Bucket::ReportedTx as usize]
            + self.buckets[Bucket::ReportingTx as usize];
        let rx_settled = self.buckets[Bucket::ReportedRx as usize]
            + self.buckets[Bucket::ReportingRx as usize];
        Usage {
            bytes_tx: self.buckets[Bucket::UsedTx as usize].saturating_sub(tx_settled),
            bytes_rx: self.buckets[Bucket::UsedRx as usize].saturating_sub(rx_settled),
        }
    }

    /// Cap a routine report to the granted allowance, per tracking type.
    fn apply_reporting_limits(&self, usage: &mut Usage) {
        let tx_limit = Self::compute_reporting_limit(
            self.buckets[Bucket::AllowedTx as usize],
            self.buckets[Bucket::ReportedTx as usize],
        );
        let rx_limit = Self::compute_reporting_limit(
            self.buckets[Bucket::AllowedRx as usize],
            self.buckets[Bucket::ReportedRx as usize],
        );

        match self.grant_tracking_type {
            GrantTrackingType::TxOnly => {
                usage.bytes_tx = usage.bytes_tx.min(tx_limit);
                usage.bytes_rx = 0;
                debug!("Applying a TX reporting limit of {}", tx_limit);
            }
            GrantTrackingType::RxOnly => {
                usage.bytes_rx = usage.bytes_rx.min(rx_limit);
                usage.bytes_tx = 0;
                debug!("Applying a RX reporting limit of {}", rx_limit);
            }
            GrantTrackingType::TxAndRx => {
                usage.bytes_tx = usage.bytes_tx.min(tx_limit);
                usage.bytes_rx = usage.bytes_rx.min(rx_limit);
            }
            GrantTrackingType::TotalOnly => {
                let total_reported = self.buckets[Bucket::ReportedTx as usize]
                    + self.buckets[Bucket::ReportedRx as usize];
                let total_limit = Self::compute_reporting_limit(
                    self.buckets[Bucket::AllowedTotal as usize],
                    total_reported,
                );
                // tx is capped first; rx absorbs whatever of the total is left
                usage.bytes_tx = usage.bytes_tx.min(total_limit);
                usage.bytes_rx = usage.bytes_rx.min(total_limit - usage.bytes_tx);
            }
            GrantTrackingType::AllTotalTxRx => {
                usage.bytes_tx = usage.bytes_tx.min(tx_limit);
                usage.bytes_rx = usage.bytes_rx.min(rx_limit);
                let total_reported = self.buckets[Bucket::ReportedTx as usize]
                    + self.buckets[Bucket::ReportedRx as usize];
                let total_limit = Self::compute_reporting_limit(
                    self.buckets[Bucket::AllowedTotal as usize],
                    total_reported,
                );
                usage.bytes_tx = usage.bytes_tx.min(total_limit);
                usage.bytes_rx = usage.bytes_rx.min(total_limit - usage.bytes_tx);
            }
            GrantTrackingType::TrackingUnset => {}
        }
    }

    fn compute_reporting_limit(allowed: u64, reported: u64) -> u64 {
        allowed.saturating_sub(reported)
    }

    // ========================================================================
    // Exhaustion
    // ========================================================================

    /// Whether usage has consumed the latest grant up to `threshold_ratio`
    /// of its size. A ratio of 1.0 means exhausted exactly when usage
    /// reaches the top of the most recent grant.
    pub fn is_quota_exhausted(&self, threshold_ratio: f32) -> bool {
        if self.credit_limit_type != CreditLimitType::Finite {
            return false;
        }

        let tx_exhausted = Self::compute_quota_exhausted(
            self.buckets[Bucket::AllowedTx as usize],
            self.buckets[Bucket::UsedTx as usize],
            threshold_ratio,
            self.buckets[Bucket::AllowedFloorTx as usize],
        );
        let rx_exhausted = Self::compute_quota_exhausted(
            self.buckets[Bucket::AllowedRx as usize],
            self.buckets[Bucket::UsedRx as usize],
            threshold_ratio,
            self.buckets[Bucket::AllowedFloorRx as usize],
        );
        let total_exhausted = Self::compute_quota_exhausted(
            self.buckets[Bucket::AllowedTotal as usize],
            self.buckets[Bucket::UsedTx as usize] + self.buckets[Bucket::UsedRx as usize],
            threshold_ratio,
            self.buckets[Bucket::AllowedFloorTotal as usize],
        );

        match self.grant_tracking_type {
            GrantTrackingType::TotalOnly => total_exhausted,
            GrantTrackingType::TxOnly => tx_exhausted,
            GrantTrackingType::RxOnly => rx_exhausted,
            GrantTrackingType::TxAndRx => tx_exhausted || rx_exhausted,
            GrantTrackingType::AllTotalTxRx => total_exhausted || tx_exhausted || rx_exhausted,
            GrantTrackingType::TrackingUnset => false,
        }
    }

    fn compute_quota_exhausted(allowed: u64, used: u64, threshold_ratio: f32, floor: u64) -> bool {
        if floor > allowed {
            // Accounting invariant broken for this credit; fail toward
            // cutting service rather than leaking free quota
            error!(
                "Allowed floor {} exceeds allowed {}; reporting quota exhausted",
                floor, allowed
            );
            return true;
        }
        if used >= allowed {
            return true;
        }
        let remaining = allowed - used;
        let granted_this_round = allowed - floor;
        let threshold_percent = 100u64.saturating_sub((threshold_ratio * 100.0).round() as u64);
        let threshold = granted_this_round * threshold_percent / 100;
        remaining <= threshold
    }

    // ========================================================================
    // Failures
    // ========================================================================

    /// Handle a failed credit-control answer. Transient failures keep the
    /// in-flight usage unreported so the next cycle retries it; permanent
    /// failures settle it as reported so it is never re-sent.
    pub fn mark_failure(&mut self, result_code: u32, uc: &mut SessionCreditUpdateCriteria) {
        if is_transient_failure(result_code) {
            warn!("Transient failure code {}; usage will be re-reported", result_code);
            self.reset_reporting_credit(uc);
            return;
        }
        error!("Permanent failure code {}; settling in-flight usage", result_code);
        let reporting_tx = self.buckets[Bucket::ReportingTx as usize];
        let reporting_rx = self.buckets[Bucket::ReportingRx as usize];
        self.add_to_bucket(Bucket::ReportedTx, reporting_tx, uc);
        self.add_to_bucket(Bucket::ReportedRx, reporting_rx, uc);
        self.reset_reporting_credit(uc);
    }

    // ========================================================================
    // Merge helpers (storage-side replay)
    // ========================================================================

    /// Replay the ledger part of a credit diff onto this (freshly read)
    /// credit. In-flight reporting volumes carry no deltas, so a restarted
    /// process re-reports them.
    pub fn merge(&mut self, uc: &SessionCreditUpdateCriteria) {
        self.grant_tracking_type = uc.grant_tracking_type;
        self.received_granted_units = uc.received_granted_units;
        self.report_last_credit = uc.report_last_credit;
        for bucket in Bucket::ALL {
            let delta = uc.bucket_deltas[bucket as usize];
            if delta > 0 {
                self.buckets[bucket as usize] += delta;
            }
        }
    }

    /// Add a raw delta to one bucket; used when replaying update criteria.
    pub fn add_credit(&mut self, value: u64, bucket: Bucket) {
        self.buckets[bucket as usize] += value;
    }

    pub fn set_reporting(&mut self, reporting: bool) {
        self.reporting = reporting;
    }

    pub fn set_grant_tracking_type(&mut self, tracking_type: GrantTrackingType) {
        self.grant_tracking_type = tracking_type;
    }

    pub fn set_received_granted_units(&mut self, gsu: GrantedUnits) {
        self.received_granted_units = gsu;
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn add_to_bucket(&mut self, bucket: Bucket, value: u64, uc: &mut SessionCreditUpdateCriteria) {
        self.buckets[bucket as usize] += value;
        uc.add_delta(bucket, value);
    }

    fn snap_floor(
        &mut self,
        floor: Bucket,
        allowed: Bucket,
        uc: &mut SessionCreditUpdateCriteria,
    ) {
        let allowed_value = self.buckets[allowed as usize];
        let floor_value = self.buckets[floor as usize];
        // Allowed counters are monotonic, so the floor moves only forward
        uc.add_delta(floor, allowed_value.saturating_sub(floor_value));
        self.buckets[floor as usize] = allowed_value;
    }

    fn determine_grant_tracking_type(&self, gsu: &GrantedUnits) -> GrantTrackingType {
        let total_valid = gsu.total.is_valid;
        let tx_valid = gsu.tx.is_valid;
        let rx_valid = gsu.rx.is_valid;

        if total_valid && tx_valid && rx_valid {
            return GrantTrackingType::AllTotalTxRx;
        }
        if tx_valid && rx_valid {
            return GrantTrackingType::TxAndRx;
        }
        if tx_valid {
            return GrantTrackingType::TxOnly;
        }
        if rx_valid {
            return GrantTrackingType::RxOnly;
        }
        if total_valid {
            return GrantTrackingType::TotalOnly;
        }
        warn!(
            "Received a grant with no valid legs; keeping tracking type {}",
            self.grant_tracking_type.name()
        );
        self.grant_tracking_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smc_proto::CreditUnit;

    fn total_grant(volume: u64) -> GrantedUnits {
        GrantedUnits { total: CreditUnit::valid(volume), ..Default::default() }
    }

    fn receive(credit: &mut SessionCredit, gsu: GrantedUnits) -> SessionCreditUpdateCriteria {
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.receive_credit(&gsu, &mut uc);
        uc
    }

    #[test]
    fn test_add_used_credit_tracks_buckets() {
        let mut credit = SessionCredit::new();
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(300, 200, &mut uc);
        assert_eq!(credit.get_credit(Bucket::UsedTx), 300);
        assert_eq!(credit.get_credit(Bucket::UsedRx), 200);
        assert_eq!(uc.delta(Bucket::UsedTx), 300);
        assert_eq!(uc.delta(Bucket::UsedRx), 200);
    }

    #[test]
    fn test_receive_credit_sets_floor_and_allowance() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        assert_eq!(credit.get_credit(Bucket::AllowedTotal), 1000);
        assert_eq!(credit.get_credit(Bucket::AllowedFloorTotal), 0);
        assert_eq!(credit.get_grant_tracking_type(), GrantTrackingType::TotalOnly);

        receive(&mut credit, total_grant(500));
        assert_eq!(credit.get_credit(Bucket::AllowedTotal), 1500);
        // Floor holds the allowance as it was before the second grant
        assert_eq!(credit.get_credit(Bucket::AllowedFloorTotal), 1000);
    }

    #[test]
    fn test_receive_credit_acknowledges_previous_report() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));

        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(800, 0, &mut uc);
        let usage = credit.get_usage_for_reporting(&mut uc);
        assert_eq!(usage, Usage { bytes_tx: 800, bytes_rx: 0 });
        assert!(credit.is_reporting());
        assert_eq!(credit.get_credit(Bucket::ReportingTx), 800);

        let uc2 = receive(&mut credit, total_grant(1000));
        assert!(!credit.is_reporting());
        assert_eq!(credit.get_credit(Bucket::ReportingTx), 0);
        assert_eq!(credit.get_credit(Bucket::ReportedTx), 800);
        assert_eq!(uc2.delta(Bucket::ReportedTx), 800);
    }

    #[test]
    fn test_tracking_type_sticky_on_empty_grant() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        assert_eq!(credit.get_grant_tracking_type(), GrantTrackingType::TotalOnly);

        // All-invalid grant keeps the previous tracking type
        receive(&mut credit, GrantedUnits::default());
        assert_eq!(credit.get_grant_tracking_type(), GrantTrackingType::TotalOnly);
    }

    #[test]
    fn test_tracking_type_precedence() {
        let mut credit = SessionCredit::new();
        receive(
            &mut credit,
            GrantedUnits {
                total: CreditUnit::valid(100),
                tx: CreditUnit::valid(50),
                rx: CreditUnit::valid(50),
            },
        );
        assert_eq!(credit.get_grant_tracking_type(), GrantTrackingType::AllTotalTxRx);

        let mut tx_rx = SessionCredit::new();
        receive(
            &mut tx_rx,
            GrantedUnits {
                tx: CreditUnit::valid(50),
                rx: CreditUnit::valid(50),
                ..Default::default()
            },
        );
        assert_eq!(tx_rx.get_grant_tracking_type(), GrantTrackingType::TxAndRx);
    }

    #[test]
    fn test_quota_exhausted_at_full_ratio() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        let mut uc = SessionCreditUpdateCriteria::default();

        credit.add_used_credit(999, 0, &mut uc);
        assert!(!credit.is_quota_exhausted(1.0));

        // Exactly equal counts as exhausted
        credit.add_used_credit(1, 0, &mut uc);
        assert!(credit.is_quota_exhausted(1.0));
    }

    #[test]
    fn test_quota_exhausted_at_threshold() {
        // Spec scenario: 1000 granted, 900 used, threshold 0.8
        // remaining 100 <= 20% of the 1000-byte grant
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(900, 0, &mut uc);
        assert!(credit.is_quota_exhausted(0.8));
        assert!(!credit.is_quota_exhausted(1.0));
    }

    #[test]
    fn test_threshold_relative_to_latest_grant() {
        // Many small prior grants must not make the credit look
        // perpetually near-exhausted: the threshold scales with the most
        // recent grant, not the cumulative allowance.
        let mut credit = SessionCredit::new();
        let mut uc = SessionCreditUpdateCriteria::default();
        for _ in 0..9 {
            receive(&mut credit, total_grant(100));
        }
        credit.add_used_credit(900, 0, &mut uc);
        receive(&mut credit, total_grant(100));
        // remaining = 100, latest grant = 100, threshold at 0.8 = 20
        assert!(!credit.is_quota_exhausted(0.8));
        credit.add_used_credit(80, 0, &mut uc);
        assert!(credit.is_quota_exhausted(0.8));
    }

    #[test]
    fn test_floor_above_allowed_fails_exhausted() {
        let mut credit = SessionCredit::new();
        // Corrupt floor directly through the merge helper
        credit.add_credit(500, Bucket::AllowedFloorTotal);
        credit.set_grant_tracking_type(GrantTrackingType::TotalOnly);
        assert!(credit.is_quota_exhausted(1.0));
    }

    #[test]
    fn test_infinite_credit_never_exhausts() {
        let mut credit = SessionCredit::new_with_limit(CreditLimitType::InfiniteMetered);
        receive(&mut credit, total_grant(10));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(1_000_000, 0, &mut uc);
        assert!(!credit.is_quota_exhausted(1.0));
    }

    #[test]
    fn test_reporting_capped_for_continue_but_not_termination() {
        // Spec scenario: grant 1000 TOTAL_ONLY, use 1100
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(1100, 0, &mut uc);

        let mut capped = credit.clone();
        let usage = capped.get_usage_for_reporting(&mut uc);
        assert_eq!(usage, Usage { bytes_tx: 1000, bytes_rx: 0 });

        let mut uncapped = credit.clone();
        let usage = uncapped.get_all_unreported_usage_for_reporting(&mut uc);
        assert_eq!(usage, Usage { bytes_tx: 1100, bytes_rx: 0 });
    }

    #[test]
    fn test_total_only_cap_rx_absorbs_remainder() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(800, 700, &mut uc);

        let usage = credit.get_usage_for_reporting(&mut uc);
        assert_eq!(usage.bytes_tx, 800);
        assert_eq!(usage.bytes_rx, 200);
    }

    #[test]
    fn test_rx_only_cap_uses_rx_buckets() {
        let mut credit = SessionCredit::new();
        receive(
            &mut credit,
            GrantedUnits { rx: CreditUnit::valid(400), ..Default::default() },
        );
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(100, 600, &mut uc);

        let usage = credit.get_usage_for_reporting(&mut uc);
        assert_eq!(usage.bytes_rx, 400);
        assert_eq!(usage.bytes_tx, 0);
    }

    #[test]
    fn test_unreported_usage_tracks_settled_volumes() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(2000));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(500, 0, &mut uc);
        let first = credit.get_usage_for_reporting(&mut uc);
        assert_eq!(first.bytes_tx, 500);

        // More usage while a report is in flight: only the new bytes are
        // unreported
        credit.add_used_credit(300, 0, &mut uc);
        let second = credit.get_all_unreported_usage_for_reporting(&mut uc);
        assert_eq!(second.bytes_tx, 300);
    }

    #[test]
    fn test_mark_failure_transient_retries_usage() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(400, 0, &mut uc);
        credit.get_usage_for_reporting(&mut uc);
        assert!(credit.is_reporting());

        credit.mark_failure(4012, &mut uc);
        assert!(!credit.is_reporting());
        assert_eq!(credit.get_credit(Bucket::ReportedTx), 0);
        // Usage is unreported again and will be retried
        let retry = credit.get_all_unreported_usage_for_reporting(&mut uc);
        assert_eq!(retry.bytes_tx, 400);
    }

    #[test]
    fn test_mark_failure_permanent_settles_usage() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(400, 0, &mut uc);
        credit.get_usage_for_reporting(&mut uc);

        credit.mark_failure(5031, &mut uc);
        assert!(!credit.is_reporting());
        assert_eq!(credit.get_credit(Bucket::ReportedTx), 400);
        let retry = credit.get_all_unreported_usage_for_reporting(&mut uc);
        assert_eq!(retry.bytes_tx, 0);
    }

    #[test]
    fn test_marshal_roundtrip() {
        let mut credit = SessionCredit::new();
        receive(&mut credit, total_grant(1000));
        let mut uc = SessionCreditUpdateCriteria::default();
        credit.add_used_credit(123, 456, &mut uc);
        credit.get_usage_for_reporting(&mut uc);

        let restored = SessionCredit::unmarshal(&credit.marshal());
        assert_eq!(credit, restored);
        for bucket in Bucket::ALL {
            assert_eq!(credit.get_credit(bucket), restored.get_credit(bucket));
        }
        assert_eq!(credit.get_grant_tracking_type(), restored.get_grant_tracking_type());
    }
}
