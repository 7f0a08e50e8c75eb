//! Credit accounting tunables
//!
//! Handed to the session core as an explicit immutable value by the serving
//! process; the core keeps no process-wide tunables.

use smc_proto::RequestedUnits;

/// Tunables governing quota reporting and exhaustion behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionCreditConfig {
    /// Fraction of the latest grant that must be consumed before a usage
    /// report is triggered, in (0, 1].
    pub usage_reporting_threshold: f32,
    /// Whether exhausting a final grant whose final action is TERMINATE
    /// actually cuts the session.
    pub terminate_service_when_quota_exhausted: bool,
    /// Units requested alongside every usage report.
    pub requested_units: RequestedUnits,
}

impl Default for SessionCreditConfig {
    fn default() -> Self {
        Self {
            usage_reporting_threshold: 0.8,
            terminate_service_when_quota_exhausted: true,
            requested_units: RequestedUnits { total: 100_000, tx: 0, rx: 0 },
        }
    }
}
