//! smcore Session Accounting Core
//!
//! Per-subscriber session state for a mobile-network gateway:
//! - `SessionCredit`: per-credit-key bucket ledger with quota-exhaustion
//!   and reporting-limit math
//! - `ChargingGrant`: final-unit/grant state machine wrapping one ledger
//! - `Monitor`: PCRF usage-monitoring ledger
//! - `SessionState`: the session aggregate (rules, credits, monitors, FSM,
//!   outbound request building)
//! - Update criteria: the write-ahead diff structures every mutation goes
//!   through; the diff, not the live object, is the unit of persistence
//!
//! Nothing here performs I/O. The storage layer lives in `smc-store`.

pub mod config;
pub mod credit;
pub mod criteria;
pub mod grant;
pub mod monitor;
pub mod rules;
pub mod session;


pub use config::*;
pub use credit::*;
pub use criteria::*;
pub use grant::*;
pub use monitor::*;
pub use rules::*;
pub use session::*;
