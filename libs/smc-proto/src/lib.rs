//! smcore Session/Charging Protocol Types
//!
//! This crate provides the value types shared by the session core and the
//! storage layer:
//! - Credit keys, bucket counters and grant tracking types
//! - Diameter result-code classification for credit-control answers
//! - Inbound/outbound message structs (credit updates, usage monitors,
//!   rule installs, termination requests)
//! - Persisted (`Stored*`) records with their JSON encoding
//!
//! Wire-level encoding (Diameter AVPs, NAS IEs) is out of scope; these are
//! the already-decoded forms the core consumes and produces.

pub mod diameter;
pub mod messages;
pub mod stored;
pub mod types;

pub use diameter::*;
pub use messages::*;
pub use stored::*;
pub use types::*;
