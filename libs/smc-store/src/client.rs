//! Store client contract
//!
//! Raw keyed persistence of serialized session vectors. Backends only see
//! `StoredSessionState` records; live `SessionState` objects never cross
//! this boundary.

use std::collections::{HashMap, HashSet};

use smc_proto::StoredSessionState;

use crate::error::StoreResult;

/// Serialized sessions keyed by subscriber id.
pub type StoredSessionMap = HashMap<String, Vec<StoredSessionState>>;

/// Raw key-value persistence contract both backends satisfy.
///
/// Writes are all-or-nothing per call. Writing an empty vector for a
/// subscriber removes that subscriber's key entirely.
pub trait StoreClient: Send + Sync {
    /// Read the session vectors for a set of subscribers. Every requested
    /// id gets an entry; unknown subscribers map to an empty vector.
    fn read_sessions(&self, subscriber_ids: &HashSet<String>) -> StoreResult<StoredSessionMap>;

    /// Read every stored session vector.
    fn read_all_sessions(&self) -> StoreResult<StoredSessionMap>;

    /// Persist the given session vectors atomically.
    fn write_sessions(&self, session_map: StoredSessionMap) -> StoreResult<()>;
}
