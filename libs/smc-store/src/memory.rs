//! In-memory store client
//!
//! Mutex-guarded map for tests and single-process deployments. Enforces
//! the single-writer-per-subscriber-set discipline: exclusive access to a
//! subscriber set is granted by `operate_on_sessions`, and a second grant
//! that overlaps an outstanding one fails loudly instead of blocking -
//! overlapping cycles are a program bug, not a retryable condition.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use log::{debug, error};

use crate::client::{StoreClient, StoredSessionMap};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryStoreClient {
    sessions: Mutex<StoredSessionMap>,
    op_in_progress: Mutex<HashSet<String>>,
}

impl MemoryStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant exclusive access to a subscriber set and read its sessions.
    /// Fails with `OperationInProgress` if any requested subscriber is
    /// already held by an outstanding grant.
    pub fn operate_on_sessions(
        &self,
        subscriber_ids: &HashSet<String>,
    ) -> StoreResult<StoredSessionMap> {
        {
            let mut in_progress =
                self.op_in_progress.lock().map_err(|_| StoreError::LockPoisoned)?;
            let mut conflicting: Vec<String> =
                in_progress.intersection(subscriber_ids).cloned().collect();
            if !conflicting.is_empty() {
                conflicting.sort();
                error!(
                    "Rejecting operate-on-sessions: {:?} already held by another operation",
                    conflicting
                );
                return Err(StoreError::OperationInProgress(conflicting));
            }
            in_progress.extend(subscriber_ids.iter().cloned());
        }
        self.read_sessions(subscriber_ids)
    }

    /// End an exclusive grant without writing.
    pub fn release_sessions(&self, subscriber_ids: &HashSet<String>) {
        if let Ok(mut in_progress) = self.op_in_progress.lock() {
            for id in subscriber_ids {
                in_progress.remove(id);
            }
        }
    }
}

impl StoreClient for MemoryStoreClient {
    fn read_sessions(&self, subscriber_ids: &HashSet<String>) -> StoreResult<StoredSessionMap> {
        let sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut result = StoredSessionMap::new();
        for id in subscriber_ids {
            result.insert(id.clone(), sessions.get(id).cloned().unwrap_or_default());
        }
        Ok(result)
    }

    fn read_all_sessions(&self) -> StoreResult<StoredSessionMap> {
        let sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(sessions.clone())
    }

    fn write_sessions(&self, session_map: StoredSessionMap) -> StoreResult<()> {
        let mut sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;
        let written: HashSet<String> = session_map.keys().cloned().collect();
        for (subscriber_id, vector) in session_map {
            if vector.is_empty() {
                debug!("[Removed] subscriber key {}", subscriber_id);
                sessions.remove(&subscriber_id);
            } else {
                sessions.insert(subscriber_id, vector);
            }
        }
        drop(sessions);
        // Writing ends the read-modify-write cycle for these subscribers
        self.release_sessions(&written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smc_proto::StoredSessionState;

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn session(imsi: &str, session_id: &str) -> StoredSessionState {
        StoredSessionState {
            imsi: imsi.to_string(),
            session_id: session_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_read_unknown_subscriber_yields_empty_vector() {
        let client = MemoryStoreClient::new();
        let result = client.read_sessions(&ids(&["IMSI1"])).unwrap();
        assert_eq!(result["IMSI1"], Vec::new());
    }

    #[test]
    fn test_write_then_read() {
        let client = MemoryStoreClient::new();
        let mut map = StoredSessionMap::new();
        map.insert("IMSI1".to_string(), vec![session("IMSI1", "IMSI1-1")]);
        client.write_sessions(map).unwrap();

        let result = client.read_sessions(&ids(&["IMSI1"])).unwrap();
        assert_eq!(result["IMSI1"].len(), 1);
        assert_eq!(result["IMSI1"][0].session_id, "IMSI1-1");
    }

    #[test]
    fn test_empty_vector_removes_subscriber_key() {
        let client = MemoryStoreClient::new();
        let mut map = StoredSessionMap::new();
        map.insert("IMSI1".to_string(), vec![session("IMSI1", "IMSI1-1")]);
        client.write_sessions(map).unwrap();

        let mut erase = StoredSessionMap::new();
        erase.insert("IMSI1".to_string(), Vec::new());
        client.write_sessions(erase).unwrap();

        let all = client.read_all_sessions().unwrap();
        assert!(!all.contains_key("IMSI1"));
    }

    #[test]
    fn test_overlapping_grant_fails_loudly() {
        let client = MemoryStoreClient::new();
        client.operate_on_sessions(&ids(&["IMSI1", "IMSI2"])).unwrap();

        // Overlap on IMSI2 is rejected, not blocked
        let err = client.operate_on_sessions(&ids(&["IMSI2", "IMSI3"])).unwrap_err();
        match err {
            StoreError::OperationInProgress(held) => {
                assert_eq!(held, vec!["IMSI2".to_string()])
            }
            other => panic!("unexpected error {other}"),
        }

        // Disjoint sets are fine
        client.operate_on_sessions(&ids(&["IMSI4"])).unwrap();
    }

    #[test]
    fn test_write_releases_grant() {
        let client = MemoryStoreClient::new();
        client.operate_on_sessions(&ids(&["IMSI1"])).unwrap();

        let mut map = StoredSessionMap::new();
        map.insert("IMSI1".to_string(), vec![session("IMSI1", "IMSI1-1")]);
        client.write_sessions(map).unwrap();

        // The cycle ended with the write; a new grant succeeds
        client.operate_on_sessions(&ids(&["IMSI1"])).unwrap();
    }

    #[test]
    fn test_release_without_write() {
        let client = MemoryStoreClient::new();
        client.operate_on_sessions(&ids(&["IMSI1"])).unwrap();
        client.release_sessions(&ids(&["IMSI1"]));
        client.operate_on_sessions(&ids(&["IMSI1"])).unwrap();
    }
}
