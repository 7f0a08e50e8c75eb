//! Redis store client
//!
//! Persists each subscriber's session vector as one JSON value keyed by
//! subscriber id. Writes use optimistic concurrency: WATCH the keys to be
//! written, queue the writes in a MULTI/EXEC transaction, and surface a
//! nil EXEC (some watched key changed) as `WriteConflict` so the caller
//! restarts its read-modify-write cycle from a fresh read. Reads are
//! plain per-key GETs; no isolation beyond per-key atomicity is needed.

use std::collections::HashSet;

use log::{debug, warn};
use redis::Commands;

use smc_proto::StoredSessionState;

use crate::client::{StoreClient, StoredSessionMap};
use crate::error::{StoreError, StoreResult};

const DEFAULT_KEY_PREFIX: &str = "sessions:";

pub struct RedisStoreClient {
    client: redis::Client,
    key_prefix: String,
}

impl RedisStoreClient {
    pub fn new(redis_uri: &str) -> StoreResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_uri)?,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    pub fn with_key_prefix(redis_uri: &str, key_prefix: &str) -> StoreResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_uri)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, subscriber_id: &str) -> String {
        format!("{}{}", self.key_prefix, subscriber_id)
    }

    fn subscriber_id<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.key_prefix).unwrap_or(key)
    }

    fn decode(value: &str) -> StoreResult<Vec<StoredSessionState>> {
        Ok(serde_json::from_str(value)?)
    }
}

impl StoreClient for RedisStoreClient {
    fn read_sessions(&self, subscriber_ids: &HashSet<String>) -> StoreResult<StoredSessionMap> {
        let mut connection = self.client.get_connection()?;
        let mut result = StoredSessionMap::new();
        for id in subscriber_ids {
            let value: Option<String> = connection.get(self.key(id))?;
            let sessions = match value {
                Some(serialized) => Self::decode(&serialized)?,
                None => Vec::new(),
            };
            result.insert(id.clone(), sessions);
        }
        Ok(result)
    }

    fn read_all_sessions(&self) -> StoreResult<StoredSessionMap> {
        let mut connection = self.client.get_connection()?;
        let keys: Vec<String> = connection.keys(format!("{}*", self.key_prefix))?;
        let mut result = StoredSessionMap::new();
        for key in keys {
            let value: Option<String> = connection.get(&key)?;
            if let Some(serialized) = value {
                result.insert(
                    self.subscriber_id(&key).to_string(),
                    Self::decode(&serialized)?,
                );
            }
        }
        Ok(result)
    }

    fn write_sessions(&self, session_map: StoredSessionMap) -> StoreResult<()> {
        if session_map.is_empty() {
            return Ok(());
        }
        let mut connection = self.client.get_connection()?;

        // Serialize before watching so a serde failure cannot leave a
        // dangling WATCH
        let mut writes: Vec<(String, Option<String>)> = Vec::with_capacity(session_map.len());
        for (subscriber_id, sessions) in &session_map {
            let value = if sessions.is_empty() {
                None
            } else {
                Some(serde_json::to_string(sessions)?)
            };
            writes.push((self.key(subscriber_id), value));
        }

        let keys: Vec<&String> = writes.iter().map(|(key, _)| key).collect();
        redis::cmd("WATCH").arg(&keys).query::<()>(&mut connection)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &writes {
            match value {
                Some(serialized) => {
                    pipe.set(key, serialized).ignore();
                }
                None => {
                    debug!("[Removed] subscriber key {}", key);
                    pipe.del(key).ignore();
                }
            }
        }

        // A nil EXEC means a watched key changed under us
        let result: Option<()> = pipe.query(&mut connection)?;
        match result {
            Some(()) => Ok(()),
            None => {
                warn!("Session write rejected by watch; caller must re-read");
                Err(StoreError::WriteConflict)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefixing() {
        let client = RedisStoreClient::with_key_prefix("redis://127.0.0.1/", "smc:").unwrap();
        assert_eq!(client.key("IMSI1"), "smc:IMSI1");
        assert_eq!(client.subscriber_id("smc:IMSI1"), "IMSI1");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(RedisStoreClient::decode("not json").is_err());
        assert_eq!(RedisStoreClient::decode("[]").unwrap(), Vec::new());
    }
}
