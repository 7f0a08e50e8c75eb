//! Session storage facade
//!
//! `SessionStore` mediates every read and write of persisted session
//! state. Callers read a `SessionMap`, mutate the in-memory sessions
//! (producing update criteria), and commit the criteria back; the store
//! replays each diff onto a freshly read copy and persists the result.
//! Applying a diff with `is_session_ended` erases the session from the
//! vector immediately, down to removing the subscriber key when the
//! vector becomes empty.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use log::error;

use smc_session::{SessionState, SessionStateUpdateCriteria, StaticRuleStore};

use crate::client::{StoreClient, StoredSessionMap};
use crate::error::StoreResult;
use crate::memory::MemoryStoreClient;
use crate::redis_client::RedisStoreClient;

/// Live sessions keyed by subscriber id.
pub type SessionMap = HashMap<String, Vec<SessionState>>;

/// Subscriber ids to read.
pub type SessionRead = HashSet<String>;

/// Diffs to apply, keyed subscriber id -> session id.
pub type SessionUpdate = HashMap<String, HashMap<String, SessionStateUpdateCriteria>>;

/// Lookup criteria for `find_session`. At most one session matches.
#[derive(Debug, Clone)]
pub enum SessionSearchCriteria {
    SessionId { imsi: String, session_id: String },
    Apn { imsi: String, apn: String },
    UeIpv4 { imsi: String, ipv4: Ipv4Addr },
    /// IPv4-or-IPv6 lookup; for carrier-wifi subscribers any session of
    /// the IMSI matches, since WLAN sessions are not keyed by IP
    UeIpv4OrIpv6 { imsi: String, addr: IpAddr },
    BearerId { imsi: String, bearer_id: u32 },
    Teid { imsi: String, teid: u32 },
}

impl SessionSearchCriteria {
    pub fn imsi(&self) -> &str {
        match self {
            SessionSearchCriteria::SessionId { imsi, .. }
            | SessionSearchCriteria::Apn { imsi, .. }
            | SessionSearchCriteria::UeIpv4 { imsi, .. }
            | SessionSearchCriteria::UeIpv4OrIpv6 { imsi, .. }
            | SessionSearchCriteria::BearerId { imsi, .. }
            | SessionSearchCriteria::Teid { imsi, .. } => imsi,
        }
    }
}

/// The storage facade. Owns a store client and the shared static rule
/// catalog needed to rebuild sessions from stored records.
pub struct SessionStore {
    client: Arc<dyn StoreClient>,
    static_rules: StaticRuleStore,
}

impl SessionStore {
    /// The client is shared so callers can keep their own handle, e.g. to
    /// the memory client's exclusive-grant calls.
    pub fn new(client: Arc<dyn StoreClient>, static_rules: StaticRuleStore) -> Self {
        Self { client, static_rules }
    }

    pub fn new_in_memory(static_rules: StaticRuleStore) -> Self {
        Self::new(Arc::new(MemoryStoreClient::new()), static_rules)
    }

    pub fn new_redis(redis_uri: &str, static_rules: StaticRuleStore) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(RedisStoreClient::new(redis_uri)?), static_rules))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn read_sessions(&self, subscriber_ids: &SessionRead) -> StoreResult<SessionMap> {
        let stored = self.client.read_sessions(subscriber_ids)?;
        Ok(self.unmarshal_map(stored))
    }

    pub fn read_all_sessions(&self) -> StoreResult<SessionMap> {
        let stored = self.client.read_all_sessions()?;
        Ok(self.unmarshal_map(stored))
    }

    fn unmarshal_map(&self, stored: StoredSessionMap) -> SessionMap {
        let mut session_map = SessionMap::new();
        for (subscriber_id, sessions) in stored {
            session_map.insert(
                subscriber_id,
                sessions
                    .iter()
                    .map(|record| SessionState::unmarshal(record, self.static_rules.clone()))
                    .collect(),
            );
        }
        session_map
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Persist newly established sessions for one subscriber, appended to
    /// whatever is already stored.
    pub fn create_sessions(
        &self,
        subscriber_id: &str,
        sessions: Vec<SessionState>,
    ) -> StoreResult<()> {
        let read_set: SessionRead = [subscriber_id.to_string()].into_iter().collect();
        let mut stored = self.client.read_sessions(&read_set)?;
        let vector = stored.entry(subscriber_id.to_string()).or_default();
        for session in sessions {
            vector.push(session.marshal());
        }
        self.client.write_sessions(stored)
    }

    /// Apply a batch of diffs. All-or-nothing per call: if any delta in
    /// the batch cannot be applied, nothing is persisted and the caller
    /// must re-read and recompute. Returns success.
    pub fn update_sessions(&self, update_criteria: &SessionUpdate) -> bool {
        let subscriber_ids: SessionRead = update_criteria.keys().cloned().collect();
        if subscriber_ids.is_empty() {
            return true;
        }
        let mut stored = match self.client.read_sessions(&subscriber_ids) {
            Ok(stored) => stored,
            Err(err) => {
                error!("Failed to read sessions for update: {}", err);
                return false;
            }
        };

        for (subscriber_id, session_ucs) in update_criteria {
            let Some(vector) = stored.get_mut(subscriber_id) else {
                error!("Subscriber {} disappeared during update", subscriber_id);
                return false;
            };
            for (session_id, uc) in session_ucs {
                let Some(position) =
                    vector.iter().position(|record| record.session_id == *session_id)
                else {
                    error!(
                        "Session {} not found for {} while applying update",
                        session_id, subscriber_id
                    );
                    return false;
                };
                if uc.is_session_ended {
                    // Erased immediately; the shorter vector persists below
                    vector.remove(position);
                    continue;
                }
                let mut session =
                    SessionState::unmarshal(&vector[position], self.static_rules.clone());
                session.merge_updates(uc);
                vector[position] = session.marshal();
            }
        }

        match self.client.write_sessions(stored) {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to write session updates: {}", err);
                false
            }
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Build an empty update skeleton for every session in the map.
    pub fn get_default_session_update(session_map: &SessionMap) -> SessionUpdate {
        let mut update = SessionUpdate::new();
        for (subscriber_id, sessions) in session_map {
            let entry: HashMap<String, SessionStateUpdateCriteria> = sessions
                .iter()
                .map(|session| {
                    (session.get_session_id().to_string(), SessionStateUpdateCriteria::default())
                })
                .collect();
            update.insert(subscriber_id.clone(), entry);
        }
        update
    }

    /// Find at most one session matching the criteria.
    pub fn find_session<'a>(
        session_map: &'a mut SessionMap,
        criteria: &SessionSearchCriteria,
    ) -> Option<&'a mut SessionState> {
        let sessions = session_map.get_mut(criteria.imsi())?;
        match criteria {
            SessionSearchCriteria::SessionId { session_id, .. } => {
                sessions.iter_mut().find(|session| session.get_session_id() == session_id)
            }
            SessionSearchCriteria::Apn { apn, .. } => {
                sessions.iter_mut().find(|session| session.get_config().apn == *apn)
            }
            SessionSearchCriteria::UeIpv4 { ipv4, .. } => sessions
                .iter_mut()
                .find(|session| session.get_config().ue_ipv4 == Some(*ipv4)),
            SessionSearchCriteria::UeIpv4OrIpv6 { addr, .. } => {
                sessions.iter_mut().find(|session| {
                    let config = session.get_config();
                    let ip_match = match addr {
                        IpAddr::V4(v4) => config.ue_ipv4 == Some(*v4),
                        IpAddr::V6(v6) => ipv6_prefix_match(config.ue_ipv6, *v6),
                    };
                    // WLAN sessions are keyed by MAC, not IP
                    ip_match || session.is_radius_cwf_session()
                })
            }
            SessionSearchCriteria::BearerId { bearer_id, .. } => {
                sessions.iter_mut().find(|session| session.has_bearer_id(*bearer_id))
            }
            SessionSearchCriteria::Teid { teid, .. } => sessions
                .iter_mut()
                .find(|session| session.get_config().tunnel_id == *teid),
        }
    }
}

/// Sessions are assigned a /64; match on the prefix.
fn ipv6_prefix_match(assigned: Option<Ipv6Addr>, candidate: Ipv6Addr) -> bool {
    match assigned {
        Some(assigned) => assigned.octets()[..8] == candidate.octets()[..8],
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smc_proto::{
        Bucket, ChargingCredit, CreditKey, CreditUnit, CreditUpdateResponse, GrantedUnits,
        PolicyRule, PolicyTrackingType, RatType, SessionConfig,
    };
    use smc_session::SessionCreditConfig;
    use smc_proto::UpdateSessionRequest;

    fn static_rules() -> StaticRuleStore {
        let store = StaticRuleStore::new();
        store.insert_rule(PolicyRule {
            id: "rule1".to_string(),
            rating_group: 1,
            tracking_type: PolicyTrackingType::OnlyOcs,
            ..Default::default()
        });
        store
    }

    fn store() -> SessionStore {
        SessionStore::new_in_memory(static_rules())
    }

    fn session(imsi: &str, session_id: &str, config: SessionConfig) -> SessionState {
        SessionState::new(imsi, session_id, config, static_rules(), 100)
    }

    fn read_one(store: &SessionStore, imsi: &str) -> SessionMap {
        let read_set: SessionRead = [imsi.to_string()].into_iter().collect();
        store.read_sessions(&read_set).unwrap()
    }

    fn credit_response(rating_group: u32, volume: u64) -> CreditUpdateResponse {
        CreditUpdateResponse {
            success: true,
            result_code: 2001,
            charging_key: rating_group,
            credit: ChargingCredit {
                granted_units: GrantedUnits {
                    total: CreditUnit::valid(volume),
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_create_then_read_roundtrip() {
        let store = store();
        store
            .create_sessions(
                "IMSI1",
                vec![session("IMSI1", "IMSI1-1", SessionConfig::default())],
            )
            .unwrap();

        let map = read_one(&store, "IMSI1");
        assert_eq!(map["IMSI1"].len(), 1);
        assert_eq!(map["IMSI1"][0].get_session_id(), "IMSI1-1");
    }

    #[test]
    fn test_update_cycle_persists_deltas() {
        let store = store();
        store
            .create_sessions(
                "IMSI1",
                vec![session("IMSI1", "IMSI1-1", SessionConfig::default())],
            )
            .unwrap();

        // read -> mutate -> commit the diff
        let mut map = read_one(&store, "IMSI1");
        let mut update = SessionStore::get_default_session_update(&map);
        let session = &mut map.get_mut("IMSI1").unwrap()[0];
        let uc = update.get_mut("IMSI1").unwrap().get_mut("IMSI1-1").unwrap();
        session.receive_charging_credit(&credit_response(1, 1000), 0, uc);
        session.add_rule_usage("rule1", 250, 0, 0, 0, uc);
        assert!(store.update_sessions(&update));

        let reread = read_one(&store, "IMSI1");
        let key = CreditKey::from_rating_group(1);
        assert_eq!(reread["IMSI1"][0].get_charging_credit(&key, Bucket::UsedTx), 250);
        assert_eq!(
            reread["IMSI1"][0].get_charging_credit(&key, Bucket::AllowedTotal),
            1000
        );
    }

    #[test]
    fn test_request_number_persists_with_the_same_write() {
        let store = store();
        store
            .create_sessions(
                "IMSI1",
                vec![session("IMSI1", "IMSI1-1", SessionConfig::default())],
            )
            .unwrap();

        let mut map = read_one(&store, "IMSI1");
        let mut update = SessionStore::get_default_session_update(&map);
        let session = &mut map.get_mut("IMSI1").unwrap()[0];
        let uc = update.get_mut("IMSI1").unwrap().get_mut("IMSI1-1").unwrap();
        session.receive_charging_credit(&credit_response(1, 1000), 0, uc);
        session.add_rule_usage("rule1", 900, 0, 0, 0, uc);
        let mut request = UpdateSessionRequest::default();
        session.get_updates(
            &SessionCreditConfig::default(),
            10,
            &mut request,
            &mut Vec::new(),
            uc,
        );
        assert_eq!(request.updates.len(), 1);
        let sent_request_number = request.updates[0].request_number;
        assert!(store.update_sessions(&update));

        let reread = read_one(&store, "IMSI1");
        assert_eq!(reread["IMSI1"][0].get_request_number(), sent_request_number + 1);
    }

    #[test]
    fn test_session_ended_erases_session_and_key() {
        let store = store();
        store
            .create_sessions(
                "IMSI1",
                vec![
                    session("IMSI1", "IMSI1-1", SessionConfig::default()),
                    session("IMSI1", "IMSI1-2", SessionConfig::default()),
                ],
            )
            .unwrap();

        // End the first session
        let mut update = SessionUpdate::new();
        let mut per_session = HashMap::new();
        let uc = SessionStateUpdateCriteria { is_session_ended: true, ..Default::default() };
        per_session.insert("IMSI1-1".to_string(), uc);
        update.insert("IMSI1".to_string(), per_session);
        assert!(store.update_sessions(&update));

        let map = read_one(&store, "IMSI1");
        assert_eq!(map["IMSI1"].len(), 1);
        assert_eq!(map["IMSI1"][0].get_session_id(), "IMSI1-2");

        // End the last session; the subscriber key disappears entirely
        let mut update = SessionUpdate::new();
        let mut per_session = HashMap::new();
        let uc = SessionStateUpdateCriteria { is_session_ended: true, ..Default::default() };
        per_session.insert("IMSI1-2".to_string(), uc);
        update.insert("IMSI1".to_string(), per_session);
        assert!(store.update_sessions(&update));

        let all = store.read_all_sessions().unwrap();
        assert!(!all.contains_key("IMSI1"));
    }

    #[test]
    fn test_update_unknown_session_fails_whole_batch() {
        let store = store();
        store
            .create_sessions(
                "IMSI1",
                vec![session("IMSI1", "IMSI1-1", SessionConfig::default())],
            )
            .unwrap();

        let mut update = SessionUpdate::new();
        let mut per_session = HashMap::new();
        per_session.insert(
            "IMSI1-1".to_string(),
            SessionStateUpdateCriteria {
                request_number_increment: 5,
                ..Default::default()
            },
        );
        per_session.insert(
            "IMSI1-unknown".to_string(),
            SessionStateUpdateCriteria::default(),
        );
        update.insert("IMSI1".to_string(), per_session);
        assert!(!store.update_sessions(&update));

        // Nothing from the failed batch was persisted
        let map = read_one(&store, "IMSI1");
        assert_eq!(map["IMSI1"][0].get_request_number(), 1);
    }

    #[test]
    fn test_find_session_by_criteria() {
        let lte_config = SessionConfig {
            apn: "internet".to_string(),
            ue_ipv4: Some(Ipv4Addr::new(192, 168, 1, 2)),
            bearer_id: 5,
            tunnel_id: 77,
            ..Default::default()
        };
        let wlan_config = SessionConfig {
            apn: "wifi".to_string(),
            rat_type: RatType::Wlan,
            hardware_addr: "aa:bb:cc:dd:ee:ff".to_string(),
            ..Default::default()
        };
        let mut map = SessionMap::new();
        map.insert(
            "IMSI1".to_string(),
            vec![
                session("IMSI1", "IMSI1-lte", lte_config),
                session("IMSI1", "IMSI1-wlan", wlan_config),
            ],
        );

        let by_id = SessionStore::find_session(
            &mut map,
            &SessionSearchCriteria::SessionId {
                imsi: "IMSI1".to_string(),
                session_id: "IMSI1-lte".to_string(),
            },
        );
        assert_eq!(by_id.unwrap().get_session_id(), "IMSI1-lte");

        let by_apn = SessionStore::find_session(
            &mut map,
            &SessionSearchCriteria::Apn {
                imsi: "IMSI1".to_string(),
                apn: "internet".to_string(),
            },
        );
        assert_eq!(by_apn.unwrap().get_session_id(), "IMSI1-lte");

        let by_ip = SessionStore::find_session(
            &mut map,
            &SessionSearchCriteria::UeIpv4 {
                imsi: "IMSI1".to_string(),
                ipv4: Ipv4Addr::new(192, 168, 1, 2),
            },
        );
        assert_eq!(by_ip.unwrap().get_session_id(), "IMSI1-lte");

        let by_bearer = SessionStore::find_session(
            &mut map,
            &SessionSearchCriteria::BearerId { imsi: "IMSI1".to_string(), bearer_id: 5 },
        );
        assert_eq!(by_bearer.unwrap().get_session_id(), "IMSI1-lte");

        let by_teid = SessionStore::find_session(
            &mut map,
            &SessionSearchCriteria::Teid { imsi: "IMSI1".to_string(), teid: 77 },
        );
        assert_eq!(by_teid.unwrap().get_session_id(), "IMSI1-lte");

        let missing = SessionStore::find_session(
            &mut map,
            &SessionSearchCriteria::Teid { imsi: "IMSI1".to_string(), teid: 999 },
        );
        assert!(missing.is_none());
    }

    #[test]
    fn test_find_session_wlan_fallback() {
        let wlan_config = SessionConfig {
            rat_type: RatType::Wlan,
            hardware_addr: "aa:bb:cc:dd:ee:ff".to_string(),
            ..Default::default()
        };
        let mut map = SessionMap::new();
        map.insert(
            "IMSI1".to_string(),
            vec![session("IMSI1", "IMSI1-wlan", wlan_config)],
        );

        // WLAN sessions track no UE IP; any session of the IMSI matches
        let found = SessionStore::find_session(
            &mut map,
            &SessionSearchCriteria::UeIpv4OrIpv6 {
                imsi: "IMSI1".to_string(),
                addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            },
        );
        assert_eq!(found.unwrap().get_session_id(), "IMSI1-wlan");
    }
}
