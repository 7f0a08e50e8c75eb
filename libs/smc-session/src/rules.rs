//! Policy rule stores
//!
//! `PolicyRuleBiMap` is a rule-id keyed catalog with secondary indexes by
//! charging key and monitoring key. The process-wide static catalog is
//! shared read-mostly behind `StaticRuleStore`; per-session dynamic stores
//! own their rules by value. Sessions never hold references into the
//! catalog, only ids and copies.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use smc_proto::{CreditKey, PolicyRule};

/// Rule-id to rule-definition map with charging/monitoring key indexes.
#[derive(Debug, Clone, Default)]
pub struct PolicyRuleBiMap {
    rules_by_id: HashMap<String, PolicyRule>,
    ids_by_charging_key: HashMap<CreditKey, Vec<String>>,
    ids_by_monitoring_key: HashMap<String, Vec<String>>,
}

impl PolicyRuleBiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rule(&mut self, rule: PolicyRule) {
        // Re-inserting an id replaces the old definition
        if self.rules_by_id.contains_key(&rule.id) {
            self.remove_rule(&rule.id);
        }
        if let Some(key) = rule.charging_key() {
            self.ids_by_charging_key.entry(key).or_default().push(rule.id.clone());
        }
        if let Some(mkey) = rule.monitoring_key() {
            self.ids_by_monitoring_key
                .entry(mkey.to_string())
                .or_default()
                .push(rule.id.clone());
        }
        self.rules_by_id.insert(rule.id.clone(), rule);
    }

    pub fn remove_rule(&mut self, rule_id: &str) -> Option<PolicyRule> {
        let rule = self.rules_by_id.remove(rule_id)?;
        if let Some(key) = rule.charging_key() {
            if let Some(ids) = self.ids_by_charging_key.get_mut(&key) {
                ids.retain(|id| id != rule_id);
            }
        }
        if let Some(mkey) = rule.monitoring_key() {
            if let Some(ids) = self.ids_by_monitoring_key.get_mut(mkey) {
                ids.retain(|id| id != rule_id);
            }
        }
        Some(rule)
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<&PolicyRule> {
        self.rules_by_id.get(rule_id)
    }

    pub fn has_rule(&self, rule_id: &str) -> bool {
        self.rules_by_id.contains_key(rule_id)
    }

    pub fn is_empty(&self) -> bool {
        self.rules_by_id.is_empty()
    }

    pub fn get_rule_ids(&self) -> Vec<String> {
        self.rules_by_id.keys().cloned().collect()
    }

    pub fn get_rules(&self) -> Vec<PolicyRule> {
        self.rules_by_id.values().cloned().collect()
    }

    pub fn get_charging_key_for_rule_id(&self, rule_id: &str) -> Option<CreditKey> {
        self.rules_by_id.get(rule_id).and_then(|rule| rule.charging_key())
    }

    pub fn get_monitoring_key_for_rule_id(&self, rule_id: &str) -> Option<String> {
        self.rules_by_id
            .get(rule_id)
            .and_then(|rule| rule.monitoring_key().map(str::to_string))
    }

    pub fn get_rule_ids_for_charging_key(&self, key: &CreditKey) -> Vec<String> {
        self.ids_by_charging_key.get(key).cloned().unwrap_or_default()
    }

    pub fn get_rule_definitions_for_charging_key(&self, key: &CreditKey) -> Vec<PolicyRule> {
        self.get_rule_ids_for_charging_key(key)
            .iter()
            .filter_map(|id| self.rules_by_id.get(id).cloned())
            .collect()
    }

    pub fn get_rule_ids_for_monitoring_key(&self, monitoring_key: &str) -> Vec<String> {
        self.ids_by_monitoring_key.get(monitoring_key).cloned().unwrap_or_default()
    }

    /// Number of rules carrying a monitoring key.
    pub fn monitored_rules_count(&self) -> usize {
        self.rules_by_id.values().filter(|rule| rule.monitoring_key().is_some()).count()
    }
}

/// Per-session store of dynamic rules, owned by value.
pub type DynamicRuleStore = PolicyRuleBiMap;

/// Process-wide shared catalog of static rules, read-mostly.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleStore {
    inner: Arc<RwLock<PolicyRuleBiMap>>,
}

impl StaticRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rule(&self, rule: PolicyRule) {
        if let Ok(mut map) = self.inner.write() {
            map.insert_rule(rule);
        }
    }

    pub fn remove_rule(&self, rule_id: &str) -> Option<PolicyRule> {
        self.inner.write().ok()?.remove_rule(rule_id)
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<PolicyRule> {
        self.inner.read().ok()?.get_rule(rule_id).cloned()
    }

    pub fn has_rule(&self, rule_id: &str) -> bool {
        self.inner.read().map(|map| map.has_rule(rule_id)).unwrap_or(false)
    }

    pub fn get_charging_key_for_rule_id(&self, rule_id: &str) -> Option<CreditKey> {
        self.inner.read().ok()?.get_charging_key_for_rule_id(rule_id)
    }

    pub fn get_monitoring_key_for_rule_id(&self, rule_id: &str) -> Option<String> {
        self.inner.read().ok()?.get_monitoring_key_for_rule_id(rule_id)
    }

    pub fn get_rule_ids_for_charging_key(&self, key: &CreditKey) -> Vec<String> {
        self.inner
            .read()
            .map(|map| map.get_rule_ids_for_charging_key(key))
            .unwrap_or_default()
    }

    pub fn get_rule_ids_for_monitoring_key(&self, monitoring_key: &str) -> Vec<String> {
        self.inner
            .read()
            .map(|map| map.get_rule_ids_for_monitoring_key(monitoring_key))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smc_proto::PolicyTrackingType;

    fn rule(id: &str, rating_group: u32, monitoring_key: Option<&str>) -> PolicyRule {
        let tracking_type = match (rating_group, monitoring_key) {
            (0, None) => PolicyTrackingType::NoTracking,
            (0, Some(_)) => PolicyTrackingType::OnlyPcrf,
            (_, None) => PolicyTrackingType::OnlyOcs,
            (_, Some(_)) => PolicyTrackingType::OcsAndPcrf,
        };
        PolicyRule {
            id: id.to_string(),
            rating_group,
            monitoring_key: monitoring_key.map(str::to_string),
            tracking_type,
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut map = PolicyRuleBiMap::new();
        map.insert_rule(rule("rule1", 1, Some("m1")));
        map.insert_rule(rule("rule2", 1, None));
        map.insert_rule(rule("rule3", 0, Some("m1")));

        assert_eq!(
            map.get_charging_key_for_rule_id("rule1"),
            Some(CreditKey::from_rating_group(1))
        );
        assert_eq!(map.get_charging_key_for_rule_id("rule3"), None);
        assert_eq!(map.get_monitoring_key_for_rule_id("rule3"), Some("m1".to_string()));

        let mut for_key = map.get_rule_ids_for_charging_key(&CreditKey::from_rating_group(1));
        for_key.sort();
        assert_eq!(for_key, vec!["rule1".to_string(), "rule2".to_string()]);

        let mut for_mkey = map.get_rule_ids_for_monitoring_key("m1");
        for_mkey.sort();
        assert_eq!(for_mkey, vec!["rule1".to_string(), "rule3".to_string()]);

        assert_eq!(map.monitored_rules_count(), 2);
    }

    #[test]
    fn test_remove_rule_cleans_indexes() {
        let mut map = PolicyRuleBiMap::new();
        map.insert_rule(rule("rule1", 1, Some("m1")));
        let removed = map.remove_rule("rule1").unwrap();
        assert_eq!(removed.id, "rule1");
        assert!(map.get_rule_ids_for_charging_key(&CreditKey::from_rating_group(1)).is_empty());
        assert!(map.get_rule_ids_for_monitoring_key("m1").is_empty());
        assert!(map.remove_rule("rule1").is_none());
    }

    #[test]
    fn test_static_store_shares_catalog() {
        let store = StaticRuleStore::new();
        let view = store.clone();
        store.insert_rule(rule("rule1", 5, None));
        assert!(view.has_rule("rule1"));
        assert_eq!(
            view.get_charging_key_for_rule_id("rule1"),
            Some(CreditKey::from_rating_group(5))
        );
    }
}
