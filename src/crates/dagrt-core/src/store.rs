//! Result Store: keyed get/set/exists with hiding, across four namespaces
//! (node results, processed-marks, switch selections, active-recurrence
//! markers).

use crate::error::DagError;
use crate::graph::NodeId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A node's published result: a value, a transient `Recurrent` sentinel
/// (visible while its enclosing recurrence loop is owned by another task),
/// or a captured error (stored so that a dependent consuming it as a kwarg
/// can apply the input-propagation policy instead of executing).
#[derive(Debug, Clone)]
pub enum StoredValue {
    Value(serde_json::Value),
    Recurrent(serde_json::Value),
    Error(Arc<DagError>),
}

impl StoredValue {
    pub fn is_error(&self) -> bool {
        matches!(self, StoredValue::Error(_))
    }

    pub fn into_value(self) -> Result<serde_json::Value, Arc<DagError>> {
        match self {
            StoredValue::Value(v) | StoredValue::Recurrent(v) => Ok(v),
            StoredValue::Error(e) => Err(e),
        }
    }
}

/// A hash map wrapper where a key can be "hidden": physically present but
/// invisible to default-visibility reads. Used by every Result Store
/// namespace to support recurrent re-execution without losing the
/// last-known value.
struct HiddenMap<V> {
    data: HashMap<String, V>,
    hidden: HashSet<String>,
}

impl<V> Default for HiddenMap<V> {
    fn default() -> Self {
        Self { data: HashMap::new(), hidden: HashSet::new() }
    }
}

impl<V: Clone> HiddenMap<V> {
    fn set(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        self.hidden.remove(&key);
        self.data.insert(key, value);
    }

    fn get(&self, key: &str, with_hidden: bool) -> Option<V> {
        if !with_hidden && self.hidden.contains(key) {
            return None;
        }
        self.data.get(key).cloned()
    }

    fn exists(&self, key: &str, with_hidden: bool) -> bool {
        self.get(key, with_hidden).is_some()
    }

    fn hide(&mut self, key: &str) {
        self.hidden.insert(key.to_string());
    }

    fn delete(&mut self, key: &str) {
        self.data.remove(key);
        self.hidden.remove(key);
    }

    fn copy(&mut self, src: &str, dst: &str) {
        if let Some(v) = self.get(src, true) {
            self.set(dst, v);
        }
    }
}

/// A switch's resolved choice: which labelled predecessor produced the
/// value the switch node is now an alias for.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub label: serde_json::Value,
    pub node_id: NodeId,
}

/// Owns the four namespaces for one pipeline run. Mutated only by the
/// scheduler's single dispatch context; wrapped in `parking_lot::Mutex` so
/// it is `Send + Sync` across the `tokio::spawn`ed node tasks that read it,
/// not because of real contention.
#[derive(Default)]
pub struct ResultStore {
    node_results: Mutex<HiddenMap<StoredValue>>,
    processed: Mutex<HiddenMap<()>>,
    switch_results: Mutex<HiddenMap<CaseResult>>,
    active_recurrence: Mutex<HiddenMap<()>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_node_result(&self, node_id: &str, value: StoredValue) {
        self.node_results.lock().set(node_id, value);
    }

    pub fn get_node_result(&self, node_id: &str, with_hidden: bool) -> Option<StoredValue> {
        self.node_results.lock().get(node_id, with_hidden)
    }

    pub fn exists_node_result(&self, node_id: &str, with_hidden: bool) -> bool {
        self.node_results.lock().exists(node_id, with_hidden)
    }

    pub fn hide_node_result(&self, node_id: &str) {
        self.node_results.lock().hide(node_id);
    }

    pub fn copy_node_result(&self, src: &str, dst: &str) {
        self.node_results.lock().copy(src, dst);
    }

    /// Atomically claims a node for execution: returns `true` the first
    /// time it is called for a given `node_id`, `false` on every subsequent
    /// call until the mark is hidden again.
    pub fn try_claim(&self, node_id: &str) -> bool {
        let mut guard = self.processed.lock();
        if guard.exists(node_id, false) {
            false
        } else {
            guard.set(node_id, ());
            true
        }
    }

    pub fn is_processed(&self, node_id: &str) -> bool {
        self.processed.lock().exists(node_id, false)
    }

    pub fn set_switch_result(&self, switch_node: &str, result: CaseResult) {
        self.switch_results.lock().set(switch_node, result);
    }

    pub fn get_switch_result(&self, switch_node: &str) -> Option<CaseResult> {
        self.switch_results.lock().get(switch_node, false)
    }

    pub fn set_active_recurrence(&self, start: &str, dest: &str) {
        self.active_recurrence.lock().set(Self::rec_key(start, dest), ());
    }

    pub fn exists_active_recurrence(&self, start: &str, dest: &str) -> bool {
        self.active_recurrence.lock().exists(&Self::rec_key(start, dest), false)
    }

    pub fn remove_active_recurrence(&self, start: &str, dest: &str) {
        self.active_recurrence.lock().delete(&Self::rec_key(start, dest));
    }

    fn rec_key(start: &str, dest: &str) -> String {
        format!("{start}\u{0}{dest}")
    }

    /// Hide both the processed-mark and the node result for every id in
    /// `ids`, at the start of a recurrent iteration.
    pub fn hide_all(&self, ids: impl IntoIterator<Item = impl AsRef<str>>) {
        let mut processed = self.processed.lock();
        let mut results = self.node_results.lock();
        for id in ids {
            processed.hide(id.as_ref());
            results.hide(id.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let store = ResultStore::new();
        store.set_node_result("n", StoredValue::Value(json!(1)));
        assert!(matches!(store.get_node_result("n", false), Some(StoredValue::Value(v)) if v == json!(1)));
    }

    #[test]
    fn hide_then_default_read_sees_absent_but_privileged_sees_value() {
        let store = ResultStore::new();
        store.set_node_result("n", StoredValue::Value(json!(7)));
        store.hide_node_result("n");
        assert!(store.get_node_result("n", false).is_none());
        assert!(store.get_node_result("n", true).is_some());
    }

    #[test]
    fn set_after_hide_unhides() {
        let store = ResultStore::new();
        store.set_node_result("n", StoredValue::Value(json!(1)));
        store.hide_node_result("n");
        store.set_node_result("n", StoredValue::Value(json!(2)));
        assert!(store.exists_node_result("n", false));
    }

    #[test]
    fn hide_all_is_transparent_to_privileged_reads() {
        let store = ResultStore::new();
        for id in ["a", "b", "c"] {
            store.try_claim(id);
            store.set_node_result(id, StoredValue::Value(json!(1)));
        }
        store.hide_all(["a", "b", "c"]);
        for id in ["a", "b", "c"] {
            assert!(store.exists_node_result(id, true), "{id} should exist with_hidden");
            assert!(!store.exists_node_result(id, false), "{id} should not exist without_hidden");
            assert!(!store.is_processed(id), "{id} processed mark should be hidden too");
        }
    }

    #[test]
    fn copy_publishes_under_another_id() {
        let store = ResultStore::new();
        store.set_node_result("a", StoredValue::Value(json!(99)));
        store.copy_node_result("a", "b");
        assert_eq!(
            store.get_node_result("b", false).unwrap().into_value().unwrap(),
            store.get_node_result("a", true).unwrap().into_value().unwrap()
        );
    }

    #[test]
    fn try_claim_is_at_most_once() {
        let store = ResultStore::new();
        assert!(store.try_claim("n"));
        assert!(!store.try_claim("n"));
    }
}
