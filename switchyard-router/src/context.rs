use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Copy-on-write key-value store shared by every execution.
///
/// Readers take an `Arc` snapshot and never observe a later write; writers
/// clone the map only while a snapshot is still held.
#[derive(Default)]
pub(crate) struct ContextStore {
    current: RwLock<Arc<Map<String, Value>>>,
}

impl ContextStore {
    pub(crate) fn snapshot(&self) -> Arc<Map<String, Value>> {
        Arc::clone(&self.current.read())
    }

    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.current.read().get(key).cloned()
    }

    pub(crate) fn set(&self, key: String, value: Value) {
        let mut current = self.current.write();
        Arc::make_mut(&mut current).insert(key, value);
    }

    pub(crate) fn merge(&self, values: Map<String, Value>) {
        if values.is_empty() {
            return;
        }
        let mut current = self.current.write();
        Arc::make_mut(&mut current).extend(values);
    }

    pub(crate) fn remove(&self, key: &str) -> Option<Value> {
        let mut current = self.current.write();
        if !current.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut current).remove(key)
    }

    pub(crate) fn clear(&self) {
        *self.current.write() = Arc::default();
    }
}
