use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::model::node::{NodeCore, Slot, check_batch};
use crate::model::observable::{NotifyBlock, Subscription, lock};
use crate::model::value::{ContainerError, ContainerId, Value};

struct MapInner {
    core: Arc<NodeCore>,
    entries: Mutex<IndexMap<String, Slot>>,
}

/// An insertion-ordered, observable string-keyed map.
///
/// Cloning yields another handle to the same map. Every mutation emits
/// exactly one "changed" notification after it has been applied; reads
/// never notify.
#[derive(Clone)]
pub struct ObservableMap {
    inner: Arc<MapInner>,
}

impl Default for ObservableMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableMap {
    pub fn new() -> Self {
        ObservableMap {
            inner: Arc::new(MapInner {
                core: Arc::new(NodeCore::default()),
                entries: Mutex::new(IndexMap::new()),
            }),
        }
    }

    pub fn id(&self) -> ContainerId {
        ContainerId::of(&self.inner.core)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.inner.entries)
            .get(key)
            .map(|slot| slot.value.clone())
    }

    /// Value for `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.inner.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.inner.entries).keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        lock(&self.inner.entries)
            .values()
            .map(|slot| slot.value.clone())
            .collect()
    }

    pub fn items(&self) -> Vec<(String, Value)> {
        lock(&self.inner.entries)
            .iter()
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect()
    }

    /// Insert or overwrite `key`, returning the previous value.
    ///
    /// An overwritten key keeps its position in the iteration order.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, ContainerError> {
        let key = key.into();
        let value = value.into();

        // Re-assigning the container already stored under `key`.
        if value.core().is_some() && self.get(&key).as_ref() == Some(&value) {
            self.inner.core.notify_changed();
            return Ok(Some(value));
        }

        Slot::check(&value, &self.inner.core)?;
        let slot = Slot::attach(value, &self.inner.core)?;
        let previous = lock(&self.inner.entries).insert(key, slot);
        let previous = previous.map(Slot::detach);
        self.inner.core.notify_changed();
        Ok(previous)
    }

    /// Remove `key`, preserving the order of the remaining entries.
    pub fn remove(&self, key: &str) -> Result<Value, ContainerError> {
        let slot = lock(&self.inner.entries)
            .shift_remove(key)
            .ok_or_else(|| ContainerError::KeyNotFound(key.to_string()))?;
        let value = slot.detach();
        self.inner.core.notify_changed();
        Ok(value)
    }

    /// Swap the whole contents in one step.
    pub fn replace<K, I>(&self, entries: I) -> Result<(), ContainerError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let incoming: Vec<(String, Value)> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let current: Vec<ContainerId> = self
            .values()
            .iter()
            .filter_map(Value::container_id)
            .collect();
        check_batch(incoming.iter().map(|(_, v)| v), &self.inner.core, &current)?;

        let old: Vec<Value> = {
            let mut guard = lock(&self.inner.entries);
            // Detach first so reused children can be re-attached below.
            let old = guard.drain(..).map(|(_, slot)| slot.detach()).collect();
            for (k, v) in incoming {
                let slot = Slot::attach(v, &self.inner.core)?;
                guard.insert(k, slot);
            }
            old
        };
        drop(old);
        self.inner.core.notify_changed();
        Ok(())
    }

    /// Observe every mutation of this map or any descendant.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_changed(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.core.changed.subscribe(move |_| f())
    }

    /// Emit "changed" by hand, e.g. once after a blocked bulk update.
    pub fn emit_changed(&self) {
        self.inner.core.notify_changed();
    }

    /// Suppress this map's own notifications until the guard drops.
    ///
    /// Nothing is emitted when the guard drops.
    pub fn block_notifications(&self) -> NotifyBlock<'_> {
        self.inner.core.gate.block()
    }

    /// Non-scoped form of [`block_notifications`](Self::block_notifications).
    /// Returns the previous state.
    pub fn set_notifications_blocked(&self, blocked: bool) -> bool {
        self.inner.core.gate.set_blocked(blocked)
    }

    pub fn notifications_blocked(&self) -> bool {
        self.inner.core.gate.is_blocked()
    }

    /// Whether a parent container currently owns this map.
    pub fn is_attached(&self) -> bool {
        self.inner.core.is_attached()
    }

    /// Deep copy into a plain JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let guard = lock(&self.inner.entries);
        let mut object = serde_json::Map::with_capacity(guard.len());
        for (k, slot) in guard.iter() {
            object.insert(k.clone(), slot.value.to_json());
        }
        serde_json::Value::Object(object)
    }

    pub(crate) fn core(&self) -> &Arc<NodeCore> {
        &self.inner.core
    }
}

impl fmt::Debug for ObservableMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.items()).finish()
    }
}
