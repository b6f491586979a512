use std::fmt;
use std::sync::{Arc, Mutex};

use crate::model::node::{NodeCore, Slot, check_batch};
use crate::model::observable::{NotifyBlock, Signal, Subscription, lock};
use crate::model::value::{ContainerError, ContainerId, Value};

struct ListInner {
    core: Arc<NodeCore>,
    items: Mutex<Vec<Slot>>,
    appended: Signal<Value>,
    removed: Signal<Value>,
}

/// An ordered, index-addressable observable sequence.
///
/// Besides the generic "changed" notification, `push` and the remove
/// operations emit granular "appended"/"removed" events carrying the
/// element, for consumers that update incrementally. Indexed `set`,
/// `clear` and `replace` emit "changed" only.
#[derive(Clone)]
pub struct ObservableList {
    inner: Arc<ListInner>,
}

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableList {
    pub fn new() -> Self {
        ObservableList {
            inner: Arc::new(ListInner {
                core: Arc::new(NodeCore::default()),
                items: Mutex::new(Vec::new()),
                appended: Signal::new(),
                removed: Signal::new(),
            }),
        }
    }

    pub fn id(&self) -> ContainerId {
        ContainerId::of(&self.inner.core)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        lock(&self.inner.items)
            .get(index)
            .map(|slot| slot.value.clone())
    }

    /// Snapshot of the elements in order.
    pub fn values(&self) -> Vec<Value> {
        lock(&self.inner.items)
            .iter()
            .map(|slot| slot.value.clone())
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Value> {
        self.values().into_iter()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.position(value).is_some()
    }

    /// Index of the first element equal to `value`.
    pub fn index_of(&self, value: &Value) -> Result<usize, ContainerError> {
        self.position(value).ok_or(ContainerError::ValueNotFound)
    }

    /// Append `value`, then emit "changed" and "appended".
    pub fn push(&self, value: impl Into<Value>) -> Result<(), ContainerError> {
        let value = value.into();
        Slot::check(&value, &self.inner.core)?;
        let slot = Slot::attach(value.clone(), &self.inner.core)?;
        lock(&self.inner.items).push(slot);
        self.notify_with(&self.inner.appended, &value);
        Ok(())
    }

    /// Overwrite the element at `index`, returning the old one.
    /// Emits "changed" only.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<Value, ContainerError> {
        let value = value.into();
        if value.core().is_some() && self.get(index).as_ref() == Some(&value) {
            self.inner.core.notify_changed();
            return Ok(value);
        }
        self.check_index(index)?;
        Slot::check(&value, &self.inner.core)?;

        let slot = Slot::attach(value, &self.inner.core)?;
        let old = {
            let mut items = lock(&self.inner.items);
            let len = items.len();
            match items.get_mut(index) {
                Some(existing) => Ok(std::mem::replace(existing, slot)),
                None => Err(ContainerError::IndexOutOfRange { index, len }),
            }
        };
        let old = old?.detach();
        self.inner.core.notify_changed();
        Ok(old)
    }

    /// Remove the element at `index`, then emit "changed" and "removed".
    pub fn remove_at(&self, index: usize) -> Result<Value, ContainerError> {
        let slot = {
            let mut items = lock(&self.inner.items);
            if index >= items.len() {
                return Err(ContainerError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        let value = slot.detach();
        self.notify_with(&self.inner.removed, &value);
        Ok(value)
    }

    /// Remove the first element equal to `value`.
    pub fn remove_value(&self, value: &Value) -> Result<Value, ContainerError> {
        let index = self.index_of(value)?;
        self.remove_at(index)
    }

    /// Remove the last element, emitting "changed" and "removed".
    pub fn pop(&self) -> Option<Value> {
        let slot = lock(&self.inner.items).pop()?;
        let value = slot.detach();
        self.notify_with(&self.inner.removed, &value);
        Some(value)
    }

    /// Remove everything. Emits "changed" only.
    pub fn clear(&self) {
        let old: Vec<Value> = lock(&self.inner.items)
            .drain(..)
            .map(Slot::detach)
            .collect();
        drop(old);
        self.inner.core.notify_changed();
    }

    /// Swap the whole contents in one step. Emits "changed" only.
    pub fn replace(&self, values: impl IntoIterator<Item = Value>) -> Result<(), ContainerError> {
        let incoming: Vec<Value> = values.into_iter().collect();
        let current: Vec<ContainerId> = self
            .values()
            .iter()
            .filter_map(Value::container_id)
            .collect();
        check_batch(&incoming, &self.inner.core, &current)?;

        let old: Vec<Value> = {
            let mut items = lock(&self.inner.items);
            // Detach first so reused children can be re-attached below.
            let old = items.drain(..).map(Slot::detach).collect();
            for value in incoming {
                let slot = Slot::attach(value, &self.inner.core)?;
                items.push(slot);
            }
            old
        };
        drop(old);
        self.inner.core.notify_changed();
        Ok(())
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_changed(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.core.changed.subscribe(move |_| f())
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_appended(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.inner.appended.subscribe(f)
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_removed(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.inner.removed.subscribe(f)
    }

    pub fn emit_changed(&self) {
        self.inner.core.notify_changed();
    }

    /// Suppress this list's own notifications (generic and granular)
    /// until the guard drops. Nothing is emitted when the guard drops.
    pub fn block_notifications(&self) -> NotifyBlock<'_> {
        self.inner.core.gate.block()
    }

    pub fn set_notifications_blocked(&self, blocked: bool) -> bool {
        self.inner.core.gate.set_blocked(blocked)
    }

    pub fn notifications_blocked(&self) -> bool {
        self.inner.core.gate.is_blocked()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.core.is_attached()
    }

    /// Deep copy into a plain JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        let items = lock(&self.inner.items);
        serde_json::Value::Array(items.iter().map(|slot| slot.value.to_json()).collect())
    }

    pub(crate) fn core(&self) -> &Arc<NodeCore> {
        &self.inner.core
    }

    fn position(&self, value: &Value) -> Option<usize> {
        lock(&self.inner.items)
            .iter()
            .position(|slot| slot.value == *value)
    }

    fn check_index(&self, index: usize) -> Result<(), ContainerError> {
        let len = self.len();
        if index < len {
            Ok(())
        } else {
            Err(ContainerError::IndexOutOfRange { index, len })
        }
    }

    /// "changed" first, then the granular event.
    fn notify_with(&self, granular: &Signal<Value>, value: &Value) {
        if self.inner.core.gate.is_blocked() {
            return;
        }
        self.inner.core.changed.emit(&());
        granular.emit(value);
    }
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

impl IntoIterator for &ObservableList {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObservableMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        changed: Arc<AtomicUsize>,
        appended: Arc<Mutex<Vec<Value>>>,
        removed: Arc<Mutex<Vec<Value>>>,
        _subs: Vec<Subscription>,
    }

    fn record(list: &ObservableList) -> Recorder {
        let changed = Arc::new(AtomicUsize::new(0));
        let appended = Arc::new(Mutex::new(Vec::new()));
        let removed = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&changed);
        let a = Arc::clone(&appended);
        let r = Arc::clone(&removed);
        let subs = vec![
            list.on_changed(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            list.on_appended(move |v| a.lock().unwrap().push(v.clone())),
            list.on_removed(move |v| r.lock().unwrap().push(v.clone())),
        ];
        Recorder {
            changed,
            appended,
            removed,
            _subs: subs,
        }
    }

    #[test]
    fn test_push_emits_changed_and_appended() {
        let list = ObservableList::new();
        let rec = record(&list);
        let element = ObservableMap::new();

        list.push(element.clone()).unwrap();

        assert_eq!(rec.changed.load(Ordering::SeqCst), 1);
        assert_eq!(*rec.appended.lock().unwrap(), vec![Value::from(element)]);
        assert!(rec.removed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_value_emits_changed_and_removed() {
        let list = ObservableList::new();
        let element = ObservableMap::new();
        list.push(element.clone()).unwrap();
        let rec = record(&list);

        let removed = list.remove_value(&Value::from(element.clone())).unwrap();

        assert_eq!(removed, Value::from(element.clone()));
        assert_eq!(rec.changed.load(Ordering::SeqCst), 1);
        assert_eq!(*rec.removed.lock().unwrap(), vec![Value::from(element)]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_missing_value_fails_without_notifying() {
        let list = ObservableList::new();
        list.push("a").unwrap();
        let rec = record(&list);
        assert_eq!(
            list.remove_value(&Value::from("b")),
            Err(ContainerError::ValueNotFound)
        );
        assert_eq!(rec.changed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_at_out_of_range() {
        let list = ObservableList::new();
        assert_eq!(
            list.remove_at(0),
            Err(ContainerError::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn test_indexed_set_emits_changed_only() {
        let list = ObservableList::new();
        list.push(1i64).unwrap();
        let rec = record(&list);

        let old = list.set(0, 2i64).unwrap();

        assert_eq!(old, Value::from(1i64));
        assert_eq!(list.get(0), Some(Value::from(2i64)));
        assert_eq!(rec.changed.load(Ordering::SeqCst), 1);
        assert!(rec.appended.lock().unwrap().is_empty());
        assert!(rec.removed.lock().unwrap().is_empty());
        assert_eq!(
            list.set(5, 0i64),
            Err(ContainerError::IndexOutOfRange { index: 5, len: 1 })
        );
    }

    #[test]
    fn test_pop_and_clear() {
        let list = ObservableList::new();
        list.push("a").unwrap();
        list.push("b").unwrap();
        let rec = record(&list);

        assert_eq!(list.pop(), Some(Value::from("b")));
        list.clear();
        assert_eq!(list.pop(), None);

        assert_eq!(rec.changed.load(Ordering::SeqCst), 2);
        assert_eq!(*rec.removed.lock().unwrap(), vec![Value::from("b")]);
    }

    #[test]
    fn test_index_of_and_contains() {
        let list = ObservableList::new();
        list.push("a").unwrap();
        list.push("b").unwrap();
        assert_eq!(list.index_of(&Value::from("b")), Ok(1));
        assert_eq!(
            list.index_of(&Value::from("z")),
            Err(ContainerError::ValueNotFound)
        );
        assert!(list.contains(&Value::from("a")));
    }

    #[test]
    fn test_blocked_list_emits_nothing() {
        let list = ObservableList::new();
        let rec = record(&list);
        {
            let _block = list.block_notifications();
            for i in 0..10i64 {
                list.push(i).unwrap();
            }
            list.remove_at(0).unwrap();
        }
        assert_eq!(list.len(), 9);
        assert_eq!(rec.changed.load(Ordering::SeqCst), 0);
        assert!(rec.appended.lock().unwrap().is_empty());
        assert!(rec.removed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_nested_element_changes_propagate() {
        let list = ObservableList::new();
        let child = ObservableMap::new();
        list.push(child.clone()).unwrap();
        let rec = record(&list);

        child.set("hours", 1.5).unwrap();

        assert_eq!(rec.changed.load(Ordering::SeqCst), 1);
        assert!(rec.appended.lock().unwrap().is_empty());
    }

    #[test]
    fn test_replace_swaps_contents() {
        let list = ObservableList::new();
        let old_child = ObservableMap::new();
        list.push(old_child.clone()).unwrap();
        let rec = record(&list);

        list.replace(vec![Value::from("x"), Value::from("y")]).unwrap();

        assert_eq!(list.values(), vec![Value::from("x"), Value::from("y")]);
        assert!(!old_child.is_attached());
        assert_eq!(rec.changed.load(Ordering::SeqCst), 1);
        assert!(rec.appended.lock().unwrap().is_empty());
    }

    #[test]
    fn test_replace_rejects_duplicate_container() {
        let list = ObservableList::new();
        let child = ObservableMap::new();
        let err = list.replace(vec![Value::from(child.clone()), Value::from(child)]);
        assert_eq!(err, Err(ContainerError::AlreadyAttached));
        assert!(list.is_empty());
    }

    #[test]
    fn test_moving_a_node_requires_removal_first() {
        let from = ObservableList::new();
        let to = ObservableList::new();
        let node = ObservableMap::new();
        from.push(node.clone()).unwrap();

        assert_eq!(to.push(node.clone()), Err(ContainerError::AlreadyAttached));
        let moved = from.remove_value(&Value::from(node)).unwrap();
        to.push(moved).unwrap();
        assert_eq!(to.len(), 1);
    }

    #[test]
    fn test_iterates_in_order() {
        let list = ObservableList::new();
        for s in ["a", "b", "c"] {
            list.push(s).unwrap();
        }
        let collected: Vec<String> = (&list)
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        assert_eq!(collected, vec!["a", "b", "c"]);
    }
}
