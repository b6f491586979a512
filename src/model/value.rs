use std::fmt;

use serde_json::Number;

use crate::model::list::ObservableList;
use crate::model::map::ObservableMap;
use crate::model::node::NodeCore;

/// Error type for container mutations and lookups
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContainerError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("value not found in list")]
    ValueNotFound,
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("container is already owned by another parent; remove it there first")]
    AlreadyAttached,
    #[error("container cannot be inserted into its own subtree")]
    WouldCycle,
}

/// Opaque identity of an observable container.
///
/// Two containers with equal contents still have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

impl ContainerId {
    pub(crate) fn of(core: &std::sync::Arc<NodeCore>) -> Self {
        ContainerId(std::sync::Arc::as_ptr(core) as usize)
    }
}

/// A value stored in an observable container.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Map(ObservableMap),
    List(ObservableList),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ObservableMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ObservableList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Identity of the container, or `None` for scalars.
    pub fn container_id(&self) -> Option<ContainerId> {
        self.core().map(ContainerId::of)
    }

    /// Deep copy into plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Map(m) => m.to_json(),
            Value::List(l) => l.to_json(),
        }
    }

    pub(crate) fn core(&self) -> Option<&std::sync::Arc<NodeCore>> {
        match self {
            Value::Map(m) => Some(m.core()),
            Value::List(l) => Some(l.core()),
            _ => None,
        }
    }

    /// Whether `target` is this value or one of its descendants.
    pub(crate) fn subtree_contains(&self, target: ContainerId) -> bool {
        match self {
            Value::Map(m) => {
                m.id() == target || m.values().iter().any(|v| v.subtree_contains(target))
            }
            Value::List(l) => {
                l.id() == target || l.values().iter().any(|v| v.subtree_contains(target))
            }
            _ => false,
        }
    }
}

/// Scalars compare by value; containers compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a.id() == b.id(),
            (Value::List(a), Value::List(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Map(m) => fmt::Debug::fmt(m, f),
            Value::List(l) => fmt::Debug::fmt(l, f),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Non-finite floats have no JSON form and become `Null`.
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObservableMap> for Value {
    fn from(m: ObservableMap) -> Self {
        Value::Map(m)
    }
}

impl From<ObservableList> for Value {
    fn from(l: ObservableList) -> Self {
        Value::List(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_compare_structurally() {
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_eq!(Value::from(2.5), Value::from(2.5));
        assert_ne!(Value::from(1i64), Value::from(1.0));
        assert_ne!(Value::from(true), Value::Null);
    }

    #[test]
    fn test_containers_compare_by_identity() {
        let a = ObservableMap::new();
        let b = ObservableMap::new();
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert!(Value::from(f64::NAN).is_null());
        assert!(Value::from(f64::INFINITY).is_null());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::from(3i64).as_f64(), Some(3.0));
        assert_eq!(Value::from(false).as_bool(), Some(false));
        assert!(Value::from(ObservableList::new()).as_list().is_some());
        assert!(Value::from("x").as_map().is_none());
        assert!(Value::from("x").container_id().is_none());
    }
}
