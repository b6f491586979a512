use serde_json::Value as Json;

use crate::model::list::ObservableList;
use crate::model::map::ObservableMap;
use crate::model::value::{ContainerError, Value};

/// Convert any JSON value, building containers for objects and arrays.
/// Each node is filled with its own notifications blocked.
pub fn value_from_json(json: Json) -> Result<Value, ContainerError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n),
        Json::String(s) => Value::String(s),
        Json::Object(object) => Value::Map(map_from_json(object)?),
        Json::Array(array) => Value::List(list_from_json(array)?),
    })
}

pub fn map_from_json(object: serde_json::Map<String, Json>) -> Result<ObservableMap, ContainerError> {
    let map = ObservableMap::new();
    populate_map(&map, object)?;
    Ok(map)
}

pub fn list_from_json(array: Vec<Json>) -> Result<ObservableList, ContainerError> {
    let list = ObservableList::new();
    {
        let _block = list.block_notifications();
        for element in array {
            list.push(value_from_json(element)?)?;
        }
    }
    Ok(list)
}

/// Replace the contents of an existing map (typically a record root) with
/// the tree built from `object`, without emitting anything.
pub fn populate_map(
    target: &ObservableMap,
    object: serde_json::Map<String, Json>,
) -> Result<(), ContainerError> {
    let entries = object
        .into_iter()
        .map(|(k, v)| Ok((k, value_from_json(v)?)))
        .collect::<Result<Vec<(String, Value)>, ContainerError>>()?;
    let _block = target.block_notifications();
    target.replace(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn nested_doc() -> Json {
        json!({
            "name": "root",
            "icon": "F-CAR",
            "hours": 1.5,
            "uid": "r",
            "subItems": [
                {
                    "name": "a",
                    "icon": "F-BOOK",
                    "hours": 0.0,
                    "uid": "a",
                    "subItems": [
                        {"name": "a1", "icon": "", "hours": 2.0, "uid": "a1", "subItems": []}
                    ]
                },
                {"name": "b", "icon": "", "hours": 3, "uid": "b", "subItems": []}
            ]
        })
    }

    #[test]
    fn test_builds_containers_for_objects_and_arrays() {
        let value = value_from_json(nested_doc()).unwrap();
        let root = value.as_map().unwrap();
        let subs = root.get("subItems").unwrap();
        let subs = subs.as_list().unwrap();
        assert_eq!(subs.len(), 2);
        let first = subs.get(0).unwrap();
        assert!(first.as_map().unwrap().get("subItems").unwrap().as_list().is_some());
    }

    #[test]
    fn test_to_json_reproduces_the_input() {
        let doc = nested_doc();
        let value = value_from_json(doc.clone()).unwrap();
        assert_eq!(value.to_json(), doc);
    }

    #[test]
    fn test_population_emits_nothing() {
        let root = ObservableMap::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = root.on_changed(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let Json::Object(object) = nested_doc() else {
            unreachable!()
        };
        populate_map(&root, object).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!root.notifications_blocked());
    }

    #[test]
    fn test_deep_leaf_change_reaches_root_once() {
        let root = ObservableMap::new();
        let Json::Object(object) = nested_doc() else {
            unreachable!()
        };
        populate_map(&root, object).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = root.on_changed(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let leaf = root.get("subItems").unwrap().as_list().unwrap().get(0).unwrap();
        let leaf = leaf.as_map().unwrap().get("subItems").unwrap();
        let leaf = leaf.as_list().unwrap().get(0).unwrap();
        leaf.as_map().unwrap().set("hours", 9.5).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handles_deep_nesting() {
        let mut doc = json!({"name": "leaf", "subItems": []});
        for depth in 0..100 {
            doc = json!({"name": format!("level-{depth}"), "subItems": [doc]});
        }
        let value = value_from_json(doc.clone()).unwrap();
        assert_eq!(value.to_json(), doc);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(value_from_json(json!(null)).unwrap(), Value::Null);
        assert_eq!(value_from_json(json!("s")).unwrap(), Value::from("s"));
        assert_eq!(value_from_json(json!(4)).unwrap(), Value::from(4i64));
    }
}
