use serde_json::json;

use crate::model::list::ObservableList;
use crate::model::map::ObservableMap;
use crate::model::value::{ContainerError, Value};

pub const NAME: &str = "name";
pub const ICON: &str = "icon";
pub const HOURS: &str = "hours";
pub const UID: &str = "uid";
pub const SUB_ITEMS: &str = "subItems";

/// A fresh random identifier: 128 bits as 32 lowercase hex digits.
pub fn generate_uid() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// The document written for a newly created project:
/// `{ "name", "icon", "hours", "uid", "subItems": [<project>, ...] }`.
pub fn new_document(name: &str, icon: &str, uid: &str) -> serde_json::Value {
    json!({
        NAME: name,
        ICON: icon,
        HOURS: 0.0,
        UID: uid,
        SUB_ITEMS: [],
    })
}

/// An unattached project node with the same layout as [`new_document`].
pub fn new_project(name: &str, icon: &str, uid: &str) -> Result<ObservableMap, ContainerError> {
    let project = ObservableMap::new();
    {
        let _block = project.block_notifications();
        project.set(NAME, name)?;
        project.set(ICON, icon)?;
        project.set(HOURS, 0.0)?;
        project.set(UID, uid)?;
        project.set(SUB_ITEMS, ObservableList::new())?;
    }
    Ok(project)
}

pub fn name_of(project: &ObservableMap) -> String {
    string_field(project, NAME)
}

pub fn icon_of(project: &ObservableMap) -> String {
    string_field(project, ICON)
}

pub fn uid_of(project: &ObservableMap) -> String {
    string_field(project, UID)
}

/// Hours logged directly on this node (not counting sub-projects).
pub fn hours_of(project: &ObservableMap) -> f64 {
    project.get(HOURS).and_then(|v| v.as_f64()).unwrap_or(0.0)
}

fn string_field(project: &ObservableMap, key: &str) -> String {
    project
        .get(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// The node's `subItems` list, created on first use.
///
/// A node loaded without `subItems` gets an empty list wired into the
/// tree like any other; materializing it does not notify.
pub fn sub_items(project: &ObservableMap) -> Result<ObservableList, ContainerError> {
    match project.get(SUB_ITEMS) {
        Some(Value::List(list)) => return Ok(list),
        Some(other) => {
            tracing::warn!(uid = %uid_of(project), found = ?other, "replacing malformed subItems");
        }
        None => {}
    }
    let list = ObservableList::new();
    let _block = project.block_notifications();
    project.set(SUB_ITEMS, list.clone())?;
    Ok(list)
}

/// Sub-projects of a node, without materializing an absent list.
pub fn children(project: &ObservableMap) -> Vec<ObservableMap> {
    match project.get(SUB_ITEMS) {
        Some(Value::List(list)) => list
            .iter()
            .filter_map(|v| v.as_map().cloned())
            .collect(),
        _ => Vec::new(),
    }
}

/// Append a new sub-project with a fresh uid and return it.
pub fn add_sub_item(
    project: &ObservableMap,
    name: &str,
    icon: &str,
) -> Result<ObservableMap, ContainerError> {
    let child = new_project(name, icon, &generate_uid())?;
    sub_items(project)?.push(child.clone())?;
    tracing::debug!(parent = %uid_of(project), child = %uid_of(&child), "sub-project added");
    Ok(child)
}

/// Add `hours` and `minutes` to the node's own total, rounded to 0.1 h.
pub fn add_time(project: &ObservableMap, hours: u32, minutes: u32) -> Result<f64, ContainerError> {
    let total = round_to(hours_of(project) + f64::from(hours) + f64::from(minutes) / 60.0, 1);
    project.set(HOURS, total)?;
    Ok(total)
}

/// Add a finished timer session, in seconds, rounded to 0.01 h.
pub fn add_seconds(project: &ObservableMap, seconds: u64) -> Result<f64, ContainerError> {
    let total = hours_of(project) + round_to(seconds as f64 / 3600.0, 2);
    project.set(HOURS, total)?;
    Ok(total)
}

/// Own hours plus those of every descendant, rounded to 0.1 h.
pub fn total_hours(project: &ObservableMap) -> f64 {
    fn sum(project: &ObservableMap) -> f64 {
        hours_of(project) + children(project).iter().map(sum).sum::<f64>()
    }
    round_to(sum(project), 1)
}

/// Depth-first search for the node carrying `uid`, including `project` itself.
pub fn find_by_uid(project: &ObservableMap, uid: &str) -> Option<ObservableMap> {
    if uid_of(project) == uid {
        return Some(project.clone());
    }
    children(project)
        .iter()
        .find_map(|child| find_by_uid(child, uid))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
