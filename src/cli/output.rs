use serde::Serialize;

use crate::model::map::ObservableMap;
use crate::model::project;

#[derive(Serialize)]
pub struct ProjectJson {
    pub uid: String,
    pub name: String,
    pub icon: String,
    pub hours: f64,
    pub total_hours: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_items: Vec<ProjectJson>,
}

pub fn project_to_json(node: &ObservableMap) -> ProjectJson {
    ProjectJson {
        uid: project::uid_of(node),
        name: project::name_of(node),
        icon: project::icon_of(node),
        hours: project::hours_of(node),
        total_hours: project::total_hours(node),
        sub_items: project::children(node).iter().map(project_to_json).collect(),
    }
}

/// One line per project: uid, total hours, name
pub fn format_project_line(node: &ObservableMap) -> String {
    format!(
        "{}  {:>7.1}h  {}",
        project::uid_of(node),
        project::total_hours(node),
        project::name_of(node)
    )
}

/// A project and its sub-projects, indented
pub fn format_project_tree(node: &ObservableMap, indent: usize) -> Vec<String> {
    let mut lines = vec![format!("{}{}", "  ".repeat(indent), format_project_line(node))];
    for child in project::children(node) {
        lines.extend(format_project_tree(&child, indent + 1));
    }
    lines
}
