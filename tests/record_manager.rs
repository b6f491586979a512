//! End-to-end behaviour of the record manager against a real data
//! directory: creation, lookup, persistence, and corrupt-file isolation.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use pretty_assertions::assert_eq;
use serde_json::json;
use tally::io::atomic::to_json_bytes;
use tally::io::manager::RecordManager;
use tally::model::project;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

/// Captures formatted log output for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

/// Global for this test binary: loads log from worker threads.
fn logs() -> &'static LogBuffer {
    static LOGS: OnceLock<LogBuffer> = OnceLock::new();
    LOGS.get_or_init(|| {
        let buffer = LogBuffer::default();
        tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .init();
        buffer
    })
}

fn write_doc(dir: &Path, file: &str, doc: &serde_json::Value) {
    fs::write(dir.join(file), to_json_bytes(doc).unwrap()).unwrap();
}

fn read_doc(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// A project nested `depth` levels deep through `subItems`.
fn nested_doc(depth: usize) -> serde_json::Value {
    let mut doc = json!({"name": "leaf", "icon": "", "hours": 0.25, "uid": "leaf", "subItems": []});
    for level in (0..depth).rev() {
        doc = json!({
            "name": format!("level {level}"),
            "icon": "F-CAR",
            "hours": level as f64,
            "uid": format!("u{level}"),
            "subItems": [doc, {"name": "sibling", "icon": "", "hours": 1.5, "uid": format!("s{level}"), "subItems": []}],
        });
    }
    doc
}

#[test]
fn test_homework_scenario() {
    let tmp = TempDir::new().unwrap();
    let manager = RecordManager::open(tmp.path(), 2).unwrap();

    let record = manager.create("Homework", "icon-1").unwrap();
    let uid = record.file_stem().unwrap().to_string();
    assert_eq!(record.path(), tmp.path().join(format!("{uid}.json")));

    let text = fs::read_to_string(record.path()).unwrap();
    assert_eq!(
        text,
        format!(
            "{{\n    \"name\": \"Homework\",\n    \"icon\": \"icon-1\",\n    \"hours\": 0.0,\n    \"uid\": \"{uid}\",\n    \"subItems\": []\n}}\n"
        )
    );

    let found = manager.find(&uid).unwrap();
    assert_eq!(found, record);

    found.root().unwrap().set("hours", 2.5).unwrap();
    manager.flush_all().unwrap();
    drop(manager);

    let reopened = RecordManager::open(tmp.path(), 2).unwrap();
    let root = reopened.find(&uid).unwrap().root().unwrap();
    assert_eq!(project::hours_of(&root), 2.5);
    assert_eq!(project::name_of(&root), "Homework");
}

#[test]
fn test_deep_document_round_trips() {
    let tmp = TempDir::new().unwrap();
    let original = nested_doc(80);
    write_doc(tmp.path(), "u0.json", &original);

    let manager = RecordManager::open(tmp.path(), 2).unwrap();
    let record = manager.find("u0").unwrap();
    let root = record.root().unwrap();
    assert_eq!(root.to_json(), original);

    // Force a write of the unchanged tree.
    root.emit_changed();
    record.flush().unwrap();
    assert_eq!(read_doc(record.path()), original);
    assert_eq!(fs::read(record.path()).unwrap(), to_json_bytes(&original).unwrap());
}

#[test]
fn test_deep_leaf_change_is_persisted() {
    let tmp = TempDir::new().unwrap();
    write_doc(tmp.path(), "u0.json", &nested_doc(3));
    let manager = RecordManager::open(tmp.path(), 2).unwrap();
    let (record, leaf) = manager.find_node("leaf").unwrap();
    assert!(!record.is_dirty());

    leaf.set("name", "renamed").unwrap();
    record.flush().unwrap();

    let doc = read_doc(record.path());
    assert_eq!(
        doc["subItems"][0]["subItems"][0]["subItems"][0]["name"],
        json!("renamed")
    );
}

#[test]
fn test_thousand_creates_are_unique() {
    let tmp = TempDir::new().unwrap();
    let manager = RecordManager::open(tmp.path(), 4).unwrap();

    let mut uids = HashSet::new();
    for i in 0..1000 {
        let record = manager.create(&format!("p{i}"), "").unwrap();
        uids.insert(record.file_stem().unwrap().to_string());
    }

    assert_eq!(uids.len(), 1000);
    assert_eq!(manager.len(), 1000);
    let files = fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(files, 1000);
}

#[test]
fn test_corrupt_file_is_isolated_and_logged() {
    let logs = logs();
    let tmp = TempDir::new().unwrap();
    for i in 0..5 {
        let uid = format!("valid{i}");
        write_doc(tmp.path(), &format!("{uid}.json"), &project::new_document("ok", "", &uid));
    }
    fs::write(tmp.path().join("corrupt-one.json"), "{\"name\": \"half").unwrap();

    let manager = RecordManager::open(tmp.path(), 3).unwrap();
    let failures = manager.wait_for_loads();

    assert_eq!(manager.all().len(), 5);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].path.ends_with("corrupt-one.json"));
    assert!(logs.contents().contains("corrupt-one.json"));
}

#[test]
fn test_removed_project_stays_gone_after_reopen() {
    let tmp = TempDir::new().unwrap();
    let manager = RecordManager::open(tmp.path(), 2).unwrap();
    let keep = manager.create("keep", "").unwrap();
    let drop_me = manager.create("drop", "").unwrap();
    drop_me.root().unwrap().set("hours", 1.0).unwrap();

    manager.remove(&drop_me).unwrap();
    drop(manager);

    let reopened = RecordManager::open(tmp.path(), 2).unwrap();
    assert!(reopened.wait_for_loads().is_empty());
    let names: Vec<String> = reopened
        .all()
        .iter()
        .map(|r| project::name_of(&r.root().unwrap()))
        .collect();
    assert_eq!(names, vec!["keep".to_string()]);
    assert!(reopened.find(keep.file_stem().unwrap()).is_some());
}
