use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use serde::Deserialize;

use crate::io::atomic::to_json_bytes;
use crate::io::fs::FileSystem;
use crate::io::pool::Spawner;
use crate::model::map::ObservableMap;
use crate::model::observable::{Signal, Subscription, lock};
use crate::model::sync::populate_map;
use crate::model::value::ContainerError;

/// Error type for record loading and saving
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not encode {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path} does not contain a JSON object")]
    NotAnObject { path: PathBuf },
    #[error("{path} failed to load: {reason}")]
    LoadFailed { path: PathBuf, reason: String },
    #[error(transparent)]
    Container(#[from] ContainerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Created,
    Loading,
    Loaded,
    Failed,
}

/// Process-unique identity of a record, independent of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RecordId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

struct LoadStatus {
    state: RecordState,
    failure: Option<String>,
}

#[derive(Default)]
struct SaveState {
    dirty: bool,
    in_flight: bool,
    retired: bool,
}

struct RecordInner {
    id: RecordId,
    path: PathBuf,
    root: ObservableMap,
    fs: Arc<dyn FileSystem>,
    spawner: Spawner,
    load: Mutex<LoadStatus>,
    load_settled: Condvar,
    save: Mutex<SaveState>,
    save_idle: Condvar,
    root_link: Mutex<Option<Subscription>>,
    writes: AtomicU64,
    loaded: Signal<()>,
    load_failed: Signal<String>,
    saved: Signal<()>,
}

/// Handle to a record: one JSON data file plus its observable tree.
/// Clones share the same record.
///
/// Loading runs on the worker pool and [`Record::root`] blocks until it
/// settles. Any change reaching the root marks the record dirty and
/// schedules a save. At most one save is in flight; changes arriving during
/// it are picked up by one trailing write. A failed write leaves the record
/// dirty for the next change or [`Record::flush`] to retry.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

/// Non-owning handle, for callbacks stored on the record itself.
#[derive(Clone)]
pub struct WeakRecord {
    inner: Weak<RecordInner>,
}

impl WeakRecord {
    pub fn upgrade(&self) -> Option<Record> {
        self.inner.upgrade().map(|inner| Record { inner })
    }
}

impl Record {
    /// A record for `path` in the `Created` state; call [`load`](Self::load) to start.
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>, spawner: Spawner) -> Self {
        Record {
            inner: Arc::new(RecordInner {
                id: RecordId::next(),
                path: path.into(),
                root: ObservableMap::new(),
                fs,
                spawner,
                load: Mutex::new(LoadStatus {
                    state: RecordState::Created,
                    failure: None,
                }),
                load_settled: Condvar::new(),
                save: Mutex::new(SaveState::default()),
                save_idle: Condvar::new(),
                root_link: Mutex::new(None),
                writes: AtomicU64::new(0),
                loaded: Signal::new(),
                load_failed: Signal::new(),
                saved: Signal::new(),
            }),
        }
    }

    /// Create and immediately start loading.
    pub fn open(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>, spawner: Spawner) -> Self {
        let record = Record::new(path, fs, spawner);
        record.load();
        record
    }

    /// Start loading on the worker pool. Only the first call has any effect.
    pub fn load(&self) {
        {
            let mut status = lock(&self.inner.load);
            if status.state != RecordState::Created {
                return;
            }
            status.state = RecordState::Loading;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.spawner.spawn(move || inner.run_load());
    }

    pub fn id(&self) -> RecordId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakRecord {
        WeakRecord {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// File name without extension (the project uid for files we created).
    pub fn file_stem(&self) -> Option<&str> {
        self.inner.path.file_stem().and_then(|s| s.to_str())
    }

    pub fn state(&self) -> RecordState {
        lock(&self.inner.load).state
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == RecordState::Loaded
    }

    /// The loaded tree, blocking until loading settles. Starts loading
    /// if that has not happened yet.
    ///
    /// Do not call this from a thread that must stay responsive; subscribe
    /// with [`on_loaded`](Self::on_loaded) or use [`try_root`](Self::try_root).
    pub fn root(&self) -> Result<ObservableMap, RecordError> {
        self.load();
        let mut status = lock(&self.inner.load);
        while matches!(status.state, RecordState::Created | RecordState::Loading) {
            status = self
                .inner
                .load_settled
                .wait(status)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        match status.state {
            RecordState::Loaded => Ok(self.inner.root.clone()),
            _ => Err(RecordError::LoadFailed {
                path: self.inner.path.clone(),
                reason: status.failure.clone().unwrap_or_default(),
            }),
        }
    }

    /// The loaded tree, or `None` if loading has not succeeded (yet).
    pub fn try_root(&self) -> Option<ObservableMap> {
        self.is_loaded().then(|| self.inner.root.clone())
    }

    /// Why loading failed, if it did.
    pub fn load_error(&self) -> Option<String> {
        lock(&self.inner.load).failure.clone()
    }

    /// Block until loading has either succeeded or failed.
    pub fn wait_loaded(&self) -> RecordState {
        match self.root() {
            Ok(_) => RecordState::Loaded,
            Err(_) => self.state(),
        }
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_loaded(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.loaded.subscribe(move |_| f())
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_load_failed(&self, f: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        self.inner.load_failed.subscribe(move |reason: &String| f(reason))
    }

    /// Called after every successful write, on the thread that wrote.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_saved(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.saved.subscribe(move |_| f())
    }

    pub fn is_dirty(&self) -> bool {
        lock(&self.inner.save).dirty
    }

    /// Physical writes performed so far.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Block until no save is in flight.
    pub fn wait_idle(&self) {
        let mut save = lock(&self.inner.save);
        while save.in_flight {
            save = self
                .inner
                .save_idle
                .wait(save)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Wait for the in-flight save, then write synchronously if still dirty.
    pub fn flush(&self) -> Result<(), RecordError> {
        if self.inner.claim_save() {
            self.inner.drain_saves()
        } else {
            Ok(())
        }
    }

    /// Stop saving: waits for the in-flight save, and later changes are
    /// never written.
    pub fn retire(&self) {
        lock(&self.inner.save).retired = true;
        self.wait_idle();
        lock(&self.inner.root_link).take();
    }

    /// Undo [`retire`](Self::retire) after a deletion that did not happen.
    pub(crate) fn reinstate(&self) {
        lock(&self.inner.save).retired = false;
        if !self.is_loaded() {
            return;
        }
        let mut link = lock(&self.inner.root_link);
        if link.is_none() {
            *link = Some(self.inner.link_root());
        }
    }
}

impl RecordInner {
    fn run_load(self: Arc<Self>) {
        let result = self.read_document().and_then(|object| {
            populate_map(&self.root, object)?;
            Ok(())
        });

        match result {
            Ok(()) => {
                *lock(&self.root_link) = Some(self.link_root());
                {
                    let mut status = lock(&self.load);
                    status.state = RecordState::Loaded;
                }
                self.load_settled.notify_all();
                tracing::debug!(path = %self.path.display(), "loaded");
                self.loaded.emit(&());
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(path = %self.path.display(), error = %e, "load failed");
                {
                    let mut status = lock(&self.load);
                    status.state = RecordState::Failed;
                    status.failure = Some(reason.clone());
                }
                self.load_settled.notify_all();
                self.load_failed.emit(&reason);
            }
        }
    }

    /// Route root changes into dirty tracking.
    fn link_root(self: &Arc<Self>) -> Subscription {
        let weak = Arc::downgrade(self);
        self.root.on_changed(move || {
            if let Some(inner) = weak.upgrade() {
                inner.mark_dirty();
            }
        })
    }

    fn read_document(&self) -> Result<serde_json::Map<String, serde_json::Value>, RecordError> {
        let bytes = self.fs.read(&self.path).map_err(|e| RecordError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let json = parse_unbounded(&bytes).map_err(|e| RecordError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        match json {
            serde_json::Value::Object(object) => Ok(object),
            _ => Err(RecordError::NotAnObject {
                path: self.path.clone(),
            }),
        }
    }

    fn mark_dirty(self: &Arc<Self>) {
        {
            let mut save = lock(&self.save);
            if save.retired {
                return;
            }
            save.dirty = true;
            if save.in_flight {
                // The running save re-checks the flag when it finishes.
                return;
            }
            save.in_flight = true;
        }
        let inner = Arc::clone(self);
        self.spawner.spawn(move || {
            if let Err(e) = inner.drain_saves() {
                tracing::error!(path = %inner.path.display(), error = %e, "save failed; will retry on next change");
            }
        });
    }

    /// Wait for any running save, then take the save slot if there is work.
    fn claim_save(&self) -> bool {
        let mut save = lock(&self.save);
        while save.in_flight {
            save = self
                .save_idle
                .wait(save)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if save.dirty && !save.retired {
            save.in_flight = true;
            true
        } else {
            false
        }
    }

    /// Write until clean. The caller must hold the save slot; it is
    /// released on return.
    fn drain_saves(&self) -> Result<(), RecordError> {
        loop {
            {
                let mut save = lock(&self.save);
                if !save.dirty || save.retired {
                    save.in_flight = false;
                    drop(save);
                    self.save_idle.notify_all();
                    return Ok(());
                }
                save.dirty = false;
            }
            if let Err(e) = self.write_snapshot() {
                {
                    let mut save = lock(&self.save);
                    save.dirty = true;
                    save.in_flight = false;
                }
                self.save_idle.notify_all();
                return Err(e);
            }
            self.saved.emit(&());
        }
    }

    fn write_snapshot(&self) -> Result<(), RecordError> {
        let snapshot = self.root.to_json();
        let bytes = to_json_bytes(&snapshot).map_err(|e| RecordError::Encode {
            path: self.path.clone(),
            source: e,
        })?;
        self.fs
            .write(&self.path, &bytes)
            .map_err(|e| RecordError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(path = %self.path.display(), writes = n, "saved");
        Ok(())
    }
}

/// Parse JSON of any nesting depth, growing the stack on demand instead of
/// stopping at serde_json's default recursion limit.
fn parse_unbounded(bytes: &[u8]) -> serde_json::Result<serde_json::Value> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let value = serde_json::Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("state", &self.state())
            .finish()
    }
}
