use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::io::atomic::to_json_bytes;
use crate::io::fs::{FileSystem, RealFs};
use crate::io::pool::{Spawner, WorkerPool};
use crate::io::record::{Record, RecordError, RecordState};
use crate::model::map::ObservableMap;
use crate::model::observable::{Signal, Subscription, lock};
use crate::model::project;

const EXTENSION: &str = "json";

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("a project with uid {0} already exists")]
    DuplicateUid(String),
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("{path} was already gone")]
    MissingFile { path: PathBuf },
    #[error("{path} is not managed here")]
    NotRegistered { path: PathBuf },
    #[error("could not encode new project: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// A record that could not be loaded, as reported by
/// [`RecordManager::wait_for_loads`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Owns every [`Record`] under one data directory.
///
/// Opening enumerates `*.json` files and starts loading all of them on the
/// worker pool at once. [`all`](Self::all) lists records as they finish
/// loading, and each one is announced through [`on_created`](Self::on_created).
pub struct RecordManager {
    data_dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    spawner: Spawner,
    records: Mutex<Vec<Record>>,
    created: Signal<Record>,
    removed: Signal<Record>,
    // Dropped last, so queued saves finish before the workers are joined.
    pool: WorkerPool,
}

impl RecordManager {
    /// Open `data_dir` on the local filesystem, creating it if missing.
    pub fn open(data_dir: impl Into<PathBuf>, workers: usize) -> Result<Self, ManagerError> {
        Self::with_fs(data_dir, workers, Arc::new(RealFs))
    }

    pub fn with_fs(
        data_dir: impl Into<PathBuf>,
        workers: usize,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, ManagerError> {
        let data_dir = data_dir.into();
        let pool = WorkerPool::new(workers).map_err(|e| ManagerError::Io {
            path: data_dir.clone(),
            source: e,
        })?;
        let manager = RecordManager {
            spawner: pool.spawner(),
            data_dir,
            fs,
            records: Mutex::new(Vec::new()),
            created: Signal::new(),
            removed: Signal::new(),
            pool,
        };
        manager.discover()?;
        Ok(manager)
    }

    /// Enumerate the data directory and start loading every file found.
    fn discover(&self) -> Result<(), ManagerError> {
        let started = Instant::now();
        self.fs
            .create_dir_all(&self.data_dir)
            .map_err(|e| self.io_error(&self.data_dir, e))?;
        let files = self
            .fs
            .list_files(&self.data_dir, EXTENSION)
            .map_err(|e| self.io_error(&self.data_dir, e))?;

        let mut discovered = Vec::with_capacity(files.len());
        for path in files {
            let record = Record::new(path, Arc::clone(&self.fs), self.spawner.clone());
            let weak = record.downgrade();
            let created = self.created.clone();
            record
                .on_loaded(move || {
                    if let Some(record) = weak.upgrade() {
                        created.emit(&record);
                    }
                })
                .detach();
            discovered.push(record);
        }
        lock(&self.records).extend(discovered.iter().cloned());

        // Loads start only after registration, so every `created` event
        // refers to a record that `all()` can already see.
        for record in &discovered {
            record.load();
        }
        tracing::info!(
            dir = %self.data_dir.display(),
            count = discovered.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discovered projects"
        );
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    /// Create a new top-level project and its file.
    ///
    /// The file is written before the record is opened, and the record is
    /// registered only once it has loaded.
    pub fn create(&self, name: &str, icon: &str) -> Result<Record, ManagerError> {
        let uid = project::generate_uid();
        let path = self.data_dir.join(format!("{uid}.{EXTENSION}"));
        if lock(&self.records).iter().any(|r| r.path() == path) {
            return Err(ManagerError::DuplicateUid(uid));
        }

        let bytes = to_json_bytes(&project::new_document(name, icon, &uid))?;
        self.fs.create_new(&path, &bytes).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                ManagerError::DuplicateUid(uid.clone())
            } else {
                self.io_error(&path, e)
            }
        })?;

        let record = Record::open(path, Arc::clone(&self.fs), self.spawner.clone());
        record.root()?;
        lock(&self.records).push(record.clone());
        tracing::info!(%uid, name, "project created");
        self.created.emit(&record);
        Ok(record)
    }

    /// Delete a record's file and drop it from the registry.
    ///
    /// A file that is already gone is still unregistered, but reported as
    /// [`ManagerError::MissingFile`]. Any other delete failure leaves the
    /// record registered and saving as before.
    pub fn remove(&self, record: &Record) -> Result<(), ManagerError> {
        if !lock(&self.records).contains(record) {
            return Err(ManagerError::NotRegistered {
                path: record.path().to_path_buf(),
            });
        }

        // The load must not read a deleted file, and a save landing after
        // the delete would bring the file back.
        record.wait_loaded();
        record.retire();
        match self.fs.remove(record.path()) {
            Ok(()) => {
                self.unregister(record);
                tracing::info!(path = %record.path().display(), "project removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %record.path().display(), "file already deleted");
                self.unregister(record);
                Err(ManagerError::MissingFile {
                    path: record.path().to_path_buf(),
                })
            }
            Err(e) => {
                tracing::error!(path = %record.path().display(), error = %e, "could not delete");
                record.reinstate();
                Err(self.io_error(record.path(), e))
            }
        }
    }

    fn unregister(&self, record: &Record) {
        lock(&self.records).retain(|r| r != record);
        self.removed.emit(record);
    }

    /// Loaded records in discovery order, then creation order. Never
    /// blocks: records still loading show up once they have loaded.
    pub fn all(&self) -> Vec<Record> {
        self.registered()
            .into_iter()
            .filter(Record::is_loaded)
            .collect()
    }

    /// Every record not known to have failed, including those still loading.
    fn registered(&self) -> Vec<Record> {
        let mut records = lock(&self.records);
        records.retain(|r| r.state() != RecordState::Failed);
        records.clone()
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The record whose root project has `uid`. Blocks on records still
    /// loading.
    pub fn find(&self, uid: &str) -> Option<Record> {
        self.registered().into_iter().find(|record| {
            record
                .root()
                .map(|root| project::uid_of(&root) == uid)
                .unwrap_or(false)
        })
    }

    /// The project or sub-project with `uid`, with the record that holds it.
    /// Blocks on records still loading.
    pub fn find_node(&self, uid: &str) -> Option<(Record, ObservableMap)> {
        self.registered().into_iter().find_map(|record| {
            let root = record.root().ok()?;
            let node = project::find_by_uid(&root, uid)?;
            Some((record, node))
        })
    }

    /// Block until every record has loaded or failed. Failed records are
    /// evicted and returned.
    pub fn wait_for_loads(&self) -> Vec<LoadFailure> {
        let records = lock(&self.records).clone();
        let failures: Vec<LoadFailure> = records
            .iter()
            .filter(|r| r.wait_loaded() == RecordState::Failed)
            .map(|r| LoadFailure {
                path: r.path().to_path_buf(),
                reason: r.load_error().unwrap_or_default(),
            })
            .collect();
        if !failures.is_empty() {
            lock(&self.records).retain(|r| r.state() != RecordState::Failed);
            tracing::warn!(count = failures.len(), "projects skipped after failed load");
        }
        failures
    }

    /// Write every dirty record now. Returns the first error after
    /// attempting all of them.
    pub fn flush_all(&self) -> Result<(), ManagerError> {
        let records = lock(&self.records).clone();
        let mut first_error = None;
        for record in &records {
            if let Err(e) = record.flush() {
                tracing::error!(path = %record.path().display(), error = %e, "flush failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Flush, forget every record, and enumerate the directory again.
    ///
    /// Handles to the old records stay valid but are no longer saved.
    pub fn reload(&self) -> Result<(), ManagerError> {
        self.flush_all()?;
        let old = std::mem::take(&mut *lock(&self.records));
        for record in &old {
            record.retire();
            self.removed.emit(record);
        }
        self.discover()
    }

    /// Fires for every record that becomes usable: each discovered record
    /// once it has loaded, and each new record from [`create`](Self::create).
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_created(&self, f: impl Fn(&Record) + Send + Sync + 'static) -> Subscription {
        self.created.subscribe(f)
    }

    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn on_removed(&self, f: impl Fn(&Record) + Send + Sync + 'static) -> Subscription {
        self.removed.subscribe(f)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> ManagerError {
        ManagerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Drop for RecordManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            tracing::error!(error = %e, "unsaved changes lost on shutdown");
        }
    }
}
