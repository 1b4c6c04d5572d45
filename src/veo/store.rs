//! Task storage - remembers the last known status of each operation.
//!
//! The poller itself is stateless. Anything that wants to look a task up
//! later (the `tasks` command, a download after a restart) goes through a
//! [`TaskStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::VeoError;
use super::status::TaskStatus;

/// Last known state of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub status: TaskStatus,
    /// Seconds since the Unix epoch.
    pub updated_at: u64,
}

impl TaskRecord {
    pub fn new(handle: impl Into<String>, prompt: Option<String>, status: TaskStatus) -> Self {
        Self {
            handle: handle.into(),
            prompt,
            status,
            updated_at: unix_now(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Keyed storage for task records.
pub trait TaskStore: Send + Sync {
    fn get(&self, handle: &str) -> Result<Option<TaskRecord>, VeoError>;

    fn put(&self, record: &TaskRecord) -> Result<(), VeoError>;

    /// All records, most recently updated first.
    fn list(&self) -> Result<Vec<TaskRecord>, VeoError>;

    /// Replace the status of `handle`, keeping any stored prompt.
    fn update_status(&self, handle: &str, status: &TaskStatus) -> Result<(), VeoError> {
        let prompt = self.get(handle)?.and_then(|r| r.prompt);
        self.put(&TaskRecord::new(handle, prompt, status.clone()))
    }
}

fn newest_first(records: &mut [TaskRecord]) {
    records.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.handle.cmp(&b.handle))
    });
}

/// In-process store. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    records: RwLock<HashMap<String, TaskRecord>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn get(&self, handle: &str) -> Result<Option<TaskRecord>, VeoError> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(records.get(handle).cloned())
    }

    fn put(&self, record: &TaskRecord) -> Result<(), VeoError> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.insert(record.handle.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<TaskRecord>, VeoError> {
        let records = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut all: Vec<TaskRecord> = records.values().cloned().collect();
        newest_first(&mut all);
        Ok(all)
    }
}

/// Durable store keeping one JSON file per task.
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    /// Create a store in `dir`. Does not create the directory - call
    /// `ensure_dir_exists()` to create it.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default: ~/.cache/veo-studio/tasks/
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("veo-studio")
            .join("tasks")
    }

    /// Create a store in the default directory and ensure it exists.
    pub fn with_default_dir_initialized() -> Result<Self, VeoError> {
        Self::new_initialized(Self::default_dir())
    }

    pub fn new_initialized(dir: PathBuf) -> Result<Self, VeoError> {
        let store = Self::new(dir);
        store.ensure_dir_exists()?;
        Ok(store)
    }

    pub fn ensure_dir_exists(&self) -> Result<(), VeoError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file stem for a handle: first 16 bytes of its SHA-256.
    pub fn hash_handle(handle: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(handle.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    fn record_path(&self, handle: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::hash_handle(handle)))
    }
}

impl TaskStore for FileTaskStore {
    fn get(&self, handle: &str) -> Result<Option<TaskRecord>, VeoError> {
        let path = self.record_path(handle);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&self, record: &TaskRecord) -> Result<(), VeoError> {
        self.ensure_dir_exists()?;
        let path = self.record_path(&record.handle);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec_pretty(record)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<TaskRecord>, VeoError> {
        let mut records = Vec::new();

        if !self.dir.exists() {
            return Ok(records);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(VeoError::from)
                .and_then(|content| serde_json::from_str(&content).map_err(VeoError::from));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable task record {:?}: {}", path, e),
            }
        }

        newest_first(&mut records);
        Ok(records)
    }
}
