//! Affinity store
//!
//! Session-scoped key/value storage for the sticky node of each category.
//! Entries are created lazily, overwritten on rotation and only disappear
//! with the session itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bkc_common::Category;

/// Storage key of the sticky node for `category`
pub fn affinity_key(category: Category) -> String {
    format!("bkc_api_base_{}", category.key())
}

pub trait AffinityStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// In-memory store living exactly as long as the client session
#[derive(Debug, Default)]
pub struct SessionAffinityStore {
    entries: DashMap<String, String>,
}

impl SessionAffinityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AffinityStore for SessionAffinityStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    session_id: String,
    entries: HashMap<String, String>,
}

/// File-backed store that survives client restarts within one session.
/// A file written by a different session id is ignored and overwritten.
#[derive(Debug)]
pub struct FileAffinityStore {
    path: PathBuf,
    session_id: String,
    entries: RwLock<HashMap<String, String>>,
}

impl FileAffinityStore {
    pub fn open(path: impl AsRef<Path>, session_id: impl Into<String>) -> Self {
        let path = path.as_ref().to_path_buf();
        let session_id = session_id.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SessionFile>(&raw) {
                Ok(file) if file.session_id == session_id => {
                    debug!(path = %path.display(), entries = file.entries.len(), "Restored session affinity");
                    file.entries
                }
                Ok(_) => {
                    debug!(path = %path.display(), "Session file belongs to another session, starting fresh");
                    HashMap::new()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt session file, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            session_id,
            entries: RwLock::new(entries),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let file = SessionFile {
            session_id: self.session_id.clone(),
            entries: entries.clone(),
        };
        let result = serde_json::to_string(&file)
            .map_err(std::io::Error::from)
            .and_then(|raw| std::fs::write(&self.path, raw));

        if let Err(e) = result {
            // The in-memory copy stays authoritative for this process
            warn!(path = %self.path.display(), error = %e, "Failed to persist session affinity");
        }
    }
}

impl AffinityStore for FileAffinityStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }
}
