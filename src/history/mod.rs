//! Chat history persistence
//!
//! The engine saves the active thread after every settled turn and the
//! front end restores threads the user navigates back to. `FileHistory`
//! keeps one pretty-printed JSON file per thread so saved chats stay
//! greppable and hand-editable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::core::{ChatThread, HistoryError};

/// History collaborator consumed by the engine and the front end
pub trait ChatHistory: Send + Sync {
    /// Persist a thread, overwriting any previous save with the same id
    fn save_chat(&self, thread: &ChatThread) -> Result<(), HistoryError>;

    /// Load a saved thread by id
    fn restore_chat(&self, id: &str) -> Result<ChatThread, HistoryError>;

    /// All saved threads, most recently updated first
    fn list(&self) -> Result<Vec<ChatThread>, HistoryError>;

    /// Delete a saved thread
    fn remove(&self, id: &str) -> Result<(), HistoryError>;
}

/// One JSON file per thread under a root directory
pub struct FileHistory {
    root: PathBuf,
}

impl FileHistory {
    /// Open (and create if needed) a history root
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Default per-user location: `<data_dir>/ripple/chats`
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ripple")
            .join("chats")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }
}

impl ChatHistory for FileHistory {
    fn save_chat(&self, thread: &ChatThread) -> Result<(), HistoryError> {
        let mut thread = thread.clone();
        thread.updated_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(&thread)?;
        std::fs::write(self.path_for(&thread.id), content)?;
        Ok(())
    }

    fn restore_chat(&self, id: &str) -> Result<ChatThread, HistoryError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(HistoryError::NotFound(id.to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn list(&self) -> Result<Vec<ChatThread>, HistoryError> {
        let mut threads = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<ChatThread>(&content) {
                Ok(thread) => threads.push(thread),
                Err(err) => {
                    tracing::warn!("skipping undecodable chat file {}: {}", path.display(), err);
                }
            }
        }
        threads.sort_by(|a, b| {
            let a_at = a.updated_at.or(a.created_at);
            let b_at = b.updated_at.or(b.created_at);
            b_at.cmp(&a_at)
        });
        Ok(threads)
    }

    fn remove(&self, id: &str) -> Result<(), HistoryError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(HistoryError::NotFound(id.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}

/// In-memory history for embedders and tests that need no disk
#[derive(Default)]
pub struct MemoryHistory {
    threads: Mutex<HashMap<String, ChatThread>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatHistory for MemoryHistory {
    fn save_chat(&self, thread: &ChatThread) -> Result<(), HistoryError> {
        self.threads
            .lock()
            .unwrap()
            .insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    fn restore_chat(&self, id: &str) -> Result<ChatThread, HistoryError> {
        self.threads
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ChatThread>, HistoryError> {
        Ok(self.threads.lock().unwrap().values().cloned().collect())
    }

    fn remove(&self, id: &str) -> Result<(), HistoryError> {
        self.threads
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }
}
