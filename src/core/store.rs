//! Whole-snapshot persistence for [`ConversationState`].
//!
//! A store round-trips one opaque JSON blob. `load` returning `None` means
//! nothing has been saved yet; the caller substitutes the default state.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use crate::core::error::StoreError;
use crate::core::state::ConversationState;

/// Fixed blob name used by the file backend.
pub const STATE_FILE_NAME: &str = "chat_state.json";

pub trait PersistentStore: Send {
    fn load(&self) -> Result<Option<ConversationState>, StoreError>;

    /// Overwrite the stored snapshot. The mutation that triggered the save
    /// is not durable until this returns `Ok`.
    fn save(&self, state: &ConversationState) -> Result<(), StoreError>;
}

/// JSON file backend. Writes go to a temp file in the same directory and are
/// renamed over the target, so a crash mid-write leaves the old snapshot.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform data directory.
    pub fn default_location() -> Result<Self, StoreError> {
        let proj_dirs = ProjectDirs::from("org", "chatdeck", "chatdeck").ok_or_else(|| {
            StoreError::Io("Failed to determine data directory".to_string())
        })?;
        Ok(Self::new(proj_dirs.data_dir().join(STATE_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentStore for FileStore {
    fn load(&self) -> Result<Option<ConversationState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&contents)?;
        Ok(Some(state))
    }

    fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = serde_json::to_vec(state)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new_in(".")?,
        };

        temp_file.write_all(&contents)?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(&self.path)
            .map_err(|err| StoreError::Io(err.error.to_string()))?;
        Ok(())
    }
}

/// In-memory backend holding the serialized blob, for embedding and tests.
/// Clones share the same blob.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blob: Arc<Mutex<Option<Vec<u8>>>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: &ConversationState) -> Result<Self, StoreError> {
        let store = Self::new();
        store.save(state)?;
        Ok(store)
    }

    /// Number of bytes currently stored, if anything was saved.
    pub fn stored_len(&self) -> Option<usize> {
        self.lock_blob().as_ref().map(Vec::len)
    }

    /// Make every following `save` fail until switched back.
    pub fn set_fail_saves(&self, fail: bool) {
        *self
            .fail_saves
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fail;
    }

    fn lock_blob(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        self.blob
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> Result<Option<ConversationState>, StoreError> {
        match self.lock_blob().as_ref() {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let failing = *self
            .fail_saves
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if failing {
            return Err(StoreError::Io("save rejected".to_string()));
        }
        let bytes = serde_json::to_vec(state)?;
        *self.lock_blob() = Some(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Project;
    use tempfile::tempdir;

    fn sample_state() -> ConversationState {
        ConversationState {
            api_key: "sk-test".into(),
            projects: vec![Project {
                id: "p1".into(),
                name: "Research".into(),
            }],
            ..ConversationState::default()
        }
    }

    #[test]
    fn file_store_returns_none_before_first_save() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join(STATE_FILE_NAME));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_creates_parent_directories_and_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join(STATE_FILE_NAME);
        let store = FileStore::new(&path);

        store.save(&sample_state()).unwrap();
        let mut updated = sample_state();
        updated.api_key = "sk-other".into();
        store.save(&updated).unwrap();

        assert_eq!(store.load().unwrap(), Some(updated));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != STATE_FILE_NAME)
            .collect();
        assert!(leftovers.is_empty(), "temp files should be renamed away");
    }

    #[test]
    fn file_store_reports_corrupt_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        fs::write(&path, "{not json").unwrap();
        let err = FileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn memory_store_clones_share_the_blob() {
        let store = MemoryStore::new();
        let view = store.clone();
        assert!(view.load().unwrap().is_none());

        store.save(&sample_state()).unwrap();
        assert_eq!(view.load().unwrap(), Some(sample_state()));
        assert!(view.stored_len().unwrap() > 0);
    }

    #[test]
    fn memory_store_can_simulate_failed_saves() {
        let store = MemoryStore::with_state(&sample_state()).unwrap();
        store.set_fail_saves(true);
        assert!(store.save(&ConversationState::default()).is_err());
        store.set_fail_saves(false);
        assert_eq!(store.load().unwrap(), Some(sample_state()));
    }
}
