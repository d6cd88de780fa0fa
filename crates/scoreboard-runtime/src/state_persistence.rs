#![forbid(unsafe_code)]

//! Viewer state persistence across restarts.
//!
//! Only the engine's own requests are persisted: whether its owner hid or
//! disabled a viewer, and which template it forced. Requests from other
//! components are transient by nature and are never written.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        PanelContext                          │
//! │   - seed(): load_all() → owner's records                     │
//! │   - flush(): owner's records → save_all()                    │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      StorageBackend                          │
//! │   - MemoryStorage: in-memory (testing, ephemeral)            │
//! │   - FileStorage: JSON file (requires state-persistence)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Invariants
//!
//! 1. **Graceful degradation**: storage failures never panic; operations return `Result`.
//! 2. **Atomic writes**: file storage writes a temporary file and renames it.
//! 3. **Partial load tolerance**: entries with an unparsable viewer id are skipped.
//! 4. **Replace, not merge**: `save_all` replaces everything previously stored.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `StorageError::Io` | File I/O failure | Returns error, in-memory state unaffected |
//! | `StorageError::Serialization` | JSON encode/decode | Returns error |
//! | `StorageError::Corruption` | Poisoned lock, bad format | Returns error |
//! | Unknown format version | File from another release | Treated as empty, logged |
//!
//! # Feature Gates
//!
//! - `state-persistence`: enables [`FileStorage`] with JSON serialization.
//!   Without this feature, only [`MemoryStorage`] is available.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use scoreboard_core::ViewerId;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during state storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error during file operations.
    Io(std::io::Error),
    /// Serialization or deserialization error.
    #[cfg(feature = "state-persistence")]
    Serialization(String),
    /// Storage is corrupted or in an invalid state.
    Corruption(String),
    /// Backend is not available.
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "state-persistence")]
            StorageError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StorageError::Corruption(msg) => write!(f, "storage corruption: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// ─────────────────────────────────────────────────────────────────────────────
// Stored data
// ─────────────────────────────────────────────────────────────────────────────

/// The owner's persisted requests for one viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedViewer {
    /// The owner hid the viewer.
    pub hidden: bool,
    /// The owner disabled the viewer.
    pub disabled: bool,
    /// Template name the owner forced, if any.
    pub template: Option<String>,
}

impl PersistedViewer {
    /// Whether there is nothing worth storing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.hidden && !self.disabled && self.template.is_none()
    }
}

/// Persisted state for every viewer, ordered by viewer id.
pub type PersistedState = BTreeMap<ViewerId, PersistedViewer>;

// ─────────────────────────────────────────────────────────────────────────────
// Storage Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for pluggable viewer state storage.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait StorageBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Load all stored viewers. Returns an empty map on first run.
    fn load_all(&self) -> StorageResult<PersistedState>;

    /// Replace all stored viewers.
    fn save_all(&self, state: &PersistedState) -> StorageResult<()>;

    /// Remove all stored viewers.
    fn clear(&self) -> StorageResult<()>;

    /// Check if the backend is available and functional.
    fn is_available(&self) -> bool {
        true
    }
}

impl<S: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load_all(&self) -> StorageResult<PersistedState> {
        (**self).load_all()
    }

    fn save_all(&self, state: &PersistedState) -> StorageResult<()> {
        (**self).save_all(state)
    }

    fn clear(&self) -> StorageResult<()> {
        (**self).clear()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Storage (always available)
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory storage backend for testing and ephemeral state.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<PersistedState>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create memory storage pre-populated with viewers.
    #[must_use]
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            data: RwLock::new(state),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "MemoryStorage"
    }

    fn load_all(&self) -> StorageResult<PersistedState> {
        let guard = self
            .data
            .read()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save_all(&self, state: &PersistedState) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        *guard = state.clone();
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        guard.clear();
        Ok(())
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.data.read().map(|g| g.len()).unwrap_or(0);
        f.debug_struct("MemoryStorage")
            .field("viewers", &count)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Storage (requires state-persistence feature)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "state-persistence")]
mod file_storage {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter, Write};
    use std::path::{Path, PathBuf};

    /// File format for stored state (JSON).
    #[derive(Serialize, Deserialize)]
    struct StateFile {
        format_version: u32,
        /// Viewer id (hyphenated) -> entry.
        viewers: BTreeMap<String, FileEntry>,
    }

    /// Serialized entry in the state file.
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct FileEntry {
        #[serde(default)]
        is_hidden: bool,
        #[serde(default)]
        is_disabled: bool,
        #[serde(default)]
        scoreboard: Option<String>,
    }

    impl StateFile {
        const FORMAT_VERSION: u32 = 1;
    }

    /// File-based storage backend using JSON.
    ///
    /// # File Format
    ///
    /// ```json
    /// {
    ///   "format_version": 1,
    ///   "viewers": {
    ///     "01234567-89ab-cdef-0011-223344556677": {
    ///       "isHidden": false,
    ///       "isDisabled": false,
    ///       "scoreboard": "lobby"
    ///     }
    ///   }
    /// }
    /// ```
    ///
    /// # Atomic Writes
    ///
    /// 1. Write to `{path}.tmp`
    /// 2. Flush and sync
    /// 3. Rename `{path}.tmp` -> `{path}`
    pub struct FileStorage {
        path: PathBuf,
    }

    impl FileStorage {
        /// Create a file storage at the given path.
        ///
        /// The file does not need to exist; it will be created on first save.
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }

        /// Path of the state file.
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn temp_path(&self) -> PathBuf {
            let mut tmp = self.path.clone();
            tmp.set_extension("json.tmp");
            tmp
        }
    }

    impl StorageBackend for FileStorage {
        fn name(&self) -> &str {
            "FileStorage"
        }

        fn load_all(&self) -> StorageResult<PersistedState> {
            if !self.path.exists() {
                return Ok(PersistedState::new());
            }

            let reader = BufReader::new(File::open(&self.path)?);
            let file: StateFile = serde_json::from_reader(reader).map_err(|e| {
                StorageError::Serialization(format!("failed to parse state file: {e}"))
            })?;

            if file.format_version != StateFile::FORMAT_VERSION {
                tracing::warn!(
                    stored = file.format_version,
                    expected = StateFile::FORMAT_VERSION,
                    "state file format version mismatch, ignoring stored state"
                );
                return Ok(PersistedState::new());
            }

            let mut state = PersistedState::new();
            for (key, entry) in file.viewers {
                let viewer: ViewerId = match key.parse() {
                    Ok(viewer) => viewer,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "skipping stored entry");
                        continue;
                    }
                };
                state.insert(
                    viewer,
                    PersistedViewer {
                        hidden: entry.is_hidden,
                        disabled: entry.is_disabled,
                        template: entry.scoreboard,
                    },
                );
            }
            Ok(state)
        }

        fn save_all(&self, state: &PersistedState) -> StorageResult<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }

            let file = StateFile {
                format_version: StateFile::FORMAT_VERSION,
                viewers: state
                    .iter()
                    .map(|(viewer, v)| {
                        (
                            viewer.to_string(),
                            FileEntry {
                                is_hidden: v.hidden,
                                is_disabled: v.disabled,
                                scoreboard: v.template.clone(),
                            },
                        )
                    })
                    .collect(),
            };

            let tmp_path = self.temp_path();
            {
                let mut writer = BufWriter::new(File::create(&tmp_path)?);
                serde_json::to_writer_pretty(&mut writer, &file).map_err(|e| {
                    StorageError::Serialization(format!("failed to serialize state: {e}"))
                })?;
                writer.flush()?;
                writer.get_ref().sync_all()?;
            }
            fs::rename(&tmp_path, &self.path)?;

            tracing::debug!(
                path = %self.path.display(),
                viewers = state.len(),
                "saved viewer state"
            );
            Ok(())
        }

        fn clear(&self) -> StorageResult<()> {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            Ok(())
        }

        fn is_available(&self) -> bool {
            match self.path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    fs::create_dir_all(parent).is_ok()
                        && fs::metadata(parent).is_ok_and(|m| !m.permissions().readonly())
                }
                _ => true,
            }
        }
    }

    impl fmt::Debug for FileStorage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FileStorage")
                .field("path", &self.path)
                .finish()
        }
    }
}

#[cfg(feature = "state-persistence")]
pub use file_storage::FileStorage;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedState {
        let mut state = PersistedState::new();
        state.insert(
            ViewerId::from_u128(7),
            PersistedViewer {
                hidden: true,
                disabled: false,
                template: Some("lobby".into()),
            },
        );
        state
    }

    #[test]
    fn memory_storage_replaces_contents() {
        let storage = MemoryStorage::new();
        assert!(storage.load_all().unwrap().is_empty());

        storage.save_all(&sample()).unwrap();
        assert_eq!(storage.load_all().unwrap(), sample());

        storage.save_all(&PersistedState::new()).unwrap();
        assert!(storage.load_all().unwrap().is_empty());
    }

    #[test]
    fn memory_storage_clear() {
        let storage = MemoryStorage::with_state(sample());
        storage.clear().unwrap();
        assert!(storage.load_all().unwrap().is_empty());
        assert!(storage.is_available());
    }

    #[test]
    fn empty_entries() {
        assert!(PersistedViewer::default().is_empty());
        assert!(!sample().values().all(PersistedViewer::is_empty));
    }

    #[test]
    fn shared_storage_sees_writes() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        let boxed: Box<dyn StorageBackend> = Box::new(storage.clone());
        boxed.save_all(&sample()).unwrap();
        assert_eq!(boxed.name(), "MemoryStorage");
        assert_eq!(storage.load_all().unwrap(), sample());
    }

    #[test]
    fn io_error_has_source() {
        let err: StorageError = std::io::Error::other("disk full").into();
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("disk full"));
    }
}
