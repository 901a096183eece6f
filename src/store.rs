//! Loop state persistence with atomic file-based storage.
//!
//! One JSON record per loop name under `.ralph/loops/<name>.json`.
//! Every save writes a temporary file under an exclusive lock and renames
//! it over the record, so readers never observe a partial write. There is
//! no cache: every load reads the file.
//!
//! [`StateStore::lock`] holds the exclusive lock across a whole
//! load-modify-save, which is what serializes writers in different
//! processes.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{LoopError, Result};
use crate::r#loop::state::{validate_name, LoopState, LOOP_STATE_VERSION};

/// Record file extension.
const RECORD_EXT: &str = "json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// File-backed store of loop state records.
#[derive(Debug, Clone)]
pub struct StateStore {
    /// Directory where loop records are stored.
    dir: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Creates the store for a project's `.ralph/loops` directory.
    #[must_use]
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(Settings::loops_dir(project_dir))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to a loop's record.
    #[must_use]
    pub fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXT}"))
    }

    fn tmp_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXT}{TMP_SUFFIX}"))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXT}{LOCK_SUFFIX}"))
    }

    /// Checks if a record exists for `name`.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).exists()
    }

    /// Takes the exclusive record lock for `name`, creating the store
    /// directory if needed.
    ///
    /// The lock is held until the returned guard is dropped. Other
    /// processes calling [`load`](Self::load), [`save`](Self::save) or
    /// `lock` for the same name block until then.
    ///
    /// # Errors
    ///
    /// `InvalidName`, or an I/O or `Lock` failure.
    pub fn lock(&self, name: &str) -> Result<RecordLock<'_>> {
        validate_name(name)?;
        fs::create_dir_all(&self.dir)?;

        let lock_path = self.lock_path(name);
        let file = File::create(&lock_path)?;
        FileExt::lock_exclusive(&file).map_err(|e| LoopError::Lock {
            path: lock_path.clone(),
            message: e.to_string(),
        })?;
        debug!("Locked record '{}'", name);

        Ok(RecordLock {
            store: self,
            name: name.to_string(),
            _file: file,
        })
    }

    /// Loads the latest persisted state for `name`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no record exists, `CorruptState` when the record
    /// cannot be parsed, `IncompatibleVersion` when it was written by a
    /// newer schema. Corrupt records are left in place.
    pub fn load(&self, name: &str) -> Result<LoopState> {
        validate_name(name)?;

        let lock_path = self.lock_path(name);
        let _guard = if lock_path.exists() {
            let lock_file = File::open(&lock_path)?;
            FileExt::lock_shared(&lock_file).map_err(|e| LoopError::Lock {
                path: lock_path.clone(),
                message: e.to_string(),
            })?;
            Some(lock_file)
        } else {
            None
        };

        self.read_record(name)
    }

    /// Saves a state record atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory, lock, temporary file, or rename
    /// fails. The previous record is untouched in that case.
    pub fn save(&self, state: &LoopState) -> Result<()> {
        self.lock(&state.name)?.save(state)
    }

    fn read_record(&self, name: &str) -> Result<LoopState> {
        let path = self.record_path(name);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoopError::not_found(name))
            }
            Err(e) => return Err(e.into()),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let corrupt = |e: serde_json::Error| LoopError::CorruptState {
            path: path.clone(),
            message: e.to_string(),
        };

        let probe: VersionProbe = serde_json::from_str(&contents).map_err(corrupt)?;
        if probe.version > LOOP_STATE_VERSION {
            return Err(LoopError::IncompatibleVersion {
                found: probe.version,
                supported: LOOP_STATE_VERSION,
            });
        }

        let state: LoopState = serde_json::from_str(&contents).map_err(corrupt)?;
        if state.name != name {
            warn!(
                "Record {} names loop '{}'; using file name '{}'",
                path.display(),
                state.name,
                name
            );
        }
        Ok(state)
    }

    fn write_record(&self, state: &LoopState) -> Result<()> {
        let tmp_path = self.tmp_path(&state.name);
        let json = serde_json::to_string_pretty(state)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.record_path(&state.name))?;
        debug!(
            "Saved loop '{}' at iteration {}",
            state.name, state.iteration
        );
        Ok(())
    }

    /// Names of all stored loops, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Moves a loop's record into `archive/`, freeing the name.
    ///
    /// This is the only way a record leaves the store.
    ///
    /// # Errors
    ///
    /// `NotFound` when no record exists, or an I/O error from the move.
    pub fn archive(&self, name: &str) -> Result<PathBuf> {
        self.lock(name)?.archive()
    }

    fn move_to_archive(&self, name: &str) -> Result<PathBuf> {
        let path = self.record_path(name);
        if !path.exists() {
            return Err(LoopError::not_found(name));
        }

        let archive_dir = self.dir.join("archive");
        fs::create_dir_all(&archive_dir)?;
        let target = archive_dir.join(format!(
            "{}-{}.{RECORD_EXT}",
            name,
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ));

        // The lock file stays: a waiter may already hold it open.
        fs::rename(&path, &target)?;
        Ok(target)
    }

    /// Reads a text file, returning `None` if it is missing or unreadable.
    ///
    /// A missing task file is a normal condition for callers, never an error.
    #[must_use]
    pub fn try_read_text(&self, path: &Path) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Exclusive hold on one loop's record.
///
/// Reads and writes through the guard skip the per-call locking of
/// [`StateStore::load`] and [`StateStore::save`], so a whole
/// load-modify-save runs under one lock. Dropping the guard closes the
/// lock file, which releases the lock.
#[derive(Debug)]
pub struct RecordLock<'a> {
    store: &'a StateStore,
    name: String,
    _file: File,
}

impl RecordLock<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.store.exists(&self.name)
    }

    /// Load the locked record.
    ///
    /// # Errors
    ///
    /// Same as [`StateStore::load`].
    pub fn load(&self) -> Result<LoopState> {
        self.store.read_record(&self.name)
    }

    /// Save the locked record atomically.
    ///
    /// # Errors
    ///
    /// `InvalidName` if `state` belongs to another loop, or a write failure.
    pub fn save(&self, state: &LoopState) -> Result<()> {
        if state.name != self.name {
            return Err(LoopError::InvalidName {
                name: state.name.clone(),
                reason: format!("record lock is held for '{}'", self.name),
            });
        }
        self.store.write_record(state)
    }

    /// Archive the locked record.
    ///
    /// # Errors
    ///
    /// Same as [`StateStore::archive`].
    pub fn archive(&self) -> Result<PathBuf> {
        self.store.move_to_archive(&self.name)
    }
}
