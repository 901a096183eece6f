//! Loop driver: the per-loop state machine.
//!
//! The driver holds no loop state in memory. Every entry point loads the
//! latest record from the [`StateStore`], applies one transition, and saves
//! it back while holding the record's file lock, so independent host
//! callbacks (turn start in one process, turn end in another) see a
//! consistent record and never interleave.
//!
//! # Architecture
//!
//! - [`turn`] - turn start, turn end and cancellation
//! - [`commands`] - user commands and external counters
//! - [`events`] - [`HostEvent`] dispatch onto the entry points above
//!
//! # Example
//!
//! ```rust,ignore
//! use ralph_loop::r#loop::driver::{LoopDriver, TurnOutput, TurnStart};
//! use ralph_loop::r#loop::state::NewLoop;
//!
//! let driver = LoopDriver::open(project_dir)?;
//! driver.create(NewLoop::new("auth", "TASKS.md").with_max_iterations(10))?;
//!
//! if let TurnStart::Dispatch(plan) = driver.on_turn_start("auth")? {
//!     let output = agent.run_turn(&plan.prompt).await?;
//!     driver.on_turn_end("auth", TurnOutput::Text(output))?;
//! }
//! ```

mod commands;
mod events;
mod turn;

pub use commands::{HintScope, LoopOverview};
pub use events::{EventOutcome, HostEvent};
pub use turn::{TurnEnd, TurnOutput, TurnPlan, TurnReport, TurnStart};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::debug;

use super::state::LoopState;
use super::struggle::StruggleDetector;
use crate::config::Settings;
use crate::error::Result;
use crate::prompt::{PromptRenderer, PromptTemplates};
use crate::store::{RecordLock, StateStore};

/// In-process mutexes keyed by loop name.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn get(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Context value passed to every loop operation.
///
/// Cloning is cheap; clones share the keyed locks.
#[derive(Debug, Clone)]
pub struct LoopDriver {
    project_dir: PathBuf,
    store: StateStore,
    settings: Arc<Settings>,
    renderer: Arc<PromptRenderer>,
    detector: StruggleDetector,
    locks: Arc<KeyedLocks>,
}

impl LoopDriver {
    /// Create a driver from explicit parts.
    #[must_use]
    pub fn new(
        project_dir: impl AsRef<Path>,
        store: StateStore,
        settings: Settings,
        renderer: PromptRenderer,
    ) -> Self {
        let detector = StruggleDetector::new(settings.struggle_threshold);
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
            store,
            settings: Arc::new(settings),
            renderer: Arc::new(renderer),
            detector,
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    /// Open the driver for a project using its settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings or template overrides cannot be read.
    pub fn open(project_dir: impl AsRef<Path>) -> Result<Self> {
        let project_dir = project_dir.as_ref();
        let settings = Settings::load(project_dir)?;
        Self::with_settings(project_dir, settings)
    }

    /// Open the driver for a project with already-resolved settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or template overrides
    /// cannot be read.
    pub fn with_settings(project_dir: impl AsRef<Path>, settings: Settings) -> Result<Self> {
        let project_dir = project_dir.as_ref();
        settings.validate()?;

        let templates = match settings.resolved_templates_dir(project_dir) {
            Some(dir) => PromptTemplates::load_or_defaults(dir)?,
            None => PromptTemplates::with_defaults(),
        };

        Ok(Self::new(
            project_dir,
            StateStore::for_project(project_dir),
            settings,
            PromptRenderer::new(templates),
        ))
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn renderer(&self) -> &PromptRenderer {
        &self.renderer
    }

    #[must_use]
    pub fn detector(&self) -> StruggleDetector {
        self.detector
    }

    /// Resolve a loop's task file against the project directory.
    #[must_use]
    pub fn task_path(&self, state: &LoopState) -> PathBuf {
        if state.task_file.is_absolute() {
            state.task_file.clone()
        } else {
            self.project_dir.join(&state.task_file)
        }
    }

    /// Read the task file, `None` when it does not exist.
    pub(crate) fn read_task(&self, state: &LoopState) -> Option<String> {
        self.store.try_read_text(&self.task_path(state))
    }

    /// Load-modify-save under the per-name locks.
    ///
    /// The in-process mutex orders threads sharing this driver; the record
    /// lock orders everything else, other processes included. The record
    /// is written only if `f` changed it. `f` decides whether `updated_at`
    /// moves.
    pub(crate) fn update<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut LoopState) -> Result<T>,
    ) -> Result<T> {
        self.locked(name, |record| {
            let mut state = record.load()?;
            let before = state.clone();
            let value = f(&mut state)?;

            if state != before {
                record.save(&state)?;
            } else {
                debug!("Loop '{}' unchanged, skipping save", name);
            }
            Ok(value)
        })
    }

    /// Run `f` while holding both per-name locks, without loading a record.
    pub(crate) fn locked<T>(
        &self,
        name: &str,
        f: impl FnOnce(&RecordLock<'_>) -> Result<T>,
    ) -> Result<T> {
        let lock = self.locks.get(name);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let record = self.store.lock(name)?;
        f(&record)
    }
}

/// Hex SHA-256 of task file text, recorded in iteration history.
#[must_use]
pub fn task_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
