//! Test fixtures for creating reproducible test environments.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Settings;
use crate::r#loop::driver::LoopDriver;

/// A temporary project directory with a task file.
///
/// Automatically cleans up when dropped.
pub struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    /// Name of the task file every fixture writes.
    pub const TASK_FILE: &'static str = "TASKS.md";

    /// Create a project whose task file has the given content.
    ///
    /// # Panics
    ///
    /// Panics if the directory or file cannot be created.
    #[must_use]
    pub fn with_tasks(content: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::write(temp_dir.path().join(Self::TASK_FILE), content)
            .expect("Failed to write task file");
        Self { temp_dir }
    }

    /// A project with two open checklist items.
    #[must_use]
    pub fn two_open_tasks() -> Self {
        Self::with_tasks("# Tasks\n\n- [ ] first\n- [ ] second\n")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[must_use]
    pub fn task_path(&self) -> PathBuf {
        self.path().join(Self::TASK_FILE)
    }

    /// Overwrite the task file.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub fn write_tasks(&self, content: &str) {
        std::fs::write(self.task_path(), content).expect("Failed to write task file");
    }

    /// Driver with default settings.
    ///
    /// # Panics
    ///
    /// Panics if the driver cannot be opened.
    #[must_use]
    pub fn driver(&self) -> LoopDriver {
        self.driver_with(Settings::default())
    }

    /// Driver with the given settings.
    ///
    /// # Panics
    ///
    /// Panics if the settings are invalid.
    #[must_use]
    pub fn driver_with(&self, settings: Settings) -> LoopDriver {
        LoopDriver::with_settings(self.path(), settings).expect("Failed to open driver")
    }
}
