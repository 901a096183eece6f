//! Host session: one loop's driver paired with its inactivity watchdog.
//!
//! Hosts that deliver hook callbacks feed every [`HostEvent`] through
//! [`HostSession::handle`]; activity signals rearm the watchdog and
//! waiting-for-user tools suspend it.

use tracing::warn;

use super::driver::{EventOutcome, HostEvent, LoopDriver, TurnEnd, TurnOutput, TurnStart};
use super::watchdog::InactivityWatchdog;
use crate::error::Result;

#[derive(Debug)]
pub struct HostSession {
    driver: LoopDriver,
    name: String,
    watchdog: Option<InactivityWatchdog>,
}

impl HostSession {
    /// Attach to a loop.
    ///
    /// The watchdog runs only when an inactivity timeout is configured and a
    /// tokio runtime is available.
    #[must_use]
    pub fn new(driver: LoopDriver, name: impl Into<String>) -> Self {
        let name = name.into();
        let watchdog = driver
            .settings()
            .inactivity_timeout()
            .and_then(|timeout| {
                if tokio::runtime::Handle::try_current().is_err() {
                    warn!("No async runtime; inactivity watchdog disabled for '{}'", name);
                    return None;
                }
                let fire_driver = driver.clone();
                let fire_name = name.clone();
                Some(InactivityWatchdog::spawn(timeout, move || {
                    // The check takes the record's file lock.
                    let driver = fire_driver.clone();
                    let name = fire_name.clone();
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = driver.on_inactivity_timeout(&name) {
                            warn!("Inactivity check for '{}' failed: {}", name, e);
                        }
                    });
                }))
            });

        Self {
            driver,
            name,
            watchdog,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn driver(&self) -> &LoopDriver {
        &self.driver
    }

    #[must_use]
    pub fn has_watchdog(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Handle one host event.
    ///
    /// # Errors
    ///
    /// Propagates the driver's error for the event.
    pub fn handle(&self, event: HostEvent) -> Result<EventOutcome> {
        if let Some(watchdog) = &self.watchdog {
            match &event {
                HostEvent::ToolCallStart { tool } if self.driver.settings().is_waiting_tool(tool) => {
                    watchdog.suspend();
                }
                HostEvent::ToolCallEnd { tool } if self.driver.settings().is_waiting_tool(tool) => {
                    watchdog.resume();
                }
                e if e.is_activity() => watchdog.touch(),
                _ => {}
            }
        }
        self.driver.handle(&self.name, event)
    }

    /// Start a turn and rearm the watchdog.
    ///
    /// # Errors
    ///
    /// See [`LoopDriver::on_turn_start`].
    pub fn turn_start(&self) -> Result<TurnStart> {
        self.touch();
        self.driver.on_turn_start(&self.name)
    }

    /// End the in-flight turn and rearm the watchdog.
    ///
    /// # Errors
    ///
    /// See [`LoopDriver::on_turn_end`].
    pub fn turn_end(&self, output: TurnOutput) -> Result<TurnEnd> {
        self.touch();
        self.driver.on_turn_end(&self.name, output)
    }

    /// Report agent activity that is not a host event.
    pub fn touch(&self) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.touch();
        }
    }
}
