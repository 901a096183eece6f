//! Inactivity watchdog.
//!
//! A background task that calls a callback once no activity has been
//! reported for the configured timeout. Every activity signal cancels the
//! pending timer and arms a new one. While suspended (a waiting-for-user
//! tool is open) no timer runs at all.
//!
//! The callback decides whether a firing means anything; the driver treats
//! a firing outside a running turn as a no-op.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Activity,
    Suspend,
    Resume,
}

/// Handle to a running watchdog task. Dropping it stops the task.
#[derive(Debug)]
pub struct InactivityWatchdog {
    tx: mpsc::UnboundedSender<Signal>,
    task: JoinHandle<()>,
    timeout: Duration,
}

impl InactivityWatchdog {
    /// Spawn a watchdog on the current tokio runtime.
    ///
    /// `on_fire` runs on the watchdog task each time the timer expires.
    /// After firing, the watchdog stays quiet until the next activity.
    pub fn spawn<F>(timeout: Duration, on_fire: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut deadline = Some(Instant::now() + timeout);
            loop {
                let armed = deadline;
                let timer = async move {
                    match armed {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    signal = rx.recv() => match signal {
                        Some(Signal::Activity) | Some(Signal::Resume) => {
                            deadline = Some(Instant::now() + timeout);
                        }
                        Some(Signal::Suspend) => {
                            debug!("Inactivity watchdog suspended");
                            deadline = None;
                        }
                        None => break,
                    },
                    () = timer => {
                        debug!("Inactivity watchdog fired after {:?}", timeout);
                        deadline = None;
                        on_fire();
                    }
                }
            }
        });

        Self { tx, task, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Report activity, rearming the timer.
    pub fn touch(&self) {
        let _ = self.tx.send(Signal::Activity);
    }

    /// Stop timing until [`resume`](Self::resume).
    pub fn suspend(&self) {
        let _ = self.tx.send(Signal::Suspend);
    }

    /// Rearm after a suspension.
    pub fn resume(&self) {
        let _ = self.tx.send(Signal::Resume);
    }
}

impl Drop for InactivityWatchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = fired.clone();
        (fired, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let (fired, on_fire) = counter();
        let _dog = InactivityWatchdog::spawn(Duration::from_secs(10), on_fire);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Quiet until the next activity.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_rearms() {
        let (fired, on_fire) = counter();
        let dog = InactivityWatchdog::spawn(Duration::from_secs(10), on_fire);

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(8)).await;
            dog.touch();
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_and_resume() {
        let (fired, on_fire) = counter();
        let dog = InactivityWatchdog::spawn(Duration::from_secs(10), on_fire);

        dog.suspend();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        dog.resume();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_task() {
        let (fired, on_fire) = counter();
        let dog = InactivityWatchdog::spawn(Duration::from_secs(10), on_fire);
        drop(dog);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
