//! Time sources and background timers driven by the tokio clock.

use std::future::Future;

use gambit_core::clock::{Clock, SystemClock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Unix seconds measured on the tokio clock.
///
/// Under a paused runtime (`start_paused`, `tokio::time::advance`) it moves
/// only with the test, which keeps timeout tests deterministic.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin_unix: u64,
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now())
    }

    pub fn starting_at(unix: u64) -> Self {
        Self {
            origin_unix: unix,
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> u64 {
        self.origin_unix + self.origin.elapsed().as_secs()
    }
}

/// A spawned timeout check. The task is aborted when the watcher is dropped.
#[derive(Debug)]
pub struct TimeoutWatcher {
    handle: JoinHandle<()>,
}

impl TimeoutWatcher {
    pub fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(task),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TimeoutWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn clock_follows_paused_time() {
        let clock = TokioClock::starting_at(1_000);
        assert_eq!(clock.now(), 1_000);
        tokio::time::advance(Duration::from_millis(90_500)).await;
        assert_eq!(clock.now(), 1_090);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_watcher_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let watcher = TimeoutWatcher::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            flag.store(true, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_secs(5)).await;
        drop(watcher);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
