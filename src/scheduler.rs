//! Background maintenance worker.
//!
//! A single named thread wakes on a fixed interval and runs the cache's
//! maintenance tick (buffer drain, expiration sweep, refresh fan-out). The
//! worker holds no strong reference to the cache: the tick callback owns a
//! weak handle and tells the worker to stop once the cache is gone, so a
//! dropped cache can never be kept alive by its own scheduler.
//!
//! Shutdown is cooperative: the stop flag is raised under the wakeup mutex
//! and the worker is given a bounded grace period to acknowledge. A worker
//! stuck inside a tick (for example in a slow refresh loader) is detached
//! rather than force-killed; it exits on its next wakeup check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// How long `stop` waits for the worker to acknowledge before detaching.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct WorkerShared {
    stop: Mutex<bool>,
    wakeup: Condvar,
    exited: AtomicBool,
}

/// Handle to the maintenance thread.
pub(crate) struct MaintenanceWorker {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    /// Spawns the worker. `tick` runs once per interval and returns `false`
    /// to stop the worker (the cache was dropped).
    pub(crate) fn spawn(interval: Duration, tick: impl FnMut() -> bool + Send + 'static) -> Self {
        let shared = Arc::new(WorkerShared {
            stop: Mutex::new(false),
            wakeup: Condvar::new(),
            exited: AtomicBool::new(false),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("windcache-maintenance".into())
            .spawn(move || run(thread_shared, interval, tick))
            .expect("failed to spawn maintenance thread");
        MaintenanceWorker {
            shared,
            thread: Some(thread),
        }
    }

    /// Requests shutdown and waits up to the grace period for the worker to
    /// acknowledge. Idempotent; a second call returns immediately.
    pub(crate) fn stop(&mut self) {
        {
            let mut stop = self.shared.stop.lock();
            *stop = true;
            self.shared.wakeup.notify_all();
        }

        let Some(handle) = self.thread.take() else {
            return;
        };

        // Wait for the acknowledge flag rather than the join itself; std
        // offers no timed join. Once acknowledged the join is immediate.
        let mut guard = self.shared.stop.lock();
        let deadline = std::time::Instant::now() + SHUTDOWN_GRACE;
        while !self.shared.exited.load(Ordering::Acquire) {
            if self
                .shared
                .wakeup
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                break;
            }
        }
        drop(guard);

        if self.shared.exited.load(Ordering::Acquire) {
            let _ = handle.join();
        } else {
            tracing::warn!("maintenance worker unresponsive after grace period; detaching");
            drop(handle);
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MaintenanceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceWorker")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

fn run(shared: Arc<WorkerShared>, interval: Duration, mut tick: impl FnMut() -> bool) {
    loop {
        {
            let mut stop = shared.stop.lock();
            if !*stop {
                shared.wakeup.wait_for(&mut stop, interval);
            }
            if *stop {
                break;
            }
        }
        if !tick() {
            break;
        }
    }
    // Publish the exit under the stop mutex so a stopper waiting on the
    // condvar cannot miss the acknowledgement.
    let guard = shared.stop.lock();
    shared.exited.store(true, Ordering::Release);
    shared.wakeup.notify_all();
    drop(guard);
    tracing::debug!("maintenance worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn ticks_fire_periodically() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut worker = MaintenanceWorker::spawn(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        std::thread::sleep(Duration::from_millis(60));
        worker.stop();
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut worker = MaintenanceWorker::spawn(Duration::from_millis(5), || true);
        worker.stop();
        worker.stop();
    }

    #[test]
    fn tick_returning_false_stops_the_worker() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut worker = MaintenanceWorker::spawn(Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });
        std::thread::sleep(Duration::from_millis(50));
        let after_first = ticks.load(Ordering::SeqCst);
        assert_eq!(after_first, 1);
        worker.stop();
    }

    #[test]
    fn dropping_the_handle_stops_the_worker() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let worker = MaintenanceWorker::spawn(Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        drop(worker);
        let settled = ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), settled);
    }
}
