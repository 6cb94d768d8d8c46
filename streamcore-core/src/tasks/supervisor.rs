// streamcore-core/src/tasks/supervisor.rs

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::Error;

/// Cooperative stop flag shared by every worker of a [`Supervisor`].
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleeps up to `timeout`, waking early on stop. Returns `true` if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock();
        if !*stopped {
            cvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// Owns the long-running threads (TTS worker, sound effects, connectors).
/// `shutdown` raises the stop signal and joins every thread.
#[derive(Default)]
pub struct Supervisor {
    signal: StopSignal,
    workers: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> StopSignal {
        self.signal.clone()
    }

    /// Spawns a named thread running `task` with the shared stop signal.
    pub fn spawn<F>(&self, name: &str, task: F) -> Result<(), Error>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let signal = self.signal.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || task(signal))?;
        debug!(worker = name, "spawned worker thread");
        self.workers.lock().push((name.to_string(), handle));
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Stops and joins all workers. Safe to call more than once.
    pub fn shutdown(&self) {
        self.signal.stop();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        info!("Supervisor shutting down {} worker(s)", workers.len());
        for (name, handle) in workers {
            match handle.join() {
                Ok(()) => debug!(worker = %name, "worker exited"),
                Err(_) => error!(worker = %name, "worker panicked before shutdown"),
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Threads are detached if nobody called shutdown(); they still see the signal.
        self.signal.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn shutdown_stops_and_joins_workers() {
        let sup = Supervisor::new();
        let loops = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let loops = loops.clone();
            sup.spawn(&format!("looper-{i}"), move |stop| {
                while !stop.wait_timeout(Duration::from_millis(5)) {
                    loops.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        }
        assert_eq!(sup.worker_count(), 3);

        thread::sleep(Duration::from_millis(30));
        sup.shutdown();
        assert_eq!(sup.worker_count(), 0);

        let after = loops.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(loops.load(Ordering::SeqCst), after, "no worker runs after shutdown");
    }

    #[test]
    fn wait_timeout_wakes_on_stop() {
        let signal = StopSignal::new();
        let s2 = signal.clone();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            let stopped = s2.wait_timeout(Duration::from_secs(10));
            (stopped, start.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        let (stopped, elapsed) = waiter.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn panicking_worker_does_not_break_shutdown() {
        let sup = Supervisor::new();
        sup.spawn("bad", |_| panic!("worker failure")).unwrap();
        sup.spawn("good", |stop| while !stop.wait_timeout(Duration::from_millis(5)) {})
            .unwrap();
        sup.shutdown();
        assert_eq!(sup.worker_count(), 0);
    }
}
