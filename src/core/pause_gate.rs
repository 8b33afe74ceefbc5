//! Pause Gate - cooperative suspension of workers between task claims

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

/// Stop/abort flags shared by one generation of workers.
///
/// `stop` asks workers to exit after their current task; `abort` additionally
/// asks the fetch backend to kill an in-flight transfer.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    stop: AtomicBool,
    abort: AtomicBool,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn request_abort(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_flag(&self) -> &AtomicBool {
        &self.abort
    }
}

/// Mutex-guarded `paused` flag plus condition variable
#[derive(Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    changed: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume(&self) {
        let mut paused = self.paused.lock();
        *paused = false;
        self.changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Block while the gate is closed, returning early once `shutdown` asks to stop.
    pub fn wait_while_paused(&self, shutdown: &ShutdownSignal) {
        let mut paused = self.paused.lock();
        while *paused && !shutdown.is_stopping() {
            self.changed.wait(&mut paused);
        }
    }

    /// Wake every blocked worker so it can re-check its stop flag.
    ///
    /// Callers set the stop flag first; notifying under the lock means no
    /// waiter can miss it between its check and its wait.
    pub fn wake_all(&self) {
        let _paused = self.paused.lock();
        self.changed.notify_all();
    }
}
