//! Flush debouncer: a single-slot timer that coalesces bursts of dirty
//! marks into one flush.
//!
//! Each call to [`FlushDebouncer::mark`] pushes the deadline `window` into
//! the future; the background thread only runs the flush callback once the
//! deadline is reached without being pushed again. This is the daemon's
//! translation of "debounce the flush" into `std::thread` + `Condvar` terms,
//! since the dependency stack carries no async runtime.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default debounce window: a few hundred milliseconds, per the sync
/// engine's flush design.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

struct Shared {
    /// `None` means idle (no pending flush). `Some(deadline)` means the
    /// worker should fire once `Instant::now() >= deadline`, unless a later
    /// `mark()` pushes the deadline further out first.
    deadline: Mutex<Option<Instant>>,
    cvar: Condvar,
    shutdown: Mutex<bool>,
}

/// Coalesces repeated `mark()` calls into a single flush after `window` of
/// quiescence.
///
/// Dropping the debouncer asks the background thread to stop and joins it;
/// any pending deadline is abandoned without firing.
pub struct FlushDebouncer {
    shared: Arc<Shared>,
    window: Duration,
    handle: Option<JoinHandle<()>>,
}

impl FlushDebouncer {
    /// Spawn a debouncer that calls `on_flush` at most once per `window` of
    /// continuous activity, from a dedicated background thread.
    #[must_use]
    pub fn new<F>(window: Duration, on_flush: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            deadline: Mutex::new(None),
            cvar: Condvar::new(),
            shutdown: Mutex::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("beads-flush-debouncer".to_string())
            .spawn(move || run_worker(&worker_shared, on_flush))
            .expect("spawn flush debouncer thread");

        Self {
            shared,
            window,
            handle: Some(handle),
        }
    }

    /// Record activity, pushing the flush deadline `window` into the
    /// future. Call this on every mark-dirty.
    pub fn mark(&self) {
        let mut deadline = self.shared.deadline.lock().unwrap_or_else(|e| e.into_inner());
        *deadline = Some(Instant::now() + self.window);
        self.shared.cvar.notify_one();
    }

    /// A cheap, cloneable handle that can call `mark()` from other threads
    /// without owning the background thread's shutdown-on-drop behavior.
    #[must_use]
    pub fn clone_handle(&self) -> DebounceHandle {
        DebounceHandle {
            shared: Arc::clone(&self.shared),
            window: self.window,
        }
    }
}

/// A lightweight, `Clone`-able handle onto a running [`FlushDebouncer`].
/// Unlike cloning the debouncer itself, dropping a handle does nothing —
/// only dropping the original `FlushDebouncer` stops the background thread.
#[derive(Clone)]
pub struct DebounceHandle {
    shared: Arc<Shared>,
    window: Duration,
}

impl DebounceHandle {
    /// Record activity, pushing the flush deadline `window` into the future.
    pub fn mark(&self) {
        let mut deadline = self.shared.deadline.lock().unwrap_or_else(|e| e.into_inner());
        *deadline = Some(Instant::now() + self.window);
        self.shared.cvar.notify_one();
    }
}

impl Drop for FlushDebouncer {
    fn drop(&mut self) {
        *self.shared.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.shared.cvar.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker<F: Fn()>(shared: &Arc<Shared>, on_flush: F) {
    loop {
        let mut deadline = shared.deadline.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if *shared.shutdown.lock().unwrap_or_else(|e| e.into_inner()) {
                return;
            }
            match *deadline {
                None => {
                    deadline = shared
                        .cvar
                        .wait(deadline)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        break;
                    }
                    let (guard, _timeout) = shared
                        .cvar
                        .wait_timeout(deadline, at - now)
                        .unwrap_or_else(|e| e.into_inner());
                    deadline = guard;
                }
            }
        }

        // The deadline fired: clear it before running the callback so a
        // mark() that arrives mid-flush schedules a fresh one instead of
        // being swallowed.
        *deadline = None;
        drop(deadline);
        on_flush();
    }
}
