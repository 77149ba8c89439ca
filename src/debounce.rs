//! Debounced, serialized execution of the organize pass.
//!
//! Every call to [`Debouncer::on_event`] (re)arms a single timer. When the
//! timer runs out without being re-armed, it takes a shared gate and hands the
//! action, together with the gate, to its own task. Actions never overlap, and
//! a pass that has started always runs to completion, even if the timer that
//! launched it is cancelled afterwards.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, trace};

type Action = Arc<dyn Fn() + Send + Sync>;

/// Single-slot debounce timer that runs a blocking action once per quiet period.
pub struct Debouncer {
    delay: Duration,
    action: Action,
    gate: Arc<Mutex<()>>,
    pending: Option<JoinHandle<()>>,
    stopped: bool,
}

impl Debouncer {
    /// Creates an idle debouncer. `action` runs on the blocking thread pool.
    ///
    /// Must be used from within a tokio runtime.
    pub fn new<F>(delay: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            delay,
            action: Arc::new(action),
            gate: Arc::new(Mutex::new(())),
            pending: None,
            stopped: false,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Registers activity: cancels the outstanding timer, if any, and arms a
    /// fresh one. Has no effect once [`stop`](Self::stop) was called.
    pub fn on_event(&mut self) {
        if self.stopped {
            return;
        }
        if self.cancel_pending() {
            trace!("debounce timer reset");
        }

        let delay = self.delay;
        let action = Arc::clone(&self.action);
        let gate = Arc::clone(&self.gate);

        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            // Held from here on, so `drain` also waits for a pass that just fired
            let guard = gate.lock_owned().await;
            debug!("quiet period elapsed, starting organize pass");
            tokio::spawn(run_gated(guard, action));
        }));
    }

    /// True while a timer is waiting to fire, or has fired and is waiting for
    /// the previous pass to finish.
    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels the outstanding timer, including one that fired but is still
    /// queued behind a running pass, and ignores all further events. A pass
    /// that already started keeps running.
    pub fn stop(&mut self) {
        self.stopped = true;
        if self.cancel_pending() {
            debug!("cancelled pending organize pass");
        }
    }

    /// Waits until no pass is running. After [`stop`](Self::stop), every
    /// fired timer has either been cancelled or handed its pass the gate, so
    /// nothing runs once this returns.
    pub async fn drain(&self) {
        let _idle = self.gate.lock().await;
    }

    fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

async fn run_gated(guard: OwnedMutexGuard<()>, action: Action) {
    let pass = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        action();
    });
    if let Err(e) = pass.await {
        error!(error = %e, "organize pass panicked");
    }
}
