//! Idle shutdown.
//!
//! The orchestrator holds a browser worker and a port. When nobody has asked
//! for anything in a while it shuts itself down; the client restarts it on
//! demand.

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use log::{debug, info};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::select;
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

struct ClockState {
    last_activity: Mutex<Instant>,
    in_flight: AtomicUsize,
}

/// Shared record of when the service last did something.
#[derive(Clone)]
pub struct ActivityClock {
    state: Arc<ClockState>,
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ClockState {
                last_activity: Mutex::new(Instant::now()),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self
            .state
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Mark a job as running until the guard is dropped. Both ends count as
    /// activity.
    #[must_use]
    pub fn begin_job(&self) -> JobGuard {
        self.touch();
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        JobGuard {
            clock: self.clone(),
        }
    }

    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.state
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.in_flight.load(Ordering::SeqCst) > 0
    }
}

/// Keeps the clock busy while a job runs.
pub struct JobGuard {
    clock: ActivityClock,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.clock.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.clock.touch();
    }
}

/// One-way flag telling every part of the service to wind down.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Fire the signal. Returns whether this call was the one that fired it.
    pub fn trigger(&self) -> bool {
        !self.sender.send_replace(true)
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once the signal has fired.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        let _fired = receiver.wait_for(|fired| *fired).await;
    }
}

/// Periodically compares the activity clock against the idle window.
pub struct IdleSupervisor;

impl IdleSupervisor {
    /// Start supervising. The task ends after triggering `shutdown`, or as
    /// soon as something else triggers it.
    pub fn spawn(
        clock: ActivityClock,
        idle_window: Duration,
        check_interval: Duration,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        spawn(async move {
            let mut ticker = interval_at(Instant::now() + check_interval, check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "[IDLE] shutting down after {idle_window:?} without jobs (checked every {check_interval:?})"
            );
            loop {
                select! {
                    _ = ticker.tick() => {}
                    () = shutdown.wait() => {
                        debug!("[IDLE] supervisor stopping, shutdown already requested");
                        return;
                    }
                }
                if clock.is_busy() {
                    continue;
                }
                let idle = clock.idle_for();
                if idle >= idle_window {
                    info!("[IDLE] idle for {idle:?}, requesting shutdown");
                    shutdown.trigger();
                    return;
                }
                debug!("[IDLE] idle for {idle:?}");
            }
        })
    }
}
