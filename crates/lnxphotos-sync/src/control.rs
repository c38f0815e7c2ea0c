//! Run control: pause, resume and cancel signalling
//!
//! [`SyncController`] is the external handle (CLI, signal handlers) and
//! enforces that at most one download run is active. Each run gets a
//! [`RunControl`], which the orchestrator consults between scheduling
//! decisions. Signals never interrupt a transfer that is already running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::SyncError;

#[derive(Debug)]
struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct Slot {
    active: Option<ActiveRun>,
    generation: u64,
}

/// External control surface for the active download run
#[derive(Debug, Clone, Default)]
pub struct SyncController {
    slot: Arc<Mutex<Slot>>,
}

impl SyncController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new run.
    ///
    /// # Errors
    /// [`SyncError::State`] if a run is already active.
    pub fn begin_run(&self) -> Result<RunControl, SyncError> {
        let mut slot = self.lock();
        if slot.active.is_some() {
            return Err(SyncError::State("a sync run is already active".into()));
        }

        slot.generation += 1;
        let generation = slot.generation;
        let cancel = CancellationToken::new();
        let (pause, paused) = watch::channel(false);
        slot.active = Some(ActiveRun {
            generation,
            cancel: cancel.clone(),
            pause,
        });
        debug!(generation, "Run registered");

        Ok(RunControl {
            cancel,
            paused,
            _registration: Arc::new(Registration {
                slot: Arc::clone(&self.slot),
                generation,
            }),
        })
    }

    fn with_active<T>(&self, f: impl FnOnce(&ActiveRun) -> T) -> Result<T, SyncError> {
        let slot = self.lock();
        match &slot.active {
            Some(run) if !run.cancel.is_cancelled() => Ok(f(run)),
            _ => Err(SyncError::State("no sync run is active".into())),
        }
    }

    /// Stops new downloads from starting until [`resume`](Self::resume)
    pub fn pause(&self) -> Result<(), SyncError> {
        self.with_active(|run| {
            run.pause.send_replace(true);
        })?;
        info!("Sync run paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), SyncError> {
        self.with_active(|run| {
            run.pause.send_replace(false);
        })?;
        info!("Sync run resumed");
        Ok(())
    }

    /// Stops the active run once its in-flight downloads drain
    pub fn cancel(&self) -> Result<(), SyncError> {
        self.with_active(|run| run.cancel.cancel())?;
        info!("Sync run cancellation requested");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.lock()
            .active
            .as_ref()
            .is_some_and(|run| *run.pause.borrow())
    }
}

/// Clears the controller slot when the last [`RunControl`] clone drops
#[derive(Debug)]
struct Registration {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .active
            .as_ref()
            .is_some_and(|run| run.generation == self.generation)
        {
            slot.active = None;
            debug!(generation = self.generation, "Run unregistered");
        }
    }
}

/// Signals for one run, as seen by the orchestrator
#[derive(Debug, Clone)]
pub struct RunControl {
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
    _registration: Arc<Registration>,
}

impl RunControl {
    /// A control not registered with any controller, for driving the
    /// orchestrator directly
    pub fn standalone() -> Self {
        let (_, paused) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused,
            _registration: Arc::new(Registration {
                slot: Arc::default(),
                generation: 0,
            }),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Waits until the run is resumed or cancelled, re-checking at least
    /// every `poll`.
    ///
    /// Returns false if the run was cancelled.
    pub async fn wait_while_paused(&mut self, poll: Duration) -> bool {
        loop {
            let paused = *self.paused.borrow_and_update();
            if !paused {
                break;
            }
            if self.cancel.is_cancelled() {
                return false;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = self.paused.changed() => {
                    if changed.is_err() {
                        // Controller gone; nothing can resume us
                        return !self.cancel.is_cancelled();
                    }
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
        !self.cancel.is_cancelled()
    }
}
