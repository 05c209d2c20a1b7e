//! Startup sequencer and its worker.
//!
//! Callbacks are dispatched one at a time to a single worker task over a
//! bounded queue. After each dispatch the sequencer blocks on `proceed`.
//! The worker invokes the callback, waits on `cb_done` (signalled by the
//! component through [`StartupNotifier::event_done`]) and then releases
//! `proceed`. At most one callback is ever in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use super::types::{
    startup_compare, ComponentId, PhaseOutcome, PhaseState, StartupKey, StartupPhase,
    StartupStats, SystemPhase, SystemPhaseSignal,
};
use crate::config_file::StartupConfig;
use crate::error::{NimError, Result};
use crate::tree::{OrderedIndex, TreeError};

/// Startup callback. The component must call
/// [`StartupNotifier::event_done`] exactly once per invocation, either
/// before returning or later from another task.
pub type StartupFn = Arc<dyn Fn(StartupPhase, StartupNotifier) + Send + Sync>;

struct StartupMsg {
    component_id: ComponentId,
    phase: StartupPhase,
    callback: StartupFn,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    phases_completed: AtomicU64,
    phases_cancelled: AtomicU64,
    violations: AtomicU64,
}

struct Handshake {
    /// Component whose completion is awaited.
    current: Mutex<Option<ComponentId>>,
    cb_done: Semaphore,
    proceed: Semaphore,
    counters: Counters,
}

/// Handle given to startup callbacks for reporting completion.
#[derive(Clone)]
pub struct StartupNotifier {
    handshake: Arc<Handshake>,
}

impl StartupNotifier {
    /// Reports that `component_id` finished its startup work.
    ///
    /// A component id other than the one being waited on is a protocol
    /// violation: it is logged and counted, and the wait continues.
    pub fn event_done(&self, component_id: ComponentId) -> Result<()> {
        let mut current = self.handshake.current.lock();
        if *current == Some(component_id) {
            *current = None;
            drop(current);
            self.handshake
                .counters
                .completed
                .fetch_add(1, Ordering::Relaxed);
            self.handshake.cb_done.add_permits(1);
            return Ok(());
        }

        let expected = *current;
        drop(current);
        self.handshake
            .counters
            .violations
            .fetch_add(1, Ordering::Relaxed);
        error!(
            "NIM: Event Done received for component {}, expecting {:?}",
            component_id, expected
        );
        Err(NimError::ProtocolViolation {
            expected,
            received: component_id,
        })
    }
}

impl std::fmt::Debug for StartupNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupNotifier").finish_non_exhaustive()
    }
}

/// Drives the CREATE and ACTIVATE startup phases.
pub struct StartupSequencer {
    entries: Mutex<OrderedIndex<StartupKey, StartupFn>>,
    system_phase: SystemPhaseSignal,
    tx: mpsc::Sender<StartupMsg>,
    handshake: Arc<Handshake>,
    phase_lock: tokio::sync::Mutex<()>,
    phase_states: Mutex<[PhaseState; 2]>,
    callback_timeout: Option<Duration>,
    faulted: AtomicBool,
    worker: JoinHandle<()>,
}

impl StartupSequencer {
    /// Creates the sequencer and spawns its worker on the current tokio
    /// runtime.
    pub fn new(config: &StartupConfig, system_phase: SystemPhaseSignal) -> Result<Self> {
        let entries = OrderedIndex::with_comparator(config.max_components, startup_compare)
            .map_err(|e| NimError::from_tree(e, "startup table"))?;

        let handshake = Arc::new(Handshake {
            current: Mutex::new(None),
            cb_done: Semaphore::new(0),
            proceed: Semaphore::new(0),
            counters: Counters::default(),
        });

        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let worker = tokio::spawn(run_worker(rx, Arc::clone(&handshake)));

        Ok(Self {
            entries: Mutex::new(entries),
            system_phase,
            tx,
            handshake,
            phase_lock: tokio::sync::Mutex::new(()),
            phase_states: Mutex::new([PhaseState::Idle; 2]),
            callback_timeout: config.callback_timeout(),
            faulted: AtomicBool::new(false),
            worker,
        })
    }

    /// Registers a component's startup callback.
    ///
    /// A second registration with the same (priority, component) pair is a
    /// misconfiguration and is rejected.
    pub fn register<F>(&self, component_id: ComponentId, priority: u32, callback: F) -> Result<()>
    where
        F: Fn(StartupPhase, StartupNotifier) + Send + Sync + 'static,
    {
        let key = StartupKey {
            priority,
            component_id,
        };
        let callback: StartupFn = Arc::new(callback);

        match self.entries.lock().insert(key, callback) {
            Ok(()) => {
                debug!(
                    "NIM: Registered startup function for {} priority {}",
                    component_id, priority
                );
                Ok(())
            }
            Err(TreeError::AlreadyExists) => {
                error!(
                    "NIM: Startup function for {} priority {} already registered",
                    component_id, priority
                );
                Err(NimError::already_exists(format!(
                    "startup entry {} priority {}",
                    component_id, priority
                )))
            }
            Err(e) => {
                error!(
                    "NIM: Startup function for {} not added: {}",
                    component_id, e
                );
                Err(NimError::from_tree(e, "startup table"))
            }
        }
    }

    /// Number of registered callbacks.
    pub fn registered(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn system_phase(&self) -> &SystemPhaseSignal {
        &self.system_phase
    }

    pub fn phase_state(&self, phase: StartupPhase) -> PhaseState {
        self.phase_states.lock()[phase.index()]
    }

    /// True once a callback overran the configured bound or a phase was
    /// abandoned mid-callback.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StartupStats {
        let c = &self.handshake.counters;
        StartupStats {
            callbacks_dispatched: c.dispatched.load(Ordering::Relaxed),
            callbacks_completed: c.completed.load(Ordering::Relaxed),
            phases_completed: c.phases_completed.load(Ordering::Relaxed),
            phases_cancelled: c.phases_cancelled.load(Ordering::Relaxed),
            protocol_violations: c.violations.load(Ordering::Relaxed),
        }
    }

    /// Invokes every registered callback for `phase`, in dispatch order.
    ///
    /// Runs only while the system phase is EXECUTE; leaving EXECUTE between
    /// callbacks ends the phase with [`PhaseOutcome::Cancelled`].
    ///
    /// Dropping the returned future while a callback is in flight faults
    /// the sequencer, like a callback timeout.
    pub async fn invoke_phase(&self, phase: StartupPhase) -> Result<PhaseOutcome> {
        let _running = self.phase_lock.lock().await;

        if self.is_faulted() {
            return Err(NimError::SequencerUnavailable(
                "faulted by an abandoned or timed-out startup callback".to_string(),
            ));
        }

        if self.system_phase.get() != SystemPhase::Execute {
            return Ok(self.cancel(phase, 0));
        }

        self.set_phase_state(phase, PhaseState::Running);
        info!("NIM: Starting {} startup callbacks", phase);

        let mut invoked = 0;
        let mut cursor = self.first_entry();

        while let Some((key, callback)) = cursor {
            if self.system_phase.get() != SystemPhase::Execute {
                return Ok(self.cancel(phase, invoked));
            }

            self.dispatch(phase, key.component_id, callback).await?;
            invoked += 1;
            cursor = self.next_entry(&key);
        }

        self.set_phase_state(phase, PhaseState::Completed);
        self.handshake
            .counters
            .phases_completed
            .fetch_add(1, Ordering::Relaxed);
        info!(
            "NIM: {} startup callbacks complete, {} invoked",
            phase, invoked
        );
        Ok(PhaseOutcome::Completed { invoked })
    }

    async fn dispatch(
        &self,
        phase: StartupPhase,
        component_id: ComponentId,
        callback: StartupFn,
    ) -> Result<()> {
        *self.handshake.current.lock() = Some(component_id);

        let msg = StartupMsg {
            component_id,
            phase,
            callback,
        };
        if self.tx.send(msg).await.is_err() {
            *self.handshake.current.lock() = None;
            self.set_phase_state(phase, PhaseState::Idle);
            error!("NIM: Failed to send {} START message for {}", phase, component_id);
            return Err(NimError::SequencerUnavailable(
                "startup worker has exited".to_string(),
            ));
        }
        self.handshake
            .counters
            .dispatched
            .fetch_add(1, Ordering::Relaxed);

        let mut in_flight = InFlight {
            sequencer: self,
            phase,
            component_id,
            armed: true,
        };
        let result = self.wait_proceed(phase, component_id).await;
        in_flight.armed = false;
        result
    }

    async fn wait_proceed(&self, phase: StartupPhase, component_id: ComponentId) -> Result<()> {
        let acquire = self.handshake.proceed.acquire();

        let permit = match self.callback_timeout {
            None => acquire.await,
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(permit) => permit,
                Err(_) => {
                    self.faulted.store(true, Ordering::Release);
                    self.set_phase_state(phase, PhaseState::Idle);
                    error!(
                        "NIM: {} startup callback for {} did not complete within {:?}",
                        phase, component_id, limit
                    );
                    return Err(NimError::CallbackTimeout {
                        component: component_id,
                        waited_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
        };

        permit
            .map_err(|_| NimError::SequencerUnavailable("handshake closed".to_string()))?
            .forget();
        Ok(())
    }

    fn cancel(&self, phase: StartupPhase, invoked: usize) -> PhaseOutcome {
        info!(
            "Terminating {} startup callbacks. No longer in EXECUTE state.",
            phase
        );
        self.set_phase_state(phase, PhaseState::Cancelled);
        self.handshake
            .counters
            .phases_cancelled
            .fetch_add(1, Ordering::Relaxed);
        PhaseOutcome::Cancelled { invoked }
    }

    fn set_phase_state(&self, phase: StartupPhase, state: PhaseState) {
        self.phase_states.lock()[phase.index()] = state;
    }

    fn first_entry(&self) -> Option<(StartupKey, StartupFn)> {
        self.entries
            .lock()
            .first()
            .map(|(k, f)| (*k, Arc::clone(f)))
    }

    fn next_entry(&self, key: &StartupKey) -> Option<(StartupKey, StartupFn)> {
        self.entries
            .lock()
            .find_next(key)
            .map(|(k, f)| (*k, Arc::clone(f)))
    }
}

/// Faults the sequencer if a dispatch is dropped before its callback
/// completes. The worker is still waiting on that callback, so the
/// handshake can no longer be trusted.
struct InFlight<'a> {
    sequencer: &'a StartupSequencer,
    phase: StartupPhase,
    component_id: ComponentId,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let seq = self.sequencer;
        *seq.handshake.current.lock() = None;
        seq.faulted.store(true, Ordering::Release);
        seq.set_phase_state(self.phase, PhaseState::Idle);
        error!(
            "NIM: {} startup abandoned while waiting on {}",
            self.phase, self.component_id
        );
    }
}

impl Drop for StartupSequencer {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(mut rx: mpsc::Receiver<StartupMsg>, handshake: Arc<Handshake>) {
    while let Some(msg) = rx.recv().await {
        debug!(
            "NIM: Invoking {} startup for {}",
            msg.phase, msg.component_id
        );
        let notifier = StartupNotifier {
            handshake: Arc::clone(&handshake),
        };
        (msg.callback)(msg.phase, notifier);

        match handshake.cb_done.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => break,
        }
        handshake.proceed.add_permits(1);
    }
    warn!("NIM: Startup worker exiting");
}
