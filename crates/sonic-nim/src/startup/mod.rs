//! Component startup sequencing.
//!
//! Components register a (priority, component id, callback) entry. The
//! [`StartupSequencer`] then runs the CREATE and ACTIVATE phases, invoking
//! every callback exactly once per phase in priority order (highest first,
//! ties broken by ascending component id), strictly one at a time.
//!
//! A phase only starts while the global [`SystemPhaseSignal`] reads
//! EXECUTE, and stops early if the system leaves EXECUTE between callbacks.

mod sequencer;
mod types;

pub use sequencer::{StartupFn, StartupNotifier, StartupSequencer};
pub use types::{
    startup_compare, ComponentId, PhaseOutcome, PhaseState, StartupKey, StartupPhase,
    StartupStats, SystemPhase, SystemPhaseSignal,
};
