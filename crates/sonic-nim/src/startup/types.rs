//! Startup sequencing types.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Identifier of a component taking part in startup sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub const NIM: ComponentId = ComponentId(1);
    pub const AUTH_MGR: ComponentId = ComponentId(2);
    pub const DOT1X: ComponentId = ComponentId(3);
    pub const LAG: ComponentId = ComponentId(4);
    pub const VLAN: ComponentId = ComponentId(5);
    pub const FDB: ComponentId = ComponentId(6);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    fn name(self) -> Option<&'static str> {
        match self {
            Self::NIM => Some("nim"),
            Self::AUTH_MGR => Some("authmgr"),
            Self::DOT1X => Some("dot1x"),
            Self::LAG => Some("lag"),
            Self::VLAN => Some("vlan"),
            Self::FDB => Some("fdb"),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "component({})", self.0),
        }
    }
}

/// Startup phase driven by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupPhase {
    Create,
    Activate,
}

impl StartupPhase {
    pub(crate) fn index(self) -> usize {
        match self {
            StartupPhase::Create => 0,
            StartupPhase::Activate => 1,
        }
    }
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupPhase::Create => write!(f, "CREATE"),
            StartupPhase::Activate => write!(f, "ACTIVATE"),
        }
    }
}

/// Global system lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemPhase {
    #[default]
    Init,
    Phase1,
    Phase2,
    Phase3,
    Execute,
    Unconfigure1,
    Unconfigure2,
}

impl fmt::Display for SystemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemPhase::Init => "INIT",
            SystemPhase::Phase1 => "PHASE1",
            SystemPhase::Phase2 => "PHASE2",
            SystemPhase::Phase3 => "PHASE3",
            SystemPhase::Execute => "EXECUTE",
            SystemPhase::Unconfigure1 => "UNCONFIGURE1",
            SystemPhase::Unconfigure2 => "UNCONFIGURE2",
        };
        f.write_str(s)
    }
}

/// Shared, readable-anytime system phase value.
///
/// Clones observe and update the same value.
#[derive(Debug, Clone)]
pub struct SystemPhaseSignal {
    tx: Arc<watch::Sender<SystemPhase>>,
}

impl SystemPhaseSignal {
    pub fn new(initial: SystemPhase) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> SystemPhase {
        *self.tx.borrow()
    }

    pub fn set(&self, phase: SystemPhase) {
        self.tx.send_replace(phase);
    }

    pub fn is_execute(&self) -> bool {
        self.get() == SystemPhase::Execute
    }

    /// Receiver notified on every phase change.
    pub fn subscribe(&self) -> watch::Receiver<SystemPhase> {
        self.tx.subscribe()
    }
}

impl Default for SystemPhaseSignal {
    fn default() -> Self {
        Self::new(SystemPhase::Init)
    }
}

/// Key of a startup registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupKey {
    pub priority: u32,
    pub component_id: ComponentId,
}

/// Dispatch order: higher priority first, then ascending component id.
pub fn startup_compare(a: &StartupKey, b: &StartupKey) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.component_id.cmp(&b.component_id))
}

/// Result of driving one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Every registered callback ran.
    Completed { invoked: usize },
    /// The system left EXECUTE; remaining callbacks were skipped.
    Cancelled { invoked: usize },
}

impl PhaseOutcome {
    pub fn invoked(&self) -> usize {
        match self {
            PhaseOutcome::Completed { invoked } | PhaseOutcome::Cancelled { invoked } => *invoked,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PhaseOutcome::Completed { .. })
    }
}

/// Progress of one startup phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Startup sequencer statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupStats {
    pub callbacks_dispatched: u64,
    pub callbacks_completed: u64,
    pub phases_completed: u64,
    pub phases_cancelled: u64,
    pub protocol_violations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_compare() {
        let a = StartupKey {
            priority: 10,
            component_id: ComponentId::new(1),
        };
        let b = StartupKey {
            priority: 10,
            component_id: ComponentId::new(2),
        };
        let c = StartupKey {
            priority: 5,
            component_id: ComponentId::new(0),
        };
        assert_eq!(startup_compare(&a, &b), Ordering::Less);
        assert_eq!(startup_compare(&b, &c), Ordering::Less);
        assert_eq!(startup_compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_system_phase_signal_shared() {
        let signal = SystemPhaseSignal::default();
        let clone = signal.clone();
        let mut rx = signal.subscribe();

        clone.set(SystemPhase::Execute);
        assert!(signal.is_execute());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SystemPhase::Execute);
    }

    #[test]
    fn test_component_display() {
        assert_eq!(ComponentId::VLAN.to_string(), "vlan(5)");
        assert_eq!(ComponentId::new(42).to_string(), "component(42)");
    }
}
