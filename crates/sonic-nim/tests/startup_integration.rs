//! Integration tests for startup sequencing
//!
//! Drives the sequencer the way nimd does: components register against a
//! shared system phase, and their callbacks act on the interface registry.

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sonic_nim::intf::{IntfEvent, IntfState};
use sonic_nim::startup::PhaseState;
use sonic_nim::{
    ComponentId, ConfigId, InterfaceRegistry, IntfCreateRequest, PhaseOutcome, PlatformLimits,
    StartupConfig, StartupNotifier, StartupPhase, StartupSequencer, SystemPhase,
    SystemPhaseSignal, Usp,
};

type Log = Arc<Mutex<Vec<(StartupPhase, ComponentId)>>>;

fn recorder(log: &Log, id: ComponentId) -> impl Fn(StartupPhase, StartupNotifier) + Send + Sync {
    let log = Arc::clone(log);
    move |phase, notifier| {
        log.lock().push((phase, id));
        notifier.event_done(id).unwrap();
    }
}

#[tokio::test]
async fn test_both_phases_follow_dispatch_order() {
    let signal = SystemPhaseSignal::new(SystemPhase::Phase2);
    let seq = StartupSequencer::new(&StartupConfig::default(), signal.clone()).unwrap();
    let log: Log = Arc::default();
    let (a, b, c) = (ComponentId::LAG, ComponentId::VLAN, ComponentId::DOT1X);

    seq.register(c, 5, recorder(&log, c)).unwrap();
    seq.register(b, 10, recorder(&log, b)).unwrap();
    seq.register(a, 10, recorder(&log, a)).unwrap();

    signal.set(SystemPhase::Execute);
    for phase in [StartupPhase::Create, StartupPhase::Activate] {
        let outcome = seq.invoke_phase(phase).await.unwrap();
        assert_eq!(outcome, PhaseOutcome::Completed { invoked: 3 });
        assert_eq!(seq.phase_state(phase), PhaseState::Completed);
    }

    use StartupPhase::{Activate, Create};
    assert_eq!(
        *log.lock(),
        vec![
            (Create, a),
            (Create, b),
            (Create, c),
            (Activate, a),
            (Activate, b),
            (Activate, c),
        ]
    );
    let stats = seq.stats();
    assert_eq!(stats.callbacks_dispatched, 6);
    assert_eq!(stats.callbacks_completed, 6);
    assert_eq!(stats.phases_completed, 2);
}

#[tokio::test]
async fn test_leaving_execute_cancels_remaining_callbacks() {
    let signal = SystemPhaseSignal::new(SystemPhase::Execute);
    let seq = StartupSequencer::new(&StartupConfig::default(), signal.clone()).unwrap();
    let log: Log = Arc::default();
    let (a, b, c) = (ComponentId::LAG, ComponentId::VLAN, ComponentId::DOT1X);

    // First callback starts a shutdown before reporting done.
    let first_log = Arc::clone(&log);
    let shutdown = signal.clone();
    seq.register(a, 10, move |phase, notifier| {
        first_log.lock().push((phase, a));
        shutdown.set(SystemPhase::Unconfigure1);
        notifier.event_done(a).unwrap();
    })
    .unwrap();
    seq.register(b, 10, recorder(&log, b)).unwrap();
    seq.register(c, 5, recorder(&log, c)).unwrap();

    let outcome = seq.invoke_phase(StartupPhase::Create).await.unwrap();
    assert_eq!(outcome, PhaseOutcome::Cancelled { invoked: 1 });
    assert_eq!(*log.lock(), vec![(StartupPhase::Create, a)]);
    assert_eq!(seq.phase_state(StartupPhase::Create), PhaseState::Cancelled);

    // Still outside EXECUTE: the next phase invokes nothing.
    let outcome = seq.invoke_phase(StartupPhase::Activate).await.unwrap();
    assert_eq!(outcome, PhaseOutcome::Cancelled { invoked: 0 });
    assert_eq!(log.lock().len(), 1);
    assert_eq!(seq.stats().phases_cancelled, 2);
}

#[tokio::test]
async fn test_callbacks_drive_interface_lifecycle() {
    let limits = PlatformLimits {
        max_phys_ports_per_slot: 4,
        ..Default::default()
    };
    let registry = Arc::new(InterfaceRegistry::new(limits).unwrap());
    for port in 1..=4 {
        registry
            .create_interface(IntfCreateRequest::new(ConfigId::Physical(Usp::new(
                1, 0, port,
            ))))
            .unwrap();
    }
    registry
        .create_interface(IntfCreateRequest::new(ConfigId::Vlan(100)))
        .unwrap();

    let signal = SystemPhaseSignal::new(SystemPhase::Execute);
    let seq = StartupSequencer::new(&StartupConfig::default(), signal).unwrap();

    let nim_registry = Arc::clone(&registry);
    seq.register(ComponentId::NIM, 1000, move |phase, notifier| {
        let mut cursor = nim_registry.first_valid();
        while let Ok(h) = cursor {
            match phase {
                StartupPhase::Create => {
                    nim_registry.transition(h, IntfEvent::CreateComplete).unwrap();
                }
                StartupPhase::Activate => {
                    nim_registry.transition(h, IntfEvent::Attach).unwrap();
                    nim_registry.transition(h, IntfEvent::AttachComplete).unwrap();
                }
            }
            cursor = nim_registry.next_valid(h);
        }
        notifier.event_done(ComponentId::NIM).unwrap();
    })
    .unwrap();

    // A lower-priority component observes what NIM already did.
    let observed = Arc::new(Mutex::new(Vec::new()));
    let vlan_registry = Arc::clone(&registry);
    let vlan_seen = Arc::clone(&observed);
    seq.register(ComponentId::VLAN, 10, move |phase, notifier| {
        let h = vlan_registry
            .lookup_by_config_id(&ConfigId::Vlan(100))
            .unwrap();
        vlan_seen
            .lock()
            .push((phase, vlan_registry.get_state(h).unwrap()));
        notifier.event_done(ComponentId::VLAN).unwrap();
    })
    .unwrap();

    assert!(seq
        .invoke_phase(StartupPhase::Create)
        .await
        .unwrap()
        .is_completed());
    assert!(seq
        .invoke_phase(StartupPhase::Activate)
        .await
        .unwrap()
        .is_completed());

    assert_eq!(
        *observed.lock(),
        vec![
            (StartupPhase::Create, IntfState::Created),
            (StartupPhase::Activate, IntfState::Attached),
        ]
    );
    let mut cursor = registry.first_valid();
    while let Ok(h) = cursor {
        assert_eq!(registry.get_state(h).unwrap(), IntfState::Attached);
        cursor = registry.next_valid(h);
    }
}
