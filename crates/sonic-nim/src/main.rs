//! SONiC NIM daemon entry point.
//!
//! Composition root: builds the interface registry and the startup
//! sequencer, populates the registry from the topology seed, and drives the
//! CREATE and ACTIVATE startup phases once the system reaches EXECUTE.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use sonic_nim::intf::{IntfEvent, IntfType};
use sonic_nim::seed::{self, SeedFile};
use sonic_nim::{
    ComponentId, InterfaceRegistry, NimConfig, PhaseOutcome, StartupNotifier, StartupPhase,
    StartupSequencer, SystemPhase, SystemPhaseSignal,
};

/// Startup priority of NIM's own component.
const NIM_STARTUP_PRIORITY: u32 = 1000;

/// SONiC Network Interface Manager
#[derive(Parser, Debug)]
#[command(name = "nimd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = sonic_nim::config_file::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Topology seed file; defaults to every front-panel port
    #[arg(short = 's', long)]
    seed: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Exit after the startup phases instead of waiting for a signal
    #[arg(long)]
    oneshot: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("Starting SONiC nimd");

    let config = match NimConfig::load_or_default(&args.config).and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let system_phase = SystemPhaseSignal::new(SystemPhase::Init);

    let registry = match InterfaceRegistry::new(config.platform.clone()) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("NIM: Unable to allocate resources: {}", e);
            return ExitCode::FAILURE;
        }
    };
    system_phase.set(SystemPhase::Phase1);

    let sequencer = match StartupSequencer::new(&config.startup, system_phase.clone()) {
        Ok(sequencer) => sequencer,
        Err(e) => {
            error!("NIM: Unable to create startup sequencer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let nim_registry = Arc::clone(&registry);
    let startup_fn = move |phase: StartupPhase, notifier: StartupNotifier| {
        nim_startup(&nim_registry, phase);
        if let Err(e) = notifier.event_done(ComponentId::NIM) {
            error!("NIM: {}", e);
        }
    };
    if let Err(e) = sequencer.register(ComponentId::NIM, NIM_STARTUP_PRIORITY, startup_fn) {
        error!("NIM: {}", e);
        return ExitCode::FAILURE;
    }
    system_phase.set(SystemPhase::Phase2);

    let seed = match &args.seed {
        Some(path) => match SeedFile::load(path) {
            Ok(seed) => seed,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => SeedFile::default_topology(&config.platform),
    };

    let mut store = match seed.store(&registry) {
        Ok(store) => store,
        Err(e) => {
            error!("NIM: Persisted configuration rejected: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = match seed::populate(&registry, &mut store, &seed.interfaces) {
        Ok(report) => report,
        Err(e) => {
            error!("NIM: Interface creation aborted: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Created {} interfaces ({} persisted config, {} default, {} rejected)",
        report.created, report.from_persisted, report.from_default, report.rejected
    );
    system_phase.set(SystemPhase::Phase3);

    system_phase.set(SystemPhase::Execute);
    for phase in [StartupPhase::Create, StartupPhase::Activate] {
        match sequencer.invoke_phase(phase).await {
            Ok(PhaseOutcome::Completed { invoked }) => {
                info!("{} phase complete: {} callbacks", phase, invoked)
            }
            Ok(PhaseOutcome::Cancelled { invoked }) => {
                warn!("{} phase cancelled after {} callbacks", phase, invoked)
            }
            Err(e) => {
                error!("{} phase failed: {}", phase, e);
                return ExitCode::FAILURE;
            }
        }
    }

    for intf_type in IntfType::ALL {
        let count = registry.count_of_type(intf_type);
        if count > 0 {
            info!("  {}: {} interfaces", intf_type, count);
        }
    }
    let stats = sequencer.stats();
    info!(
        "Startup: {} callbacks dispatched, {} completed, {} protocol violations",
        stats.callbacks_dispatched, stats.callbacks_completed, stats.protocol_violations
    );
    if store.has_data_changed() {
        info!("{} configuration records pending save", store.len());
    }

    if args.oneshot {
        return ExitCode::SUCCESS;
    }

    info!("nimd running, waiting for shutdown signal");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Shutting down nimd");
    system_phase.set(SystemPhase::Unconfigure1);
    ExitCode::SUCCESS
}

/// NIM's own startup work: completes creation on CREATE and attaches on
/// ACTIVATE for every interface still pending.
fn nim_startup(registry: &InterfaceRegistry, phase: StartupPhase) {
    let event = match phase {
        StartupPhase::Create => IntfEvent::CreateComplete,
        StartupPhase::Activate => IntfEvent::Attach,
    };

    let mut cursor = registry.first_valid();
    while let Ok(handle) = cursor {
        let result = registry.transition(handle, event).and_then(|state| {
            if phase == StartupPhase::Activate {
                registry.transition(handle, IntfEvent::AttachComplete)
            } else {
                Ok(state)
            }
        });
        if let Err(e) = result {
            warn!("NIM: {} startup for interface {}: {}", phase, handle, e);
        }
        cursor = registry.next_valid(handle);
    }
}
