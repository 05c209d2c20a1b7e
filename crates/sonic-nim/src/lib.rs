//! SONiC Network Interface Manager (NIM) - interface identity and startup
//!
//! NIM gives every physical and logical port of the switch a stable internal
//! handle and keeps the ways other subsystems name a port in step with it.
//! It also sequences the startup callbacks that dependent components
//! (802.1X/MAB authentication, VLAN, FDB) must complete before they touch
//! an interface.
//!
//! # Architecture
//!
//! ```text
//! platform topology ──> [InterfaceRegistry] <── accessor calls ── components
//!                          │   USP / ConfigID / ifIndex indices
//!                          │
//! persisted config ──> [apply_config] (persisted record or resolve_config)
//!
//! components ──register──> [StartupSequencer] ──START msg──> worker
//!                               ↑ proceed                      │ event_done
//!                               └──────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`tree::OrderedIndex`]: bounded arena-backed ordered index
//! - [`intf::InterfaceRegistry`]: handle allocation and the three bijective
//!   indices, behind one reader/writer lock
//! - [`intf::apply_config`] / [`intf::resolve_config`]: configuration identity
//! - [`startup::StartupSequencer`]: CREATE/ACTIVATE callback sequencing
//! - [`config_file::NimConfig`]: platform limits and sequencer settings

pub mod config_file;
pub mod error;
pub mod intf;
pub mod seed;
pub mod startup;
pub mod tree;

pub use config_file::{HandleRange, NimConfig, PlatformLimits, StartupConfig};
pub use error::{NimError, Result};
pub use intf::{
    apply_config, resolve_config, ConfigId, ConfigSource, InterfaceRegistry, IntIfNum,
    IntfCreateRequest, IntfType, PersistedConfigStore, Usp,
};
pub use startup::{
    ComponentId, PhaseOutcome, StartupNotifier, StartupPhase, StartupSequencer, SystemPhase,
    SystemPhaseSignal,
};
pub use tree::{OrderedIndex, TreeError};
