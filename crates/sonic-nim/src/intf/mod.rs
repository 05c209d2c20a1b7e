//! Interface identity: data model, registry and configuration.
//!
//! - [`types`]: USP, ConfigID, handle, state machine and media descriptors
//! - [`registry`]: the [`InterfaceRegistry`] keeping USP, ConfigID and
//!   ifIndex bijective with the internal handle
//! - [`config`]: default-config synthesis and persisted-config application

pub mod config;
pub mod registry;
pub mod types;

pub use config::{
    apply_config, resolve_config, CapabilityCfg, ConfigSource, IntfConfig, IntfDescr,
    PersistedConfig, PersistedConfigStore,
};
pub use registry::{InterfaceRecord, InterfaceRegistry, IntfCreateRequest, RegistryStats};
pub use types::{
    ConfigId, FeatureMode, FecMode, IanaType, IntIfNum, IntfEvent, IntfState, IntfStatusFlags,
    IntfType, NegoCapabilities, PhyCapability, PortSpeed, SettableParms, Usp, LOGICAL_UNIT,
};
