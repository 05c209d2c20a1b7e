//! Topology seed for the `nimd` daemon.
//!
//! Stands in for the platform topology provider and the persisted
//! configuration store: a TOML file listing the interfaces to create and
//! the configuration records persisted for them.
//!
//! ```toml
//! [[interface]]
//! config_id = { physical = { unit = 1, slot = 0, port = 1 } }
//! descr = { iana_type = "100g_ethernet" }
//!
//! [[interface_config]]
//! config_id = { physical = { unit = 1, slot = 0, port = 1 } }
//! handle_hint = 1
//! config = { ip_mtu = 9100 }
//! ```

use std::fs;
use std::path::Path;

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::config_file::PlatformLimits;
use crate::error::{NimError, Result};
use crate::intf::{
    apply_config, ConfigId, ConfigSource, IanaType, InterfaceRegistry, IntfCreateRequest,
    IntfDescr, PersistedConfig, PersistedConfigStore, Usp,
};

/// One interface announced by the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedInterface {
    pub config_id: ConfigId,
    #[serde(default)]
    pub descr: IntfDescr,
}

/// Contents of a seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<SeedInterface>,
    #[serde(default, rename = "interface_config")]
    pub persisted: Vec<PersistedConfig>,
}

/// Outcome of populating the registry from a seed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub from_persisted: usize,
    pub from_default: usize,
    pub rejected: usize,
}

impl SeedFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            NimError::Configuration(format!(
                "Failed to parse seed file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Every front-panel port of the platform plus its CPU interfaces.
    pub fn default_topology(limits: &PlatformLimits) -> Self {
        let mut interfaces = Vec::new();
        for unit in 1..=limits.max_units {
            for slot in 0..limits.max_slots_per_unit {
                for port in 1..=limits.max_phys_ports_per_slot {
                    interfaces.push(SeedInterface {
                        config_id: ConfigId::Physical(Usp::new(unit, slot, port)),
                        descr: IntfDescr::new(IanaType::Eth100G),
                    });
                }
            }
        }
        let cpu_ports = u16::try_from(limits.max_cpu_intf).unwrap_or(u16::MAX);
        for port in 1..=cpu_ports {
            interfaces.push(SeedInterface {
                config_id: ConfigId::Cpu(Usp::new(1, limits.cpu_slot, port)),
                descr: IntfDescr::new(IanaType::OtherCpu),
            });
        }
        Self {
            interfaces,
            persisted: Vec::new(),
        }
    }

    /// Builds the persisted-config store sized for `registry`.
    pub fn store(&self, registry: &InterfaceRegistry) -> Result<PersistedConfigStore> {
        PersistedConfigStore::from_records(registry.capacity() as usize, self.persisted.clone())
    }
}

/// Creates every seeded interface and applies its configuration.
///
/// Per-interface failures are logged and counted; fatal errors abort.
pub fn populate(
    registry: &InterfaceRegistry,
    store: &mut PersistedConfigStore,
    interfaces: &[SeedInterface],
) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for intf in interfaces {
        let request = IntfCreateRequest::new(intf.config_id)
            .with_descr(intf.descr.clone())
            .with_preferred_handle(store.handle_hint(&intf.config_id));

        let handle = match registry.create_interface(request) {
            Ok(handle) => handle,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("NIM: Skipping {}: {}", intf.config_id, e);
                report.rejected += 1;
                continue;
            }
        };
        report.created += 1;

        match apply_config(registry, handle, store) {
            Ok(ConfigSource::FromPersisted) => report.from_persisted += 1,
            Ok(ConfigSource::FromDefault) => report.from_default += 1,
            Err(e) => {
                error!("NIM: Failed to set the config for interface {}: {}", handle, e);
                if e.is_fatal() {
                    return Err(e);
                }
            }
        }
    }

    Ok(report)
}
