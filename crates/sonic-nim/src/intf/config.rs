//! Interface configuration identity.
//!
//! Resolves the configuration an interface runs with: either the record
//! persisted under its ConfigID, or a default synthesized from the
//! interface's media descriptor.

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use super::registry::InterfaceRegistry;
use super::types::{
    ComboPreference, ConfigId, FeatureMode, FecMode, IanaType, IntIfNum, NegoCapabilities,
    PhyCapability, PortSpeed, SettableParms,
};
use crate::error::{NimError, Result};

/// Default IP MTU.
pub const DEFAULT_IP_MTU: u32 = 1500;

/// Default maximum frame size.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1518;

/// Static description of an interface as announced by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntfDescr {
    #[serde(default)]
    pub iana_type: IanaType,
    #[serde(default)]
    pub phy_capability: PhyCapability,
    #[serde(default)]
    pub settable_parms: SettableParms,
    /// Highest FEC mode the PHY supports.
    #[serde(default)]
    pub fec_capability: FecMode,
    /// FEC mode the PHY prefers when it supports more than plain enable.
    #[serde(default)]
    pub default_fec: FecMode,
}

impl IntfDescr {
    pub fn new(iana_type: IanaType) -> Self {
        Self {
            iana_type,
            ..Default::default()
        }
    }

    pub fn with_phy_capability(mut self, cap: PhyCapability) -> Self {
        self.phy_capability = cap;
        self
    }

    pub fn with_settable_parms(mut self, parms: SettableParms) -> Self {
        self.settable_parms = parms;
        self
    }

    pub fn with_fec(mut self, capability: FecMode, default_fec: FecMode) -> Self {
        self.fec_capability = capability;
        self.default_fec = default_fec;
        self
    }
}

/// Per-interface configuration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntfConfig {
    pub if_alias: String,
    pub admin_state: FeatureMode,
    pub trap_state: FeatureMode,
    pub if_speed: PortSpeed,
    /// Negotiation capabilities in effect.
    pub nego_capabilities: NegoCapabilities,
    /// Negotiation capabilities as configured by the operator.
    pub cfg_nego_capabilities: NegoCapabilities,
    pub fec_mode: FecMode,
    pub lt_mode: FeatureMode,
    pub ip_mtu: u32,
    pub cfg_max_frame_size: u32,
    pub combo_pref: ComboPreference,
    pub force_medium: bool,
}

impl Default for IntfConfig {
    fn default() -> Self {
        Self {
            if_alias: String::new(),
            admin_state: FeatureMode::Enable,
            trap_state: FeatureMode::Enable,
            if_speed: PortSpeed::Other,
            nego_capabilities: NegoCapabilities::empty(),
            cfg_nego_capabilities: NegoCapabilities::empty(),
            fec_mode: FecMode::Disabled,
            lt_mode: FeatureMode::Disable,
            ip_mtu: DEFAULT_IP_MTU,
            cfg_max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            combo_pref: ComboPreference::None,
            force_medium: false,
        }
    }
}

/// Speed and negotiation announced by the platform after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityCfg {
    pub if_speed: PortSpeed,
    pub nego_capabilities: NegoCapabilities,
}

impl CapabilityCfg {
    /// Overrides the speed/negotiation fields of `config`.
    pub fn apply_to(&self, config: &mut IntfConfig) {
        config.if_speed = self.if_speed;
        config.nego_capabilities = self.nego_capabilities;
    }
}

/// Where an interface's running configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    FromPersisted,
    FromDefault,
}

/// Synthesizes the default configuration for an interface.
///
/// Pure function of the descriptor. LAG and VLAN pseudo-types override the
/// media-derived values with fixed ones.
pub fn resolve_config(descr: &IntfDescr) -> IntfConfig {
    let cap = descr.phy_capability;
    let mut cfg = IntfConfig::default();

    if descr.settable_parms.contains(SettableParms::FEC_MODE) {
        cfg.fec_mode = FecMode::Auto;
    }
    if cap.contains(PhyCapability::FEC_SUPPORT) && descr.fec_capability > FecMode::Enabled {
        cfg.fec_mode = descr.default_fec;
    }

    if descr.settable_parms.contains(SettableParms::LT_MODE) {
        cfg.lt_mode = FeatureMode::Enable;
    }

    let auto_neg = cap.contains(PhyCapability::AUTO_NEG);
    if auto_neg && !cap.contains(PhyCapability::AUTO_CONFIG) {
        cfg.nego_capabilities = NegoCapabilities::ALL;
        cfg.cfg_nego_capabilities = NegoCapabilities::ALL;
    }

    if cap.contains(PhyCapability::COMBO_PREFERENCE) {
        cfg.force_medium = false;
        cfg.combo_pref = ComboPreference::Fiber;
    }

    let negotiable = |fixed: PortSpeed| if auto_neg { PortSpeed::AutoNeg } else { fixed };

    cfg.if_speed = match descr.iana_type {
        IanaType::FastEthernet | IanaType::FastEthernetFx => PortSpeed::Full100M,
        IanaType::GigabitEthernet => {
            if cap.contains(PhyCapability::FULL_100) {
                PortSpeed::Full100M
            } else {
                PortSpeed::Full1G
            }
        }
        IanaType::Eth2p5G => negotiable(PortSpeed::Full2500M),
        IanaType::Eth5G => negotiable(PortSpeed::Full5G),
        IanaType::Eth10G => negotiable(PortSpeed::Full10G),
        IanaType::Eth20G => PortSpeed::Full20G,
        IanaType::Eth25G => PortSpeed::Full25G,
        IanaType::Eth40G => PortSpeed::Full40G,
        IanaType::Eth50G => PortSpeed::Full50G,
        IanaType::Eth100G => PortSpeed::Full100G,
        IanaType::Eth200G => PortSpeed::Full200G,
        IanaType::Eth400G => PortSpeed::Full400G,
        IanaType::Lag => {
            cfg.trap_state = FeatureMode::Enable;
            cfg.admin_state = FeatureMode::Enable;
            cfg.nego_capabilities = NegoCapabilities::empty();
            PortSpeed::Lag
        }
        IanaType::L2Vlan => {
            cfg.admin_state = FeatureMode::Enable;
            cfg.trap_state = FeatureMode::Disable;
            cfg.nego_capabilities = NegoCapabilities::empty();
            PortSpeed::Full100G
        }
        IanaType::OtherCpu | IanaType::OtherServicePort | IanaType::Other => PortSpeed::Other,
    };

    cfg
}

// ============ Persisted configuration ============

/// A configuration record as persisted by the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub config_id: ConfigId,
    /// Handle the interface held when the record was saved.
    #[serde(default)]
    pub handle_hint: Option<IntIfNum>,
    pub config: IntfConfig,
}

/// Bounded table of persisted configuration records.
#[derive(Debug, Clone, Default)]
pub struct PersistedConfigStore {
    records: Vec<PersistedConfig>,
    capacity: usize,
    data_changed: bool,
}

impl PersistedConfigStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity,
            data_changed: false,
        }
    }

    /// Builds a store from already-persisted records.
    pub fn from_records(capacity: usize, records: Vec<PersistedConfig>) -> Result<Self> {
        let mut store = Self::new(capacity);
        for record in records {
            store.save(record)?;
        }
        store.data_changed = false;
        Ok(store)
    }

    /// Linear search by ConfigID.
    pub fn find(&self, config_id: &ConfigId) -> Option<&PersistedConfig> {
        self.records.iter().find(|r| r.config_id == *config_id)
    }

    /// Inserts or replaces the record for its ConfigID.
    pub fn save(&mut self, record: PersistedConfig) -> Result<()> {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.config_id == record.config_id)
        {
            *existing = record;
        } else {
            if self.records.len() >= self.capacity {
                return Err(NimError::exhausted("persisted config table"));
            }
            self.records.push(record);
        }
        self.data_changed = true;
        Ok(())
    }

    pub fn remove(&mut self, config_id: &ConfigId) -> Option<PersistedConfig> {
        let pos = self.records.iter().position(|r| r.config_id == *config_id)?;
        self.data_changed = true;
        Some(self.records.remove(pos))
    }

    /// Handle previously held by the interface with this ConfigID.
    pub fn handle_hint(&self, config_id: &ConfigId) -> Option<IntIfNum> {
        self.find(config_id).and_then(|r| r.handle_hint)
    }

    pub fn has_data_changed(&self) -> bool {
        self.data_changed
    }

    pub fn reset_data_changed(&mut self) {
        self.data_changed = false;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PersistedConfig> {
        self.records.iter()
    }
}

/// Installs the running configuration of `handle`.
///
/// Uses the persisted record with an equal ConfigID when there is one.
/// Otherwise the interface's default configuration is used, with any
/// dynamic capability override applied, and saved to `store`.
///
/// Lookup and install happen under one registry write lock. A default is
/// installed even when `store` cannot take it; the store error is returned
/// afterwards.
pub fn apply_config(
    registry: &InterfaceRegistry,
    handle: IntIfNum,
    store: &mut PersistedConfigStore,
) -> Result<ConfigSource> {
    let (config_id, dynamic_cap, saved) = registry.modify(handle, |rec| {
        if let Some(persisted) = store.find(&rec.config_id) {
            rec.config = persisted.config.clone();
            rec.config_source = Some(ConfigSource::FromPersisted);
            return (rec.config_id, None, None);
        }

        let mut config = rec.default_config.clone();
        if let Some(cap) = rec.dynamic_cap {
            cap.apply_to(&mut config);
        }
        rec.config = config.clone();
        rec.config_source = Some(ConfigSource::FromDefault);

        let saved = store.save(PersistedConfig {
            config_id: rec.config_id,
            handle_hint: Some(handle),
            config,
        });
        (rec.config_id, rec.dynamic_cap, Some(saved))
    })?;

    let Some(saved) = saved else {
        debug!("NIM: Interface {} ({}) using persisted config", handle, config_id);
        return Ok(ConfigSource::FromPersisted);
    };

    if let Some(cap) = dynamic_cap {
        debug!(
            "NIM: Interface {} using dynamic defaults speed {:?} nego {:#x}",
            handle,
            cap.if_speed,
            cap.nego_capabilities.bits()
        );
    }
    info!("NIM: Interface {} ({}) using default config", handle, config_id);

    if let Err(e) = saved {
        error!(
            "NIM: Unable to persist default config for interface {} ({}): {}",
            handle, config_id, e
        );
        return Err(e);
    }
    Ok(ConfigSource::FromDefault)
}
