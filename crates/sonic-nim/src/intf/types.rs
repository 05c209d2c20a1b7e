//! Interface identity types.
//!
//! This module defines the keys and value types shared by the registry and
//! the configuration layer: the USP address, the internal interface handle,
//! the typed ConfigID, the interface state machine, and the media and
//! capability descriptors used to synthesize default configuration.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config_file::PlatformLimits;
use crate::error::{NimError, Result};

/// Unit number carried by every logical interface.
pub const LOGICAL_UNIT: u8 = 0;

/// Slot numbers used for logical interface USPs.
pub mod logical_slot {
    pub const LAG: u8 = 1;
    pub const VLAN: u8 = 2;
    pub const LOOPBACK: u8 = 3;
    pub const TUNNEL: u8 = 4;
    pub const SERVICE_PORT: u8 = 5;
}

/// Highest configurable VLAN id.
pub const MAX_VLAN_ID: u32 = 4094;

/// Maximum length of an interface alias.
pub const IF_ALIAS_MAX_LEN: usize = 64;

// ============ Flag sets ============

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) {
            $( $(#[$fmeta:meta])* const $flag:ident = $value:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            $( $(#[$fmeta])* pub const $flag: Self = Self($value); )*

            /// The empty set.
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Raw bits.
            pub const fn bits(self) -> $repr {
                self.0
            }

            /// Returns true if every bit of `other` is set.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns true if no bit is set.
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

flag_set! {
    /// PHY capability bits announced by the platform.
    PhyCapability(u64) {
        const FULL_100 = 1 << 0;
        const FULL_1000 = 1 << 1;
        const FULL_2500 = 1 << 2;
        const FULL_5G = 1 << 3;
        const FULL_10G = 1 << 4;
        const FULL_25G = 1 << 5;
        const FULL_40G = 1 << 6;
        const FULL_50G = 1 << 7;
        const FULL_100G = 1 << 8;
        /// Speed can be auto-negotiated.
        const AUTO_NEG = 1 << 9;
        /// Speed is auto-configured by the PHY; no negotiation defaults.
        const AUTO_CONFIG = 1 << 10;
        /// Copper/fiber combo port with a medium preference.
        const COMBO_PREFERENCE = 1 << 11;
        const FEC_SUPPORT = 1 << 12;
        const EXPANDABLE = 1 << 13;
    }
}

flag_set! {
    /// Interface parameters that may be configured on this interface.
    SettableParms(u32) {
        const ADMIN_STATE = 1 << 0;
        const MTU = 1 << 1;
        const SPEED = 1 << 2;
        const AUTONEG = 1 << 3;
        const FEC_MODE = 1 << 4;
        const LT_MODE = 1 << 5;
    }
}

flag_set! {
    /// Speed/duplex capabilities advertised during negotiation.
    NegoCapabilities(u32) {
        const SPEED_10 = 1 << 0;
        const SPEED_100 = 1 << 1;
        const SPEED_1000 = 1 << 2;
        const SPEED_10G = 1 << 3;
        const SPEED_25G = 1 << 4;
        const SPEED_40G = 1 << 5;
        const SPEED_100G = 1 << 6;
        const ALL = 0x7f;
    }
}

flag_set! {
    /// Runtime status bits kept on each interface record.
    IntfStatusFlags(u32) {
        /// Port passed 802.1X/MAB authorization.
        const AUTHORIZED = 1 << 0;
        const LINK_UP = 1 << 1;
        /// Member of a LAG.
        const LAG_MEMBER = 1 << 2;
        /// Diagnostically disabled.
        const DIAG_DISABLED = 1 << 3;
    }
}

// ============ Addressing ============

/// Unit/Slot/Port address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Usp {
    pub unit: u8,
    pub slot: u8,
    pub port: u16,
}

impl Usp {
    pub const fn new(unit: u8, slot: u8, port: u16) -> Self {
        Self { unit, slot, port }
    }

    /// Returns true for USPs in the logical unit.
    pub fn is_logical(&self) -> bool {
        self.unit == LOGICAL_UNIT
    }

    /// Legacy external index: `unit << 24 | slot << 16 | port`.
    pub fn if_index(&self) -> u32 {
        (u32::from(self.unit) << 24) | (u32::from(self.slot) << 16) | u32::from(self.port)
    }
}

impl fmt::Display for Usp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.unit, self.slot, self.port)
    }
}

/// Internal interface handle, 1..=max interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntIfNum(pub u32);

impl IntIfNum {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for IntIfNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interface type. Declaration order is the order handle ranges are laid
/// out in and the order ConfigIDs compare by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntfType {
    Physical,
    Stack,
    Cpu,
    Lag,
    Vlan,
    Loopback,
    Tunnel,
    ServicePort,
}

impl IntfType {
    /// Every type, in handle-range order.
    pub const ALL: [IntfType; 8] = [
        IntfType::Physical,
        IntfType::Stack,
        IntfType::Cpu,
        IntfType::Lag,
        IntfType::Vlan,
        IntfType::Loopback,
        IntfType::Tunnel,
        IntfType::ServicePort,
    ];

    /// Returns true for types addressed by a hardware USP.
    pub fn is_usp_based(self) -> bool {
        matches!(self, IntfType::Physical | IntfType::Stack | IntfType::Cpu)
    }
}

impl fmt::Display for IntfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntfType::Physical => "PHYSICAL",
            IntfType::Stack => "STACK",
            IntfType::Cpu => "CPU",
            IntfType::Lag => "LAG",
            IntfType::Vlan => "VLAN",
            IntfType::Loopback => "LOOPBACK",
            IntfType::Tunnel => "TUNNEL",
            IntfType::ServicePort => "SERVICE_PORT",
        };
        f.write_str(s)
    }
}

// ============ ConfigID ============

/// Typed key correlating an interface with its persisted configuration.
///
/// Ordering compares the interface type first, then the type-specific
/// specifier (USP for physical, stack and CPU ports; a numeric id otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigId {
    Physical(Usp),
    Stack(Usp),
    Cpu(Usp),
    Lag(u32),
    Vlan(u32),
    Loopback(u32),
    Tunnel(u32),
    ServicePort(u32),
}

impl ConfigId {
    pub fn intf_type(&self) -> IntfType {
        match self {
            ConfigId::Physical(_) => IntfType::Physical,
            ConfigId::Stack(_) => IntfType::Stack,
            ConfigId::Cpu(_) => IntfType::Cpu,
            ConfigId::Lag(_) => IntfType::Lag,
            ConfigId::Vlan(_) => IntfType::Vlan,
            ConfigId::Loopback(_) => IntfType::Loopback,
            ConfigId::Tunnel(_) => IntfType::Tunnel,
            ConfigId::ServicePort(_) => IntfType::ServicePort,
        }
    }

    /// The USP this ConfigID addresses.
    ///
    /// Logical types map onto the logical unit with a per-type slot; LAG and
    /// VLAN ids are used as the port directly, zero-based ids are shifted
    /// by one so that port 0 is never produced for a valid id.
    pub fn usp(&self) -> Usp {
        let logical = |slot: u8, port: u32| {
            Usp::new(LOGICAL_UNIT, slot, u16::try_from(port).unwrap_or(u16::MAX))
        };
        match *self {
            ConfigId::Physical(usp) | ConfigId::Stack(usp) | ConfigId::Cpu(usp) => usp,
            ConfigId::Lag(id) => logical(logical_slot::LAG, id),
            ConfigId::Vlan(id) => logical(logical_slot::VLAN, id),
            ConfigId::Loopback(id) => logical(logical_slot::LOOPBACK, id.saturating_add(1)),
            ConfigId::Tunnel(id) => logical(logical_slot::TUNNEL, id.saturating_add(1)),
            ConfigId::ServicePort(id) => {
                logical(logical_slot::SERVICE_PORT, id.saturating_add(1))
            }
        }
    }

    /// Checks the specifier against the platform limits.
    pub fn validate(&self, limits: &PlatformLimits) -> Result<()> {
        match *self {
            ConfigId::Physical(usp) | ConfigId::Stack(usp) => validate_phys_usp(&usp, limits),
            ConfigId::Cpu(usp) => {
                check_range("unit", u32::from(usp.unit), 1, u32::from(limits.max_units))?;
                if usp.slot != limits.cpu_slot {
                    return Err(NimError::invalid_param(
                        "slot",
                        format!("CPU interface slot {} != {}", usp.slot, limits.cpu_slot),
                    ));
                }
                check_range("port", u32::from(usp.port), 1, limits.max_cpu_intf)
            }
            ConfigId::Lag(id) => check_range("lag id", id, 1, limits.max_lag_intf),
            ConfigId::Vlan(id) => check_range("vlan id", id, 1, MAX_VLAN_ID),
            ConfigId::Loopback(id) => check_id("loopback id", id, limits.max_loopback_intf),
            ConfigId::Tunnel(id) => check_id("tunnel id", id, limits.max_tunnel_intf),
            ConfigId::ServicePort(id) => {
                check_id("service port id", id, limits.max_service_port_intf)
            }
        }
    }

    fn specifier_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ConfigId::Physical(a), ConfigId::Physical(b))
            | (ConfigId::Stack(a), ConfigId::Stack(b))
            | (ConfigId::Cpu(a), ConfigId::Cpu(b)) => a.cmp(b),
            (ConfigId::Lag(a), ConfigId::Lag(b))
            | (ConfigId::Vlan(a), ConfigId::Vlan(b))
            | (ConfigId::Loopback(a), ConfigId::Loopback(b))
            | (ConfigId::Tunnel(a), ConfigId::Tunnel(b))
            | (ConfigId::ServicePort(a), ConfigId::ServicePort(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl Ord for ConfigId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.intf_type()
            .cmp(&other.intf_type())
            .then_with(|| self.specifier_cmp(other))
    }
}

impl PartialOrd for ConfigId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigId::Physical(usp) | ConfigId::Stack(usp) | ConfigId::Cpu(usp) => {
                write!(f, "{}:{}", self.intf_type(), usp)
            }
            ConfigId::Lag(id)
            | ConfigId::Vlan(id)
            | ConfigId::Loopback(id)
            | ConfigId::Tunnel(id)
            | ConfigId::ServicePort(id) => write!(f, "{}:{}", self.intf_type(), id),
        }
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(NimError::invalid_param(
            field,
            format!("{} is out of range {}..={}", value, min, max),
        ));
    }
    Ok(())
}

fn check_id(field: &'static str, id: u32, max: u32) -> Result<()> {
    if id >= max {
        return Err(NimError::invalid_param(
            field,
            format!("{} is out of range 0..{}", id, max),
        ));
    }
    Ok(())
}

/// Checks a physical/stack port USP against the platform limits.
pub fn validate_phys_usp(usp: &Usp, limits: &PlatformLimits) -> Result<()> {
    check_range("unit", u32::from(usp.unit), 1, u32::from(limits.max_units))?;
    if usp.slot >= limits.max_slots_per_unit {
        return Err(NimError::invalid_param(
            "slot",
            format!(
                "{} is out of range 0..{}",
                usp.slot, limits.max_slots_per_unit
            ),
        ));
    }
    check_range(
        "port",
        u32::from(usp.port),
        1,
        u32::from(limits.max_phys_ports_per_slot),
    )
}

// ============ State machine ============

/// Interface lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntfState {
    #[default]
    Uninitialized,
    Creating,
    Created,
    Attaching,
    Attached,
    Detaching,
    Deleting,
}

/// Lifecycle events driving [`IntfState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntfEvent {
    Create,
    CreateComplete,
    Attach,
    AttachComplete,
    Detach,
    DetachComplete,
    Delete,
    DeleteComplete,
}

impl IntfState {
    /// Returns the state reached by applying `event`, or `None` if the
    /// transition is not allowed.
    pub fn next(self, event: IntfEvent) -> Option<IntfState> {
        use IntfEvent as E;
        use IntfState as S;

        match (self, event) {
            (S::Uninitialized, E::Create) => Some(S::Creating),
            (S::Creating, E::CreateComplete) => Some(S::Created),
            (S::Created, E::Attach) => Some(S::Attaching),
            (S::Attaching, E::AttachComplete) => Some(S::Attached),
            (S::Attached, E::Detach) => Some(S::Detaching),
            (S::Detaching, E::DetachComplete) => Some(S::Created),
            (S::Created, E::Delete) => Some(S::Deleting),
            (S::Deleting, E::DeleteComplete) => Some(S::Uninitialized),
            _ => None,
        }
    }
}

impl fmt::Display for IntfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntfState::Uninitialized => "INTF_UNINITIALIZED",
            IntfState::Creating => "INTF_CREATING",
            IntfState::Created => "INTF_CREATED",
            IntfState::Attaching => "INTF_ATTACHING",
            IntfState::Attached => "INTF_ATTACHED",
            IntfState::Detaching => "INTF_DETACHING",
            IntfState::Deleting => "INTF_DELETING",
        };
        f.write_str(s)
    }
}

impl fmt::Display for IntfEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntfEvent::Create => "CREATE",
            IntfEvent::CreateComplete => "CREATE_COMPLETE",
            IntfEvent::Attach => "ATTACH",
            IntfEvent::AttachComplete => "ATTACH_COMPLETE",
            IntfEvent::Detach => "DETACH",
            IntfEvent::DetachComplete => "DETACH_COMPLETE",
            IntfEvent::Delete => "DELETE",
            IntfEvent::DeleteComplete => "DELETE_COMPLETE",
        };
        f.write_str(s)
    }
}

// ============ Media and modes ============

/// IANA interface media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IanaType {
    FastEthernet,
    FastEthernetFx,
    GigabitEthernet,
    #[serde(rename = "2p5g_ethernet")]
    Eth2p5G,
    #[serde(rename = "5g_ethernet")]
    Eth5G,
    #[serde(rename = "10g_ethernet")]
    Eth10G,
    #[serde(rename = "20g_ethernet")]
    Eth20G,
    #[serde(rename = "25g_ethernet")]
    Eth25G,
    #[serde(rename = "40g_ethernet")]
    Eth40G,
    #[serde(rename = "50g_ethernet")]
    Eth50G,
    #[serde(rename = "100g_ethernet")]
    Eth100G,
    #[serde(rename = "200g_ethernet")]
    Eth200G,
    #[serde(rename = "400g_ethernet")]
    Eth400G,
    Lag,
    L2Vlan,
    OtherCpu,
    OtherServicePort,
    #[default]
    Other,
}

/// Configured port speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSpeed {
    AutoNeg,
    Full100M,
    Full1G,
    Full2500M,
    Full5G,
    Full10G,
    Full20G,
    Full25G,
    Full40G,
    Full50G,
    Full100G,
    Full200G,
    Full400G,
    /// Aggregate speed of a LAG.
    Lag,
    #[default]
    Other,
}

/// Enable/disable mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
    #[default]
    Enable,
    Disable,
}

/// Forward error correction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FecMode {
    #[default]
    Disabled,
    Enabled,
    Auto,
    Fc,
    Rs,
}

/// Preferred medium on a combo port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComboPreference {
    #[default]
    None,
    Copper,
    Fiber,
}
