//! Configuration file support for NIM
//!
//! Loads and validates platform limits and startup sequencer settings from
//! TOML files. Default location: /etc/sonic/nim.conf

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{NimError, Result};
use crate::intf::{IntIfNum, IntfType};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/nim.conf";

/// Platform limits that size the interface registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLimits {
    /// Number of stack units
    #[serde(default = "default_max_units")]
    pub max_units: u8,

    /// Slots per unit
    #[serde(default = "default_max_slots_per_unit")]
    pub max_slots_per_unit: u8,

    /// Front-panel ports per slot
    #[serde(default = "default_max_phys_ports_per_slot")]
    pub max_phys_ports_per_slot: u16,

    /// Slot number carrying CPU interfaces
    #[serde(default = "default_cpu_slot")]
    pub cpu_slot: u8,

    #[serde(default = "default_max_stack_intf")]
    pub max_stack_intf: u32,

    #[serde(default = "default_max_cpu_intf")]
    pub max_cpu_intf: u32,

    #[serde(default = "default_max_lag_intf")]
    pub max_lag_intf: u32,

    #[serde(default = "default_max_vlan_intf")]
    pub max_vlan_intf: u32,

    #[serde(default = "default_max_loopback_intf")]
    pub max_loopback_intf: u32,

    #[serde(default = "default_max_tunnel_intf")]
    pub max_tunnel_intf: u32,

    #[serde(default = "default_max_service_port_intf")]
    pub max_service_port_intf: u32,
}

/// Startup sequencer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Capacity of the startup registration table
    #[serde(default = "default_max_components")]
    pub max_components: usize,

    /// Depth of the worker message queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Upper bound on a single startup callback. Unset means wait forever.
    #[serde(default)]
    pub callback_timeout_ms: Option<u64>,
}

/// Complete NIM configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NimConfig {
    #[serde(default)]
    pub platform: PlatformLimits,

    #[serde(default)]
    pub startup: StartupConfig,
}

/// Inclusive range of handles reserved for one interface type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRange {
    pub first: IntIfNum,
    pub last: IntIfNum,
}

impl HandleRange {
    pub fn contains(&self, handle: IntIfNum) -> bool {
        handle >= self.first && handle <= self.last
    }

    /// Number of handles in the range.
    pub fn count(&self) -> u32 {
        self.last.get() - self.first.get() + 1
    }

    pub fn handles(&self) -> impl Iterator<Item = IntIfNum> {
        (self.first.get()..=self.last.get()).map(IntIfNum::new)
    }
}

// Default functions
fn default_max_units() -> u8 {
    1
}

fn default_max_slots_per_unit() -> u8 {
    1
}

fn default_max_phys_ports_per_slot() -> u16 {
    64
}

fn default_cpu_slot() -> u8 {
    4
}

fn default_max_stack_intf() -> u32 {
    0
}

fn default_max_cpu_intf() -> u32 {
    1
}

fn default_max_lag_intf() -> u32 {
    64
}

fn default_max_vlan_intf() -> u32 {
    128
}

fn default_max_loopback_intf() -> u32 {
    8
}

fn default_max_tunnel_intf() -> u32 {
    8
}

fn default_max_service_port_intf() -> u32 {
    1
}

fn default_max_components() -> usize {
    32
}

fn default_queue_depth() -> usize {
    16
}

// Default implementations
impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            max_units: default_max_units(),
            max_slots_per_unit: default_max_slots_per_unit(),
            max_phys_ports_per_slot: default_max_phys_ports_per_slot(),
            cpu_slot: default_cpu_slot(),
            max_stack_intf: default_max_stack_intf(),
            max_cpu_intf: default_max_cpu_intf(),
            max_lag_intf: default_max_lag_intf(),
            max_vlan_intf: default_max_vlan_intf(),
            max_loopback_intf: default_max_loopback_intf(),
            max_tunnel_intf: default_max_tunnel_intf(),
            max_service_port_intf: default_max_service_port_intf(),
        }
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            max_components: default_max_components(),
            queue_depth: default_queue_depth(),
            callback_timeout_ms: None,
        }
    }
}

impl PlatformLimits {
    /// Number of physical front-panel interfaces.
    pub fn max_physical_intf(&self) -> u32 {
        u32::from(self.max_units)
            * u32::from(self.max_slots_per_unit)
            * u32::from(self.max_phys_ports_per_slot)
    }

    /// Maximum number of interfaces of the given type.
    pub fn max_for_type(&self, intf_type: IntfType) -> u32 {
        match intf_type {
            IntfType::Physical => self.max_physical_intf(),
            IntfType::Stack => self.max_stack_intf,
            IntfType::Cpu => self.max_cpu_intf,
            IntfType::Lag => self.max_lag_intf,
            IntfType::Vlan => self.max_vlan_intf,
            IntfType::Loopback => self.max_loopback_intf,
            IntfType::Tunnel => self.max_tunnel_intf,
            IntfType::ServicePort => self.max_service_port_intf,
        }
    }

    /// Registry capacity: the sum of all per-type maxima, or `None` if it
    /// does not fit a handle.
    pub fn total_max_interfaces(&self) -> Option<u32> {
        IntfType::ALL
            .iter()
            .try_fold(0u32, |acc, t| acc.checked_add(self.max_for_type(*t)))
    }

    /// Handle range reserved for `intf_type`, or `None` if the type has no
    /// interfaces on this platform or the layout overflows.
    pub fn range_for_type(&self, intf_type: IntfType) -> Option<HandleRange> {
        let mut next = 1u32;
        for t in IntfType::ALL {
            let count = self.max_for_type(t);
            if t == intf_type {
                if count == 0 {
                    return None;
                }
                return Some(HandleRange {
                    first: IntIfNum::new(next),
                    last: IntIfNum::new(next.checked_add(count - 1)?),
                });
            }
            next = next.checked_add(count)?;
        }
        None
    }
}

impl StartupConfig {
    /// Get the callback bound as Duration
    pub fn callback_timeout(&self) -> Option<Duration> {
        self.callback_timeout_ms.map(Duration::from_millis)
    }
}

impl NimConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    NimError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "nim: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(NimError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let p = &self.platform;

        if p.max_units == 0 || p.max_slots_per_unit == 0 || p.max_phys_ports_per_slot == 0 {
            return Err(NimError::Configuration(
                "max_units, max_slots_per_unit and max_phys_ports_per_slot must be > 0"
                    .to_string(),
            ));
        }

        // Logical ids become the port field of the logical USP.
        let port_max = u32::from(u16::MAX) - 1;
        for (name, value) in [
            ("max_lag_intf", p.max_lag_intf),
            ("max_loopback_intf", p.max_loopback_intf),
            ("max_tunnel_intf", p.max_tunnel_intf),
            ("max_service_port_intf", p.max_service_port_intf),
            ("max_cpu_intf", p.max_cpu_intf),
        ] {
            if value > port_max {
                return Err(NimError::Configuration(format!(
                    "{} must be <= {}",
                    name, port_max
                )));
            }
        }

        if p.total_max_interfaces().is_none() {
            return Err(NimError::Configuration(
                "total interface count overflows".to_string(),
            ));
        }

        if self.startup.max_components == 0 {
            return Err(NimError::Configuration(
                "max_components must be > 0".to_string(),
            ));
        }

        if self.startup.queue_depth == 0 {
            return Err(NimError::Configuration(
                "queue_depth must be > 0".to_string(),
            ));
        }

        if self.startup.callback_timeout_ms == Some(0) {
            return Err(NimError::Configuration(
                "callback_timeout_ms must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NimConfig::default();
        assert_eq!(config.platform.max_units, 1);
        assert_eq!(config.platform.max_phys_ports_per_slot, 64);
        assert_eq!(config.startup.max_components, 32);
        assert!(config.startup.callback_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ranges_are_contiguous_in_type_order() {
        let limits = PlatformLimits::default();
        let phys = limits.range_for_type(IntfType::Physical).unwrap();
        assert_eq!(phys.first, IntIfNum::new(1));
        assert_eq!(phys.last, IntIfNum::new(64));

        // No stack ports by default.
        assert!(limits.range_for_type(IntfType::Stack).is_none());

        let cpu = limits.range_for_type(IntfType::Cpu).unwrap();
        assert_eq!(cpu.first, IntIfNum::new(65));
        assert_eq!(cpu.count(), 1);

        let lag = limits.range_for_type(IntfType::Lag).unwrap();
        assert_eq!(lag.first, IntIfNum::new(66));
        assert_eq!(lag.count(), 64);

        let last = limits.range_for_type(IntfType::ServicePort).unwrap();
        assert_eq!(Some(last.last.get()), limits.total_max_interfaces());
    }

    #[test]
    fn test_oversized_limits_do_not_overflow() {
        let limits = PlatformLimits {
            max_lag_intf: u32::MAX,
            max_vlan_intf: u32::MAX,
            ..Default::default()
        };
        assert_eq!(limits.total_max_interfaces(), None);
        // Ranges before the overflow are still laid out.
        assert!(limits.range_for_type(IntfType::Cpu).is_some());
        assert!(limits.range_for_type(IntfType::Lag).is_none());
        assert!(limits.range_for_type(IntfType::Vlan).is_none());

        let config = NimConfig {
            platform: limits,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ports() {
        let mut config = NimConfig::default();
        config.platform.max_phys_ports_per_slot = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = NimConfig::default();
        config.startup.callback_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[platform]
max_units = 2
max_phys_ports_per_slot = 32

[startup]
callback_timeout_ms = 5000
"#;
        let config: NimConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.platform.max_units, 2);
        assert_eq!(config.platform.max_physical_intf(), 64);
        assert_eq!(
            config.startup.callback_timeout(),
            Some(Duration::from_secs(5))
        );
        // Unspecified values should use defaults
        assert_eq!(config.platform.max_lag_intf, 64);
        assert_eq!(config.startup.queue_depth, 16);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[platform]\nmax_lag_intf = 8").unwrap();
        let config = NimConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.platform.max_lag_intf, 8);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[platform\nmax_units = ").unwrap();
        let result = NimConfig::load_or_default(file.path());
        assert!(matches!(result, Err(NimError::Configuration(_))));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = NimConfig::load_or_default("/nonexistent/nim.conf").unwrap();
        assert_eq!(config, NimConfig::default());
    }
}
