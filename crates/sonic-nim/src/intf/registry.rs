//! Interface identity registry.
//!
//! The registry owns one flat array of interface records indexed by internal
//! handle, plus three ordered indices (USP, ConfigID, ifIndex) that map back
//! to the handle. All of it sits behind a single reader/writer lock: every
//! mutation takes the writer side for exactly one logical operation, so the
//! four structures are never observed out of step.

use log::{debug, info, warn};
use parking_lot::RwLock;

use super::config::{resolve_config, CapabilityCfg, ConfigSource, IntfConfig, IntfDescr};
use super::types::{
    ConfigId, FeatureMode, IntIfNum, IntfEvent, IntfState, IntfStatusFlags, IntfType, Usp,
    IF_ALIAS_MAX_LEN,
};
use crate::config_file::{HandleRange, PlatformLimits};
use crate::error::{NimError, Result};
use crate::tree::OrderedIndex;

const TYPE_COUNT: usize = IntfType::ALL.len();

/// One interface, as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub handle: IntIfNum,
    pub intf_type: IntfType,
    pub usp: Usp,
    pub config_id: ConfigId,
    pub if_index: u32,
    pub state: IntfState,
    pub status: IntfStatusFlags,
    pub descr: IntfDescr,
    /// Configuration synthesized (or supplied) at creation.
    pub default_config: IntfConfig,
    /// Running configuration.
    pub config: IntfConfig,
    /// Set once the running configuration has been applied.
    pub config_source: Option<ConfigSource>,
    pub dynamic_cap: Option<CapabilityCfg>,
}

/// Parameters for [`InterfaceRegistry::create_interface`].
#[derive(Debug, Clone)]
pub struct IntfCreateRequest {
    pub config_id: ConfigId,
    pub descr: IntfDescr,
    /// Overrides the default synthesized from `descr`.
    pub default_config: Option<IntfConfig>,
    /// Handle to use if it is free and inside the type's range.
    pub preferred_handle: Option<IntIfNum>,
}

impl IntfCreateRequest {
    pub fn new(config_id: ConfigId) -> Self {
        Self {
            config_id,
            descr: IntfDescr::default(),
            default_config: None,
            preferred_handle: None,
        }
    }

    pub fn with_descr(mut self, descr: IntfDescr) -> Self {
        self.descr = descr;
        self
    }

    pub fn with_default_config(mut self, config: IntfConfig) -> Self {
        self.default_config = Some(config);
        self
    }

    pub fn with_preferred_handle(mut self, handle: Option<IntIfNum>) -> Self {
        self.preferred_handle = handle;
        self
    }
}

/// Registry counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub interfaces_created: u64,
    pub interfaces_deleted: u64,
    pub creates_rejected: u64,
}

struct RegistryState {
    /// Index 0 is never used.
    records: Vec<Option<InterfaceRecord>>,
    by_usp: OrderedIndex<Usp, IntIfNum>,
    by_config_id: OrderedIndex<ConfigId, IntIfNum>,
    by_if_index: OrderedIndex<u32, IntIfNum>,
    type_counts: [u32; TYPE_COUNT],
    highest_handle: Option<IntIfNum>,
    stats: RegistryStats,
}

impl RegistryState {
    fn record(&self, handle: IntIfNum) -> Option<&InterfaceRecord> {
        self.records.get(handle.index()).and_then(Option::as_ref)
    }

    fn is_free(&self, handle: IntIfNum) -> bool {
        self.record(handle).is_none()
    }

    fn check_unique(&self, usp: &Usp, config_id: &ConfigId, if_index: u32) -> Result<()> {
        if self.by_usp.contains(usp) {
            return Err(NimError::already_exists(format!("USP {}", usp)));
        }
        if self.by_config_id.contains(config_id) {
            return Err(NimError::already_exists(format!("ConfigID {}", config_id)));
        }
        if self.by_if_index.contains(&if_index) {
            return Err(NimError::already_exists(format!("ifIndex {}", if_index)));
        }
        Ok(())
    }

    /// Inserts the three index entries, undoing partial inserts on failure.
    fn link(&mut self, handle: IntIfNum, usp: Usp, config_id: ConfigId, if_index: u32) -> Result<()> {
        self.by_usp
            .insert(usp, handle)
            .map_err(|e| NimError::from_tree(e, "USP index"))?;

        if let Err(e) = self.by_config_id.insert(config_id, handle) {
            let _ = self.by_usp.delete(&usp);
            return Err(NimError::from_tree(e, "ConfigID index"));
        }

        if let Err(e) = self.by_if_index.insert(if_index, handle) {
            let _ = self.by_config_id.delete(&config_id);
            let _ = self.by_usp.delete(&usp);
            return Err(NimError::from_tree(e, "ifIndex index"));
        }

        Ok(())
    }
}

/// Registry of every interface known to NIM.
pub struct InterfaceRegistry {
    limits: PlatformLimits,
    ranges: [Option<HandleRange>; TYPE_COUNT],
    max_handle: u32,
    state: RwLock<RegistryState>,
}

impl InterfaceRegistry {
    /// Creates an empty registry sized by the platform limits.
    pub fn new(limits: PlatformLimits) -> Result<Self> {
        let max_handle = limits.total_max_interfaces().ok_or_else(|| {
            NimError::invalid_param("limits", "total interface count overflows a handle")
        })?;
        let capacity = max_handle as usize;

        let mut records = Vec::new();
        records
            .try_reserve_exact(capacity + 1)
            .map_err(|_| NimError::OutOfMemory {
                what: "interface records",
                capacity,
            })?;
        records.resize_with(capacity + 1, || None);

        let state = RegistryState {
            records,
            by_usp: OrderedIndex::create(capacity)
                .map_err(|e| NimError::from_tree(e, "USP index"))?,
            by_config_id: OrderedIndex::create(capacity)
                .map_err(|e| NimError::from_tree(e, "ConfigID index"))?,
            by_if_index: OrderedIndex::create(capacity)
                .map_err(|e| NimError::from_tree(e, "ifIndex index"))?,
            type_counts: [0; TYPE_COUNT],
            highest_handle: None,
            stats: RegistryStats::default(),
        };

        let ranges = IntfType::ALL.map(|t| limits.range_for_type(t));

        info!("NIM: Interface registry created with {} handles", max_handle);

        Ok(Self {
            limits,
            ranges,
            max_handle,
            state: RwLock::new(state),
        })
    }

    pub fn limits(&self) -> &PlatformLimits {
        &self.limits
    }

    /// Highest valid handle (the registry capacity).
    pub fn capacity(&self) -> u32 {
        self.max_handle
    }

    /// Number of present interfaces.
    pub fn len(&self) -> usize {
        self.state.read().by_usp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handle range reserved for `intf_type`.
    pub fn range_for_type(&self, intf_type: IntfType) -> Option<HandleRange> {
        self.ranges[intf_type as usize]
    }

    // ============ Create / delete ============

    /// Registers a new interface and returns its handle.
    ///
    /// The USP, type and ifIndex are derived from the ConfigID. The handle is
    /// the requested one when it is free and inside the type's range, else
    /// the lowest free handle of that range.
    pub fn create_interface(&self, request: IntfCreateRequest) -> Result<IntIfNum> {
        let config_id = request.config_id;
        let intf_type = config_id.intf_type();
        let usp = config_id.usp();
        let if_index = usp.if_index();
        let default_config = request
            .default_config
            .unwrap_or_else(|| resolve_config(&request.descr));

        let mut state = self.state.write();

        let handle = match self.reserve_handle(&state, &config_id, request.preferred_handle) {
            Ok(handle) => handle,
            Err(e) => {
                state.stats.creates_rejected += 1;
                warn!("NIM: Create of {} rejected: {}", config_id, e);
                return Err(e);
            }
        };

        if let Err(e) = state.link(handle, usp, config_id, if_index) {
            state.stats.creates_rejected += 1;
            warn!("NIM: Create of {} rejected: {}", config_id, e);
            return Err(e);
        }

        state.records[handle.index()] = Some(InterfaceRecord {
            handle,
            intf_type,
            usp,
            config_id,
            if_index,
            state: IntfState::Creating,
            status: IntfStatusFlags::empty(),
            descr: request.descr,
            config: default_config.clone(),
            default_config,
            config_source: None,
            dynamic_cap: None,
        });
        state.type_counts[intf_type as usize] += 1;
        state.highest_handle = state.highest_handle.max(Some(handle));
        state.stats.interfaces_created += 1;
        drop(state);

        info!(
            "NIM: Created interface {} type {} usp {} ifIndex {}",
            handle, intf_type, usp, if_index
        );
        Ok(handle)
    }

    /// Validates a create request and picks its handle. Touches nothing.
    fn reserve_handle(
        &self,
        state: &RegistryState,
        config_id: &ConfigId,
        preferred: Option<IntIfNum>,
    ) -> Result<IntIfNum> {
        config_id.validate(&self.limits)?;

        let usp = config_id.usp();
        state.check_unique(&usp, config_id, usp.if_index())?;

        let intf_type = config_id.intf_type();
        let range = self
            .range_for_type(intf_type)
            .ok_or_else(|| NimError::exhausted(format!("{} handles", intf_type)))?;

        if let Some(handle) = preferred.filter(|h| range.contains(*h) && state.is_free(*h)) {
            return Ok(handle);
        }
        if let Some(handle) = preferred {
            debug!(
                "NIM: Preferred handle {} unavailable for {}, allocating",
                handle, config_id
            );
        }

        range
            .handles()
            .find(|h| state.is_free(*h))
            .ok_or_else(|| NimError::exhausted(format!("{} handles", intf_type)))
    }

    /// Removes an interface and its three index entries.
    pub fn delete_interface(&self, handle: IntIfNum) -> Result<()> {
        self.check_range(handle)?;

        let mut state = self.state.write();
        let record = state.records[handle.index()]
            .take()
            .ok_or_else(|| NimError::not_found(format!("interface {}", handle)))?;

        let results = [
            state.by_usp.delete(&record.usp).map(|_| ()),
            state.by_config_id.delete(&record.config_id).map(|_| ()),
            state.by_if_index.delete(&record.if_index).map(|_| ()),
        ];
        state.type_counts[record.intf_type as usize] -= 1;
        state.stats.interfaces_deleted += 1;
        drop(state);

        if results.iter().any(|r| r.is_err()) {
            warn!("NIM: Interface {} had missing index entries on delete", handle);
        }

        info!(
            "NIM: Deleted interface {} type {} usp {}",
            handle, record.intf_type, record.usp
        );
        Ok(())
    }

    // ============ Lookups ============

    pub fn lookup_by_usp(&self, usp: &Usp) -> Result<IntIfNum> {
        self.state
            .read()
            .by_usp
            .find_exact(usp)
            .copied()
            .ok_or_else(|| NimError::not_found(format!("USP {}", usp)))
    }

    pub fn lookup_by_config_id(&self, config_id: &ConfigId) -> Result<IntIfNum> {
        self.state
            .read()
            .by_config_id
            .find_exact(config_id)
            .copied()
            .ok_or_else(|| NimError::not_found(format!("ConfigID {}", config_id)))
    }

    pub fn lookup_by_if_index(&self, if_index: u32) -> Result<IntIfNum> {
        self.state
            .read()
            .by_if_index
            .find_exact(&if_index)
            .copied()
            .ok_or_else(|| NimError::not_found(format!("ifIndex {}", if_index)))
    }

    /// Lowest ifIndex in use, with its handle.
    pub fn if_index_first(&self) -> Result<(u32, IntIfNum)> {
        self.if_index_next(0)
    }

    /// Next ifIndex above `if_index`, with its handle.
    pub fn if_index_next(&self, if_index: u32) -> Result<(u32, IntIfNum)> {
        self.state
            .read()
            .by_if_index
            .find_next(&if_index)
            .map(|(k, h)| (*k, *h))
            .ok_or_else(|| NimError::not_found(format!("ifIndex after {}", if_index)))
    }

    /// Lowest present handle of any type.
    pub fn first_valid(&self) -> Result<IntIfNum> {
        self.scan(1..=self.max_handle, |_| true)
            .ok_or_else(|| NimError::not_found("valid interface"))
    }

    /// Next present handle above `handle`, of any type.
    pub fn next_valid(&self, handle: IntIfNum) -> Result<IntIfNum> {
        self.scan(handle.get().saturating_add(1)..=self.max_handle, |_| true)
            .ok_or_else(|| NimError::not_found(format!("interface after {}", handle)))
    }

    /// Lowest present handle of `intf_type`.
    pub fn first_of_type(&self, intf_type: IntfType) -> Result<IntIfNum> {
        let range = self.type_range_or_not_found(intf_type)?;
        self.scan(range.first.get()..=range.last.get(), |r| r.intf_type == intf_type)
            .ok_or_else(|| NimError::not_found(format!("{} interface", intf_type)))
    }

    /// Next present handle of `intf_type` above `handle`.
    pub fn next_of_type(&self, intf_type: IntfType, handle: IntIfNum) -> Result<IntIfNum> {
        let range = self.type_range_or_not_found(intf_type)?;
        let start = range.first.get().max(handle.get().saturating_add(1));
        self.scan(start..=range.last.get(), |r| r.intf_type == intf_type)
            .ok_or_else(|| NimError::not_found(format!("{} interface after {}", intf_type, handle)))
    }

    /// Number of present interfaces of `intf_type`.
    pub fn count_of_type(&self, intf_type: IntfType) -> u32 {
        self.state.read().type_counts[intf_type as usize]
    }

    /// Highest handle handed out since the registry was created.
    pub fn highest_handle(&self) -> Option<IntIfNum> {
        self.state.read().highest_handle
    }

    pub fn stats(&self) -> RegistryStats {
        self.state.read().stats.clone()
    }

    fn type_range_or_not_found(&self, intf_type: IntfType) -> Result<HandleRange> {
        self.range_for_type(intf_type)
            .ok_or_else(|| NimError::not_found(format!("{} interface", intf_type)))
    }

    fn scan<F>(&self, handles: std::ops::RangeInclusive<u32>, filter: F) -> Option<IntIfNum>
    where
        F: Fn(&InterfaceRecord) -> bool,
    {
        let state = self.state.read();
        handles
            .filter_map(|h| state.records.get(h as usize)?.as_ref())
            .find(|r| filter(r))
            .map(|r| r.handle)
    }

    // ============ Accessors ============

    /// Checks that a handle is in range and present.
    ///
    /// Returns `NotExist` for a handle that can never be valid and
    /// `NotFound` for one that is valid but currently absent.
    pub fn check_handle(&self, handle: IntIfNum) -> Result<()> {
        self.with_record(handle, |_| ())
    }

    pub fn get_usp(&self, handle: IntIfNum) -> Result<Usp> {
        self.with_record(handle, |r| r.usp)
    }

    pub fn get_config_id(&self, handle: IntIfNum) -> Result<ConfigId> {
        self.with_record(handle, |r| r.config_id)
    }

    pub fn get_if_index(&self, handle: IntIfNum) -> Result<u32> {
        self.with_record(handle, |r| r.if_index)
    }

    pub fn get_type(&self, handle: IntIfNum) -> Result<IntfType> {
        self.with_record(handle, |r| r.intf_type)
    }

    pub fn get_state(&self, handle: IntIfNum) -> Result<IntfState> {
        self.with_record(handle, |r| r.state)
    }

    /// Interface type of whatever is registered at `usp`.
    pub fn type_from_usp(&self, usp: &Usp) -> Result<IntfType> {
        let state = self.state.read();
        let handle = state
            .by_usp
            .find_exact(usp)
            .copied()
            .ok_or_else(|| NimError::not_found(format!("USP {}", usp)))?;
        state
            .record(handle)
            .map(|r| r.intf_type)
            .ok_or_else(|| NimError::not_found(format!("interface {}", handle)))
    }

    /// Snapshot of the full record.
    pub fn record(&self, handle: IntIfNum) -> Result<InterfaceRecord> {
        self.with_record(handle, Clone::clone)
    }

    pub fn running_config(&self, handle: IntIfNum) -> Result<IntfConfig> {
        self.with_record(handle, |r| r.config.clone())
    }

    pub fn admin_state(&self, handle: IntIfNum) -> Result<FeatureMode> {
        self.with_record(handle, |r| r.config.admin_state)
    }

    pub fn set_admin_state(&self, handle: IntIfNum, mode: FeatureMode) -> Result<()> {
        self.modify(handle, |r| r.config.admin_state = mode)
    }

    pub fn if_alias(&self, handle: IntIfNum) -> Result<String> {
        self.with_record(handle, |r| r.config.if_alias.clone())
    }

    pub fn set_if_alias(&self, handle: IntIfNum, alias: &str) -> Result<()> {
        if alias.len() > IF_ALIAS_MAX_LEN {
            return Err(NimError::invalid_param(
                "if_alias",
                format!("length {} exceeds {}", alias.len(), IF_ALIAS_MAX_LEN),
            ));
        }
        let alias = alias.to_string();
        self.modify(handle, |r| r.config.if_alias = alias)
    }

    pub fn status_flags(&self, handle: IntIfNum) -> Result<IntfStatusFlags> {
        self.with_record(handle, |r| r.status)
    }

    pub fn set_status_flags(&self, handle: IntIfNum, flags: IntfStatusFlags) -> Result<()> {
        self.modify(handle, |r| r.status.insert(flags))
    }

    pub fn clear_status_flags(&self, handle: IntIfNum, flags: IntfStatusFlags) -> Result<()> {
        self.modify(handle, |r| r.status.remove(flags))
    }

    pub fn is_authorized(&self, handle: IntIfNum) -> Result<bool> {
        self.with_record(handle, |r| r.status.contains(IntfStatusFlags::AUTHORIZED))
    }

    pub fn set_authorized(&self, handle: IntIfNum, authorized: bool) -> Result<()> {
        if authorized {
            self.set_status_flags(handle, IntfStatusFlags::AUTHORIZED)
        } else {
            self.clear_status_flags(handle, IntfStatusFlags::AUTHORIZED)
        }
    }

    /// Applies a lifecycle event and returns the new state.
    pub fn transition(&self, handle: IntIfNum, event: IntfEvent) -> Result<IntfState> {
        let (from, to) = self.modify(handle, |r| {
            let from = r.state;
            let to = from.next(event);
            if let Some(next) = to {
                r.state = next;
            }
            (from, to)
        })?;

        match to {
            Some(next) => {
                debug!("NIM: Interface {} {} -> {} on {}", handle, from, next, event);
                Ok(next)
            }
            None => Err(NimError::InvalidState {
                handle: handle.get(),
                state: from.to_string(),
                event: event.to_string(),
            }),
        }
    }

    /// Records the capability announced for `handle`, or withdraws it.
    ///
    /// Interfaces running on their default configuration pick up the new
    /// speed/negotiation immediately; persisted configuration is left alone.
    pub fn set_dynamic_capability(
        &self,
        handle: IntIfNum,
        cap: Option<CapabilityCfg>,
    ) -> Result<()> {
        self.modify(handle, |r| {
            r.dynamic_cap = cap;
            if r.config_source == Some(ConfigSource::FromDefault) {
                match cap {
                    Some(cap) => cap.apply_to(&mut r.config),
                    None => {
                        r.config.if_speed = r.default_config.if_speed;
                        r.config.nego_capabilities = r.default_config.nego_capabilities;
                    }
                }
            }
        })
    }

    // ============ Record access ============

    fn check_range(&self, handle: IntIfNum) -> Result<()> {
        if handle.get() == 0 || handle.get() > self.max_handle {
            return Err(NimError::NotExist(handle.get()));
        }
        Ok(())
    }

    /// Runs `f` on the record under the read lock.
    pub(crate) fn with_record<R, F>(&self, handle: IntIfNum, f: F) -> Result<R>
    where
        F: FnOnce(&InterfaceRecord) -> R,
    {
        self.check_range(handle)?;
        let state = self.state.read();
        state
            .record(handle)
            .map(f)
            .ok_or_else(|| NimError::not_found(format!("interface {}", handle)))
    }

    /// Runs `f` on the record under the write lock.
    ///
    /// Identity fields (USP, ConfigID, ifIndex, type) must not be changed.
    pub(crate) fn modify<R, F>(&self, handle: IntIfNum, f: F) -> Result<R>
    where
        F: FnOnce(&mut InterfaceRecord) -> R,
    {
        self.check_range(handle)?;
        let mut state = self.state.write();
        state.records[handle.index()]
            .as_mut()
            .map(f)
            .ok_or_else(|| NimError::not_found(format!("interface {}", handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intf::types::{IanaType, PortSpeed};
    use pretty_assertions::assert_eq;

    fn small_limits() -> PlatformLimits {
        PlatformLimits {
            max_units: 1,
            max_slots_per_unit: 1,
            max_phys_ports_per_slot: 4,
            cpu_slot: 4,
            max_stack_intf: 0,
            max_cpu_intf: 1,
            max_lag_intf: 2,
            max_vlan_intf: 2,
            max_loopback_intf: 1,
            max_tunnel_intf: 1,
            max_service_port_intf: 1,
        }
    }

    fn phys(port: u16) -> IntfCreateRequest {
        IntfCreateRequest::new(ConfigId::Physical(Usp::new(1, 0, port)))
            .with_descr(IntfDescr::new(IanaType::Eth10G))
    }

    #[test]
    fn test_create_and_lookup() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let h = reg.create_interface(phys(2)).unwrap();
        assert_eq!(h, IntIfNum::new(1));

        let usp = Usp::new(1, 0, 2);
        assert_eq!(reg.lookup_by_usp(&usp).unwrap(), h);
        assert_eq!(
            reg.lookup_by_config_id(&ConfigId::Physical(usp)).unwrap(),
            h
        );
        assert_eq!(reg.lookup_by_if_index(usp.if_index()).unwrap(), h);
        assert_eq!(reg.get_type(h).unwrap(), IntfType::Physical);
        assert_eq!(reg.get_state(h).unwrap(), IntfState::Creating);
        assert_eq!(reg.running_config(h).unwrap().if_speed, PortSpeed::Full10G);
    }

    #[test]
    fn test_duplicate_usp_rejected() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        reg.create_interface(phys(1)).unwrap();
        let err = reg.create_interface(phys(1)).unwrap_err();
        assert!(matches!(err, NimError::AlreadyExists { .. }));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.stats().creates_rejected, 1);
    }

    #[test]
    fn test_parameter_error_is_distinct() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let err = reg.create_interface(phys(5)).unwrap_err();
        assert!(matches!(err, NimError::InvalidParam { field: "port", .. }));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_logical_handles_come_from_type_range() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let lag = reg
            .create_interface(IntfCreateRequest::new(ConfigId::Lag(2)))
            .unwrap();
        let range = reg.range_for_type(IntfType::Lag).unwrap();
        assert_eq!(lag, range.first);
        assert_eq!(reg.get_usp(lag).unwrap(), Usp::new(0, 1, 2));
    }

    #[test]
    fn test_type_exhaustion() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        reg.create_interface(IntfCreateRequest::new(ConfigId::Vlan(10)))
            .unwrap();
        reg.create_interface(IntfCreateRequest::new(ConfigId::Vlan(20)))
            .unwrap();
        let err = reg
            .create_interface(IntfCreateRequest::new(ConfigId::Vlan(30)))
            .unwrap_err();
        assert!(matches!(err, NimError::Exhausted { .. }));
        assert_eq!(reg.count_of_type(IntfType::Vlan), 2);
        assert!(reg.lookup_by_config_id(&ConfigId::Vlan(30)).is_err());
    }

    #[test]
    fn test_type_without_range_is_exhausted() {
        let mut limits = small_limits();
        limits.max_stack_intf = 0;
        let reg = InterfaceRegistry::new(limits).unwrap();
        let err = reg
            .create_interface(IntfCreateRequest::new(ConfigId::Stack(Usp::new(1, 0, 1))))
            .unwrap_err();
        assert!(matches!(err, NimError::Exhausted { .. }));
    }

    #[test]
    fn test_preferred_handle() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let h = reg
            .create_interface(phys(1).with_preferred_handle(Some(IntIfNum::new(3))))
            .unwrap();
        assert_eq!(h, IntIfNum::new(3));

        // Taken: fall back to the lowest free handle.
        let h = reg
            .create_interface(phys(2).with_preferred_handle(Some(IntIfNum::new(3))))
            .unwrap();
        assert_eq!(h, IntIfNum::new(1));

        // Outside the physical range: ignored.
        let lag_first = reg.range_for_type(IntfType::Lag).unwrap().first;
        let h = reg
            .create_interface(phys(3).with_preferred_handle(Some(lag_first)))
            .unwrap();
        assert_eq!(h, IntIfNum::new(2));
        assert_eq!(reg.highest_handle(), Some(IntIfNum::new(3)));
    }

    #[test]
    fn test_delete_clears_all_indices() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let h = reg.create_interface(phys(4)).unwrap();
        let usp = reg.get_usp(h).unwrap();
        let if_index = reg.get_if_index(h).unwrap();

        reg.delete_interface(h).unwrap();
        assert!(reg.lookup_by_usp(&usp).unwrap_err().is_not_found());
        assert!(reg
            .lookup_by_config_id(&ConfigId::Physical(usp))
            .unwrap_err()
            .is_not_found());
        assert!(reg.lookup_by_if_index(if_index).unwrap_err().is_not_found());
        assert!(matches!(
            reg.delete_interface(h),
            Err(NimError::NotFound { .. })
        ));
        assert_eq!(reg.stats().interfaces_deleted, 1);
    }

    #[test]
    fn test_check_handle_distinguishes_not_exist() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        assert!(matches!(
            reg.check_handle(IntIfNum::new(0)),
            Err(NimError::NotExist(0))
        ));
        let beyond = IntIfNum::new(reg.capacity() + 1);
        assert!(matches!(
            reg.check_handle(beyond),
            Err(NimError::NotExist(_))
        ));
        assert!(matches!(
            reg.get_usp(IntIfNum::new(1)),
            Err(NimError::NotFound { .. })
        ));
    }

    #[test]
    fn test_enumeration() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let p1 = reg.create_interface(phys(3)).unwrap();
        let p2 = reg.create_interface(phys(1)).unwrap();
        let lag = reg
            .create_interface(IntfCreateRequest::new(ConfigId::Lag(1)))
            .unwrap();

        assert_eq!(reg.first_of_type(IntfType::Physical).unwrap(), p1);
        assert_eq!(reg.next_of_type(IntfType::Physical, p1).unwrap(), p2);
        assert!(reg.next_of_type(IntfType::Physical, p2).is_err());
        assert_eq!(reg.first_of_type(IntfType::Lag).unwrap(), lag);
        assert!(reg.first_of_type(IntfType::Vlan).is_err());

        let mut all = vec![reg.first_valid().unwrap()];
        while let Ok(next) = reg.next_valid(*all.last().unwrap()) {
            all.push(next);
        }
        assert_eq!(all, vec![p1, p2, lag]);

        // ifIndex order: logical unit 0 sorts before unit 1.
        let (first_if, first_h) = reg.if_index_first().unwrap();
        assert_eq!(first_h, lag);
        let (second_if, second_h) = reg.if_index_next(first_if).unwrap();
        assert_eq!(second_h, p2);
        let (_, third_h) = reg.if_index_next(second_if).unwrap();
        assert_eq!(third_h, p1);
    }

    #[test]
    fn test_type_from_usp() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        reg.create_interface(IntfCreateRequest::new(ConfigId::Loopback(0)))
            .unwrap();
        assert_eq!(
            reg.type_from_usp(&Usp::new(0, 3, 1)).unwrap(),
            IntfType::Loopback
        );
    }

    #[test]
    fn test_status_flags_and_alias() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let h = reg.create_interface(phys(1)).unwrap();

        assert!(!reg.is_authorized(h).unwrap());
        reg.set_authorized(h, true).unwrap();
        reg.set_status_flags(h, IntfStatusFlags::LINK_UP).unwrap();
        assert!(reg.is_authorized(h).unwrap());
        reg.set_authorized(h, false).unwrap();
        assert_eq!(reg.status_flags(h).unwrap(), IntfStatusFlags::LINK_UP);

        reg.set_if_alias(h, "uplink").unwrap();
        assert_eq!(reg.if_alias(h).unwrap(), "uplink");
        let long = "x".repeat(IF_ALIAS_MAX_LEN + 1);
        assert!(matches!(
            reg.set_if_alias(h, &long),
            Err(NimError::InvalidParam { .. })
        ));

        reg.set_admin_state(h, FeatureMode::Disable).unwrap();
        assert_eq!(reg.admin_state(h).unwrap(), FeatureMode::Disable);
    }

    #[test]
    fn test_transition() {
        let reg = InterfaceRegistry::new(small_limits()).unwrap();
        let h = reg.create_interface(phys(1)).unwrap();
        assert_eq!(
            reg.transition(h, IntfEvent::CreateComplete).unwrap(),
            IntfState::Created
        );
        assert_eq!(
            reg.transition(h, IntfEvent::Attach).unwrap(),
            IntfState::Attaching
        );
        let err = reg.transition(h, IntfEvent::Delete).unwrap_err();
        assert!(matches!(err, NimError::InvalidState { .. }));
        assert_eq!(reg.get_state(h).unwrap(), IntfState::Attaching);
    }

    #[test]
    fn test_overflowing_limits_rejected() {
        let limits = PlatformLimits {
            max_lag_intf: u32::MAX,
            ..small_limits()
        };
        let err = InterfaceRegistry::new(limits).err().unwrap();
        assert!(matches!(err, NimError::InvalidParam { field: "limits", .. }));
    }
}
