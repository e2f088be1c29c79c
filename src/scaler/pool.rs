use crate::config::ScalerUnitConfig;
use crate::foundation::core::DisplayKind;
use crate::foundation::error::{HwcError, HwcResult};
use crate::hw::device::HwDevices;
use crate::scaler::caps::LocalPathCaps;
use crate::scaler::unit::{BindingMode, ScalerUnit, UnitStats};
use smallvec::SmallVec;
use std::time::Duration;

/// Local-path unit a display may try this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalCandidate {
    /// Unit index.
    pub unit: usize,
    /// Streaming limits.
    pub caps: LocalPathCaps,
}

/// Scaler units one display may reserve this frame, in preference order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScalerBudget {
    /// Local-path unit, if one is wired to the display and claimable in local mode.
    pub local: Option<LocalCandidate>,
    /// Memory-to-memory candidates: units homed to the display, shared units, then idle units
    /// homed to the other display.
    pub m2m: SmallVec<[usize; 4]>,
}

/// Pool-level counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Units instantiated so far.
    pub units_created: u64,
    /// Bindings taken from the external display by the primary display.
    pub preemptions: u64,
    /// Bindings released.
    pub releases: u64,
}

/// Read-only view of one unit for debug dumps.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct UnitSnapshot {
    /// Unit index.
    pub unit: usize,
    /// Home display, `None` for shared units.
    pub home: Option<DisplayKind>,
    /// Whether the unit has been instantiated.
    pub created: bool,
    /// Current binding.
    pub mode: BindingMode,
    /// Destination ring length.
    pub ring_len: usize,
    /// Unit counters.
    pub stats: UnitStats,
}

/// Scaler units shared by both displays.
///
/// Units are created on first use. Arbitration is a precedence rule: the primary display may
/// take a unit the external display holds, unless that unit is homed to the external display;
/// the external display never takes a unit the primary holds.
#[derive(Debug)]
pub struct ScalerPool {
    configs: Vec<ScalerUnitConfig>,
    units: Vec<Option<ScalerUnit>>,
    preempted: [bool; 2],
    stats: PoolStats,
}

impl ScalerPool {
    /// Pool for the units described by `configs`.
    pub fn new(configs: Vec<ScalerUnitConfig>) -> Self {
        let units = configs.iter().map(|_| None).collect();
        Self {
            configs,
            units,
            preempted: [false; 2],
            stats: PoolStats::default(),
        }
    }

    /// Unit descriptions.
    pub fn configs(&self) -> &[ScalerUnitConfig] {
        &self.configs
    }

    /// Pool counters.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Current binding of `unit`; uncreated units are unbound.
    pub fn mode(&self, unit: usize) -> BindingMode {
        self.units
            .get(unit)
            .and_then(Option::as_ref)
            .map_or(BindingMode::Unbound, ScalerUnit::mode)
    }

    /// Instantiated unit, if any.
    pub fn unit(&self, unit: usize) -> Option<&ScalerUnit> {
        self.units.get(unit).and_then(Option::as_ref)
    }

    pub(crate) fn unit_mut(&mut self, unit: usize) -> Option<&mut ScalerUnit> {
        self.units.get_mut(unit).and_then(Option::as_mut)
    }

    fn may_take(&self, display: DisplayKind, unit: usize) -> bool {
        match self.mode(unit).owner() {
            None => true,
            Some(owner) if owner == display => true,
            Some(_) => {
                display == DisplayKind::Primary
                    && self.configs[unit].home != Some(DisplayKind::External)
            }
        }
    }

    /// Units `display` may reserve this frame.
    pub fn budget(&self, display: DisplayKind) -> ScalerBudget {
        let local = self.configs.iter().enumerate().find_map(|(unit, cfg)| {
            let caps = cfg.local_path.filter(|l| l.display == display)?;
            let claimable = match self.mode(unit) {
                BindingMode::Unbound => true,
                BindingMode::Local(owner) => owner == display || self.may_take(display, unit),
                BindingMode::M2m(owner) => owner != display && self.may_take(display, unit),
            };
            claimable.then_some(LocalCandidate { unit, caps })
        });

        let mut m2m = SmallVec::new();
        let homed = |unit: usize| self.configs[unit].home == Some(display);
        let shared = |unit: usize| self.configs[unit].home.is_none();
        let foreign = |unit: usize| self.configs[unit].home == Some(display.other());
        for unit in (0..self.configs.len()).filter(|&u| homed(u)) {
            if self.may_take(display, unit) {
                m2m.push(unit);
            }
        }
        for unit in (0..self.configs.len()).filter(|&u| shared(u)) {
            if self.may_take(display, unit) {
                m2m.push(unit);
            }
        }
        for unit in (0..self.configs.len()).filter(|&u| foreign(u)) {
            let mode = self.mode(unit);
            if mode == BindingMode::Unbound || mode.owner() == Some(display) {
                m2m.push(unit);
            }
        }
        ScalerBudget { local, m2m }
    }

    /// Bind `unit` to `mode` for its display, creating and preempting as needed.
    pub(crate) fn acquire(
        &mut self,
        devices: &mut HwDevices,
        unit: usize,
        mode: BindingMode,
        timeout: Duration,
    ) -> HwcResult<&mut ScalerUnit> {
        let Some(taker) = mode.owner() else {
            return Err(HwcError::invariant("acquire needs a bound mode"));
        };
        if unit >= self.units.len() {
            return Err(HwcError::invariant(format!(
                "scaler {unit} outside pool of {}",
                self.units.len()
            )));
        }
        if !self.may_take(taker, unit) {
            return Err(HwcError::resource(format!(
                "scaler {unit} held by {:?}",
                self.mode(unit).owner()
            )));
        }

        let current = self.mode(unit);
        if let Some(owner) = current.owner()
            && owner != taker
        {
            tracing::debug!(unit, from = ?owner, to = ?taker, "scaler preempted");
            self.release(devices, unit, timeout);
            self.preempted[owner.index()] = true;
            self.stats.preemptions += 1;
        } else if let (BindingMode::M2m(_), BindingMode::Local(_)) = (current, mode) {
            // Back through unbound; a memory-to-memory unit cannot switch to local in place.
            self.release(devices, unit, timeout);
        }

        let slot = &mut self.units[unit];
        if slot.is_none() {
            self.stats.units_created += 1;
        }
        let u = slot.get_or_insert_with(|| ScalerUnit::new(unit));
        u.bind(devices, mode, timeout)?;
        Ok(u)
    }

    /// Release `unit`, whoever holds it.
    pub(crate) fn release(&mut self, devices: &mut HwDevices, unit: usize, timeout: Duration) {
        if let Some(u) = self.unit_mut(unit)
            && u.mode() != BindingMode::Unbound
        {
            u.release(devices, timeout);
            self.stats.releases += 1;
        }
    }

    /// Release memory-to-memory units of `display` not listed in `keep`.
    ///
    /// Local-path bindings persist until [`ScalerPool::release_local`]; an idle local unit is only
    /// stopped.
    pub(crate) fn release_unused(
        &mut self,
        devices: &mut HwDevices,
        display: DisplayKind,
        keep: &[usize],
        timeout: Duration,
    ) {
        for unit in 0..self.units.len() {
            if keep.contains(&unit) {
                continue;
            }
            match self.mode(unit) {
                BindingMode::M2m(owner) if owner == display => {
                    self.release(devices, unit, timeout);
                }
                BindingMode::Local(owner) if owner == display => {
                    if let Some(u) = self.unit_mut(unit) {
                        u.drain(devices, timeout);
                    }
                }
                _ => {}
            }
        }
    }

    /// Release the local-path binding of `display`. Returns `true` if one existed.
    pub(crate) fn release_local(
        &mut self,
        devices: &mut HwDevices,
        display: DisplayKind,
        timeout: Duration,
    ) -> bool {
        let held: SmallVec<[usize; 2]> = (0..self.units.len())
            .filter(|&u| self.mode(u) == BindingMode::Local(display))
            .collect();
        for &unit in &held {
            self.release(devices, unit, timeout);
        }
        !held.is_empty()
    }

    /// Release every unit held by `display` and close their device nodes.
    pub(crate) fn release_display(
        &mut self,
        devices: &mut HwDevices,
        display: DisplayKind,
        timeout: Duration,
    ) {
        for unit in 0..self.units.len() {
            if self.mode(unit).owner() == Some(display) {
                self.release(devices, unit, timeout);
                devices.scaler.destroy(unit);
                self.units[unit] = None;
            }
        }
    }

    /// Take the pending preemption notice of `display`.
    pub(crate) fn take_preempted(&mut self, display: DisplayKind) -> bool {
        std::mem::take(&mut self.preempted[display.index()])
    }

    /// State of every unit.
    pub fn snapshot(&self) -> Vec<UnitSnapshot> {
        self.configs
            .iter()
            .enumerate()
            .map(|(unit, cfg)| {
                let u = self.unit(unit);
                UnitSnapshot {
                    unit,
                    home: cfg.home,
                    created: u.is_some(),
                    mode: self.mode(unit),
                    ring_len: u.map_or(0, ScalerUnit::ring_len),
                    stats: u.map(ScalerUnit::stats).unwrap_or_default(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scaler/pool.rs"]
mod tests;
