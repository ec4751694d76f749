//! Spatial Index
//!
//! Uniform grid over world space. Cell size is kept at twice the largest
//! device range, so any two devices that can link sit in the same or an
//! adjacent cell and a 3×3×3 block query finds every candidate.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::vec3::Vec3;
use crate::mesh::device::{Device, DeviceId};

/// Integer cell coordinates.
pub type CellKey = (i64, i64, i64);

/// Tuning for cell sizing and rebuild throttling.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexConfig {
    /// Cell size as a multiple of the maximum device range.
    pub cell_size_factor: f64,
    /// Smallest allowed cell size.
    pub min_cell_size: f64,
    /// Relative change in max range that forces a resize.
    pub range_change_ratio: f64,
    /// Absolute change in max range that forces a resize.
    pub range_change_abs: f64,
    /// Ticks between drift rebuilds.
    pub rebuild_interval_ticks: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cell_size_factor: 2.0,
            min_cell_size: 1.0,
            range_change_ratio: 0.10,
            range_change_abs: 100.0,
            rebuild_interval_ticks: 5 * crate::TICK_RATE as u64,
        }
    }
}

/// Why a rebuild happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildReason {
    /// Max range moved past the resize threshold.
    RangeChanged,
    /// Periodic refresh for position drift.
    Interval,
}

/// Grid of device ids keyed by cell.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    /// Max range the current cell size was computed from
    indexed_max_range: f64,
    cells: BTreeMap<CellKey, Vec<DeviceId>>,
    device_cells: BTreeMap<DeviceId, CellKey>,
    last_rebuild_tick: u64,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default().min_cell_size)
    }
}

impl SpatialIndex {
    /// Empty index with the given starting cell size.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(f64::MIN_POSITIVE),
            indexed_max_range: 0.0,
            cells: BTreeMap::new(),
            device_cells: BTreeMap::new(),
            last_rebuild_tick: 0,
        }
    }

    /// Current cell edge length.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of indexed devices.
    pub fn len(&self) -> usize {
        self.device_cells.len()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.device_cells.is_empty()
    }

    /// Tick of the last full rebuild.
    pub fn last_rebuild_tick(&self) -> u64 {
        self.last_rebuild_tick
    }

    /// Cell containing a position.
    #[inline]
    pub fn cell_key(&self, position: Vec3) -> CellKey {
        (
            cell_coord(position.x, self.cell_size),
            cell_coord(position.y, self.cell_size),
            cell_coord(position.z, self.cell_size),
        )
    }

    /// Cell a device was bucketed into, if indexed.
    pub fn cell_of(&self, id: DeviceId) -> Option<CellKey> {
        self.device_cells.get(&id).copied()
    }

    /// Cell size for a given maximum range.
    pub fn cell_size_for(max_range: f64, config: &IndexConfig) -> f64 {
        (max_range * config.cell_size_factor).max(config.min_cell_size)
    }

    /// Does a new max range call for a resize and full rebuild?
    pub fn needs_resize(&self, max_range: f64, config: &IndexConfig) -> bool {
        let delta = (max_range - self.indexed_max_range).abs();
        if delta > config.range_change_abs {
            return true;
        }
        if self.indexed_max_range <= 0.0 {
            return max_range > 0.0;
        }
        delta > self.indexed_max_range * config.range_change_ratio
    }

    /// Decide whether this tick needs a rebuild.
    pub fn rebuild_due(&self, max_range: f64, tick: u64, config: &IndexConfig) -> Option<RebuildReason> {
        if self.needs_resize(max_range, config) {
            return Some(RebuildReason::RangeChanged);
        }
        if tick.saturating_sub(self.last_rebuild_tick) >= config.rebuild_interval_ticks {
            return Some(RebuildReason::Interval);
        }
        None
    }

    /// Re-bucket every connectable device, resizing cells for `max_range`.
    pub fn rebuild<'a>(
        &mut self,
        devices: impl IntoIterator<Item = &'a Device>,
        max_range: f64,
        tick: u64,
        config: &IndexConfig,
    ) {
        self.cell_size = Self::cell_size_for(max_range, config);
        self.indexed_max_range = max_range;
        self.cells.clear();
        self.device_cells.clear();
        for device in devices {
            self.insert(device);
        }
        self.last_rebuild_tick = tick;
    }

    /// Bucket one device at its current position. Degenerate devices are skipped.
    ///
    /// Returns true if the device was indexed.
    pub fn insert(&mut self, device: &Device) -> bool {
        self.remove(device.id);
        if !device.is_connectable() {
            return false;
        }
        let key = self.cell_key(device.position);
        self.cells.entry(key).or_default().push(device.id);
        self.device_cells.insert(device.id, key);
        true
    }

    /// Re-bucket a device after it moved, only if its cell changed.
    ///
    /// Returns true if the grid was touched.
    pub fn refresh(&mut self, device: &Device) -> bool {
        if !device.is_connectable() {
            return self.remove(device.id);
        }
        let key = self.cell_key(device.position);
        if self.device_cells.get(&device.id) == Some(&key) {
            return false;
        }
        self.insert(device)
    }

    /// Drop a device from the grid.
    pub fn remove(&mut self, id: DeviceId) -> bool {
        let Some(key) = self.device_cells.remove(&id) else {
            return false;
        };
        if let Some(bucket) = self.cells.get_mut(&key) {
            bucket.retain(|d| *d != id);
            if bucket.is_empty() {
                self.cells.remove(&key);
            }
        }
        true
    }

    /// All devices in the 3×3×3 block of cells around `position`.
    pub fn query_near(&self, position: Vec3) -> Vec<DeviceId> {
        let (cx, cy, cz) = self.cell_key(position);
        let mut found = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) {
                        found.extend_from_slice(bucket);
                    }
                }
            }
        }
        found
    }

    /// Block query restricted to one network's members.
    pub fn query_near_in(&self, position: Vec3, members: &BTreeSet<DeviceId>) -> Vec<DeviceId> {
        let mut found = self.query_near(position);
        found.retain(|id| members.contains(id));
        found
    }
}

/// Grid coordinate along one axis.
///
/// Kept one step inside the `i64` range so the neighbor block around any
/// cell never overflows.
#[inline]
fn cell_coord(value: f64, cell_size: f64) -> i64 {
    let coord = (value / cell_size).floor() as i64;
    coord.clamp(i64::MIN + 1, i64::MAX - 1)
}
