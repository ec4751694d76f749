//! Engine Tick
//!
//! One fixed-rate update. Steps run strictly in order:
//! registry refresh, index rebuild check, merge pass, then (on fan-out
//! ticks) connectivity recompute and distribution.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::mesh::device::{DeviceId, DeviceUpdate};
use crate::mesh::events::MeshEvent;
use crate::mesh::fanout::{apply_fanout, compute_fanout, FanoutBatch};
use crate::mesh::lifecycle::{merge_check, MergeRecord};
use crate::mesh::spatial::{IndexConfig, RebuildReason};
use crate::mesh::state::MeshState;

/// Engine tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshConfig {
    /// Spatial index sizing and rebuild policy
    pub index: IndexConfig,
    /// Ticks between connectivity fan-outs
    pub fanout_interval_ticks: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            fanout_interval_ticks: 1,
        }
    }
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Tick that just ran
    pub tick: u64,
    /// Events generated this tick
    pub events: Vec<MeshEvent>,
    /// Fan-out computed this tick, if it was a fan-out tick
    pub fanout: Option<FanoutBatch>,
    /// Merges performed
    pub merges: Vec<MergeRecord>,
    /// Why the index was rebuilt, if it was
    pub index_rebuild: Option<RebuildReason>,
    /// Devices dropped for losing network access
    pub unregistered: Vec<DeviceId>,
}

/// Run one engine tick.
///
/// `updates` are this tick's directory samples (BTreeMap for deterministic
/// order). Samples for unknown devices are ignored.
pub fn tick(state: &mut MeshState, updates: &BTreeMap<DeviceId, DeviceUpdate>) -> TickResult {
    let mut result = TickResult::default();

    // 0. Advance tick counter
    state.tick += 1;
    result.tick = state.tick;

    // 1. Registry refresh
    result.unregistered = apply_updates(state, updates);

    // 2. Index rebuild (throttled)
    result.index_rebuild = maybe_rebuild_index(state);

    // 3. Merge pass
    result.merges = merge_check(state);

    // 4-5. Recompute and distribute
    let interval = state.config.fanout_interval_ticks.max(1);
    if state.tick % interval == 0 {
        let batch = compute_fanout(state);
        apply_fanout(state, &batch);

        #[cfg(feature = "debug-tracing")]
        for view in &batch.device_views {
            tracing::trace!(
                "tick {} {} sees {:?}",
                state.tick,
                view.device,
                view.member_ids()
            );
        }

        result.fanout = Some(batch);
    }

    // Collect events
    result.events = state.take_events();

    result
}

/// Apply directory samples. Returns devices unregistered for capability loss.
fn apply_updates(state: &mut MeshState, updates: &BTreeMap<DeviceId, DeviceUpdate>) -> Vec<DeviceId> {
    let mut dropped = Vec::new();

    for (&id, update) in updates {
        let Some(device) = state.registry.get_mut(id) else {
            debug!("Update for unknown device {} ignored", id);
            continue;
        };
        device.apply(update);

        if !device.capabilities.has_network_access() {
            dropped.push(id);
            continue;
        }
        // Keep buckets current so both ends of a link see each other
        state.index.refresh(device);
    }

    for &id in &dropped {
        info!("Device {} lost network access", id);
        state.unregister_device(id);
    }
    dropped
}

fn maybe_rebuild_index(state: &mut MeshState) -> Option<RebuildReason> {
    let max_range = state.registry.max_range();
    let reason = state.index.rebuild_due(max_range, state.tick, &state.config.index)?;
    state.rebuild_index();
    if reason == RebuildReason::RangeChanged {
        debug!(
            "Index resized for max range {:.1} (cell {:.1})",
            max_range,
            state.index.cell_size()
        );
    }
    Some(reason)
}

// =============================================================================
// TESTS
// =============================================================================
