//! State Distribution
//!
//! Per-interval recompute of every member's reachable set, packaged as
//! per-device and per-player views. The views replace the previous ones
//! wholesale; differences are reported as events.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::core::capability::Capabilities;
use crate::core::signal::link_signal;
use crate::core::vec3::Vec3;
use crate::mesh::device::{DeviceId, PlayerId};
use crate::mesh::events::MeshEvent;
use crate::mesh::network::NetworkId;
use crate::mesh::state::MeshState;

// =============================================================================
// VIEWS
// =============================================================================

/// What one device sees of a reachable peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    /// Peer device
    pub device: DeviceId,
    /// Live position
    pub position: Vec3,
    /// Display name from join time
    pub display_name: String,
    /// Live capabilities
    pub capabilities: Capabilities,
    /// Address within the network
    pub address: u32,
    /// Signal strength (0-100)
    pub signal: f64,
}

/// Reachable peers of one device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceView {
    /// The device
    pub device: DeviceId,
    /// Its network
    pub network_id: NetworkId,
    /// Owning player, if any
    pub owner: Option<PlayerId>,
    /// Peers keyed by id
    pub peers: BTreeMap<DeviceId, PeerSnapshot>,
}

impl DeviceView {
    /// Reachable peer ids in order.
    pub fn member_ids(&self) -> Vec<DeviceId> {
        self.peers.keys().copied().collect()
    }
}

/// Aggregate view for one player over all their devices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    /// The player
    pub player: PlayerId,
    /// Other players reachable through any owned device (sorted, no self)
    pub visible_players: Vec<PlayerId>,
    /// Reachable devices with the video-source capability
    pub broadcasting_sources: Vec<DeviceId>,
}

/// Output of one fan-out pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FanoutBatch {
    /// Tick the batch was computed on
    pub tick: u64,
    /// One view per network member, in device order
    pub device_views: Vec<DeviceView>,
    /// One view per player owning a registered device
    pub player_views: Vec<PlayerView>,
}

impl FanoutBatch {
    /// Views of devices owned by `player`.
    pub fn views_for(&self, player: PlayerId) -> impl Iterator<Item = &DeviceView> {
        self.device_views.iter().filter(move |v| v.owner == Some(player))
    }
}

// =============================================================================
// COMPUTE
// =============================================================================

/// Compute every view from current state. Read-only.
pub fn compute_fanout(state: &MeshState) -> FanoutBatch {
    let resolver = state.resolver();
    let mut device_views = Vec::new();

    for network in state.networks.values() {
        for component in resolver.components(&network.member_ids()) {
            for &device_id in &component {
                let Some(device) = state.registry.get(device_id) else {
                    continue;
                };

                let peers = component
                    .iter()
                    .filter(|peer_id| **peer_id != device_id)
                    .filter_map(|peer_id| {
                        let peer = state.registry.get(*peer_id)?;
                        let info = network.member(*peer_id)?;
                        let distance = device.position.distance(peer.position);
                        Some((*peer_id, PeerSnapshot {
                            device: *peer_id,
                            position: peer.position,
                            display_name: info.display_name.clone(),
                            capabilities: peer.capabilities,
                            address: info.address,
                            signal: link_signal(distance, device.range, peer.range),
                        }))
                    })
                    .collect();

                device_views.push(DeviceView {
                    device: device_id,
                    network_id: network.id,
                    owner: device.owner,
                    peers,
                });
            }
        }
    }
    device_views.sort_by_key(|v| v.device);

    let player_views = state
        .registry
        .owners()
        .into_iter()
        .map(|player| player_view(state, player, &device_views))
        .collect();

    FanoutBatch {
        tick: state.tick,
        device_views,
        player_views,
    }
}

fn player_view(state: &MeshState, player: PlayerId, device_views: &[DeviceView]) -> PlayerView {
    let mut visible = BTreeSet::new();
    let mut sources = BTreeSet::new();

    for view in device_views.iter().filter(|v| v.owner == Some(player)) {
        for peer in view.peers.values() {
            if let Some(other) = state.registry.get(peer.device).and_then(|d| d.owner) {
                if other != player {
                    visible.insert(other);
                }
            }
            if peer.capabilities.contains(Capabilities::VIDEO_SOURCE) {
                sources.insert(peer.device);
            }
        }
    }

    PlayerView {
        player,
        visible_players: visible.into_iter().collect(),
        broadcasting_sources: sources.into_iter().collect(),
    }
}

// =============================================================================
// APPLY
// =============================================================================

/// Replace the cached views with `batch`, emitting events for what changed.
pub fn apply_fanout(state: &mut MeshState, batch: &FanoutBatch) {
    let tick = state.tick;

    let new_views: BTreeMap<DeviceId, DeviceView> = batch
        .device_views
        .iter()
        .map(|v| (v.device, v.clone()))
        .collect();
    let new_players: BTreeMap<PlayerId, PlayerView> = batch
        .player_views
        .iter()
        .map(|v| (v.player, v.clone()))
        .collect();

    let mut events = Vec::new();

    let devices: BTreeSet<DeviceId> = state.views.keys().chain(new_views.keys()).copied().collect();
    for device in devices {
        // Unregistered devices have no one left to tell
        if !state.registry.contains(device) {
            continue;
        }
        let old = state.views.get(&device).map(DeviceView::member_ids).unwrap_or_default();
        let new = new_views.get(&device).map(DeviceView::member_ids).unwrap_or_default();
        if old != new {
            events.push(MeshEvent::connectivity_updated(tick, device, new));
        }
    }

    let players: BTreeSet<PlayerId> = state.player_views.keys().chain(new_players.keys()).copied().collect();
    for player in players {
        let old = state.player_views.get(&player).map(|v| v.broadcasting_sources.clone()).unwrap_or_default();
        let new = new_players.get(&player).map(|v| v.broadcasting_sources.clone()).unwrap_or_default();
        if old != new {
            events.push(MeshEvent::broadcasting_sources_changed(tick, player, new));
        }
    }

    state.views = new_views;
    state.player_views = new_players;
    for event in events {
        state.push_event(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================
