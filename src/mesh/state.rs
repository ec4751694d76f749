//! Mesh State
//!
//! The context object that owns every registry the engine touches: devices,
//! the spatial index, networks and the last fan-out. It is passed into every
//! operation explicitly; there is no global instance.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::mesh::connectivity::Resolver;
use crate::mesh::device::{Device, DeviceId, DeviceRegistry, PlayerId};
use crate::mesh::events::MeshEvent;
use crate::mesh::fanout::{DeviceView, PlayerView};
use crate::mesh::lifecycle::{on_device_unregistered, MeshError};
use crate::mesh::network::{Network, NetworkId};
use crate::mesh::spatial::SpatialIndex;
use crate::mesh::tick::MeshConfig;

// =============================================================================
// PLAYER MEMBERSHIP
// =============================================================================

/// One of a player's devices and the network it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerMembership {
    /// The player's device
    pub device: DeviceId,
    /// Network the device is in
    pub network_id: NetworkId,
    /// Network name
    pub network_name: String,
    /// Device address in that network
    pub address: u32,
    /// All members of the network
    pub members: Vec<DeviceId>,
}

// =============================================================================
// MESH STATE
// =============================================================================

/// Complete engine state.
#[derive(Clone, Debug)]
pub struct MeshState {
    /// Current tick
    pub tick: u64,

    /// Engine tuning
    pub config: MeshConfig,

    /// Registered devices
    pub(crate) registry: DeviceRegistry,

    /// Grid over connectable devices
    pub(crate) index: SpatialIndex,

    /// Live networks (BTreeMap for deterministic iteration)
    pub(crate) networks: BTreeMap<NetworkId, Network>,

    /// Device -> network it belongs to (at most one)
    pub(crate) memberships: BTreeMap<DeviceId, NetworkId>,

    /// Next network ID (monotonic counter)
    pub(crate) next_network_id: u32,

    /// Per-device views from the last fan-out
    pub(crate) views: BTreeMap<DeviceId, DeviceView>,

    /// Per-player views from the last fan-out
    pub(crate) player_views: BTreeMap<PlayerId, PlayerView>,

    /// Events generated since the last drain
    pub(crate) pending_events: Vec<MeshEvent>,
}

impl Default for MeshState {
    fn default() -> Self {
        Self::new(MeshConfig::default())
    }
}

impl MeshState {
    /// Create an empty state.
    pub fn new(config: MeshConfig) -> Self {
        let index = SpatialIndex::new(config.index.min_cell_size);
        Self {
            tick: 0,
            config,
            registry: DeviceRegistry::new(),
            index,
            networks: BTreeMap::new(),
            memberships: BTreeMap::new(),
            next_network_id: 1,
            views: BTreeMap::new(),
            player_views: BTreeMap::new(),
            pending_events: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Device registry
    // -------------------------------------------------------------------------

    /// Register a network-capable device, or replace its record.
    ///
    /// The device is bucketed immediately. If its range outgrows the current
    /// cells the index is rebuilt on the spot.
    pub fn register_device(&mut self, device: Device) -> Result<(), MeshError> {
        if !device.capabilities.has_network_access() {
            return Err(MeshError::DeviceNotEligible(device.id));
        }

        let outgrows_cells = device.is_connectable()
            && device.range * self.config.index.cell_size_factor > self.index.cell_size();
        let id = device.id;

        if self.registry.insert(device).is_some() {
            debug!("Device {} re-registered", id);
        } else {
            debug!("Device {} registered", id);
        }

        if outgrows_cells {
            self.rebuild_index();
        } else if let Some(device) = self.registry.get(id) {
            self.index.insert(device);
        }
        Ok(())
    }

    /// Unregister a device. Cascades into leaving its network.
    pub fn unregister_device(&mut self, id: DeviceId) -> Option<Device> {
        if !self.registry.contains(id) {
            return None;
        }
        on_device_unregistered(self, id);
        self.index.remove(id);
        self.views.remove(&id);
        debug!("Device {} unregistered", id);
        self.registry.remove(id)
    }

    /// Get a device by ID.
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.registry.get(id)
    }

    /// The device registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The spatial index.
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Force a full index rebuild at the current max range.
    pub fn rebuild_index(&mut self) {
        let max_range = self.registry.max_range();
        self.index.rebuild(self.registry.iter(), max_range, self.tick, &self.config.index);
    }

    /// Graph queries over the current registry and index.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registry, &self.index)
    }

    // -------------------------------------------------------------------------
    // Networks
    // -------------------------------------------------------------------------

    /// Get a network by ID.
    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(&id)
    }

    /// Network a device belongs to.
    pub fn network_of(&self, device: DeviceId) -> Option<&Network> {
        self.memberships
            .get(&device)
            .and_then(|id| self.networks.get(id))
    }

    /// ID of the network a device belongs to.
    pub fn network_id_of(&self, device: DeviceId) -> Option<NetworkId> {
        self.memberships.get(&device).copied()
    }

    /// Members of a network, in id order.
    pub fn members(&self, id: NetworkId) -> Option<Vec<DeviceId>> {
        self.networks.get(&id).map(Network::member_list)
    }

    /// Iterate live networks in id order.
    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// Number of live networks.
    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    /// Allocate the next network id.
    pub(crate) fn allocate_network_id(&mut self) -> NetworkId {
        let id = NetworkId(self.next_network_id);
        self.next_network_id += 1;
        id
    }

    // -------------------------------------------------------------------------
    // Queries over the last fan-out
    // -------------------------------------------------------------------------

    /// Peers reachable from a device as of the last fan-out.
    pub fn connected_members(&self, device: DeviceId) -> Option<&DeviceView> {
        self.views.get(&device)
    }

    /// Player-level view as of the last fan-out.
    pub fn player_view(&self, player: PlayerId) -> Option<&PlayerView> {
        self.player_views.get(&player)
    }

    /// Every network membership held through a player's devices.
    pub fn memberships_for_player(&self, player: PlayerId) -> Vec<PlayerMembership> {
        self.registry
            .owned_by(player)
            .filter_map(|device| {
                let network = self.network_of(device.id)?;
                let info = network.member(device.id)?;
                Some(PlayerMembership {
                    device: device.id,
                    network_id: network.id,
                    network_name: network.name.clone(),
                    address: info.address,
                    members: network.member_list(),
                })
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<MeshEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push an event.
    pub fn push_event(&mut self, event: MeshEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================
