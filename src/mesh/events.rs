//! Mesh Events
//!
//! Notifications emitted right after each mutating operation and after each
//! fan-out. Subscribers (map markers, messaging, video selection) consume
//! these instead of watching state.

use serde::{Serialize, Deserialize};

use crate::mesh::device::{DeviceId, PlayerId};
use crate::mesh::network::NetworkId;

/// Why a network went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyReason {
    /// Last member left or was unregistered
    Emptied,
    /// All members moved into another network
    MergedInto(NetworkId),
}

/// Event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshEventData {
    /// A new network was created with `device` as its only member
    NetworkCreated {
        network_id: NetworkId,
        device: DeviceId,
    },

    /// `device` became a member of `network_id`
    NetworkJoined {
        device: DeviceId,
        owner: Option<PlayerId>,
        network_id: NetworkId,
        members: Vec<DeviceId>,
    },

    /// `device` stopped being a member of `network_id`
    ///
    /// `owner` is captured on emission; the device may be gone by the time
    /// the event is delivered.
    NetworkLeft {
        device: DeviceId,
        owner: Option<PlayerId>,
        network_id: NetworkId,
    },

    /// Membership of a surviving network changed
    MembershipChanged {
        network_id: NetworkId,
        members: Vec<DeviceId>,
    },

    /// `absorbed` was folded into `survivor`
    NetworksMerged {
        survivor: NetworkId,
        absorbed: NetworkId,
        moved: Vec<DeviceId>,
    },

    /// Network no longer exists
    NetworkDestroyed {
        network_id: NetworkId,
        reason: DestroyReason,
    },

    /// Reachable set of `device` differs from the previous fan-out
    ConnectivityUpdated {
        device: DeviceId,
        members: Vec<DeviceId>,
    },

    /// Video-capable devices reachable by `player` changed
    BroadcastingSourcesChanged {
        player: PlayerId,
        sources: Vec<DeviceId>,
    },
}

/// An event stamped with the tick it happened on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Event data
    pub data: MeshEventData,
}

impl MeshEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: MeshEventData) -> Self {
        Self { tick, data }
    }

    /// Device the event is addressed to, if it targets a single device.
    pub fn device(&self) -> Option<DeviceId> {
        match &self.data {
            MeshEventData::NetworkCreated { device, .. }
            | MeshEventData::NetworkJoined { device, .. }
            | MeshEventData::NetworkLeft { device, .. }
            | MeshEventData::ConnectivityUpdated { device, .. } => Some(*device),
            _ => None,
        }
    }

    /// Player recorded on the event when it was emitted.
    pub fn owner(&self) -> Option<PlayerId> {
        match &self.data {
            MeshEventData::NetworkJoined { owner, .. } | MeshEventData::NetworkLeft { owner, .. } => *owner,
            MeshEventData::BroadcastingSourcesChanged { player, .. } => Some(*player),
            _ => None,
        }
    }

    /// Network the event concerns, if any.
    pub fn network(&self) -> Option<NetworkId> {
        match &self.data {
            MeshEventData::NetworkCreated { network_id, .. }
            | MeshEventData::NetworkJoined { network_id, .. }
            | MeshEventData::NetworkLeft { network_id, .. }
            | MeshEventData::MembershipChanged { network_id, .. }
            | MeshEventData::NetworkDestroyed { network_id, .. } => Some(*network_id),
            MeshEventData::NetworksMerged { survivor, .. } => Some(*survivor),
            _ => None,
        }
    }

    /// Create network created event.
    pub fn network_created(tick: u64, network_id: NetworkId, device: DeviceId) -> Self {
        Self::new(tick, MeshEventData::NetworkCreated { network_id, device })
    }

    /// Create network joined event.
    pub fn network_joined(
        tick: u64,
        device: DeviceId,
        owner: Option<PlayerId>,
        network_id: NetworkId,
        members: Vec<DeviceId>,
    ) -> Self {
        Self::new(tick, MeshEventData::NetworkJoined { device, owner, network_id, members })
    }

    /// Create network left event.
    pub fn network_left(tick: u64, device: DeviceId, owner: Option<PlayerId>, network_id: NetworkId) -> Self {
        Self::new(tick, MeshEventData::NetworkLeft { device, owner, network_id })
    }

    /// Create membership changed event.
    pub fn membership_changed(tick: u64, network_id: NetworkId, members: Vec<DeviceId>) -> Self {
        Self::new(tick, MeshEventData::MembershipChanged { network_id, members })
    }

    /// Create networks merged event.
    pub fn networks_merged(tick: u64, survivor: NetworkId, absorbed: NetworkId, moved: Vec<DeviceId>) -> Self {
        Self::new(tick, MeshEventData::NetworksMerged { survivor, absorbed, moved })
    }

    /// Create network destroyed event.
    pub fn network_destroyed(tick: u64, network_id: NetworkId, reason: DestroyReason) -> Self {
        Self::new(tick, MeshEventData::NetworkDestroyed { network_id, reason })
    }

    /// Create connectivity updated event.
    pub fn connectivity_updated(tick: u64, device: DeviceId, members: Vec<DeviceId>) -> Self {
        Self::new(tick, MeshEventData::ConnectivityUpdated { device, members })
    }

    /// Create broadcasting sources changed event.
    pub fn broadcasting_sources_changed(tick: u64, player: PlayerId, sources: Vec<DeviceId>) -> Self {
        Self::new(tick, MeshEventData::BroadcastingSourcesChanged { player, sources })
    }
}
