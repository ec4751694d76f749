//! Protocol Messages
//!
//! Payloads exchanged between clients and the mesh service.
//! JSON for debugging ease, with binary (bincode) for flat payloads.
//! Framing and transport belong to the host.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::mesh::device::{DeviceId, PlayerId};
use crate::mesh::events::MeshEvent;
use crate::mesh::fanout::{DeviceView, PeerSnapshot, PlayerView};
use crate::mesh::lifecycle::{JoinOutcome, LeaveOutcome, MeshError};
use crate::mesh::network::NetworkId;
use crate::mesh::state::PlayerMembership;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
///
/// The sending player is known from the session the message arrived on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a network, or join the matching one.
    CreateOrJoin(NetworkRequest),

    /// Join an existing network.
    Join(NetworkRequest),

    /// Leave the device's network.
    Leave { device: DeviceId },

    /// Peers reachable from a device as of the last fan-out.
    GetConnectedMembers { device: DeviceId },

    /// Every network membership held through the player's devices.
    GetMemberships,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// Credentials for a create or join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRequest {
    /// Device acting on the network.
    pub device: DeviceId,
    /// Network name.
    pub name: String,
    /// Shared secret.
    pub password: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answer to a create, join or leave.
    RequestResult(RequestResult),

    /// Reachable peers of one of the player's devices.
    DeviceConnectivity(DeviceConnectivityUpdate),

    /// Player-level visibility after a fan-out.
    PlayerConnectivity(PlayerConnectivityUpdate),

    /// Answer to `GetMemberships`.
    Memberships(MembershipList),

    /// Lifecycle or connectivity notification.
    Event(MeshEvent),

    /// Pong response.
    Pong {
        /// Client timestamp echoed back.
        timestamp: u64,
        /// Current engine tick.
        tick: u64,
    },

    /// Request rejected.
    Error(ServerError),
}

/// How a request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// New network created.
    Created,
    /// Joined an existing network.
    Joined,
    /// Already in the requested network.
    AlreadyMember,
    /// No matching network in range.
    NotInRange,
    /// Left the network.
    Left,
    /// Left the network and it was destroyed.
    LeftAndDestroyed,
}

/// Answer to a lifecycle request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResult {
    /// Device the request was about.
    pub device: DeviceId,
    /// Outcome.
    pub outcome: RequestOutcome,
    /// Network involved, if any.
    pub network_id: Option<NetworkId>,
}

impl RequestResult {
    /// Build from a create/join outcome.
    pub fn from_join(device: DeviceId, outcome: JoinOutcome) -> Self {
        let kind = match outcome {
            JoinOutcome::Created(_) => RequestOutcome::Created,
            JoinOutcome::Joined(_) => RequestOutcome::Joined,
            JoinOutcome::AlreadyMember(_) => RequestOutcome::AlreadyMember,
            JoinOutcome::NotInRange => RequestOutcome::NotInRange,
        };
        Self {
            device,
            outcome: kind,
            network_id: outcome.network_id(),
        }
    }

    /// Build from a leave outcome.
    pub fn from_leave(device: DeviceId, outcome: LeaveOutcome) -> Self {
        Self {
            device,
            outcome: if outcome.destroyed {
                RequestOutcome::LeftAndDestroyed
            } else {
                RequestOutcome::Left
            },
            network_id: Some(outcome.network_id),
        }
    }
}

/// Reachable peers of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConnectivityUpdate {
    /// Tick the view was computed on.
    pub tick: u64,
    /// The device.
    pub device: DeviceId,
    /// Its network.
    pub network_id: NetworkId,
    /// Reachable peers in id order.
    pub peers: Vec<PeerSnapshot>,
}

impl DeviceConnectivityUpdate {
    /// Package a cached view.
    pub fn from_view(tick: u64, view: &DeviceView) -> Self {
        Self {
            tick,
            device: view.device,
            network_id: view.network_id,
            peers: view.peers.values().cloned().collect(),
        }
    }
}

/// Player-level connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConnectivityUpdate {
    /// Tick the view was computed on.
    pub tick: u64,
    /// Other players reachable through any owned device.
    pub visible_players: Vec<PlayerId>,
    /// Reachable video sources.
    pub broadcasting_sources: Vec<DeviceId>,
}

impl PlayerConnectivityUpdate {
    /// Package a player view.
    pub fn from_view(tick: u64, view: &PlayerView) -> Self {
        Self {
            tick,
            visible_players: view.visible_players.clone(),
            broadcasting_sources: view.broadcasting_sources.clone(),
        }
    }
}

/// The player's memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipList {
    /// One entry per device in a network.
    pub memberships: Vec<PlayerMembership>,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<&MeshError> for ServerError {
    fn from(err: &MeshError) -> Self {
        let code = match err {
            MeshError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            MeshError::DeviceNotEligible(_) => ErrorCode::DeviceNotEligible,
            MeshError::InvalidNetworkName => ErrorCode::InvalidNetworkName,
            MeshError::NotInNetwork(_) => ErrorCode::NotInNetwork,
            MeshError::NotOwner { .. } => ErrorCode::NotOwner,
        };
        Self::new(code, err.to_string())
    }
}

impl From<&ProtocolError> for ServerError {
    fn from(err: &ProtocolError) -> Self {
        Self::new(ErrorCode::InvalidMessage, err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Device is not registered.
    DeviceNotFound,
    /// Device cannot take part in connectivity.
    DeviceNotEligible,
    /// Empty network name.
    InvalidNetworkName,
    /// Device is not in a network.
    NotInNetwork,
    /// Player does not control the device.
    NotOwner,
    /// Malformed message.
    InvalidMessage,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

/// Encoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encode/decode failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encode/decode failed.
    #[error("Binary error: {0}")]
    Binary(#[from] bincode::Error),
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}

impl DeviceConnectivityUpdate {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}
