//! Devices and the Device Registry
//!
//! The registry is the authoritative list of network-capable devices.
//! Uses BTreeMap so every pass over devices runs in id order.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use crate::core::capability::Capabilities;
use crate::core::vec3::Vec3;

// =============================================================================
// IDS
// =============================================================================

/// Unique player identifier (UUID-sized bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Derive a stable id from an account name.
    pub fn from_account(name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"mesh-link-player:");
        hasher.update(name.as_bytes());
        let hash = hasher.finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        Self(id)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short hex tag for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({})", self.short())
    }
}

/// Opaque device identifier, assigned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

// =============================================================================
// DEVICE
// =============================================================================

/// A network-capable endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    /// Unique device ID
    pub id: DeviceId,
    /// Display name, copied into member metadata on join
    pub name: String,
    /// Capability bits
    pub capabilities: Capabilities,
    /// Live world position
    pub position: Vec3,
    /// Maximum link range (world units)
    pub range: f64,
    /// Is the device powered on?
    pub powered: bool,
    /// Player currently controlling this device
    pub owner: Option<PlayerId>,
}

impl Device {
    /// New powered device with network access and no owner.
    pub fn new(id: DeviceId, name: impl Into<String>, position: Vec3, range: f64) -> Self {
        Self {
            id,
            name: name.into(),
            capabilities: Capabilities::NETWORK_ACCESS,
            position,
            range,
            powered: true,
            owner: None,
        }
    }

    /// Set the owning player.
    pub fn with_owner(mut self, owner: PlayerId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Add capabilities on top of the current set.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities |= capabilities;
        self
    }

    /// True when the range can be used for connectivity.
    #[inline]
    pub fn has_usable_range(&self) -> bool {
        self.range.is_finite() && self.range > 0.0
    }

    /// Can this device take part in connectivity right now?
    ///
    /// Degenerate range, no power or no network access all exclude it.
    #[inline]
    pub fn is_connectable(&self) -> bool {
        self.has_usable_range()
            && self.powered
            && self.capabilities.has_network_access()
            && self.position.is_finite()
    }

    /// Apply a directory sample.
    pub fn apply(&mut self, update: &DeviceUpdate) {
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(range) = update.range {
            self.range = range;
        }
        if let Some(powered) = update.powered {
            self.powered = powered;
        }
        if let Some(capabilities) = update.capabilities {
            self.capabilities = capabilities;
        }
        if let Some(owner) = update.owner {
            self.owner = owner;
        }
    }
}

/// Live values reported by the host's device directory for one tick.
///
/// `None` fields keep their previous value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    /// New world position
    pub position: Option<Vec3>,
    /// New range
    pub range: Option<f64>,
    /// New power state
    pub powered: Option<bool>,
    /// New capability bits
    pub capabilities: Option<Capabilities>,
    /// New owner (`Some(None)` releases control)
    pub owner: Option<Option<PlayerId>>,
}

impl DeviceUpdate {
    /// Position-only update.
    pub fn moved_to(position: Vec3) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    /// Set the range.
    pub fn with_range(mut self, range: f64) -> Self {
        self.range = Some(range);
        self
    }

    /// Set the power state.
    pub fn with_powered(mut self, powered: bool) -> Self {
        self.powered = Some(powered);
        self
    }

    /// Replace the capability bits.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Change the controlling player.
    pub fn with_owner(mut self, owner: Option<PlayerId>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Fold a later sample over this one. Fields set in `newer` win.
    pub fn merged_with(self, newer: DeviceUpdate) -> Self {
        Self {
            position: newer.position.or(self.position),
            range: newer.range.or(self.range),
            powered: newer.powered.or(self.powered),
            capabilities: newer.capabilities.or(self.capabilities),
            owner: newer.owner.or(self.owner),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Authoritative set of registered devices.
#[derive(Clone, Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device. Returns the previous record if any.
    pub fn insert(&mut self, device: Device) -> Option<Device> {
        self.devices.insert(device.id, device)
    }

    /// Remove a device.
    pub fn remove(&mut self, id: DeviceId) -> Option<Device> {
        self.devices.remove(&id)
    }

    /// Get a device by ID.
    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Get a device mutably by ID.
    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    /// Is this device registered?
    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Iterate devices in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True if no devices are registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Largest range among connectable devices (0 when there are none).
    pub fn max_range(&self) -> f64 {
        self.devices
            .values()
            .filter(|d| d.is_connectable())
            .map(|d| d.range)
            .fold(0.0, f64::max)
    }

    /// Devices controlled by a player, in id order.
    pub fn owned_by(&self, player: PlayerId) -> impl Iterator<Item = &Device> {
        self.devices
            .values()
            .filter(move |d| d.owner == Some(player))
    }

    /// Every player that controls at least one device.
    pub fn owners(&self) -> Vec<PlayerId> {
        let mut owners: Vec<PlayerId> = self.devices.values().filter_map(|d| d.owner).collect();
        owners.sort();
        owners.dedup();
        owners
    }
}
