//! Networks
//!
//! A named, password-gated group of devices. Membership metadata is
//! captured when a device joins and is not refreshed afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::capability::Capabilities;
use crate::mesh::device::{Device, DeviceId};

/// Network identifier. Assigned monotonically, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u32);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net#{}", self.0)
    }
}

/// Per-member record assigned at join time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Sequential address within the network (starts at 1)
    pub address: u32,
    /// Display name at join time
    pub display_name: String,
    /// Capabilities at join time
    pub capabilities: Capabilities,
}

/// A logical network.
#[derive(Clone, Debug)]
pub struct Network {
    /// Network ID
    pub id: NetworkId,
    /// Network name
    pub name: String,
    /// Shared secret
    password: String,
    /// Members and their join-time metadata
    members: BTreeMap<DeviceId, MemberInfo>,
    /// Next address to hand out
    next_address: u32,
}

impl Network {
    /// Create an empty network.
    pub fn new(id: NetworkId, name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            password: password.into(),
            members: BTreeMap::new(),
            next_address: 1,
        }
    }

    /// Plain comparison of name and shared secret.
    pub fn matches(&self, name: &str, password: &str) -> bool {
        self.name == name && self.password == password
    }

    /// Same credentials as another network?
    pub fn same_credentials(&self, other: &Network) -> bool {
        self.matches(&other.name, &other.password)
    }

    /// Add a member, snapshotting its metadata. Returns the assigned address.
    ///
    /// Re-adding an existing member keeps its existing record.
    pub fn add_member(&mut self, device: &Device) -> u32 {
        if let Some(existing) = self.members.get(&device.id) {
            return existing.address;
        }
        let address = self.next_address;
        self.next_address += 1;
        self.members.insert(device.id, MemberInfo {
            address,
            display_name: device.name.clone(),
            capabilities: device.capabilities,
        });
        address
    }

    /// Remove a member. Returns its record if it was present.
    pub fn remove_member(&mut self, id: DeviceId) -> Option<MemberInfo> {
        self.members.remove(&id)
    }

    /// Is this device a member?
    pub fn contains(&self, id: DeviceId) -> bool {
        self.members.contains_key(&id)
    }

    /// Join-time record for a member.
    pub fn member(&self, id: DeviceId) -> Option<&MemberInfo> {
        self.members.get(&id)
    }

    /// Member ids as a set.
    pub fn member_ids(&self) -> BTreeSet<DeviceId> {
        self.members.keys().copied().collect()
    }

    /// Member ids in order.
    pub fn member_list(&self) -> Vec<DeviceId> {
        self.members.keys().copied().collect()
    }

    /// Iterate members with metadata.
    pub fn members(&self) -> impl Iterator<Item = (&DeviceId, &MemberInfo)> {
        self.members.iter()
    }

    /// Member count.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when no members remain.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec3::Vec3;

    #[test]
    fn test_addresses_are_sequential_and_not_reused() {
        let mut net = Network::new(NetworkId(1), "Alpha", "pw1");
        let a = Device::new(DeviceId(10), "a", Vec3::ZERO, 1.0);
        let b = Device::new(DeviceId(11), "b", Vec3::ZERO, 1.0);
        let c = Device::new(DeviceId(12), "c", Vec3::ZERO, 1.0);

        assert_eq!(net.add_member(&a), 1);
        assert_eq!(net.add_member(&b), 2);
        assert_eq!(net.add_member(&a), 1);

        net.remove_member(DeviceId(11));
        assert_eq!(net.add_member(&c), 3);
        assert_eq!(net.member_list(), vec![DeviceId(10), DeviceId(12)]);
    }

    #[test]
    fn test_member_snapshot() {
        let mut net = Network::new(NetworkId(1), "Alpha", "pw1");
        let d = Device::new(DeviceId(1), "Relay", Vec3::ZERO, 1.0)
            .with_capabilities(Capabilities::VIDEO_SOURCE);
        net.add_member(&d);

        let info = net.member(DeviceId(1)).unwrap();
        assert_eq!(info.display_name, "Relay");
        assert!(info.capabilities.contains(Capabilities::VIDEO_SOURCE));
    }

    #[test]
    fn test_credentials() {
        let net = Network::new(NetworkId(1), "Alpha", "pw1");
        assert!(net.matches("Alpha", "pw1"));
        assert!(!net.matches("Alpha", "pw2"));
        assert!(!net.matches("alpha", "pw1"));

        let twin = Network::new(NetworkId(2), "Alpha", "pw1");
        let other = Network::new(NetworkId(3), "Alpha", "x");
        assert!(net.same_credentials(&twin));
        assert!(!net.same_credentials(&other));
    }
}
