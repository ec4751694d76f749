//! Network Lifecycle
//!
//! Create, join, leave, merge and garbage-collect networks. Every function
//! takes the state explicitly and pushes events right after it mutates.

use thiserror::Error;
use tracing::{debug, info};

use crate::mesh::device::{DeviceId, PlayerId};
use crate::mesh::events::{DestroyReason, MeshEvent};
use crate::mesh::network::{Network, NetworkId};
use crate::mesh::state::MeshState;

// =============================================================================
// ERRORS
// =============================================================================

/// Request-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// No such registered device
    #[error("device {0} is not registered")]
    DeviceNotFound(DeviceId),

    /// Device cannot take part in connectivity
    #[error("device {0} is not eligible for networking")]
    DeviceNotEligible(DeviceId),

    /// Empty or whitespace network name
    #[error("invalid network name")]
    InvalidNetworkName,

    /// Device has no network to leave
    #[error("device {0} is not in a network")]
    NotInNetwork(DeviceId),

    /// Requesting player does not control the device
    #[error("device {device} is not controlled by {player:?}")]
    NotOwner {
        /// Target device
        device: DeviceId,
        /// Requesting player
        player: PlayerId,
    },
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of a create or join request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new network was created with the device as sole member
    Created(NetworkId),
    /// The device joined an existing network
    Joined(NetworkId),
    /// The device was already in the matching network
    AlreadyMember(NetworkId),
    /// Matching networks exist but none is reachable
    NotInRange,
}

impl JoinOutcome {
    /// Network the device ended up in.
    pub fn network_id(&self) -> Option<NetworkId> {
        match self {
            JoinOutcome::Created(id) | JoinOutcome::Joined(id) | JoinOutcome::AlreadyMember(id) => Some(*id),
            JoinOutcome::NotInRange => None,
        }
    }

    /// Did the device end up in a network?
    pub fn is_success(&self) -> bool {
        self.network_id().is_some()
    }
}

/// Result of a leave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Network that was left
    pub network_id: NetworkId,
    /// True if the network was destroyed because it emptied
    pub destroyed: bool,
}

/// One merge performed by [`merge_check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeRecord {
    /// Network that absorbed the other
    pub survivor: NetworkId,
    /// Network that was destroyed
    pub absorbed: NetworkId,
    /// Devices moved into the survivor
    pub moved: Vec<DeviceId>,
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Create a network, or join the matching one if it is in range.
///
/// Idempotent: matching credentials redirect to [`join`]. If every matching
/// network is out of range a new one is created and merged later once the
/// groups meet.
pub fn create_or_join(
    state: &mut MeshState,
    device: DeviceId,
    name: &str,
    password: &str,
) -> Result<JoinOutcome, MeshError> {
    validate_request(state, device, name)?;

    if let Some(current) = current_matching(state, device, name, password) {
        return Ok(JoinOutcome::AlreadyMember(current));
    }

    if state.networks.values().any(|n| n.matches(name, password)) {
        match join(state, device, name, password)? {
            JoinOutcome::NotInRange => {
                debug!("No '{}' network in range of {}, creating another", name, device);
            }
            outcome => return Ok(outcome),
        }
    }

    remove_from_network(state, device);

    let network_id = state.allocate_network_id();
    state.networks.insert(network_id, Network::new(network_id, name, password));
    let tick = state.tick;
    state.push_event(MeshEvent::network_created(tick, network_id, device));
    add_to_network(state, network_id, device);

    info!("Network {} '{}' created by {}", network_id, name, device);
    Ok(JoinOutcome::Created(network_id))
}

/// Join the first matching network (ascending id) the device can reach.
///
/// Returns [`JoinOutcome::NotInRange`] without mutating anything when no
/// match is reachable.
pub fn join(
    state: &mut MeshState,
    device: DeviceId,
    name: &str,
    password: &str,
) -> Result<JoinOutcome, MeshError> {
    validate_request(state, device, name)?;

    if let Some(current) = current_matching(state, device, name, password) {
        return Ok(JoinOutcome::AlreadyMember(current));
    }

    let Some(target) = find_joinable(state, device, name, password) else {
        debug!("{} found no reachable '{}' network", device, name);
        return Ok(JoinOutcome::NotInRange);
    };

    remove_from_network(state, device);
    add_to_network(state, target, device);

    info!("{} joined network {} '{}'", device, target, name);
    Ok(JoinOutcome::Joined(target))
}

/// Leave the device's current network. An emptied network is destroyed.
pub fn leave(state: &mut MeshState, device: DeviceId) -> Result<LeaveOutcome, MeshError> {
    if !state.registry.contains(device) {
        return Err(MeshError::DeviceNotFound(device));
    }
    let (network_id, destroyed) =
        remove_from_network(state, device).ok_or(MeshError::NotInNetwork(device))?;

    info!("{} left network {}", device, network_id);
    Ok(LeaveOutcome { network_id, destroyed })
}

/// Cascade for an unregistered device: same as leave, errors ignored.
pub fn on_device_unregistered(state: &mut MeshState, device: DeviceId) -> Option<NetworkId> {
    remove_from_network(state, device).map(|(id, _)| id)
}

// =============================================================================
// MERGE
// =============================================================================

/// Fold together same-credential networks whose members can reach each other.
///
/// The lower id survives. Runs until no pair qualifies, so chains collapse
/// in one call.
pub fn merge_check(state: &mut MeshState) -> Vec<MergeRecord> {
    let mut records = Vec::new();
    while let Some((survivor, absorbed)) = find_merge_pair(state) {
        if let Some(record) = merge_networks(state, survivor, absorbed) {
            records.push(record);
        } else {
            break;
        }
    }
    records
}

/// First (lower, higher) pair of same-credential networks that touch.
fn find_merge_pair(state: &MeshState) -> Option<(NetworkId, NetworkId)> {
    let resolver = state.resolver();
    let networks: Vec<&Network> = state.networks.values().collect();

    for (i, first) in networks.iter().enumerate() {
        let first_members = first.member_ids();
        for second in &networks[i + 1..] {
            if !first.same_credentials(second) {
                continue;
            }
            let touches = second
                .member_list()
                .into_iter()
                .any(|m| resolver.links_into(m, &first_members));
            if touches {
                return Some((first.id, second.id));
            }
        }
    }
    None
}

fn merge_networks(state: &mut MeshState, survivor: NetworkId, absorbed: NetworkId) -> Option<MergeRecord> {
    if !state.networks.contains_key(&survivor) {
        return None;
    }
    let absorbed_network = state.networks.remove(&absorbed)?;
    let tick = state.tick;

    let mut moved = Vec::new();
    for member in absorbed_network.member_list() {
        state.memberships.remove(&member);
        let owner = owner_of(state, member);
        state.push_event(MeshEvent::network_left(tick, member, owner, absorbed));
        // Stale member: drop it rather than carry it over
        if add_to_network(state, survivor, member) {
            moved.push(member);
        }
    }

    state.push_event(MeshEvent::networks_merged(tick, survivor, absorbed, moved.clone()));
    state.push_event(MeshEvent::network_destroyed(tick, absorbed, DestroyReason::MergedInto(survivor)));

    info!(
        "Network {} merged into {} ({} devices moved)",
        absorbed,
        survivor,
        moved.len()
    );
    Some(MergeRecord { survivor, absorbed, moved })
}

// =============================================================================
// HELPERS
// =============================================================================

fn validate_request(state: &MeshState, device: DeviceId, name: &str) -> Result<(), MeshError> {
    let record = state.registry.get(device).ok_or(MeshError::DeviceNotFound(device))?;
    if !record.is_connectable() {
        return Err(MeshError::DeviceNotEligible(device));
    }
    if name.trim().is_empty() {
        return Err(MeshError::InvalidNetworkName);
    }
    Ok(())
}

fn owner_of(state: &MeshState, device: DeviceId) -> Option<PlayerId> {
    state.registry.get(device).and_then(|d| d.owner)
}

/// The device's current network, if it matches the credentials.
fn current_matching(state: &MeshState, device: DeviceId, name: &str, password: &str) -> Option<NetworkId> {
    state
        .network_of(device)
        .filter(|n| n.matches(name, password))
        .map(|n| n.id)
}

fn find_joinable(state: &MeshState, device: DeviceId, name: &str, password: &str) -> Option<NetworkId> {
    let resolver = state.resolver();
    state
        .networks
        .values()
        .filter(|n| n.matches(name, password))
        .find(|n| {
            if n.is_empty() {
                return true;
            }
            let mut members = n.member_ids();
            members.remove(&device);
            !resolver.reachable(device, &members).is_empty()
        })
        .map(|n| n.id)
}

/// Add a device to a network and announce it. Returns false if either is gone.
fn add_to_network(state: &mut MeshState, network_id: NetworkId, device_id: DeviceId) -> bool {
    let Some(device) = state.registry.get(device_id) else {
        return false;
    };
    let Some(network) = state.networks.get_mut(&network_id) else {
        return false;
    };
    network.add_member(device);
    let owner = device.owner;
    let members = network.member_list();
    state.memberships.insert(device_id, network_id);

    let tick = state.tick;
    if members.len() > 1 {
        state.push_event(MeshEvent::membership_changed(tick, network_id, members.clone()));
    }
    state.push_event(MeshEvent::network_joined(tick, device_id, owner, network_id, members));
    true
}

/// Remove a device from its network, destroying the network if it empties.
///
/// Returns the network left and whether it was destroyed.
fn remove_from_network(state: &mut MeshState, device: DeviceId) -> Option<(NetworkId, bool)> {
    let network_id = state.memberships.remove(&device)?;
    let tick = state.tick;

    let remaining = {
        let network = state.networks.get_mut(&network_id)?;
        network.remove_member(device);
        network.member_list()
    };
    let owner = owner_of(state, device);
    state.push_event(MeshEvent::network_left(tick, device, owner, network_id));

    if remaining.is_empty() {
        state.networks.remove(&network_id);
        state.push_event(MeshEvent::network_destroyed(tick, network_id, DestroyReason::Emptied));
        info!("Network {} destroyed (empty)", network_id);
        Some((network_id, true))
    } else {
        state.push_event(MeshEvent::membership_changed(tick, network_id, remaining));
        Some((network_id, false))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec3::Vec3;
    use crate::mesh::device::Device;
    use crate::mesh::events::MeshEventData;

    fn state_with(devices: &[(u64, f64, f64, f64)]) -> MeshState {
        let mut state = MeshState::default();
        for &(id, x, y, range) in devices {
            state
                .register_device(Device::new(DeviceId(id), format!("d{}", id), Vec3::flat(x, y), range))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_create_then_join_in_range() {
        // X range 500 at origin, Y range 300 at 250
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 250.0, 0.0, 300.0)]);

        let created = create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        assert_eq!(created, JoinOutcome::Created(NetworkId(1)));

        let joined = join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap();
        assert_eq!(joined, JoinOutcome::Joined(NetworkId(1)));
        assert_eq!(state.members(NetworkId(1)), Some(vec![DeviceId(1), DeviceId(2)]));
        assert_eq!(state.network(NetworkId(1)).unwrap().member(DeviceId(2)).unwrap().address, 2);
    }

    #[test]
    fn test_join_out_of_range_no_mutation() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (3, 1000.0, 0.0, 300.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        state.take_events();

        let outcome = join(&mut state, DeviceId(3), "Alpha", "pw1").unwrap();
        assert_eq!(outcome, JoinOutcome::NotInRange);
        assert!(!outcome.is_success());
        assert_eq!(state.members(NetworkId(1)), Some(vec![DeviceId(1)]));
        assert!(state.network_of(DeviceId(3)).is_none());
        assert!(state.take_events().is_empty());
    }

    #[test]
    fn test_join_wrong_password() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 10.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        assert_eq!(join(&mut state, DeviceId(2), "Alpha", "nope").unwrap(), JoinOutcome::NotInRange);
    }

    #[test]
    fn test_join_transitive_through_member() {
        // 3 only reaches 2, which is a member
        let mut state = state_with(&[(1, 0.0, 0.0, 100.0), (2, 90.0, 0.0, 100.0), (3, 180.0, 0.0, 100.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap();
        assert_eq!(join(&mut state, DeviceId(3), "Alpha", "pw1").unwrap(), JoinOutcome::Joined(NetworkId(1)));
    }

    #[test]
    fn test_join_prefers_lowest_reachable_id() {
        // 3 sits between two same-credential networks that cannot see each other
        let mut state = state_with(&[(1, 0.0, 0.0, 600.0), (2, 1000.0, 0.0, 600.0), (3, 500.0, 0.0, 600.0)]);
        assert_eq!(create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap(), JoinOutcome::Created(NetworkId(1)));
        assert_eq!(create_or_join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap(), JoinOutcome::Created(NetworkId(2)));

        assert_eq!(join(&mut state, DeviceId(3), "Alpha", "pw1").unwrap(), JoinOutcome::Joined(NetworkId(1)));
        assert_eq!(state.members(NetworkId(1)), Some(vec![DeviceId(1), DeviceId(3)]));
        assert_eq!(state.members(NetworkId(2)), Some(vec![DeviceId(2)]));
        assert_eq!(state.network_count(), 2);
    }

    #[test]
    fn test_join_at_extreme_coordinates() {
        let mut state = state_with(&[(1, 1e30, 0.0, 100.0), (2, 1e30, 0.0, 100.0)]);
        create_or_join(&mut state, DeviceId(1), "Far", "pw").unwrap();
        assert_eq!(join(&mut state, DeviceId(2), "Far", "pw").unwrap(), JoinOutcome::Joined(NetworkId(1)));
    }

    #[test]
    fn test_create_or_join_idempotent() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 100.0, 0.0, 500.0)]);
        let a = create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        let b = create_or_join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap();

        assert_eq!(a, JoinOutcome::Created(NetworkId(1)));
        assert_eq!(b, JoinOutcome::Joined(NetworkId(1)));
        assert_eq!(state.network_count(), 1);

        // repeat is a no-op
        let again = create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        assert_eq!(again, JoinOutcome::AlreadyMember(NetworkId(1)));
        assert_eq!(state.network_count(), 1);
    }

    #[test]
    fn test_create_out_of_range_makes_second_network() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (4, 5000.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        let w = create_or_join(&mut state, DeviceId(4), "Alpha", "pw1").unwrap();
        assert_eq!(w, JoinOutcome::Created(NetworkId(2)));
        assert_eq!(state.network_count(), 2);
    }

    #[test]
    fn test_join_other_network_leaves_current() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 10.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        create_or_join(&mut state, DeviceId(2), "Beta", "pw2").unwrap();

        let outcome = join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap();
        assert_eq!(outcome, JoinOutcome::Joined(NetworkId(1)));
        // Beta emptied and destroyed
        assert!(state.network(NetworkId(2)).is_none());
        assert_eq!(state.network_id_of(DeviceId(2)), Some(NetworkId(1)));
    }

    #[test]
    fn test_leave_semantics() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 10.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap();

        let first = leave(&mut state, DeviceId(2)).unwrap();
        assert_eq!(first, LeaveOutcome { network_id: NetworkId(1), destroyed: false });
        assert_eq!(state.members(NetworkId(1)), Some(vec![DeviceId(1)]));

        let last = leave(&mut state, DeviceId(1)).unwrap();
        assert!(last.destroyed);
        assert!(state.network(NetworkId(1)).is_none());

        assert_eq!(leave(&mut state, DeviceId(1)), Err(MeshError::NotInNetwork(DeviceId(1))));
        assert_eq!(leave(&mut state, DeviceId(9)), Err(MeshError::DeviceNotFound(DeviceId(9))));
    }

    #[test]
    fn test_new_network_same_credentials_gets_new_id() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        leave(&mut state, DeviceId(1)).unwrap();
        let again = create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        assert_eq!(again, JoinOutcome::Created(NetworkId(2)));
    }

    #[test]
    fn test_request_validation() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 0.0, 0.0, 0.0)]);
        assert_eq!(
            create_or_join(&mut state, DeviceId(1), "  ", "pw"),
            Err(MeshError::InvalidNetworkName)
        );
        assert_eq!(
            create_or_join(&mut state, DeviceId(7), "Alpha", "pw"),
            Err(MeshError::DeviceNotFound(DeviceId(7)))
        );
        assert_eq!(
            join(&mut state, DeviceId(2), "Alpha", "pw"),
            Err(MeshError::DeviceNotEligible(DeviceId(2)))
        );
        assert_eq!(state.network_count(), 0);
    }

    #[test]
    fn test_merge_lower_id_survives() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 5000.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        create_or_join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap();
        assert!(merge_check(&mut state).is_empty());

        // bring 2 into range
        state.registry.get_mut(DeviceId(2)).unwrap().position = Vec3::flat(300.0, 0.0);
        state.rebuild_index();
        state.take_events();

        let merges = merge_check(&mut state);
        assert_eq!(merges, vec![MergeRecord {
            survivor: NetworkId(1),
            absorbed: NetworkId(2),
            moved: vec![DeviceId(2)],
        }]);
        assert_eq!(state.network_count(), 1);
        assert_eq!(state.network_id_of(DeviceId(2)), Some(NetworkId(1)));

        let events = state.take_events();
        assert!(events.iter().any(|e| matches!(
            e.data,
            MeshEventData::NetworkDestroyed { network_id: NetworkId(2), reason: DestroyReason::MergedInto(NetworkId(1)) }
        )));
    }

    #[test]
    fn test_merge_chain_collapses() {
        // three groups in a line, same credentials, all touching
        let mut state = state_with(&[(1, 0.0, 0.0, 100.0), (2, 5000.0, 0.0, 100.0), (3, 9000.0, 0.0, 100.0)]);
        for id in 1..=3 {
            create_or_join(&mut state, DeviceId(id), "Alpha", "pw1").unwrap();
        }
        assert_eq!(state.network_count(), 3);

        state.registry.get_mut(DeviceId(2)).unwrap().position = Vec3::flat(80.0, 0.0);
        state.registry.get_mut(DeviceId(3)).unwrap().position = Vec3::flat(160.0, 0.0);
        state.rebuild_index();

        let merges = merge_check(&mut state);
        assert_eq!(merges.len(), 2);
        assert_eq!(state.network_count(), 1);
        assert_eq!(state.members(NetworkId(1)), Some(vec![DeviceId(1), DeviceId(2), DeviceId(3)]));
    }

    #[test]
    fn test_merge_ignores_different_credentials() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 10.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        create_or_join(&mut state, DeviceId(2), "Alpha", "pw2").unwrap();
        assert!(merge_check(&mut state).is_empty());
        assert_eq!(state.network_count(), 2);
    }

    #[test]
    fn test_events_follow_mutations() {
        let mut state = state_with(&[(1, 0.0, 0.0, 500.0), (2, 10.0, 0.0, 500.0)]);
        create_or_join(&mut state, DeviceId(1), "Alpha", "pw1").unwrap();
        join(&mut state, DeviceId(2), "Alpha", "pw1").unwrap();
        leave(&mut state, DeviceId(1)).unwrap();

        let kinds: Vec<&MeshEventData> = state.pending_events.iter().map(|e| &e.data).collect();
        assert!(matches!(kinds[0], MeshEventData::NetworkCreated { .. }));
        assert!(matches!(kinds[1], MeshEventData::NetworkJoined { device: DeviceId(1), .. }));
        assert!(kinds.iter().any(|k| matches!(k, MeshEventData::NetworkJoined { device: DeviceId(2), .. })));
        assert!(matches!(
            kinds.last().unwrap(),
            MeshEventData::MembershipChanged { members, .. } if members == &vec![DeviceId(2)]
        ));
    }
}
