//! Connectivity Resolution
//!
//! Pairwise link test plus worklist reachability over a network's members.
//! Candidates come from the spatial index; the link test decides.

use std::collections::{BTreeSet, VecDeque};

use crate::mesh::device::{Device, DeviceId, DeviceRegistry};
use crate::mesh::spatial::SpatialIndex;

/// Check if two devices can link.
///
/// Distance must be within the shorter of the two ranges. Symmetric.
#[inline]
pub fn connected(a: &Device, b: &Device) -> bool {
    if !a.is_connectable() || !b.is_connectable() {
        return false;
    }
    let range = a.range.min(b.range);

    // Box rejection first
    if !a.position.within_box(b.position, range) {
        return false;
    }

    a.position.distance_squared(b.position) <= range * range
}

/// Order the worklist is drained in. The resulting set is the same either way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Traversal {
    /// Queue (FIFO)
    #[default]
    BreadthFirst,
    /// Stack (LIFO)
    DepthFirst,
}

/// Read-only view over the registry and index used for graph queries.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a DeviceRegistry,
    index: &'a SpatialIndex,
}

impl<'a> Resolver<'a> {
    /// Create a resolver.
    pub fn new(registry: &'a DeviceRegistry, index: &'a SpatialIndex) -> Self {
        Self { registry, index }
    }

    /// Direct neighbors of `source` among `members`, in id order.
    pub fn neighbors(&self, source: &Device, members: &BTreeSet<DeviceId>) -> Vec<DeviceId> {
        let mut found: Vec<DeviceId> = self
            .index
            .query_near_in(source.position, members)
            .into_iter()
            .filter(|id| *id != source.id)
            .filter(|id| {
                self.registry
                    .get(*id)
                    .is_some_and(|other| connected(source, other))
            })
            .collect();
        found.sort();
        found
    }

    /// Does `source` link directly to any of `members`?
    pub fn links_into(&self, source: DeviceId, members: &BTreeSet<DeviceId>) -> bool {
        let Some(device) = self.registry.get(source) else {
            return false;
        };
        !self.neighbors(device, members).is_empty()
    }

    /// Every member transitively reachable from `source` (source excluded).
    ///
    /// `source` need not be a member itself, which is how join eligibility
    /// is checked. Unknown or unconnectable sources give an empty set.
    pub fn reachable(&self, source: DeviceId, members: &BTreeSet<DeviceId>) -> BTreeSet<DeviceId> {
        self.reachable_with(source, members, Traversal::BreadthFirst)
    }

    /// `reachable` with an explicit worklist order.
    pub fn reachable_with(
        &self,
        source: DeviceId,
        members: &BTreeSet<DeviceId>,
        order: Traversal,
    ) -> BTreeSet<DeviceId> {
        let mut visited = BTreeSet::new();
        let Some(start) = self.registry.get(source) else {
            return visited;
        };
        if !start.is_connectable() {
            return visited;
        }

        visited.insert(source);
        let mut worklist = VecDeque::from([source]);

        loop {
            let next = match order {
                Traversal::BreadthFirst => worklist.pop_front(),
                Traversal::DepthFirst => worklist.pop_back(),
            };
            let Some(current_id) = next else {
                break;
            };
            // Re-validate: the device may have been dropped since it was queued
            let Some(current) = self.registry.get(current_id) else {
                continue;
            };
            for neighbor in self.neighbors(current, members) {
                if visited.insert(neighbor) {
                    worklist.push_back(neighbor);
                }
            }
        }

        visited.remove(&source);
        visited
    }

    /// Partition `members` into connected components, in id order.
    ///
    /// Each member's reachable set is its component minus itself.
    pub fn components(&self, members: &BTreeSet<DeviceId>) -> Vec<BTreeSet<DeviceId>> {
        let mut processed = BTreeSet::new();
        let mut components = Vec::new();

        for &member in members {
            if processed.contains(&member) {
                continue;
            }
            let mut component = self.reachable(member, members);
            component.insert(member);
            processed.extend(component.iter().copied());
            components.push(component);
        }

        components
    }
}
