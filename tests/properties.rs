// Property tests for the connectivity engine

use std::collections::{BTreeSet, VecDeque};

use proptest::prelude::*;

use mesh_link::core::{signal_strength, Vec3};
use mesh_link::mesh::{
    connected, Device, DeviceId, DeviceRegistry, IndexConfig, Resolver, SpatialIndex, Traversal,
};

fn field() -> impl Strategy<Value = Vec<(f64, f64, f64, f64)>> {
    prop::collection::vec(
        (-1500.0f64..1500.0, -1500.0f64..1500.0, -50.0f64..50.0, 1.0f64..400.0),
        1..40,
    )
}

fn build(field: &[(f64, f64, f64, f64)]) -> (DeviceRegistry, SpatialIndex) {
    let mut registry = DeviceRegistry::new();
    for (i, &(x, y, z, range)) in field.iter().enumerate() {
        registry.insert(Device::new(DeviceId(i as u64), format!("d{}", i), Vec3::new(x, y, z), range));
    }
    let mut index = SpatialIndex::default();
    index.rebuild(registry.iter(), registry.max_range(), 0, &IndexConfig::default());
    (registry, index)
}

/// Reachability by checking every pair, no index.
fn brute_force(registry: &DeviceRegistry, source: DeviceId) -> BTreeSet<DeviceId> {
    let mut seen = BTreeSet::from([source]);
    let mut queue = VecDeque::from([source]);
    while let Some(current) = queue.pop_front() {
        let Some(a) = registry.get(current) else { continue };
        for b in registry.iter() {
            if connected(a, b) && seen.insert(b.id) {
                queue.push_back(b.id);
            }
        }
    }
    seen.remove(&source);
    seen
}

proptest! {
    #[test]
    fn connected_is_symmetric(
        ax in -1000.0f64..1000.0, ay in -1000.0f64..1000.0, ar in -10.0f64..600.0,
        bx in -1000.0f64..1000.0, by in -1000.0f64..1000.0, br in -10.0f64..600.0,
    ) {
        let a = Device::new(DeviceId(1), "a", Vec3::flat(ax, ay), ar);
        let b = Device::new(DeviceId(2), "b", Vec3::flat(bx, by), br);
        prop_assert_eq!(connected(&a, &b), connected(&b, &a));
    }

    #[test]
    fn traversal_order_does_not_matter(field in field()) {
        let (registry, index) = build(&field);
        let resolver = Resolver::new(&registry, &index);
        let members: BTreeSet<DeviceId> = registry.iter().map(|d| d.id).collect();

        for &id in &members {
            let bfs = resolver.reachable_with(id, &members, Traversal::BreadthFirst);
            let dfs = resolver.reachable_with(id, &members, Traversal::DepthFirst);
            prop_assert_eq!(bfs, dfs);
        }
    }

    #[test]
    fn reachable_matches_path_search(field in field()) {
        let (registry, index) = build(&field);
        let resolver = Resolver::new(&registry, &index);
        let members: BTreeSet<DeviceId> = registry.iter().map(|d| d.id).collect();

        for &id in &members {
            let found = resolver.reachable(id, &members);
            prop_assert!(!found.contains(&id));
            prop_assert_eq!(found, brute_force(&registry, id));
        }
    }

    #[test]
    fn reachability_is_mutual(field in field()) {
        let (registry, index) = build(&field);
        let resolver = Resolver::new(&registry, &index);
        let members: BTreeSet<DeviceId> = registry.iter().map(|d| d.id).collect();

        for &a in &members {
            for b in resolver.reachable(a, &members) {
                prop_assert!(resolver.reachable(b, &members).contains(&a));
            }
        }
    }

    #[test]
    fn index_finds_every_linkable_pair(field in field()) {
        let (registry, index) = build(&field);
        for a in registry.iter() {
            let near = index.query_near(a.position);
            for b in registry.iter() {
                if a.id != b.id && connected(a, b) {
                    prop_assert!(near.contains(&b.id), "{} missed {}", a.id, b.id);
                }
            }
        }
    }

    #[test]
    fn signal_stays_in_bounds(distance in 0.0f64..5000.0, range in 0.001f64..2000.0) {
        let s = signal_strength(distance, range);
        prop_assert!((0.0..=100.0).contains(&s));
        if distance >= range {
            prop_assert_eq!(s, 0.0);
        }
    }
}

#[test]
fn signal_endpoints() {
    assert_eq!(signal_strength(0.0, 300.0), 100.0);
    assert_eq!(signal_strength(300.0, 300.0), 0.0);
    assert_eq!(signal_strength(301.0, 300.0), 0.0);
}
