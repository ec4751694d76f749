//! Connectivity benchmarks: reachability and full fan-out over a scattered field.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeSet;

use mesh_link::core::Vec3;
use mesh_link::mesh::{compute_fanout, create_or_join, Device, DeviceId, MeshState, PlayerId};

fn scatter(count: u64, extent: f64, seed: u64) -> MeshState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = MeshState::default();
    for id in 0..count {
        let position = Vec3::flat(rng.gen_range(-extent..extent), rng.gen_range(-extent..extent));
        let range = rng.gen_range(80.0..300.0);
        let owner = PlayerId::new([(id % 32) as u8; 16]);
        let device = Device::new(DeviceId(id), format!("d{}", id), position, range).with_owner(owner);
        if state.register_device(device).is_ok() {
            let _ = create_or_join(&mut state, DeviceId(id), "Field", "pw");
        }
    }
    state
}

fn bench_reachable(c: &mut Criterion) {
    let mut group = c.benchmark_group("reachable");
    for count in [100u64, 500, 2000] {
        let state = scatter(count, 2000.0, 7);
        let members: BTreeSet<DeviceId> = state.registry().iter().map(|d| d.id).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            let resolver = state.resolver();
            b.iter(|| resolver.reachable(black_box(DeviceId(0)), &members));
        });
    }
    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_fanout");
    for count in [100u64, 500, 2000] {
        let state = scatter(count, 2000.0, 11);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| compute_fanout(black_box(&state)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reachable, bench_fanout);
criterion_main!(benches);
