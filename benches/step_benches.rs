use bevy_sph_compute::cpu::solver::FluidState;
use bevy_sph_compute::sim::params::{CursorState, SimParams};
use bevy_sph_compute::sim::sort;
use criterion::{Criterion, criterion_group, criterion_main};
use glam::Vec3;
use rand::{Rng, SeedableRng, rngs::StdRng};

fn bench_step(c: &mut Criterion) {
    let params = SimParams {
        num_particles: 4096,
        smoothing_radius: 0.05,
        target_density_scale: 1.0,
        target_density: 300.0,
        bounds_min: Vec3::ZERO,
        bounds_max: Vec3::ONE,
        ..SimParams::default()
    };
    let cursor = CursorState::default();
    let mut state = FluidState::new(&params, 1);

    c.bench_function("step_4k", |b| b.iter(|| state.step(&params, &cursor)));
}

fn bench_sort(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let keys: Vec<u32> = (0..32_768).map(|_| rng.gen_range(0..262_144)).collect();
    let values: Vec<u32> = (0..32_768).collect();

    c.bench_function("bitonic_32k", |b| {
        b.iter(|| {
            let mut k = keys.clone();
            let mut v = values.clone();
            sort::sort_pairs(&mut k, &mut v);
            k
        })
    });
}

criterion_group!(benches, bench_step, bench_sort);
criterion_main!(benches);
