use bevy_sph_compute::cpu::solver::FluidState;
use bevy_sph_compute::sim::kernels::{self, KernelScales};
use bevy_sph_compute::sim::params::{CursorForce, CursorState, SimParams};
use bevy_sph_compute::sim::sort;
use glam::{Vec2, Vec3};

/// Small, force-free configuration that individual tests then switch on.
fn quiet_params() -> SimParams {
    SimParams {
        num_particles: 0, // tests place particles by hand
        smoothing_radius: 0.1,
        target_density: 0.0,
        target_density_scale: 1.0,
        pressure_strength: 0.0,
        viscosity_strength: 0.0,
        gravity: 0.0,
        bounds_min: Vec3::ZERO,
        bounds_max: Vec3::ONE,
        grid_table_size: 4096,
        ..SimParams::default()
    }
}

fn cursor_off() -> CursorState {
    CursorState::default()
}

#[test]
fn isolated_particle_density_is_self_contribution() {
    let params = quiet_params();
    let mut state = FluidState::from_positions(&params, vec![Vec3::splat(0.5)]);
    state.step(&params, &cursor_off());

    let h = params.smoothing_radius;
    let expected = kernels::density_kernel(0.0, h, KernelScales::for_radius(h).spiky_pow2);
    assert!(expected > 0.0);
    let got = state.densities[0];
    assert!(
        (got - expected).abs() <= 1e-4 * expected,
        "density {got}, expected {expected}"
    );
}

#[test]
fn densities_are_finite_and_non_negative() {
    let params = SimParams {
        num_particles: 300,
        pressure_strength: 20.5,
        viscosity_strength: 0.7,
        target_density: 3.0,
        target_density_scale: 1.0,
        gravity: 9.8,
        smoothing_radius: 0.1,
        bounds_min: Vec3::ZERO,
        bounds_max: Vec3::ONE,
        grid_table_size: 4096,
        ..SimParams::default()
    };
    let mut state = FluidState::new(&params, 42);
    for _ in 0..10 {
        state.step(&params, &cursor_off());
    }
    for (i, &rho) in state.densities.iter().enumerate() {
        assert!(rho.is_finite() && rho >= 0.0, "particle {i}: density {rho}");
    }
    for (i, pos) in state.positions.iter().enumerate() {
        assert!(pos.is_finite(), "particle {i}: position {pos}");
    }
}

#[test]
fn pair_pressure_conserves_momentum() {
    let mut params = quiet_params();
    params.pressure_strength = 1.0;
    let h = params.smoothing_radius;
    let positions = vec![
        Vec3::new(0.5 - 0.25 * h, 0.5, 0.5),
        Vec3::new(0.5 + 0.25 * h, 0.5, 0.5),
    ];
    let mut state = FluidState::from_positions(&params, positions);
    for _ in 0..5 {
        state.step(&params, &cursor_off());
    }

    let total = state.velocities[0] + state.velocities[1];
    let scale = state.velocities[0].length().max(1e-6);
    assert!(
        total.length() <= 1e-4 * scale,
        "net momentum {total:?} against speed {scale}"
    );
    // equal densities push the pair apart symmetrically
    assert!(state.velocities[0].x < 0.0);
    assert!(state.velocities[1].x > 0.0);
}

#[test]
fn viscosity_reads_the_pre_step_velocity_snapshot() {
    let mut params = quiet_params();
    params.viscosity_strength = 1.0;
    let h = params.smoothing_radius;
    let positions = vec![
        Vec3::new(0.5 - 0.2 * h, 0.5, 0.5),
        Vec3::new(0.5 + 0.2 * h, 0.5, 0.5),
    ];
    let approach = 0.05;
    let mut state = FluidState::from_positions(&params, positions);
    state.velocities = vec![Vec3::new(approach, 0.0, 0.0), Vec3::new(-approach, 0.0, 0.0)];

    // the force pass must not touch velocities, only accelerations
    let cursor = cursor_off();
    state.external_forces(&params, &cursor);
    state.partition(&params);
    for pass in sort::pass_schedule(state.cell_indices.len() as u32) {
        sort::compare_exchange(&mut state.cell_indices, &mut state.particle_indices, pass);
    }
    state.build_offsets();
    state.density(&params);
    let vel_before = state.velocities.clone();
    state.forces(&params);
    assert_eq!(state.velocities, vel_before);

    // both particles read the same snapshot, so the viscous exchange is
    // exactly equal and opposite and damps the relative motion
    assert!((state.accelerations[0] + state.accelerations[1]).length() < 1e-6);
    assert!(state.accelerations[0].x < 0.0);
    assert!(state.accelerations[1].x > 0.0);

    state.integrate(&params);
    let relative = state.velocities[0].x - state.velocities[1].x;
    assert!(relative > 0.0 && relative < 2.0 * approach, "relative {relative}");
    let total = state.velocities[0] + state.velocities[1];
    assert!(total.length() < 1e-6, "net momentum {total:?}");
}

#[test]
fn kernel_scale_override_rescales_density() {
    let mut params = quiet_params();
    let h = params.smoothing_radius;
    let standard = KernelScales::for_radius(h);
    params.kernel_scale_override = Some(KernelScales {
        spiky_pow2: standard.spiky_pow2 * 2.0,
        ..standard
    });
    let mut state = FluidState::from_positions(&params, vec![Vec3::splat(0.5)]);
    state.step(&params, &cursor_off());

    let expected = 2.0 * kernels::density_kernel(0.0, h, standard.spiky_pow2);
    let got = state.densities[0];
    assert!(
        (got - expected).abs() <= 1e-4 * expected,
        "density {got}, expected {expected}"
    );
}

#[test]
fn particles_never_escape_the_box() {
    let mut params = quiet_params();
    params.collision_damping = 0.9;
    let positions = vec![
        Vec3::new(0.05, 0.9, 0.5),
        Vec3::new(0.95, 0.1, 0.5),
        Vec3::new(0.5, 0.5, 0.05),
    ];
    let mut state = FluidState::from_positions(&params, positions);
    state.velocities = vec![
        Vec3::new(-80.0, 60.0, 0.0),
        Vec3::new(90.0, -70.0, 40.0),
        Vec3::new(0.0, 0.0, -120.0),
    ];
    for _ in 0..20 {
        state.step(&params, &cursor_off());
    }
    for (i, pos) in state.positions.iter().enumerate() {
        for axis in 0..3 {
            assert!(
                pos[axis] >= params.bounds_min[axis] - 1e-5
                    && pos[axis] <= params.bounds_max[axis] + 1e-5,
                "particle {i} escaped: {pos}"
            );
        }
    }
}

#[test]
fn rotated_box_contains_particles_in_its_local_frame() {
    let mut params = quiet_params();
    params.gravity = 9.8;
    params.set_box_rotation(0.6);
    let mut state = FluidState::from_positions(
        &params,
        vec![Vec3::new(0.2, 0.8, 0.5), Vec3::new(0.8, 0.9, 0.3)],
    );
    state.velocities = vec![Vec3::new(30.0, 0.0, 10.0), Vec3::new(-20.0, 5.0, -15.0)];
    for _ in 0..30 {
        state.step(&params, &cursor_off());
    }
    for (i, &pos) in state.positions.iter().enumerate() {
        let local = params.box_transform_inverse.transform_point3(pos);
        for axis in 0..3 {
            assert!(
                local[axis] >= params.bounds_min[axis] - 1e-4
                    && local[axis] <= params.bounds_max[axis] + 1e-4,
                "particle {i} outside rotated box: local {local}"
            );
        }
    }
}

#[test]
fn paused_step_is_a_no_op() {
    let mut params = SimParams {
        num_particles: 64,
        smoothing_radius: 0.1,
        target_density_scale: 1.0,
        bounds_min: Vec3::ZERO,
        bounds_max: Vec3::ONE,
        grid_table_size: 4096,
        ..SimParams::default()
    };
    let mut state = FluidState::new(&params, 7);
    state.step(&params, &cursor_off());

    let before = state.clone();
    params.paused = true;
    for _ in 0..3 {
        state.step(&params, &cursor_off());
    }

    // bit-for-bit identical, not merely close
    assert_eq!(state.positions, before.positions);
    assert_eq!(state.velocities, before.velocities);
    assert_eq!(state.densities, before.densities);
    assert_eq!(state.accelerations, before.accelerations);
    assert_eq!(state.predicted, before.predicted);
    assert_eq!(state.cell_indices, before.cell_indices);
    assert_eq!(state.cell_offsets, before.cell_offsets);
}

#[test]
fn block_at_target_density_stays_at_rest() {
    let mut params = quiet_params();
    let h = params.smoothing_radius;
    // square of four mutually interacting particles, all symmetric
    let s = 0.25 * h;
    let positions = vec![
        Vec3::new(0.5 - s, 0.5 - s, 0.5),
        Vec3::new(0.5 + s, 0.5 - s, 0.5),
        Vec3::new(0.5 - s, 0.5 + s, 0.5),
        Vec3::new(0.5 + s, 0.5 + s, 0.5),
    ];

    // measure the resting density with forces off
    let mut probe = FluidState::from_positions(&params, positions.clone());
    probe.step(&params, &cursor_off());
    let rest_density = probe.densities[0];
    assert!(rest_density > 0.0);

    // then make that density the EoS target and switch pressure on
    params.target_density = rest_density;
    params.pressure_strength = 1.0;
    let mut state = FluidState::from_positions(&params, positions.clone());
    for _ in 0..10 {
        state.step(&params, &cursor_off());
    }
    for i in 0..4 {
        assert!(
            state.velocities[i].length() < 1e-4,
            "particle {i} moving: {:?}",
            state.velocities[i]
        );
        assert!(
            (state.positions[i] - positions[i]).length() < 1e-5,
            "particle {i} drifted"
        );
    }
}

#[test]
fn gravity_integrates_over_the_fixed_timestep() {
    let mut params = quiet_params();
    params.gravity = 9.8;
    let mut state = FluidState::from_positions(&params, vec![Vec3::splat(0.5)]);
    state.step(&params, &cursor_off());
    let expected = -params.gravity * params.dt;
    assert!((state.velocities[0].y - expected).abs() < 1e-6);
    assert!(state.velocities[0].x.abs() < 1e-9);
}

#[test]
fn cursor_force_pulls_and_pushes() {
    let params = quiet_params();
    let start = Vec3::splat(0.5);

    let attract = CursorState {
        position: Vec2::new(0.55, 0.5),
        mode: CursorForce::Attract,
    };
    let mut state = FluidState::from_positions(&params, vec![start]);
    state.step(&params, &attract);
    assert!(state.velocities[0].x > 0.0, "attract should pull toward cursor");

    let repel = CursorState {
        mode: CursorForce::Repel,
        ..attract
    };
    let mut state = FluidState::from_positions(&params, vec![start]);
    state.step(&params, &repel);
    assert!(state.velocities[0].x < 0.0, "repel should push away");

    // outside the interaction radius nothing happens
    let far = CursorState {
        position: Vec2::new(0.5 + params.interaction_radius * 2.0, 0.5),
        mode: CursorForce::Attract,
    };
    let mut state = FluidState::from_positions(&params, vec![start]);
    state.step(&params, &far);
    assert_eq!(state.velocities[0].x, 0.0);
}
