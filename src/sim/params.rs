use bevy::prelude::Resource;
use bevy::render::extract_resource::ExtractResource;
use glam::{Mat4, Vec2, Vec3};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::sim::grid::DEFAULT_TABLE_SIZE;
use crate::sim::kernels::KernelScales;

/// Shared parameter surface. The UI/input side mutates fields between frames;
/// the orchestrator reads them once per step. Single-threaded frame loop, so
/// no locking discipline is needed.
#[derive(Resource, ExtractResource, Clone, Copy, Debug)]
pub struct SimParams {
    /// Fixed capacity; every buffer is sized from this once and never resized.
    pub num_particles: u32,
    pub smoothing_radius: f32,
    pub target_density: f32,
    /// EoS multiplier on the density target. Useful working scales range
    /// from 1 to 10000 depending on tuning, so it is a knob, not a constant.
    pub target_density_scale: f32,
    pub pressure_strength: f32,
    pub viscosity_strength: f32,
    pub gravity: f32,
    /// Fixed simulation timestep.
    pub dt: f32,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    /// Arrow-key resizing grows one wall instead of both when set.
    pub single_axis_resize: bool,
    pub paused: bool,
    /// Box rotation; boundary checks run in the box's local frame.
    pub box_transform: Mat4,
    pub box_transform_inverse: Mat4,
    pub interaction_radius: f32,
    pub interaction_strength: f32,
    /// Velocity kept along the reflected axis on a wall hit.
    pub collision_damping: f32,
    /// Cell offset table size; power of two.
    pub grid_table_size: u32,
    /// Kernel normalization override. Tuning variants scale the coefficients
    /// differently; `None` derives the standard set from the smoothing radius.
    pub kernel_scale_override: Option<KernelScales>,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            num_particles: 32_768,
            smoothing_radius: 0.011,
            target_density: 3.0,
            target_density_scale: 10_000.0,
            pressure_strength: 20.5,
            viscosity_strength: 0.7,
            gravity: 9.8,
            dt: 1.0 / 120.0,
            bounds_min: Vec3::ZERO,
            bounds_max: Vec3::new(0.4, 0.5, 0.3),
            single_axis_resize: true,
            paused: false,
            box_transform: Mat4::IDENTITY,
            box_transform_inverse: Mat4::IDENTITY,
            interaction_radius: 0.1,
            interaction_strength: 25.0,
            collision_damping: 0.95,
            grid_table_size: DEFAULT_TABLE_SIZE,
            kernel_scale_override: None,
        }
    }
}

impl SimParams {
    /// The kernel normalization set in effect, override or derived.
    #[inline]
    pub fn kernel_scales(&self) -> KernelScales {
        self.kernel_scale_override
            .unwrap_or_else(|| KernelScales::for_radius(self.smoothing_radius))
    }

    /// Equation of state. Negative below the target so sparse regions pull in.
    #[inline]
    pub fn pressure_from_density(&self, density: f32) -> f32 {
        self.pressure_strength * (density - self.target_density * self.target_density_scale)
    }

    /// Rotates the containment box by `angle` radians around the vertical axis
    /// through its center and keeps the cached inverse in sync.
    pub fn set_box_rotation(&mut self, angle: f32) {
        let center = (self.bounds_min + self.bounds_max) * 0.5;
        self.box_transform = Mat4::from_translation(center)
            * Mat4::from_rotation_y(angle)
            * Mat4::from_translation(-center);
        self.box_transform_inverse = self.box_transform.inverse();
    }

    /// Grows (positive delta) or shrinks the box along one axis. In
    /// single-axis mode only the max wall moves, otherwise both walls move
    /// symmetrically.
    pub fn resize_bounds(&mut self, axis: usize, delta: f32) {
        self.bounds_max[axis] += delta;
        if !self.single_axis_resize {
            self.bounds_min[axis] -= delta;
        }
    }
}

/// Interactive point force, driven by the input collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorForce {
    #[default]
    Inactive,
    Attract,
    Repel,
}

impl CursorForce {
    /// Encoding used by the external-forces uniform.
    pub fn as_u32(self) -> u32 {
        match self {
            CursorForce::Inactive => 0,
            CursorForce::Attract => 1,
            CursorForce::Repel => 2,
        }
    }
}

/// Cursor position already mapped into simulation coordinates (x/y plane).
#[derive(Resource, ExtractResource, Clone, Copy, Debug, Default)]
pub struct CursorState {
    pub position: Vec2,
    pub mode: CursorForce,
}

/// Seeded initial placement inside a sub-region of the box: a block resting
/// off-center so the fluid visibly settles.
pub fn spawn_positions(params: &SimParams, seed: u64) -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    let lo = params.bounds_min;
    let ext = params.bounds_max - params.bounds_min;
    (0..params.num_particles)
        .map(|_| {
            Vec3::new(
                lo.x + rng.gen_range(0.0..0.6) * ext.x,
                lo.y + rng.gen_range(0.3..0.7) * ext.y,
                lo.z + rng.gen_range(0.2..0.8) * ext.z,
            )
        })
        .collect()
}
