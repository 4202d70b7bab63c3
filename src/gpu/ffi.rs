// Pod mirrors of the WGSL uniform blocks; plain arrays instead of glam to
// keep the layouts explicit.
use bytemuck::{Pod, Zeroable};

use crate::sim::params::{CursorState, SimParams};
use crate::sim::sort::{self, SortPass};

pub const WORKGROUP_SIZE: u32 = 256;

#[inline]
pub fn workgroups_for(threads: u32) -> u32 {
    threads.div_ceil(WORKGROUP_SIZE)
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ExternalParams {
    pub dt: f32,
    pub gravity: f32,
    pub cursor_x: f32,
    pub cursor_y: f32,
    pub cursor_mode: u32,
    pub interaction_radius: f32,
    pub interaction_strength: f32,
    pub num_particles: u32,
}

impl ExternalParams {
    pub fn from_params(params: &SimParams, cursor: &CursorState) -> Self {
        Self {
            dt: params.dt,
            gravity: params.gravity,
            cursor_x: cursor.position.x,
            cursor_y: cursor.position.y,
            cursor_mode: cursor.mode.as_u32(),
            interaction_radius: params.interaction_radius,
            interaction_strength: params.interaction_strength,
            num_particles: params.num_particles,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PartitionParams {
    pub num_particles: u32,
    pub padded_size: u32,
    pub table_size: u32,
    pub smoothing_radius: f32,
}

impl PartitionParams {
    pub fn from_params(params: &SimParams) -> Self {
        Self {
            num_particles: params.num_particles,
            padded_size: sort::next_power_of_two(params.num_particles),
            table_size: params.grid_table_size,
            smoothing_radius: params.smoothing_radius,
        }
    }
}

/// One uniform per (stage, step) sub-pass; written once, never updated.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SortParams {
    pub stage: u32,
    pub step: u32,
    pub padded_size: u32,
    pub _pad: u32,
}

impl SortParams {
    pub fn for_pass(pass: SortPass, padded_size: u32) -> Self {
        Self {
            stage: pass.stage,
            step: pass.step,
            padded_size,
            _pad: 0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct OffsetsParams {
    pub num_particles: u32,
    pub table_size: u32,
    pub _pad: [u32; 2],
}

impl OffsetsParams {
    pub fn from_params(params: &SimParams) -> Self {
        Self {
            num_particles: params.num_particles,
            table_size: params.grid_table_size,
            _pad: [0; 2],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DensityParams {
    pub num_particles: u32,
    pub table_size: u32,
    pub smoothing_radius: f32,
    pub density_scale: f32,
}

impl DensityParams {
    pub fn from_params(params: &SimParams) -> Self {
        Self {
            num_particles: params.num_particles,
            table_size: params.grid_table_size,
            smoothing_radius: params.smoothing_radius,
            density_scale: params.kernel_scales().spiky_pow2,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ForcesParams {
    pub smoothing_radius: f32,
    /// Already multiplied by the target-density scale.
    pub target_density: f32,
    pub pressure_strength: f32,
    pub viscosity_strength: f32,
    pub pressure_scale: f32,
    pub viscosity_scale: f32,
    pub num_particles: u32,
    pub table_size: u32,
}

impl ForcesParams {
    pub fn from_params(params: &SimParams) -> Self {
        let scales = params.kernel_scales();
        Self {
            smoothing_radius: params.smoothing_radius,
            target_density: params.target_density * params.target_density_scale,
            pressure_strength: params.pressure_strength,
            viscosity_strength: params.viscosity_strength,
            pressure_scale: scales.spiky_pow2_derivative,
            viscosity_scale: scales.poly6,
            num_particles: params.num_particles,
            table_size: params.grid_table_size,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct IntegrateParams {
    pub box_transform: [[f32; 4]; 4],
    pub box_transform_inverse: [[f32; 4]; 4],
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
    pub dt: f32,
    pub collision_damping: f32,
    pub num_particles: u32,
    pub _pad: u32,
}

impl IntegrateParams {
    pub fn from_params(params: &SimParams) -> Self {
        Self {
            box_transform: params.box_transform.to_cols_array_2d(),
            box_transform_inverse: params.box_transform_inverse.to_cols_array_2d(),
            bounds_min: params.bounds_min.extend(0.0).to_array(),
            bounds_max: params.bounds_max.extend(0.0).to_array(),
            dt: params.dt,
            collision_damping: params.collision_damping,
            num_particles: params.num_particles,
            _pad: 0,
        }
    }
}
