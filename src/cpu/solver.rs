// CPU reference solver: the same step, pass for pass, as the GPU pipeline.
// It is the parity baseline and the test oracle, not a runtime fallback;
// the arithmetic is shared with the WGSL kernels through the sim modules.
use glam::{IVec3, Vec3};

use crate::sim::grid::{self, EMPTY_CELL};
use crate::sim::kernels;
use crate::sim::offsets;
use crate::sim::params::{CursorForce, CursorState, SimParams, spawn_positions};
use crate::sim::schedule::{self, SimPass};
use crate::sim::sort;

const DENSITY_FLOOR: f32 = 1e-8;

#[derive(Clone, Debug)]
pub struct FluidState {
    pub positions: Vec<Vec3>,
    pub predicted: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub densities: Vec<f32>,
    pub accelerations: Vec<Vec3>,
    /// Sorted-view arrays, padded to the next power of two for the sort.
    pub particle_indices: Vec<u32>,
    pub cell_indices: Vec<u32>,
    pub cell_offsets: Vec<u32>,
}

impl FluidState {
    pub fn new(params: &SimParams, seed: u64) -> Self {
        let positions = spawn_positions(params, seed);
        Self::from_positions(params, positions)
    }

    /// Tests place particles by hand through this.
    pub fn from_positions(params: &SimParams, positions: Vec<Vec3>) -> Self {
        let n = positions.len();
        let padded = sort::next_power_of_two(n as u32) as usize;
        Self {
            predicted: positions.clone(),
            velocities: vec![Vec3::ZERO; n],
            densities: vec![0.0; n],
            accelerations: vec![Vec3::ZERO; n],
            particle_indices: (0..padded as u32).collect(),
            cell_indices: vec![EMPTY_CELL; padded],
            cell_offsets: vec![EMPTY_CELL; params.grid_table_size as usize],
            positions,
        }
    }

    #[inline]
    pub fn num_particles(&self) -> usize {
        self.positions.len()
    }

    /// Runs one full step through the shared pass schedule. While paused the
    /// step is skipped entirely and every buffer keeps its prior contents.
    pub fn step(&mut self, params: &SimParams, cursor: &CursorState) {
        if params.paused {
            return;
        }
        let n = self.num_particles() as u32;
        let passes = schedule::step_schedule(n);
        debug_assert!(schedule::is_well_ordered(&passes, n));
        for pass in passes {
            match pass {
                SimPass::ExternalForces => self.external_forces(params, cursor),
                SimPass::ClearOffsets => offsets::clear(&mut self.cell_offsets),
                SimPass::Partition => self.partition(params),
                SimPass::Sort(p) => {
                    sort::compare_exchange(&mut self.cell_indices, &mut self.particle_indices, p);
                }
                SimPass::BuildOffsets => self.build_offsets(),
                SimPass::Density => self.density(params),
                SimPass::Forces => self.forces(params),
                SimPass::Integrate => self.integrate(params),
            }
        }
    }

    /// Gravity plus the cursor force, then predicted positions. Must complete
    /// before partitioning: the grid reads predicted positions.
    pub fn external_forces(&mut self, params: &SimParams, cursor: &CursorState) {
        for i in 0..self.num_particles() {
            let mut vel = self.velocities[i];
            vel.y -= params.gravity * params.dt;
            if cursor.mode != CursorForce::Inactive {
                let to_cursor = cursor.position - self.positions[i].truncate();
                let dist = to_cursor.length();
                if dist < params.interaction_radius && dist > 1e-6 {
                    let falloff = 1.0 - dist / params.interaction_radius;
                    let mut dir = to_cursor / dist;
                    if cursor.mode == CursorForce::Repel {
                        dir = -dir;
                    }
                    let push = dir * params.interaction_strength * falloff * params.dt;
                    vel.x += push.x;
                    vel.y += push.y;
                }
            }
            self.velocities[i] = vel;
            self.predicted[i] = self.positions[i] + vel * params.dt;
        }
    }

    /// Cell key per particle plus the identity permutation; padding slots get
    /// the sentinel key so they sort to the end.
    pub fn partition(&mut self, params: &SimParams) {
        let n = self.num_particles();
        for i in 0..self.cell_indices.len() {
            self.particle_indices[i] = i as u32;
            self.cell_indices[i] = if i < n {
                grid::key_for(
                    self.predicted[i],
                    params.smoothing_radius,
                    params.grid_table_size,
                )
            } else {
                EMPTY_CELL
            };
        }
    }

    pub fn build_offsets(&mut self) {
        let n = self.num_particles();
        offsets::build(&self.cell_indices[..n], &mut self.cell_offsets);
    }

    /// Calls `f(j, delta, dst2)` for every particle j (including i itself)
    /// within the smoothing radius of `origin`, found via the 3x3x3 cell block
    /// around it. Hash collisions put extra candidates in the scanned range;
    /// the distance check filters them.
    fn for_each_neighbor(
        &self,
        origin: Vec3,
        params: &SimParams,
        mut f: impl FnMut(usize, Vec3, f32),
    ) {
        let n = self.num_particles();
        let h = params.smoothing_radius;
        let h2 = h * h;
        let center = grid::cell_coord(origin, h);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = grid::cell_key(
                        grid::hash_cell(center + IVec3::new(dx, dy, dz)),
                        params.grid_table_size,
                    );
                    let start = self.cell_offsets[key as usize];
                    if start == EMPTY_CELL {
                        continue;
                    }
                    let mut slot = start as usize;
                    while slot < n && self.cell_indices[slot] == key {
                        let j = self.particle_indices[slot] as usize;
                        let delta = self.predicted[j] - origin;
                        let dst2 = delta.length_squared();
                        if dst2 < h2 {
                            f(j, delta, dst2);
                        }
                        slot += 1;
                    }
                }
            }
        }
    }

    /// SPH density at the predicted position; the self-contribution is the
    /// kernel at distance zero.
    pub fn density(&mut self, params: &SimParams) {
        let h = params.smoothing_radius;
        let scales = params.kernel_scales();
        let mut densities = vec![0.0f32; self.num_particles()];
        for (i, rho) in densities.iter_mut().enumerate() {
            self.for_each_neighbor(self.predicted[i], params, |_, _, dst2| {
                *rho += kernels::density_kernel(dst2.sqrt(), h, scales.spiky_pow2);
            });
        }
        self.densities = densities;
    }

    /// Pressure + viscosity accelerations from the density field. Velocities
    /// are only read here; every particle sees the same pre-step snapshot, so
    /// the pass stays commutative across particles.
    pub fn forces(&mut self, params: &SimParams) {
        let h = params.smoothing_radius;
        let scales = params.kernel_scales();
        let n = self.num_particles();

        let mut accelerations = vec![Vec3::ZERO; n];
        for (i, acc) in accelerations.iter_mut().enumerate() {
            let density_i = self.densities[i].max(DENSITY_FLOOR);
            let pressure_i = params.pressure_from_density(self.densities[i]);
            let vel_i = self.velocities[i];
            let mut pressure_force = Vec3::ZERO;
            let mut viscosity_force = Vec3::ZERO;
            self.for_each_neighbor(self.predicted[i], params, |j, delta, dst2| {
                if j == i {
                    return;
                }
                let density_j = self.densities[j].max(DENSITY_FLOOR);
                let dst = dst2.sqrt();
                // deterministic push direction for coincident particles
                let dir = if dst > 1e-8 { delta / dst } else { Vec3::Y };
                // averaged so the pair force is equal and opposite
                let shared_pressure =
                    0.5 * (pressure_i + params.pressure_from_density(self.densities[j]));
                let slope = kernels::density_derivative(dst, h, scales.spiky_pow2_derivative);
                pressure_force += dir * (shared_pressure * slope / density_j);
                viscosity_force += (self.velocities[j] - vel_i)
                    * kernels::viscosity_kernel(dst2, h, scales.poly6);
            });
            *acc = (pressure_force + viscosity_force * params.viscosity_strength) / density_i;
        }
        self.accelerations = accelerations;
    }

    /// Applies the accumulated accelerations, integrates positions, then
    /// boundary containment in the box's local frame.
    pub fn integrate(&mut self, params: &SimParams) {
        let n = self.num_particles();
        for i in 0..n {
            self.velocities[i] += self.accelerations[i] * params.dt;
            self.positions[i] += self.velocities[i] * params.dt;

            let mut local_p = params.box_transform_inverse.transform_point3(self.positions[i]);
            let mut local_v = params
                .box_transform_inverse
                .transform_vector3(self.velocities[i]);
            let mut hit = false;
            for axis in 0..3 {
                if local_p[axis] < params.bounds_min[axis] {
                    local_p[axis] = params.bounds_min[axis];
                    local_v[axis] = -local_v[axis] * params.collision_damping;
                    hit = true;
                } else if local_p[axis] > params.bounds_max[axis] {
                    local_p[axis] = params.bounds_max[axis];
                    local_v[axis] = -local_v[axis] * params.collision_damping;
                    hit = true;
                }
            }
            if hit {
                self.positions[i] = params.box_transform.transform_point3(local_p);
                self.velocities[i] = params.box_transform.transform_vector3(local_v);
            }
        }
    }
}
