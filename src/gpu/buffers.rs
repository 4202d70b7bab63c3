use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferDescriptor, BufferInitDescriptor, BufferUsages, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::{Extract, ExtractSchedule, Render, RenderApp, RenderSet};

use crate::gpu::ffi::{
    DensityParams, ExternalParams, ForcesParams, IntegrateParams, OffsetsParams, PartitionParams,
    SortParams,
};
use crate::gpu::pipeline::{add_step_node_to_graph, prepare_sph_pipelines};
use crate::sim::grid::EMPTY_CELL;
use crate::sim::params::{CursorState, SimParams, spawn_positions};
use crate::sim::sort::{self, SortPass};

/// Seed for the initial placement; fixed so runs are reproducible and the
/// parity demo can mirror the GPU state on the CPU.
#[derive(Resource, Copy, Clone, Debug)]
pub struct SpawnSeed(pub u64);

impl Default for SpawnSeed {
    fn default() -> Self {
        Self(7)
    }
}

// ==================== resources ======================================

/// All per-particle storage, allocated once at startup at fixed capacity.
/// The sorted-view arrays are padded to the next power of two for the sort.
#[derive(Resource)]
pub struct ParticleBuffers {
    pub position: Buffer,
    pub velocity: Buffer,
    pub predicted: Buffer,
    pub density: Buffer,
    pub acceleration: Buffer,
    pub particle_index: Buffer,
    pub cell_index: Buffer,
    pub cell_offset: Buffer,
    pub num_particles: u32,
    pub padded_size: u32,
    pub table_size: u32,
}

/// Uniform blocks, one per stage plus one per sort sub-pass. The sort
/// uniforms hold their (stage, step) pair and are never rewritten.
#[derive(Resource)]
pub struct StageUniforms {
    pub external: Buffer,
    pub partition: Buffer,
    pub offsets: Buffer,
    pub density: Buffer,
    pub forces: Buffer,
    pub integrate: Buffer,
    pub sort: Vec<(SortPass, Buffer)>,
}

/// Render-world copy of the buffer handles.
#[derive(Resource, Clone, ExtractResource)]
pub struct ExtractedSphBuffers {
    pub position: Buffer,
    pub velocity: Buffer,
    pub predicted: Buffer,
    pub density: Buffer,
    pub acceleration: Buffer,
    pub particle_index: Buffer,
    pub cell_index: Buffer,
    pub cell_offset: Buffer,
    pub external: Buffer,
    pub partition: Buffer,
    pub offsets: Buffer,
    pub density_uniform: Buffer,
    pub forces: Buffer,
    pub integrate: Buffer,
    pub sort: Vec<(SortPass, Buffer)>,
    pub num_particles: u32,
    pub padded_size: u32,
    pub table_size: u32,
}

/// When set, the step node copies positions and densities into the mappable
/// readback buffers after the integrate barrier (parity demo only).
#[derive(Resource, Clone, Copy, ExtractResource)]
pub struct AllowCopy(pub bool);

#[derive(Resource, Clone, ExtractResource)]
pub struct ReadbackBuffers {
    pub position: Buffer,
    pub density: Buffer,
    pub num_particles: u32,
}

#[derive(Resource, Clone)]
pub struct SphBindGroupLayouts {
    pub external: BindGroupLayout,
    pub partition: BindGroupLayout,
    pub sort: BindGroupLayout,
    pub offsets: BindGroupLayout,
    pub density: BindGroupLayout,
    pub forces: BindGroupLayout,
    pub integrate: BindGroupLayout,
}

#[derive(Resource)]
pub struct SphBindGroups {
    pub external: BindGroup,
    pub partition: BindGroup,
    pub offsets: BindGroup,
    pub density: BindGroup,
    pub forces: BindGroup,
    pub integrate: BindGroup,
    pub sort: Vec<(SortPass, BindGroup)>,
}

// ==================== layout helpers =================================

fn storage_entry(binding: u32, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

// ==================== systems ========================================

// Startup: allocate every buffer once, seeded initial state.

fn init_sph_buffers(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    params: Res<SimParams>,
    cursor: Res<CursorState>,
    seed: Res<SpawnSeed>,
) {
    let n = params.num_particles;
    let padded = sort::next_power_of_two(n);

    let positions: Vec<[f32; 4]> = spawn_positions(&params, seed.0)
        .into_iter()
        .map(|p| [p.x, p.y, p.z, 0.0])
        .collect();
    let zeros4 = vec![[0.0f32; 4]; n as usize];
    let identity: Vec<u32> = (0..padded).collect();
    let empty_keys = vec![EMPTY_CELL; padded as usize];
    let empty_offsets = vec![EMPTY_CELL; params.grid_table_size as usize];

    let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC;
    let make = |label: &str, contents: &[u8]| {
        render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: storage,
        })
    };

    let buffers = ParticleBuffers {
        position: make("sph_position", bytemuck::cast_slice(&positions)),
        velocity: make("sph_velocity", bytemuck::cast_slice(&zeros4)),
        predicted: make("sph_predicted", bytemuck::cast_slice(&positions)),
        density: make(
            "sph_density",
            bytemuck::cast_slice(&vec![0.0f32; n as usize]),
        ),
        acceleration: make("sph_acceleration", bytemuck::cast_slice(&zeros4)),
        particle_index: make("sph_particle_index", bytemuck::cast_slice(&identity)),
        cell_index: make("sph_cell_index", bytemuck::cast_slice(&empty_keys)),
        cell_offset: make("sph_cell_offset", bytemuck::cast_slice(&empty_offsets)),
        num_particles: n,
        padded_size: padded,
        table_size: params.grid_table_size,
    };

    let uniform = BufferUsages::UNIFORM | BufferUsages::COPY_DST;
    let make_uniform = |label: &str, contents: &[u8]| {
        render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: uniform,
        })
    };

    let sort_uniforms = sort::pass_schedule(padded)
        .into_iter()
        .map(|pass| {
            let value = SortParams::for_pass(pass, padded);
            (pass, make_uniform("sph_sort_params", bytemuck::bytes_of(&value)))
        })
        .collect();

    let uniforms = StageUniforms {
        external: make_uniform(
            "sph_external_params",
            bytemuck::bytes_of(&ExternalParams::from_params(&params, &cursor)),
        ),
        partition: make_uniform(
            "sph_partition_params",
            bytemuck::bytes_of(&PartitionParams::from_params(&params)),
        ),
        offsets: make_uniform(
            "sph_offsets_params",
            bytemuck::bytes_of(&OffsetsParams::from_params(&params)),
        ),
        density: make_uniform(
            "sph_density_params",
            bytemuck::bytes_of(&DensityParams::from_params(&params)),
        ),
        forces: make_uniform(
            "sph_forces_params",
            bytemuck::bytes_of(&ForcesParams::from_params(&params)),
        ),
        integrate: make_uniform(
            "sph_integrate_params",
            bytemuck::bytes_of(&IntegrateParams::from_params(&params)),
        ),
        sort: sort_uniforms,
    };

    let readback = ReadbackBuffers {
        position: render_device.create_buffer(&BufferDescriptor {
            label: Some("sph_position_readback"),
            size: n as u64 * 16,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        }),
        density: render_device.create_buffer(&BufferDescriptor {
            label: Some("sph_density_readback"),
            size: n as u64 * 4,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        }),
        num_particles: n,
    };

    commands.insert_resource(buffers);
    commands.insert_resource(uniforms);
    commands.insert_resource(readback);
    info!("sph buffers allocated: {n} particles, padded {padded}");
}

// Update: refresh the per-stage uniforms from the shared parameter surface.
// The sort uniforms are static per pass and are not rewritten.

fn write_stage_uniforms(
    params: Res<SimParams>,
    cursor: Res<CursorState>,
    uniforms: Option<Res<StageUniforms>>,
    render_queue: Res<RenderQueue>,
) {
    let Some(uniforms) = uniforms else {
        return;
    };
    render_queue.write_buffer(
        &uniforms.external,
        0,
        bytemuck::bytes_of(&ExternalParams::from_params(&params, &cursor)),
    );
    render_queue.write_buffer(
        &uniforms.partition,
        0,
        bytemuck::bytes_of(&PartitionParams::from_params(&params)),
    );
    render_queue.write_buffer(
        &uniforms.offsets,
        0,
        bytemuck::bytes_of(&OffsetsParams::from_params(&params)),
    );
    render_queue.write_buffer(
        &uniforms.density,
        0,
        bytemuck::bytes_of(&DensityParams::from_params(&params)),
    );
    render_queue.write_buffer(
        &uniforms.forces,
        0,
        bytemuck::bytes_of(&ForcesParams::from_params(&params)),
    );
    render_queue.write_buffer(
        &uniforms.integrate,
        0,
        bytemuck::bytes_of(&IntegrateParams::from_params(&params)),
    );
}

// Extract: hand the buffer handles and the frame's parameters to the render
// world.

fn extract_sph_buffers(
    mut commands: Commands,
    buffers: Extract<Option<Res<ParticleBuffers>>>,
    uniforms: Extract<Option<Res<StageUniforms>>>,
    readback: Extract<Option<Res<ReadbackBuffers>>>,
    params: Extract<Res<SimParams>>,
    allow_copy: Extract<Res<AllowCopy>>,
) {
    let (Some(buffers), Some(uniforms), Some(readback)) =
        (buffers.as_ref(), uniforms.as_ref(), readback.as_ref())
    else {
        return;
    };
    commands.insert_resource(ExtractedSphBuffers {
        position: buffers.position.clone(),
        velocity: buffers.velocity.clone(),
        predicted: buffers.predicted.clone(),
        density: buffers.density.clone(),
        acceleration: buffers.acceleration.clone(),
        particle_index: buffers.particle_index.clone(),
        cell_index: buffers.cell_index.clone(),
        cell_offset: buffers.cell_offset.clone(),
        external: uniforms.external.clone(),
        partition: uniforms.partition.clone(),
        offsets: uniforms.offsets.clone(),
        density_uniform: uniforms.density.clone(),
        forces: uniforms.forces.clone(),
        integrate: uniforms.integrate.clone(),
        sort: uniforms.sort.clone(),
        num_particles: buffers.num_particles,
        padded_size: buffers.padded_size,
        table_size: buffers.table_size,
    });
    commands.insert_resource(readback.as_ref().clone());
    commands.insert_resource(**params);
    commands.insert_resource(**allow_copy);
}

// Render world: layouts once, bind groups per frame.

fn init_sph_bind_group_layouts(mut commands: Commands, render_device: Res<RenderDevice>) {
    let layouts = SphBindGroupLayouts {
        external: render_device.create_bind_group_layout(
            Some("sph_external_bgl"),
            &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
                uniform_entry(3),
            ],
        ),
        partition: render_device.create_bind_group_layout(
            Some("sph_partition_bgl"),
            &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
                uniform_entry(3),
            ],
        ),
        sort: render_device.create_bind_group_layout(
            Some("sph_sort_bgl"),
            &[
                storage_entry(0, false),
                storage_entry(1, false),
                uniform_entry(2),
            ],
        ),
        offsets: render_device.create_bind_group_layout(
            Some("sph_offsets_bgl"),
            &[
                storage_entry(0, true),
                storage_entry(1, false),
                uniform_entry(2),
            ],
        ),
        density: render_device.create_bind_group_layout(
            Some("sph_density_bgl"),
            &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                uniform_entry(5),
            ],
        ),
        forces: render_device.create_bind_group_layout(
            Some("sph_forces_bgl"),
            &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, true),
                uniform_entry(7),
            ],
        ),
        integrate: render_device.create_bind_group_layout(
            Some("sph_integrate_bgl"),
            &[
                storage_entry(0, false),
                storage_entry(1, false),
                storage_entry(2, true),
                uniform_entry(3),
            ],
        ),
    };
    commands.insert_resource(layouts);
}

fn prepare_sph_bind_groups(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layouts: Option<Res<SphBindGroupLayouts>>,
    extracted: Option<Res<ExtractedSphBuffers>>,
) {
    let (Some(layouts), Some(b)) = (layouts, extracted) else {
        return;
    };
    fn entry<'a>(binding: u32, buffer: &'a Buffer) -> BindGroupEntry<'a> {
        BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        }
    }

    let sort = b
        .sort
        .iter()
        .map(|(pass, uniform)| {
            let bg = render_device.create_bind_group(
                Some("sph_sort_bg"),
                &layouts.sort,
                &[
                    entry(0, &b.particle_index),
                    entry(1, &b.cell_index),
                    entry(2, uniform),
                ],
            );
            (*pass, bg)
        })
        .collect();

    commands.insert_resource(SphBindGroups {
        external: render_device.create_bind_group(
            Some("sph_external_bg"),
            &layouts.external,
            &[
                entry(0, &b.position),
                entry(1, &b.velocity),
                entry(2, &b.predicted),
                entry(3, &b.external),
            ],
        ),
        partition: render_device.create_bind_group(
            Some("sph_partition_bg"),
            &layouts.partition,
            &[
                entry(0, &b.predicted),
                entry(1, &b.particle_index),
                entry(2, &b.cell_index),
                entry(3, &b.partition),
            ],
        ),
        offsets: render_device.create_bind_group(
            Some("sph_offsets_bg"),
            &layouts.offsets,
            &[
                entry(0, &b.cell_index),
                entry(1, &b.cell_offset),
                entry(2, &b.offsets),
            ],
        ),
        density: render_device.create_bind_group(
            Some("sph_density_bg"),
            &layouts.density,
            &[
                entry(0, &b.predicted),
                entry(1, &b.density),
                entry(2, &b.particle_index),
                entry(3, &b.cell_index),
                entry(4, &b.cell_offset),
                entry(5, &b.density_uniform),
            ],
        ),
        forces: render_device.create_bind_group(
            Some("sph_forces_bg"),
            &layouts.forces,
            &[
                entry(0, &b.predicted),
                entry(1, &b.velocity),
                entry(2, &b.density),
                entry(3, &b.acceleration),
                entry(4, &b.particle_index),
                entry(5, &b.cell_index),
                entry(6, &b.cell_offset),
                entry(7, &b.forces),
            ],
        ),
        integrate: render_device.create_bind_group(
            Some("sph_integrate_bg"),
            &layouts.integrate,
            &[
                entry(0, &b.position),
                entry(1, &b.velocity),
                entry(2, &b.acceleration),
                entry(3, &b.integrate),
            ],
        ),
        sort,
    });
}

// ==================== plugin =========================================

pub struct SphComputePlugin;

impl Plugin for SphComputePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SpawnSeed>()
            .insert_resource(AllowCopy(false))
            .add_systems(Startup, init_sph_buffers)
            .add_systems(Update, write_stage_uniforms);
        if !app.world().contains_resource::<SimParams>() {
            app.insert_resource(SimParams::default());
        }
        if !app.world().contains_resource::<CursorState>() {
            app.insert_resource(CursorState::default());
        }

        let render_app = app.sub_app_mut(RenderApp);
        render_app
            .add_systems(ExtractSchedule, extract_sph_buffers)
            .add_systems(
                Render,
                (
                    init_sph_bind_group_layouts
                        .run_if(not(resource_exists::<SphBindGroupLayouts>)),
                    prepare_sph_bind_groups,
                    prepare_sph_pipelines,
                )
                    .chain()
                    .in_set(RenderSet::Prepare),
            );

        add_step_node_to_graph(render_app);
    }
}
