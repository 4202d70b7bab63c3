// Thin rendering collaborator: instanced quads reading the simulation's
// position/velocity buffers read-only, colored by speed.
use bevy::core_pipeline::core_2d::graph::{Core2d, Node2d};
use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_graph::{
    NodeRunError, RenderGraphApp, RenderGraphContext, RenderLabel, ViewNode, ViewNodeRunner,
};
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, BlendState,
    Buffer, BufferBindingType, BufferInitDescriptor, BufferUsages, CachedPipelineState,
    CachedRenderPipelineId, ColorTargetState, ColorWrites, FragmentState, MultisampleState,
    PipelineCache, PrimitiveState, RenderPassDescriptor, RenderPipelineDescriptor, Shader,
    ShaderStages, TextureFormat, VertexAttribute, VertexBufferLayout, VertexFormat, VertexState,
    VertexStepMode,
};
use bevy::render::renderer::{RenderContext, RenderDevice, RenderQueue};
use bevy::render::view::ViewTarget;
use bevy::render::{Extract, ExtractSchedule, Render, RenderApp, RenderSet};

use crate::gpu::buffers::ExtractedSphBuffers;
use crate::sim::params::SimParams;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawParams {
    pub view_proj: [[f32; 4]; 4],
    pub particle_size: f32,
    pub max_speed: f32,
    pub _pad: [f32; 2],
    pub slow_color: [f32; 4],
    pub fast_color: [f32; 4],
}

impl DrawParams {
    fn from_params(params: &SimParams) -> Self {
        // orthographic view of the box with a small margin
        let margin = 0.05;
        let view_proj = glam::Mat4::orthographic_rh(
            params.bounds_min.x - margin,
            params.bounds_max.x + margin,
            params.bounds_min.y - margin,
            params.bounds_max.y + margin,
            -1.0,
            1.0,
        );
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            particle_size: params.smoothing_radius * 0.5,
            max_speed: 1.5,
            _pad: [0.0; 2],
            slow_color: [0.1, 0.3, 1.0, 1.0],
            fast_color: [0.6, 0.95, 1.0, 1.0],
        }
    }
}

#[derive(Resource, Clone, ExtractResource)]
pub struct DrawParamsBuffer {
    pub buffer: Buffer,
}

#[derive(Resource, Clone)]
pub struct DrawBindGroupLayout(pub BindGroupLayout);

#[derive(Resource)]
pub struct DrawBindGroup(pub BindGroup);

#[derive(Resource)]
pub struct QuadVertexBuffer {
    pub buffer: Buffer,
}

#[derive(Resource)]
pub struct DrawPipeline(pub CachedRenderPipelineId);

const QUAD_VERTS: &[[f32; 2]] = &[
    [-0.5, -0.5],
    [0.5, -0.5],
    [0.5, 0.5],
    [-0.5, -0.5],
    [0.5, 0.5],
    [-0.5, 0.5],
];

fn init_draw_params(mut commands: Commands, rd: Res<RenderDevice>, params: Res<SimParams>) {
    let buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("sph_draw_params"),
        contents: bytemuck::bytes_of(&DrawParams::from_params(&params)),
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
    });
    commands.insert_resource(DrawParamsBuffer { buffer });
}

fn update_draw_params(rq: Res<RenderQueue>, dp: Res<DrawParamsBuffer>, params: Res<SimParams>) {
    rq.write_buffer(&dp.buffer, 0, bytemuck::bytes_of(&DrawParams::from_params(&params)));
}

fn extract_draw_params(mut commands: Commands, dp: Extract<Option<Res<DrawParamsBuffer>>>) {
    if let Some(dp) = dp.as_ref() {
        commands.insert_resource(DrawParamsBuffer {
            buffer: dp.buffer.clone(),
        });
    }
}

fn init_quad_vb(mut commands: Commands, rd: Res<RenderDevice>) {
    let vb = rd.create_buffer_with_data(&BufferInitDescriptor {
        label: Some("sph_quad_vb"),
        contents: bytemuck::cast_slice(QUAD_VERTS),
        usage: BufferUsages::VERTEX,
    });
    commands.insert_resource(QuadVertexBuffer { buffer: vb });
}

// 0 = positions, 1 = velocities (both read-only), 2 = draw params
fn init_draw_bgl(mut commands: Commands, rd: Res<RenderDevice>) {
    let storage = |binding| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    let bgl = rd.create_bind_group_layout(
        Some("sph_draw_bgl"),
        &[
            storage(0),
            storage(1),
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    );
    commands.insert_resource(DrawBindGroupLayout(bgl));
}

fn prepare_draw_bg(
    mut commands: Commands,
    rd: Res<RenderDevice>,
    layout: Option<Res<DrawBindGroupLayout>>,
    buffers: Option<Res<ExtractedSphBuffers>>,
    dp: Option<Res<DrawParamsBuffer>>,
) {
    let (Some(layout), Some(buffers), Some(dp)) = (layout, buffers, dp) else {
        return;
    };
    let bg = rd.create_bind_group(
        Some("sph_draw_bg"),
        &layout.0,
        &[
            BindGroupEntry {
                binding: 0,
                resource: buffers.position.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 1,
                resource: buffers.velocity.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 2,
                resource: dp.buffer.as_entire_binding(),
            },
        ],
    );
    commands.insert_resource(DrawBindGroup(bg));
}

fn prepare_draw_pipeline(
    mut commands: Commands,
    cache: Res<PipelineCache>,
    bgl: Option<Res<DrawBindGroupLayout>>,
    assets: Res<AssetServer>,
    mut cached: Local<Option<CachedRenderPipelineId>>,
) {
    let Some(bgl) = bgl else {
        return;
    };
    let shader: Handle<Shader> = assets.load("shaders/particles_draw.wgsl");

    if cached.is_none() {
        let vbuf_layout = VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![VertexAttribute {
                format: VertexFormat::Float32x2,
                offset: 0,
                shader_location: 0,
            }],
        };
        let desc = RenderPipelineDescriptor {
            label: Some("sph_particles_draw_pipeline".into()),
            layout: vec![bgl.0.clone()],
            vertex: VertexState {
                shader: shader.clone(),
                entry_point: "vs_main".into(),
                shader_defs: vec![],
                buffers: vec![vbuf_layout],
            },
            fragment: Some(FragmentState {
                shader,
                entry_point: "fs_main".into(),
                shader_defs: vec![],
                targets: vec![Some(ColorTargetState {
                    format: TextureFormat::Rgba8UnormSrgb,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::ALL,
                })],
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            multisample: MultisampleState {
                count: 4,
                ..Default::default()
            },
            push_constant_ranges: vec![],
            zero_initialize_workgroup_memory: false,
        };
        *cached = Some(cache.queue_render_pipeline(desc));
        return;
    }

    if let Some(id) = *cached {
        match cache.get_render_pipeline_state(id) {
            CachedPipelineState::Ok(_) => {
                commands.insert_resource(DrawPipeline(id));
            }
            CachedPipelineState::Err(err) => {
                error!("sph draw pipeline failed to compile: {err:?}");
            }
            _ => {}
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct ParticlesDrawPassLabel;

#[derive(Default)]
pub struct ParticlesDrawNode;

impl ViewNode for ParticlesDrawNode {
    type ViewQuery = (&'static ViewTarget,);

    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        rcx: &mut RenderContext,
        (view_target,): <Self::ViewQuery as bevy::ecs::query::QueryData>::Item<'_>,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let Some(dp) = world.get_resource::<DrawPipeline>() else {
            return Ok(());
        };
        let cache = world.resource::<PipelineCache>();
        let Some(pipeline) = cache.get_render_pipeline(dp.0) else {
            return Ok(());
        };
        let Some(bg) = world.get_resource::<DrawBindGroup>() else {
            return Ok(());
        };
        let Some(vb) = world.get_resource::<QuadVertexBuffer>() else {
            return Ok(());
        };
        let Some(buffers) = world.get_resource::<ExtractedSphBuffers>() else {
            return Ok(());
        };
        if buffers.num_particles == 0 {
            return Ok(());
        }

        let mut pass = rcx.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("sph_particles_draw"),
            color_attachments: &[Some(view_target.get_color_attachment())],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_render_pipeline(pipeline);
        pass.set_bind_group(0, &bg.0, &[]);
        pass.set_vertex_buffer(0, vb.buffer.slice(..));
        pass.draw(0..6, 0..buffers.num_particles);
        Ok(())
    }
}

pub struct SphDrawPlugin;

impl Plugin for SphDrawPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, init_draw_params)
            .add_systems(Update, update_draw_params);

        let render_app = app.sub_app_mut(RenderApp);
        render_app
            .add_systems(ExtractSchedule, extract_draw_params)
            .add_systems(
                Render,
                (
                    init_draw_bgl.run_if(not(resource_exists::<DrawBindGroupLayout>)),
                    init_quad_vb.run_if(not(resource_exists::<QuadVertexBuffer>)),
                    prepare_draw_bg,
                    prepare_draw_pipeline,
                )
                    .chain()
                    .in_set(RenderSet::Prepare),
            )
            .add_render_graph_node::<ViewNodeRunner<ParticlesDrawNode>>(
                Core2d,
                ParticlesDrawPassLabel,
            )
            .add_render_graph_edges(
                Core2d,
                (
                    Node2d::MainTransparentPass,
                    ParticlesDrawPassLabel,
                    Node2d::EndMainPass,
                ),
            );
    }
}
