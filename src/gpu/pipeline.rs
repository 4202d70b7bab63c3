use std::borrow::Cow;

use bevy::prelude::*;
use bevy::render::graph::CameraDriverLabel;
use bevy::render::render_graph::{
    Node, NodeRunError, RenderGraph, RenderGraphContext, RenderLabel,
};
use bevy::render::render_resource::{
    CachedComputePipelineId, CachedPipelineState, ComputePassDescriptor, ComputePipeline,
    ComputePipelineDescriptor, PipelineCache, PushConstantRange, ShaderDefVal,
};
use bevy::render::renderer::RenderContext;

use crate::gpu::buffers::{
    AllowCopy, ExtractedSphBuffers, ReadbackBuffers, SphBindGroupLayouts, SphBindGroups,
};
use crate::gpu::ffi::workgroups_for;
use crate::sim::params::SimParams;
use crate::sim::schedule::{self, SimPass};

/// Pipeline ids in queue order, kept until every stage has compiled.
#[derive(Clone, Copy)]
pub struct QueuedSphPipelines {
    external: CachedComputePipelineId,
    partition: CachedComputePipelineId,
    sort: CachedComputePipelineId,
    offsets_clear: CachedComputePipelineId,
    offsets_build: CachedComputePipelineId,
    density: CachedComputePipelineId,
    forces: CachedComputePipelineId,
    integrate: CachedComputePipelineId,
}

/// Compiled pipelines for every stage; the step node only runs once this
/// resource exists, so a stage that failed to compile can never be skipped
/// silently mid-step.
#[derive(Resource)]
pub struct SphPipelines {
    pub external: ComputePipeline,
    pub partition: ComputePipeline,
    pub sort: ComputePipeline,
    pub offsets_clear: ComputePipeline,
    pub offsets_build: ComputePipeline,
    pub density: ComputePipeline,
    pub forces: ComputePipeline,
    pub integrate: ComputePipeline,
}

pub fn prepare_sph_pipelines(
    mut commands: Commands,
    pipeline_cache: Res<PipelineCache>,
    layouts: Option<Res<SphBindGroupLayouts>>,
    assets: Res<AssetServer>,
    mut queued: Local<Option<QueuedSphPipelines>>,
    already_ready: Option<Res<SphPipelines>>,
) {
    if already_ready.is_some() {
        return;
    }
    let Some(layouts) = layouts else {
        return;
    };

    let queue = |path: &str, entry: &'static str, layout| {
        let desc = ComputePipelineDescriptor {
            label: Some(format!("sph_{entry}_pipeline").into()),
            layout: vec![layout],
            push_constant_ranges: Vec::<PushConstantRange>::new(),
            shader: assets.load(path),
            shader_defs: Vec::<ShaderDefVal>::new(),
            entry_point: Cow::from(entry),
            zero_initialize_workgroup_memory: false,
        };
        pipeline_cache.queue_compute_pipeline(desc)
    };

    if queued.is_none() {
        *queued = Some(QueuedSphPipelines {
            external: queue(
                "shaders/external.wgsl",
                "external_forces",
                layouts.external.clone(),
            ),
            partition: queue(
                "shaders/partition.wgsl",
                "partition",
                layouts.partition.clone(),
            ),
            sort: queue("shaders/sort.wgsl", "sort_pairs", layouts.sort.clone()),
            offsets_clear: queue(
                "shaders/offsets.wgsl",
                "clear_offsets",
                layouts.offsets.clone(),
            ),
            offsets_build: queue(
                "shaders/offsets.wgsl",
                "build_offsets",
                layouts.offsets.clone(),
            ),
            density: queue("shaders/density.wgsl", "density", layouts.density.clone()),
            forces: queue("shaders/forces.wgsl", "forces", layouts.forces.clone()),
            integrate: queue(
                "shaders/integrate.wgsl",
                "integrate",
                layouts.integrate.clone(),
            ),
        });
        return; // wait for compilation
    }

    let ids = queued.as_ref().unwrap();
    let stages = [
        ("external", ids.external),
        ("partition", ids.partition),
        ("sort", ids.sort),
        ("offsets_clear", ids.offsets_clear),
        ("offsets_build", ids.offsets_build),
        ("density", ids.density),
        ("forces", ids.forces),
        ("integrate", ids.integrate),
    ];

    // A failed stage is fatal for the step: report it by name and leave the
    // pipeline resource absent so nothing dispatches.
    let mut all_ready = true;
    for (name, id) in stages {
        match pipeline_cache.get_compute_pipeline_state(id) {
            CachedPipelineState::Ok(_) => {}
            CachedPipelineState::Err(err) => {
                error!("sph {name} pipeline failed to compile: {err:?}");
                all_ready = false;
            }
            _ => all_ready = false,
        }
    }
    if !all_ready {
        return;
    }

    let get = |id| {
        pipeline_cache
            .get_compute_pipeline(id)
            .cloned()
            .expect("state was Ok")
    };
    commands.insert_resource(SphPipelines {
        external: get(ids.external),
        partition: get(ids.partition),
        sort: get(ids.sort),
        offsets_clear: get(ids.offsets_clear),
        offsets_build: get(ids.offsets_build),
        density: get(ids.density),
        forces: get(ids.forces),
        integrate: get(ids.integrate),
    });
    info!("sph compute pipelines ready");
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct SphStepPassLabel;

#[derive(Default)]
struct SphStepNode;

impl Node for SphStepNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let Some(pipelines) = world.get_resource::<SphPipelines>() else {
            return Ok(());
        };
        let Some(bind_groups) = world.get_resource::<SphBindGroups>() else {
            return Ok(());
        };
        let Some(buffers) = world.get_resource::<ExtractedSphBuffers>() else {
            return Ok(());
        };
        let Some(params) = world.get_resource::<SimParams>() else {
            return Ok(());
        };

        // Paused: skip the whole step; buffers keep their prior contents and
        // rendering carries on from them.
        if params.paused {
            return Ok(());
        }

        let n = buffers.num_particles;
        let passes = schedule::step_schedule(n);
        debug_assert!(schedule::is_well_ordered(&passes, n));

        {
            // One dispatch per schedule entry. WebGPU orders storage writes
            // between dispatches in a pass, which is the device-wide barrier
            // each arrow in the schedule requires; the sort sub-passes rely
            // on it just as much as the stage boundaries do.
            let mut pass = render_context
                .command_encoder()
                .begin_compute_pass(&ComputePassDescriptor {
                    label: Some("sph_step"),
                    ..default()
                });

            let mut sort_index = 0;
            for entry in passes {
                match entry {
                    SimPass::ExternalForces => {
                        pass.set_pipeline(&pipelines.external);
                        pass.set_bind_group(0, &bind_groups.external, &[]);
                        pass.dispatch_workgroups(workgroups_for(n), 1, 1);
                    }
                    SimPass::ClearOffsets => {
                        pass.set_pipeline(&pipelines.offsets_clear);
                        pass.set_bind_group(0, &bind_groups.offsets, &[]);
                        pass.dispatch_workgroups(workgroups_for(buffers.table_size), 1, 1);
                    }
                    SimPass::Partition => {
                        pass.set_pipeline(&pipelines.partition);
                        pass.set_bind_group(0, &bind_groups.partition, &[]);
                        pass.dispatch_workgroups(workgroups_for(buffers.padded_size), 1, 1);
                    }
                    SimPass::Sort(expected) => {
                        let (pass_desc, bind_group) = &bind_groups.sort[sort_index];
                        debug_assert_eq!(*pass_desc, expected);
                        sort_index += 1;
                        pass.set_pipeline(&pipelines.sort);
                        pass.set_bind_group(0, bind_group, &[]);
                        pass.dispatch_workgroups(workgroups_for(buffers.padded_size), 1, 1);
                    }
                    SimPass::BuildOffsets => {
                        pass.set_pipeline(&pipelines.offsets_build);
                        pass.set_bind_group(0, &bind_groups.offsets, &[]);
                        pass.dispatch_workgroups(workgroups_for(n), 1, 1);
                    }
                    SimPass::Density => {
                        pass.set_pipeline(&pipelines.density);
                        pass.set_bind_group(0, &bind_groups.density, &[]);
                        pass.dispatch_workgroups(workgroups_for(n), 1, 1);
                    }
                    SimPass::Forces => {
                        pass.set_pipeline(&pipelines.forces);
                        pass.set_bind_group(0, &bind_groups.forces, &[]);
                        pass.dispatch_workgroups(workgroups_for(n), 1, 1);
                    }
                    SimPass::Integrate => {
                        pass.set_pipeline(&pipelines.integrate);
                        pass.set_bind_group(0, &bind_groups.integrate, &[]);
                        pass.dispatch_workgroups(workgroups_for(n), 1, 1);
                    }
                }
            }
        }

        let copy_requested = world
            .get_resource::<AllowCopy>()
            .is_some_and(|allow| allow.0);
        if copy_requested {
            if let Some(readback) = world.get_resource::<ReadbackBuffers>() {
                let encoder = render_context.command_encoder();
                encoder.copy_buffer_to_buffer(
                    &buffers.position,
                    0,
                    &readback.position,
                    0,
                    n as u64 * 16,
                );
                encoder.copy_buffer_to_buffer(
                    &buffers.density,
                    0,
                    &readback.density,
                    0,
                    n as u64 * 4,
                );
            }
        }

        Ok(())
    }
}

pub fn add_step_node_to_graph(render_app: &mut bevy::app::SubApp) {
    let mut graph = render_app.world_mut().resource_mut::<RenderGraph>();
    graph.add_node(SphStepPassLabel, SphStepNode::default());
    graph.add_node_edge(SphStepPassLabel, CameraDriverLabel);
}
