// Steps the GPU pipeline and the CPU reference solver from the same seeded
// state, reads positions and densities back after ten steps, and asserts the
// two stay in tolerance. Exits with success when they do.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bevy::app::AppExit;
use bevy::prelude::*;
use bevy::render::render_resource::{Buffer, Maintain, MapMode};
use bevy::render::renderer::RenderDevice;
use bevy_sph_compute::cpu::solver::FluidState;
use bevy_sph_compute::gpu::buffers::{AllowCopy, ReadbackBuffers, SpawnSeed, SphComputePlugin};
use bevy_sph_compute::sim::params::{CursorState, SimParams};

const STEPS: u32 = 10;
// frames to let the pipeline cache finish compiling before stepping
const WARMUP_FRAMES: u32 = 60;

const MAX_ABS_POS: f32 = 1e-3;
const MAX_REL_RHO: f32 = 0.01;

#[inline(always)]
fn rel_err(a: f32, b: f32) -> f32 {
    const EPS: f32 = 1e-6;
    ((b - a) / a.abs().max(EPS)).abs()
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(SimParams {
            paused: true,
            ..SimParams::default()
        })
        .add_plugins(SphComputePlugin)
        .add_systems(Startup, |mut commands: Commands| {
            commands.spawn(Camera2d);
        })
        .add_systems(Update, drive_parity)
        .run();
}

fn map_and_read(render_device: &RenderDevice, buffer: &Buffer) -> Option<Vec<u8>> {
    render_device.poll(Maintain::Wait);
    let slice = buffer.slice(..);

    let status = Arc::new(AtomicU8::new(0));
    let cb = status.clone();
    slice.map_async(MapMode::Read, move |r| {
        cb.store(if r.is_ok() { 1 } else { 2 }, Ordering::SeqCst)
    });
    loop {
        render_device.poll(Maintain::Poll);
        match status.load(Ordering::SeqCst) {
            0 => std::thread::yield_now(),
            1 => break,
            _ => return None,
        }
    }
    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Some(data)
}

#[allow(clippy::too_many_arguments)]
fn drive_parity(
    mut params: ResMut<SimParams>,
    mut allow_copy: ResMut<AllowCopy>,
    seed: Res<SpawnSeed>,
    readback: Option<Res<ReadbackBuffers>>,
    render_device: Res<RenderDevice>,
    mut exit: EventWriter<AppExit>,
    mut frame: Local<u32>,
    mut state: Local<u8>,
    mut oracle: Local<Option<FluidState>>,
) {
    let Some(readback) = readback else { return };
    *frame += 1;

    match *state {
        // warm up paused so the compute pipelines finish compiling
        0 => {
            if *frame >= WARMUP_FRAMES {
                let mut cpu = FluidState::new(&params, seed.0);
                let unpaused = SimParams {
                    paused: false,
                    ..*params
                };
                let cursor = CursorState::default();
                for _ in 0..STEPS {
                    cpu.step(&unpaused, &cursor);
                }
                *oracle = Some(cpu);

                params.paused = false;
                *frame = 0;
                *state = 1;
            }
        }
        // frame N renders GPU step N; copy out right after the last one
        1 => {
            if *frame == STEPS {
                allow_copy.0 = true;
                *state = 2;
            }
        }
        2 => {
            params.paused = true;
            allow_copy.0 = false;
            *state = 3;
        }
        3 => {
            let Some(cpu) = oracle.as_ref() else { return };
            let (Some(pos_bytes), Some(rho_bytes)) = (
                map_and_read(&render_device, &readback.position),
                map_and_read(&render_device, &readback.density),
            ) else {
                error!("readback map failed");
                exit.write(AppExit::error());
                return;
            };

            let gpu_pos: &[[f32; 4]] = bytemuck::cast_slice(&pos_bytes);
            let gpu_rho: &[f32] = bytemuck::cast_slice(&rho_bytes);
            assert_eq!(gpu_pos.len(), cpu.num_particles());
            assert_eq!(gpu_rho.len(), cpu.num_particles());

            let mut max_abs_pos: f32 = 0.0;
            let mut max_rel_rho: f32 = 0.0;
            for i in 0..cpu.num_particles() {
                let dp = glam::Vec3::from_slice(&gpu_pos[i][..3]) - cpu.positions[i];
                max_abs_pos = max_abs_pos.max(dp.abs().max_element());
                max_rel_rho = max_rel_rho.max(rel_err(cpu.densities[i], gpu_rho[i]));
            }

            info!(
                "{STEPS}-step parity (GPU vs CPU): pos max_abs = {max_abs_pos:.6}  |  rho max_rel = {:.3}%",
                max_rel_rho * 100.0
            );
            assert!(
                max_abs_pos <= MAX_ABS_POS,
                "FAIL: position max_abs {max_abs_pos:.6} > {MAX_ABS_POS:.6}"
            );
            assert!(
                max_rel_rho <= MAX_REL_RHO,
                "FAIL: density max_rel {max_rel_rho:.4} > {MAX_REL_RHO:.4}"
            );
            exit.write(AppExit::Success);
        }
        _ => {}
    }
}
