// Interactive fluid-in-a-box demo.
//
//   space        pause / resume
//   R / T        rotate the box around its vertical axis
//   arrow keys   resize the box (width / height)
//   left mouse   attract particles toward the cursor
//   right mouse  repel particles from the cursor

use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_sph_compute::gpu::buffers::SphComputePlugin;
use bevy_sph_compute::gpu::draw::SphDrawPlugin;
use bevy_sph_compute::sim::params::{CursorForce, CursorState, SimParams};
use glam::Vec2;

const ROTATE_STEP: f32 = 0.02;
const RESIZE_STEP: f32 = 0.002;
// matches the margin the draw projection adds around the box
const VIEW_MARGIN: f32 = 0.05;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(SphComputePlugin)
        .add_plugins(SphDrawPlugin)
        .insert_resource(BoxAngle(0.0))
        .add_systems(Startup, setup)
        .add_systems(Update, (keyboard_controls, cursor_controls))
        .run();
}

#[derive(Resource)]
struct BoxAngle(f32);

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d);
}

fn keyboard_controls(
    keys: Res<ButtonInput<KeyCode>>,
    mut params: ResMut<SimParams>,
    mut angle: ResMut<BoxAngle>,
) {
    if keys.just_pressed(KeyCode::Space) {
        params.paused = !params.paused;
        info!("{}", if params.paused { "paused" } else { "running" });
    }
    if keys.pressed(KeyCode::KeyR) {
        angle.0 += ROTATE_STEP;
        params.set_box_rotation(angle.0);
    }
    if keys.pressed(KeyCode::KeyT) {
        angle.0 -= ROTATE_STEP;
        params.set_box_rotation(angle.0);
    }
    if keys.pressed(KeyCode::ArrowRight) {
        params.resize_bounds(0, RESIZE_STEP);
    }
    if keys.pressed(KeyCode::ArrowLeft) {
        params.resize_bounds(0, -RESIZE_STEP);
    }
    if keys.pressed(KeyCode::ArrowUp) {
        params.resize_bounds(1, RESIZE_STEP);
    }
    if keys.pressed(KeyCode::ArrowDown) {
        params.resize_bounds(1, -RESIZE_STEP);
    }
}

/// Maps the window cursor through the draw projection into simulation
/// coordinates and drives the interactive force.
fn cursor_controls(
    window: Single<&Window, With<PrimaryWindow>>,
    buttons: Res<ButtonInput<MouseButton>>,
    params: Res<SimParams>,
    mut cursor: ResMut<CursorState>,
) {
    cursor.mode = if buttons.pressed(MouseButton::Left) {
        CursorForce::Attract
    } else if buttons.pressed(MouseButton::Right) {
        CursorForce::Repel
    } else {
        CursorForce::Inactive
    };
    if cursor.mode == CursorForce::Inactive {
        return;
    }

    let Some(screen) = window.cursor_position() else {
        cursor.mode = CursorForce::Inactive;
        return;
    };
    let size = Vec2::new(window.width(), window.height());
    let lo = Vec2::new(
        params.bounds_min.x - VIEW_MARGIN,
        params.bounds_min.y - VIEW_MARGIN,
    );
    let hi = Vec2::new(
        params.bounds_max.x + VIEW_MARGIN,
        params.bounds_max.y + VIEW_MARGIN,
    );
    let t = Vec2::new(screen.x / size.x, 1.0 - screen.y / size.y);
    cursor.position = lo + t * (hi - lo);
}
