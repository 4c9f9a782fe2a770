//! Keyboard camera control.

use renderer_platform::{InputState, KeyCode};

use crate::camera::CameraView;

/// First-person controller: W/S move along Z, A/D strafe, Q/E turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsController {
    /// Units per second.
    pub speed: f32,
    /// Radians per second.
    pub turn_speed: f32,
}

impl Default for FpsController {
    fn default() -> Self {
        Self {
            speed: 5.0,
            turn_speed: 1.5,
        }
    }
}

impl FpsController {
    pub fn new(speed: f32, turn_speed: f32) -> Self {
        Self { speed, turn_speed }
    }

    /// Apply every held key for `dt` seconds. Returns whether the view moved.
    pub fn apply(&self, input: &InputState, dt: f32, view: &mut CameraView) -> bool {
        let step = dt * self.speed;
        let turn = dt * self.turn_speed;
        let mut moved = false;

        for key in input.pressed() {
            // Offsets are applied to the view matrix, so they move the world.
            match key {
                KeyCode::KeyW => view.translate_view(glam::Vec3::new(0.0, 0.0, step)),
                KeyCode::KeyS => view.translate_view(glam::Vec3::new(0.0, 0.0, -step)),
                KeyCode::KeyA => view.translate_view(glam::Vec3::new(step, 0.0, 0.0)),
                KeyCode::KeyD => view.translate_view(glam::Vec3::new(-step, 0.0, 0.0)),
                KeyCode::KeyQ => view.rotate_view_y(-turn),
                KeyCode::KeyE => view.rotate_view_y(turn),
                _ => continue,
            }
            moved = true;
        }
        moved
    }
}
