//! Key state and local-player steering.
//!
//! Steering is pure over a [`KeyState`] snapshot so it can be driven by
//! the macroquad window, by an external UI bridge, or by tests. Up/down
//! translate along the heading, left/right turn; the returned change flag
//! feeds the session's idle gate.

use crate::entity::Entity;
use macroquad::prelude::*;

/// Movement keys sampled for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Wraps an angle into [0, 2π).
pub fn wrap_angle(angle: f32) -> f32 {
    angle.rem_euclid(std::f32::consts::TAU)
}

/// Integrates one movement tick into the local player. Returns true when
/// position or heading actually changed, which is the only case worth a
/// `move-player` intent.
pub fn steer(player: &mut Entity, keys: KeyState, dt_ms: f32) -> bool {
    let tunables = match player.player.clone() {
        Some(tunables) => tunables,
        None => return false,
    };

    let previous = (player.x, player.y, player.heading);
    let heading = player.heading.unwrap_or(0.0);

    // Up takes priority over down
    if keys.up {
        player.x -= tunables.move_amount * heading.cos() * dt_ms;
        player.y -= tunables.move_amount * heading.sin() * dt_ms;
    } else if keys.down {
        player.x += tunables.move_amount * heading.cos() * dt_ms;
        player.y += tunables.move_amount * heading.sin() * dt_ms;
    }

    // Left takes priority over right
    let mut next_heading = heading;
    if keys.left {
        next_heading -= tunables.turn_amount * dt_ms;
    } else if keys.right {
        next_heading += tunables.turn_amount * dt_ms;
    }
    player.heading = Some(wrap_angle(next_heading));

    previous != (player.x, player.y, player.heading)
}

/// Samples the window's input devices and tracks the selected action.
pub struct InputManager {
    keys: KeyState,
    selected_action: u32,

    // Previous frame key states for edge detection
    prev_key_w: bool,
    prev_key_s: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            keys: KeyState::default(),
            selected_action: 0,
            prev_key_w: false,
            prev_key_s: false,
        }
    }

    pub fn keys(&self) -> KeyState {
        self.keys
    }

    pub fn selected_action(&self) -> u32 {
        self.selected_action
    }

    /// Feeds key state from an external collaborator (UI bridge, tests)
    /// instead of the window.
    pub fn set_key_state(&mut self, keys: KeyState) {
        self.keys = keys;
    }

    /// Polls the macroquad window. Returns the screen position of a fresh
    /// primary click, if any.
    pub fn sample(&mut self) -> Option<(f32, f32)> {
        self.keys = KeyState {
            up: is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::Right),
        };

        let key_w = is_key_down(KeyCode::W);
        let key_s = is_key_down(KeyCode::S);
        if key_w && !self.prev_key_w {
            self.selected_action = 1;
        }
        if key_s && !self.prev_key_s {
            self.selected_action = 0;
        }
        self.prev_key_w = key_w;
        self.prev_key_s = key_s;

        if is_mouse_button_pressed(MouseButton::Left) {
            Some(mouse_position())
        } else {
            None
        }
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
