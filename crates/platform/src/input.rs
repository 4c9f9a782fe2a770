//! Keyboard state tracking.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// A single key transition, forwarded from the event loop to the update thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn pressed(key: KeyCode) -> Self {
        Self { key, pressed: true }
    }

    pub fn released(key: KeyCode) -> Self {
        Self {
            key,
            pressed: false,
        }
    }

    /// Convert a winit keyboard event. Returns `None` for keys without a physical code.
    pub fn from_winit(event: &winit::event::KeyEvent) -> Option<Self> {
        match event.physical_key {
            winit::keyboard::PhysicalKey::Code(key) => Some(Self {
                key,
                pressed: event.state.is_pressed(),
            }),
            winit::keyboard::PhysicalKey::Unidentified(_) => None,
        }
    }
}

/// Key-state map: which keys are currently held.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that went down since the last `begin_frame`
    just_pressed_keys: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-tick state. Call once per update tick.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    pub fn apply(&mut self, event: KeyEvent) {
        if event.pressed {
            self.on_key_pressed(event.key);
        } else {
            self.on_key_released(event.key);
        }
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// Iterate the keys currently held.
    pub fn pressed(&self) -> impl Iterator<Item = KeyCode> + '_ {
        self.pressed_keys.iter().copied()
    }
}
