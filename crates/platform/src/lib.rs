//! Platform layer: winit window wrapper and keyboard state.
//!
//! The engine consumes two things from the windowing system: resize events and
//! a key-state map. Both are provided here.

mod input;
mod window;

pub use input::{InputState, KeyCode, KeyEvent};
pub use window::Window;

pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
