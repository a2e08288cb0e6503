//! Platform layer for hello_triangle.
//!
//! - Window creation via winit
//! - Vulkan surface creation via ash-window
//! - Instance extensions the windowing system requires

mod window;

pub use window::{Surface, Window, required_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
