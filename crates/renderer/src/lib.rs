//! Frame loop and Vulkan resource chain for hello_triangle.
//!
//! - [`Renderer`] creates and owns every Vulkan object
//! - [`FrameManager`] handles frames in flight and per-image synchronization

pub mod frame_manager;
mod renderer;

pub use frame_manager::{FrameCursor, FrameManager, ImagesInFlight};
pub use renderer::{Renderer, SurfaceSize, present_mode_from_preference, record_triangle};
pub use triangle_rhi::sync::MAX_FRAMES_IN_FLIGHT;
