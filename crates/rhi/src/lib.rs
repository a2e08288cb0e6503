//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over the `ash` objects needed to put a triangle on
//! screen:
//! - Instance, validation layers and the debug messenger
//! - Physical device selection and logical device creation
//! - Swapchain, render pass and framebuffers
//! - Shaders and the graphics pipeline
//! - Command pools and buffers
//! - Synchronization primitives
//! - Vertex data and GPU buffers

mod error;

pub mod buffer;
pub mod command;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
