//! Core utilities shared by the hello_triangle crates.
//!
//! - Error type and result alias
//! - Logging initialization
//! - Frame timer
//! - TOML configuration

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{AppConfig, PresentModePreference, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameCounter, Timer};
