//! hello_triangle: opens a window and draws a single colored triangle with
//! Vulkan.
//!
//! Usage: `hello_triangle [CONFIG]`. Without an argument `hello_triangle.toml`
//! is read from the working directory if it exists.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use triangle_core::AppConfig;
use triangle_core::config::DEFAULT_CONFIG_FILE;
use triangle_platform::Window;
use triangle_renderer::Renderer;

struct App {
    config: AppConfig,
    // Declared before `window` so the renderer (and its surface) is dropped first.
    renderer: Option<Renderer>,
    window: Option<Window>,
    /// First fatal error; returned from `main` after the loop exits.
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let renderer = Renderer::new(&window, &self.config.renderer)?;

        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.error.get_or_insert(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Escape pressed, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.renderer
                    && let Err(e) = renderer.draw_frame()
                {
                    let e = anyhow::Error::new(e).context("Failed to draw frame");
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window
            && !window.is_minimized()
        {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref renderer) = self.renderer
            && let Err(e) = renderer.wait_idle()
        {
            error!("Failed to wait for device idle on exit: {:?}", e);
        }
    }
}

/// Config file to read: the first argument, or the default file name.
///
/// The flag is true when the path was given explicitly, in which case a
/// missing file is an error.
fn config_path(mut args: impl Iterator<Item = String>) -> (PathBuf, bool) {
    match args.nth(1) {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

fn main() -> Result<()> {
    triangle_core::init_logging();
    info!("Starting hello_triangle");

    let (path, explicit) = config_path(std::env::args());
    let config = if explicit {
        AppConfig::load(&path)
    } else {
        AppConfig::load_or_default(&path)
    }
    .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    debug!("Effective configuration:\n{}", config.to_toml_string()?);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Tear down GPU resources before the window goes away.
    drop(app.renderer.take());

    match app.error.take() {
        Some(e) => Err(e),
        None => {
            info!("Exited cleanly");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_config_path_defaults_without_argument() {
        let (path, explicit) = config_path(args(&["hello_triangle"]));
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(!explicit);
    }

    #[test]
    fn test_config_path_uses_first_argument() {
        let (path, explicit) = config_path(args(&["hello_triangle", "custom.toml", "extra"]));
        assert_eq!(path, PathBuf::from("custom.toml"));
        assert!(explicit);
    }
}
