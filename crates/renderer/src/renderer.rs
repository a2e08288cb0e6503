//! Main renderer orchestration.
//!
//! [`Renderer`] builds the whole Vulkan chain for a window and draws the
//! triangle once per call to [`Renderer::draw_frame`].

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ash::vk;
use tracing::{debug, error, info};

use triangle_core::{FrameCounter, PresentModePreference, RendererConfig};
use triangle_platform::{Surface, Window};
use triangle_rhi::buffer::{Buffer, upload_vertex_buffer};
use triangle_rhi::command::{CommandBuffer, CommandPool};
use triangle_rhi::device::Device;
use triangle_rhi::framebuffer::Framebuffer;
use triangle_rhi::instance::Instance;
use triangle_rhi::physical_device::select_physical_device;
use triangle_rhi::pipeline::{
    ColorBlendAttachment, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use triangle_rhi::render_pass::RenderPass;
use triangle_rhi::shader::{Shader, ShaderStage};
use triangle_rhi::swapchain::Swapchain;
use triangle_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use triangle_rhi::vertex::{TRIANGLE_VERTICES, Vertex};
use triangle_rhi::{RhiError, RhiResult};

use crate::frame_manager::FrameManager;

/// How often the frame rate is logged.
const FPS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Maps the configured present mode to its Vulkan value.
pub fn present_mode_from_preference(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
    }
}

/// Records the triangle into `cmd` for one framebuffer.
///
/// The render pass clears to `clear_color`, then one instance of the vertex
/// buffer is drawn with `pipeline`.
pub fn record_triangle(
    cmd: &CommandBuffer,
    render_pass: &RenderPass,
    framebuffer: &Framebuffer,
    pipeline: &Pipeline,
    vertex_buffer: &Buffer,
    vertex_count: u32,
    clear_color: [f32; 4],
) {
    cmd.begin_render_pass(
        render_pass.handle(),
        framebuffer.handle(),
        framebuffer.extent(),
        clear_color,
    );
    cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
    cmd.bind_vertex_buffers(0, &[vertex_buffer.handle()], &[0]);
    cmd.draw(vertex_count, 1, 0, 0);
    cmd.end_render_pass();
}

/// Window size as last reported and whether the swapchain is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    width: u32,
    height: u32,
    stale: bool,
}

impl SurfaceSize {
    /// Size of a freshly created swapchain.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stale: false,
        }
    }

    /// Records a new window size. Returns `false` if nothing changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == self.width && height == self.height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.stale = true;
        true
    }

    /// True while the window has no drawable area.
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True until a swapchain matching the current size exists.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Flags the swapchain for rebuilding, e.g. after out-of-date.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Records a successful rebuild.
    pub fn mark_fresh(&mut self) {
        self.stale = false;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Owns every Vulkan object needed to draw the triangle.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Frame resources, vertex buffer, command pool
/// 3. Framebuffers, pipeline, pipeline layout, render pass
/// 4. Swapchain
/// 5. Device (last `Arc` reference)
/// 6. Surface
/// 7. Instance (debug messenger first)
///
/// ManuallyDrop is used to enforce this order.
pub struct Renderer {
    // Core Vulkan resources
    /// Vulkan instance (destroyed last).
    instance: ManuallyDrop<Instance>,
    /// Window surface (destroyed after the device).
    surface: ManuallyDrop<Surface>,
    /// Logical device. Every other resource holds a clone.
    device: ManuallyDrop<Arc<Device>>,
    /// Swapchain and its image views.
    swapchain: ManuallyDrop<Swapchain>,

    // Pipeline resources
    /// Single-subpass render pass targeting the swapchain format.
    render_pass: ManuallyDrop<RenderPass>,
    /// Empty pipeline layout.
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    /// Triangle pipeline; viewport baked to the swapchain extent.
    pipeline: ManuallyDrop<Pipeline>,
    /// One framebuffer per swapchain image.
    framebuffers: Vec<Framebuffer>,

    // Per-frame resources
    /// Pool for the per-frame command buffers.
    command_pool: ManuallyDrop<CommandPool>,
    /// Frames in flight and per-image semaphores.
    frame_manager: ManuallyDrop<FrameManager>,
    /// Device-local triangle vertices.
    vertex_buffer: ManuallyDrop<Buffer>,

    // State
    /// Shader paths and clear color.
    config: RendererConfig,
    /// Window size and pending swapchain rebuild.
    size: SurfaceSize,
    /// Frame rate reporting.
    frame_counter: FrameCounter,
}

impl Renderer {
    /// Creates the full Vulkan chain for `window`.
    ///
    /// Order: instance (with validation if enabled), surface, physical
    /// device, logical device, swapchain, render pass, pipeline,
    /// framebuffers, command pool, frame resources, vertex buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; the message names the step.
    pub fn new(window: &Window, config: &RendererConfig) -> anyhow::Result<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let window_extensions = window
            .required_extensions()
            .context("Failed to query window system extensions")?;

        let instance = Instance::new(&window_extensions, config.validation_enabled())
            .context("Failed to create Vulkan instance")?;
        if instance.has_validation() {
            info!("Validation layers enabled");
        }

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .context("Failed to create window surface")?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())
                .context("Failed to select a physical device")?;
        info!("Using {:?}", physical_device_info);

        let device = Device::new(&instance, &physical_device_info)
            .context("Failed to create logical device")?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            width,
            height,
            present_mode_from_preference(config.present_mode),
        )
        .context("Failed to create swapchain")?;

        let render_pass = RenderPass::new_present_pass(device.clone(), swapchain.format())
            .context("Failed to create render pass")?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[], &[])
            .context("Failed to create pipeline layout")?;

        let pipeline = Self::create_pipeline(
            &device,
            config,
            &pipeline_layout,
            &render_pass,
            swapchain.extent(),
        )
        .context("Failed to create graphics pipeline")?;

        let framebuffers = Framebuffer::for_swapchain(
            &device,
            render_pass.handle(),
            swapchain.image_views(),
            swapchain.extent(),
        )
        .context("Failed to create framebuffers")?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family())
            .context("Failed to create command pool")?;

        let frame_manager = FrameManager::new(device.clone(), &command_pool, swapchain.image_count())
            .context("Failed to create frame resources")?;

        let vertex_buffer = upload_vertex_buffer(device.clone(), &TRIANGLE_VERTICES)
            .context("Failed to create vertex buffer")?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            framebuffers,
            command_pool: ManuallyDrop::new(command_pool),
            frame_manager: ManuallyDrop::new(frame_manager),
            vertex_buffer: ManuallyDrop::new(vertex_buffer),
            config: config.clone(),
            size: SurfaceSize::new(width, height),
            frame_counter: FrameCounter::new(FPS_LOG_INTERVAL),
        })
    }

    /// Loads both shaders and builds the triangle pipeline for `extent`.
    ///
    /// The shader modules are only needed while the pipeline is created.
    fn create_pipeline(
        device: &Arc<Device>,
        config: &RendererConfig,
        layout: &PipelineLayout,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.vertex_shader,
            ShaderStage::Vertex,
            "main",
        )?;

        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.fragment_shader,
            ShaderStage::Fragment,
            "main",
        )?;

        GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .viewport_extent(extent)
            .cull_mode(CullMode::None)
            .front_face(FrontFace::CounterClockwise)
            .color_blend_attachment(ColorBlendAttachment::alpha_blend())
            .render_pass(render_pass.handle(), 0)
            .build(device.clone(), layout)
    }

    /// Notifies the renderer that the window has been resized.
    ///
    /// The swapchain is rebuilt on the next frame. A zero-sized window is
    /// minimized and nothing is drawn until it has an area again.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (old_width, old_height) = (self.size.width(), self.size.height());
        if self.size.resize(width, height) {
            debug!(
                "Resize triggered: {}x{} -> {}x{}",
                old_width, old_height, width, height
            );
        }
    }

    /// True while the window has no drawable area.
    pub fn is_minimized(&self) -> bool {
        self.size.is_minimized()
    }

    /// Rebuilds everything that depends on the swapchain.
    ///
    /// Postponed while the window or the surface has no area; the rebuild
    /// stays pending and is retried on the next frame.
    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        self.size.mark_stale();

        if self.size.is_minimized() {
            debug!("Window minimized, postponing swapchain recreation");
            return Ok(());
        }

        self.device.wait_idle()?;

        let (width, height) = (self.size.width(), self.size.height());
        if self
            .swapchain
            .surface_extent(&self.instance, self.surface.handle(), width, height)?
            .is_none()
        {
            debug!("Surface has zero area, postponing swapchain recreation");
            return Ok(());
        }

        // Framebuffers reference the image views the swapchain is about to destroy.
        self.framebuffers.clear();

        let old_format = self.swapchain.format();
        self.swapchain
            .recreate(&self.instance, self.surface.handle(), width, height)?;

        if self.swapchain.format() != old_format {
            info!(
                "Swapchain format changed {:?} -> {:?}, rebuilding render pass",
                old_format,
                self.swapchain.format()
            );
            let render_pass =
                RenderPass::new_present_pass((*self.device).clone(), self.swapchain.format())?;
            unsafe { ManuallyDrop::drop(&mut self.render_pass) };
            self.render_pass = ManuallyDrop::new(render_pass);
        }

        let pipeline = Self::create_pipeline(
            &self.device,
            &self.config,
            &self.pipeline_layout,
            &self.render_pass,
            self.swapchain.extent(),
        )?;
        unsafe { ManuallyDrop::drop(&mut self.pipeline) };
        self.pipeline = ManuallyDrop::new(pipeline);

        self.framebuffers = Framebuffer::for_swapchain(
            &self.device,
            self.render_pass.handle(),
            self.swapchain.image_views(),
            self.swapchain.extent(),
        )?;

        self.frame_manager
            .resize_images(self.swapchain.image_count())?;

        self.size.mark_fresh();

        info!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    /// Draws one frame.
    ///
    /// Returns without drawing while minimized or while a postponed
    /// swapchain rebuild still cannot run, and after rebuilding the
    /// swapchain when acquisition reports it out of date.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan operation fails.
    pub fn draw_frame(&mut self) -> RhiResult<()> {
        if self.size.is_minimized() {
            return Ok(());
        }

        if self.size.is_stale() {
            self.recreate_swapchain()?;
            if self.size.is_stale() {
                return Ok(());
            }
        }

        self.frame_manager.wait_for_frame()?;

        let Some(image_index) = self.frame_manager.acquire_next_image(&self.swapchain)? else {
            return self.recreate_swapchain();
        };

        let framebuffer = self.framebuffers.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No framebuffer for swapchain image {}", image_index))
        })?;

        let cmd = self.frame_manager.begin_frame()?;
        record_triangle(
            cmd,
            &self.render_pass,
            framebuffer,
            &self.pipeline,
            &self.vertex_buffer,
            TRIANGLE_VERTICES.len() as u32,
            self.config.clear_color,
        );
        self.frame_manager.end_frame()?;
        self.frame_manager.submit()?;

        let suboptimal = self.frame_manager.present(&self.swapchain)?;

        self.frame_manager.next_frame();

        if suboptimal || self.size.is_stale() {
            self.recreate_swapchain()?;
        }

        if let Some(fps) = self.frame_counter.frame() {
            info!(
                "{:.1} fps ({} frames total)",
                fps,
                self.frame_counter.total_frames()
            );
        }

        Ok(())
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    /// Returns the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns the swapchain format.
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        self.framebuffers.clear();

        unsafe {
            ManuallyDrop::drop(&mut self.frame_manager);
            ManuallyDrop::drop(&mut self.vertex_buffer);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!(
            "Renderer destroyed after {} frames",
            self.frame_counter.total_frames()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_mode_from_preference() {
        assert_eq!(
            present_mode_from_preference(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            present_mode_from_preference(PresentModePreference::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            present_mode_from_preference(PresentModePreference::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_zero_resize_minimizes() {
        let mut size = SurfaceSize::new(800, 600);
        assert!(!size.is_minimized());

        assert!(size.resize(0, 0));
        assert!(size.is_minimized());
        assert!(size.is_stale());

        let mut size = SurfaceSize::new(800, 600);
        size.resize(800, 0);
        assert!(size.is_minimized());
    }

    #[test]
    fn test_restore_requests_rebuild() {
        let mut size = SurfaceSize::new(800, 600);
        size.resize(0, 0);
        size.mark_fresh();

        assert!(size.resize(1024, 768));
        assert!(!size.is_minimized());
        assert!(size.is_stale());
        assert_eq!((size.width(), size.height()), (1024, 768));
    }

    #[test]
    fn test_same_size_resize_is_noop() {
        let mut size = SurfaceSize::new(800, 600);
        assert!(!size.resize(800, 600));
        assert!(!size.is_stale());
    }

    #[test]
    fn test_postponed_rebuild_stays_pending() {
        let mut size = SurfaceSize::new(800, 600);
        // Out of date while the surface already reports zero area.
        size.mark_stale();
        assert!(size.is_stale());
        assert!(!size.is_minimized());

        // Nothing rebuilt yet; a later resize keeps the flag.
        size.resize(800, 600);
        assert!(size.is_stale());

        size.mark_fresh();
        assert!(!size.is_stale());
    }

    #[test]
    fn test_default_config_prefers_mailbox() {
        let config = RendererConfig::default();
        assert_eq!(
            present_mode_from_preference(config.present_mode),
            vk::PresentModeKHR::MAILBOX
        );
    }
}
