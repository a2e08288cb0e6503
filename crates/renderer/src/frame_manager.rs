//! Frames-in-flight bookkeeping.
//!
//! [`FrameManager`] owns the per-frame command buffers, image-available
//! semaphores and in-flight fences, plus one render-finished semaphore per
//! swapchain image. A render-finished semaphore is waited on by presentation,
//! so it can only be signaled again once its image is reacquired; keying it
//! by image index guarantees that.
//!
//! # Frame Flow
//!
//! ```text
//! 1. wait_for_frame        CPU waits on the slot's in-flight fence
//! 2. acquire_next_image    signals the slot's image-available semaphore
//! 3. begin_frame           waits on the fence of the slot that last used
//!                          the image, resets the slot fence, begins recording
//! 4. end_frame / submit    waits image-available, signals render-finished[image]
//!                          and the slot fence
//! 5. present               waits render-finished[image]
//! 6. next_frame
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use triangle_rhi::{RhiError, RhiResult};
use triangle_rhi::command::{CommandBuffer, CommandPool};
use triangle_rhi::device::Device;
use triangle_rhi::swapchain::Swapchain;
use triangle_rhi::sync::{Fence, MAX_FRAMES_IN_FLIGHT, Semaphore};

/// Resources owned by one frame slot.
struct FrameData {
    /// Command buffer re-recorded every time the slot is used.
    command_buffer: CommandBuffer,
    /// Signaled when the acquired swapchain image is ready.
    image_available_semaphore: Semaphore,
    /// Signaled when the slot's submission completes. Created signaled.
    in_flight_fence: Fence,
}

impl FrameData {
    fn new(device: Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), command_pool)?;
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            image_available_semaphore,
            in_flight_fence,
        })
    }
}

/// Records which frame slot last rendered into each swapchain image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagesInFlight {
    owners: Vec<Option<usize>>,
}

impl ImagesInFlight {
    /// Tracker for `image_count` images, none in flight.
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Number of tracked images.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// True if no images are tracked.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Marks `image` as used by `frame`.
    ///
    /// Returns the slot whose fence must be waited on first: the previous
    /// user of the image, if it was a different slot. The caller already
    /// waited on its own slot's fence.
    pub fn claim(&mut self, image: usize, frame: usize) -> Option<usize> {
        let previous = self.owners.get_mut(image)?.replace(frame);
        previous.filter(|&owner| owner != frame)
    }
}

/// Current frame slot and the swapchain image acquired for it.
///
/// An image is only held between a successful acquire and
/// [`advance`](Self::advance). Recording, which resets the slot fence, needs
/// one, so an acquire that reported out of date leaves the fence signaled
/// for the next wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCursor {
    frame: usize,
    image: Option<u32>,
}

impl FrameCursor {
    /// Slot 0, no image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame slot, below [`MAX_FRAMES_IN_FLIGHT`].
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Image acquired for the current slot, if any.
    pub fn image(&self) -> Option<u32> {
        self.image
    }

    /// Records a successful acquire.
    pub fn acquired(&mut self, image: u32) {
        self.image = Some(image);
    }

    /// Records an acquire that returned no image.
    pub fn lost(&mut self) {
        self.image = None;
    }

    /// Moves to the next slot, wrapping at [`MAX_FRAMES_IN_FLIGHT`].
    pub fn advance(&mut self) {
        self.frame = (self.frame + 1) % MAX_FRAMES_IN_FLIGHT;
        self.image = None;
    }
}

/// Manages per-frame resources and the frame rendering loop.
///
/// # Thread Safety
///
/// Not thread-safe; lives on the render thread.
pub struct FrameManager {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Per-frame resources, [`MAX_FRAMES_IN_FLIGHT`] of them.
    frames: Vec<FrameData>,
    /// One render-finished semaphore per swapchain image.
    render_finished_semaphores: Vec<Semaphore>,
    /// Last frame slot that used each swapchain image.
    images_in_flight: ImagesInFlight,
    /// Slot rotation and acquired image.
    cursor: FrameCursor,
}

impl FrameManager {
    /// Creates the frame slots and the per-image semaphores.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(
        device: Arc<Device>,
        command_pool: &CommandPool,
        swapchain_image_count: usize,
    ) -> RhiResult<Self> {
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for i in 0..MAX_FRAMES_IN_FLIGHT {
            frames.push(FrameData::new(device.clone(), command_pool)?);
            debug!("Created frame data for frame {}", i);
        }

        let render_finished_semaphores = Semaphore::many(&device, swapchain_image_count)?;

        info!(
            "Frame manager created: {} frames in flight, {} swapchain images",
            MAX_FRAMES_IN_FLIGHT, swapchain_image_count
        );

        Ok(Self {
            device,
            frames,
            render_finished_semaphores,
            images_in_flight: ImagesInFlight::new(swapchain_image_count),
            cursor: FrameCursor::new(),
        })
    }

    fn current_frame(&self) -> &FrameData {
        &self.frames[self.cursor.frame()]
    }

    /// Image acquired for the current slot; recording and presentation
    /// are only valid while one is held.
    fn acquired_image(&self) -> RhiResult<u32> {
        self.cursor.image().ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "No swapchain image acquired for frame {}",
                self.cursor.frame()
            ))
        })
    }

    /// Blocks until the current slot's previous submission has finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_for_frame(&self) -> RhiResult<()> {
        self.current_frame().in_flight_fence.wait(u64::MAX)
    }

    /// Acquires the next swapchain image, signaling the slot's
    /// image-available semaphore.
    ///
    /// Returns `None` when the swapchain is out of date; nothing was
    /// acquired and the swapchain must be recreated. A suboptimal image is
    /// still returned and rendered; presentation reports it again.
    ///
    /// # Errors
    ///
    /// Returns an error for any other acquisition failure.
    pub fn acquire_next_image(&mut self, swapchain: &Swapchain) -> RhiResult<Option<u32>> {
        let semaphore = self.current_frame().image_available_semaphore.handle();

        match swapchain.acquire_next_image(semaphore) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                self.cursor.acquired(index);
                Ok(Some(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                self.cursor.lost();
                Ok(None)
            }
            Err(e) => {
                self.cursor.lost();
                Err(e.into())
            }
        }
    }

    /// Prepares the current slot for recording into the acquired image.
    ///
    /// Waits for any other slot still rendering to the same image, resets
    /// the slot fence, and resets and begins the command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if no image is acquired, or if a wait, reset or
    /// begin fails. Without an image the slot fence is left untouched.
    pub fn begin_frame(&mut self) -> RhiResult<&CommandBuffer> {
        let image = self.acquired_image()?;
        let slot = self.cursor.frame();

        if let Some(owner) = self.images_in_flight.claim(image as usize, slot) {
            debug!("Image {} still in use by frame {}, waiting", image, owner);
            self.frames[owner].in_flight_fence.wait(u64::MAX)?;
        }

        let frame = &self.frames[slot];
        frame.in_flight_fence.reset()?;
        frame.command_buffer.reset()?;
        frame.command_buffer.begin()?;
        Ok(&frame.command_buffer)
    }

    /// Ends recording for the current slot.
    ///
    /// # Errors
    ///
    /// Returns an error if ending the command buffer fails.
    pub fn end_frame(&self) -> RhiResult<()> {
        self.current_frame().command_buffer.end()
    }

    /// Submits the current slot's command buffer to the graphics queue.
    ///
    /// Color output waits on the image-available semaphore; completion
    /// signals the image's render-finished semaphore and the slot fence.
    ///
    /// # Errors
    ///
    /// Returns an error if queue submission fails.
    pub fn submit(&self) -> RhiResult<()> {
        let frame = self.current_frame();

        let wait_semaphores = [frame.image_available_semaphore.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished_semaphore()?.handle()];
        let command_buffers = [frame.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.in_flight_fence.handle())?;
        }

        Ok(())
    }

    /// Presents the acquired image once its render-finished semaphore fires.
    ///
    /// Returns `true` if the swapchain is suboptimal or out of date and
    /// should be recreated.
    ///
    /// # Errors
    ///
    /// Returns an error for any other presentation failure.
    pub fn present(&self, swapchain: &Swapchain) -> RhiResult<bool> {
        match swapchain.present(
            self.device.present_queue(),
            self.acquired_image()?,
            self.render_finished_semaphore()?.handle(),
        ) {
            Ok(suboptimal) => {
                if suboptimal {
                    debug!("Swapchain suboptimal during present");
                }
                Ok(suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advances to the next frame slot.
    pub fn next_frame(&mut self) {
        self.cursor.advance();
    }

    /// Rebuilds the per-image state for a recreated swapchain.
    ///
    /// The device must be idle.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn resize_images(&mut self, swapchain_image_count: usize) -> RhiResult<()> {
        self.render_finished_semaphores = Semaphore::many(&self.device, swapchain_image_count)?;
        self.images_in_flight = ImagesInFlight::new(swapchain_image_count);

        debug!(
            "Recreated {} render-finished semaphores",
            swapchain_image_count
        );
        Ok(())
    }

    /// Number of per-image semaphores currently held.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.render_finished_semaphores.len()
    }

    fn render_finished_semaphore(&self) -> RhiResult<&Semaphore> {
        let image = self.acquired_image()?;
        self.render_finished_semaphores
            .get(image as usize)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("No render-finished semaphore for image {}", image))
            })
    }
}
