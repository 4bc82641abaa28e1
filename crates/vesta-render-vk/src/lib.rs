// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: one window surface, one graphics pipeline, one frame in
//! flight.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;
use tracing::{debug, info};
use vesta_core::SetupArena;
use vesta_render::{
    run_frame, Acquired, FrameBackend, FrameStatus, Presented, RenderSize, Renderer,
    RendererConfig, TargetState,
};

pub mod device;
pub mod error;
pub mod frame;
pub mod messenger;
pub mod pipeline;
pub mod swapchain;

pub use device::{DeviceContext, InstanceConfig, QueueFamilyPair};
pub use error::{QueueRole, RenderError, RenderResult, Requirement};
pub use frame::FrameSync;
pub use pipeline::PipelineState;
pub use swapchain::{SurfaceInfo, SwapchainState};

use error::VkCheck;

fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

pub struct VkRenderer {
    ctx: DeviceContext,
    chain: SwapchainState,
    pipeline: PipelineState,
    sync: FrameSync,

    target: TargetState,
    present_pref: vk::PresentModeKHR,
    shader_dir: PathBuf,
    clear: vk::ClearValue,

    // Dropped last: setup scratch outlives every GPU object.
    arena: SetupArena,
}

impl VkRenderer {
    unsafe fn build(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RendererConfig,
    ) -> RenderResult<Self> {
        // STRICT ORDER:
        // 1) device context (instance, messenger, surface, device)
        // 2) swapchain + views
        // 3) render pass + pipeline for the chain's format
        // 4) framebuffers, then command pool and sync objects
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();
        let arena = SetupArena::new();

        let ctx = DeviceContext::new(&InstanceConfig::for_validation(cfg.validation), dh, wh, &arena)?;
        let present_pref = swapchain::present_mode_for(cfg.present_mode);
        let mut chain = SwapchainState::create(&ctx, &arena, size, present_pref)?;
        let mut pipeline = PipelineState::new(&ctx.device, chain.format(), &cfg.shader_dir, &arena)?;
        chain.create_framebuffers(&ctx.device, pipeline.render_pass)?;
        debug_assert!(chain.is_aligned());
        pipeline.update_dynamic(chain.extent);
        let sync = FrameSync::new(&ctx.device, ctx.queue_families.graphics)?;

        info!(
            "vk: renderer ready ({} images, setup scratch {} bytes)",
            chain.images.len(),
            arena.allocated_bytes()
        );

        Ok(Self {
            ctx,
            chain,
            pipeline,
            sync,
            target: TargetState::new(size),
            present_pref,
            shader_dir: cfg.shader_dir.clone(),
            clear: clear_value(cfg.clear_color),
            arena,
        })
    }

    unsafe fn rebuild_chain(&mut self) -> RenderResult<()> {
        // STRICT ORDER:
        // 1) idle the device so nothing references the old chain
        // 2) framebuffers -> views -> swapchain
        // 3) fresh image-available semaphore, fresh scratch
        // 4) renegotiate; new pipeline only if the format moved
        // 5) framebuffers against the (possibly new) render pass
        self.ctx
            .device
            .device_wait_idle()
            .check("vkDeviceWaitIdle")?;

        self.chain.destroy_framebuffers(&self.ctx.device);
        self.chain.destroy_chain(&self.ctx);
        self.sync.recreate_image_available(&self.ctx.device)?;
        self.arena.reset_scratch();

        self.chain = SwapchainState::create(
            &self.ctx,
            &self.arena,
            self.target.size(),
            self.present_pref,
        )?;

        if self.chain.format() != self.pipeline.format {
            info!(
                "vk: surface format changed {:?} -> {:?}, rebuilding pipeline",
                self.pipeline.format,
                self.chain.format()
            );
            let next = PipelineState::new(
                &self.ctx.device,
                self.chain.format(),
                &self.shader_dir,
                &self.arena,
            )?;
            self.pipeline.destroy(&self.ctx.device);
            self.pipeline = next;
        }

        self.chain
            .create_framebuffers(&self.ctx.device, self.pipeline.render_pass)?;
        debug_assert!(self.chain.is_aligned());
        self.pipeline.update_dynamic(self.chain.extent);
        self.target.mark_rebuilt();

        info!(
            "vk: swapchain rebuilt {}x{} ({} images)",
            self.chain.extent.width,
            self.chain.extent.height,
            self.chain.images.len()
        );
        Ok(())
    }
}

impl FrameBackend for VkRenderer {
    type Image = u32;
    type Error = RenderError;

    fn paused(&self) -> bool {
        self.target.is_paused()
    }

    fn invalidated(&self) -> bool {
        self.target.is_invalidated()
    }

    fn wait_in_flight(&mut self) -> RenderResult<()> {
        unsafe {
            self.ctx
                .device
                .wait_for_fences(&[self.sync.in_flight], true, u64::MAX)
                .check("vkWaitForFences")
        }
    }

    fn acquire(&mut self) -> RenderResult<Acquired<u32>> {
        let r = unsafe {
            self.ctx.swapchain_loader.acquire_next_image(
                self.chain.handle,
                u64::MAX,
                self.sync.image_available,
                vk::Fence::null(),
            )
        };
        frame::classify_acquire(r)
    }

    fn reset(&mut self) -> RenderResult<()> {
        unsafe {
            self.ctx
                .device
                .reset_fences(&[self.sync.in_flight])
                .check("vkResetFences")?;
            self.ctx
                .device
                .reset_command_buffer(self.sync.cmd, vk::CommandBufferResetFlags::empty())
                .check("vkResetCommandBuffer")
        }
    }

    fn record(&mut self, image: u32) -> RenderResult<()> {
        self.pipeline.update_dynamic(self.chain.extent);
        unsafe {
            frame::record_draw(
                &self.ctx.device,
                self.sync.cmd,
                &self.chain,
                &self.pipeline,
                image,
                self.clear,
            )
        }
    }

    fn submit(&mut self) -> RenderResult<()> {
        let wait_sems = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let cmds = [self.sync.cmd];
        let signal_sems = [self.sync.render_finished];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait_sems.len() as u32,
            p_wait_semaphores: wait_sems.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: cmds.len() as u32,
            p_command_buffers: cmds.as_ptr(),
            signal_semaphore_count: signal_sems.len() as u32,
            p_signal_semaphores: signal_sems.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.graphics_queue, &[submit], self.sync.in_flight)
                .check("vkQueueSubmit")
        }
    }

    fn present(&mut self, image: u32) -> RenderResult<Presented> {
        let wait_sems = [self.sync.render_finished];
        let swapchains = [self.chain.handle];
        let indices = [image];
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: wait_sems.len() as u32,
            p_wait_semaphores: wait_sems.as_ptr(),
            swapchain_count: swapchains.len() as u32,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };
        let r = unsafe {
            self.ctx
                .swapchain_loader
                .queue_present(self.ctx.present_queue, &present)
        };
        frame::classify_present(r)
    }

    fn rebuild(&mut self) -> RenderResult<()> {
        unsafe { self.rebuild_chain() }
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RendererConfig,
    ) -> Result<Self> {
        unsafe { Self::build(window, display, size, cfg) }.context("vulkan renderer setup")
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        let was_paused = self.target.is_paused();
        self.target.resize(size);
        if self.target.is_paused() {
            if !was_paused {
                info!("vk: target has zero area, pausing");
            }
            return Ok(());
        }
        if was_paused {
            info!("vk: resuming at {}x{}", size.width, size.height);
        }
        debug!("vk: resize to {}x{} queued", size.width, size.height);
        Ok(())
    }

    fn render(&mut self) -> Result<FrameStatus> {
        let status = run_frame(self)?;
        if !matches!(status, FrameStatus::Presented | FrameStatus::Paused) {
            debug!("vk: frame {:?}", status);
        }
        Ok(status)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = clear_value(rgba);
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            // STRICT TEARDOWN ORDER:
            // 1) idle; sync objects + command pool
            // 2) framebuffers; pipeline, layout, render pass, shader modules
            // 3) views, swapchain
            // 4) device, surface, messenger, instance (arena follows on field drop)
            let _ = self.ctx.device.device_wait_idle();
            self.sync.destroy(&self.ctx.device);
            self.chain.destroy_framebuffers(&self.ctx.device);
            self.pipeline.destroy(&self.ctx.device);
            self.chain.destroy_chain(&self.ctx);
            self.ctx.destroy();
        }
        info!("vk: renderer torn down");
    }
}
