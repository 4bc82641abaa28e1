// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info};
use vesta_render::{Acquired, Presented};

use crate::error::{RenderError, RenderResult, VkCheck};
use crate::pipeline::PipelineState;
use crate::swapchain::SwapchainState;

/// Suboptimal counts as stale: the image is not used and the chain is rebuilt.
pub fn classify_acquire(r: VkResult<(u32, bool)>) -> RenderResult<Acquired<u32>> {
    match r {
        Ok((index, false)) => Ok(Acquired::Ready(index)),
        Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::Stale),
        Err(code) => Err(RenderError::Api {
            op: "vkAcquireNextImageKHR",
            code,
        }),
    }
}

pub fn classify_present(r: VkResult<bool>) -> RenderResult<Presented> {
    match r {
        Ok(false) => Ok(Presented::Done),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::Stale),
        Err(code) => Err(RenderError::Api {
            op: "vkQueuePresentKHR",
            code,
        }),
    }
}

/// One command buffer and the primitives guarding the single frame in flight.
pub struct FrameSync {
    pub pool: vk::CommandPool,
    pub cmd: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub unsafe fn new(device: &ash::Device, graphics_family: u32) -> RenderResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: graphics_family,
            ..Default::default()
        };
        let pool = device
            .create_command_pool(&pool_info, None)
            .check("vkCreateCommandPool")?;

        let alloc = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = device
            .allocate_command_buffers(&alloc)
            .check("vkAllocateCommandBuffers")?[0];

        let image_available = create_semaphore(device)?;
        let render_finished = create_semaphore(device)?;

        // Signaled so the very first wait returns immediately.
        let fence_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let in_flight = device
            .create_fence(&fence_info, None)
            .check("vkCreateFence")?;

        info!("vk: command pool, command buffer and sync objects created");
        Ok(Self {
            pool,
            cmd,
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// A suboptimal acquire leaves `image_available` signaled with no waiter.
    /// Replace it so the next acquire starts from an unsignaled semaphore.
    /// Caller must have idled the device.
    pub unsafe fn recreate_image_available(&mut self, device: &ash::Device) -> RenderResult<()> {
        device.destroy_semaphore(self.image_available, None);
        self.image_available = vk::Semaphore::null();
        self.image_available = create_semaphore(device)?;
        Ok(())
    }

    /// Semaphores, fence, then the pool (which frees the command buffer).
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        debug!("vk: destroying sync objects and command pool");
        device.destroy_semaphore(self.image_available, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_fence(self.in_flight, None);
        device.destroy_command_pool(self.pool, None);
        self.image_available = vk::Semaphore::null();
        self.render_finished = vk::Semaphore::null();
        self.in_flight = vk::Fence::null();
        self.pool = vk::CommandPool::null();
        self.cmd = vk::CommandBuffer::null();
    }
}

unsafe fn create_semaphore(device: &ash::Device) -> RenderResult<vk::Semaphore> {
    let info = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    device
        .create_semaphore(&info, None)
        .check("vkCreateSemaphore")
}

/// Clears the target to `clear` and draws the three-vertex triangle.
pub unsafe fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    chain: &SwapchainState,
    pipeline: &PipelineState,
    image_index: u32,
    clear: vk::ClearValue,
) -> RenderResult<()> {
    let framebuffer = chain.framebuffers[image_index as usize];

    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .check("vkBeginCommandBuffer")?;

    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: pipeline.render_pass,
        framebuffer,
        render_area: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: chain.extent,
        },
        clear_value_count: 1,
        p_clear_values: &clear,
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
    device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&pipeline.viewport));
    device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&pipeline.scissor));
    device.cmd_draw(cmd, 3, 1, 0, 0);
    device.cmd_end_render_pass(cmd);

    device
        .end_command_buffer(cmd)
        .check("vkEndCommandBuffer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_acquire_is_ready() {
        assert_eq!(classify_acquire(Ok((2, false))).unwrap(), Acquired::Ready(2));
    }

    #[test]
    fn suboptimal_acquire_is_stale() {
        assert_eq!(classify_acquire(Ok((0, true))).unwrap(), Acquired::Stale);
    }

    #[test]
    fn out_of_date_acquire_is_stale() {
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            Acquired::Stale
        );
    }

    #[test]
    fn device_lost_on_acquire_is_fatal() {
        match classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)) {
            Err(RenderError::Api { op, code }) => {
                assert_eq!(op, "vkAcquireNextImageKHR");
                assert_eq!(code, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn present_outcomes() {
        assert_eq!(classify_present(Ok(false)).unwrap(), Presented::Done);
        assert_eq!(classify_present(Ok(true)).unwrap(), Presented::Stale);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            Presented::Stale
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }
}
