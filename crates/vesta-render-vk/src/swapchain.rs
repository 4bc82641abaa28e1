// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::{debug, info};
use vesta_core::SetupArena;
use vesta_render::{PresentPreference, RenderSize};

use crate::device::{DeviceContext, QueueFamilyPair};
use crate::error::{RenderError, RenderResult, VkCheck};

/// `current_extent.width` value meaning "the swapchain decides".
pub const UNDEFINED_EXTENT: u32 = u32::MAX;

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn present_mode_for(pref: PresentPreference) -> vk::PresentModeKHR {
    match pref {
        PresentPreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentPreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentPreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Option<vk::PresentModeKHR> {
    if modes.contains(&preferred) {
        Some(preferred)
    } else {
        modes.first().copied()
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
pub fn resolve_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count.saturating_add(1);
    match caps.max_image_count {
        0 => wanted,
        max if max < caps.min_image_count => caps.min_image_count,
        max => wanted.min(max),
    }
}

/// The sentinel current extent is returned untouched; otherwise the window
/// size is clamped into the supported range.
pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, size: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width == UNDEFINED_EXTENT {
        return caps.current_extent;
    }
    clamp_to_caps(caps, size)
}

fn clamp_to_caps(caps: &vk::SurfaceCapabilitiesKHR, size: RenderSize) -> vk::Extent2D {
    vk::Extent2D {
        width: size
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: size
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    }
}

/// Extent handed to swapchain creation. A sentinel surface takes its size
/// from the swapchain, so the clamped window size stands in for it.
pub fn creation_extent(caps: &vk::SurfaceCapabilitiesKHR, size: RenderSize) -> vk::Extent2D {
    let resolved = resolve_extent(caps, size);
    if resolved.width == UNDEFINED_EXTENT {
        clamp_to_caps(caps, size)
    } else {
        resolved
    }
}

pub fn sharing_mode(families: &QueueFamilyPair) -> vk::SharingMode {
    if families.is_shared() {
        vk::SharingMode::EXCLUSIVE
    } else {
        vk::SharingMode::CONCURRENT
    }
}

/// What the surface offered and what was picked from it. The extent is not
/// kept here: it depends on the window size and lives on `SwapchainState`.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceInfo {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl SurfaceInfo {
    pub unsafe fn query(
        ctx: &DeviceContext,
        arena: &SetupArena,
        preferred: vk::PresentModeKHR,
    ) -> RenderResult<Self> {
        let caps = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
            .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let formats = arena.copy_slice(
            &ctx.surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, ctx.surface)
                .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
        )?;
        let modes = arena.copy_slice(
            &ctx.surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, ctx.surface)
                .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
        )?;

        let format = choose_surface_format(formats).ok_or(RenderError::SurfaceEmpty("formats"))?;
        let present_mode =
            choose_present_mode(modes, preferred).ok_or(RenderError::SurfaceEmpty("present modes"))?;
        Ok(Self {
            caps,
            format,
            present_mode,
        })
    }
}

/// Presentable images plus the per-image views and framebuffers.
/// `views` and `framebuffers` stay index-aligned with `images`.
pub struct SwapchainState {
    pub handle: vk::SwapchainKHR,
    pub info: SurfaceInfo,
    pub image_count: u32,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainState {
    /// Creates the chain and its views. Framebuffers come later, once a
    /// render pass for `format()` exists.
    pub unsafe fn create(
        ctx: &DeviceContext,
        arena: &SetupArena,
        size: RenderSize,
        preferred: vk::PresentModeKHR,
    ) -> RenderResult<Self> {
        let info = SurfaceInfo::query(ctx, arena, preferred)?;
        let image_count = resolve_image_count(&info.caps);
        let extent = creation_extent(&info.caps, size);
        let families = ctx.queue_families.indices();

        let (image_sharing_mode, family_count) = match sharing_mode(&ctx.queue_families) {
            vk::SharingMode::CONCURRENT => (vk::SharingMode::CONCURRENT, families.len() as u32),
            mode => (mode, 0),
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: image_count,
            image_format: info.format.format,
            image_color_space: info.format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode,
            queue_family_index_count: family_count,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: info.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        let handle = ctx
            .swapchain_loader
            .create_swapchain(&swap_info, None)
            .check("vkCreateSwapchainKHR")?;
        let images = ctx
            .swapchain_loader
            .get_swapchain_images(handle)
            .check("vkGetSwapchainImagesKHR")?;

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: info.format.format,
                components: vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                },
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            views.push(
                ctx.device
                    .create_image_view(&iv_info, None)
                    .check("vkCreateImageView")?,
            );
        }

        info!(
            "vk: swapchain {}x{} format={:?}/{:?} present_mode={:?} images(min={} requested={} got={}) sharing={:?}",
            extent.width,
            extent.height,
            info.format.format,
            info.format.color_space,
            info.present_mode,
            info.caps.min_image_count,
            image_count,
            images.len(),
            image_sharing_mode,
        );

        Ok(Self {
            handle,
            info,
            image_count,
            extent,
            images,
            views,
            framebuffers: Vec::new(),
        })
    }

    pub fn format(&self) -> vk::Format {
        self.info.format.format
    }

    /// Every image has exactly one view and one framebuffer at the same index.
    pub fn is_aligned(&self) -> bool {
        self.views.len() == self.images.len() && self.framebuffers.len() == self.images.len()
    }

    pub unsafe fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        render_pass: vk::RenderPass,
    ) -> RenderResult<()> {
        let mut framebuffers = Vec::with_capacity(self.views.len());
        for view in &self.views {
            let attachments = [*view];
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            framebuffers.push(
                device
                    .create_framebuffer(&fb_info, None)
                    .check("vkCreateFramebuffer")?,
            );
        }
        info!("vk: {} framebuffers created", framebuffers.len());
        self.framebuffers = framebuffers;
        Ok(())
    }

    pub unsafe fn destroy_framebuffers(&mut self, device: &ash::Device) {
        debug!("vk: destroying {} framebuffers", self.framebuffers.len());
        for fb in self.framebuffers.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
    }

    /// Views, then the swapchain itself. Images belong to the swapchain.
    pub unsafe fn destroy_chain(&mut self, ctx: &DeviceContext) {
        debug!("vk: destroying {} image views and the swapchain", self.views.len());
        for view in self.views.drain(..) {
            ctx.device.destroy_image_view(view, None);
        }
        self.images.clear();
        ctx.swapchain_loader.destroy_swapchain(self.handle, None);
        self.handle = vk::SwapchainKHR::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn size(width: u32, height: u32) -> RenderSize {
        RenderSize { width, height }
    }

    #[test]
    fn unbounded_max_takes_one_over_min() {
        assert_eq!(resolve_image_count(&caps(2, 0)), 3);
    }

    #[test]
    fn max_caps_the_count() {
        assert_eq!(resolve_image_count(&caps(3, 3)), 3);
        assert_eq!(resolve_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn inconsistent_caps_fall_back_to_min() {
        assert_eq!(resolve_image_count(&caps(4, 2)), 4);
    }

    #[test]
    fn sentinel_extent_is_kept_verbatim() {
        let mut c = caps(2, 0);
        c.current_extent = vk::Extent2D {
            width: UNDEFINED_EXTENT,
            height: UNDEFINED_EXTENT,
        };
        let e = resolve_extent(&c, size(800, 600));
        assert_eq!(e.width, UNDEFINED_EXTENT);
        assert_eq!(e.height, UNDEFINED_EXTENT);
    }

    #[test]
    fn sentinel_surface_creates_at_window_size() {
        let mut c = caps(2, 0);
        c.current_extent.width = UNDEFINED_EXTENT;
        c.current_extent.height = UNDEFINED_EXTENT;
        let e = creation_extent(&c, size(800, 600));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn window_size_is_clamped() {
        let mut c = caps(2, 0);
        c.min_image_extent = vk::Extent2D {
            width: 100,
            height: 100,
        };
        c.max_image_extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        let big = resolve_extent(&c, size(5000, 50));
        assert_eq!((big.width, big.height), (1920, 100));
        let fits = resolve_extent(&c, size(1280, 720));
        assert_eq!((fits.width, fits.height), (1280, 720));
    }

    #[test]
    fn srgb_bgra_preferred() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn first_format_when_preferred_missing() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            },
        ];
        let picked = choose_surface_format(&formats).map(|f| (f.format, f.color_space));
        assert_eq!(
            picked,
            Some((formats[0].format, formats[0].color_space))
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_falls_back_to_first() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::FIFO),
            Some(vk::PresentModeKHR::FIFO)
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            Some(vk::PresentModeKHR::IMMEDIATE)
        );
        assert_eq!(choose_present_mode(&[], vk::PresentModeKHR::FIFO), None);
    }

    #[test]
    fn preference_maps_to_mode() {
        assert_eq!(
            present_mode_for(PresentPreference::default()),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            present_mode_for(PresentPreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
    }

    fn chain_with(images: usize, views: usize, framebuffers: usize) -> SwapchainState {
        SwapchainState {
            handle: vk::SwapchainKHR::null(),
            info: SurfaceInfo {
                caps: caps(2, 3),
                format: vk::SurfaceFormatKHR::default(),
                present_mode: vk::PresentModeKHR::FIFO,
            },
            image_count: images as u32,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            images: vec![vk::Image::null(); images],
            views: vec![vk::ImageView::null(); views],
            framebuffers: vec![vk::Framebuffer::null(); framebuffers],
        }
    }

    #[test]
    fn alignment_requires_one_view_and_framebuffer_per_image() {
        assert!(chain_with(3, 3, 3).is_aligned());
        assert!(chain_with(0, 0, 0).is_aligned());
        // Views exist but framebuffers are not built yet.
        assert!(!chain_with(3, 3, 0).is_aligned());
        assert!(!chain_with(3, 2, 3).is_aligned());
        assert!(!chain_with(2, 3, 3).is_aligned());
        assert!(!chain_with(3, 3, 4).is_aligned());
    }

    #[test]
    fn split_families_share_concurrently() {
        let split = QueueFamilyPair {
            graphics: 0,
            present: 2,
        };
        let same = QueueFamilyPair {
            graphics: 1,
            present: 1,
        };
        assert_eq!(sharing_mode(&split), vk::SharingMode::CONCURRENT);
        assert_eq!(sharing_mode(&same), vk::SharingMode::EXCLUSIVE);
    }
}
