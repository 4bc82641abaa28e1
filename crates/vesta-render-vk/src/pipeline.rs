// SPDX-License-Identifier: CEPL-1.0
use ash::util::read_spv;
use ash::vk;
use std::io::{self, Cursor};
use std::path::Path;
use tracing::{debug, info};
use vesta_core::SetupArena;
use vesta_platform::fileio;

use crate::error::{RenderError, RenderResult, VkCheck};

pub const VERTEX_SHADER: &str = "vert.spv";
pub const FRAGMENT_SHADER: &str = "frag.spv";
const SPIRV_MAGIC: u32 = 0x0723_0203;

pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Reads a SPIR-V binary through the arena and returns its words.
pub fn load_spirv(path: &Path, arena: &SetupArena) -> RenderResult<Vec<u32>> {
    let shader_err = |source: io::Error| RenderError::Shader {
        path: path.to_path_buf(),
        source,
    };
    let len = fileio::file_size(path).map_err(shader_err)?;
    let bytes = arena.zeroed_bytes(len)?;
    fileio::read_into(path, bytes).map_err(shader_err)?;
    let words = read_spv(&mut Cursor::new(&bytes[..])).map_err(shader_err)?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(shader_err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing SPIR-V magic number",
        )));
    }
    Ok(words)
}

/// Render pass, shader modules, layout and pipeline for one color format.
pub struct PipelineState {
    pub format: vk::Format,
    pub render_pass: vk::RenderPass,
    pub vert: vk::ShaderModule,
    pub frag: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
}

impl PipelineState {
    pub unsafe fn new(
        device: &ash::Device,
        format: vk::Format,
        shader_dir: &Path,
        arena: &SetupArena,
    ) -> RenderResult<Self> {
        // STRICT: render pass and pipeline are tied to `format`; a swapchain
        // with a different format needs a new PipelineState.
        let render_pass = create_render_pass(device, format)?;
        info!("vk: render pass created for {:?}", format);

        let vert_code = load_spirv(&shader_dir.join(VERTEX_SHADER), arena)?;
        let frag_code = load_spirv(&shader_dir.join(FRAGMENT_SHADER), arena)?;
        let vert = create_shader_module(device, &vert_code)?;
        let frag = create_shader_module(device, &frag_code)?;
        info!(
            "vk: shader modules created from {} ({} + {} bytes)",
            shader_dir.display(),
            vert_code.len() * 4,
            frag_code.len() * 4
        );

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .check("vkCreatePipelineLayout")?;

        let pipeline = create_pipeline(device, render_pass, layout, vert, frag)?;
        info!("vk: graphics pipeline created for {:?}", format);

        Ok(Self {
            format,
            render_pass,
            vert,
            frag,
            layout,
            pipeline,
            viewport: viewport_for(vk::Extent2D::default()),
            scissor: scissor_for(vk::Extent2D::default()),
        })
    }

    pub fn update_dynamic(&mut self, extent: vk::Extent2D) {
        self.viewport = viewport_for(extent);
        self.scissor = scissor_for(extent);
    }

    /// Pipeline, layout, render pass, then shader modules.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        debug!("vk: destroying pipeline for {:?}", self.format);
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        device.destroy_render_pass(self.render_pass, None);
        device.destroy_shader_module(self.vert, None);
        device.destroy_shader_module(self.frag, None);
        self.pipeline = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
        self.render_pass = vk::RenderPass::null();
        self.vert = vk::ShaderModule::null();
        self.frag = vk::ShaderModule::null();
    }
}

unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> RenderResult<vk::RenderPass> {
    let color = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        ..Default::default()
    };
    // Image acquire signals at color output; keep the layout transition behind it.
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    };
    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    device
        .create_render_pass(&rp_info, None)
        .check("vkCreateRenderPass")
}

unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> RenderResult<vk::ShaderModule> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: std::mem::size_of_val(code),
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .check("vkCreateShaderModule")
}

unsafe fn create_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    vert: vk::ShaderModule,
    frag: vk::ShaderModule,
) -> RenderResult<vk::Pipeline> {
    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vert,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: frag,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    // Positions come from gl_VertexIndex; no vertex buffers.
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        sample_shading_enable: vk::FALSE,
        min_sample_shading: 1.0,
        ..Default::default()
    };
    // Straight alpha over the clear color.
    let blend_att = vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        logic_op_enable: vk::FALSE,
        logic_op: vk::LogicOp::COPY,
        attachment_count: 1,
        p_attachments: &blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    match device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    ) {
        Ok(pipelines) => Ok(pipelines[0]),
        Err((_, code)) => Err(RenderError::Api {
            op: "vkCreateGraphicsPipelines",
            code,
        }),
    }
}
