// SPDX-License-Identifier: CEPL-1.0
//! Render pass, graphics pipeline and framebuffers.
//!
//! One colour attachment cleared on load and handed to the presentation
//! engine at the end of the single subpass. The pipeline has no vertex input:
//! the vertex shader derives the three positions from the vertex index.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::SetupError;
use crate::swapchain::Swapchain;

const ENTRY_POINT: &std::ffi::CStr = c"main";

pub struct RenderPass {
    device: Arc<Device>,
    handle: vk::RenderPass,
    format: vk::Format,
}

impl RenderPass {
    pub fn new(device: &Arc<Device>, format: vk::Format) -> Result<Self> {
        let color_att = vk::AttachmentDescription {
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
        let att_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &att_ref,
            ..Default::default()
        };
        // The layout transition waits for the acquire semaphore, which is only
        // waited on at COLOR_ATTACHMENT_OUTPUT.
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };

        let rp_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_att,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        let handle = unsafe { device.handle().create_render_pass(&rp_info, None) }
            .context("create_render_pass")?;
        Ok(RenderPass {
            device: Arc::clone(device),
            handle,
            format,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_render_pass(self.handle, None) };
    }
}

/// Realigns the blob to `u32` words and checks the magic number.
pub(crate) fn spirv_words(stage: &'static str, bytes: &[u8]) -> Result<Vec<u32>, SetupError> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|source| SetupError::InvalidSpirv { stage, source })
}

/// Only alive while the pipeline is being built.
struct ShaderModule {
    device: Arc<Device>,
    handle: vk::ShaderModule,
}

impl ShaderModule {
    fn new(device: &Arc<Device>, stage: &'static str, bytes: &[u8]) -> Result<Self> {
        let code = spirv_words(stage, bytes)?;
        let info = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: code.len() * std::mem::size_of::<u32>(),
            p_code: code.as_ptr(),
            ..Default::default()
        };
        let handle = unsafe { device.handle().create_shader_module(&info, None) }
            .with_context(|| format!("create_shader_module ({stage})"))?;
        Ok(ShaderModule {
            device: Arc::clone(device),
            handle,
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_shader_module(self.handle, None) };
    }
}

pub struct Pipeline {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
    handle: vk::Pipeline,
}

impl Pipeline {
    pub fn new(
        device: &Arc<Device>,
        render_pass: &RenderPass,
        vertex_spv: &[u8],
        fragment_spv: &[u8],
    ) -> Result<Self> {
        let vert = ShaderModule::new(device, "vertex", vertex_spv)?;
        let frag = ShaderModule::new(device, "fragment", fragment_spv)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vert.handle,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: frag.handle,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
        ];

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
        // viewport and scissor are dynamic, only the counts are baked in
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
            line_width: 1.0,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_bias_enable: vk::FALSE,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: vk::FALSE,
            min_sample_shading: 1.0,
            ..Default::default()
        };
        let blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::COPY,
            attachment_count: 1,
            p_attachments: &blend_att,
            ..Default::default()
        };
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dynamic_states.len() as u32,
            p_dynamic_states: dynamic_states.as_ptr(),
            ..Default::default()
        };

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        let layout = unsafe { device.handle().create_pipeline_layout(&layout_info, None) }
            .context("create_pipeline_layout")?;
        let mut pipeline = Pipeline {
            device: Arc::clone(device),
            layout,
            handle: vk::Pipeline::null(),
        };

        let info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &blend,
            p_dynamic_state: &dynamic,
            layout,
            render_pass: render_pass.handle(),
            subpass: 0,
            base_pipeline_index: -1,
            ..Default::default()
        };
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| e)
        .context("create_graphics_pipelines")?;
        pipeline.handle = pipelines[0];
        debug!("graphics pipeline created");
        Ok(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            let d = self.device.handle();
            if self.handle != vk::Pipeline::null() {
                d.destroy_pipeline(self.handle, None);
            }
            d.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// One framebuffer per swapchain image view, indexed by image.
pub struct Framebuffers {
    device: Arc<Device>,
    handles: Vec<vk::Framebuffer>,
}

impl Framebuffers {
    pub fn new(device: &Arc<Device>, render_pass: &RenderPass, swapchain: &Swapchain) -> Result<Self> {
        let extent = swapchain.extent();
        let mut fbs = Framebuffers {
            device: Arc::clone(device),
            handles: Vec::with_capacity(swapchain.views().len()),
        };
        for view in swapchain.views() {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: render_pass.handle(),
                attachment_count: 1,
                p_attachments: view,
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { device.handle().create_framebuffer(&fb_info, None) }
                .context("create_framebuffer")?;
            fbs.handles.push(fb);
        }
        Ok(fbs)
    }

    #[inline]
    pub fn get(&self, image: u32) -> Option<vk::Framebuffer> {
        self.handles.get(image as usize).copied()
    }

    /// Destroys every framebuffer; used before the views they reference go away.
    pub fn clear(&mut self) {
        for fb in self.handles.drain(..) {
            unsafe { self.device.handle().destroy_framebuffer(fb, None) };
        }
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        self.clear();
    }
}
