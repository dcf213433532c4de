use crate::descriptor::DescriptorLayout;
use crate::device::Device;
use crate::error::Result;
use ash::vk;

pub struct PipelineLayout {
    pub layout: vk::PipelineLayout,
    pub descriptor_layout: DescriptorLayout,
}

impl PipelineLayout {
    pub fn create(
        device: &Device,
        descriptor_layout: DescriptorLayout,
        push_constant_range: Option<vk::PushConstantRange>,
    ) -> Result<Self> {
        let set_layouts = [descriptor_layout.layout];
        let ranges: Vec<_> = push_constant_range.into_iter().collect();

        let info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&ranges);

        let layout = unsafe { device.create_pipeline_layout(&info, None)? };

        Ok(Self {
            layout,
            descriptor_layout,
        })
    }

    pub fn destroy(&self, device: &Device) {
        unsafe { device.destroy_pipeline_layout(self.layout, None) };
        self.descriptor_layout.destroy(device);
    }
}

pub enum PipelineKind {
    Compute {
        shader: vk::ShaderModule,
    },
    Graphics {
        vertex: vk::ShaderModule,
        fragment: vk::ShaderModule,
        color_formats: Vec<vk::Format>,
        depth_format: Option<vk::Format>,
    },
    Mesh {
        task: Option<vk::ShaderModule>,
        mesh: vk::ShaderModule,
        fragment: vk::ShaderModule,
        color_formats: Vec<vk::Format>,
        depth_format: Option<vk::Format>,
    },
}

pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub bind_point: vk::PipelineBindPoint,
}

const ENTRY_POINT: &[u8] = b"main\0";

impl Pipeline {
    pub fn create(device: &Device, layout: &PipelineLayout, kind: PipelineKind) -> Result<Self> {
        let entry = std::ffi::CStr::from_bytes_with_nul(ENTRY_POINT).unwrap();

        match kind {
            PipelineKind::Compute { shader } => {
                let stage = vk::PipelineShaderStageCreateInfo::builder()
                    .stage(vk::ShaderStageFlags::COMPUTE)
                    .module(shader)
                    .name(entry);

                let info = vk::ComputePipelineCreateInfo::builder()
                    .stage(*stage)
                    .layout(layout.layout)
                    .flags(vk::PipelineCreateFlags::DESCRIPTOR_BUFFER_EXT);

                let pipeline = unsafe {
                    device
                        .create_compute_pipelines(vk::PipelineCache::null(), &[*info], None)
                        .map_err(|(_, e)| e)?[0]
                };

                Ok(Self {
                    pipeline,
                    bind_point: vk::PipelineBindPoint::COMPUTE,
                })
            }
            PipelineKind::Graphics {
                vertex,
                fragment,
                color_formats,
                depth_format,
            } => {
                let stages = [
                    vk::PipelineShaderStageCreateInfo::builder()
                        .stage(vk::ShaderStageFlags::VERTEX)
                        .module(vertex)
                        .name(entry)
                        .build(),
                    vk::PipelineShaderStageCreateInfo::builder()
                        .stage(vk::ShaderStageFlags::FRAGMENT)
                        .module(fragment)
                        .name(entry)
                        .build(),
                ];

                Self::create_graphics_like(device, layout, &stages, &color_formats, depth_format)
            }
            PipelineKind::Mesh {
                task,
                mesh,
                fragment,
                color_formats,
                depth_format,
            } => {
                let mut stages = Vec::new();
                if let Some(task) = task {
                    stages.push(
                        vk::PipelineShaderStageCreateInfo::builder()
                            .stage(vk::ShaderStageFlags::TASK_EXT)
                            .module(task)
                            .name(entry)
                            .build(),
                    );
                }
                stages.push(
                    vk::PipelineShaderStageCreateInfo::builder()
                        .stage(vk::ShaderStageFlags::MESH_EXT)
                        .module(mesh)
                        .name(entry)
                        .build(),
                );
                stages.push(
                    vk::PipelineShaderStageCreateInfo::builder()
                        .stage(vk::ShaderStageFlags::FRAGMENT)
                        .module(fragment)
                        .name(entry)
                        .build(),
                );

                Self::create_graphics_like(device, layout, &stages, &color_formats, depth_format)
            }
        }
    }

    fn create_graphics_like(
        device: &Device,
        layout: &PipelineLayout,
        stages: &[vk::PipelineShaderStageCreateInfo],
        color_formats: &[vk::Format],
        depth_format: Option<vk::Format>,
    ) -> Result<Self> {
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Reversed-Z: greater depth is nearer, so the compare op is GREATER
        // and the clear value (elsewhere) is 0.0.
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::GREATER);

        let color_blend_attachments: Vec<_> = color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::builder()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .build()
            })
            .collect();

        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::builder().attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();

        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(color_formats);
        if let Some(depth_format) = depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let mut info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.layout)
            .flags(vk::PipelineCreateFlags::DESCRIPTOR_BUFFER_EXT)
            .push_next(&mut rendering_info);

        info.render_pass = vk::RenderPass::null();

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info.build()], None)
                .map_err(|(_, e)| e)?[0]
        };

        Ok(Self {
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }

    pub fn destroy(&self, device: &Device) {
        unsafe { device.destroy_pipeline(self.pipeline, None) };
    }
}
