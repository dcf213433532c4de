use crate::descriptor::DescriptorBuffer;
use crate::device::Device;
use crate::error::Result;
use crate::resources::Image;
use ash::vk;
use std::collections::HashMap;
use std::ops::BitOr;

/// A pipeline-stage/access-mask pair used to build `VkMemoryBarrier2`s
/// without spelling out the raw flag combination at every call site.
#[derive(Clone, Copy, Debug)]
pub struct Access {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl Access {
    pub const NONE: Access = Access {
        stage: vk::PipelineStageFlags2::NONE,
        access: vk::AccessFlags2::NONE,
    };
    pub const ALL: Access = Access {
        stage: vk::PipelineStageFlags2::ALL_COMMANDS,
        access: vk::AccessFlags2::MEMORY_READ.union(vk::AccessFlags2::MEMORY_WRITE),
    };
    pub const TRANSFER_DST: Access = Access {
        stage: vk::PipelineStageFlags2::TRANSFER,
        access: vk::AccessFlags2::TRANSFER_WRITE,
    };
    pub const COMPUTE_WRITE: Access = Access {
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_WRITE,
    };
    pub const COMPUTE_READ: Access = Access {
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_READ,
    };
    pub const INDIRECT_READ: Access = Access {
        stage: vk::PipelineStageFlags2::DRAW_INDIRECT,
        access: vk::AccessFlags2::INDIRECT_COMMAND_READ,
    };
    pub const DEPTH_BUFFER_RENDER: Access = Access {
        stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
            .union(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS),
        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
    };
    pub const DEPTH_BUFFER_READ: Access = Access {
        stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
            .union(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS),
        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
    };
    pub const COLOR_BUFFER_RENDER: Access = Access {
        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
    };
}

impl BitOr for Access {
    type Output = Access;
    fn bitor(self, rhs: Self) -> Self::Output {
        Access {
            stage: self.stage | rhs.stage,
            access: self.access | rhs.access,
        }
    }
}

pub struct ImageBarrier<'a> {
    pub image: &'a Image,
    pub src: Access,
    pub dst: Access,
    pub new_layout: vk::ImageLayout,
}

pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub src: Access,
    pub dst: Access,
}

pub enum Load {
    Clear(vk::ClearValue),
    Load,
}

pub struct Attachment<'a> {
    pub image: &'a Image,
    pub mip: u32,
    pub load: Load,
}

pub struct BeginRendering<'a> {
    pub color_attachments: &'a [Attachment<'a>],
    pub depth_attachment: Option<Attachment<'a>>,
    pub extent: vk::Extent2D,
}

/// Wraps a single `vk::CommandBuffer` and tracks every `Image`'s layout as
/// recorded so far, so callers describe *what* a pass needs (`Access` in,
/// `Access` out, target layout) and the wrapper only emits the barrier if
/// something actually changed.
pub struct CommandBuffer<'a> {
    pub raw: vk::CommandBuffer,
    image_layouts: HashMap<*const Image, (&'a Image, vk::ImageLayout)>,
}

impl<'a> CommandBuffer<'a> {
    pub fn new(device: &Device) -> Result<Self> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let raw = unsafe { device.allocate_command_buffers(&info)? }[0];
        Ok(Self {
            raw,
            image_layouts: HashMap::new(),
        })
    }

    pub fn begin(&self, device: &Device) -> Result<()> {
        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(self.raw, &info)? };
        Ok(())
    }

    pub fn end(&mut self, device: &Device) -> Result<()> {
        for (_, (image, layout)) in self.image_layouts.drain() {
            image.set_layout(layout);
        }
        unsafe { device.end_command_buffer(self.raw)? };
        Ok(())
    }

    /// Records barriers for any image whose desired layout differs from
    /// what this command buffer has recorded (or the image's own last
    /// known layout, the first time it's touched).
    pub fn ensure_image_layouts(
        &mut self,
        device: &Device,
        images: &[(&'a Image, Access, Access, vk::ImageLayout)],
    ) {
        let mut barriers = Vec::new();

        for &(image, src, dst, new_layout) in images {
            let key = image as *const Image;
            let current_layout = self
                .image_layouts
                .get(&key)
                .map(|(_, layout)| *layout)
                .unwrap_or_else(|| image.layout());

            if current_layout != new_layout {
                barriers.push(
                    vk::ImageMemoryBarrier2::builder()
                        .src_stage_mask(src.stage)
                        .src_access_mask(src.access)
                        .dst_stage_mask(dst.stage)
                        .dst_access_mask(dst.access)
                        .old_layout(current_layout)
                        .new_layout(new_layout)
                        .image(image.image)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: image.aspect,
                            base_mip_level: 0,
                            level_count: image.mip_level_count,
                            base_array_layer: 0,
                            layer_count: 1,
                        })
                        .build(),
                );
            }

            self.image_layouts.insert(key, (image, new_layout));
        }

        if !barriers.is_empty() {
            let dep_info = vk::DependencyInfo::builder().image_memory_barriers(&barriers);
            unsafe { device.cmd_pipeline_barrier2(self.raw, &dep_info) };
        }
    }

    pub fn pipeline_barriers(
        &self,
        device: &Device,
        image_barriers: &[ImageBarrier],
        buffer_barriers: &[BufferBarrier],
    ) {
        let images: Vec<_> = image_barriers
            .iter()
            .map(|b| {
                vk::ImageMemoryBarrier2::builder()
                    .src_stage_mask(b.src.stage)
                    .src_access_mask(b.src.access)
                    .dst_stage_mask(b.dst.stage)
                    .dst_access_mask(b.dst.access)
                    .old_layout(b.image.layout())
                    .new_layout(b.new_layout)
                    .image(b.image.image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: b.image.aspect,
                        base_mip_level: 0,
                        level_count: b.image.mip_level_count,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .build()
            })
            .collect();

        let buffers: Vec<_> = buffer_barriers
            .iter()
            .map(|b| {
                vk::BufferMemoryBarrier2::builder()
                    .src_stage_mask(b.src.stage)
                    .src_access_mask(b.src.access)
                    .dst_stage_mask(b.dst.stage)
                    .dst_access_mask(b.dst.access)
                    .buffer(b.buffer)
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .build()
            })
            .collect();

        for b in image_barriers {
            b.image.set_layout(b.new_layout);
        }

        let dep_info = vk::DependencyInfo::builder()
            .image_memory_barriers(&images)
            .buffer_memory_barriers(&buffers);
        unsafe { device.cmd_pipeline_barrier2(self.raw, &dep_info) };
    }

    pub fn bind_pipeline(&self, device: &Device, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { device.cmd_bind_pipeline(self.raw, bind_point, pipeline) };
    }

    pub fn bind_descriptor_buffer(&self, device: &Device, descriptor: &DescriptorBuffer) {
        let binding = vk::DescriptorBufferBindingInfoEXT::builder()
            .address(descriptor.address)
            .usage(vk::BufferUsageFlags::RESOURCE_DESCRIPTOR_BUFFER_EXT);
        unsafe {
            device
                .descriptor_buffer_loader
                .cmd_bind_descriptor_buffers(self.raw, std::slice::from_ref(&binding))
        };
    }

    pub fn bind_descriptor_offset(
        &self,
        device: &Device,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
        offset: vk::DeviceSize,
    ) {
        let indices = [0u32];
        let offsets = [offset];
        unsafe {
            device
                .descriptor_buffer_loader
                .cmd_set_descriptor_buffer_offsets(
                    self.raw,
                    bind_point,
                    layout,
                    set,
                    &indices,
                    &offsets,
                )
        };
    }

    pub fn dispatch(&self, device: &Device, x: u32, y: u32, z: u32) {
        unsafe { device.cmd_dispatch(self.raw, x, y, z) };
    }

    pub fn fill_buffer(&self, device: &Device, buffer: vk::Buffer, value: u32) {
        unsafe { device.cmd_fill_buffer(self.raw, buffer, 0, vk::WHOLE_SIZE, value) };
    }

    pub fn push_constants<T: bytemuck::NoUninit>(
        &self,
        device: &Device,
        layout: vk::PipelineLayout,
        stage: vk::ShaderStageFlags,
        data: &T,
    ) {
        unsafe {
            device.cmd_push_constants(self.raw, layout, stage, 0, bytemuck::bytes_of(data))
        };
    }

    pub fn bind_index_buffer(&self, device: &Device, buffer: vk::Buffer) {
        unsafe { device.cmd_bind_index_buffer(self.raw, buffer, 0, vk::IndexType::UINT32) };
    }

    pub fn draw_indexed_indirect(
        &self,
        device: &Device,
        buffer: vk::Buffer,
        stride: u32,
        count: u32,
    ) {
        unsafe { device.cmd_draw_indexed_indirect(self.raw, buffer, 0, count, stride) };
    }

    pub fn draw_indexed_indirect_count(
        &self,
        device: &Device,
        buffer: vk::Buffer,
        count_buffer: vk::Buffer,
        max_count: u32,
        stride: u32,
    ) {
        unsafe {
            device.cmd_draw_indexed_indirect_count(
                self.raw,
                buffer,
                0,
                count_buffer,
                0,
                max_count,
                stride,
            )
        };
    }

    pub fn begin_rendering(&self, device: &Device, info: &BeginRendering) {
        let color_attachments: Vec<_> = info
            .color_attachments
            .iter()
            .map(|a| attachment_info(a))
            .collect();

        let mut builder = vk::RenderingInfo::builder()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: info.extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);

        let depth_info = info.depth_attachment.as_ref().map(attachment_info);
        if let Some(depth_info) = depth_info.as_ref() {
            builder = builder.depth_attachment(depth_info);
        }

        unsafe { device.cmd_begin_rendering(self.raw, &builder) };
    }

    pub fn end_rendering(&self, device: &Device) {
        unsafe { device.cmd_end_rendering(self.raw) };
    }

    pub fn set_viewport(&self, device: &Device, extent: vk::Extent2D, flip_y: bool) {
        let viewport = if flip_y {
            vk::Viewport {
                x: 0.0,
                y: extent.height as f32,
                width: extent.width as f32,
                height: -(extent.height as f32),
                min_depth: 0.0,
                max_depth: 1.0,
            }
        } else {
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }
        };
        unsafe { device.cmd_set_viewport(self.raw, 0, &[viewport]) };
    }

    pub fn set_scissor(&self, device: &Device, extent: vk::Extent2D) {
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe { device.cmd_set_scissor(self.raw, 0, &[scissor]) };
    }

    pub fn blit_image(
        &self,
        device: &Device,
        src: &Image,
        src_mip: u32,
        dst: &Image,
        dst_mip: u32,
    ) {
        let region = vk::ImageBlit::builder()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: src.aspect,
                mip_level: src_mip,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src.mip_extent(src_mip).width as i32,
                    y: src.mip_extent(src_mip).height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect,
                mip_level: dst_mip,
                base_array_layer: 0,
                layer_count: 1,
            })
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst.mip_extent(dst_mip).width as i32,
                    y: dst.mip_extent(dst_mip).height as i32,
                    z: 1,
                },
            ])
            .build();

        unsafe {
            device.cmd_blit_image(
                self.raw,
                src.image,
                src.layout(),
                dst.image,
                dst.layout(),
                &[region],
                vk::Filter::LINEAR,
            )
        };
    }
}

fn attachment_info(attachment: &Attachment) -> vk::RenderingAttachmentInfo {
    let (load_op, clear_value) = match attachment.load {
        Load::Clear(v) => (vk::AttachmentLoadOp::CLEAR, v),
        Load::Load => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
    };

    vk::RenderingAttachmentInfo::builder()
        .image_view(attachment.image.view(attachment.mip))
        .image_layout(attachment.image.layout())
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(clear_value)
        .build()
}

/// Runs `f` on a one-shot command buffer, submits it, and blocks on
/// `vkDeviceWaitIdle` before destroying it — for setup-time uploads that
/// are not on the per-frame hot path.
pub fn quickie<'a>(device: &Device, f: impl FnOnce(&mut CommandBuffer<'a>)) -> Result<()> {
    let mut cmd = CommandBuffer::new(device)?;
    cmd.begin(device)?;
    f(&mut cmd);
    cmd.end(device)?;

    let cmd_buffers = [cmd.raw];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&cmd_buffers);
    unsafe {
        device.queue_submit(device.queue, &[submit_info.build()], vk::Fence::null())?;
        device.device_wait_idle()?;
        device.free_command_buffers(device.command_pool, &cmd_buffers);
    }
    Ok(())
}

/// Submits a per-frame command buffer with acquire/release semaphores
/// already supplied by the swapchain layer, without waiting — the
/// orchestrator tracks completion with a fence it owns separately.
pub fn submit(
    device: &Device,
    cmd: vk::CommandBuffer,
    wait: &[(vk::Semaphore, vk::PipelineStageFlags)],
    signal: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let wait_semaphores: Vec<_> = wait.iter().map(|(s, _)| *s).collect();
    let wait_stages: Vec<_> = wait.iter().map(|(_, s)| *s).collect();
    let cmd_buffers = [cmd];

    let info = vk::SubmitInfo::builder()
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .command_buffers(&cmd_buffers)
        .signal_semaphores(signal);

    unsafe { device.queue_submit(device.queue, &[info.build()], fence)? };
    Ok(())
}
