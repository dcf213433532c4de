use crate::device::Device;
use crate::error::{GpuError, Result};
use ash::vk;
use std::cell::Cell;
use std::collections::HashMap;

/// What a buffer is used for. Every kind always gets `TRANSFER_SRC |
/// TRANSFER_DST | SHADER_DEVICE_ADDRESS` so any buffer can be staged into
/// or read back from, and any buffer can be addressed from a push constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Index,
    Storage,
    Scratch,
    Descriptor { sampler: bool },
}

impl BufferKind {
    pub fn usage_flags(self) -> vk::BufferUsageFlags {
        let base = vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;

        base | match self {
            BufferKind::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferKind::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::INDIRECT_BUFFER
            }
            BufferKind::Scratch => vk::BufferUsageFlags::empty(),
            BufferKind::Descriptor { sampler } => {
                let mut flags = vk::BufferUsageFlags::RESOURCE_DESCRIPTOR_BUFFER_EXT;
                if sampler {
                    flags |= vk::BufferUsageFlags::SAMPLER_DESCRIPTOR_BUFFER_EXT;
                }
                flags
            }
        }
    }
}

pub struct BufferRequest {
    pub size: vk::DeviceSize,
    pub kind: BufferKind,
}

pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
}

impl Buffer {
    pub fn create(device: &Device, request: &BufferRequest) -> Result<Self> {
        let info = vk::BufferCreateInfo::builder()
            .size(request.size)
            .usage(request.kind.usage_flags())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&info, None)? };

        Ok(Self {
            buffer,
            size: request.size,
        })
    }

    pub fn device_address(&self, device: &Device) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::builder().buffer(self.buffer);
        unsafe { device.get_buffer_device_address(&info) }
    }

    pub fn memory_requirements(&self, device: &Device) -> vk::MemoryRequirements {
        unsafe { device.get_buffer_memory_requirements(self.buffer) }
    }

    pub fn destroy(&self, device: &Device) {
        unsafe { device.destroy_buffer(self.buffer, None) };
    }
}

#[derive(Clone, Copy)]
pub struct ImageRequest {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub mip_level_count: u32,
    pub usage: vk::ImageUsageFlags,
}

fn format_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// GPU image plus its mip-level views. Tracks its own current layout so
/// `CommandBuffer::ensure_image_layouts` can diff against it and emit only
/// the barriers that are actually needed.
pub struct Image {
    pub image: vk::Image,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub mip_level_count: u32,
    views: HashMap<u32, vk::ImageView>,
    layout: Cell<vk::ImageLayout>,
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image
    }
}
impl Eq for Image {}
impl std::hash::Hash for Image {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.image.hash(state)
    }
}

impl Image {
    pub fn create(device: &Device, request: &ImageRequest) -> Result<Self> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(request.format)
            .extent(vk::Extent3D {
                width: request.extent.width,
                height: request.extent.height,
                depth: 1,
            })
            .mip_levels(request.mip_level_count)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(request.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&info, None)? };

        Ok(Self {
            image,
            extent: request.extent,
            format: request.format,
            aspect: format_aspect(request.format),
            mip_level_count: request.mip_level_count,
            views: HashMap::new(),
            layout: Cell::new(vk::ImageLayout::UNDEFINED),
        })
    }

    pub fn memory_requirements(&self, device: &Device) -> vk::MemoryRequirements {
        unsafe { device.get_image_memory_requirements(self.image) }
    }

    pub fn create_view(&mut self, device: &Device, base_mip: u32, mip_count: u32) -> Result<()> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: base_mip,
                level_count: mip_count,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.create_image_view(&info, None)? };
        self.views.insert(base_mip, view);
        Ok(())
    }

    pub fn view(&self, base_mip: u32) -> vk::ImageView {
        *self
            .views
            .get(&base_mip)
            .expect("requested image view was never created")
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout.get()
    }

    pub fn set_layout(&self, layout: vk::ImageLayout) {
        self.layout.set(layout);
    }

    pub fn mip_extent(&self, mip: u32) -> vk::Extent2D {
        vk::Extent2D {
            width: (self.extent.width >> mip).max(1),
            height: (self.extent.height >> mip).max(1),
        }
    }

    pub fn destroy(&mut self, device: &Device) {
        for view in self.views.values() {
            unsafe { device.destroy_image_view(*view, None) };
        }
        self.views.clear();
        unsafe { device.destroy_image(self.image, None) };
    }
}

pub struct Memory {
    pub memory: vk::DeviceMemory,
}

fn memory_type_index(
    device: &Device,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..device.memory_properties.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && device.memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(flags)
        })
        .ok_or(GpuError::NoMemoryType(vk::MemoryRequirements {
            size: 0,
            alignment: 0,
            memory_type_bits: type_bits,
        }))
}

impl Memory {
    pub fn allocate(
        device: &Device,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let mut flags_info = vk::MemoryAllocateFlagsInfo::builder()
            .flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index(
                device,
                requirements.memory_type_bits,
                flags,
            )?)
            .push_next(&mut flags_info);

        let memory = unsafe { device.allocate_memory(&info, None)? };
        Ok(Self { memory })
    }

    pub fn map(&self, device: &Device, size: vk::DeviceSize) -> Result<*mut u8> {
        let ptr =
            unsafe { device.map_memory(self.memory, 0, size, vk::MemoryMapFlags::empty())? };
        Ok(ptr as *mut u8)
    }

    pub fn unmap(&self, device: &Device) {
        unsafe { device.unmap_memory(self.memory) };
    }

    pub fn free(&self, device: &Device) {
        unsafe { device.free_memory(self.memory, None) };
    }
}

/// Host-visible scratch buffer used to stage uploads before a
/// `cmd_copy_buffer`/`cmd_copy_buffer_to_image`. One is created per batch
/// of uploads and destroyed once the owning command buffer has completed.
pub struct Scratch {
    pub buffer: Buffer,
    pub memory: Memory,
}

impl Scratch {
    pub fn create(device: &Device, size: vk::DeviceSize) -> Result<Self> {
        let buffer = Buffer::create(
            device,
            &BufferRequest {
                size,
                kind: BufferKind::Scratch,
            },
        )?;
        let requirements = buffer.memory_requirements(device);
        let memory = Memory::allocate(
            device,
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        unsafe { device.bind_buffer_memory(buffer.buffer, memory.memory, 0)? };

        Ok(Self { buffer, memory })
    }

    pub fn destroy(&self, device: &Device) {
        self.buffer.destroy(device);
        self.memory.free(device);
    }
}

/// Batches buffer and image memory requirements behind one
/// `vkAllocateMemory` + `vkBindBufferMemory2`/`vkBindImageMemory2` pair, the
/// per-frame-suballocator redesign flag applied to one-shot scene/subsystem
/// setup rather than transient per-frame queues (those live in
/// `FrameArena`, see `lumen-renderer::frame`).
pub struct Allocator<'a> {
    device: &'a Device,
    flags: vk::MemoryPropertyFlags,
    type_bits: u32,
    cursor: vk::DeviceSize,
    buffer_offsets: Vec<(vk::Buffer, vk::DeviceSize)>,
    image_offsets: Vec<(vk::Image, vk::DeviceSize)>,
}

impl<'a> Allocator<'a> {
    pub fn new(device: &'a Device, flags: vk::MemoryPropertyFlags) -> Self {
        Self {
            device,
            flags,
            type_bits: u32::MAX,
            cursor: 0,
            buffer_offsets: Vec::new(),
            image_offsets: Vec::new(),
        }
    }

    pub fn alloc_buffer(&mut self, buffer: &Buffer) -> vk::DeviceSize {
        let requirements = buffer.memory_requirements(self.device);
        let offset = align_up(self.cursor, requirements.alignment);
        self.cursor = offset + requirements.size;
        self.type_bits &= requirements.memory_type_bits;
        self.buffer_offsets.push((buffer.buffer, offset));
        offset
    }

    pub fn alloc_image(&mut self, image: &Image) -> vk::DeviceSize {
        let requirements = image.memory_requirements(self.device);
        let offset = align_up(self.cursor, requirements.alignment);
        self.cursor = offset + requirements.size;
        self.type_bits &= requirements.memory_type_bits;
        self.image_offsets.push((image.image, offset));
        offset
    }

    pub fn finish(self) -> Result<Memory> {
        let memory = Memory::allocate(
            self.device,
            vk::MemoryRequirements {
                size: self.cursor,
                alignment: 1,
                memory_type_bits: self.type_bits,
            },
            self.flags,
        )?;

        if !self.buffer_offsets.is_empty() {
            let infos: Vec<_> = self
                .buffer_offsets
                .iter()
                .map(|(buffer, offset)| {
                    vk::BindBufferMemoryInfo::builder()
                        .buffer(*buffer)
                        .memory(memory.memory)
                        .memory_offset(*offset)
                        .build()
                })
                .collect();
            unsafe { self.device.bind_buffer_memory2(&infos)? };
        }

        if !self.image_offsets.is_empty() {
            let infos: Vec<_> = self
                .image_offsets
                .iter()
                .map(|(image, offset)| {
                    vk::BindImageMemoryInfo::builder()
                        .image(*image)
                        .memory(memory.memory)
                        .memory_offset(*offset)
                        .build()
                })
                .collect();
            unsafe { self.device.bind_image_memory2(&infos)? };
        }

        Ok(memory)
    }
}

fn align_up(value: vk::DeviceSize, align: vk::DeviceSize) -> vk::DeviceSize {
    (value + align - 1) & !(align - 1)
}
