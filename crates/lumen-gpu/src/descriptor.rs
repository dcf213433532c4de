use crate::device::Device;
use crate::error::Result;
use crate::resources::{Buffer, BufferKind, BufferRequest, Memory};
use ash::vk;

#[derive(Clone, Copy)]
pub struct LayoutBinding {
    pub ty: vk::DescriptorType,
    pub count: u32,
}

#[derive(Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<LayoutBinding>,
}

impl DescriptorLayoutBuilder {
    pub fn binding(mut self, ty: vk::DescriptorType) -> Self {
        self.bindings.push(LayoutBinding { ty, count: 1 });
        self
    }

    pub fn array_binding(mut self, ty: vk::DescriptorType, count: u32) -> Self {
        self.bindings.push(LayoutBinding { ty, count });
        self
    }

    pub fn build(self, device: &Device) -> Result<DescriptorLayout> {
        let vk_bindings: Vec<_> = self
            .bindings
            .iter()
            .enumerate()
            .map(|(i, binding)| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(i as u32)
                    .descriptor_type(binding.ty)
                    .descriptor_count(binding.count)
                    .stage_flags(vk::ShaderStageFlags::ALL)
                    .build()
            })
            .collect();

        let info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&vk_bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER_EXT);

        let layout = unsafe { device.create_descriptor_set_layout(&info, None)? };

        let size = unsafe {
            device
                .descriptor_buffer_loader
                .get_descriptor_set_layout_size(layout)
        };

        Ok(DescriptorLayout {
            layout,
            bindings: self.bindings,
            size,
        })
    }
}

pub struct DescriptorLayout {
    pub layout: vk::DescriptorSetLayout,
    pub bindings: Vec<LayoutBinding>,
    pub size: vk::DeviceSize,
}

impl DescriptorLayout {
    pub fn binding_offset(&self, device: &Device, binding: u32) -> vk::DeviceSize {
        unsafe {
            device
                .descriptor_buffer_loader
                .get_descriptor_set_layout_binding_offset(self.layout, binding)
        }
    }

    pub fn destroy(&self, device: &Device) {
        unsafe { device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Growable, alignment-aware byte buffer a `DescriptorLayout`'s descriptors
/// get written into before upload — the host-side staging area for a
/// `DescriptorBuffer`.
pub struct DescriptorData {
    bytes: Vec<u8>,
    alignment: vk::DeviceSize,
}

impl DescriptorData {
    pub fn new(device: &Device) -> Self {
        Self {
            bytes: Vec::new(),
            alignment: device
                .descriptor_buffer_properties
                .descriptor_buffer_offset_alignment,
        }
    }

    pub fn reserve_for_layout(&mut self, layout: &DescriptorLayout) -> vk::DeviceSize {
        let align = self.alignment as usize;
        let aligned = (self.bytes.len() + align - 1) / align * align;
        self.bytes.resize(aligned + layout.size as usize, 0);
        aligned as vk::DeviceSize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Device-local buffer backing every bound descriptor set in the scene,
/// built with `VK_EXT_descriptor_buffer` so binding a resource table is a
/// single `vkCmdSetDescriptorBufferOffsetsEXT` rather than updating sets.
pub struct DescriptorBuffer {
    pub buffer: Buffer,
    pub memory: Memory,
    pub address: vk::DeviceAddress,
}

impl DescriptorBuffer {
    pub fn create(device: &Device, data: &DescriptorData) -> Result<Self> {
        let buffer = Buffer::create(
            device,
            &BufferRequest {
                size: data.as_bytes().len().max(1) as vk::DeviceSize,
                kind: BufferKind::Descriptor { sampler: false },
            },
        )?;

        let requirements = buffer.memory_requirements(device);
        let memory = Memory::allocate(
            device,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        unsafe { device.bind_buffer_memory(buffer.buffer, memory.memory, 0)? };

        let address = buffer.device_address(device);

        Ok(Self {
            buffer,
            memory,
            address,
        })
    }

    pub fn destroy(&self, device: &Device) {
        self.buffer.destroy(device);
        self.memory.free(device);
    }
}

/// Writes individual descriptors into a `DescriptorData` staging buffer at
/// the binding offsets a `DescriptorLayout` computed.
pub struct DescriptorBuilder<'a> {
    device: &'a Device,
    layout: &'a DescriptorLayout,
    base_offset: vk::DeviceSize,
    data: &'a mut DescriptorData,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(
        device: &'a Device,
        layout: &'a DescriptorLayout,
        base_offset: vk::DeviceSize,
        data: &'a mut DescriptorData,
    ) -> Self {
        Self {
            device,
            layout,
            base_offset,
            data,
        }
    }

    fn write_descriptor(&mut self, binding: u32, info: &vk::DescriptorGetInfoEXT, size: usize) {
        let offset = self.base_offset + self.layout.binding_offset(self.device, binding);
        let dst = &mut self.data.bytes[offset as usize..offset as usize + size];
        unsafe {
            self.device
                .descriptor_buffer_loader
                .get_descriptor(info, dst);
        }
    }

    pub fn storage_buffer(&mut self, binding: u32, address: vk::DeviceAddress, range: vk::DeviceSize) {
        let addr_info = vk::DescriptorAddressInfoEXT::builder()
            .address(address)
            .range(range);
        let mut data = vk::DescriptorDataEXT::default();
        data.p_storage_buffer = &*addr_info as *const _ as *mut _;
        let info = vk::DescriptorGetInfoEXT::builder()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .data(data);
        let size = self
            .device
            .descriptor_buffer_properties
            .storage_buffer_descriptor_size;
        self.write_descriptor(binding, &info, size);
    }

    pub fn uniform_buffer(&mut self, binding: u32, address: vk::DeviceAddress, range: vk::DeviceSize) {
        let addr_info = vk::DescriptorAddressInfoEXT::builder()
            .address(address)
            .range(range);
        let mut data = vk::DescriptorDataEXT::default();
        data.p_uniform_buffer = &*addr_info as *const _ as *mut _;
        let info = vk::DescriptorGetInfoEXT::builder()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .data(data);
        let size = self
            .device
            .descriptor_buffer_properties
            .uniform_buffer_descriptor_size;
        self.write_descriptor(binding, &info, size);
    }

    pub fn storage_image(&mut self, binding: u32, image_info: vk::DescriptorImageInfo) {
        let mut data = vk::DescriptorDataEXT::default();
        data.p_storage_image = &image_info as *const _ as *mut _;
        let info = vk::DescriptorGetInfoEXT::builder()
            .ty(vk::DescriptorType::STORAGE_IMAGE)
            .data(data);
        let size = self
            .device
            .descriptor_buffer_properties
            .storage_image_descriptor_size;
        self.write_descriptor(binding, &info, size);
    }

    pub fn combined_image_sampler(&mut self, binding: u32, image_info: vk::DescriptorImageInfo) {
        let mut data = vk::DescriptorDataEXT::default();
        data.p_combined_image_sampler = &image_info as *const _ as *mut _;
        let info = vk::DescriptorGetInfoEXT::builder()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .data(data);
        let size = self
            .device
            .descriptor_buffer_properties
            .combined_image_sampler_descriptor_size;
        self.write_descriptor(binding, &info, size);
    }

    pub fn tlas(&mut self, binding: u32, address: vk::DeviceAddress) {
        let mut data = vk::DescriptorDataEXT::default();
        data.acceleration_structure = address;
        let info = vk::DescriptorGetInfoEXT::builder()
            .ty(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            .data(data);
        let size = self
            .device
            .descriptor_buffer_properties
            .acceleration_structure_descriptor_size;
        self.write_descriptor(binding, &info, size);
    }
}
