use crate::error::{GpuError, Result};
use crate::instance::Instance;
use ash::extensions::{ext, khr};
use ash::vk;
use std::ffi::CStr;

/// Capability toggles resolved at device-selection time. `RenderConfig`
/// (in `lumen-renderer`) asks for these; anything unsupported downgrades
/// the corresponding subsystem rather than failing device creation, except
/// dynamic rendering, synchronization2, and mesh shaders, which are
/// required unconditionally by the core frame pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCapabilities {
    pub descriptor_buffer: bool,
    pub ray_tracing: bool,
    pub atomic_64_bit_image: bool,
}

/// Wraps `ash::Device` plus the extension function loaders and physical
/// device properties the renderer needs every frame.
pub struct Device {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family_index: u32,
    pub queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub command_pool: vk::CommandPool,
    pub descriptor_buffer_loader: ext::DescriptorBuffer,
    pub acc_struct_loader: khr::AccelerationStructure,
    pub mesh_shader_loader: ext::MeshShader,
    pub descriptor_buffer_properties: vk::PhysicalDeviceDescriptorBufferPropertiesEXT,
    pub limits: vk::PhysicalDeviceLimits,
    pub capabilities: DeviceCapabilities,
}

impl Device {
    pub fn new(instance: &Instance, surface: Option<vk::SurfaceKHR>) -> Result<Self> {
        let physical_devices = unsafe { instance.instance.enumerate_physical_devices()? };

        let physical_device = physical_devices
            .iter()
            .copied()
            .find(|device| {
                let props = unsafe { instance.instance.get_physical_device_properties(*device) };
                props.api_version >= vk::API_VERSION_1_3
                    && props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
            })
            .or_else(|| {
                physical_devices.iter().copied().find(|device| {
                    let props =
                        unsafe { instance.instance.get_physical_device_properties(*device) };
                    props.api_version >= vk::API_VERSION_1_3
                })
            })
            .ok_or(GpuError::NoSuitableDevice)?;

        let queue_family_index = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        }
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .ok_or(GpuError::NoSuitableDevice)? as u32;

        let _ = surface;

        // Query what the physical device actually supports before deciding
        // which of the optional extensions to enable and what
        // `DeviceCapabilities` to report; only dynamic rendering,
        // synchronization2, and mesh shaders are assumed unconditionally.
        let mut queried_descriptor_buffer =
            vk::PhysicalDeviceDescriptorBufferFeaturesEXT::default();
        let mut queried_acc_struct = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
        let mut queried_ray_query = vk::PhysicalDeviceRayQueryFeaturesKHR::default();
        let mut queried_atomic_int64 =
            vk::PhysicalDeviceShaderImageAtomicInt64FeaturesEXT::default();
        let mut queried_features2 = vk::PhysicalDeviceFeatures2::builder()
            .push_next(&mut queried_descriptor_buffer)
            .push_next(&mut queried_acc_struct)
            .push_next(&mut queried_ray_query)
            .push_next(&mut queried_atomic_int64);
        unsafe {
            instance
                .instance
                .get_physical_device_features2(physical_device, &mut queried_features2)
        };

        let supports_descriptor_buffer = queried_descriptor_buffer.descriptor_buffer == vk::TRUE;
        let supports_ray_tracing =
            queried_acc_struct.acceleration_structure == vk::TRUE && queried_ray_query.ray_query == vk::TRUE;
        let supports_atomic_64_bit_image = queried_atomic_int64.shader_image_int64_atomics == vk::TRUE;

        let mut extension_names: Vec<*const i8> = vec![
            khr::Swapchain::name().as_ptr(),
            ext::MeshShader::name().as_ptr(),
        ];
        if supports_descriptor_buffer {
            extension_names.push(ext::DescriptorBuffer::name().as_ptr());
        }
        if supports_ray_tracing {
            extension_names.push(khr::DeferredHostOperations::name().as_ptr());
            extension_names.push(khr::AccelerationStructure::name().as_ptr());
            extension_names.push(khr::RayTracingPipeline::name().as_ptr());
            extension_names.push(CStr::from_bytes_with_nul(b"VK_KHR_ray_query\0").unwrap().as_ptr());
        }
        if supports_atomic_64_bit_image {
            extension_names.push(
                CStr::from_bytes_with_nul(b"VK_EXT_shader_image_atomic_int64\0")
                    .unwrap()
                    .as_ptr(),
            );
        }

        let queue_priorities = [1.0];
        let queue_info = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)
            .build()];

        let mut features13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .synchronization2(true)
            .maintenance4(true);

        let mut features12 = vk::PhysicalDeviceVulkan12Features::builder()
            .buffer_device_address(true)
            .descriptor_binding_variable_descriptor_count(true)
            .runtime_descriptor_array(true)
            .draw_indirect_count(true)
            .storage_buffer8_bit_access(true)
            .shader_float16(true)
            .shader_int8(true)
            .sampler_filter_minmax(true)
            .scalar_block_layout(true);

        let mut features11 = vk::PhysicalDeviceVulkan11Features::builder()
            .storage_buffer16_bit_access(true)
            .uniform_and_storage_buffer16_bit_access(true)
            .shader_draw_parameters(true);

        let mut mesh_shader_features = vk::PhysicalDeviceMeshShaderFeaturesEXT::builder()
            .task_shader(true)
            .mesh_shader(true);

        let mut descriptor_buffer_features =
            vk::PhysicalDeviceDescriptorBufferFeaturesEXT::builder()
                .descriptor_buffer(supports_descriptor_buffer)
                .descriptor_buffer_image_layout_ignored(supports_descriptor_buffer);

        let mut acc_struct_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::builder()
                .acceleration_structure(supports_ray_tracing);

        let mut ray_query_features =
            vk::PhysicalDeviceRayQueryFeaturesKHR::builder().ray_query(supports_ray_tracing);

        let mut atomic_int64_features = vk::PhysicalDeviceShaderImageAtomicInt64FeaturesEXT::builder()
            .shader_image_int64_atomics(supports_atomic_64_bit_image);

        let features = vk::PhysicalDeviceFeatures::builder()
            .independent_blend(true)
            .multi_draw_indirect(true)
            .pipeline_statistics_query(true)
            .sampler_anisotropy(true)
            .geometry_shader(true)
            .shader_int16(true)
            .shader_int64(true);

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_info)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features11)
            .push_next(&mut features12)
            .push_next(&mut features13)
            .push_next(&mut mesh_shader_features);
        if supports_descriptor_buffer {
            create_info = create_info.push_next(&mut descriptor_buffer_features);
        }
        if supports_ray_tracing {
            create_info = create_info.push_next(&mut acc_struct_features).push_next(&mut ray_query_features);
        }
        if supports_atomic_64_bit_image {
            create_info = create_info.push_next(&mut atomic_int64_features);
        }

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)?
        };

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical_device)
        };

        let limits = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        }
        .limits;

        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )?
        };

        let descriptor_buffer_loader = ext::DescriptorBuffer::new(&instance.instance, &device);
        let acc_struct_loader = khr::AccelerationStructure::new(&instance.instance, &device);
        let mesh_shader_loader = ext::MeshShader::new(&instance.instance, &device);

        let mut descriptor_buffer_properties =
            vk::PhysicalDeviceDescriptorBufferPropertiesEXT::default();
        let mut props2 =
            vk::PhysicalDeviceProperties2::builder().push_next(&mut descriptor_buffer_properties);
        unsafe {
            instance
                .instance
                .get_physical_device_properties2(physical_device, &mut props2)
        };

        Ok(Self {
            instance: instance.instance.clone(),
            physical_device,
            device,
            queue_family_index,
            queue,
            memory_properties,
            command_pool,
            descriptor_buffer_loader,
            acc_struct_loader,
            mesh_shader_loader,
            descriptor_buffer_properties,
            limits,
            capabilities: DeviceCapabilities {
                descriptor_buffer: supports_descriptor_buffer,
                ray_tracing: supports_ray_tracing,
                atomic_64_bit_image: supports_atomic_64_bit_image,
            },
        })
    }

    pub fn wait_until_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(GpuError::from)
    }

    pub fn destroy(&self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
    }
}

impl std::ops::Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
