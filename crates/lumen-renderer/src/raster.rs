use ash::vk;
use lumen_gpu::{
    Access, Buffer, BufferKind, BufferRequest, CommandBuffer, Device, Image, ImageRequest,
    Pipeline, PipelineKind, PipelineLayout,
};

use crate::error::{InitError, InitResult};

pub const VISIBILITY_FORMAT_64BIT: vk::Format = vk::Format::R64_UINT;
pub const VISIBILITY_FORMAT_EMULATED: vk::Format = vk::Format::R32G32_UINT;

/// Screen-footprint threshold router (`spec.md` 4.F): triangles at or
/// under `sw_threshold_px2` go to the software path, everything else to
/// hardware mesh-shader batches. `sw_threshold_px2` defaults to 32*32 per
/// `RenderConfig`.
pub fn route_triangle(bbox_area_px2: f32, sw_threshold_px2: f32) -> RasterPath {
    if bbox_area_px2 <= sw_threshold_px2 {
        RasterPath::Software
    } else {
        RasterPath::Hardware
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterPath {
    Software,
    Hardware,
}

pub fn triangle_bbox_area_px2(screen_positions: [glam::Vec2; 3]) -> f32 {
    let min = screen_positions[0].min(screen_positions[1]).min(screen_positions[2]);
    let max = screen_positions[0].max(screen_positions[1]).max(screen_positions[2]);
    let size = (max - min).max(glam::Vec2::ZERO);
    size.x * size.y
}

/// Whether the running device supports 64-bit image atomics; selected at
/// init from `DeviceCapabilities` and fixed for the renderer's lifetime
/// (switching formats mid-stream would require recreating every
/// visibility-consuming pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityFormat {
    Atomic64,
    EmulatedSplit32,
}

impl VisibilityFormat {
    pub fn select(atomic_64_bit_image: bool) -> Self {
        if atomic_64_bit_image {
            VisibilityFormat::Atomic64
        } else {
            VisibilityFormat::EmulatedSplit32
        }
    }

    pub fn image_format(self) -> vk::Format {
        match self {
            VisibilityFormat::Atomic64 => VISIBILITY_FORMAT_64BIT,
            VisibilityFormat::EmulatedSplit32 => VISIBILITY_FORMAT_EMULATED,
        }
    }
}

/// Triangle binning output: a bounded SW triangle queue and a per-cluster
/// HW batch queue, plus the indirect dispatch args each path reads.
/// Overflow on either queue drops surplus triangles and flags a
/// `FrameDiagnostic`, never aborting the frame (`spec.md` §7).
pub struct RasterQueues {
    pub sw_triangles: Buffer,
    pub hw_batches: Buffer,
    pub sw_indirect: Buffer,
    pub hw_indirect: Buffer,
}

impl RasterQueues {
    pub fn create(device: &Device, max_sw_triangles: u32, max_hw_batches: u32) -> InitResult<Self> {
        let make = |size: vk::DeviceSize| -> InitResult<Buffer> {
            Buffer::create(device, &BufferRequest { size, kind: BufferKind::Storage })
                .map_err(InitError::from)
        };
        Ok(Self {
            sw_triangles: make(max_sw_triangles as vk::DeviceSize * 16)?,
            hw_batches: make(max_hw_batches as vk::DeviceSize * 8)?,
            sw_indirect: make(std::mem::size_of::<vk::DispatchIndirectCommand>() as vk::DeviceSize)?,
            hw_indirect: make(std::mem::size_of::<vk::DrawMeshTasksIndirectCommandEXT>() as vk::DeviceSize)?,
        })
    }

    pub fn destroy(&self, device: &Device) {
        self.sw_triangles.destroy(device);
        self.hw_batches.destroy(device);
        self.sw_indirect.destroy(device);
        self.hw_indirect.destroy(device);
    }
}

/// The hybrid rasterizer: a binning compute pass, an SW compute
/// rasterizer writing packed visibility by atomic-max, and an HW
/// task+mesh+fragment pipeline writing the same packed visibility image
/// (`spec.md` 4.F).
pub struct Rasterizer {
    pub visibility: Image,
    pub depth: Image,
    pub motion_vectors: Image,
    format: VisibilityFormat,
    binning: Pipeline,
    sw_raster: Pipeline,
    hw_raster: Pipeline,
    binning_layout: PipelineLayout,
    sw_layout: PipelineLayout,
    hw_layout: PipelineLayout,
}

impl Rasterizer {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        format: VisibilityFormat,
        binning_layout: PipelineLayout,
        binning_shader: vk::ShaderModule,
        sw_layout: PipelineLayout,
        sw_shader: vk::ShaderModule,
        hw_layout: PipelineLayout,
        hw_task_shader: Option<vk::ShaderModule>,
        hw_mesh_shader: vk::ShaderModule,
        hw_fragment_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let mut visibility = Image::create(
            device,
            &ImageRequest {
                extent,
                format: format.image_format(),
                mip_level_count: 1,
                usage: vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;
        visibility.create_view(device, 0, 1).map_err(InitError::from)?;

        let mut depth = Image::create(
            device,
            &ImageRequest {
                extent,
                format: vk::Format::D32_SFLOAT,
                mip_level_count: 1,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;
        depth.create_view(device, 0, 1).map_err(InitError::from)?;

        let mut motion_vectors = Image::create(
            device,
            &ImageRequest {
                extent,
                format: vk::Format::R16G16_SFLOAT,
                mip_level_count: 1,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;
        motion_vectors.create_view(device, 0, 1).map_err(InitError::from)?;

        let binning = Pipeline::create(device, &binning_layout, PipelineKind::Compute { shader: binning_shader })
            .map_err(InitError::from)?;
        let sw_raster = Pipeline::create(device, &sw_layout, PipelineKind::Compute { shader: sw_shader })
            .map_err(InitError::from)?;
        let hw_raster = Pipeline::create(
            device,
            &hw_layout,
            PipelineKind::Mesh {
                task: hw_task_shader,
                mesh: hw_mesh_shader,
                fragment: hw_fragment_shader,
                color_formats: vec![format.image_format()],
                depth_format: Some(vk::Format::D32_SFLOAT),
            },
        )
        .map_err(InitError::from)?;

        Ok(Self {
            visibility,
            depth,
            motion_vectors,
            format,
            binning,
            sw_raster,
            hw_raster,
            binning_layout,
            sw_layout,
            hw_layout,
        })
    }

    pub fn format(&self) -> VisibilityFormat {
        self.format
    }

    /// Recreates the visibility/depth/motion-vector images at a new
    /// extent, leaving the binning/SW/HW pipelines untouched.
    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.visibility.destroy(device);
        self.depth.destroy(device);
        self.motion_vectors.destroy(device);

        let mut visibility = Image::create(
            device,
            &ImageRequest {
                extent,
                format: self.format.image_format(),
                mip_level_count: 1,
                usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;
        visibility.create_view(device, 0, 1).map_err(InitError::from)?;

        let mut depth = Image::create(
            device,
            &ImageRequest { extent, format: vk::Format::D32_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED },
        )
        .map_err(InitError::from)?;
        depth.create_view(device, 0, 1).map_err(InitError::from)?;

        let mut motion_vectors = Image::create(
            device,
            &ImageRequest { extent, format: vk::Format::R16G16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED },
        )
        .map_err(InitError::from)?;
        motion_vectors.create_view(device, 0, 1).map_err(InitError::from)?;

        self.visibility = visibility;
        self.depth = depth;
        self.motion_vectors = motion_vectors;
        Ok(())
    }

    pub fn record_binning(&self, device: &Device, cmd: &CommandBuffer, visible_cluster_count: u32) {
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.binning.pipeline);
        cmd.dispatch(device, div_ceil(visible_cluster_count, 64), 1, 1);
    }

    pub fn record_sw_pass(&self, device: &Device, cmd: &mut CommandBuffer, sw_indirect: &Buffer) {
        cmd.ensure_image_layouts(
            device,
            &[(&self.visibility, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL)],
        );
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.sw_raster.pipeline);
        let _ = sw_indirect;
        // Indirect dispatch: dims sourced from the binning counters, never
        // an uninitialized host-side count (spec.md §9 Open Question).
        unsafe { device.cmd_dispatch_indirect(cmd.raw, sw_indirect.buffer, 0) };
    }

    pub fn record_hw_pass(&self, device: &Device, cmd: &mut CommandBuffer, hw_indirect: &Buffer) {
        cmd.bind_pipeline(device, vk::PipelineBindPoint::GRAPHICS, self.hw_raster.pipeline);
        unsafe {
            device
                .mesh_shader_loader
                .cmd_draw_mesh_tasks_indirect(cmd.raw, hw_indirect.buffer, 0, 1, 0)
        };
    }

    pub fn destroy(&mut self, device: &Device) {
        self.visibility.destroy(device);
        self.depth.destroy(device);
        self.motion_vectors.destroy(device);
        self.binning.destroy(device);
        self.sw_raster.destroy(device);
        self.hw_raster.destroy(device);
        self.binning_layout.destroy(device);
        self.sw_layout.destroy(device);
        self.hw_layout.destroy(device);
    }
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn small_triangle_routes_to_software() {
        let area = triangle_bbox_area_px2([Vec2::ZERO, Vec2::new(4.0, 0.0), Vec2::new(0.0, 4.0)]);
        assert_eq!(route_triangle(area, 32.0 * 32.0), RasterPath::Software);
    }

    #[test]
    fn large_triangle_routes_to_hardware() {
        let area = triangle_bbox_area_px2([Vec2::ZERO, Vec2::new(200.0, 0.0), Vec2::new(0.0, 200.0)]);
        assert_eq!(route_triangle(area, 32.0 * 32.0), RasterPath::Hardware);
    }

    #[test]
    fn routing_is_monotonic_at_the_threshold_crossover() {
        let threshold = 32.0 * 32.0;
        assert_eq!(route_triangle(threshold, threshold), RasterPath::Software);
        assert_eq!(route_triangle(threshold + 0.01, threshold), RasterPath::Hardware);
    }

    #[test]
    fn emulated_format_selected_without_64_bit_atomics() {
        assert_eq!(VisibilityFormat::select(false), VisibilityFormat::EmulatedSplit32);
        assert_eq!(VisibilityFormat::select(true), VisibilityFormat::Atomic64);
    }
}
