use ash::vk;
use lumen_gpu::{Access, Buffer, BufferKind, BufferRequest, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};

use crate::error::{InitError, InitResult};

pub const TILE_SIZE: u32 = 8;

pub fn tile_count(extent: vk::Extent2D) -> (u32, u32) {
    (div_ceil(extent.width, TILE_SIZE), div_ceil(extent.height, TILE_SIZE))
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

/// A single pixel queued for per-material shading: screen coordinates plus
/// the material id its tile-counting pass binned it under. Fixed 16-byte
/// layout per `spec.md` §6.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::NoUninit)]
pub struct PixelWorkItem {
    pub pixel_x: u32,
    pub pixel_y: u32,
    pub material_id: u32,
    pub _pad: u32,
}

impl PixelWorkItem {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

const _: () = assert!(PixelWorkItem::SIZE == 16);

/// One 8x8 tile's per-material pixel counts before compaction into
/// `PixelWorkItem` queues. Fixed 16-byte layout per `spec.md` §6.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::NoUninit)]
pub struct MaterialTile {
    pub tile_x: u32,
    pub tile_y: u32,
    pub material_count: u32,
    pub pixel_offset: u32,
}

impl MaterialTile {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

const _: () = assert!(MaterialTile::SIZE == 16);

/// G-Buffer attributes reconstructed from the visibility image: depth,
/// world normal, an albedo stub (overwritten by material evaluation),
/// material id, and screen-space velocity (`spec.md` 4.G).
pub struct GBuffer {
    pub normal: Image,
    pub albedo: Image,
    pub material_id: Image,
    pub velocity: Image,
}

impl GBuffer {
    pub fn create(device: &Device, extent: vk::Extent2D) -> InitResult<Self> {
        let make = |format: vk::Format| -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest {
                    extent,
                    format,
                    mip_level_count: 1,
                    usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
                },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };

        Ok(Self {
            normal: make(vk::Format::A2B10G10R10_UNORM_PACK32)?,
            albedo: make(vk::Format::R8G8B8A8_UNORM)?,
            material_id: make(vk::Format::R32_UINT)?,
            velocity: make(vk::Format::R16G16_SFLOAT)?,
        })
    }

    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.destroy(device);
        *self = Self::create(device, extent)?;
        Ok(())
    }

    pub fn destroy(&mut self, device: &Device) {
        self.normal.destroy(device);
        self.albedo.destroy(device);
        self.material_id.destroy(device);
        self.velocity.destroy(device);
    }
}

/// Resolves the packed visibility buffer into the G-Buffer, then bins
/// shaded pixels by material into coherent per-material work queues
/// (`spec.md` 4.G). Kept as two dispatches rather than one pass: resolving
/// and shading in the same kernel would lose texture coherence once
/// geometry is virtualized, since neighboring pixels could belong to
/// wildly different materials.
pub struct VisibilityResolve {
    resolve: Pipeline,
    tile_count_pass: Pipeline,
    material_dispatch: Pipeline,
    resolve_layout: PipelineLayout,
    binning_layout: PipelineLayout,
    pub material_tiles: Buffer,
    pub pixel_work_items: Buffer,
}

impl VisibilityResolve {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        resolve_layout: PipelineLayout,
        resolve_shader: vk::ShaderModule,
        binning_layout: PipelineLayout,
        tile_count_shader: vk::ShaderModule,
        material_dispatch_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let (tiles_x, tiles_y) = tile_count(extent);
        let max_material_tiles = (tiles_x * tiles_y) as vk::DeviceSize;
        let max_pixels = (extent.width * extent.height) as vk::DeviceSize;

        let material_tiles = Buffer::create(
            device,
            &BufferRequest {
                size: max_material_tiles * MaterialTile::SIZE as vk::DeviceSize,
                kind: BufferKind::Storage,
            },
        )
        .map_err(InitError::from)?;
        let pixel_work_items = Buffer::create(
            device,
            &BufferRequest {
                size: max_pixels * PixelWorkItem::SIZE as vk::DeviceSize,
                kind: BufferKind::Storage,
            },
        )
        .map_err(InitError::from)?;

        let resolve = Pipeline::create(device, &resolve_layout, PipelineKind::Compute { shader: resolve_shader })
            .map_err(InitError::from)?;
        let tile_count_pass = Pipeline::create(device, &binning_layout, PipelineKind::Compute { shader: tile_count_shader })
            .map_err(InitError::from)?;
        let material_dispatch = Pipeline::create(device, &binning_layout, PipelineKind::Compute { shader: material_dispatch_shader })
            .map_err(InitError::from)?;

        Ok(Self {
            resolve,
            tile_count_pass,
            material_dispatch,
            resolve_layout,
            binning_layout,
            material_tiles,
            pixel_work_items,
        })
    }

    /// Resizes the material/pixel queues for a new screen extent; the
    /// resolve/binning pipelines are extent-independent and kept as is.
    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.material_tiles.destroy(device);
        self.pixel_work_items.destroy(device);

        let (tiles_x, tiles_y) = tile_count(extent);
        self.material_tiles = Buffer::create(
            device,
            &BufferRequest { size: (tiles_x * tiles_y) as vk::DeviceSize * MaterialTile::SIZE as vk::DeviceSize, kind: BufferKind::Storage },
        )
        .map_err(InitError::from)?;
        self.pixel_work_items = Buffer::create(
            device,
            &BufferRequest { size: (extent.width * extent.height) as vk::DeviceSize * PixelWorkItem::SIZE as vk::DeviceSize, kind: BufferKind::Storage },
        )
        .map_err(InitError::from)?;
        Ok(())
    }

    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, visibility: &Image, gbuffer: &GBuffer) {
        cmd.ensure_image_layouts(
            device,
            &[
                (visibility, Access::COMPUTE_WRITE, Access::COMPUTE_READ, vk::ImageLayout::GENERAL),
                (&gbuffer.normal, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
                (&gbuffer.albedo, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
                (&gbuffer.material_id, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
                (&gbuffer.velocity, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
            ],
        );

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.resolve.pipeline);
        let (tiles_x, tiles_y) = tile_count(visibility.extent);
        cmd.dispatch(device, tiles_x, tiles_y, 1);

        cmd.pipeline_barriers(
            device,
            &[],
            &[lumen_gpu::BufferBarrier {
                buffer: self.material_tiles.buffer,
                src: Access::COMPUTE_WRITE,
                dst: Access::COMPUTE_READ,
            }],
        );

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.tile_count_pass.pipeline);
        cmd.dispatch(device, tiles_x, tiles_y, 1);

        cmd.pipeline_barriers(
            device,
            &[],
            &[
                lumen_gpu::BufferBarrier { buffer: self.material_tiles.buffer, src: Access::COMPUTE_WRITE, dst: Access::COMPUTE_READ },
                lumen_gpu::BufferBarrier { buffer: self.pixel_work_items.buffer, src: Access::COMPUTE_WRITE, dst: Access::COMPUTE_READ },
            ],
        );

        // Second kernel dispatches one workgroup per material batch for
        // coherent texture access; its dispatch dims come from the
        // compaction's own counters, never a host-side guess.
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.material_dispatch.pipeline);
        cmd.dispatch(device, tiles_x * tiles_y, 1, 1);
    }

    pub fn destroy(&mut self, device: &Device) {
        self.resolve.destroy(device);
        self.tile_count_pass.destroy(device);
        self.material_dispatch.destroy(device);
        self.resolve_layout.destroy(device);
        self.binning_layout.destroy(device);
        self.material_tiles.destroy(device);
        self.pixel_work_items.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_count_rounds_up_for_non_multiple_resolutions() {
        assert_eq!(tile_count(vk::Extent2D { width: 1920, height: 1080 }), (240, 135));
        assert_eq!(tile_count(vk::Extent2D { width: 9, height: 9 }), (2, 2));
    }

    #[test]
    fn pixel_work_item_and_material_tile_are_16_bytes() {
        assert_eq!(PixelWorkItem::SIZE, 16);
        assert_eq!(MaterialTile::SIZE, 16);
    }
}
