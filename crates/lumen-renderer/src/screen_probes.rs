use ash::vk;
use glam::{Vec2, Vec3};
use lumen_gpu::{Access, Buffer, BufferKind, BufferRequest, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};
use lumen_math::halton::halton_jitter;
use lumen_math::octahedral;

use crate::error::{InitError, InitResult};

pub const TILE_SIZE: u32 = 8;
pub const PROBE_BLOCK_SIDE: u32 = 8;
pub const DEFAULT_RAYS_PER_PROBE: u32 = 64;

pub fn tile_count(extent: vk::Extent2D) -> (u32, u32) {
    (div_ceil(extent.width, TILE_SIZE), div_ceil(extent.height, TILE_SIZE))
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

/// Low-discrepancy jitter position of a probe inside its tile, in
/// `[0, tile_size)` pixel offsets (`spec.md` 4.L).
pub fn probe_jitter_offset(tile_index: u32, tile_size: u32) -> Vec2 {
    let (jx, jy) = halton_jitter(tile_index, 16);
    Vec2::new((jx + 0.5) * tile_size as f32, (jy + 0.5) * tile_size as f32)
}

/// Direction of ray `i` of `rays_per_probe` importance-sampled around a
/// cosine-weighted hemisphere oriented by `normal`, via a Hammersley-style
/// low-discrepancy pair driven off the same Halton base as the jitter.
pub fn probe_ray_direction(ray_index: u32, rays_per_probe: u32, normal: Vec3) -> Vec3 {
    let (u, v) = halton_jitter(ray_index, rays_per_probe.max(1));
    let u = u + 0.5;
    let v = v + 0.5;
    let radius = u.sqrt();
    let theta = 2.0 * std::f32::consts::PI * v;
    let local = Vec3::new(radius * theta.cos(), radius * theta.sin(), (1.0 - u).max(0.0).sqrt());

    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(normal).normalize();
    let bitangent = normal.cross(tangent);
    (tangent * local.x + bitangent * local.y + normal * local.z).normalize()
}

/// Bilinear weight for screen interpolation favoring probes whose normal
/// and depth agree with the shaded pixel (`spec.md` 4.L).
pub fn interpolation_weight(bilinear_weight: f32, normal_dot: f32, depth_diff: f32, depth_sigma: f32) -> f32 {
    let normal_weight = normal_dot.max(0.0).powf(8.0);
    let depth_weight = (-(depth_diff * depth_diff) / (2.0 * depth_sigma * depth_sigma)).exp();
    bilinear_weight * normal_weight * depth_weight
}

/// Flattened atlas texel for probe `probe_index`'s octahedral sample
/// `direction`, given `atlas_width_in_probes` probes per atlas row.
pub fn atlas_texel(probe_index: u32, direction: Vec3, atlas_width_in_probes: u32) -> (u32, u32) {
    let (local_u, local_v) = octahedral::block_texel(octahedral::encode(direction), PROBE_BLOCK_SIDE);
    let probe_x = probe_index % atlas_width_in_probes;
    let probe_y = probe_index / atlas_width_in_probes;
    (probe_x * PROBE_BLOCK_SIDE + local_u, probe_y * PROBE_BLOCK_SIDE + local_v)
}

/// Per-tile probe placement, ray tracing, and the octahedral radiance
/// atlas it accumulates into, plus the depth-aware blur filter pass
/// (`spec.md` 4.L).
pub struct ScreenProbes {
    pub radiance_atlas: Image,
    pub filtered_atlas: Image,
    pub probe_positions: Buffer,
    placement: Pipeline,
    trace: Pipeline,
    filter: Pipeline,
    layout: PipelineLayout,
    pub rays_per_probe: u32,
    atlas_width_in_probes: u32,
}

impl ScreenProbes {
    pub fn create(
        device: &Device,
        screen_extent: vk::Extent2D,
        rays_per_probe: u32,
        layout: PipelineLayout,
        placement_shader: vk::ShaderModule,
        trace_shader: vk::ShaderModule,
        filter_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let (tiles_x, tiles_y) = tile_count(screen_extent);
        let atlas_extent = vk::Extent2D {
            width: tiles_x * PROBE_BLOCK_SIDE,
            height: tiles_y * PROBE_BLOCK_SIDE,
        };

        let make_atlas = || -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest {
                    extent: atlas_extent,
                    format: vk::Format::R16G16B16A16_SFLOAT,
                    mip_level_count: 1,
                    usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
                },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };

        let probe_positions = Buffer::create(
            device,
            &BufferRequest {
                size: (tiles_x * tiles_y) as vk::DeviceSize * 16,
                kind: BufferKind::Storage,
            },
        )
        .map_err(InitError::from)?;

        let placement = Pipeline::create(device, &layout, PipelineKind::Compute { shader: placement_shader }).map_err(InitError::from)?;
        let trace = Pipeline::create(device, &layout, PipelineKind::Compute { shader: trace_shader }).map_err(InitError::from)?;
        let filter = Pipeline::create(device, &layout, PipelineKind::Compute { shader: filter_shader }).map_err(InitError::from)?;

        Ok(Self {
            radiance_atlas: make_atlas()?,
            filtered_atlas: make_atlas()?,
            probe_positions,
            placement,
            trace,
            filter,
            layout,
            rays_per_probe,
            atlas_width_in_probes: tiles_x,
        })
    }

    pub fn atlas_width_in_probes(&self) -> u32 {
        self.atlas_width_in_probes
    }

    pub fn resize(&mut self, device: &Device, screen_extent: vk::Extent2D) -> InitResult<()> {
        self.radiance_atlas.destroy(device);
        self.filtered_atlas.destroy(device);
        self.probe_positions.destroy(device);

        let (tiles_x, tiles_y) = tile_count(screen_extent);
        let atlas_extent = vk::Extent2D { width: tiles_x * PROBE_BLOCK_SIDE, height: tiles_y * PROBE_BLOCK_SIDE };

        let make_atlas = || -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest { extent: atlas_extent, format: vk::Format::R16G16B16A16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };

        self.radiance_atlas = make_atlas()?;
        self.filtered_atlas = make_atlas()?;
        self.probe_positions = Buffer::create(
            device,
            &BufferRequest { size: (tiles_x * tiles_y) as vk::DeviceSize * 16, kind: BufferKind::Storage },
        )
        .map_err(InitError::from)?;
        self.atlas_width_in_probes = tiles_x;
        Ok(())
    }

    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, depth: &Image, normal: &Image) {
        let (tiles_x, tiles_y) = (self.atlas_width_in_probes, self.radiance_atlas.extent.height / PROBE_BLOCK_SIDE);

        cmd.ensure_image_layouts(
            device,
            &[
                (depth, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (normal, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (&self.radiance_atlas, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
                (&self.filtered_atlas, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
            ],
        );

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.placement.pipeline);
        cmd.dispatch(device, tiles_x, tiles_y, 1);

        cmd.pipeline_barriers(
            device,
            &[],
            &[lumen_gpu::BufferBarrier { buffer: self.probe_positions.buffer, src: Access::COMPUTE_WRITE, dst: Access::COMPUTE_READ }],
        );

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.trace.pipeline);
        cmd.dispatch(device, tiles_x, tiles_y, 1);

        cmd.pipeline_barriers(device, &[], &[]);

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.filter.pipeline);
        cmd.dispatch(device, tiles_x, tiles_y, 1);
    }

    pub fn destroy(&mut self, device: &Device) {
        self.radiance_atlas.destroy(device);
        self.filtered_atlas.destroy(device);
        self.probe_positions.destroy(device);
        self.placement.destroy(device);
        self.trace.destroy(device);
        self.filter.destroy(device);
        self.layout.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_jitter_stays_inside_tile() {
        for i in 0..64 {
            let offset = probe_jitter_offset(i, TILE_SIZE);
            assert!(offset.x >= 0.0 && offset.x <= TILE_SIZE as f32);
            assert!(offset.y >= 0.0 && offset.y <= TILE_SIZE as f32);
        }
    }

    #[test]
    fn ray_directions_stay_in_the_hemisphere_around_normal() {
        let normal = Vec3::Z;
        for i in 0..DEFAULT_RAYS_PER_PROBE {
            let dir = probe_ray_direction(i, DEFAULT_RAYS_PER_PROBE, normal);
            assert!(dir.dot(normal) >= -1e-4, "ray {i} went below the hemisphere: {dir:?}");
        }
    }

    #[test]
    fn matching_normal_and_depth_gives_highest_weight() {
        let best = interpolation_weight(1.0, 1.0, 0.0, 0.1);
        let mismatched_normal = interpolation_weight(1.0, 0.0, 0.0, 0.1);
        let mismatched_depth = interpolation_weight(1.0, 1.0, 5.0, 0.1);
        assert!(best > mismatched_normal);
        assert!(best > mismatched_depth);
    }

    #[test]
    fn atlas_texel_is_bounded_by_the_block_for_its_probe() {
        let (x, y) = atlas_texel(5, Vec3::new(0.2, 0.3, 0.9).normalize(), 10);
        assert_eq!(x / PROBE_BLOCK_SIDE, 5);
        assert_eq!(y / PROBE_BLOCK_SIDE, 0);
    }
}
