use ash::vk;
use glam::Vec3;
use lumen_gpu::{Access, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};
use lumen_math::toroidal::{scroll_delta, toroidal_wrap};

use crate::error::{InitError, InitResult};

/// One concentric clipmap level: a fixed integer-resolution volume whose
/// world origin scrolls toroidally as the camera moves (`spec.md` 4.M).
/// `origin` is the voxel-grid coordinate of the volume's corner, tracked
/// separately from `offset`, the wrap-around write cursor into the
/// physical 3D texture, so relocating the window never needs a memory
/// copy.
#[derive(Debug, Clone, Copy)]
pub struct RadianceClipmapLevel {
    pub resolution: u32,
    pub voxel_size: f32,
    pub origin: [i32; 3],
    pub offset: [i32; 3],
}

impl RadianceClipmapLevel {
    pub fn new(resolution: u32, voxel_size: f32) -> Self {
        Self { resolution, voxel_size, origin: [0; 3], offset: [0; 3] }
    }

    /// Scrolls the level to center on `camera_pos`, snapped to this
    /// level's voxel grid, when the camera has moved at least
    /// `min_voxels_to_scroll` voxels on any axis (`spec.md` 4.M, default
    /// 4). Returns the set of voxel-space axes that moved so the caller
    /// can schedule re-injection for just the stale slab.
    pub fn scroll(&mut self, camera_pos: Vec3, min_voxels_to_scroll: i32) -> [i32; 3] {
        let new_origin = [
            (camera_pos.x / self.voxel_size).floor() as i32,
            (camera_pos.y / self.voxel_size).floor() as i32,
            (camera_pos.z / self.voxel_size).floor() as i32,
        ];
        let delta = scroll_delta(self.origin, new_origin);
        if delta.iter().all(|d| d.abs() < min_voxels_to_scroll) {
            return [0; 3];
        }

        self.offset = [
            toroidal_wrap(self.offset[0], delta[0], self.resolution as i32),
            toroidal_wrap(self.offset[1], delta[1], self.resolution as i32),
            toroidal_wrap(self.offset[2], delta[2], self.resolution as i32),
        ];
        self.origin = new_origin;
        delta
    }

    pub fn world_min(&self) -> Vec3 {
        Vec3::new(self.origin[0] as f32, self.origin[1] as f32, self.origin[2] as f32) * self.voxel_size
    }
}

/// Per-level irradiance SH volume plus its toroidal scroll state. Injection
/// reads screen probe results; sampling is trilinear against the
/// pre-integrated SH coefficients (`spec.md` 4.M).
pub struct RadianceCache {
    pub sh_volumes: Vec<Image>,
    pub levels: Vec<RadianceClipmapLevel>,
    inject: Pipeline,
    layout: PipelineLayout,
}

impl RadianceCache {
    pub fn create(
        device: &Device,
        level_count: u32,
        base_resolution: u32,
        base_voxel_size: f32,
        layout: PipelineLayout,
        inject_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let inject = Pipeline::create(device, &layout, PipelineKind::Compute { shader: inject_shader }).map_err(InitError::from)?;

        let mut sh_volumes = Vec::with_capacity(level_count as usize);
        let mut levels = Vec::with_capacity(level_count as usize);
        for level in 0..level_count {
            let resolution = base_resolution;
            let voxel_size = base_voxel_size * 2f32.powi(level as i32);
            let mut volume = Image::create(
                device,
                &ImageRequest {
                    extent: vk::Extent2D { width: resolution, height: resolution * resolution },
                    format: vk::Format::R16G16B16A16_SFLOAT,
                    mip_level_count: 1,
                    usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
                },
            )
            .map_err(InitError::from)?;
            volume.create_view(device, 0, 1).map_err(InitError::from)?;

            sh_volumes.push(volume);
            levels.push(RadianceClipmapLevel::new(resolution, voxel_size));
        }

        Ok(Self { sh_volumes, levels, inject, layout })
    }

    /// Scrolls every level and returns the indices of levels with a
    /// nonzero scroll delta this frame, i.e. the ones needing re-injection.
    pub fn scroll_all(&mut self, camera_pos: Vec3, min_voxels_to_scroll: i32) -> Vec<usize> {
        self.levels
            .iter_mut()
            .enumerate()
            .filter_map(|(i, level)| {
                let delta = level.scroll(camera_pos, min_voxels_to_scroll);
                (delta != [0; 3]).then_some(i)
            })
            .collect()
    }

    pub fn record_injection(&self, device: &Device, cmd: &mut CommandBuffer, dirty_levels: &[usize]) {
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.inject.pipeline);
        for &level in dirty_levels {
            let resolution = self.levels[level].resolution;
            cmd.ensure_image_layouts(
                device,
                &[(&self.sh_volumes[level], Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL)],
            );
            cmd.dispatch(device, div_ceil(resolution, 4), div_ceil(resolution, 4), div_ceil(resolution, 4));
        }
    }

    pub fn destroy(&mut self, device: &Device) {
        for volume in &mut self.sh_volumes {
            volume.destroy(device);
        }
        self.inject.destroy(device);
        self.layout.destroy(device);
    }
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrolling_less_than_the_threshold_is_a_no_op() {
        let mut level = RadianceClipmapLevel::new(32, 1.0);
        let delta = level.scroll(Vec3::new(1.0, 0.0, 0.0), 4);
        assert_eq!(delta, [0; 3]);
        assert_eq!(level.origin, [0; 3]);
    }

    #[test]
    fn scrolling_past_the_threshold_moves_the_origin_and_wraps_offset() {
        let mut level = RadianceClipmapLevel::new(32, 1.0);
        let delta = level.scroll(Vec3::new(5.0, 0.0, 0.0), 4);
        assert_eq!(delta[0], 5);
        assert_eq!(level.origin[0], 5);
        assert_eq!(level.offset[0], 5);
    }

    #[test]
    fn offset_wraps_within_resolution() {
        let mut level = RadianceClipmapLevel::new(8, 1.0);
        level.scroll(Vec3::new(30.0, 0.0, 0.0), 4);
        assert!(level.offset[0] >= 0 && level.offset[0] < 8);
    }

    #[test]
    fn coarser_levels_have_larger_voxels() {
        let levels = [RadianceClipmapLevel::new(32, 1.0), RadianceClipmapLevel::new(32, 2.0), RadianceClipmapLevel::new(32, 4.0)];
        for pair in levels.windows(2) {
            assert!(pair[1].voxel_size > pair[0].voxel_size);
        }
    }
}
