use ash::vk;
use lumen_gpu::{Access, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};

use crate::error::{InitError, InitResult};

/// Ray-traced shadow mask: one ray-gen dispatch per light against the
/// scene TLAS, then spatial and temporal denoising (`spec.md` 4.J). Only
/// constructed when `RenderConfig::enable_rt_shadows` is set and the
/// device reports ray-tracing support; absence of either means the
/// orchestrator never builds this subsystem at all rather than building
/// and disabling it (the "setter-initialized subsystems" redesign flag).
pub struct RayTracedShadows {
    raw_mask: Image,
    moments: [Image; 2],
    denoised: [Image; 2],
    ray_gen: Pipeline,
    spatial_denoise: Pipeline,
    temporal_denoise: Pipeline,
    layout: PipelineLayout,
    current: usize,
    pub spatial_passes: u32,
    pub temporal_alpha: f32,
}

impl RayTracedShadows {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        spatial_passes: u32,
        temporal_alpha: f32,
        layout: PipelineLayout,
        ray_gen_shader: vk::ShaderModule,
        spatial_denoise_shader: vk::ShaderModule,
        temporal_denoise_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let make = |format: vk::Format| -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest { extent, format, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };

        let ray_gen = Pipeline::create(device, &layout, PipelineKind::Compute { shader: ray_gen_shader }).map_err(InitError::from)?;
        let spatial_denoise = Pipeline::create(device, &layout, PipelineKind::Compute { shader: spatial_denoise_shader }).map_err(InitError::from)?;
        let temporal_denoise = Pipeline::create(device, &layout, PipelineKind::Compute { shader: temporal_denoise_shader }).map_err(InitError::from)?;

        Ok(Self {
            raw_mask: make(vk::Format::R8_UNORM)?,
            moments: [make(vk::Format::R16G16_SFLOAT)?, make(vk::Format::R16G16_SFLOAT)?],
            denoised: [make(vk::Format::R8_UNORM)?, make(vk::Format::R8_UNORM)?],
            ray_gen,
            spatial_denoise,
            temporal_denoise,
            layout,
            current: 0,
            spatial_passes,
            temporal_alpha,
        })
    }

    pub fn current_output(&self) -> &Image {
        &self.denoised[self.current]
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, light_count: u32) {
        cmd.ensure_image_layouts(device, &[(&self.raw_mask, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL)]);
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.ray_gen.pipeline);
        cmd.dispatch(device, div_ceil(self.raw_mask.extent.width, 8), div_ceil(self.raw_mask.extent.height, 8), light_count.max(1));

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.spatial_denoise.pipeline);
        for _ in 0..self.spatial_passes {
            cmd.pipeline_barriers(device, &[], &[]);
            cmd.dispatch(device, div_ceil(self.raw_mask.extent.width, 8), div_ceil(self.raw_mask.extent.height, 8), 1);
        }

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.temporal_denoise.pipeline);
        cmd.dispatch(device, div_ceil(self.raw_mask.extent.width, 8), div_ceil(self.raw_mask.extent.height, 8), 1);
    }

    pub fn destroy(&mut self, device: &Device) {
        self.raw_mask.destroy(device);
        self.moments[0].destroy(device);
        self.moments[1].destroy(device);
        self.denoised[0].destroy(device);
        self.denoised[1].destroy(device);
        self.ray_gen.destroy(device);
        self.spatial_denoise.destroy(device);
        self.temporal_denoise.destroy(device);
        self.layout.destroy(device);
    }
}

fn div_ceil(value: u32, denom: u32) -> u32 {
    (value + denom - 1) / denom
}

/// à-trous edge-stopping weight combining luminance, depth-slope, and
/// normal agreement (`spec.md` 4.J); each factor in `[0, 1]`, multiplied
/// together so any strong disagreement suppresses the sample.
pub fn edge_stopping_weight(luminance_diff: f32, depth_slope_diff: f32, normal_dot: f32, luminance_sigma: f32) -> f32 {
    let luminance_weight = (-(luminance_diff * luminance_diff) / (2.0 * luminance_sigma * luminance_sigma)).exp();
    let depth_weight = (1.0 - depth_slope_diff.min(1.0)).max(0.0);
    let normal_weight = normal_dot.max(0.0);
    luminance_weight * depth_weight * normal_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_samples_keep_full_weight() {
        let weight = edge_stopping_weight(0.0, 0.0, 1.0, 1.0);
        assert!((weight - 1.0).abs() < 1e-5);
    }

    #[test]
    fn disagreeing_normals_suppress_the_sample() {
        let weight = edge_stopping_weight(0.0, 0.0, -1.0, 1.0);
        assert_eq!(weight, 0.0);
    }

    #[test]
    fn large_luminance_difference_suppresses_the_sample() {
        let near = edge_stopping_weight(0.01, 0.0, 1.0, 0.1);
        let far = edge_stopping_weight(5.0, 0.0, 1.0, 0.1);
        assert!(far < near);
    }
}
