use ash::vk;
use glam::Vec3;
use lumen_gpu::{Access, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};

use crate::error::{InitError, InitResult};

/// Combines the three GI contributors into one radiance sample: probe
/// diffuse, radiance-cache irradiance, and roughness-gated specular from
/// the screen-space tracer (`spec.md` 4.P).
pub fn combine_contributors(probe_diffuse: Vec3, radiance_cache_irradiance: Vec3, ssr_specular: Vec3, roughness: f32, ssr_roughness_threshold: f32) -> Vec3 {
    let diffuse = probe_diffuse + radiance_cache_irradiance;
    if roughness <= ssr_roughness_threshold {
        diffuse + ssr_specular
    } else {
        diffuse
    }
}

/// Exponential luminance-weighted temporal blend: disoccluded or
/// fast-changing pixels lean toward the current frame, stable ones toward
/// history (`spec.md` 4.P).
pub fn temporal_blend(current: Vec3, history: Vec3, history_valid: bool, base_alpha: f32) -> Vec3 {
    if !history_valid {
        return current;
    }
    let current_luma = luminance(current);
    let history_luma = luminance(history);
    let luma_delta = (current_luma - history_luma).abs() / current_luma.max(history_luma).max(1e-4);
    let alpha = (base_alpha * (1.0 - luma_delta)).clamp(0.0, base_alpha);
    current * (1.0 - alpha) + history * alpha
}

fn luminance(color: Vec3) -> f32 {
    color.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

/// Per-pixel GI gather + temporal filter, composited into the HDR target
/// consumed by deferred lighting (`spec.md` 4.P).
pub struct GiComposer {
    pub composite: Image,
    pub history: [Image; 2],
    gather: Pipeline,
    temporal_filter: Pipeline,
    layout: PipelineLayout,
    current: usize,
    pub ssr_roughness_threshold: f32,
}

impl GiComposer {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        ssr_roughness_threshold: f32,
        layout: PipelineLayout,
        gather_shader: vk::ShaderModule,
        temporal_filter_shader: vk::ShaderModule,
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

        let gather = Pipeline::create(device, &layout, PipelineKind::Compute { shader: gather_shader }).map_err(InitError::from)?;
        let temporal_filter = Pipeline::create(device, &layout, PipelineKind::Compute { shader: temporal_filter_shader }).map_err(InitError::from)?;

        Ok(Self {
            composite: make(vk::Format::R16G16B16A16_SFLOAT)?,
            history: [make(vk::Format::R16G16B16A16_SFLOAT)?, make(vk::Format::R16G16B16A16_SFLOAT)?],
            gather,
            temporal_filter,
            layout,
            current: 0,
            ssr_roughness_threshold,
        })
    }

    pub fn previous_history(&self) -> &Image {
        &self.history[1 - self.current]
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.composite.destroy(device);
        self.history[0].destroy(device);
        self.history[1].destroy(device);

        let make = |format: vk::Format| -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest { extent, format, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };
        self.composite = make(vk::Format::R16G16B16A16_SFLOAT)?;
        self.history = [make(vk::Format::R16G16B16A16_SFLOAT)?, make(vk::Format::R16G16B16A16_SFLOAT)?];
        self.current = 0;
        Ok(())
    }

    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, probe_atlas: &Image, radiance_cache: &Image, ssr_output: &Image) {
        cmd.ensure_image_layouts(
            device,
            &[
                (probe_atlas, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (radiance_cache, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (ssr_output, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (&self.composite, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
            ],
        );

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.gather.pipeline);
        cmd.dispatch(device, div_ceil(self.composite.extent.width, 8), div_ceil(self.composite.extent.height, 8), 1);

        cmd.pipeline_barriers(device, &[], &[]);

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.temporal_filter.pipeline);
        cmd.dispatch(device, div_ceil(self.composite.extent.width, 8), div_ceil(self.composite.extent.height, 8), 1);
    }

    pub fn destroy(&mut self, device: &Device) {
        self.composite.destroy(device);
        self.history[0].destroy(device);
        self.history[1].destroy(device);
        self.gather.destroy(device);
        self.temporal_filter.destroy(device);
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
    fn rough_surfaces_drop_the_ssr_term() {
        let diffuse_only = combine_contributors(Vec3::ONE, Vec3::ZERO, Vec3::splat(5.0), 0.9, 0.5);
        let with_ssr = combine_contributors(Vec3::ONE, Vec3::ZERO, Vec3::splat(5.0), 0.1, 0.5);
        assert_eq!(diffuse_only, Vec3::ONE);
        assert_eq!(with_ssr, Vec3::ONE + Vec3::splat(5.0));
    }

    #[test]
    fn invalid_history_takes_the_current_frame_outright() {
        let result = temporal_blend(Vec3::splat(0.5), Vec3::splat(10.0), false, 0.95);
        assert_eq!(result, Vec3::splat(0.5));
    }

    #[test]
    fn stable_luminance_leans_toward_history() {
        let current = Vec3::splat(0.5);
        let history = Vec3::splat(0.5);
        let result = temporal_blend(current, history, true, 0.9);
        assert!((result - history).length() < 1e-5);
    }

    #[test]
    fn large_luminance_jumps_lean_toward_the_current_frame() {
        let current = Vec3::splat(1.0);
        let history = Vec3::splat(0.01);
        let result = temporal_blend(current, history, true, 0.9);
        assert!((result - current).length() < (result - history).length());
    }
}
