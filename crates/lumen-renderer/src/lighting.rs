use ash::vk;
use glam::Vec3;
use lumen_gpu::{Access, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};

use crate::error::{InitError, InitResult};

const MIN_ROUGHNESS: f32 = 0.045;

/// Trowbridge-Reitz (GGX) normal distribution term.
pub fn ggx_distribution(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness.max(MIN_ROUGHNESS).powi(2);
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (std::f32::consts::PI * denom * denom).max(1e-7)
}

/// Smith-Schlick-GGX geometric shadowing term (combined view+light).
pub fn ggx_geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = (roughness.max(MIN_ROUGHNESS) + 1.0).powi(2) / 8.0;
    let g_v = n_dot_v / (n_dot_v * (1.0 - k) + k);
    let g_l = n_dot_l / (n_dot_l * (1.0 - k) + k);
    g_v * g_l
}

/// Schlick's Fresnel approximation.
pub fn fresnel_schlick(cos_theta: f32, f0: Vec3) -> Vec3 {
    f0 + (Vec3::ONE - f0) * (1.0 - cos_theta).clamp(0.0, 1.0).powi(5)
}

/// Full Cook-Torrance GGX + Lambert BRDF evaluated against one light,
/// combined with the IBL irradiance/prefiltered-radiance terms via the
/// split-sum approximation (`spec.md` 4.Q).
pub fn shade(
    albedo: Vec3,
    metallic: f32,
    roughness: f32,
    normal: Vec3,
    view: Vec3,
    light_dir: Vec3,
    light_radiance: Vec3,
    irradiance: Vec3,
    prefiltered_radiance: Vec3,
    brdf_lut: Vec3,
) -> Vec3 {
    let n_dot_l = normal.dot(light_dir).max(0.0);
    let n_dot_v = normal.dot(view).max(1e-4);
    let half = (view + light_dir).normalize_or_zero();
    let n_dot_h = normal.dot(half).max(0.0);

    let f0 = Vec3::splat(0.04).lerp(albedo, metallic);
    let fresnel = fresnel_schlick(n_dot_v.min(1.0), f0);

    let d = ggx_distribution(n_dot_h, roughness);
    let g = ggx_geometry_smith(n_dot_v, n_dot_l, roughness);
    let specular = fresnel * d * g / (4.0 * n_dot_v * n_dot_l).max(1e-4);

    let k_diffuse = (Vec3::ONE - fresnel) * (1.0 - metallic);
    let diffuse = k_diffuse * albedo / std::f32::consts::PI;

    let direct = (diffuse + specular) * light_radiance * n_dot_l;
    let ambient_diffuse = k_diffuse * albedo * irradiance;
    let ambient_specular = (f0 * brdf_lut.x + Vec3::splat(brdf_lut.y)) * prefiltered_radiance;

    direct + ambient_diffuse + ambient_specular
}

/// ACES filmic fit (Narkowicz), one of the three selectable tonemap
/// operators (`spec.md` 4.Q).
pub fn tonemap_aces(color: Vec3) -> Vec3 {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    ((color * (color * a + Vec3::splat(b))) / (color * (color * c + Vec3::splat(d)) + Vec3::splat(e))).clamp(Vec3::ZERO, Vec3::ONE)
}

pub fn tonemap_uncharted2(color: Vec3) -> Vec3 {
    fn partial(x: Vec3) -> Vec3 {
        let (a, b, c, d, e, f) = (0.15, 0.50, 0.10, 0.20, 0.02, 0.30);
        (x * (x * a + Vec3::splat(c * b)) + Vec3::splat(d * e)) / (x * (x * a + Vec3::splat(b)) + Vec3::splat(d * f)) - Vec3::splat(e / f)
    }
    let exposure_bias = 2.0;
    let white_scale = Vec3::ONE / partial(Vec3::splat(11.2));
    (partial(color * exposure_bias) * white_scale).clamp(Vec3::ZERO, Vec3::ONE)
}

pub fn tonemap_uchimura(color: Vec3) -> Vec3 {
    let max_brightness = 1.0;
    let contrast = 1.0;
    let linear_start = 0.22;
    let linear_length = 0.4;

    let toe_weight = Vec3::ONE - smoothstep3(Vec3::ZERO, Vec3::splat(linear_start), color);
    let shoulder_weight = step3(Vec3::splat(linear_start + linear_length), color);
    let mid_weight = Vec3::ONE - toe_weight - shoulder_weight;

    let toe_part = color * (color / linear_start.max(1e-6));
    let mid_part = linear_start + contrast * (color - Vec3::splat(linear_start));

    (toe_weight * toe_part + mid_weight * mid_part + shoulder_weight * Vec3::splat(max_brightness)).clamp(Vec3::ZERO, Vec3::ONE)
}

fn smoothstep3(edge0: Vec3, edge1: Vec3, x: Vec3) -> Vec3 {
    vec3_map3(edge0, edge1, x, |e0, e1, v| {
        let t = ((v - e0) / (e1 - e0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    })
}

fn step3(edge: Vec3, x: Vec3) -> Vec3 {
    vec3_map3(edge, x, Vec3::ZERO, |e, v, _| if v < e { 0.0 } else { 1.0 })
}

fn vec3_map3(a: Vec3, b: Vec3, c: Vec3, f: impl Fn(f32, f32, f32) -> f32) -> Vec3 {
    Vec3::new(f(a.x, b.x, c.x), f(a.y, b.y, c.y), f(a.z, b.z, c.z))
}

/// Circle-of-confusion radius in pixels from depth relative to the focal
/// plane, used by the DOF blur/composite pass (`spec.md` 4.Q).
pub fn circle_of_confusion(depth: f32, focal_distance: f32, focal_range: f32, max_coc_px: f32) -> f32 {
    let signed = (depth - focal_distance) / focal_range.max(1e-4);
    (signed.clamp(-1.0, 1.0) * max_coc_px).abs()
}

/// Motion blur sample count scaled by screen-space velocity magnitude.
pub fn motion_blur_sample_count(velocity_px: f32, max_samples: u32) -> u32 {
    (velocity_px.clamp(0.0, max_samples as f32)).round() as u32
}

/// Vignette darkening factor from normalized screen-space distance to
/// center (`spec.md` 4.Q).
pub fn vignette(uv: glam::Vec2, intensity: f32, radius: f32) -> f32 {
    let dist = (uv - glam::Vec2::splat(0.5)).length();
    (1.0 - (dist / radius).clamp(0.0, 1.0) * intensity).clamp(0.0, 1.0)
}

/// Unsharp-mask sharpening: subtracts a blurred sample from the source,
/// scaled by `amount`.
pub fn sharpen(color: Vec3, blurred: Vec3, amount: f32) -> Vec3 {
    (color + (color - blurred) * amount).max(Vec3::ZERO)
}

/// Deferred lighting + the full post-process chain (`spec.md` 4.Q):
/// shading, auto-exposure, bloom, DOF, motion blur, tonemap, vignette,
/// grain, sharpen, optional FXAA. Each stage is its own compute pipeline
/// bound in sequence against the same command buffer.
pub struct DeferredLighting {
    pub hdr_output: Image,
    pub bloom_mips: Vec<Image>,
    pub exposure_histogram: lumen_gpu::Buffer,
    shading: Pipeline,
    auto_exposure: Pipeline,
    bloom_downsample: Pipeline,
    bloom_upsample: Pipeline,
    post_composite: Pipeline,
    layout: PipelineLayout,
    pub fxaa_enabled: bool,
}

impl DeferredLighting {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        bloom_mip_count: u32,
        fxaa_enabled: bool,
        layout: PipelineLayout,
        shading_shader: vk::ShaderModule,
        auto_exposure_shader: vk::ShaderModule,
        bloom_downsample_shader: vk::ShaderModule,
        bloom_upsample_shader: vk::ShaderModule,
        post_composite_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let mut hdr_output = Image::create(
            device,
            &ImageRequest { extent, format: vk::Format::R16G16B16A16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
        )
        .map_err(InitError::from)?;
        hdr_output.create_view(device, 0, 1).map_err(InitError::from)?;

        let mut bloom_mips = Vec::with_capacity(bloom_mip_count as usize);
        for level in 0..bloom_mip_count {
            let mip_extent = vk::Extent2D { width: (extent.width >> (level + 1)).max(1), height: (extent.height >> (level + 1)).max(1) };
            let mut mip = Image::create(
                device,
                &ImageRequest { extent: mip_extent, format: vk::Format::R16G16B16A16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
            )
            .map_err(InitError::from)?;
            mip.create_view(device, 0, 1).map_err(InitError::from)?;
            bloom_mips.push(mip);
        }

        let exposure_histogram = lumen_gpu::Buffer::create(
            device,
            &lumen_gpu::BufferRequest { size: 256 * 4, kind: lumen_gpu::BufferKind::Storage },
        )
        .map_err(InitError::from)?;

        let shading = Pipeline::create(device, &layout, PipelineKind::Compute { shader: shading_shader }).map_err(InitError::from)?;
        let auto_exposure = Pipeline::create(device, &layout, PipelineKind::Compute { shader: auto_exposure_shader }).map_err(InitError::from)?;
        let bloom_downsample = Pipeline::create(device, &layout, PipelineKind::Compute { shader: bloom_downsample_shader }).map_err(InitError::from)?;
        let bloom_upsample = Pipeline::create(device, &layout, PipelineKind::Compute { shader: bloom_upsample_shader }).map_err(InitError::from)?;
        let post_composite = Pipeline::create(device, &layout, PipelineKind::Compute { shader: post_composite_shader }).map_err(InitError::from)?;

        Ok(Self {
            hdr_output,
            bloom_mips,
            exposure_histogram,
            shading,
            auto_exposure,
            bloom_downsample,
            bloom_upsample,
            post_composite,
            layout,
            fxaa_enabled,
        })
    }

    /// Recreates the HDR output and bloom mip chain at a new extent. The
    /// exposure histogram buffer is resolution-independent and untouched.
    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.hdr_output.destroy(device);
        for mip in &mut self.bloom_mips {
            mip.destroy(device);
        }

        let mut hdr_output = Image::create(
            device,
            &ImageRequest { extent, format: vk::Format::R16G16B16A16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
        )
        .map_err(InitError::from)?;
        hdr_output.create_view(device, 0, 1).map_err(InitError::from)?;

        let mip_count = self.bloom_mips.len() as u32;
        let mut bloom_mips = Vec::with_capacity(mip_count as usize);
        for level in 0..mip_count {
            let mip_extent = vk::Extent2D { width: (extent.width >> (level + 1)).max(1), height: (extent.height >> (level + 1)).max(1) };
            let mut mip = Image::create(
                device,
                &ImageRequest { extent: mip_extent, format: vk::Format::R16G16B16A16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
            )
            .map_err(InitError::from)?;
            mip.create_view(device, 0, 1).map_err(InitError::from)?;
            bloom_mips.push(mip);
        }

        self.hdr_output = hdr_output;
        self.bloom_mips = bloom_mips;
        Ok(())
    }

    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, gi_composite: &Image) {
        cmd.ensure_image_layouts(
            device,
            &[
                (gi_composite, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (&self.hdr_output, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
            ],
        );

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.shading.pipeline);
        cmd.dispatch(device, div_ceil(self.hdr_output.extent.width, 8), div_ceil(self.hdr_output.extent.height, 8), 1);

        cmd.pipeline_barriers(
            device,
            &[],
            &[lumen_gpu::BufferBarrier { buffer: self.exposure_histogram.buffer, src: Access::COMPUTE_WRITE, dst: Access::COMPUTE_READ }],
        );
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.auto_exposure.pipeline);
        cmd.dispatch(device, 1, 1, 1);

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.bloom_downsample.pipeline);
        for mip in &self.bloom_mips {
            cmd.pipeline_barriers(device, &[], &[]);
            cmd.dispatch(device, div_ceil(mip.extent.width, 8), div_ceil(mip.extent.height, 8), 1);
        }

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.bloom_upsample.pipeline);
        for mip in self.bloom_mips.iter().rev() {
            cmd.pipeline_barriers(device, &[], &[]);
            cmd.dispatch(device, div_ceil(mip.extent.width, 8), div_ceil(mip.extent.height, 8), 1);
        }

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.post_composite.pipeline);
        cmd.dispatch(device, div_ceil(self.hdr_output.extent.width, 8), div_ceil(self.hdr_output.extent.height, 8), 1);
    }

    pub fn destroy(&mut self, device: &Device) {
        self.hdr_output.destroy(device);
        for mip in &mut self.bloom_mips {
            mip.destroy(device);
        }
        self.exposure_histogram.destroy(device);
        self.shading.destroy(device);
        self.auto_exposure.destroy(device);
        self.bloom_downsample.destroy(device);
        self.bloom_upsample.destroy(device);
        self.post_composite.destroy(device);
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
    fn rougher_surfaces_spread_the_ggx_lobe() {
        let sharp = ggx_distribution(1.0, 0.1);
        let rough = ggx_distribution(1.0, 0.9);
        assert!(sharp > rough);
    }

    #[test]
    fn grazing_angles_increase_fresnel_reflectance() {
        let f0 = Vec3::splat(0.04);
        let head_on = fresnel_schlick(1.0, f0);
        let grazing = fresnel_schlick(0.05, f0);
        assert!(grazing.x > head_on.x);
    }

    #[test]
    fn tonemap_operators_stay_within_display_range() {
        let bright = Vec3::splat(20.0);
        assert!(tonemap_aces(bright).max_element() <= 1.0001);
        assert!(tonemap_uncharted2(bright).max_element() <= 1.0001);
    }

    #[test]
    fn coc_grows_away_from_the_focal_plane() {
        let at_focus = circle_of_confusion(10.0, 10.0, 5.0, 16.0);
        let far = circle_of_confusion(40.0, 10.0, 5.0, 16.0);
        assert_eq!(at_focus, 0.0);
        assert!(far > at_focus);
    }

    #[test]
    fn vignette_darkens_toward_the_edges() {
        let center = vignette(glam::Vec2::splat(0.5), 1.0, 0.7);
        let edge = vignette(glam::Vec2::new(0.0, 0.0), 1.0, 0.7);
        assert!(edge < center);
    }

    #[test]
    fn sharpen_amplifies_high_frequency_detail() {
        let color = Vec3::splat(0.6);
        let blurred = Vec3::splat(0.5);
        let sharpened = sharpen(color, blurred, 1.0);
        assert!(sharpened.x > color.x);
    }
}
