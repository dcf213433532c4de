use ash::vk;
use glam::{Mat4, Vec2, Vec3};
use lumen_gpu::{Access, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};
use lumen_math::halton::halton_jitter;

use crate::error::{InitError, InitResult};

/// Sub-pixel jitter offset for frame `frame_index`, drawn from Halton(2,3)
/// modulo `sequence_len` (8-16, `spec.md` 4.H), scaled into NDC offsets of
/// `jitter * 2 / resolution`.
pub fn jitter_offset(frame_index: u32, sequence_len: u32, resolution: Vec2) -> Vec2 {
    let (jx, jy) = halton_jitter(frame_index, sequence_len);
    Vec2::new((jx - 0.5) * 2.0 / resolution.x, (jy - 0.5) * 2.0 / resolution.y)
}

/// Offsets a projection matrix's third column (x/y of the translation part
/// in clip space) by the jitter so rasterization happens at a jittered
/// sample position while the unjittered matrix is retained separately for
/// reprojection math.
pub fn jitter_projection(proj: Mat4, offset: Vec2) -> Mat4 {
    let mut jittered = proj;
    jittered.z_axis.x += offset.x;
    jittered.z_axis.y += offset.y;
    jittered
}

/// Variance-clips a history sample to the box `[mean - k*stddev, mean +
/// k*stddev]` computed over the current frame's 3x3 neighborhood
/// (`spec.md` 4.H). `k` defaults to 1.25.
pub fn variance_clip(history: Vec3, mean: Vec3, stddev: Vec3, k: f32) -> Vec3 {
    let min = mean - stddev * k;
    let max = mean + stddev * k;
    history.clamp(min, max)
}

/// Temporal feedback weight from velocity magnitude in pixels: fast motion
/// trusts the current frame more (`feedback_min`), static content trusts
/// history more (`feedback_max`).
pub fn feedback_alpha(velocity_px: f32, feedback_min: f32, feedback_max: f32) -> f32 {
    let t = (velocity_px / 4.0).clamp(0.0, 1.0);
    feedback_max + (feedback_min - feedback_max) * t
}

pub fn mean_and_stddev(samples: &[Vec3; 9]) -> (Vec3, Vec3) {
    let mean = samples.iter().copied().fold(Vec3::ZERO, |a, b| a + b) / samples.len() as f32;
    let variance = samples
        .iter()
        .map(|s| (*s - mean) * (*s - mean))
        .fold(Vec3::ZERO, |a, b| a + b)
        / samples.len() as f32;
    (mean, Vec3::new(variance.x.sqrt(), variance.y.sqrt(), variance.z.sqrt()))
}

/// TAA history + resolve pipeline. History is double-buffered; the
/// orchestrator swaps which is "previous" at `end_frame` rather than
/// copying (`spec.md` §5 ordering rule).
pub struct TemporalSystem {
    history: [Image; 2],
    resolve: Pipeline,
    layout: PipelineLayout,
    current: usize,
    pub sequence_len: u32,
}

impl TemporalSystem {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        sequence_len: u32,
        layout: PipelineLayout,
        resolve_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let make_history = || -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest {
                    extent,
                    format: vk::Format::R16G16B16A16_SFLOAT,
                    mip_level_count: 1,
                    usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
                },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };

        let resolve = Pipeline::create(device, &layout, PipelineKind::Compute { shader: resolve_shader })
            .map_err(InitError::from)?;

        Ok(Self {
            history: [make_history()?, make_history()?],
            resolve,
            layout,
            current: 0,
            sequence_len,
        })
    }

    pub fn previous_history(&self) -> &Image {
        &self.history[1 - self.current]
    }

    pub fn current_history(&self) -> &Image {
        &self.history[self.current]
    }

    /// Called once at `end_frame`; the buffer written this frame becomes
    /// next frame's "previous" without any copy.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Rebuilds both history buffers at a new extent. History content is
    /// necessarily discarded; the next frame starts with invalid history,
    /// same as a camera cut.
    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.history[0].destroy(device);
        self.history[1].destroy(device);

        let make_history = || -> InitResult<Image> {
            let mut image = Image::create(
                device,
                &ImageRequest { extent, format: vk::Format::R16G16B16A16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
            )
            .map_err(InitError::from)?;
            image.create_view(device, 0, 1).map_err(InitError::from)?;
            Ok(image)
        };
        self.history = [make_history()?, make_history()?];
        self.current = 0;
        Ok(())
    }

    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, color: &Image) {
        cmd.ensure_image_layouts(
            device,
            &[
                (color, Access::COMPUTE_WRITE, Access::COMPUTE_READ, vk::ImageLayout::GENERAL),
                (self.previous_history(), Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (self.current_history(), Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
            ],
        );
        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.resolve.pipeline);
        cmd.dispatch(
            device,
            div_ceil(color.extent.width, 8),
            div_ceil(color.extent.height, 8),
            1,
        );
    }

    pub fn destroy(&mut self, device: &Device) {
        self.history[0].destroy(device);
        self.history[1].destroy(device);
        self.resolve.destroy(device);
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
    fn jitter_offset_is_bounded_by_two_pixels() {
        let resolution = Vec2::new(1920.0, 1080.0);
        for i in 0..16 {
            let offset = jitter_offset(i, 16, resolution);
            assert!(offset.x.abs() <= 2.0 / resolution.x);
            assert!(offset.y.abs() <= 2.0 / resolution.y);
        }
    }

    #[test]
    fn variance_clip_is_identity_within_box() {
        let mean = Vec3::splat(0.5);
        let stddev = Vec3::splat(0.1);
        let history = Vec3::splat(0.52);
        assert_eq!(variance_clip(history, mean, stddev, 1.25), history);
    }

    #[test]
    fn variance_clip_rejects_outliers() {
        let mean = Vec3::splat(0.5);
        let stddev = Vec3::splat(0.05);
        let history = Vec3::splat(10.0);
        let clipped = variance_clip(history, mean, stddev, 1.25);
        assert!(clipped.x < 1.0);
    }

    #[test]
    fn fast_motion_lowers_feedback_toward_feedback_min() {
        let slow = feedback_alpha(0.0, 0.6, 0.97);
        let fast = feedback_alpha(100.0, 0.6, 0.97);
        assert!(fast < slow);
        assert_eq!(fast, 0.6);
        assert_eq!(slow, 0.97);
    }

    #[test]
    fn mean_and_stddev_of_uniform_samples_has_zero_stddev() {
        let samples = [Vec3::splat(0.3); 9];
        let (mean, stddev) = mean_and_stddev(&samples);
        assert_eq!(mean, Vec3::splat(0.3));
        assert_eq!(stddev, Vec3::ZERO);
    }
}
