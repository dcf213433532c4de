use ash::vk;
use lumen_gpu::{Access, CommandBuffer, Device, Image, ImageRequest, Pipeline, PipelineKind, PipelineLayout};

use crate::error::{InitError, InitResult};

/// Outcome of one hierarchical HZB march step: either the ray descended
/// into a finer mip because its current cell was occupied, stepped to a
/// coarser mip because the cell was empty, or left the pyramid entirely
/// (`spec.md` 4.N).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarchStep {
    Descend,
    Ascend,
    OutOfBounds,
}

/// One iteration of the hierarchical SSR march: given the current mip and
/// whether the HZB cell the ray occupies is empty (farther than the ray),
/// decides whether to go coarser (empty cell, cheap skip) or finer
/// (occupied cell, refine toward the exact hit).
pub fn march_step(current_mip: u32, max_mip: u32, cell_is_empty: bool, in_bounds: bool) -> MarchStep {
    if !in_bounds {
        return MarchStep::OutOfBounds;
    }
    if cell_is_empty && current_mip < max_mip {
        MarchStep::Ascend
    } else {
        MarchStep::Descend
    }
}

/// Cone angle (radians) grown from a roughness value for the reflection
/// cone trace; rougher surfaces get wider cones so more of the HZB/SDF
/// chain's hierarchy is skipped (`spec.md` 4.N).
pub fn roughness_to_cone_angle(roughness: f32) -> f32 {
    roughness.clamp(0.0, 1.0) * (std::f32::consts::FRAC_PI_2 * 0.5)
}

/// Whether a miss against the HZB should fall through to the global SDF
/// cascade trace (always, unless tracing is disabled) versus taking the
/// sky miss color directly.
pub fn should_fall_through_to_sdf(hzb_miss: bool, sdf_trace_enabled: bool) -> bool {
    hzb_miss && sdf_trace_enabled
}

/// Hierarchical screen-space reflection/AO tracer: marches the HZB,
/// falls through to the global SDF cascades on a miss, and writes a
/// combined specular+AO result (`spec.md` 4.N).
pub struct ScreenSpaceTracer {
    output: Image,
    hierarchical_march: Pipeline,
    sdf_fallback: Pipeline,
    layout: PipelineLayout,
}

impl ScreenSpaceTracer {
    pub fn create(
        device: &Device,
        extent: vk::Extent2D,
        layout: PipelineLayout,
        hierarchical_march_shader: vk::ShaderModule,
        sdf_fallback_shader: vk::ShaderModule,
    ) -> InitResult<Self> {
        let mut output = Image::create(
            device,
            &ImageRequest {
                extent,
                format: vk::Format::R16G16B16A16_SFLOAT,
                mip_level_count: 1,
                usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
            },
        )
        .map_err(InitError::from)?;
        output.create_view(device, 0, 1).map_err(InitError::from)?;

        let hierarchical_march = Pipeline::create(device, &layout, PipelineKind::Compute { shader: hierarchical_march_shader }).map_err(InitError::from)?;
        let sdf_fallback = Pipeline::create(device, &layout, PipelineKind::Compute { shader: sdf_fallback_shader }).map_err(InitError::from)?;

        Ok(Self { output, hierarchical_march, sdf_fallback, layout })
    }

    pub fn output(&self) -> &Image {
        &self.output
    }

    pub fn resize(&mut self, device: &Device, extent: vk::Extent2D) -> InitResult<()> {
        self.output.destroy(device);
        let mut output = Image::create(
            device,
            &ImageRequest { extent, format: vk::Format::R16G16B16A16_SFLOAT, mip_level_count: 1, usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED },
        )
        .map_err(InitError::from)?;
        output.create_view(device, 0, 1).map_err(InitError::from)?;
        self.output = output;
        Ok(())
    }

    pub fn record(&self, device: &Device, cmd: &mut CommandBuffer, hzb: &Image) {
        cmd.ensure_image_layouts(
            device,
            &[
                (hzb, Access::NONE, Access::COMPUTE_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (&self.output, Access::NONE, Access::COMPUTE_WRITE, vk::ImageLayout::GENERAL),
            ],
        );

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.hierarchical_march.pipeline);
        cmd.dispatch(device, div_ceil(self.output.extent.width, 8), div_ceil(self.output.extent.height, 8), 1);

        cmd.pipeline_barriers(device, &[], &[]);

        cmd.bind_pipeline(device, vk::PipelineBindPoint::COMPUTE, self.sdf_fallback.pipeline);
        cmd.dispatch(device, div_ceil(self.output.extent.width, 8), div_ceil(self.output.extent.height, 8), 1);
    }

    pub fn destroy(&mut self, device: &Device) {
        self.output.destroy(device);
        self.hierarchical_march.destroy(device);
        self.sdf_fallback.destroy(device);
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
    fn empty_cell_below_the_mip_ceiling_ascends() {
        assert_eq!(march_step(2, 8, true, true), MarchStep::Ascend);
    }

    #[test]
    fn occupied_cell_descends_to_refine() {
        assert_eq!(march_step(4, 8, false, true), MarchStep::Descend);
    }

    #[test]
    fn empty_cell_at_the_mip_ceiling_still_descends() {
        assert_eq!(march_step(8, 8, true, true), MarchStep::Descend);
    }

    #[test]
    fn leaving_the_screen_always_reports_out_of_bounds() {
        assert_eq!(march_step(3, 8, true, false), MarchStep::OutOfBounds);
    }

    #[test]
    fn rougher_surfaces_get_wider_cones() {
        assert!(roughness_to_cone_angle(0.9) > roughness_to_cone_angle(0.1));
        assert_eq!(roughness_to_cone_angle(0.0), 0.0);
    }

    #[test]
    fn sdf_fallback_only_fires_on_a_genuine_hzb_miss() {
        assert!(should_fall_through_to_sdf(true, true));
        assert!(!should_fall_through_to_sdf(false, true));
        assert!(!should_fall_through_to_sdf(true, false));
    }
}
