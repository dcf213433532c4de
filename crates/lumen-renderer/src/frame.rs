use ash::vk;
use lumen_gpu::{CommandBuffer, Device};

use crate::cull::{CullFlags, CullPushConstants, CullQueues, Culler};
use crate::error::{ResizeError, ResizeResult};
use crate::gi::GiComposer;
use crate::hzb::HzbBuilder;
use crate::lighting::DeferredLighting;
use crate::radiance_cache::RadianceCache;
use crate::raster::{RasterQueues, Rasterizer};
use crate::rt_shadows::RayTracedShadows;
use crate::screen_probes::ScreenProbes;
use crate::sdf::SdfRegistry;
use crate::sstrace::ScreenSpaceTracer;
use crate::stats::StatsAggregator;
use crate::surface_cache::SurfaceCache;
use crate::temporal::TemporalSystem;
use crate::traits::FrameContext;
use crate::visibility_resolve::{GBuffer, VisibilityResolve};
use crate::vsm::{directional_light_view_projection, VirtualShadowMaps};

/// The sun's VSM clipmap is always light index 0; other shadow-casting
/// lights are out of scope for the per-frame directional recentering call
/// (`spec.md` 4.I scopes the clipmap hierarchy to the directional light).
const SUN_LIGHT_INDEX: u32 = 0;
/// Half-extent in world units of the sun's shadow clipmap footprint around
/// the camera; not yet sourced from scene bounds (`spec.md` §9 Open
/// Question).
const SUN_SHADOW_HALF_EXTENT: f32 = 50.0;
/// Pages marked per clipmap level per frame, in each axis, around the
/// recentered footprint.
const SUN_SHADOW_FOOTPRINT_PAGES: u32 = 4;

/// The non-optional subsystem set every configuration builds (`spec.md`
/// 4.C-4.H): cluster culling, hybrid rasterization, visibility resolve,
/// and the temporal resolve. Everything past this is gated by
/// `RenderConfig` and constructed or omitted wholesale by the caller
/// before handing its pieces to [`FrameOrchestrator::new`] (the
/// "setter-initialized subsystems" redesign flag: a disabled subsystem is
/// never built half-configured, it simply does not exist).
pub struct CoreSubsystems {
    pub hzb: HzbBuilder,
    pub culler: Culler,
    pub cull_queues: CullQueues,
    pub rasterizer: Rasterizer,
    pub raster_queues: RasterQueues,
    pub visibility_resolve: VisibilityResolve,
    pub gbuffer: GBuffer,
    pub temporal: TemporalSystem,
    pub lighting: DeferredLighting,
}

/// Everything behind a `RenderConfig` toggle. Each field is `None` when
/// its feature is disabled or unsupported, never a built-but-inert value.
#[derive(Default)]
pub struct OptionalSubsystems {
    pub vsm: Option<VirtualShadowMaps>,
    pub rt_shadows: Option<RayTracedShadows>,
    pub surface_cache: Option<SurfaceCache>,
    pub screen_probes: Option<ScreenProbes>,
    pub radiance_cache: Option<RadianceCache>,
    pub sdf_registry: Option<SdfRegistry>,
    pub sstrace: Option<ScreenSpaceTracer>,
    pub gi: Option<GiComposer>,
}

/// Owns the frame index, history cycle indices, and the ordered sequence
/// of subsystem calls (`spec.md` 4.R). Every barrier between stages is
/// either inserted here or delegated to the subsystem whose output the
/// next stage consumes; nothing above this module hand-places a barrier.
pub struct FrameOrchestrator {
    core: CoreSubsystems,
    optional: OptionalSubsystems,
    stats: StatsAggregator,
    frame_index: u32,
    extent: vk::Extent2D,
}

impl FrameOrchestrator {
    pub fn new(extent: vk::Extent2D, core: CoreSubsystems, optional: OptionalSubsystems) -> Self {
        Self { core, optional, stats: StatsAggregator::default(), frame_index: 0, extent }
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Records one frame's worth of subsystem passes in dependency order.
    /// `instance_count` and `light_count` come from the caller's
    /// [`SceneSource`](crate::traits::SceneSource) snapshot for this frame.
    pub fn record_frame(&mut self, device: &Device, cmd: &mut CommandBuffer, frame: &FrameContext, instance_count: u32, light_count: u32) {
        self.stats.reset_for_frame();

        self.core.cull_queues.reset(device, cmd);

        let main_push_constants = CullPushConstants::new(
            &frame.camera,
            self.extent.width as f32,
            self.extent.height as f32,
            1.0,
            instance_count,
            instance_count,
            frame.frame_index,
            CullFlags::empty(),
        );
        self.core.culler.record_main_pass(device, cmd, &main_push_constants, instance_count);

        self.core.rasterizer.record_binning(device, cmd, instance_count);
        self.core.rasterizer.record_sw_pass(device, cmd, &self.core.raster_queues.sw_indirect);
        self.core.rasterizer.record_hw_pass(device, cmd, &self.core.raster_queues.hw_indirect);

        // Rebuild the HZB from this frame's own depth, then run the post
        // pass so anything the main pass occluded against *last* frame's
        // HZB but that is newly visible gets rasterized within this frame
        // (`spec.md` 4.E two-pass culling).
        self.core.hzb.record(device, cmd, &self.core.rasterizer.depth);
        self.core.culler.barrier_between_passes(device, cmd, &self.core.cull_queues);
        let post_push_constants = CullPushConstants::new(
            &frame.camera,
            self.extent.width as f32,
            self.extent.height as f32,
            1.0,
            instance_count,
            instance_count,
            frame.frame_index,
            CullFlags::POST_PASS,
        );
        self.core.culler.record_post_pass(device, cmd, &post_push_constants, instance_count);
        self.core.rasterizer.record_binning(device, cmd, instance_count);
        self.core.rasterizer.record_sw_pass(device, cmd, &self.core.raster_queues.sw_indirect);
        self.core.rasterizer.record_hw_pass(device, cmd, &self.core.raster_queues.hw_indirect);

        self.core
            .visibility_resolve
            .record(device, cmd, &self.core.rasterizer.visibility, &self.core.gbuffer);

        if let Some(vsm) = &mut self.optional.vsm {
            vsm.record_page_marking(device, cmd, &self.core.rasterizer.depth, &self.core.gbuffer.normal);
            vsm.recenter_and_mark_directional(
                SUN_LIGHT_INDEX,
                frame.camera.position,
                frame.frame_index,
                SUN_SHADOW_FOOTPRINT_PAGES,
            );
            // Dirty-page re-rendering reuses the main view's already-culled
            // HW indirect draw args as each page's geometry rather than a
            // full per-light recull (`spec.md` 4.I "Rendering").
            let sun_view_proj = directional_light_view_projection(frame.sun.direction, frame.camera.position, SUN_SHADOW_HALF_EXTENT);
            vsm.record_dirty_page_renders(device, cmd, &[sun_view_proj], &self.core.raster_queues.hw_indirect);
        }

        if let Some(rt_shadows) = &self.optional.rt_shadows {
            rt_shadows.record(device, cmd, light_count);
        }

        if let Some(surface_cache) = &mut self.optional.surface_cache {
            let dirty_count = surface_cache.dirty_cards().count() as u32;
            surface_cache.record_capture(device, cmd, dirty_count);
            surface_cache.record_composition(device, cmd, dirty_count);
        }

        if let Some(screen_probes) = &self.optional.screen_probes {
            screen_probes.record(device, cmd, &self.core.rasterizer.depth, &self.core.gbuffer.normal);
            self.stats.current.probes_placed += screen_probes.atlas_width_in_probes() * screen_probes.atlas_width_in_probes();
        }

        if let Some(radiance_cache) = &mut self.optional.radiance_cache {
            let dirty_levels = radiance_cache.scroll_all(frame.camera.position, 4);
            radiance_cache.record_injection(device, cmd, &dirty_levels);
        }

        if let Some(sdf_registry) = &mut self.optional.sdf_registry {
            sdf_registry.recenter_cascades(frame.camera.position);
        }

        if let Some(sstrace) = &self.optional.sstrace {
            sstrace.record(device, cmd, &self.core.hzb.pyramid);
        }

        // Disabled GI sources fall back to the probe atlas itself rather
        // than a dedicated black texture: harmless since the gather shader
        // only samples it, never writes, and it avoids carrying a whole
        // extra dummy-image subsystem just for the disabled case.
        if let (Some(gi), Some(screen_probes)) = (&mut self.optional.gi, &self.optional.screen_probes) {
            let radiance_image = self
                .optional
                .radiance_cache
                .as_ref()
                .and_then(|cache| cache.sh_volumes.first())
                .unwrap_or(&screen_probes.filtered_atlas);
            let ssr_image = self.optional.sstrace.as_ref().map(|tracer| tracer.output()).unwrap_or(&screen_probes.filtered_atlas);
            gi.record(device, cmd, &screen_probes.filtered_atlas, radiance_image, ssr_image);
        }

        let gi_composite = self.optional.gi.as_ref().map(|gi| &gi.composite).unwrap_or(&self.core.gbuffer.albedo);
        self.core.lighting.record(device, cmd, gi_composite);
        self.core.temporal.record(device, cmd, &self.core.lighting.hdr_output);
    }

    /// Ends the frame: cycles every double-buffered history without a
    /// copy and advances the frame index (`spec.md` §5 ordering rule).
    pub fn end_frame(&mut self) {
        self.core.temporal.swap();
        if let Some(gi) = &mut self.optional.gi {
            gi.swap();
        }
        if let Some(rt_shadows) = &mut self.optional.rt_shadows {
            rt_shadows.swap();
        }
        if let Some(vsm) = &mut self.optional.vsm {
            vsm.page_table.clear_frame_requests();
            let evicted = vsm.page_table.evict_stale(self.frame_index, 16);
            self.stats.current.shadow_pages_rendered = vsm.page_table.resident_count();
            let _ = evicted;
        }
        self.frame_index = self.frame_index.wrapping_add(1);
    }

    /// Waits for the device to go idle, destroys every size-dependent
    /// image, and recreates them at the new extent; pipelines and
    /// pipeline layouts are untouched (`spec.md` 4.R resize contract).
    pub fn resize(&mut self, device: &Device, new_extent: vk::Extent2D) -> ResizeResult<()> {
        device.wait_until_idle()?;

        self.core.hzb.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        self.core.rasterizer.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        self.core
            .visibility_resolve
            .resize(device, new_extent)
            .map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        self.core.gbuffer.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        self.core.temporal.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        self.core.lighting.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;

        if let Some(screen_probes) = &mut self.optional.screen_probes {
            screen_probes.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        }
        if let Some(sstrace) = &mut self.optional.sstrace {
            sstrace.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        }
        if let Some(gi) = &mut self.optional.gi {
            gi.resize(device, new_extent).map_err(|e| ResizeError::RecreateFailed(e.to_string()))?;
        }

        self.extent = new_extent;
        Ok(())
    }

    pub fn destroy(&mut self, device: &Device) {
        self.core.hzb.destroy(device);
        self.core.culler.destroy(device);
        self.core.cull_queues.destroy(device);
        self.core.rasterizer.destroy(device);
        self.core.raster_queues.destroy(device);
        self.core.visibility_resolve.destroy(device);
        self.core.gbuffer.destroy(device);
        self.core.temporal.destroy(device);
        self.core.lighting.destroy(device);

        if let Some(vsm) = &mut self.optional.vsm {
            vsm.destroy(device);
        }
        if let Some(rt_shadows) = &mut self.optional.rt_shadows {
            rt_shadows.destroy(device);
        }
        if let Some(surface_cache) = &mut self.optional.surface_cache {
            surface_cache.destroy(device);
        }
        if let Some(screen_probes) = &mut self.optional.screen_probes {
            screen_probes.destroy(device);
        }
        if let Some(radiance_cache) = &mut self.optional.radiance_cache {
            radiance_cache.destroy(device);
        }
        if let Some(sdf_registry) = &mut self.optional.sdf_registry {
            sdf_registry.destroy(device);
        }
        if let Some(sstrace) = &mut self.optional.sstrace {
            sstrace.destroy(device);
        }
        if let Some(gi) = &mut self.optional.gi {
            gi.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_wraps_rather_than_panics() {
        let mut index = u32::MAX;
        index = index.wrapping_add(1);
        assert_eq!(index, 0);
    }
}
