use bytemuck::{NoUninit, Zeroable};

/// Per-stage GPU timings in microseconds, indexed by pipeline stage. Kept
/// as a fixed array (rather than a `HashMap`) so it round-trips through
/// `bytemuck` for the host-visible readback path.
pub const STAGE_COUNT: usize = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable, NoUninit)]
pub struct FrameStats {
    pub total_clusters: u32,
    pub visible_clusters: u32,
    pub culled_clusters: u32,
    pub sw_clusters: u32,
    pub hw_clusters: u32,
    pub shadow_pages_rendered: u32,
    pub shadow_rays_traced: u32,
    pub probes_placed: u32,
    pub radiance_cache_updates: u32,
    pub sdf_voxels_updated: u32,
    pub stage_gpu_us: [u32; STAGE_COUNT],
}

impl Default for FrameStats {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// Aggregates every subsystem's per-frame counters; this is the Frame
/// Orchestrator's readback target, updated from the stats readback buffer
/// each frame (or left at its previous values on a readback timeout, per
/// the error-handling design — a timeout never propagates as a failure).
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    pub current: FrameStats,
}

impl StatsAggregator {
    pub fn reset_for_frame(&mut self) {
        self.current = FrameStats::default();
    }

    pub fn merge_cull(&mut self, total: u32, visible: u32, culled: u32) {
        self.current.total_clusters += total;
        self.current.visible_clusters += visible;
        self.current.culled_clusters += culled;
    }

    pub fn merge_raster(&mut self, sw: u32, hw: u32) {
        self.current.sw_clusters += sw;
        self.current.hw_clusters += hw;
    }
}
