/// Shadow-map quality tier, driving virtual shadow map page budgets and
/// ray-traced shadow ray counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowQuality {
    Low,
    Medium,
    High,
    Ultra,
}

/// GI quality tier, driving screen-probe ray count and radiance cache
/// clipmap level count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiQuality {
    Low,
    Medium,
    High,
    Ultra,
}

#[derive(Debug, Clone, Copy)]
pub struct DebugFlags {
    pub show_clusters: bool,
    pub show_lod: bool,
    pub show_overdraw: bool,
    pub show_hzb: bool,
    pub freeze_culling: bool,
}

impl Default for DebugFlags {
    fn default() -> Self {
        Self {
            show_clusters: false,
            show_lod: false,
            show_overdraw: false,
            show_hzb: false,
            freeze_culling: false,
        }
    }
}

/// The single input that toggles subsystems; nothing below this reads an
/// environment variable or global state (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub internal_width: u32,
    pub internal_height: u32,

    pub enable_nanite: bool,
    pub enable_sw_raster: bool,
    pub enable_hzb_culling: bool,
    pub enable_taa: bool,
    pub enable_vsm: bool,
    pub enable_rt_shadows: bool,
    pub shadow_quality: ShadowQuality,
    pub enable_gi: bool,
    pub enable_screen_probes: bool,
    pub enable_radiance_cache: bool,
    pub enable_sdf: bool,
    pub gi_quality: GiQuality,
    pub enable_bloom: bool,
    pub enable_dof: bool,
    pub enable_motion_blur: bool,
    pub enable_auto_exposure: bool,

    pub debug: DebugFlags,

    /// Tuning constants, confirmed against the reference implementation's
    /// `ClusterCullingPipeline::CullingConfig` defaults.
    pub max_instances: u32,
    pub max_candidate_nodes: u32,
    pub max_visible_clusters: u32,
    pub max_hierarchy_iterations: u32,
    pub error_threshold: f32,

    pub sw_raster_threshold_px2: f32,
    pub taa_jitter_sequence_len: u32,
    pub vsm_page_size: u32,
    pub vsm_evict_threshold_frames: u32,
    pub screen_probe_rays_per_probe: u32,
    pub radiance_clipmap_levels: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            internal_width: 1920,
            internal_height: 1080,

            enable_nanite: true,
            enable_sw_raster: true,
            enable_hzb_culling: true,
            enable_taa: true,
            enable_vsm: true,
            enable_rt_shadows: false,
            shadow_quality: ShadowQuality::Medium,
            enable_gi: true,
            enable_screen_probes: true,
            enable_radiance_cache: true,
            enable_sdf: true,
            gi_quality: GiQuality::Medium,
            enable_bloom: true,
            enable_dof: false,
            enable_motion_blur: true,
            enable_auto_exposure: true,

            debug: DebugFlags::default(),

            max_instances: 65_536,
            max_candidate_nodes: 1_048_576,
            max_visible_clusters: 524_288,
            max_hierarchy_iterations: 32,
            error_threshold: 1.0,

            sw_raster_threshold_px2: 32.0 * 32.0,
            taa_jitter_sequence_len: 16,
            vsm_page_size: 128,
            vsm_evict_threshold_frames: 16,
            screen_probe_rays_per_probe: 64,
            radiance_clipmap_levels: 4,
        }
    }
}

/// Builder-style construction, one toggle per call, `build()` at the end.
#[derive(Default)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RenderConfig::default(),
        }
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self.config.internal_width = width;
        self.config.internal_height = height;
        self
    }

    pub fn shadow_quality(mut self, quality: ShadowQuality) -> Self {
        self.config.shadow_quality = quality;
        self
    }

    pub fn gi_quality(mut self, quality: GiQuality) -> Self {
        self.config.gi_quality = quality;
        self
    }

    pub fn enable_rt_shadows(mut self, enabled: bool) -> Self {
        self.config.enable_rt_shadows = enabled;
        self
    }

    pub fn build(self) -> RenderConfig {
        self.config
    }
}
