pub mod config;
pub mod cull;
pub mod data;
pub mod error;
pub mod frame;
pub mod gi;
pub mod hzb;
pub mod lighting;
pub mod radiance_cache;
pub mod raster;
pub mod rt_shadows;
pub mod screen_probes;
pub mod sdf;
pub mod sstrace;
pub mod stats;
pub mod surface_cache;
pub mod temporal;
pub mod traits;
pub mod visibility_resolve;
pub mod vsm;

pub use config::{DebugFlags, GiQuality, RenderConfig, RenderConfigBuilder, ShadowQuality};
pub use cull::{CullFlags, CullPushConstants, CullQueues, Culler};
pub use error::{FrameDiagnostic, InitError, InitResult, ResizeError, ResizeResult};
pub use frame::{CoreSubsystems, FrameOrchestrator, OptionalSubsystems};
pub use gi::GiComposer;
pub use hzb::HzbBuilder;
pub use lighting::DeferredLighting;
pub use radiance_cache::{RadianceCache, RadianceClipmapLevel};
pub use raster::{RasterPath, RasterQueues, Rasterizer, VisibilityFormat};
pub use rt_shadows::RayTracedShadows;
pub use screen_probes::ScreenProbes;
pub use sdf::{MeshSdfPlacement, SdfRegistry};
pub use sstrace::{MarchStep, ScreenSpaceTracer};
pub use stats::{FrameStats, StatsAggregator};
pub use surface_cache::{CardFace, SurfaceCache, SurfaceCard};
pub use temporal::TemporalSystem;
pub use traits::{AmbientLight, CameraBlock, FrameContext, GpuContext, SceneSource, SunLight};
pub use visibility_resolve::{GBuffer, MaterialTile, PixelWorkItem, VisibilityResolve};
pub use vsm::{
    directional_light_view_projection, physical_page_rect, ClipmapLevel, PageEntry, PageId,
    PageRenderPushConstants, PageTable, VirtualShadowMaps,
};
