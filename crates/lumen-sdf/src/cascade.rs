use glam::Vec3;

/// Defaults mirror the reference implementation's `SDFConfig`
/// (`cascadeCount = 4`, `cascadeResolution = 128`, `cascadeScale = 2.0`,
/// `baseCascadeExtent = 50.0`).
#[derive(Debug, Clone, Copy)]
pub struct GlobalSdfConfig {
    pub cascade_count: u32,
    pub resolution: u32,
    pub scale: f32,
    pub base_extent: f32,
}

impl Default for GlobalSdfConfig {
    fn default() -> Self {
        Self {
            cascade_count: 4,
            resolution: 128,
            scale: 2.0,
            base_extent: 50.0,
        }
    }
}

/// One level of the cascaded global distance field used as the fallback
/// for screen-space ray tracing misses (`spec.md` 4.N).
#[derive(Debug, Clone, Copy)]
pub struct GlobalSdfCascade {
    pub level: u32,
    pub center: Vec3,
    pub half_extent: f32,
    pub voxel_size: f32,
    pub needs_update: bool,
}

impl GlobalSdfCascade {
    pub fn new(level: u32, config: GlobalSdfConfig) -> Self {
        let half_extent = config.base_extent * config.scale.powi(level as i32);
        Self {
            level,
            center: Vec3::ZERO,
            half_extent,
            voxel_size: (half_extent * 2.0) / config.resolution.max(1) as f32,
            needs_update: true,
        }
    }

    /// Re-centers the cascade on the camera, snapping to the cascade's own
    /// voxel grid so only the slab that scrolled out needs re-injection
    /// (same toroidal-addressing contract as the radiance clipmap).
    pub fn recenter(&mut self, camera_pos: Vec3) {
        let snapped = (camera_pos / self.voxel_size).round() * self.voxel_size;
        if snapped != self.center {
            self.center = snapped;
            self.needs_update = true;
        }
    }
}

pub fn build_cascades(config: GlobalSdfConfig) -> Vec<GlobalSdfCascade> {
    (0..config.cascade_count)
        .map(|level| GlobalSdfCascade::new(level, config))
        .collect()
}

/// Picks the finest cascade whose volume contains `world_pos`, matching
/// the "finer-first" traversal order the screen-space tracer and the GI
/// composer both rely on.
pub fn finest_cascade_containing<'a>(
    cascades: &'a [GlobalSdfCascade],
    world_pos: Vec3,
) -> Option<&'a GlobalSdfCascade> {
    cascades.iter().find(|cascade| {
        let d = (world_pos - cascade.center).abs();
        d.x <= cascade.half_extent && d.y <= cascade.half_extent && d.z <= cascade.half_extent
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascades_double_in_extent() {
        let cascades = build_cascades(GlobalSdfConfig::default());
        for pair in cascades.windows(2) {
            assert!((pair[1].half_extent / pair[0].half_extent - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn finest_cascade_picked_first() {
        let cascades = build_cascades(GlobalSdfConfig::default());
        let found = finest_cascade_containing(&cascades, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(found.level, 0);
    }

    #[test]
    fn recenter_only_marks_dirty_on_change() {
        let mut cascade = GlobalSdfCascade::new(0, GlobalSdfConfig::default());
        cascade.needs_update = false;
        cascade.recenter(Vec3::ZERO);
        assert!(!cascade.needs_update, "recentering onto the same snapped position must not dirty the cascade");
    }
}
