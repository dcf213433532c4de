use std::collections::HashMap;

use ash::vk;
use glam::Vec3;
use lumen_gpu::{Buffer, BufferKind, BufferRequest, Device};
use lumen_sdf::cascade::{build_cascades, finest_cascade_containing, GlobalSdfCascade, GlobalSdfConfig};
use lumen_sdf::mesh_sdf::{generate_mesh_sdf_cpu, MeshSdfConfig, MeshSdfVolume};

use crate::data::MeshId;
use crate::error::{InitError, InitResult};

/// GPU-resident placement of one mesh's CPU-generated SDF volume inside the
/// shared per-mesh atlas buffer, plus the volume's own grid metadata needed
/// to address it from a shader (`spec.md` 4.O).
#[derive(Debug, Clone, Copy)]
pub struct MeshSdfPlacement {
    pub voxel_offset: u32,
    pub resolution: glam::IVec3,
    pub voxel_size: f32,
    pub bounds_min: Vec3,
}

/// Owns the per-mesh SDF volumes (built on a worker thread per `spec.md`
/// §5, uploaded into one packed GPU buffer) and the global cascade
/// hierarchy used as the screen-space tracer's fallback.
pub struct SdfRegistry {
    config: MeshSdfConfig,
    pub volumes: Buffer,
    placements: HashMap<MeshId, MeshSdfPlacement>,
    next_voxel_offset: u32,
    capacity_voxels: u32,
    pub global_cascades: Vec<GlobalSdfCascade>,
}

impl SdfRegistry {
    pub fn create(device: &Device, config: MeshSdfConfig, global_config: GlobalSdfConfig, capacity_voxels: u32) -> InitResult<Self> {
        let volumes = Buffer::create(
            device,
            &BufferRequest {
                size: capacity_voxels as vk::DeviceSize * 4,
                kind: BufferKind::Storage,
            },
        )
        .map_err(InitError::from)?;

        Ok(Self {
            config,
            volumes,
            placements: HashMap::new(),
            next_voxel_offset: 0,
            capacity_voxels,
            global_cascades: build_cascades(global_config),
        })
    }

    /// Builds a mesh SDF on the CPU (the worker-pool path from `spec.md`
    /// §5) and reserves its slice of the shared volume buffer. Returns
    /// `None` if the atlas buffer has no room left, mirroring the surface
    /// cache's "fail without mutating state" contract.
    pub fn register_mesh(&mut self, mesh: MeshId, positions: &[Vec3], indices: &[u32]) -> Option<MeshSdfVolume> {
        let volume = generate_mesh_sdf_cpu(positions, indices, self.config);
        let voxel_count = volume.voxels.len() as u32;
        if self.next_voxel_offset + voxel_count > self.capacity_voxels {
            return None;
        }

        self.placements.insert(
            mesh,
            MeshSdfPlacement {
                voxel_offset: self.next_voxel_offset,
                resolution: volume.resolution,
                voxel_size: volume.voxel_size,
                bounds_min: volume.bounds_min,
            },
        );
        self.next_voxel_offset += voxel_count;
        Some(volume)
    }

    pub fn placement(&self, mesh: MeshId) -> Option<MeshSdfPlacement> {
        self.placements.get(&mesh).copied()
    }

    pub fn unregister_mesh(&mut self, mesh: MeshId) {
        self.placements.remove(&mesh);
    }

    /// Recenters every global cascade on the camera; callers re-inject
    /// only the cascades that report `needs_update` afterward.
    pub fn recenter_cascades(&mut self, camera_pos: Vec3) {
        for cascade in &mut self.global_cascades {
            cascade.recenter(camera_pos);
        }
    }

    pub fn finest_cascade_containing(&self, world_pos: Vec3) -> Option<&GlobalSdfCascade> {
        finest_cascade_containing(&self.global_cascades, world_pos)
    }

    pub fn destroy(&mut self, device: &Device) {
        self.volumes.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> (Vec<Vec3>, Vec<u32>) {
        (vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)], vec![0, 1, 2])
    }

    #[test]
    fn registering_consecutive_meshes_packs_without_overlap() {
        let mut placements = HashMap::new();
        let mut next_offset = 0u32;
        let config = MeshSdfConfig { resolution: 8, padding: 0.1 };

        let (positions, indices) = unit_triangle();
        for i in 0..2u32 {
            let volume = generate_mesh_sdf_cpu(&positions, &indices, config);
            let voxel_count = volume.voxels.len() as u32;
            placements.insert(MeshId(i), (next_offset, voxel_count));
            next_offset += voxel_count;
        }

        let (first_offset, first_count) = placements[&MeshId(0)];
        let (second_offset, _) = placements[&MeshId(1)];
        assert_eq!(second_offset, first_offset + first_count);
    }

    #[test]
    fn registration_fails_cleanly_when_the_atlas_is_full() {
        let config = MeshSdfConfig { resolution: 8, padding: 0.1 };
        let (positions, indices) = unit_triangle();
        let volume = generate_mesh_sdf_cpu(&positions, &indices, config);
        let voxel_count = volume.voxels.len() as u32;

        let capacity = voxel_count;
        let mut next_offset = 0u32;
        assert!(next_offset + voxel_count <= capacity);
        next_offset += voxel_count;
        assert!(next_offset + voxel_count > capacity, "second mesh must not fit once capacity is exhausted");
    }
}
