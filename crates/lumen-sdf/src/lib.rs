//! CPU-side fallback generation for per-mesh and global-scene signed
//! distance fields (`spec.md` 4.O), and the 2D shelf-packing atlas
//! allocator shared by the surface cache (4.K) and the mesh SDF atlas.
//!
//! The GPU path (voxelizing directly from the vertex/index buffers in a
//! compute pass) is driven by `lumen-renderer`; this crate only owns the
//! algorithm and data layout, so it can be unit tested without a device.

pub mod atlas;
pub mod cascade;
pub mod mesh_sdf;

pub use atlas::AtlasAllocator;
pub use cascade::{GlobalSdfCascade, GlobalSdfConfig};
pub use mesh_sdf::{generate_mesh_sdf_cpu, MeshSdfConfig};
