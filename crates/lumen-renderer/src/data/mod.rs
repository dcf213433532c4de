pub mod cluster;
pub mod handles;
pub mod instance;
pub mod material;
pub mod visibility;

pub use cluster::{build_mesh_hierarchy, Cluster, GpuCluster, HierarchyNode, LodGroup, MeshHierarchy, NodeKind};
pub use handles::{
    ClusterId, HierarchyNodeId, InstanceId, LightId, MaterialId, MeshId, PipelineId, ShaderId,
};
pub use instance::{GpuInstance, Instance, InstanceFlags};
pub use material::{Light, LightType, Material};
pub use visibility::{resolve_winner, VisibilitySample};
