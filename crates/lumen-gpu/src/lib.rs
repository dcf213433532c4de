//! Thin Vulkan hardware-abstraction layer: instance/device setup, a linear
//! GPU allocator, a descriptor-buffer-backed bindless resource table, and a
//! command buffer wrapper that tracks image layouts so the renderer never
//! has to hand-place barriers.
//!
//! This crate is the `GpuContext` implementation the core renderer crate
//! is written against; nothing above this layer touches `ash` directly.

pub mod command;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod resources;
pub mod shader_cache;
pub mod sync;

pub use ash;
pub use command::{Access, CommandBuffer};
pub use descriptor::{DescriptorBuffer, DescriptorLayout};
pub use device::Device;
pub use error::GpuError;
pub use instance::Instance;
pub use pipeline::{Pipeline, PipelineKind, PipelineLayout};
pub use resources::{Allocator, Buffer, BufferKind, BufferRequest, Image, ImageRequest, Memory};
pub use shader_cache::ShaderCache;
