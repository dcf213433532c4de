use thiserror::Error;

/// Init/resize errors per the error-handling design: both are recoverable,
/// return a typed result, and never leave the caller with partial state.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable physical device found (need Vulkan 1.3 and mesh shader support)")]
    NoSuitableDevice,
    #[error("required feature `{0}` is not supported by this device")]
    MissingFeature(&'static str),
    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] ash::vk::Result),
    #[error("memory allocation failed: no compatible memory type for requirements {0:?}")]
    NoMemoryType(ash::vk::MemoryRequirements),
    #[error("shader cache corrupt: {0}")]
    CacheCorrupt(String),
    #[error("shader compile failed: {0}")]
    CompileFailed(String),
}

pub type Result<T> = std::result::Result<T, GpuError>;
