use thiserror::Error;

/// Initialization failures are the only per-init error: no partial state
/// is left behind, and `cleanup` always runs before returning.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("required device feature missing: {0}")]
    MissingFeature(&'static str),
    #[error("allocation failed during subsystem init: {0}")]
    AllocationFailed(String),
    #[error("shader compile failed during subsystem init: {0}")]
    ShaderCompileFailed(String),
    #[error(transparent)]
    Gpu(#[from] lumen_gpu::GpuError),
}

/// Resize aborts the current frame and the renderer stays at its
/// pre-resize dimensions; it never returns the caller to a half-recreated
/// state.
#[derive(Debug, Error)]
pub enum ResizeError {
    #[error("failed to recreate subsystem resources at the new resolution: {0}")]
    RecreateFailed(String),
    #[error(transparent)]
    Gpu(#[from] lumen_gpu::GpuError),
}

/// Per-frame overflow conditions never abort a frame; they are reported
/// through this, either via the stats block or an optional diagnostic
/// callback, never as a `Result` error (`spec.md` §7).
#[derive(Debug, Clone)]
pub enum FrameDiagnostic {
    CandidateNodeQueueOverflow { attempted: u32, capacity: u32 },
    VisibleClusterQueueOverflow { attempted: u32, capacity: u32 },
    SwTriangleQueueOverflow { attempted: u32, capacity: u32 },
    VsmPageAllocatorExhausted { light_index: u32 },
    StatsReadbackTimedOut,
}

pub type InitResult<T> = std::result::Result<T, InitError>;
pub type ResizeResult<T> = std::result::Result<T, ResizeError>;
