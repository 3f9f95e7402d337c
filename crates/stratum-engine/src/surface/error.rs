use thiserror::Error;

use super::{SurfaceId, SurfaceSize};

/// Failures raised while building, rebinding or synchronizing a surface.
///
/// Backend failures are carried as `anyhow::Error` and rendered with their
/// full context chain.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("failed to create a {size} image: {cause:#}")]
    Image { size: SurfaceSize, cause: anyhow::Error },

    #[error("failed to allocate memory for a {size} surface: {cause:#}")]
    Allocation { size: SurfaceSize, cause: anyhow::Error },

    #[error("failed to bind a {size} image to surface memory: {cause:#}")]
    Bind { size: SurfaceSize, cause: anyhow::Error },

    #[error("failed to build a render target for a {size} surface: {cause:#}")]
    RenderTarget { size: SurfaceSize, cause: anyhow::Error },

    #[error("synchronization handle failure on surface {id}: {cause:#}")]
    Sync { id: SurfaceId, cause: anyhow::Error },

    #[error("a {required} byte image cannot be bound to a {allocated} byte allocation")]
    Undersized { required: u64, allocated: u64 },

    #[error("surface {0} already has a pending writes-finished callback")]
    CallbackPending(SurfaceId),

    #[error("consumer layout transition failed on surface {id}: {cause:#}")]
    Transition { id: SurfaceId, cause: anyhow::Error },

    #[error("surface {0} is invalid")]
    Invalid(SurfaceId),
}
