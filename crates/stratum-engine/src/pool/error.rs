use thiserror::Error;

use crate::surface::{SurfaceError, SurfaceId};

/// Errors surfaced by [`SurfacePool`](super::SurfacePool).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    /// The surface is not currently checked out of this pool (never acquired,
    /// or already submitted).
    #[error("surface {0} was not acquired from this pool")]
    NotAcquired(SurfaceId),
}
