//! Pooled drawing surfaces.
//!
//! A [`Surface`] owns one image, its backing memory, a paintable render
//! target and the two synchronization signals used to hand it to a consumer.
//! Surfaces know nothing about the pool; they expose the bookkeeping the pool
//! needs (age, size history, allocation vs requirement).

mod error;
mod key;
mod pooled;
mod size;

pub use error::SurfaceError;
pub use key::{ContentId, RetainedKey};
pub use pooled::{Surface, SurfaceId};
pub use size::{SIZE_HISTORY_LEN, SurfaceSize};
