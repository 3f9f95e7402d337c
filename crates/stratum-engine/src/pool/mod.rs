//! The surface cache.
//!
//! Responsibilities:
//! - hand out surfaces by exact match, best-fit rebind, or fresh creation
//! - hold submitted surfaces until the consumer releases them
//! - keep retained surfaces alive across frames under a content key
//! - age out idle surfaces and compact oversized allocations

mod cache;
mod error;
mod limits;
mod outcome;
mod stats;

pub use cache::SurfacePool;
pub use error::PoolError;
pub use limits::{MAX_SURFACE_AGE, MAX_SURFACES, PoolLimits};
pub use outcome::{AcquirePath, Acquired, SubmitOutcome};
pub use stats::PoolStats;
