//! Per-frame facade over the surface pool.
//!
//! The rasterizer asks the [`SurfaceProducer`] for surfaces, paints them, and
//! hands them back through [`SurfaceProducer::finish_frame`], which flushes
//! the device, transitions each surface for the consumer, presents it and
//! returns it to the pool.

mod error;
mod present;
mod surface_producer;

pub use error::FrameError;
pub use present::{PresentedSurface, Presenter};
pub use surface_producer::{FrameReport, SurfaceProducer};
