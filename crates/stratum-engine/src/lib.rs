//! Stratum engine crate.
//!
//! This crate owns the GPU surface pool used by a frame rasterizer: surfaces,
//! the recycling cache, and the per-frame producer facade, plus the wgpu and
//! headless backends they run on.

pub mod backend;
pub mod device;
pub mod pool;
pub mod producer;
pub mod surface;
pub mod sync;
pub mod time;

pub mod logging;
