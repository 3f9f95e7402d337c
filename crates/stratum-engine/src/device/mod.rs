//! GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a window
//! - blocking queue flushes and device-idle waits used by the surface pool

mod context;
mod init;

pub use context::GpuContext;
pub use init::GpuInit;
