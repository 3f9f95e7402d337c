//! Synchronization handles shared between the pool and its consumer.
//!
//! Each surface carries two signals:
//! - `ready`: asserted once the surface's memory is legible to the consumer
//! - `release`: asserted by the consumer once it has finished reading

mod signal;

pub use signal::SyncSignal;
