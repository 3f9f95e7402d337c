//! Time subsystem.
//!
//! Deadline tracking for work deferred until the producer goes quiet.
//! Callers pass `Instant`s explicitly so the timer stays testable.

mod idle_timer;

pub use idle_timer::{IDLE_SHRINK_DELAY, IdleTimer};
