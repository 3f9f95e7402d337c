use thiserror::Error;

/// Failures reported by [`SurfaceProducer::finish_frame`](super::SurfaceProducer::finish_frame).
///
/// Either way the frame's surfaces have been returned to the pool (or
/// destroyed) and aging has run.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The device flush failed; every surface of the frame was discarded.
    #[error("device flush failed, frame discarded: {cause:#}")]
    Flush { cause: anyhow::Error },

    /// Some surfaces could not be made legible to the consumer and were
    /// discarded. The rest were presented.
    #[error("{failed} of {total} surfaces failed their consumer transition")]
    Transition { failed: usize, total: usize },
}
