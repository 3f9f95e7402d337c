use crate::backend::SurfaceBackend;
use crate::surface::{SurfaceId, SurfaceSize};
use crate::sync::SyncSignal;

/// What the consumer receives for each finished surface.
///
/// The consumer must wait on `ready` before reading `memory`, and assert
/// `release` once it no longer reads it. The pool recycles the surface only
/// after `release` is observed.
pub struct PresentedSurface<B: SurfaceBackend> {
    pub id: SurfaceId,
    pub size: SurfaceSize,
    pub memory: B::Export,
    pub ready: SyncSignal,
    pub release: SyncSignal,
}

/// Presentation collaborator (compositor, scene graph, test harness).
pub trait Presenter<B: SurfaceBackend> {
    fn present(&mut self, surface: PresentedSurface<B>);
}

impl<B, F> Presenter<B> for F
where
    B: SurfaceBackend,
    F: FnMut(PresentedSurface<B>),
{
    fn present(&mut self, surface: PresentedSurface<B>) {
        self(surface)
    }
}
