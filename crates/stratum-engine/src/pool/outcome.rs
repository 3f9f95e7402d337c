use core::fmt;

use crate::backend::SurfaceBackend;
use crate::surface::Surface;

/// Which branch of the acquisition procedure produced a surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AcquirePath {
    Exact,
    BestFit,
    Created,
}

/// A surface checked out of the pool, tagged with how it was obtained.
pub enum Acquired<B: SurfaceBackend> {
    /// An available surface of exactly the requested size.
    Exact(Surface<B>),
    /// A larger available allocation rebound to a new image.
    BestFit(Surface<B>),
    /// A freshly allocated surface.
    Created(Surface<B>),
}

impl<B: SurfaceBackend> Acquired<B> {
    pub fn path(&self) -> AcquirePath {
        match self {
            Acquired::Exact(_) => AcquirePath::Exact,
            Acquired::BestFit(_) => AcquirePath::BestFit,
            Acquired::Created(_) => AcquirePath::Created,
        }
    }

    pub fn surface(&self) -> &Surface<B> {
        match self {
            Acquired::Exact(s) | Acquired::BestFit(s) | Acquired::Created(s) => s,
        }
    }

    pub fn surface_mut(&mut self) -> &mut Surface<B> {
        match self {
            Acquired::Exact(s) | Acquired::BestFit(s) | Acquired::Created(s) => s,
        }
    }

    pub fn into_surface(self) -> Surface<B> {
        match self {
            Acquired::Exact(s) | Acquired::BestFit(s) | Acquired::Created(s) => s,
        }
    }
}

impl<B: SurfaceBackend> fmt::Debug for Acquired<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Acquired")
            .field(&self.path())
            .field(self.surface())
            .finish()
    }
}

/// Where a submitted surface ended up.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// Waiting for the consumer's release, then recycled.
    Pending,
    /// Held under its retained key.
    Retained,
    /// The surface was invalid and has been destroyed.
    Discarded,
}
