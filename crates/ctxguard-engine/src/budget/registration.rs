use std::time::Instant;

use super::{Disposer, Priority, RenderSurface};

/// One consumer's claim on a rendering surface.
pub(crate) struct Registration<S: RenderSurface> {
    pub(crate) id: String,
    pub(crate) surface: Option<S>,
    pub(crate) context: Option<S::Context>,
    pub(crate) priority: Priority,
    /// Logical recency stamp; smaller is older.
    pub(crate) touched: u64,
    pub(crate) touched_at: Instant,
    pub(crate) disposer: Option<Disposer>,
}

impl<S: RenderSurface> Registration<S> {
    pub(crate) fn new(id: String, priority: Priority, touched: u64) -> Self {
        Self {
            id,
            surface: None,
            context: None,
            priority,
            touched,
            touched_at: Instant::now(),
            disposer: None,
        }
    }

    pub(crate) fn touch(&mut self, touched: u64) {
        self.touched = touched;
        self.touched_at = Instant::now();
    }

    /// Releases the current context (if any) back to the current surface.
    pub(crate) fn release_context(&mut self) {
        if let Some(context) = self.context.take() {
            // A context never outlives its surface.
            if let Some(surface) = self.surface.as_mut() {
                surface.release(context);
            }
        }
    }

    /// Replaces the surface and acquires a fresh context from it.
    ///
    /// Acquisition failure leaves the registration surface-only.
    pub(crate) fn attach(&mut self, mut surface: S) {
        self.release_context();

        match surface.acquire() {
            Ok(context) => self.context = Some(context),
            Err(e) => {
                log::warn!("context acquisition failed for '{}': {e:#}", self.id);
            }
        }
        self.surface = Some(surface);
    }
}
