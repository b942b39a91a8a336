/// A drawable target that can hand out a scarce rendering context.
///
/// The manager only ever calls `acquire` on a surface it owns, and passes
/// every successfully acquired context back through `release` exactly once.
pub trait RenderSurface {
    type Context;

    /// Acquires a rendering context from this surface.
    fn acquire(&mut self) -> anyhow::Result<Self::Context>;

    /// Returns a context to its surface.
    ///
    /// This is the best-effort "lose context" signal and must not fail.
    fn release(&mut self, context: Self::Context);
}

/// Cleanup callback invoked once when a registration is removed.
pub type Disposer = Box<dyn FnOnce()>;
