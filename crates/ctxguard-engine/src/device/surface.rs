use std::sync::Arc;

use winit::window::{Window, WindowId};

use crate::budget::RenderSurface;

use super::{GpuContext, GpuInit};

/// A winit window as a budgeted rendering surface.
pub struct WindowSurface {
    window: Arc<Window>,
    init: GpuInit,
}

impl WindowSurface {
    pub fn new(window: Arc<Window>, init: GpuInit) -> Self {
        Self { window, init }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn id(&self) -> WindowId {
        self.window.id()
    }
}

impl RenderSurface for WindowSurface {
    type Context = GpuContext;

    /// Blocks on adapter/device setup.
    fn acquire(&mut self) -> anyhow::Result<GpuContext> {
        pollster::block_on(GpuContext::new(self.window.clone(), &self.init))
    }

    fn release(&mut self, context: GpuContext) {
        log::debug!("releasing gpu context for window {:?}", self.window.id());
        context.lose();
    }
}
