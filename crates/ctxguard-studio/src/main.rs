use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use ctxguard_engine::device::{GpuInit, SurfaceErrorAction, WindowSurface};
use ctxguard_engine::logging::{init_logging, LoggingConfig};
use ctxguard_engine::{BudgetConfig, ContextBudgetManager, Priority};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const WINDOWS_VAR: &str = "CTXGUARD_WINDOWS";

/// One demo window; `key` is its id in the budget.
struct DemoWindow {
    key: String,
    window: Arc<Window>,
    priority: Priority,
    color: wgpu::Color,
    /// Whether the fallback path has been announced already.
    fallback_logged: bool,
}

struct Studio {
    budget: ContextBudgetManager<WindowSurface>,
    gpu_init: GpuInit,
    window_count: usize,
    windows: HashMap<WindowId, DemoWindow>,
}

impl Studio {
    fn new(config: &BudgetConfig, window_count: usize) -> Self {
        Self {
            budget: ContextBudgetManager::new(config),
            gpu_init: GpuInit::default(),
            window_count,
            windows: HashMap::new(),
        }
    }

    fn open_window(&mut self, event_loop: &ActiveEventLoop, index: usize) -> Result<()> {
        let priority = window_priority(self.budget.default_priority(), index, self.window_count);
        let key = format!("window-{index}");

        let attrs = Window::default_attributes()
            .with_title(format!("ctxguard {key} (priority {priority})"))
            .with_inner_size(LogicalSize::new(320.0, 200.0));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let hue = index as f64 / self.window_count.max(1) as f64;
        let demo = DemoWindow {
            key,
            window: window.clone(),
            priority,
            color: wgpu::Color { r: hue, g: 0.3, b: 1.0 - hue, a: 1.0 },
            fallback_logged: false,
        };

        self.register(&demo);
        self.windows.insert(window.id(), demo);
        Ok(())
    }

    fn register(&mut self, demo: &DemoWindow) -> bool {
        let surface = WindowSurface::new(demo.window.clone(), self.gpu_init.clone());
        let key = demo.key.clone();
        let accepted = self.budget.register(
            &demo.key,
            Some(surface),
            demo.priority,
            Some(Box::new(move || log::info!("{key}: gpu resources disposed"))),
        );

        let stats = self.budget.stats();
        if accepted {
            let adapter = self
                .budget
                .context(&demo.key)
                .map(|gpu| gpu.adapter_info().name)
                .unwrap_or_else(|| "no context".to_string());
            log::info!("{}: accelerated on {adapter} ({}/{})", demo.key, stats.active, stats.max);
        } else {
            log::info!("{}: budget full, using fallback ({}/{})", demo.key, stats.active, stats.max);
        }
        accepted
    }

    /// Gives freed budget to the most important windows still on the fallback path.
    fn promote_fallbacks(&mut self) {
        let mut waiting: Vec<WindowId> = self
            .windows
            .iter()
            .filter(|(_, w)| !self.budget.contains(&w.key))
            .map(|(id, _)| *id)
            .collect();
        waiting.sort_by_key(|id| std::cmp::Reverse(self.windows[id].priority));

        for id in waiting {
            if self.budget.is_at_capacity() {
                break;
            }
            let Some(demo) = self.windows.remove(&id) else {
                continue;
            };
            self.register(&demo);
            demo.window.request_redraw();
            self.windows.insert(id, DemoWindow { fallback_logged: false, ..demo });
        }
    }

    fn close_window(&mut self, id: WindowId) {
        if let Some(demo) = self.windows.remove(&id) {
            self.budget.unregister(&demo.key);
            self.promote_fallbacks();
        }
    }

    fn redraw(&mut self, id: WindowId) {
        let Some(demo) = self.windows.get_mut(&id) else {
            return;
        };

        let Some(gpu) = self.budget.context_mut(&demo.key) else {
            if !demo.fallback_logged {
                log::info!("{}: drawing static fallback", demo.key);
                demo.fallback_logged = true;
            }
            return;
        };

        demo.window.pre_present_notify();
        if let Err(action) = gpu.clear(demo.color) {
            match action {
                SurfaceErrorAction::Fatal => {
                    log::error!("{}: fatal surface error, giving context back", demo.key);
                    let key = demo.key.clone();
                    self.budget.unregister(&key);
                    self.promote_fallbacks();
                }
                SurfaceErrorAction::Reconfigured => demo.window.request_redraw(),
                SurfaceErrorAction::SkipFrame => {}
            }
        }
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() {
            return;
        }

        for index in 0..self.window_count {
            if let Err(e) = self.open_window(event_loop, index) {
                log::error!("{e:#}");
                event_loop.exit();
                return;
            }
        }

        let stats = self.budget.stats();
        log::info!("budget: {}/{} active {:?}", stats.active, stats.max, stats.ids);
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.close_window(id);
                if self.windows.is_empty() {
                    self.budget.cleanup();
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(demo) = self.windows.get(&id) {
                    if let Some(gpu) = self.budget.context_mut(&demo.key) {
                        gpu.resize(size);
                    }
                    demo.window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(id),
            _ => {}
        }
    }
}

/// Spreads window priorities from `base` up to `Priority::MAX`, so later
/// windows can evict earlier ones however many windows are open.
fn window_priority(base: Priority, index: usize, count: usize) -> Priority {
    let base = base.get() as usize;
    let span = Priority::MAX.get() as usize - base;
    let step = match count {
        0 | 1 => 0,
        n => span * index.min(n - 1) / (n - 1),
    };
    Priority::new((base + step) as i32)
}

fn window_count(config: &BudgetConfig) -> Result<usize> {
    let count = match std::env::var(WINDOWS_VAR) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{WINDOWS_VAR}=`{raw}` is not a count"))?,
        // Two more than the budget, so something always falls back.
        Err(_) => config.max_contexts + 2,
    };
    anyhow::ensure!(count > 0, "{WINDOWS_VAR} must be at least 1");
    Ok(count)
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = BudgetConfig::from_env().context("invalid budget configuration")?;
    let count = window_count(&config)?;
    log::info!("opening {count} window(s) with a budget of {}", config.max_contexts);

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::new(&config, count);
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;

    Ok(())
}
