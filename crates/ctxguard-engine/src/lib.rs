//! ctxguard engine crate.
//!
//! Keeps the number of live rendering contexts under a fixed ceiling and
//! provides a wgpu/winit surface that can be budgeted.

pub mod budget;
pub mod config;
pub mod device;
pub mod logging;

pub use budget::{BudgetStats, ContextBudgetManager, Disposer, Priority, RenderSurface};
pub use config::{BudgetConfig, ConfigError};
