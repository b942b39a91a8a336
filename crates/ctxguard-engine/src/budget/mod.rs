//! Rendering-context budget.
//!
//! Hosts cap the number of live rendering contexts and degrade badly past
//! that cap. [`ContextBudgetManager`] keeps every consumer under a fixed
//! ceiling:
//! - consumers register with an id, an optional surface and a [`Priority`]
//! - a full table evicts the weakest registration for a stronger newcomer
//! - removal runs the consumer's [`Disposer`] and releases its context
//!
//! The manager is graphics-API agnostic; anything implementing
//! [`RenderSurface`] can be budgeted.

mod manager;
mod priority;
mod registration;
mod stats;
mod surface;

pub use manager::ContextBudgetManager;
pub use priority::Priority;
pub use stats::BudgetStats;
pub use surface::{Disposer, RenderSurface};
