//! Budget configuration.

mod budget;
mod error;

pub use budget::{BudgetConfig, DEFAULT_PRIORITY_VAR, MAX_CONTEXTS_VAR};
pub use error::ConfigError;
