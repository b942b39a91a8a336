use crate::budget::Priority;

use super::ConfigError;

pub const MAX_CONTEXTS_VAR: &str = "CTXGUARD_MAX_CONTEXTS";
pub const DEFAULT_PRIORITY_VAR: &str = "CTXGUARD_DEFAULT_PRIORITY";

/// Hard upper bound on the configurable ceiling.
///
/// Browsers start dropping contexts at 16; native drivers vary.
const MAX_CONTEXTS_LIMIT: usize = 64;

/// Context budget configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetConfig {
    /// Maximum simultaneously registered contexts.
    pub max_contexts: usize,

    /// Priority used by consumers that do not pick one.
    pub default_priority: Priority,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_contexts: 8,
            default_priority: Priority::default(),
        }
    }
}

impl BudgetConfig {
    /// Builds a config from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_CONTEXTS_VAR) {
            config.max_contexts = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::new(MAX_CONTEXTS_VAR, format!("`{raw}` is not a count")))?;
        }

        if let Some(raw) = lookup(DEFAULT_PRIORITY_VAR) {
            let value: i32 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::new(DEFAULT_PRIORITY_VAR, format!("`{raw}` is not an integer")))?;
            config.default_priority = Priority::checked(value).ok_or_else(|| {
                ConfigError::new(
                    DEFAULT_PRIORITY_VAR,
                    format!("{value} outside {}..={}", Priority::MIN, Priority::MAX),
                )
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_contexts == 0 {
            return Err(ConfigError::new("max_contexts", "must be at least 1"));
        }
        if self.max_contexts > MAX_CONTEXTS_LIMIT {
            return Err(ConfigError::new(
                "max_contexts",
                format!("{} exceeds limit of {MAX_CONTEXTS_LIMIT}", self.max_contexts),
            ));
        }
        Ok(())
    }
}
