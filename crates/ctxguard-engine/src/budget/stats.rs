/// Read-only snapshot of the manager's table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BudgetStats {
    /// Live registrations.
    pub active: usize,
    /// Configured ceiling.
    pub max: usize,
    /// Registered ids in registration order.
    pub ids: Vec<String>,
}
