use std::fmt;

/// Default ceiling on lookup-table cells plus variables per request.
pub const DEFAULT_MAX_TOTAL_CELLS: u64 = 50_000;

/// Cell accounting for one request: one unit per lookup-table cell and per variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudget {
    used: u64,
    ceiling: u64,
}

/// The request consumed more cells than the ceiling allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExceeded {
    pub used: u64,
    pub ceiling: u64,
}

impl fmt::Display for BudgetExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resource limit exceeded: request uses {} cells, max cells allowed: {}",
            self.used, self.ceiling
        )
    }
}

impl std::error::Error for BudgetExceeded {}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOTAL_CELLS)
    }
}

impl ResourceBudget {
    pub fn new(ceiling: u64) -> Self {
        Self { used: 0, ceiling }
    }

    pub fn charge_table(&mut self, rows: u32, cols: u32) {
        self.used = self
            .used
            .saturating_add(u64::from(rows) * u64::from(cols));
    }

    pub fn charge_variables(&mut self, count: usize) {
        self.used = self.used.saturating_add(count as u64);
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Reaching the ceiling exactly is allowed.
    pub fn check(&self) -> Result<(), BudgetExceeded> {
        if self.used > self.ceiling {
            Err(BudgetExceeded {
                used: self.used,
                ceiling: self.ceiling,
            })
        } else {
            Ok(())
        }
    }
}
