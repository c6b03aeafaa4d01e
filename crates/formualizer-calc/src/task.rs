//! One request, one engine instance: register, check budget, write, evaluate, dispose.

use crate::budget::ResourceBudget;
use crate::config::Limits;
use crate::engine::{EngineAdapter, EngineFactory, EngineGuard};
use crate::outcome::{CalculationOutcome, Failure, FailureKind};
use crate::request::CalculationRequest;
use crate::rewrite::rewrite_formula;
use crate::symbols::{CALCULATION_SHEET, SymbolRegistrar};
use crate::value::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Initialized,
    TablesRegistered,
    VariablesRegistered,
    BudgetChecked,
    FormulaWritten,
    Evaluated,
    Disposed,
    Failed(FailureKind),
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Disposed | TaskState::Failed(_))
    }
}

pub struct CalculationTask<'r, E: EngineAdapter> {
    request: &'r CalculationRequest,
    limits: &'r Limits,
    guard: EngineGuard<E>,
    state: TaskState,
}

impl<'r, E: EngineAdapter> CalculationTask<'r, E> {
    pub fn new(engine: E, request: &'r CalculationRequest, limits: &'r Limits) -> Self {
        Self {
            request,
            limits,
            guard: EngineGuard::new(engine),
            state: TaskState::Initialized,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.guard.is_disposed()
    }

    /// Drive the task to a terminal state. The engine is disposed before this returns.
    pub fn run(&mut self) -> CalculationOutcome {
        let _span = tracing::info_span!(
            "calculate",
            tables = self.request.lookup_tables.len(),
            variables = self.request.variables.len()
        )
        .entered();

        let result = self.execute();
        self.guard.dispose();
        match result {
            Ok(value) => {
                self.state = TaskState::Disposed;
                tracing::debug!("calculation succeeded");
                CalculationOutcome::Success { value }
            }
            Err(failure) => {
                self.state = TaskState::Failed(failure.kind);
                tracing::debug!(kind = %failure.kind, "calculation failed");
                failure.into()
            }
        }
    }

    fn execute(&mut self) -> Result<CellValue, Failure> {
        let request = self.request;
        let mut budget = ResourceBudget::new(self.limits.max_total_cells);
        let engine = self.guard.get()?;
        engine.install_boolean_constants()?;

        let mut registrar = SymbolRegistrar::new(&mut *engine);
        registrar.register_tables(&request.lookup_tables, &mut budget)?;
        self.state = TaskState::TablesRegistered;

        let variables = registrar.register_variables(&request.variables, &mut budget)?;
        self.state = TaskState::VariablesRegistered;

        if let Err(exceeded) = budget.check() {
            tracing::info!(
                used = exceeded.used,
                ceiling = exceeded.ceiling,
                "request rejected by cell budget"
            );
            return Err(exceeded.into());
        }
        self.state = TaskState::BudgetChecked;

        let formula = rewrite_formula(&request.formula, &variables);
        let sheet = engine.add_sheet(CALCULATION_SHEET)?;
        engine.set_cell(sheet, 0, 0, &formula)?;
        self.state = TaskState::FormulaWritten;

        let value = engine.read_cell(sheet, 0, 0)?;
        self.state = TaskState::Evaluated;
        Ok(value)
    }
}

/// Create an engine with `factory` and run `request` on it.
pub fn run_calculation<F: EngineFactory>(
    factory: &F,
    request: &CalculationRequest,
    limits: &Limits,
) -> CalculationOutcome {
    match factory.create() {
        Ok(engine) => CalculationTask::new(engine, request, limits).run(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to create engine instance");
            Failure::internal("Failed to initialize calculation engine.").into()
        }
    }
}
