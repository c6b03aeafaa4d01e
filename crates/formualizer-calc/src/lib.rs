//! Sandboxed single-formula calculation over formualizer.
//!
//! A [`CalculationRequest`] carries one Excel-like formula, `#variables` and named lookup
//! tables. Each request is run on a fresh engine instance: variables and tables are
//! registered under collision-free names, the cell budget is checked, the rewritten formula
//! is evaluated and the engine is disposed. An [`ExecutionPool`] runs requests on a fixed set
//! of worker threads and the [`service`] module maps outcomes onto a transport.

pub mod budget;
pub mod config;
pub mod engine;
pub mod error;
pub mod formualizer;
pub mod literal;
pub mod outcome;
pub mod pool;
pub mod request;
pub mod rewrite;
pub mod service;
pub mod symbols;
pub mod task;
pub mod value;

pub use budget::{BudgetExceeded, DEFAULT_MAX_TOTAL_CELLS, ResourceBudget};
pub use config::{Limits, PoolConfig};
pub use engine::{
    EngineAdapter, EngineError, EngineErrorKind, EngineFactory, EngineGuard, RangeSpan, SheetId,
};
pub use error::{PoolError, RegistrationError, ValidationError};
pub use formualizer::{FormualizerEngine, FormualizerFactory};
pub use outcome::{CalculationOutcome, Failure, FailureKind};
pub use pool::{DrainReport, ExecutionPool, PendingOutcome, PoolStatus};
pub use request::CalculationRequest;
pub use rewrite::rewrite_formula;
pub use symbols::{CALCULATION_SHEET, LookupTableBinding, SymbolRegistrar, VariableBinding};
pub use task::{CalculationTask, TaskState, run_calculation};
pub use value::{CellValue, VariableValue};
