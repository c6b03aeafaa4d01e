//! Contract between the calculation core and the formula engine that evaluates it.
//!
//! The core never talks to an engine directly; it only drives an [`EngineAdapter`]
//! obtained from an [`EngineFactory`]. Every instance serves exactly one request and is
//! disposed through [`EngineGuard`], so disposal happens on success, on failure and
//! while unwinding from a panic.

use crate::value::CellValue;
use std::fmt::{self, Display};
use thiserror::Error;

/// Opaque handle to a sheet inside one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetId(pub usize);

/// Structured error kinds an engine may report for an expression.
///
/// The string token ([`EngineErrorKind::as_str`]) is what callers see as the outcome kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorKind {
    DivByZero,
    Name,
    Cycle,
    Value,
    Ref,
    Na,
    Num,
    Null,
    Spill,
    Calc,
    Error,
    NotImplemented,
    Cancelled,
}

impl EngineErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DivByZero => "DIV_BY_ZERO",
            Self::Name => "NAME",
            Self::Cycle => "CYCLE",
            Self::Value => "VALUE",
            Self::Ref => "REF",
            Self::Na => "NA",
            Self::Num => "NUM",
            Self::Null => "NULL",
            Self::Spill => "SPILL",
            Self::Calc => "CALC",
            Self::Error => "ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// User-facing explanation. Engine messages are not forwarded because they may
    /// mention internal identifiers.
    pub fn description(self) -> &'static str {
        match self {
            Self::DivByZero => "Division by zero.",
            Self::Name => "Unknown function or name in formula.",
            Self::Cycle => "Circular reference detected.",
            Self::Value => "Wrong type of argument or operand.",
            Self::Ref => "Invalid cell reference.",
            Self::Na => "Value not available.",
            Self::Num => "Invalid numeric value.",
            Self::Null => "Ranges do not intersect.",
            Self::Spill => "Result does not fit into a single value.",
            Self::Calc => "Calculation could not be completed.",
            Self::Error => "Formula could not be parsed.",
            Self::NotImplemented => "Function is not supported.",
            Self::Cancelled => "Calculation was cancelled.",
        }
    }
}

impl Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A named constant or range with this name is already bound.
    #[error("name `{0}` is already defined")]
    DuplicateName(String),

    /// The engine refused a name or sheet (invalid identifier, reserved word, ...).
    #[error("engine rejected `{name}`: {reason}")]
    Rejected { name: String, reason: String },

    /// Structured error value produced by an expression.
    #[error("{kind}")]
    Formula {
        kind: EngineErrorKind,
        message: Option<String>,
    },

    /// Unknown sheet handle.
    #[error("unknown sheet handle {0:?}")]
    UnknownSheet(SheetId),

    /// Any other failure inside the engine binding.
    #[error("engine failure: {0}")]
    Adapter(String),
}

impl EngineError {
    pub fn formula(kind: EngineErrorKind) -> Self {
        EngineError::Formula {
            kind,
            message: None,
        }
    }
}

/// Rectangle anchored at the top-left cell of a sheet, used for lookup-table names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpan {
    pub sheet: String,
    pub rows: u32,
    pub cols: u32,
}

/// Minimal surface the calculation core needs from a formula engine.
///
/// Row and column indices are 0-based.
pub trait EngineAdapter {
    fn add_sheet(&mut self, name: &str) -> Result<SheetId, EngineError>;

    fn sheet_exists(&self, name: &str) -> bool;

    fn sheet_id(&self, name: &str) -> Option<SheetId>;

    /// Bulk-load a grid starting at the sheet's top-left cell.
    fn set_sheet_content(&mut self, sheet: SheetId, grid: &[Vec<CellValue>])
    -> Result<(), EngineError>;

    /// Bind `name` to an expression (`=<literal>`). Fails with
    /// [`EngineError::DuplicateName`] when `name` is already bound.
    fn bind_constant(&mut self, name: &str, expression: &str) -> Result<(), EngineError>;

    /// Bind `name` to a range of cells. Same duplicate rules as [`Self::bind_constant`].
    fn bind_range(&mut self, name: &str, range: &RangeSpan) -> Result<(), EngineError>;

    fn set_cell(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        expression: &str,
    ) -> Result<(), EngineError>;

    /// Compute and return the value of a cell. Structured engine errors come back as
    /// [`EngineError::Formula`].
    fn read_cell(&mut self, sheet: SheetId, row: u32, col: u32) -> Result<CellValue, EngineError>;

    /// Make `TRUE` and `FALSE` referenceable from literal renderings.
    ///
    /// Engines with native boolean literals override this with a no-op.
    fn install_boolean_constants(&mut self) -> Result<(), EngineError> {
        self.bind_constant("TRUE", "=TRUE()")?;
        self.bind_constant("FALSE", "=FALSE()")
    }

    /// Release every resource held by the instance.
    fn dispose(self);
}

/// Builds isolated, empty engine instances.
pub trait EngineFactory {
    type Engine: EngineAdapter;

    fn create(&self) -> Result<Self::Engine, EngineError>;
}

/// Owns an engine instance and disposes it exactly once when dropped.
pub struct EngineGuard<E: EngineAdapter> {
    engine: Option<E>,
}

impl<E: EngineAdapter> EngineGuard<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn get(&mut self) -> Result<&mut E, EngineError> {
        self.engine
            .as_mut()
            .ok_or_else(|| EngineError::Adapter("engine used after disposal".to_string()))
    }

    /// Dispose now instead of at drop time.
    pub fn dispose(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.engine.is_none()
    }
}

impl<E: EngineAdapter> Drop for EngineGuard<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}
