use crate::budget::BudgetExceeded;
use crate::engine::{EngineError, EngineErrorKind};
use crate::error::RegistrationError;
use crate::value::CellValue;
use serde::{Serialize, Serializer};
use std::fmt::{self, Display};

/// Classified reason a request did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Missing or invalid credential (request boundary).
    Unauthorized,
    /// Malformed request shape (request boundary).
    Validation,
    /// Cell budget exceeded before evaluation.
    ResourceLimit,
    /// Structured error reported by the engine for the formula.
    Engine(EngineErrorKind),
    /// Anything not otherwise classified.
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Unauthorized => "UNAUTHORIZED",
            FailureKind::Validation => "VALIDATION",
            FailureKind::ResourceLimit => "RESOURCE_LIMIT",
            FailureKind::Engine(kind) => kind.as_str(),
            FailureKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FailureKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A classified failure with a message safe to show to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<RegistrationError> for Failure {
    fn from(err: RegistrationError) -> Self {
        Failure::internal(err.to_string())
    }
}

impl From<BudgetExceeded> for Failure {
    fn from(err: BudgetExceeded) -> Self {
        Failure::new(FailureKind::ResourceLimit, err.to_string())
    }
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Formula { kind, .. } => {
                Failure::new(FailureKind::Engine(kind), kind.description())
            }
            _ => Failure::internal("Calculation engine failure."),
        }
    }
}

/// Result of one calculation task.
#[derive(Debug, Clone, PartialEq)]
pub enum CalculationOutcome {
    Success { value: CellValue },
    Failure { kind: FailureKind, message: String },
}

impl CalculationOutcome {
    pub fn success(value: impl Into<CellValue>) -> Self {
        CalculationOutcome::Success {
            value: value.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CalculationOutcome::Success { .. })
    }

    pub fn value(&self) -> Option<&CellValue> {
        match self {
            CalculationOutcome::Success { value } => Some(value),
            CalculationOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            CalculationOutcome::Success { .. } => None,
            CalculationOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<Failure> for CalculationOutcome {
    fn from(failure: Failure) -> Self {
        CalculationOutcome::Failure {
            kind: failure.kind,
            message: failure.message,
        }
    }
}
