//! Transport-neutral request boundary: credential check, validation, status codes and
//! response bodies. An HTTP front end only has to move bytes in and out of these helpers.

use crate::error::{PoolError, ValidationError};
use crate::outcome::{CalculationOutcome, FailureKind};
use crate::pool::ExecutionPool;
use crate::request::CalculationRequest;
use crate::value::CellValue;
use serde::Serialize;

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths that skip the API key check.
pub const PUBLIC_PATHS: &[&str] = &["/documentation", "/health", "/static"];

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_PAYLOAD_TOO_LARGE: u16 = 413;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_INTERNAL: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// JSON body returned for `/calculate` and for rejected requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CalculateResponse {
    fn error(error_type: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            error_type: error_type.map(str::to_string),
            error: None,
            message: Some(message.into()),
        }
    }
}

/// Status code plus body, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub status_code: u16,
    pub body: CalculateResponse,
}

/// Transport status for an outcome.
pub fn status_code(outcome: &CalculationOutcome) -> u16 {
    match outcome {
        CalculationOutcome::Success { .. } => STATUS_OK,
        CalculationOutcome::Failure {
            kind: FailureKind::ResourceLimit,
            ..
        } => STATUS_PAYLOAD_TOO_LARGE,
        CalculationOutcome::Failure { .. } => STATUS_UNPROCESSABLE,
    }
}

pub fn respond(outcome: CalculationOutcome) -> Reply {
    let status_code = status_code(&outcome);
    let body = match outcome {
        CalculationOutcome::Success { value } => CalculateResponse {
            status: ResponseStatus::Success,
            result: Some(value),
            error_type: None,
            error: None,
            message: None,
        },
        CalculationOutcome::Failure { kind, message } => {
            CalculateResponse::error(Some(kind.as_str()), message)
        }
    };
    Reply { status_code, body }
}

pub fn bad_request(err: &ValidationError) -> Reply {
    match err {
        ValidationError::BodyTooLarge { .. } => Reply {
            status_code: STATUS_PAYLOAD_TOO_LARGE,
            body: CalculateResponse::error(None, err.to_string()),
        },
        _ => Reply {
            status_code: STATUS_BAD_REQUEST,
            body: CalculateResponse {
                error: Some("Bad Request".to_string()),
                ..CalculateResponse::error(Some(FailureKind::Validation.as_str()), err.to_string())
            },
        },
    }
}

pub fn unauthorized() -> Reply {
    Reply {
        status_code: STATUS_UNAUTHORIZED,
        body: CalculateResponse::error(
            Some(FailureKind::Unauthorized.as_str()),
            "Invalid or missing API Key",
        ),
    }
}

/// The pool could not produce an outcome at all.
pub fn internal_error(err: &PoolError) -> Reply {
    tracing::error!(error = %err, "calculation did not complete");
    Reply {
        status_code: STATUS_INTERNAL,
        body: CalculateResponse::error(None, "Worker execution failed"),
    }
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|prefix| path.starts_with(prefix))
}

/// With no key configured every request is refused.
pub fn authorize(expected: Option<&str>, provided: Option<&str>) -> Result<(), Reply> {
    match (expected, provided) {
        (Some(expected), Some(provided)) if !expected.is_empty() && expected == provided => Ok(()),
        _ => Err(unauthorized()),
    }
}

/// Full `/calculate` flow for a raw body: validate, run on the pool, map the outcome.
pub fn handle_calculate(pool: &ExecutionPool, body: &[u8]) -> Reply {
    let request = match CalculationRequest::from_json_slice(body, pool.config().limits.max_body_bytes)
    {
        Ok(request) => request,
        Err(err) => return bad_request(&err),
    };
    match pool.run(request) {
        Ok(outcome) => respond(outcome),
        Err(err) => internal_error(&err),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// Seconds since the pool started.
    pub uptime: f64,
    pub workers: usize,
}

pub fn health(pool: &ExecutionPool) -> HealthReport {
    HealthReport {
        status: "ok",
        uptime: pool.uptime().as_secs_f64(),
        workers: pool.live_workers(),
    }
}
