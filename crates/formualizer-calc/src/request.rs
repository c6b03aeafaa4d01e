use crate::error::ValidationError;
use crate::value::{CellValue, VariableValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"));

pub fn is_valid_variable_name(name: &str) -> bool {
    VARIABLE_NAME.is_match(name)
}

/// One calculation: a formula, its `#variables` and named lookup tables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    pub formula: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, VariableValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lookup_tables: BTreeMap<String, Vec<Vec<CellValue>>>,
}

impl CalculationRequest {
    pub fn new(formula: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            ..Default::default()
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        self.lookup_tables.insert(name.into(), rows);
        self
    }

    /// Parse and validate a JSON body no larger than `max_body_bytes`.
    pub fn from_json_slice(body: &[u8], max_body_bytes: usize) -> Result<Self, ValidationError> {
        if body.len() > max_body_bytes {
            return Err(ValidationError::BodyTooLarge {
                limit: max_body_bytes,
            });
        }
        let request: Self = serde_json::from_slice(body)
            .map_err(|err| ValidationError::Malformed(err.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.formula.is_empty() {
            return Err(ValidationError::EmptyFormula);
        }
        if let Some(bad) = self.variables.keys().find(|k| !is_valid_variable_name(k)) {
            return Err(ValidationError::InvalidVariableName(bad.clone()));
        }
        Ok(())
    }
}
