//! Translation of user-supplied variable keys and lookup tables into engine symbols.
//!
//! Variable keys become `VAR_<KEY>_<HASH>` constants so that no user key can shadow a
//! built-in function, a cell reference or another binding. Lookup tables become one sheet
//! each plus a workbook-scoped named range spanning the loaded grid.

use crate::budget::ResourceBudget;
use crate::engine::{EngineAdapter, EngineError, RangeSpan};
use crate::error::RegistrationError;
use crate::literal::constant_expression;
use crate::value::{CellValue, VariableValue};
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap};

/// Sheet that receives the user's formula; tables may not claim it.
pub const CALCULATION_SHEET: &str = "Calculation_Sheet";

const DIGEST_HEX_LEN: usize = 6;

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Short hex digest of a variable key.
pub fn key_digest(key: &str) -> String {
    let digest = Md5::digest(key.as_bytes());
    let mut hex = String::with_capacity(DIGEST_HEX_LEN);
    for byte in digest.iter().take(DIGEST_HEX_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Engine identifier for a variable key.
pub fn internal_name(key: &str) -> String {
    let stripped: String = key.chars().filter(|c| is_symbol_char(*c)).collect();
    format!("VAR_{stripped}_{}", key_digest(key)).to_uppercase()
}

/// Sheet name for a lookup table: every character outside `[A-Za-z0-9_]` becomes `_`.
pub fn sheet_name_for(table: &str) -> String {
    table
        .chars()
        .map(|c| if is_symbol_char(c) { c } else { '_' })
        .collect()
}

/// Name formulas use to reference a lookup table.
pub fn expression_name_for(table: &str) -> String {
    table.chars().filter(|c| is_symbol_char(*c)).collect()
}

/// Column label for a 0-based column index: A..Z, AA, AB, ...
pub fn column_letters(col: u32) -> String {
    let mut label = Vec::new();
    let mut n = u64::from(col) + 1;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        label.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}

/// Absolute address of a `rows × cols` block anchored at A1, e.g. `$A$1:$B$3`.
pub fn range_address(rows: u32, cols: u32) -> String {
    let last_col = column_letters(cols.saturating_sub(1));
    format!("$A$1:${last_col}${rows}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableBinding {
    pub user_key: String,
    pub internal_name: String,
    pub value: VariableValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupTableBinding {
    pub table_name: String,
    pub sheet_name: String,
    pub rows: u32,
    pub cols: u32,
    pub range_address: String,
    pub expression_name: String,
    pub named_range_expression: String,
}

impl LookupTableBinding {
    pub fn span(&self) -> RangeSpan {
        RangeSpan {
            sheet: self.sheet_name.clone(),
            rows: self.rows,
            cols: self.cols,
        }
    }
}

fn dimension(len: usize, table: &str) -> Result<u32, RegistrationError> {
    u32::try_from(len).map_err(|_| RegistrationError::TableTooLarge {
        table: table.to_string(),
    })
}

/// Registers one request's symbols into a single engine instance.
pub struct SymbolRegistrar<'e, E: EngineAdapter> {
    engine: &'e mut E,
    /// sheet name -> table that claimed it
    claimed_sheets: HashMap<String, String>,
}

impl<'e, E: EngineAdapter> SymbolRegistrar<'e, E> {
    pub fn new(engine: &'e mut E) -> Self {
        Self {
            engine,
            claimed_sheets: HashMap::new(),
        }
    }

    /// Load every non-empty lookup table and charge its cells to `budget`.
    pub fn register_tables(
        &mut self,
        tables: &BTreeMap<String, Vec<Vec<CellValue>>>,
        budget: &mut ResourceBudget,
    ) -> Result<Vec<LookupTableBinding>, RegistrationError> {
        let mut bindings = Vec::with_capacity(tables.len());
        for (name, grid) in tables {
            if let Some(binding) = self.register_table(name, grid, budget)? {
                bindings.push(binding);
            }
        }
        Ok(bindings)
    }

    fn register_table(
        &mut self,
        table: &str,
        grid: &[Vec<CellValue>],
        budget: &mut ResourceBudget,
    ) -> Result<Option<LookupTableBinding>, RegistrationError> {
        let Some(first_row) = grid.first() else {
            tracing::debug!(table, "skipping empty lookup table");
            return Ok(None);
        };
        if first_row.is_empty() {
            tracing::debug!(table, "skipping lookup table without columns");
            return Ok(None);
        }

        let rows = dimension(grid.len(), table)?;
        let cols = dimension(first_row.len(), table)?;
        let widest = grid.iter().map(Vec::len).max().unwrap_or(0);
        budget.charge_table(rows, dimension(widest, table)?);

        let sheet_name = sheet_name_for(table);
        if sheet_name == CALCULATION_SHEET {
            return Err(RegistrationError::ReservedSheet {
                table: table.to_string(),
            });
        }
        if let Some(previous) = self.claimed_sheets.get(&sheet_name) {
            return Err(RegistrationError::SheetCollision {
                table: table.to_string(),
                other: previous.clone(),
            });
        }
        self.claimed_sheets
            .insert(sheet_name.clone(), table.to_string());

        let table_err = |source: EngineError| RegistrationError::Table {
            table: table.to_string(),
            source,
        };
        let sheet = self.engine.add_sheet(&sheet_name).map_err(table_err)?;
        self.engine
            .set_sheet_content(sheet, grid)
            .map_err(table_err)?;

        let range_address = range_address(rows, cols);
        let binding = LookupTableBinding {
            table_name: table.to_string(),
            named_range_expression: format!("='{sheet_name}'!{range_address}"),
            expression_name: expression_name_for(table),
            sheet_name,
            rows,
            cols,
            range_address,
        };
        if binding.expression_name.is_empty() {
            return Err(RegistrationError::UnnamedTable {
                table: table.to_string(),
            });
        }
        self.engine
            .bind_range(&binding.expression_name, &binding.span())
            .map_err(table_err)?;

        tracing::debug!(
            table,
            rows,
            cols,
            sheet = binding.sheet_name.as_str(),
            "registered lookup table"
        );
        Ok(Some(binding))
    }

    /// Bind every variable as a named constant and charge one cell per variable.
    pub fn register_variables(
        &mut self,
        variables: &BTreeMap<String, VariableValue>,
        budget: &mut ResourceBudget,
    ) -> Result<Vec<VariableBinding>, RegistrationError> {
        let mut bindings = Vec::with_capacity(variables.len());
        for (key, value) in variables {
            let internal_name = internal_name(key);
            let expression = constant_expression(value);
            match self.engine.bind_constant(&internal_name, &expression) {
                Ok(()) => {}
                Err(EngineError::DuplicateName(_)) => {
                    return Err(RegistrationError::DuplicateVariable { key: key.clone() });
                }
                Err(source) => {
                    return Err(RegistrationError::Variable {
                        key: key.clone(),
                        source,
                    });
                }
            }
            bindings.push(VariableBinding {
                user_key: key.clone(),
                internal_name,
                value: value.clone(),
            });
        }
        budget.charge_variables(bindings.len());
        tracing::debug!(count = bindings.len(), "registered variables");
        Ok(bindings)
    }
}
