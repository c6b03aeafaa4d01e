//! [`EngineAdapter`] binding for the formualizer workbook engine.

use crate::engine::{
    EngineAdapter, EngineError, EngineErrorKind, EngineFactory, RangeSpan, SheetId,
};
use crate::literal::parse_constant;
use crate::value::CellValue;
use formualizer_common::{ExcelError, ExcelErrorKind, LiteralValue, RangeAddress};
use formualizer_workbook::{IoError, NamedRangeScope, Workbook, WorkbookConfig};
use rustc_hash::FxHashSet;

impl From<ExcelErrorKind> for EngineErrorKind {
    fn from(kind: ExcelErrorKind) -> Self {
        #[allow(unreachable_patterns)]
        match kind {
            ExcelErrorKind::Div => EngineErrorKind::DivByZero,
            ExcelErrorKind::Name => EngineErrorKind::Name,
            ExcelErrorKind::Circ => EngineErrorKind::Cycle,
            ExcelErrorKind::Value => EngineErrorKind::Value,
            ExcelErrorKind::Ref => EngineErrorKind::Ref,
            ExcelErrorKind::Na => EngineErrorKind::Na,
            ExcelErrorKind::Num => EngineErrorKind::Num,
            ExcelErrorKind::Null => EngineErrorKind::Null,
            ExcelErrorKind::Spill => EngineErrorKind::Spill,
            ExcelErrorKind::Calc => EngineErrorKind::Calc,
            ExcelErrorKind::NImpl => EngineErrorKind::NotImplemented,
            ExcelErrorKind::Cancelled => EngineErrorKind::Cancelled,
            ExcelErrorKind::Error => EngineErrorKind::Error,
            _ => EngineErrorKind::Error,
        }
    }
}

impl From<ExcelError> for EngineError {
    fn from(err: ExcelError) -> Self {
        EngineError::Formula {
            kind: err.kind.into(),
            message: err.message,
        }
    }
}

fn literal_to_cell(value: LiteralValue) -> Result<CellValue, EngineError> {
    match value {
        LiteralValue::Int(i) => Ok(CellValue::Number(i as f64)),
        LiteralValue::Number(n) => Ok(CellValue::Number(n)),
        LiteralValue::Text(s) => Ok(CellValue::Text(s)),
        LiteralValue::Boolean(b) => Ok(CellValue::Boolean(b)),
        LiteralValue::Empty | LiteralValue::Pending => Ok(CellValue::Null),
        LiteralValue::Error(err) => Err(err.into()),
        // Single-cell reads collapse arrays to their top-left element.
        LiteralValue::Array(rows) => {
            let first = rows.into_iter().next().and_then(|row| row.into_iter().next());
            match first {
                Some(first) => literal_to_cell(first),
                None => Ok(CellValue::Null),
            }
        }
        other => match other.as_serial_number() {
            Some(serial) => Ok(CellValue::Number(serial)),
            None => Err(EngineError::Adapter(format!(
                "unsupported engine value {other:?}"
            ))),
        },
    }
}

fn cell_to_literal(value: &CellValue) -> LiteralValue {
    match value {
        CellValue::Null => LiteralValue::Empty,
        CellValue::Boolean(b) => LiteralValue::Boolean(*b),
        CellValue::Number(n) => LiteralValue::Number(*n),
        CellValue::Text(s) => LiteralValue::Text(s.clone()),
    }
}

fn io_to_engine(err: IoError) -> EngineError {
    match err {
        IoError::Engine(err) => err.into(),
        other => EngineError::Adapter(other.to_string()),
    }
}

/// Builds [`FormualizerEngine`] instances in ephemeral mode (no changelog, no undo).
#[derive(Debug, Clone, Default)]
pub struct FormualizerFactory;

impl EngineFactory for FormualizerFactory {
    type Engine = FormualizerEngine;

    fn create(&self) -> Result<FormualizerEngine, EngineError> {
        Ok(FormualizerEngine::new())
    }
}

/// Sheet holding one cell per named constant. The space keeps it apart from every
/// sanitized table sheet name.
const CONSTANTS_SHEET: &str = "Calc Constants";

/// One isolated formualizer workbook.
///
/// Named constants are stored as values in [`CONSTANTS_SHEET`] and bound as single-cell
/// named ranges; the engine does not resolve formula-backed names.
pub struct FormualizerEngine {
    workbook: Workbook,
    sheets: Vec<String>,
    names: FxHashSet<String>,
    constants: u32,
}

impl Default for FormualizerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FormualizerEngine {
    pub fn new() -> Self {
        Self {
            workbook: Workbook::new_with_config(WorkbookConfig::ephemeral()),
            sheets: Vec::new(),
            names: FxHashSet::default(),
            constants: 0,
        }
    }

    fn sheet_name(&self, sheet: SheetId) -> Result<&str, EngineError> {
        self.sheets
            .get(sheet.0)
            .map(String::as_str)
            .ok_or(EngineError::UnknownSheet(sheet))
    }

    /// Excel names are case-insensitive.
    fn claim_name(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.names.insert(name.to_ascii_uppercase()) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn release_name(&mut self, name: &str) {
        self.names.remove(&name.to_ascii_uppercase());
    }

    /// Write `expression` into the next constants cell and point `name` at it.
    fn store_constant(&mut self, name: &str, expression: &str) -> Result<(), EngineError> {
        if !self.workbook.has_sheet(CONSTANTS_SHEET) {
            self.workbook
                .add_sheet(CONSTANTS_SHEET)
                .map_err(|err| Self::rejected(name, err))?;
        }
        let row = self.constants + 1;
        match parse_constant(expression) {
            Some(value) => self
                .workbook
                .set_values(CONSTANTS_SHEET, row, 1, &[vec![cell_to_literal(&value)]])
                .map_err(io_to_engine)?,
            None => self
                .workbook
                .set_formula(CONSTANTS_SHEET, row, 1, expression)
                .map_err(|err| Self::rejected(name, err))?,
        }
        let address = RangeAddress::new(CONSTANTS_SHEET, row, 1, row, 1)
            .map_err(|err| Self::rejected(name, err))?;
        self.workbook
            .define_named_range(name, &address, NamedRangeScope::Workbook)
            .map_err(|err| Self::rejected(name, err))?;
        self.constants = row;
        Ok(())
    }

    fn rejected(name: &str, err: impl ToString) -> EngineError {
        EngineError::Rejected {
            name: name.to_string(),
            reason: err.to_string(),
        }
    }
}

impl EngineAdapter for FormualizerEngine {
    fn add_sheet(&mut self, name: &str) -> Result<SheetId, EngineError> {
        if self.sheet_id(name).is_some() {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        // A fresh workbook may already carry a default sheet; adopt it.
        if !self.workbook.has_sheet(name) {
            self.workbook
                .add_sheet(name)
                .map_err(|err| Self::rejected(name, err))?;
        }
        self.sheets.push(name.to_string());
        Ok(SheetId(self.sheets.len() - 1))
    }

    fn sheet_exists(&self, name: &str) -> bool {
        self.workbook.has_sheet(name)
    }

    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheets.iter().position(|s| s == name).map(SheetId)
    }

    fn set_sheet_content(
        &mut self,
        sheet: SheetId,
        grid: &[Vec<CellValue>],
    ) -> Result<(), EngineError> {
        let name = self.sheet_name(sheet)?.to_string();
        let rows: Vec<Vec<LiteralValue>> = grid
            .iter()
            .map(|row| row.iter().map(cell_to_literal).collect())
            .collect();
        self.workbook
            .set_values(&name, 1, 1, &rows)
            .map_err(io_to_engine)
    }

    fn bind_constant(&mut self, name: &str, expression: &str) -> Result<(), EngineError> {
        self.claim_name(name)?;
        if let Err(err) = self.store_constant(name, expression) {
            self.release_name(name);
            return Err(err);
        }
        Ok(())
    }

    fn bind_range(&mut self, name: &str, range: &RangeSpan) -> Result<(), EngineError> {
        let address = RangeAddress::new(range.sheet.as_str(), 1, 1, range.rows, range.cols)
            .map_err(|err| Self::rejected(name, err))?;
        self.claim_name(name)?;
        if let Err(err) =
            self.workbook
                .define_named_range(name, &address, NamedRangeScope::Workbook)
        {
            self.release_name(name);
            return Err(Self::rejected(name, err));
        }
        Ok(())
    }

    fn set_cell(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        expression: &str,
    ) -> Result<(), EngineError> {
        let name = self.sheet_name(sheet)?.to_string();
        match self.workbook.set_formula(&name, row + 1, col + 1, expression) {
            Ok(()) => Ok(()),
            Err(IoError::Engine(err)) => Err(err.into()),
            // Anything else the workbook reports here comes from the parser.
            Err(other) => Err(EngineError::Formula {
                kind: EngineErrorKind::Error,
                message: Some(other.to_string()),
            }),
        }
    }

    fn read_cell(&mut self, sheet: SheetId, row: u32, col: u32) -> Result<CellValue, EngineError> {
        let name = self.sheet_name(sheet)?.to_string();
        let value = self
            .workbook
            .evaluate_cell(&name, row + 1, col + 1)
            .map_err(io_to_engine)?;
        literal_to_cell(value)
    }

    fn install_boolean_constants(&mut self) -> Result<(), EngineError> {
        // TRUE and FALSE are literals in the formualizer tokenizer.
        Ok(())
    }

    fn dispose(self) {
        tracing::trace!(sheets = self.sheets.len(), "disposing workbook");
        drop(self.workbook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_stable_tokens() {
        assert_eq!(EngineErrorKind::from(ExcelErrorKind::Div).as_str(), "DIV_BY_ZERO");
        assert_eq!(EngineErrorKind::from(ExcelErrorKind::Circ).as_str(), "CYCLE");
        assert_eq!(EngineErrorKind::from(ExcelErrorKind::Name).as_str(), "NAME");
        assert_eq!(EngineErrorKind::from(ExcelErrorKind::NImpl).as_str(), "NOT_IMPLEMENTED");
    }

    #[test]
    fn literal_conversion_collapses_arrays_and_errors() {
        assert_eq!(literal_to_cell(LiteralValue::Int(3)).unwrap(), CellValue::Number(3.0));
        assert_eq!(literal_to_cell(LiteralValue::Empty).unwrap(), CellValue::Null);
        let array = LiteralValue::Array(vec![vec![
            LiteralValue::Text("a".into()),
            LiteralValue::Text("b".into()),
        ]]);
        assert_eq!(literal_to_cell(array).unwrap(), CellValue::Text("a".into()));
        let err = literal_to_cell(LiteralValue::Error(ExcelError::new(ExcelErrorKind::Ref)))
            .unwrap_err();
        assert_eq!(err, EngineError::formula(EngineErrorKind::Ref));
    }

    #[test]
    fn duplicate_constants_are_reported() {
        let mut engine = FormualizerEngine::new();
        engine.bind_constant("VAR_X_123ABC", "=1").unwrap();
        let err = engine.bind_constant("var_x_123abc", "=2").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateName(_)));
        engine.dispose();
    }

    fn eval(engine: &mut FormualizerEngine, formula: &str) -> Result<CellValue, EngineError> {
        let sheet = engine.add_sheet("Out")?;
        engine.set_cell(sheet, 0, 0, formula)?;
        engine.read_cell(sheet, 0, 0)
    }

    #[test]
    fn constants_resolve_as_values() {
        let mut engine = FormualizerEngine::new();
        engine.bind_constant("VAR_A_7FC56B", "=7").unwrap();
        engine.bind_constant("VAR_B_9D5ED6", "=3").unwrap();
        assert_eq!(
            eval(&mut engine, "=(VAR_A_7FC56B + VAR_B_9D5ED6 * 5) / 2").unwrap(),
            CellValue::Number(11.0)
        );
        engine.dispose();
    }

    #[test]
    fn text_and_boolean_constants_keep_their_type() {
        let mut engine = FormualizerEngine::new();
        engine.bind_constant("GREETING", "=\"say \"\"hi\"\"\"").unwrap();
        engine.bind_constant("FLAG", "=TRUE").unwrap();
        assert_eq!(
            eval(&mut engine, "=IF(FLAG, GREETING, \"no\")").unwrap(),
            CellValue::Text("say \"hi\"".into())
        );
        engine.dispose();
    }

    #[test]
    fn sheets_cannot_be_added_twice() {
        let mut engine = FormualizerEngine::new();
        engine.add_sheet("Rates").unwrap();
        assert!(matches!(
            engine.add_sheet("Rates"),
            Err(EngineError::DuplicateName(_))
        ));
        engine.dispose();
    }

    #[test]
    fn sheets_resolve_by_name() {
        let mut engine = FormualizerEngine::new();
        let id = engine.add_sheet("Rates").unwrap();
        assert!(engine.sheet_exists("Rates"));
        assert_eq!(engine.sheet_id("Rates"), Some(id));
        assert_eq!(engine.sheet_id("Missing"), None);
        engine.dispose();
    }
}
