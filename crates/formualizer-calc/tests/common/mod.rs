#![allow(dead_code)]

use crossbeam_channel::Receiver;
use formualizer_calc::{
    CellValue, EngineAdapter, EngineError, EngineFactory, RangeSpan, SheetId,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddSheet(String),
    SetSheetContent { sheet: SheetId, rows: usize },
    BindConstant { name: String, expression: String },
    BindRange { name: String, range: RangeSpan },
    SetCell { sheet: SheetId, row: u32, col: u32, expression: String },
    ReadCell { sheet: SheetId, row: u32, col: u32 },
}

/// Shared view of everything the spy engines did.
#[derive(Default)]
pub struct SpyLog {
    pub created: AtomicUsize,
    pub disposed: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl SpyLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn formula_writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetCell { expression, .. } => Some(expression),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Factory for [`SpyEngine`]s. Every field configures the engines it creates.
#[derive(Clone, Default)]
pub struct SpyFactory {
    pub log: Arc<SpyLog>,
    /// Value `read_cell` returns.
    pub result: Option<Result<CellValue, EngineError>>,
    /// Names already bound in every new engine.
    pub prebound: Vec<String>,
    /// Panic inside `read_cell` when the written formula contains this text.
    pub panic_marker: Option<String>,
    /// `read_cell` blocks until this channel yields or disconnects.
    pub gate: Option<Receiver<()>>,
    pub fail_create: bool,
}

impl SpyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(result: Result<CellValue, EngineError>) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }
}

impl EngineFactory for SpyFactory {
    type Engine = SpyEngine;

    fn create(&self) -> Result<SpyEngine, EngineError> {
        if self.fail_create {
            return Err(EngineError::Adapter("spy refused to create".into()));
        }
        self.log.created.fetch_add(1, Ordering::SeqCst);
        Ok(SpyEngine {
            config: self.clone(),
            sheets: Vec::new(),
            names: self.prebound.iter().map(|n| n.to_uppercase()).collect(),
            formula: None,
        })
    }
}

pub struct SpyEngine {
    config: SpyFactory,
    sheets: Vec<String>,
    names: HashSet<String>,
    formula: Option<String>,
}

impl SpyEngine {
    fn claim(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.names.insert(name.to_uppercase()) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

impl EngineAdapter for SpyEngine {
    fn add_sheet(&mut self, name: &str) -> Result<SheetId, EngineError> {
        self.config.log.record(Call::AddSheet(name.to_string()));
        if self.sheet_exists(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        self.sheets.push(name.to_string());
        Ok(SheetId(self.sheets.len() - 1))
    }

    fn sheet_exists(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s == name)
    }

    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheets.iter().position(|s| s == name).map(SheetId)
    }

    fn set_sheet_content(
        &mut self,
        sheet: SheetId,
        grid: &[Vec<CellValue>],
    ) -> Result<(), EngineError> {
        self.config.log.record(Call::SetSheetContent {
            sheet,
            rows: grid.len(),
        });
        Ok(())
    }

    fn bind_constant(&mut self, name: &str, expression: &str) -> Result<(), EngineError> {
        self.config.log.record(Call::BindConstant {
            name: name.to_string(),
            expression: expression.to_string(),
        });
        self.claim(name)
    }

    fn bind_range(&mut self, name: &str, range: &RangeSpan) -> Result<(), EngineError> {
        self.config.log.record(Call::BindRange {
            name: name.to_string(),
            range: range.clone(),
        });
        self.claim(name)
    }

    fn set_cell(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u32,
        expression: &str,
    ) -> Result<(), EngineError> {
        self.config.log.record(Call::SetCell {
            sheet,
            row,
            col,
            expression: expression.to_string(),
        });
        self.formula = Some(expression.to_string());
        Ok(())
    }

    fn read_cell(&mut self, sheet: SheetId, row: u32, col: u32) -> Result<CellValue, EngineError> {
        self.config.log.record(Call::ReadCell { sheet, row, col });
        if let Some(gate) = &self.config.gate {
            let _ = gate.recv();
        }
        if let (Some(marker), Some(formula)) = (&self.config.panic_marker, &self.formula) {
            if formula.contains(marker.as_str()) {
                panic!("spy engine asked to panic");
            }
        }
        self.config
            .result
            .clone()
            .unwrap_or(Ok(CellValue::Number(0.0)))
    }

    fn dispose(self) {
        self.config.log.disposed.fetch_add(1, Ordering::SeqCst);
    }
}
