use std::collections::BTreeMap;

use gridbind_common::{CellRef, CellValue, column_to_letters};

use crate::error::{IoError, a1};

/// One outgoing cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetCell {
    /// Column letters (`A`, `AB`, ...).
    pub column: String,
    pub col: u32,
    pub row: u32,
    pub value: CellValue,
    /// Formula text without the leading `=`.
    pub formula: Option<String>,
}

impl SheetCell {
    pub fn new(row: u32, col: u32, value: CellValue) -> Self {
        Self {
            column: column_to_letters(col),
            col,
            row,
            value,
            formula: None,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn a1(&self) -> String {
        format!("{}{}", self.column, self.row)
    }
}

/// One incoming row: absolute column number to value, blank cells omitted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRow {
    pub row: u32,
    pub cells: BTreeMap<u32, CellValue>,
}

impl SourceRow {
    pub fn new(row: u32) -> Self {
        Self {
            row,
            cells: BTreeMap::new(),
        }
    }

    pub fn with_cell(mut self, col: u32, value: impl Into<CellValue>) -> Self {
        self.insert(col, value.into());
        self
    }

    /// Store a value; blank values are dropped.
    pub fn insert(&mut self, col: u32, value: CellValue) {
        if !value.is_blank() {
            self.cells.insert(col, value);
        }
    }

    pub fn get(&self, col: u32) -> Option<&CellValue> {
        self.cells.get(&col)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_blank)
    }
}

/// Consumer of row-major cell output for one worksheet at a time.
///
/// Rows arrive in non-decreasing order and cells in ascending column order
/// within a row. Rows with no cells are placeholders that keep row numbering
/// contiguous.
pub trait CellSink {
    fn start_sheet(&mut self, name: &str) -> Result<(), IoError>;

    fn write_row(&mut self, row: u32, cells: &[SheetCell]) -> Result<(), IoError>;

    fn finish_sheet(&mut self) -> Result<(), IoError>;
}

/// Producer of rows for one worksheet at a time.
pub trait RowSource {
    /// Position at `start`. Rows above `start.row()` and columns left of
    /// `start.col()` are never yielded. With `has_header` the first row at or
    /// below `start` is skipped.
    fn open(&mut self, sheet: &str, start: CellRef, has_header: bool) -> Result<(), IoError>;

    /// Next row in ascending order, or `None` once the sheet is exhausted.
    fn next_row(&mut self) -> Result<Option<SourceRow>, IoError>;
}

impl<S: CellSink + ?Sized> CellSink for &mut S {
    fn start_sheet(&mut self, name: &str) -> Result<(), IoError> {
        (**self).start_sheet(name)
    }

    fn write_row(&mut self, row: u32, cells: &[SheetCell]) -> Result<(), IoError> {
        (**self).write_row(row, cells)
    }

    fn finish_sheet(&mut self) -> Result<(), IoError> {
        (**self).finish_sheet()
    }
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn open(&mut self, sheet: &str, start: CellRef, has_header: bool) -> Result<(), IoError> {
        (**self).open(sheet, start, has_header)
    }

    fn next_row(&mut self) -> Result<Option<SourceRow>, IoError> {
        (**self).next_row()
    }
}

/// Enforces the row-major write contract for sink implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderGuard {
    last_row: u32,
    last_cell: Option<(u32, u32)>,
}

impl OrderGuard {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Last row seen, including placeholder rows.
    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    pub fn check_row(&mut self, row: u32, cells: &[SheetCell]) -> Result<(), IoError> {
        if row < self.last_row {
            return Err(IoError::OutOfOrder {
                cell: format!("row {row}"),
                previous: format!("row {}", self.last_row),
            });
        }
        for cell in cells {
            if cell.row != row {
                return Err(IoError::RowMismatch {
                    cell: cell.a1(),
                    row,
                });
            }
            let pos = (cell.row, cell.col);
            if let Some(last) = self.last_cell {
                if pos == last {
                    return Err(IoError::DuplicateCell(cell.a1()));
                }
                if pos < last {
                    return Err(IoError::OutOfOrder {
                        cell: cell.a1(),
                        previous: a1(last.0, last.1),
                    });
                }
            }
            self.last_cell = Some(pos);
        }
        self.last_row = row;
        Ok(())
    }
}
