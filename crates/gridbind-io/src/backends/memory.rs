use std::collections::BTreeMap;

use gridbind_common::{CellRef, CellValue};
use rustc_hash::FxHashMap;

use crate::error::IoError;
use crate::traits::{CellSink, OrderGuard, RowSource, SheetCell, SourceRow};

#[derive(Debug, Clone, Default, PartialEq)]
struct StoredCell {
    value: CellValue,
    formula: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct MemorySheet {
    cells: BTreeMap<(u32, u32), StoredCell>,
    /// Highest row written, placeholder rows included.
    last_row: u32,
}

impl MemorySheet {
    fn last_row(&self) -> u32 {
        let populated = self.cells.keys().next_back().map(|(r, _)| *r).unwrap_or(0);
        self.last_row.max(populated)
    }
}

#[derive(Debug, Clone)]
struct ReadCursor {
    sheet: String,
    start: CellRef,
    next_row: u32,
    end_row: u32,
}

/// Multi-sheet workbook held in memory. Implements both [`CellSink`] and
/// [`RowSource`], so output of a write pass can be read straight back.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: FxHashMap<String, MemorySheet>,
    order: Vec<String>,
    active: Option<String>,
    guard: OrderGuard,
    cursor: Option<ReadCursor>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sheet names in creation order.
    pub fn sheet_names(&self) -> &[String] {
        &self.order
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.contains_key(name)
    }

    /// Place a value directly, bypassing the streaming order contract.
    /// Useful for preparing input sheets.
    pub fn set_value(&mut self, sheet: &str, cell: CellRef, value: impl Into<CellValue>) {
        let value = value.into();
        let sheet = self.sheet_mut(sheet);
        if value.is_blank() {
            sheet.cells.remove(&(cell.row(), cell.col()));
        } else {
            sheet.cells.insert(
                (cell.row(), cell.col()),
                StoredCell {
                    value,
                    formula: None,
                },
            );
        }
    }

    pub fn value(&self, sheet: &str, cell: CellRef) -> Option<&CellValue> {
        self.stored(sheet, cell).map(|c| &c.value)
    }

    /// Convenience lookup by A1 address. Unparseable addresses yield `None`.
    pub fn value_a1(&self, sheet: &str, a1: &str) -> Option<&CellValue> {
        let cell = CellRef::parse_a1(a1).ok()?;
        self.value(sheet, cell)
    }

    pub fn formula(&self, sheet: &str, cell: CellRef) -> Option<&str> {
        self.stored(sheet, cell).and_then(|c| c.formula.as_deref())
    }

    /// Last row written to `sheet`, placeholder rows included.
    pub fn row_count(&self, sheet: &str) -> u32 {
        self.sheets.get(sheet).map(MemorySheet::last_row).unwrap_or(0)
    }

    /// All populated cells of a sheet in row-major order.
    pub fn cells(&self, sheet: &str) -> Vec<(CellRef, CellValue)> {
        let Some(s) = self.sheets.get(sheet) else {
            return Vec::new();
        };
        s.cells
            .iter()
            .filter_map(|((r, c), cell)| {
                let at = CellRef::new(*r, *c).ok()?;
                Some((at, cell.value.clone()))
            })
            .collect()
    }

    /// Values of one row from column 1 up to the last populated column.
    pub fn row_values(&self, sheet: &str, row: u32) -> Vec<CellValue> {
        let Some(s) = self.sheets.get(sheet) else {
            return Vec::new();
        };
        let cells: Vec<_> = s
            .cells
            .range((row, 0)..=(row, u32::MAX))
            .map(|((_, c), cell)| (*c, cell.value.clone()))
            .collect();
        let width = cells.last().map(|(c, _)| *c).unwrap_or(0);
        let mut out = vec![CellValue::Empty; width as usize];
        for (c, v) in cells {
            out[(c - 1) as usize] = v;
        }
        out
    }

    fn stored(&self, sheet: &str, cell: CellRef) -> Option<&StoredCell> {
        self.sheets
            .get(sheet)
            .and_then(|s| s.cells.get(&(cell.row(), cell.col())))
    }

    fn sheet_mut(&mut self, name: &str) -> &mut MemorySheet {
        if !self.sheets.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sheets.entry(name.to_string()).or_default()
    }
}

impl CellSink for MemoryWorkbook {
    fn start_sheet(&mut self, name: &str) -> Result<(), IoError> {
        let sheet = self.sheet_mut(name);
        *sheet = MemorySheet::default();
        self.active = Some(name.to_string());
        self.guard.reset();
        Ok(())
    }

    fn write_row(&mut self, row: u32, cells: &[SheetCell]) -> Result<(), IoError> {
        let name = self.active.clone().ok_or(IoError::NoActiveSheet)?;
        self.guard.check_row(row, cells)?;
        let sheet = self.sheet_mut(&name);
        sheet.last_row = sheet.last_row.max(row);
        for cell in cells {
            if cell.value.is_blank() && cell.formula.is_none() {
                continue;
            }
            sheet.cells.insert(
                (cell.row, cell.col),
                StoredCell {
                    value: cell.value.clone(),
                    formula: cell.formula.clone(),
                },
            );
        }
        Ok(())
    }

    fn finish_sheet(&mut self) -> Result<(), IoError> {
        self.active.take().ok_or(IoError::NoActiveSheet)?;
        Ok(())
    }
}

impl RowSource for MemoryWorkbook {
    fn open(&mut self, sheet: &str, start: CellRef, has_header: bool) -> Result<(), IoError> {
        let data = self
            .sheets
            .get(sheet)
            .ok_or_else(|| IoError::MissingSheet(sheet.to_string()))?;
        let first = start.row() + u32::from(has_header);
        self.cursor = Some(ReadCursor {
            sheet: sheet.to_string(),
            start,
            next_row: first,
            end_row: data.last_row(),
        });
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<SourceRow>, IoError> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Err(IoError::NoActiveSheet);
        };
        if cursor.next_row > cursor.end_row {
            return Ok(None);
        }
        let row = cursor.next_row;
        cursor.next_row += 1;
        let min_col = cursor.start.col();
        let sheet = self
            .sheets
            .get(&cursor.sheet)
            .ok_or_else(|| IoError::MissingSheet(cursor.sheet.clone()))?;
        let mut out = SourceRow::new(row);
        for ((_, col), cell) in sheet.cells.range((row, min_col)..=(row, u32::MAX)) {
            out.insert(*col, cell.value.clone());
        }
        Ok(Some(out))
    }
}
