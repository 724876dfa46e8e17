//! CSV backend: one worksheet per stream.
//!
//! CSV carries no types, so values are written as text and re-inferred on
//! read. Formulas are written as `=formula` only when the cell has no value.

use std::io::{Read, Write};

use chrono::{NaiveDate, NaiveDateTime};
use gridbind_common::{CellRef, CellValue};

use crate::error::IoError;
use crate::traits::{CellSink, OrderGuard, RowSource, SheetCell, SourceRow};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CsvTypeInference {
    /// Treat every non-empty field as text.
    Off,
    /// Booleans and numbers when unambiguous.
    Basic,
    /// Like `Basic`, plus ISO dates and date-times.
    #[default]
    BasicWithDates,
}

#[derive(Clone, Debug)]
pub struct CsvReadOptions {
    /// Field delimiter as a single byte. Use `b'\t'` for TSV.
    pub delimiter: u8,
    pub trim: bool,
    pub type_inference: CsvTypeInference,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            trim: false,
            type_inference: CsvTypeInference::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CsvWriteOptions {
    pub delimiter: u8,
    /// Format used for `DateTime` values.
    pub datetime_format: String,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            datetime_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

/// Streams rows into a CSV writer.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    options: CsvWriteOptions,
    sheet: Option<String>,
    finished: bool,
    guard: OrderGuard,
    rows_emitted: u32,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> Self {
        Self::with_options(inner, CsvWriteOptions::default())
    }

    pub fn with_options(inner: W, options: CsvWriteOptions) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .flexible(true)
            .has_headers(false)
            .from_writer(inner);
        Self {
            writer,
            options,
            sheet: None,
            finished: false,
            guard: OrderGuard::default(),
            rows_emitted: 0,
        }
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, IoError> {
        self.writer
            .into_inner()
            .map_err(|err| IoError::Io(err.into_error()))
    }

    fn field(&self, cell: &SheetCell) -> String {
        match (&cell.value, &cell.formula) {
            (value, Some(formula)) if value.is_blank() => format!("={formula}"),
            (CellValue::DateTime(dt), _) => dt.format(&self.options.datetime_format).to_string(),
            (CellValue::Boolean(b), _) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            (value, _) => value.to_string(),
        }
    }

    fn emit(&mut self, fields: &[String]) -> Result<(), IoError> {
        if fields.is_empty() {
            // A single empty field still terminates a record.
            self.writer.write_record([""])?;
        } else {
            self.writer.write_record(fields)?;
        }
        self.rows_emitted += 1;
        Ok(())
    }
}

impl<W: Write> CellSink for CsvSink<W> {
    fn start_sheet(&mut self, name: &str) -> Result<(), IoError> {
        if self.sheet.is_some() || self.finished {
            return Err(IoError::Unsupported(format!(
                "CSV holds a single sheet; cannot start `{name}`"
            )));
        }
        self.sheet = Some(name.to_string());
        Ok(())
    }

    fn write_row(&mut self, row: u32, cells: &[SheetCell]) -> Result<(), IoError> {
        if self.sheet.is_none() {
            return Err(IoError::NoActiveSheet);
        }
        let previous = self.guard.last_row();
        self.guard.check_row(row, cells)?;
        if row == previous && !cells.is_empty() {
            return Err(IoError::Unsupported(
                "CSV rows cannot be written in several parts".to_string(),
            ));
        }
        if row == previous {
            return Ok(());
        }
        while self.rows_emitted + 1 < row {
            self.emit(&[])?;
        }
        let width = cells.last().map(|c| c.col).unwrap_or(0) as usize;
        let mut fields = vec![String::new(); width];
        for cell in cells {
            fields[(cell.col - 1) as usize] = self.field(cell);
        }
        self.emit(&fields)
    }

    fn finish_sheet(&mut self) -> Result<(), IoError> {
        if self.sheet.take().is_none() {
            return Err(IoError::NoActiveSheet);
        }
        self.finished = true;
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads rows from a CSV stream. Any sheet name is accepted on `open`.
pub struct CsvSource<R: Read> {
    reader: csv::Reader<R>,
    options: CsvReadOptions,
    record: csv::StringRecord,
    start: CellRef,
    next_row: u32,
    skip_header: bool,
    opened: bool,
}

impl<R: Read> CsvSource<R> {
    pub fn new(inner: R) -> Self {
        Self::with_options(inner, CsvReadOptions::default())
    }

    pub fn with_options(inner: R, options: CsvReadOptions) -> Self {
        let trim = if options.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        };
        let reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(trim)
            .from_reader(inner);
        Self {
            reader,
            options,
            record: csv::StringRecord::new(),
            start: CellRef::A1,
            next_row: 1,
            skip_header: false,
            opened: false,
        }
    }
}

impl<R: Read> RowSource for CsvSource<R> {
    fn open(&mut self, _sheet: &str, start: CellRef, has_header: bool) -> Result<(), IoError> {
        if self.opened {
            return Err(IoError::Unsupported(
                "CSV sources can only be opened once".to_string(),
            ));
        }
        self.opened = true;
        self.start = start;
        self.skip_header = has_header;
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<SourceRow>, IoError> {
        if !self.opened {
            return Err(IoError::NoActiveSheet);
        }
        loop {
            if !self.reader.read_record(&mut self.record)? {
                return Ok(None);
            }
            // Blank lines are skipped by the parser, so prefer the line number.
            let row = self
                .record
                .position()
                .map(|p| p.line() as u32)
                .unwrap_or(self.next_row);
            self.next_row = row + 1;
            if row < self.start.row() {
                continue;
            }
            if self.skip_header {
                self.skip_header = false;
                continue;
            }
            let mut out = SourceRow::new(row);
            for (idx, field) in self.record.iter().enumerate() {
                let col = idx as u32 + 1;
                if col < self.start.col() {
                    continue;
                }
                if let Some(value) = infer_field(field, self.options.type_inference) {
                    out.insert(col, value);
                }
            }
            return Ok(Some(out));
        }
    }
}

fn infer_field(field: &str, mode: CsvTypeInference) -> Option<CellValue> {
    if field.is_empty() {
        return None;
    }
    if mode == CsvTypeInference::Off {
        return Some(CellValue::Text(field.to_string()));
    }
    if let Some(b) = parse_bool(field) {
        return Some(CellValue::Boolean(b));
    }
    if let Some(i) = parse_unambiguous_i64(field) {
        return Some(CellValue::Int(i));
    }
    if let Some(n) = parse_unambiguous_f64(field) {
        return Some(CellValue::Number(n));
    }
    if mode == CsvTypeInference::BasicWithDates {
        if let Ok(d) = NaiveDate::parse_from_str(field, "%Y-%m-%d") {
            return Some(CellValue::Date(d));
        }
        if let Some(dt) = parse_datetime(field) {
            return Some(CellValue::DateTime(dt));
        }
    }
    Some(CellValue::Text(field.to_string()))
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_unambiguous_i64(s: &str) -> Option<i64> {
    // Leading zeros ("007") stay text.
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_unambiguous_f64(s: &str) -> Option<f64> {
    if !(s.contains('.') || s.contains('e') || s.contains('E')) {
        return None;
    }
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned.len() > 1 && unsigned.starts_with('0') && !unsigned.starts_with("0.") {
        return None;
    }
    let n: f64 = s.parse().ok()?;
    n.is_finite().then_some(n)
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
