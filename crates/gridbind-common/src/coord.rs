//! 1-based cell coordinates shared by the binding model and both engines.
//!
//! `CellRef` uses Excel numbering (row 1, column 1 = `A1`) with the same
//! limits as Excel: 1,048,576 rows × 16,384 columns. Ordering is row-major,
//! which is the order cells are streamed in.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest addressable row (1-based).
pub const MAX_ROW: u32 = 1 << 20;
/// Largest addressable column (1-based, `XFD`).
pub const MAX_COL: u32 = 1 << 14;

/// Errors returned when constructing coordinates from unchecked inputs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CoordError {
    #[error("row and column indices must be 1-based (>= 1)")]
    ZeroIndex,
    #[error("row {0} exceeds {MAX_ROW}")]
    RowOverflow(u64),
    #[error("col {0} exceeds {MAX_COL}")]
    ColOverflow(u64),
}

/// Errors produced while parsing A1-style single-cell references.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum A1ParseError {
    #[error("cell reference is empty")]
    Empty,
    #[error("cell reference `{0}` has no column letters")]
    MissingColumn(String),
    #[error("cell reference `{0}` has no row number")]
    MissingRow(String),
    #[error("`{0}` is not a single-cell A1 reference")]
    Malformed(String),
    #[error("cell reference `{reference}` is out of bounds: {source}")]
    OutOfBounds {
        reference: String,
        #[source]
        source: CoordError,
    },
}

/// Absolute cell position with 1-based row and column.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    row: u32,
    col: u32,
}

impl CellRef {
    /// Top-left cell of every sheet.
    pub const A1: CellRef = CellRef { row: 1, col: 1 };

    /// Construct from 1-based coordinates, validating Excel limits.
    pub fn new(row: u32, col: u32) -> Result<Self, CoordError> {
        if row == 0 || col == 0 {
            return Err(CoordError::ZeroIndex);
        }
        if row > MAX_ROW {
            return Err(CoordError::RowOverflow(row as u64));
        }
        if col > MAX_COL {
            return Err(CoordError::ColOverflow(col as u64));
        }
        Ok(Self { row, col })
    }

    #[inline(always)]
    pub fn row(self) -> u32 {
        self.row
    }

    #[inline(always)]
    pub fn col(self) -> u32 {
        self.col
    }

    /// Column as spreadsheet letters (`1 -> A`, `28 -> AB`).
    pub fn column_letters(self) -> String {
        column_to_letters(self.col)
    }

    /// Shift by signed deltas, returning `None` when the result leaves the sheet.
    pub fn offset(self, drow: i64, dcol: i64) -> Option<Self> {
        let row = self.row as i64 + drow;
        let col = self.col as i64 + dcol;
        if row < 1 || col < 1 {
            return None;
        }
        Self::new(row as u32, col as u32).ok()
    }

    /// Parse `A1`, `$B$7`, or `Sheet1!C3` (the sheet prefix is discarded).
    pub fn parse_a1(reference: &str) -> Result<Self, A1ParseError> {
        parse_sheet_a1(reference).map(|(_, cell)| cell)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letters(self.col), self.row)
    }
}

impl std::str::FromStr for CellRef {
    type Err = A1ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_a1(s)
    }
}

/// Parse an A1 reference with an optional `Sheet!` or `'My Sheet'!` prefix.
pub fn parse_sheet_a1(reference: &str) -> Result<(Option<&str>, CellRef), A1ParseError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(A1ParseError::Empty);
    }
    let (sheet, cell) = match trimmed.rfind('!') {
        Some(pos) => {
            let sheet = trimmed[..pos].trim_matches('\'');
            (Some(sheet), &trimmed[pos + 1..])
        }
        None => (None, trimmed),
    };

    let bytes = cell.as_bytes();
    let mut idx = 0;
    if bytes.get(idx) == Some(&b'$') {
        idx += 1;
    }
    let letters_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
        idx += 1;
    }
    let letters = &cell[letters_start..idx];
    if letters.is_empty() {
        return Err(A1ParseError::MissingColumn(reference.to_string()));
    }
    if bytes.get(idx) == Some(&b'$') {
        idx += 1;
    }
    let digits = &cell[idx..];
    if digits.is_empty() {
        return Err(A1ParseError::MissingRow(reference.to_string()));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(A1ParseError::Malformed(reference.to_string()));
    }

    let col = letters_to_column(&letters.to_ascii_uppercase())
        .ok_or_else(|| A1ParseError::Malformed(reference.to_string()))?;
    let row: u64 = digits
        .parse()
        .map_err(|_| A1ParseError::Malformed(reference.to_string()))?;
    if row > MAX_ROW as u64 {
        return Err(A1ParseError::OutOfBounds {
            reference: reference.to_string(),
            source: CoordError::RowOverflow(row),
        });
    }
    let cell = CellRef::new(row as u32, col).map_err(|source| A1ParseError::OutOfBounds {
        reference: reference.to_string(),
        source,
    })?;
    Ok((sheet, cell))
}

/// Convert a 1-based column index into letters. Column 0 yields an empty string.
pub fn column_to_letters(mut col: u32) -> String {
    let mut buf = Vec::with_capacity(3);
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        buf.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Convert uppercase column letters into a 1-based column index.
pub fn letters_to_column(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in s.bytes() {
        if !ch.is_ascii_uppercase() {
            return None;
        }
        col = col.checked_mul(26)?.checked_add((ch - b'A') as u32 + 1)?;
    }
    if col > MAX_COL { None } else { Some(col) }
}
