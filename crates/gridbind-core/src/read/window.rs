use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use gridbind_io::{RowSource, SourceRow};

use crate::error::MappingError;

/// Bounded lookahead over a [`RowSource`].
///
/// Rows are addressed by absolute row number. Gaps in the source are filled
/// with blank rows so every row from the first requested one onwards is
/// present. Rows stay buffered until released.
pub(crate) struct RowWindow<'c, S> {
    source: S,
    rows: VecDeque<SourceRow>,
    /// Row number of `rows[0]`.
    base: u32,
    pending: Option<SourceRow>,
    eof: bool,
    cancel: Option<&'c AtomicBool>,
}

impl<'c, S: RowSource> RowWindow<'c, S> {
    pub(crate) fn new(source: S, first_row: u32, cancel: Option<&'c AtomicBool>) -> Self {
        Self {
            source,
            rows: VecDeque::new(),
            base: first_row,
            pending: None,
            eof: false,
            cancel,
        }
    }

    /// Row `row`, or `None` once the source is exhausted before it.
    pub(crate) fn get(&mut self, row: u32) -> Result<Option<&SourceRow>, MappingError> {
        if row < self.base {
            return Ok(None);
        }
        while self.end() <= row {
            if !self.pull()? {
                return Ok(None);
            }
        }
        Ok(self.rows.get((row - self.base) as usize))
    }

    /// `true` when row `row` exists and holds no values.
    #[cfg(test)]
    pub(crate) fn is_blank(&mut self, row: u32) -> Result<bool, MappingError> {
        Ok(self.get(row)?.is_some_and(SourceRow::is_blank))
    }

    /// Drop every buffered row before `row`.
    pub(crate) fn release_before(&mut self, row: u32) {
        while self.base < row {
            if self.rows.pop_front().is_none() {
                self.base = row;
                break;
            }
            self.base += 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.rows.len()
    }

    fn end(&self) -> u32 {
        self.base + self.rows.len() as u32
    }

    fn pull(&mut self) -> Result<bool, MappingError> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(MappingError::Cancelled);
        }
        let expected = self.end();
        let next = loop {
            let candidate = match self.pending.take() {
                Some(row) => row,
                None if self.eof => return Ok(false),
                None => match self.source.next_row()? {
                    Some(row) => row,
                    None => {
                        self.eof = true;
                        return Ok(false);
                    }
                },
            };
            if candidate.row >= expected {
                break candidate;
            }
        };
        if next.row > expected {
            self.pending = Some(next);
            self.rows.push_back(SourceRow::new(expected));
        } else {
            self.rows.push_back(next);
        }
        Ok(true)
    }
}
