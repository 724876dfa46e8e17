//! Cell-level I/O boundary for gridbind.
//!
//! The engines only ever talk to [`CellSink`] and [`RowSource`]; physical
//! encodings live behind them. Two backends ship here: an in-memory workbook
//! and (with the `csv` feature) a CSV reader/writer.

pub mod backends;
pub mod error;
pub mod traits;

#[cfg(feature = "csv")]
pub use backends::{CsvReadOptions, CsvSink, CsvSource, CsvTypeInference, CsvWriteOptions};
pub use backends::MemoryWorkbook;
pub use error::IoError;
pub use traits::{CellSink, OrderGuard, RowSource, SheetCell, SourceRow};

pub use gridbind_common::{CellRef, CellValue};
