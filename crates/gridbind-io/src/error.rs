use gridbind_common::column_to_letters;

/// Failures raised by sinks and sources.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("no sheet is open; call start_sheet first")]
    NoActiveSheet,
    #[error("sheet `{0}` not found")]
    MissingSheet(String),
    #[error("cell {cell} arrived after {previous}; cells must be written in row-major order")]
    OutOfOrder { cell: String, previous: String },
    #[error("cell {0} was written twice")]
    DuplicateCell(String),
    #[error("cell {cell} was passed with row {row}")]
    RowMismatch { cell: String, row: u32 },
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn a1(row: u32, col: u32) -> String {
    format!("{}{}", column_to_letters(col), row)
}
