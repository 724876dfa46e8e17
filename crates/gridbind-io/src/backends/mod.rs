#[cfg(feature = "csv")]
pub mod csv;
pub mod memory;

#[cfg(feature = "csv")]
pub use csv::{CsvReadOptions, CsvSink, CsvSource, CsvTypeInference, CsvWriteOptions};
pub use memory::MemoryWorkbook;
