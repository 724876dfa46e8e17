//! Meta crate that re-exports the gridbind building blocks. Most users only
//! need this crate; the layers stay reachable as modules for deeper
//! integration, such as implementing a custom sink or source.

pub mod doc_examples;

pub use gridbind_common as common;
pub use gridbind_core as core;
pub use gridbind_io as io;
pub use gridbind_spec as spec;

pub use gridbind_common::{
    CellConvert, CellRef, CellValue, DefaultConverter, ValueConverter, ValueKind,
};
pub use gridbind_core::{
    CompileError, CompileOptions, CompiledMapping, MappingError, ReadEngine, ReadItems,
    ReadOptions, ReadStrategy, Record, Registry, Schema, WriteEngine, WriteOptions, WriteStrategy,
    WriteSummary, compile, read_items, write_items,
};
pub use gridbind_io::{CellSink, IoError, MemoryWorkbook, RowSource, SheetCell, SourceRow};
#[cfg(feature = "csv")]
pub use gridbind_io::{CsvSink, CsvSource};
pub use gridbind_spec::{BindingManifest, CollectionSpec, Layout, PropertySpec, TypeBinding};
