//! Typed record ↔ spreadsheet binding.
//!
//! A [`TypeBinding`](gridbind_spec::TypeBinding) says which cell each field of
//! a [`Record`] lives in. [`compile`] turns it into an immutable
//! [`CompiledMapping`]; the [`Registry`] caches those per type. The write
//! engine streams items into a [`CellSink`](gridbind_io::CellSink) row by row
//! and the read engine lazily rebuilds items from a
//! [`RowSource`](gridbind_io::RowSource).

pub mod compiler;
pub mod error;
pub mod mapping;
pub mod read;
pub mod registry;
pub mod schema;
pub mod write;

pub use compiler::{CompileOptions, compile};
pub use error::{CompileError, FieldError, MappingError};
pub use mapping::{
    Boundaries, CellGrid, CellHandler, CollectionStructure, ColumnHandlers, CompiledCollection,
    CompiledMapping, CompiledProperty, DEFAULT_COLLECTION_HEIGHT, HandlerKind, ItemMember,
    MAX_NESTING_DEPTH, MAX_PATTERN_HEIGHT, MappingStructure, NestedMappingInfo,
    PATTERN_SAMPLE_ITEMS, ReadStrategy, Slot, WriteStrategy,
};
pub use read::{MAX_EMPTY_RUN, MAX_SCAN_ITEMS, ReadEngine, ReadItems, ReadOptions, read_items};
pub use registry::Registry;
pub use schema::{
    CollectionAccessor, Field, FieldAccess, ItemBuffer, NestedContext, Record, ScalarAccessor,
    Schema, Sequence,
};
pub use write::{WriteEngine, WriteOptions, WriteSummary, write_items};
