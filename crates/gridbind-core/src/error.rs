use gridbind_common::{A1ParseError, ConversionError};
use gridbind_io::IoError;
use gridbind_spec::{Layout, ValidationError};

/// Configuration problems detected while compiling a binding. Raised before
/// any I/O happens; no partially compiled mapping is ever published.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("`{type_name}.{property}` has no cell address")]
    MissingAddress { type_name: String, property: String },
    #[error("`{type_name}.{property}` has invalid address `{address}`: {source}")]
    InvalidAddress {
        type_name: String,
        property: String,
        address: String,
        #[source]
        source: A1ParseError,
    },
    #[error("`{type_name}` has no property `{property}`")]
    UnresolvedProperty { type_name: String, property: String },
    #[error("`{type_name}.{property}` is a {actual} but is bound as a {expected}")]
    WrongKind {
        type_name: String,
        property: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("nested property `{type_name}.{property}` has no setter")]
    MissingSetter { type_name: String, property: String },
    #[error("collection `{property}` uses the unsupported `{layout}` layout; only vertical collections are supported")]
    UnsupportedLayout { property: String, layout: Layout },
    #[error("collection `{property}` declares item type `{declared}` but holds `{actual}`")]
    ItemTypeMismatch {
        property: String,
        declared: String,
        actual: String,
    },
    #[error("nested type `{type_name}` used by `{property}` has no binding configured")]
    NestedNotConfigured { type_name: String, property: String },
    #[error("`{type_name}` nests collections deeper than {max} levels")]
    NestingTooDeep { type_name: String, max: usize },
    #[error("`{type_name}` has no binding configured")]
    NotConfigured { type_name: String },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Failures raised while assembling a single field or collection item.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("item factory for `{0}` produced no instance")]
    Factory(String),
}

/// Errors raised by the streaming engines. Any error aborts the whole pass.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("item factory for `{type_name}` produced no instance")]
    ItemFactory { type_name: String },
    #[error("cannot read {sheet}!{cell} into `{property}`: {source}")]
    Conversion {
        sheet: String,
        cell: String,
        property: String,
        #[source]
        source: ConversionError,
    },
    #[error("collection `{property}` would reach row {row}, past its boundary row {boundary}")]
    CollectionOverflow {
        property: String,
        row: u32,
        boundary: u32,
    },
    #[error("row {0} is beyond the last addressable row")]
    RowLimit(u64),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("operation cancelled")]
    Cancelled,
}

impl MappingError {
    pub(crate) fn from_field(
        err: FieldError,
        sheet: &str,
        cell: String,
        property: &str,
    ) -> Self {
        match err {
            FieldError::Conversion(source) => MappingError::Conversion {
                sheet: sheet.to_string(),
                cell,
                property: property.to_string(),
                source,
            },
            FieldError::Factory(type_name) => MappingError::ItemFactory { type_name },
        }
    }
}
