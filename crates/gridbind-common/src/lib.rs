pub mod convert;
pub mod coord;
pub mod format;
pub mod value;

pub use convert::{CellConvert, ConversionError, DefaultConverter, ValueConverter};
pub use coord::{
    A1ParseError, CellRef, CoordError, MAX_COL, MAX_ROW, column_to_letters, letters_to_column,
    parse_sheet_a1,
};
pub use format::CellFormat;
pub use value::{CellValue, ValueKind, datetime_to_serial, serial_to_datetime};
