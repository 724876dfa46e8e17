//! Scalar ↔ cell conversion.
//!
//! Two layers cooperate here:
//! - [`CellConvert`] moves a typed Rust value to and from an exact [`CellValue`]
//!   variant. It never guesses.
//! - [`ValueConverter`] is the format-aware service the engines call per cell:
//!   it renders outgoing values through their bound format and coerces incoming
//!   cells to the [`ValueKind`] a property expects.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::format::{CellFormat, parse_fixed_text, render_fixed};
use crate::value::{CellValue, ValueKind};

/// A cell value that cannot be reconciled with the requested type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot convert {found} value `{text}` to {expected}")]
pub struct ConversionError {
    pub expected: ValueKind,
    pub found: &'static str,
    pub text: String,
}

impl ConversionError {
    pub fn new(expected: ValueKind, value: &CellValue) -> Self {
        let found = match value.kind() {
            Some(ValueKind::Text) => "text",
            Some(ValueKind::Int) => "integer",
            Some(ValueKind::Number) => "number",
            Some(ValueKind::Boolean) => "boolean",
            Some(ValueKind::Date) => "date",
            Some(ValueKind::DateTime) => "datetime",
            Some(ValueKind::Time) => "time",
            Some(ValueKind::Any) => "any",
            None => "empty",
        };
        Self {
            expected,
            found,
            text: value.to_string(),
        }
    }
}

/// Typed value that maps onto exactly one cell.
pub trait CellConvert: Sized + Send + Sync + 'static {
    /// Kind the conversion service should coerce incoming cells to.
    const KIND: ValueKind;

    fn to_cell(&self) -> CellValue;

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError>;
}

impl CellConvert for String {
    const KIND: ValueKind = ValueKind::Text;

    fn to_cell(&self) -> CellValue {
        CellValue::Text(self.clone())
    }

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
        Ok(value.as_text().into_owned())
    }
}

impl CellConvert for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn to_cell(&self) -> CellValue {
        CellValue::Boolean(*self)
    }

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
        match value {
            CellValue::Boolean(b) => Ok(*b),
            other => Err(ConversionError::new(Self::KIND, other)),
        }
    }
}

macro_rules! int_convert {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CellConvert for $ty {
                const KIND: ValueKind = ValueKind::Int;

                fn to_cell(&self) -> CellValue {
                    match i64::try_from(*self) {
                        Ok(i) => CellValue::Int(i),
                        Err(_) => CellValue::Number(*self as f64),
                    }
                }

                fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
                    // Whole numbers go through i128 so out-of-range values fail instead of
                    // saturating.
                    let wide = match value {
                        CellValue::Int(i) => Some(i128::from(*i)),
                        CellValue::Number(n) if n.fract() == 0.0 && n.abs() < i128::MAX as f64 => {
                            Some(*n as i128)
                        }
                        _ => None,
                    };
                    wide.and_then(|i| <$ty>::try_from(i).ok())
                        .ok_or_else(|| ConversionError::new(Self::KIND, value))
                }
            }
        )*
    };
}

int_convert!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

macro_rules! float_convert {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CellConvert for $ty {
                const KIND: ValueKind = ValueKind::Number;

                fn to_cell(&self) -> CellValue {
                    CellValue::Number(*self as f64)
                }

                fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
                    match value {
                        CellValue::Number(n) => Ok(*n as $ty),
                        CellValue::Int(i) => Ok(*i as $ty),
                        other => Err(ConversionError::new(Self::KIND, other)),
                    }
                }
            }
        )*
    };
}

float_convert!(f32, f64);

impl CellConvert for NaiveDate {
    const KIND: ValueKind = ValueKind::Date;

    fn to_cell(&self) -> CellValue {
        CellValue::Date(*self)
    }

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
        match value {
            CellValue::Date(d) => Ok(*d),
            CellValue::DateTime(dt) => Ok(dt.date()),
            other => Err(ConversionError::new(Self::KIND, other)),
        }
    }
}

impl CellConvert for NaiveDateTime {
    const KIND: ValueKind = ValueKind::DateTime;

    fn to_cell(&self) -> CellValue {
        CellValue::DateTime(*self)
    }

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
        match value {
            CellValue::DateTime(dt) => Ok(*dt),
            CellValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            other => Err(ConversionError::new(Self::KIND, other)),
        }
    }
}

impl CellConvert for NaiveTime {
    const KIND: ValueKind = ValueKind::Time;

    fn to_cell(&self) -> CellValue {
        CellValue::Time(*self)
    }

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
        match value {
            CellValue::Time(t) => Ok(*t),
            CellValue::DateTime(dt) => Ok(dt.time()),
            other => Err(ConversionError::new(Self::KIND, other)),
        }
    }
}

impl CellConvert for CellValue {
    const KIND: ValueKind = ValueKind::Any;

    fn to_cell(&self) -> CellValue {
        self.clone()
    }

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl<V: CellConvert> CellConvert for Option<V> {
    const KIND: ValueKind = V::KIND;

    fn to_cell(&self) -> CellValue {
        match self {
            Some(v) => v.to_cell(),
            None => CellValue::Empty,
        }
    }

    fn from_cell(value: &CellValue) -> Result<Self, ConversionError> {
        if matches!(value, CellValue::Empty) {
            Ok(None)
        } else {
            V::from_cell(value).map(Some)
        }
    }
}

/// Format-aware conversion service consulted by the engines for every cell.
pub trait ValueConverter: Send + Sync {
    /// Prepare an outgoing value for the sink, applying `format` when present.
    fn to_cell(&self, value: CellValue, format: Option<&str>) -> CellValue;

    /// Coerce an incoming cell to `target`. Empty cells stay empty.
    fn from_cell(
        &self,
        value: &CellValue,
        target: ValueKind,
        format: Option<&str>,
    ) -> Result<CellValue, ConversionError>;
}

/// Built-in converter: numeric fixed formats, chrono patterns, string fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl ValueConverter for DefaultConverter {
    fn to_cell(&self, value: CellValue, format: Option<&str>) -> CellValue {
        let Some(format) = format else {
            return value;
        };
        match (CellFormat::parse(format), &value) {
            (
                CellFormat::Fixed {
                    decimals,
                    grouping,
                    percent,
                },
                CellValue::Number(_) | CellValue::Int(_),
            ) => {
                let n = value.as_serial_number().unwrap_or_default();
                CellValue::Text(render_fixed(n, decimals, grouping, percent))
            }
            (CellFormat::Temporal(pattern), CellValue::Date(d)) => {
                CellValue::Text(d.format(pattern).to_string())
            }
            (CellFormat::Temporal(pattern), CellValue::DateTime(dt)) => {
                CellValue::Text(dt.format(pattern).to_string())
            }
            (CellFormat::Temporal(pattern), CellValue::Time(t)) => {
                CellValue::Text(t.format(pattern).to_string())
            }
            _ => value,
        }
    }

    fn from_cell(
        &self,
        value: &CellValue,
        target: ValueKind,
        format: Option<&str>,
    ) -> Result<CellValue, ConversionError> {
        if matches!(value, CellValue::Empty) || target == ValueKind::Any {
            return Ok(value.clone());
        }
        if value.kind() == Some(target) {
            return Ok(value.clone());
        }
        if let Some(format) = format {
            if let Some(converted) = with_format(value, target, CellFormat::parse(format)) {
                return Ok(converted);
            }
        }
        fallback(value, target).ok_or_else(|| ConversionError::new(target, value))
    }
}

fn with_format(value: &CellValue, target: ValueKind, format: CellFormat<'_>) -> Option<CellValue> {
    let text = match value {
        CellValue::Text(s) => s.trim(),
        _ => return None,
    };
    match (format, target) {
        (CellFormat::Fixed { percent, .. }, ValueKind::Number) => {
            parse_fixed_text(text, percent).map(CellValue::Number)
        }
        (CellFormat::Fixed { percent, .. }, ValueKind::Int) => {
            parse_fixed_text(text, percent).and_then(whole_number)
        }
        (CellFormat::Temporal(pattern), ValueKind::Date) => NaiveDate::parse_from_str(text, pattern)
            .ok()
            .map(CellValue::Date),
        (CellFormat::Temporal(pattern), ValueKind::DateTime) => {
            NaiveDateTime::parse_from_str(text, pattern)
                .ok()
                .map(CellValue::DateTime)
        }
        (CellFormat::Temporal(pattern), ValueKind::Time) => NaiveTime::parse_from_str(text, pattern)
            .ok()
            .map(CellValue::Time),
        _ => None,
    }
}

/// Integral `n` as an `Int` when it fits `i64`. Larger whole numbers stay
/// numeric so the typed conversion can range-check them.
fn whole_number(n: f64) -> Option<CellValue> {
    if n.fract() != 0.0 || !n.is_finite() {
        return None;
    }
    if n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Some(CellValue::Int(n as i64))
    } else {
        Some(CellValue::Number(n))
    }
}

fn fallback(value: &CellValue, target: ValueKind) -> Option<CellValue> {
    match target {
        ValueKind::Text => Some(CellValue::Text(value.to_string())),
        ValueKind::Int => match value {
            CellValue::Number(n) => whole_number(*n),
            CellValue::Boolean(b) => Some(CellValue::Int(*b as i64)),
            CellValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .map(CellValue::Int)
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_number))
            }
            _ => None,
        },
        ValueKind::Number => match value {
            CellValue::Text(s) => s.trim().parse::<f64>().ok().map(CellValue::Number),
            other => other.as_serial_number().map(CellValue::Number),
        },
        ValueKind::Boolean => match value {
            CellValue::Int(i) => Some(CellValue::Boolean(*i != 0)),
            CellValue::Number(n) => Some(CellValue::Boolean(*n != 0.0)),
            CellValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(CellValue::Boolean(true)),
                "false" | "no" | "0" => Some(CellValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        ValueKind::Date => match value {
            CellValue::DateTime(dt) => Some(CellValue::Date(dt.date())),
            CellValue::Int(_) | CellValue::Number(_) => value
                .as_serial_number()
                .and_then(crate::value::serial_to_datetime)
                .map(|dt| CellValue::Date(dt.date())),
            CellValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(CellValue::Date),
            _ => None,
        },
        ValueKind::DateTime => match value {
            CellValue::Date(d) => Some(CellValue::DateTime(d.and_time(NaiveTime::MIN))),
            CellValue::Int(_) | CellValue::Number(_) => value
                .as_serial_number()
                .and_then(crate::value::serial_to_datetime)
                .map(CellValue::DateTime),
            CellValue::Text(s) => {
                let s = s.trim();
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                    .ok()
                    .map(CellValue::DateTime)
            }
            _ => None,
        },
        ValueKind::Time => match value {
            CellValue::DateTime(dt) => Some(CellValue::Time(dt.time())),
            CellValue::Number(n) if (0.0..1.0).contains(n) => {
                let secs = (n * 86_400.0).round() as u32;
                NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).map(CellValue::Time)
            }
            CellValue::Text(s) => {
                let s = s.trim();
                NaiveTime::parse_from_str(s, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .ok()
                    .map(CellValue::Time)
            }
            _ => None,
        },
        ValueKind::Any => Some(value.clone()),
    }
}
