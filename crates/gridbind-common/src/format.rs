//! The small format vocabulary understood by [`DefaultConverter`](crate::DefaultConverter).
//!
//! Numeric formats follow the spreadsheet spelling (`0`, `0.00`, `#,##0.0`,
//! `0%`); anything containing `%` followed by a letter is treated as a chrono
//! `strftime` pattern for dates and times. Other strings pass values through.

/// Parsed representation of a format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat<'a> {
    Fixed {
        decimals: usize,
        grouping: bool,
        percent: bool,
    },
    Temporal(&'a str),
    Passthrough,
}

impl<'a> CellFormat<'a> {
    pub fn parse(format: &'a str) -> Self {
        let trimmed = format.trim();
        if is_strftime(trimmed) {
            return CellFormat::Temporal(trimmed);
        }
        parse_fixed(trimmed).unwrap_or(CellFormat::Passthrough)
    }
}

fn is_strftime(format: &str) -> bool {
    let bytes = format.as_bytes();
    bytes
        .windows(2)
        .any(|w| w[0] == b'%' && w[1].is_ascii_alphabetic())
}

fn parse_fixed(format: &str) -> Option<CellFormat<'_>> {
    let (body, percent) = match format.strip_suffix('%') {
        Some(rest) => (rest, true),
        None => (format, false),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    if int_part.is_empty() || !int_part.ends_with('0') {
        return None;
    }
    if !int_part.bytes().all(|b| matches!(b, b'#' | b'0' | b',')) {
        return None;
    }
    let decimals = match frac_part {
        Some(f) if !f.is_empty() && f.bytes().all(|b| b == b'0') => f.len(),
        Some(_) => return None,
        None => 0,
    };
    Some(CellFormat::Fixed {
        decimals,
        grouping: int_part.contains(','),
        percent,
    })
}

/// Render a number through a fixed format.
pub fn render_fixed(value: f64, decimals: usize, grouping: bool, percent: bool) -> String {
    let scaled = if percent { value * 100.0 } else { value };
    let mut text = format!("{scaled:.decimals$}");
    if grouping {
        text = group_thousands(&text);
    }
    if percent {
        text.push('%');
    }
    text
}

fn group_thousands(text: &str) -> String {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, frac) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Parse text produced by [`render_fixed`] (or typed by hand) back into a number.
pub fn parse_fixed_text(text: &str, percent: bool) -> Option<f64> {
    let mut cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let had_percent = cleaned.ends_with('%');
    if had_percent {
        cleaned.pop();
    }
    let value: f64 = cleaned.trim().parse().ok()?;
    if percent || had_percent {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}
