//! Schema-on-read type guessing for text formats.
//!
//! Each sampled value is classified independently (integer → decimal →
//! boolean → date-time → string) and the per-column evidence is folded by
//! widening: integers and decimals meet at decimal, any other disagreement
//! falls back to string. Empty values carry no evidence.

use crate::config::NumberPreference;
use crate::types::ColumnType;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

/// Date shapes accepted as date-time evidence. Short numeric strings
/// (`2024`, `12`, `1.5`) never match.
static DATE_GUARD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{1,2}-\d{1,2}([ T]\d{1,2}:\d{2}(:\d{2}(\.\d{1,9})?)?)?|\d{1,2}/\d{1,2}/\d{4}( \d{1,2}:\d{2}(:\d{2})?)?)$",
    )
    .ok()
});

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a date-time literal passing the guard pattern.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if !DATE_GUARD.as_ref().is_some_and(|guard| guard.is_match(text)) {
        return None;
    }
    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Column type guesser used by text formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeGuesser {
    numbers: NumberPreference,
}

impl TypeGuesser {
    pub fn new(numbers: NumberPreference) -> Self {
        Self { numbers }
    }

    /// Classify a single value; `None` for empty text.
    pub fn guess_value(&self, text: &str) -> Option<ColumnType> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let ty = if trimmed.parse::<i64>().is_ok() {
            ColumnType::Integer
        } else if looks_decimal(trimmed) {
            ColumnType::Decimal
        } else if parse_bool(trimmed).is_some() {
            ColumnType::Boolean
        } else if parse_datetime(trimmed).is_some() {
            ColumnType::DateTime
        } else {
            ColumnType::String
        };
        Some(self.prefer(ty))
    }

    /// Apply the numeric preference to an intrinsic type (JSON, Parquet).
    pub fn prefer(&self, ty: ColumnType) -> ColumnType {
        match (self.numbers, ty) {
            (NumberPreference::Decimal, ColumnType::Integer) => ColumnType::Decimal,
            (_, ty) => ty,
        }
    }
}

/// Widen the evidence gathered so far with one more observation.
pub fn widen(current: Option<ColumnType>, next: ColumnType) -> ColumnType {
    match current {
        None => next,
        Some(cur) if cur == next => cur,
        Some(cur) if cur.is_numeric() && next.is_numeric() => ColumnType::Decimal,
        Some(_) => ColumnType::String,
    }
}

/// `f64::from_str` also accepts `inf`/`NaN`; data files mean text by those.
fn looks_decimal(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && text.chars().any(|c| c.is_ascii_digit())
        && text.parse::<f64>().is_ok()
}
