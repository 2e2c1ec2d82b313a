//! Normalizer - turns raw spreadsheet rows into canonical transaction rows.
//!
//! Normalization is total: every input row yields exactly one output row, no
//! matter how malformed. Unrecognizable values fall back (amount 0.00, date
//! None, direction expense) so that bad rows surface to the user as
//! low-confidence transactions instead of silently disappearing.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::entities::Direction;

/// One spreadsheet row as extracted: header → cell value.
pub type RawRow = BTreeMap<String, Value>;

/// Header fragments probed, in priority order, for each canonical field.
const DATE_KEYS: &[&str] = &["date", "posted", "day"];
const DESCRIPTION_KEYS: &[&str] = &[
    "description",
    "narrative",
    "details",
    "payee",
    "memo",
    "reference",
];
const AMOUNT_KEYS: &[&str] = &["amount", "value", "total", "gross"];
const DIRECTION_KEYS: &[&str] = &["direction", "type"];

/// Date formats tried in order; `d/m/Y` before `m/d/Y` because the source
/// spreadsheets are predominantly UK bank exports.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

/// A structurally canonical transaction row, pre-categorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRow {
    /// None when no cell held a parseable date
    pub date: Option<NaiveDate>,
    /// Empty string when no descriptive cell was found
    pub description: String,
    /// Non-negative, exactly two fractional digits; 0.00 when unparseable
    pub amount: Decimal,
    pub direction: Direction,
}

/// Normalizes a batch of raw rows. Length-preserving by construction.
pub fn normalize_rows(rows: &[RawRow]) -> Vec<CanonicalRow> {
    rows.iter().map(normalize_row).collect()
}

fn normalize_row(row: &RawRow) -> CanonicalRow {
    let date = find_value(row, DATE_KEYS).and_then(parse_date_value);

    let description = find_value(row, DESCRIPTION_KEYS)
        .and_then(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    let amount = find_value(row, AMOUNT_KEYS)
        .and_then(parse_amount_value)
        .map(|amount| round_money(amount.abs()))
        .unwrap_or_default();

    let direction = find_value(row, DIRECTION_KEYS)
        .and_then(Value::as_str)
        .map_or(Direction::Expense, |marker| {
            if marker.to_lowercase().contains("income") {
                Direction::Income
            } else {
                Direction::Expense
            }
        });

    CanonicalRow {
        date,
        description,
        amount,
        direction,
    }
}

/// Finds the first non-null cell whose header contains one of `candidates`
/// (case-insensitive). Candidate priority beats header order.
fn find_value<'a>(row: &'a RawRow, candidates: &[&str]) -> Option<&'a Value> {
    for candidate in candidates {
        for (key, value) in row {
            if key.to_lowercase().contains(candidate) && !value.is_null() {
                return Some(value);
            }
        }
    }
    None
}

/// Rounds to two decimal places, midpoints away from zero (50.005 → 50.01).
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a 2dp decimal amount to integer minor units (pence).
pub fn decimal_to_minor(amount: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;

    (round_money(amount) * Decimal::ONE_HUNDRED)
        .to_i64()
        .unwrap_or(0)
}

/// Converts integer minor units back to a 2dp decimal amount.
pub fn minor_to_decimal(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

pub(crate) fn parse_amount_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

/// Parses a cell like `"$1,234.56"`, `"£500"`, or `"(42.50)"` (negative).
pub(crate) fn parse_amount_str(raw: &str) -> Option<Decimal> {
    let s = raw
        .replace(',', "")
        .replace('"', "")
        .replace('$', "")
        .replace('£', "");
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<Decimal>().ok().map(|d| -d);
    }
    s.parse().ok()
}

pub(crate) fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        // Plausible Excel serial range, roughly 1954..2064
        Value::Number(n) => {
            let serial = n.as_f64()?;
            if (20_000.0..=60_000.0).contains(&serial) {
                Some(excel_serial_to_date(serial))
            } else {
                None
            }
        }
        _ => None,
    }
}

pub(crate) fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug).
pub(crate) fn excel_serial_to_date(serial: f64) -> NaiveDate {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    base + chrono::Duration::days(serial as i64)
}
