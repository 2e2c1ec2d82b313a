//! Pure aggregation of verified transactions into an authority-shaped
//! periodic payload.
//!
//! No I/O and no clock access: identical input always serializes to an
//! identical payload, which is what makes stored submission snapshots
//! byte-reproducible. Sums are accumulated in integer minor units and only
//! converted to decimal at the payload edge.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::categories::{self, SENTINEL_CATEGORY};
use crate::entities::{Direction, SubmissionKind, TransactionModel, VerificationStatus};

/// Expense bucket for rows whose confirmed category is missing, unknown, or
/// the sentinel.
pub const OTHER_EXPENSES_KEY: &str = "otherExpenses";

/// The regulator-shaped submission body.
///
/// Field order is the wire order; `expenses` is a `BTreeMap` so category keys
/// always serialize alphabetically.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
    pub income: IncomeTotals,
    pub expenses: BTreeMap<String, Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eops_declaration: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_declaration: Option<bool>,
}

/// All income collapses into a single turnover figure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeTotals {
    pub turnover: Decimal,
}

/// Builds the submission payload for one period.
///
/// Only verified rows dated inside the inclusive period contribute; undated
/// rows never match. Rows with an unparseable direction are skipped.
pub fn aggregate(
    transactions: &[TransactionModel],
    period_start: NaiveDate,
    period_end: NaiveDate,
    kind: SubmissionKind,
) -> SubmissionPayload {
    let mut turnover_minor: i64 = 0;
    let mut expenses_minor: BTreeMap<String, i64> = BTreeMap::new();

    for tx in transactions {
        if tx.status != VerificationStatus::Verified.as_str() {
            continue;
        }
        let Some(date) = tx.date else { continue };
        if date < period_start || date > period_end {
            continue;
        }

        match Direction::parse(&tx.direction) {
            Some(Direction::Income) => turnover_minor += tx.amount_minor,
            Some(Direction::Expense) => {
                let bucket = expense_bucket(tx.confirmed_category.as_deref());
                *expenses_minor.entry(bucket.to_string()).or_insert(0) += tx.amount_minor;
            }
            None => {}
        }
    }

    let (eops_declaration, final_declaration) = match kind {
        SubmissionKind::Periodic => (None, None),
        SubmissionKind::EndOfPeriod => (Some(true), None),
        SubmissionKind::Final => (None, Some(true)),
    };

    SubmissionPayload {
        period_start_date: period_start,
        period_end_date: period_end,
        income: IncomeTotals {
            turnover: Decimal::new(turnover_minor, 2),
        },
        expenses: expenses_minor
            .into_iter()
            .map(|(key, minor)| (key, Decimal::new(minor, 2)))
            .collect(),
        eops_declaration,
        final_declaration,
    }
}

fn expense_bucket(confirmed: Option<&str>) -> &str {
    match confirmed {
        Some(category)
            if category != SENTINEL_CATEGORY && categories::is_known_category(category) =>
        {
            category
        }
        _ => OTHER_EXPENSES_KEY,
    }
}
