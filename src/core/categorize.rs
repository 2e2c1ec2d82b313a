//! Categorization Adapter - enforces the classifier contract on raw model text.
//!
//! The classifier may return fenced or prose-wrapped JSON; the adapter tries
//! exactly one extraction (strip fences, take first `[` .. last `]`) and one
//! strict decode. Anything that is not an array of exactly one element per
//! input row fails the whole batch with a typed error. There is no partial
//! application and no reordering: output row `i` always derives from input
//! row `i`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::core::categories::{self, SENTINEL_CATEGORY, TaxContext};
use crate::core::normalize::{self, CanonicalRow};
use crate::entities::Direction;
use crate::errors::{Error, Result};
use crate::services::classifier::Classifier;

/// A canonical row plus its machine-suggested category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedRow {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub suggested_category: String,
}

/// Runs one classifier call for the batch and applies its response.
pub async fn categorize_rows<C: Classifier + ?Sized>(
    classifier: &C,
    rows: &[CanonicalRow],
    context: TaxContext,
) -> Result<Vec<CategorizedRow>> {
    let raw = classifier.classify(rows, context).await?;
    apply_classifier_response(rows, &raw, context)
}

/// Validates raw classifier text against the batch contract and coerces each
/// element onto its input row.
pub fn apply_classifier_response(
    input: &[CanonicalRow],
    raw: &str,
    context: TaxContext,
) -> Result<Vec<CategorizedRow>> {
    let Some(array_text) = extract_json_array(raw) else {
        tracing::warn!("classifier output contained no JSON array");
        return Err(Error::ClassifierContract {
            reason: "output contained no JSON array".to_string(),
        });
    };

    let elements: Vec<Value> =
        serde_json::from_str(array_text).map_err(|e| Error::ClassifierContract {
            reason: format!("output is not valid JSON: {e}"),
        })?;

    if elements.len() != input.len() {
        tracing::warn!(
            expected = input.len(),
            received = elements.len(),
            "classifier row count mismatch"
        );
        return Err(Error::ClassifierContract {
            reason: format!(
                "returned {} rows for {} inputs",
                elements.len(),
                input.len()
            ),
        });
    }

    Ok(input
        .iter()
        .zip(elements.iter())
        .map(|(row, element)| coerce_row(row, element, context))
        .collect())
}

/// Locates the array-shaped substring of the model's reply: code fences are
/// stripped, then everything from the first `[` to the last `]` is taken.
fn extract_json_array(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let body = body.strip_suffix("```").unwrap_or(body);

    let first = body.find('[')?;
    let last = body.rfind(']')?;
    (first < last).then(|| &body[first..=last])
}

/// Merges one classifier element onto its input row. Every field falls back
/// rather than fails: unparseable values keep the input's value, an unknown
/// category becomes the sentinel, and direction is expense unless the
/// element explicitly says income.
fn coerce_row(input: &CanonicalRow, element: &Value, context: TaxContext) -> CategorizedRow {
    let object = element.as_object();

    let date = object
        .and_then(|o| o.get("date"))
        .and_then(normalize::parse_date_value)
        .or(input.date);

    let description = object
        .and_then(|o| o.get("description"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| input.description.clone(), ToString::to_string);

    let amount = object
        .and_then(|o| o.get("amount"))
        .and_then(normalize::parse_amount_value)
        .map_or(input.amount, |a| normalize::round_money(a.abs()));

    let direction = object
        .and_then(|o| o.get("direction").or_else(|| o.get("type")))
        .and_then(Value::as_str)
        .map_or(Direction::Expense, |marker| {
            if marker.trim().eq_ignore_ascii_case("income") {
                Direction::Income
            } else {
                Direction::Expense
            }
        });

    let suggested_category = object
        .and_then(|o| o.get("category"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|category| categories::is_in_vocabulary(context, category))
        .map_or_else(|| SENTINEL_CATEGORY.to_string(), ToString::to_string);

    CategorizedRow {
        date,
        description,
        amount,
        direction,
        suggested_category,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn input_rows() -> Vec<CanonicalRow> {
        vec![
            CanonicalRow {
                date: NaiveDate::from_ymd_opt(2025, 1, 15),
                description: "Train to Leeds".to_string(),
                amount: "42.50".parse().unwrap(),
                direction: Direction::Expense,
            },
            CanonicalRow {
                date: None,
                description: "Invoice 12".to_string(),
                amount: "150.01".parse().unwrap(),
                direction: Direction::Income,
            },
        ]
    }

    #[test]
    fn test_valid_response_applied_in_order() {
        let raw = r#"[
            {"date": "2025-01-15", "description": "Train to Leeds", "amount": 42.50, "direction": "expense", "category": "travel"},
            {"date": "2025-01-20", "description": "Invoice 12", "amount": 150.01, "direction": "income", "category": "sales"}
        ]"#;
        let rows =
            apply_classifier_response(&input_rows(), raw, TaxContext::SelfEmployment).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].suggested_category, "travel");
        assert_eq!(rows[0].direction, Direction::Expense);
        assert_eq!(rows[1].suggested_category, "sales");
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2025, 1, 20));
        assert_eq!(rows[1].direction, Direction::Income);
    }

    #[test]
    fn test_fenced_and_prose_wrapped_output_accepted() {
        let fenced = "```json\n[{\"category\": \"travel\"}]\n```";
        let rows = apply_classifier_response(
            &input_rows()[..1],
            fenced,
            TaxContext::SelfEmployment,
        )
        .unwrap();
        assert_eq!(rows[0].suggested_category, "travel");

        let prose = "Here are your transactions: [{\"category\": \"office\"}] hope that helps!";
        let rows =
            apply_classifier_response(&input_rows()[..1], prose, TaxContext::SelfEmployment)
                .unwrap();
        assert_eq!(rows[0].suggested_category, "office");
    }

    #[test]
    fn test_non_array_output_fails_whole_batch() {
        let raw = "I'm sorry, I can't categorize these transactions.";
        let result = apply_classifier_response(&input_rows(), raw, TaxContext::SelfEmployment);
        assert!(matches!(result, Err(Error::ClassifierContract { .. })));
    }

    #[test]
    fn test_row_count_mismatch_fails_whole_batch() {
        let raw = r#"[{"category": "travel"}]"#;
        let result = apply_classifier_response(&input_rows(), raw, TaxContext::SelfEmployment);
        assert!(matches!(result, Err(Error::ClassifierContract { .. })));
    }

    #[test]
    fn test_unknown_category_becomes_sentinel() {
        let raw = r#"[{"category": "snacks"}, {"category": "rent_income"}]"#;
        // rent_income is valid for property, not self-employment
        let rows =
            apply_classifier_response(&input_rows(), raw, TaxContext::SelfEmployment).unwrap();
        assert_eq!(rows[0].suggested_category, SENTINEL_CATEGORY);
        assert_eq!(rows[1].suggested_category, SENTINEL_CATEGORY);
    }

    #[test]
    fn test_garbage_element_keeps_input_values() {
        let raw = r#"["not an object", {"amount": "lots", "date": null}]"#;
        let rows =
            apply_classifier_response(&input_rows(), raw, TaxContext::SelfEmployment).unwrap();
        assert_eq!(rows[0].description, "Train to Leeds");
        assert_eq!(rows[0].amount, "42.50".parse::<Decimal>().unwrap());
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(rows[0].suggested_category, SENTINEL_CATEGORY);
        assert_eq!(rows[1].amount, "150.01".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_classifier_amounts_are_rounded_magnitudes() {
        let raw = r#"[{"amount": -10.005, "category": "travel"}, {"amount": 1.0, "category": "sales"}]"#;
        let rows =
            apply_classifier_response(&input_rows(), raw, TaxContext::SelfEmployment).unwrap();
        assert_eq!(rows[0].amount, "10.01".parse::<Decimal>().unwrap());
        assert_eq!(rows[1].amount, "1.00".parse::<Decimal>().unwrap());
    }
}
