//! Closed category vocabularies, selected by tax context.
//!
//! Every suggested or confirmed category must come from the vocabulary of the
//! active context, with `"other"` as the shared fallback sentinel. Verification
//! accepts any category from the union of all vocabularies because the context
//! a row was ingested under is not stored on the row.

use serde::{Deserialize, Serialize};

/// Fallback category for anything the classifier or user cannot place.
pub const SENTINEL_CATEGORY: &str = "other";

/// Vocabulary for self-employment income and expense rows.
pub const SELF_EMPLOYMENT_CATEGORIES: &[&str] = &[
    "travel",
    "office",
    "rent",
    "repairs",
    "wages",
    "sales",
    "utilities",
    "professional_fees",
    "interest",
    "other",
];

/// Vocabulary for property income and expense rows.
pub const PROPERTY_CATEGORIES: &[&str] = &[
    "rent_income",
    "premises_costs",
    "repairs",
    "loan_interest",
    "agent_fees",
    "insurance",
    "other",
];

/// Vocabulary for VAT-period rows.
pub const VAT_CATEGORIES: &[&str] = &[
    "standard_rated",
    "reduced_rated",
    "zero_rated",
    "exempt",
    "other",
];

/// Which reporting regime a batch of rows belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxContext {
    SelfEmployment,
    Property,
    Vat,
}

impl TaxContext {
    /// The closed category vocabulary for this context.
    pub fn vocabulary(self) -> &'static [&'static str] {
        match self {
            TaxContext::SelfEmployment => SELF_EMPLOYMENT_CATEGORIES,
            TaxContext::Property => PROPERTY_CATEGORIES,
            TaxContext::Vat => VAT_CATEGORIES,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaxContext::SelfEmployment => "self_employment",
            TaxContext::Property => "property",
            TaxContext::Vat => "vat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "self_employment" => Some(TaxContext::SelfEmployment),
            "property" => Some(TaxContext::Property),
            "vat" => Some(TaxContext::Vat),
            _ => None,
        }
    }
}

/// Whether `category` belongs to the vocabulary of `context`.
pub fn is_in_vocabulary(context: TaxContext, category: &str) -> bool {
    context.vocabulary().contains(&category)
}

/// Whether `category` belongs to any context's vocabulary (sentinel included).
pub fn is_known_category(category: &str) -> bool {
    [
        TaxContext::SelfEmployment,
        TaxContext::Property,
        TaxContext::Vat,
    ]
    .iter()
    .any(|context| is_in_vocabulary(*context, category))
}
