//! Transaction entity - One business transaction extracted from a spreadsheet
//! or entered by hand.
//!
//! Amounts are stored as integer minor units (`amount_minor`, e.g. pence) so
//! that aggregation never accumulates floating point drift. `date` is nullable
//! because source rows are kept even when their date cannot be parsed.
//! `confirmed_category` is set exactly when `status` is `"verified"`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user; all reads and mutations are scoped to this
    pub user_id: i64,
    /// Source file, None for manually entered transactions
    pub file_id: Option<i64>,
    /// Transaction date, None when the source row had no parseable date
    pub date: Option<Date>,
    /// Free-text description taken from the source row
    pub description: String,
    /// Amount in minor units (pence); always non-negative
    pub amount_minor: i64,
    /// `"income"` or `"expense"`
    pub direction: String,
    /// Category proposed by the classifier (or by the user for manual rows)
    pub suggested_category: String,
    /// Category confirmed by the user; set exactly when verified
    pub confirmed_category: Option<String>,
    /// `"pending_verification"` or `"verified"`
    pub status: String,
    /// When the transaction row was created
    pub created_at: DateTimeUtc,
    /// When the transaction row was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction may come from one file
    #[sea_orm(
        belongs_to = "super::file::Entity",
        from = "Column::FileId",
        to = "super::file::Column::Id"
    )]
    File,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Whether money came in or went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Income => "income",
            Direction::Expense => "expense",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "income" => Some(Direction::Income),
            "expense" => Some(Direction::Expense),
            _ => None,
        }
    }
}

/// Verification lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Awaiting user confirmation; excluded from aggregation
    PendingVerification,
    /// Confirmed by the user; eligible for submission
    Verified,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::PendingVerification => "pending_verification",
            VerificationStatus::Verified => "verified",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_verification" => Some(VerificationStatus::PendingVerification),
            "verified" => Some(VerificationStatus::Verified),
            _ => None,
        }
    }
}
