//! File entity - Represents an uploaded spreadsheet and its ingestion state.
//!
//! Each file records the uploader, the original filename, declared MIME type,
//! byte size, and a lifecycle `status` (`"uploaded"`, `"parsed"`, `"failed"`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// File database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    /// Unique identifier for the file
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user; all reads and mutations are scoped to this
    pub user_id: i64,
    /// Filename as supplied by the uploader
    pub original_name: String,
    /// Declared MIME type (informational; the extension decides the parser)
    pub mime_type: String,
    /// Upload size in bytes
    pub size_bytes: i64,
    /// Lifecycle status: `"uploaded"`, `"parsed"`, or `"failed"`
    pub status: String,
    /// When the file row was created
    pub created_at: DateTimeUtc,
    /// When the file row was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between File and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One file produces many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Ingestion lifecycle of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Row created, spreadsheet not yet parsed
    Uploaded,
    /// Parsed and (if non-empty) transactions persisted
    Parsed,
    /// Parsing or categorization failed; no transactions persisted
    Failed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Uploaded => "uploaded",
            FileStatus::Parsed => "parsed",
            FileStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploaded" => Some(FileStatus::Uploaded),
            "parsed" => Some(FileStatus::Parsed),
            "failed" => Some(FileStatus::Failed),
            _ => None,
        }
    }
}
