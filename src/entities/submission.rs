//! Submission entity - One delivery attempt of an aggregated period to the
//! tax authority.
//!
//! `payload` is the exact JSON body that was sent; retries re-send these bytes
//! unchanged. `authority_response` holds the authority's response body
//! verbatim, and stays None when the authority could not be reached at all.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Submission database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    /// Unique identifier for the submission
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user; all reads and mutations are scoped to this
    pub user_id: i64,
    /// First day of the reporting period (inclusive)
    pub period_start: Date,
    /// Last day of the reporting period (inclusive)
    pub period_end: Date,
    /// `"periodic"`, `"end_of_period"`, or `"final"`
    pub kind: String,
    /// Exact JSON body sent to the authority
    pub payload: String,
    /// Authority response body verbatim; None when the call never reached it
    pub authority_response: Option<String>,
    /// `"accepted"` or `"failed"`
    pub status: String,
    /// When the most recent delivery attempt finished
    pub submitted_at: DateTimeUtc,
    /// When the submission row was created
    pub created_at: DateTimeUtc,
    /// When the submission row was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Which of the authority's reporting obligations a submission fulfils.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    /// Regular in-year period update
    Periodic,
    /// End-of-period statement; payload carries `eopsDeclaration: true`
    EndOfPeriod,
    /// Final declaration for the year; payload carries `finalDeclaration: true`
    Final,
}

impl SubmissionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionKind::Periodic => "periodic",
            SubmissionKind::EndOfPeriod => "end_of_period",
            SubmissionKind::Final => "final",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "periodic" => Some(SubmissionKind::Periodic),
            "end_of_period" => Some(SubmissionKind::EndOfPeriod),
            "final" => Some(SubmissionKind::Final),
            _ => None,
        }
    }
}

/// Outcome of the most recent delivery attempt.
///
/// There is deliberately no in-flight value: a submission row only exists
/// once its attempt has finished, so retry eligibility is a plain status
/// check under the per-submission lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Authority answered with a 2xx
    Accepted,
    /// Authority rejected the payload, or could not be reached
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(SubmissionStatus::Accepted),
            "failed" => Some(SubmissionStatus::Failed),
            _ => None,
        }
    }
}
