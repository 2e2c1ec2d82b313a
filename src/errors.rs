use thiserror::Error;

/// Unified error type for every fallible operation in the crate.
///
/// Variants are grouped by origin: caller mistakes (`Validation`, `NotFound`,
/// `Forbidden`, `NotRetryable`), spreadsheet problems (`Parse`), classifier
/// problems (`ClassifierContract`, `ClassifierUnavailable`), tax-authority
/// problems (`AuthorityRejected`, `AuthorityUnavailable`, `NotConnected`,
/// `AuthExpired`), and infrastructure (`Database`, `Serialization`, `Config`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("could not parse spreadsheet: {message}")]
    Parse { message: String },

    #[error("classifier returned output that violates its contract: {reason}")]
    ClassifierContract { reason: String },

    #[error("classifier unavailable: {reason}")]
    ClassifierUnavailable { reason: String },

    #[error("record not found")]
    NotFound,

    #[error("record belongs to a different user")]
    Forbidden,

    #[error("no verified transactions in the requested period")]
    NoVerifiedTransactions,

    #[error("submission in status '{status}' cannot be retried")]
    NotRetryable { status: String },

    #[error("tax authority rejected submission {submission_id} with HTTP {status}")]
    AuthorityRejected {
        submission_id: i64,
        status: u16,
        body: String,
    },

    #[error("tax authority unreachable: {reason}")]
    AuthorityUnavailable {
        submission_id: Option<i64>,
        reason: String,
    },

    #[error("user has not connected a tax authority account")]
    NotConnected,

    #[error("authority token refresh failed, reconnection required: {reason}")]
    AuthExpired { reason: String },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {message}")]
    Config { message: String },
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
