//! Ingestion Workflow - upload bytes to pending transactions.
//!
//! Stages: reject unsupported extensions before anything is stored; insert
//! the file row (`uploaded`) so the audit trail survives later failures;
//! parse; normalize; one classifier call for the whole batch; then persist
//! every transaction and flip the file to `parsed` inside a single storage
//! transaction. A failure in parsing or categorization marks the file
//! `failed` and persists no transactions at all.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde::Serialize;

use crate::core::categories::TaxContext;
use crate::core::{categorize, normalize, spreadsheet};
use crate::entities::{Direction, FileStatus, TransactionModel, VerificationStatus};
use crate::entities::{file, transaction};
use crate::errors::{Error, Result};
use crate::services::classifier::Classifier;

/// What a caller gets back from a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub file_id: i64,
    pub transactions: Vec<TransactionSummary>,
}

/// Caller-facing view of one persisted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub id: i64,
    pub date: Option<NaiveDate>,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub suggested_category: String,
    pub status: String,
}

impl From<&TransactionModel> for TransactionSummary {
    fn from(model: &TransactionModel) -> Self {
        Self {
            id: model.id,
            date: model.date,
            description: model.description.clone(),
            amount: normalize::minor_to_decimal(model.amount_minor),
            direction: Direction::parse(&model.direction).unwrap_or(Direction::Expense),
            suggested_category: model.suggested_category.clone(),
            status: model.status.clone(),
        }
    }
}

/// Ingests one uploaded spreadsheet for `user_id`.
///
/// Duplicate uploads of the same bytes are deliberately not deduplicated;
/// each call produces its own file row.
pub async fn ingest<C: Classifier + ?Sized>(
    db: &DatabaseConnection,
    classifier: &C,
    user_id: i64,
    filename: &str,
    mime_type: &str,
    bytes: &[u8],
    context: TaxContext,
) -> Result<IngestOutcome> {
    let format = spreadsheet::detect_format(filename).ok_or_else(|| Error::Validation {
        message: format!("unsupported file type: {filename}"),
    })?;

    let now = Utc::now();
    let file = file::ActiveModel {
        user_id: Set(user_id),
        original_name: Set(filename.to_string()),
        mime_type: Set(mime_type.to_string()),
        size_bytes: Set(bytes.len() as i64),
        status: Set(FileStatus::Uploaded.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let raw_rows = match spreadsheet::parse_rows(bytes, format) {
        Ok(rows) => rows,
        Err(e) => {
            crate::core::file::set_status(db, file.id, FileStatus::Failed).await?;
            tracing::warn!(file_id = file.id, error = %e, "spreadsheet could not be parsed");
            return Err(e);
        }
    };

    let canonical = normalize::normalize_rows(&raw_rows);
    if canonical.is_empty() {
        crate::core::file::set_status(db, file.id, FileStatus::Parsed).await?;
        tracing::info!(file_id = file.id, "file parsed with no data rows");
        return Ok(IngestOutcome {
            file_id: file.id,
            transactions: Vec::new(),
        });
    }

    let categorized = match categorize::categorize_rows(classifier, &canonical, context).await {
        Ok(rows) => rows,
        Err(e) => {
            crate::core::file::set_status(db, file.id, FileStatus::Failed).await?;
            tracing::warn!(
                file_id = file.id,
                error = %e,
                "categorization failed, no transactions persisted"
            );
            return Err(e);
        }
    };

    // The batch and the file status flip commit together, all-or-nothing
    let txn = db.begin().await?;
    let mut transactions = Vec::with_capacity(categorized.len());
    for row in categorized {
        let now = Utc::now();
        let model = transaction::ActiveModel {
            user_id: Set(user_id),
            file_id: Set(Some(file.id)),
            date: Set(row.date),
            description: Set(row.description),
            amount_minor: Set(normalize::decimal_to_minor(row.amount)),
            direction: Set(row.direction.as_str().to_string()),
            suggested_category: Set(row.suggested_category),
            confirmed_category: Set(None),
            status: Set(VerificationStatus::PendingVerification.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        transactions.push(TransactionSummary::from(&model));
    }
    crate::core::file::set_status(&txn, file.id, FileStatus::Parsed).await?;
    txn.commit().await?;

    tracing::info!(
        file_id = file.id,
        transactions = transactions.len(),
        "spreadsheet ingested"
    );
    Ok(IngestOutcome {
        file_id: file.id,
        transactions,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{File, Transaction};
    use crate::test_utils::*;
    use sea_orm::EntityTrait;

    const BANK_CSV: &[u8] =
        b"Date,Description,Amount,Type\n2025-01-15,Train to Leeds,42.50,expense\n2025-01-20,Invoice 12,150.01,income\n";

    fn two_row_response() -> String {
        r#"[
            {"date": "2025-01-15", "description": "Train to Leeds", "amount": 42.50, "direction": "expense", "category": "travel"},
            {"date": "2025-01-20", "description": "Invoice 12", "amount": 150.01, "direction": "income", "category": "sales"}
        ]"#
        .to_string()
    }

    #[tokio::test]
    async fn test_ingest_persists_batch_and_marks_file_parsed() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let classifier = ScriptedClassifier::with_response(two_row_response());

        let outcome = ingest(
            &db,
            &classifier,
            1,
            "bank.csv",
            "text/csv",
            BANK_CSV,
            TaxContext::SelfEmployment,
        )
        .await?;

        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.transactions[0].suggested_category, "travel");
        assert_eq!(outcome.transactions[0].direction, Direction::Expense);
        assert_eq!(
            outcome.transactions[1].amount,
            "150.01".parse::<Decimal>().unwrap()
        );
        assert_eq!(outcome.transactions[1].direction, Direction::Income);
        assert_eq!(outcome.transactions[0].status, "pending_verification");

        let file = File::find_by_id(outcome.file_id).one(&db).await?.unwrap();
        assert_eq!(file.status, "parsed");
        assert_eq!(file.original_name, "bank.csv");
        assert_eq!(file.size_bytes, BANK_CSV.len() as i64);

        let stored = Transaction::find().all(&db).await?;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].amount_minor, 4250);
        assert_eq!(stored[1].amount_minor, 15001);
        assert!(stored.iter().all(|t| t.file_id == Some(outcome.file_id)));
        assert!(stored.iter().all(|t| t.confirmed_category.is_none()));

        assert_eq!(classifier.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected_before_any_write() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let classifier = ScriptedClassifier::with_response(two_row_response());

        let result = ingest(
            &db,
            &classifier,
            1,
            "statement.pdf",
            "application/pdf",
            BANK_CSV,
            TaxContext::SelfEmployment,
        )
        .await;

        assert!(matches!(result, Err(Error::Validation { .. })));
        assert!(File::find().all(&db).await?.is_empty());
        assert_eq!(classifier.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_parse_failure_marks_file_failed() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let classifier = ScriptedClassifier::with_response(two_row_response());

        let result = ingest(
            &db,
            &classifier,
            1,
            "bank.csv",
            "text/csv",
            b"Date,Amount\n\xff\xfe,1\n",
            TaxContext::SelfEmployment,
        )
        .await;

        assert!(matches!(result, Err(Error::Parse { .. })));
        let files = File::find().all(&db).await?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].status, "failed");
        assert!(Transaction::find().all(&db).await?.is_empty());
        assert_eq!(classifier.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_contract_violation_persists_nothing() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let classifier = ScriptedClassifier::with_response("I cannot help with that.");

        let result = ingest(
            &db,
            &classifier,
            1,
            "bank.csv",
            "text/csv",
            BANK_CSV,
            TaxContext::SelfEmployment,
        )
        .await;

        assert!(matches!(result, Err(Error::ClassifierContract { .. })));
        let files = File::find().all(&db).await?;
        assert_eq!(files[0].status, "failed");
        assert!(Transaction::find().all(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_classifier_outage_persists_nothing() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let classifier = ScriptedClassifier::failing();

        let result = ingest(
            &db,
            &classifier,
            1,
            "bank.csv",
            "text/csv",
            BANK_CSV,
            TaxContext::SelfEmployment,
        )
        .await;

        assert!(matches!(result, Err(Error::ClassifierUnavailable { .. })));
        let files = File::find().all(&db).await?;
        assert_eq!(files[0].status, "failed");
        assert!(Transaction::find().all(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_spreadsheet_skips_the_classifier() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let classifier = ScriptedClassifier::with_response(two_row_response());

        let outcome = ingest(
            &db,
            &classifier,
            1,
            "empty.csv",
            "text/csv",
            b"Date,Description,Amount\n",
            TaxContext::SelfEmployment,
        )
        .await?;

        assert!(outcome.transactions.is_empty());
        let file = File::find_by_id(outcome.file_id).one(&db).await?.unwrap();
        assert_eq!(file.status, "parsed");
        assert_eq!(classifier.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_every_input_row_becomes_a_transaction() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        // classifier loses the date and invents a category outside the vocabulary
        let classifier = ScriptedClassifier::with_response(
            r#"[{"category": "snacks"}, {"category": "travel"}]"#.to_string(),
        );

        let outcome = ingest(
            &db,
            &classifier,
            1,
            "bank.csv",
            "text/csv",
            BANK_CSV,
            TaxContext::SelfEmployment,
        )
        .await?;

        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(outcome.transactions[0].suggested_category, "other");
        assert_eq!(outcome.transactions[1].suggested_category, "travel");
        // input values survive the sparse response
        assert_eq!(outcome.transactions[0].description, "Train to Leeds");
        assert_eq!(
            outcome.transactions[0].date,
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_uploads_create_two_files() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let classifier = ScriptedClassifier::with_response(two_row_response());

        let first = ingest(
            &db,
            &classifier,
            1,
            "bank.csv",
            "text/csv",
            BANK_CSV,
            TaxContext::SelfEmployment,
        )
        .await?;
        let second = ingest(
            &db,
            &classifier,
            1,
            "bank.csv",
            "text/csv",
            BANK_CSV,
            TaxContext::SelfEmployment,
        )
        .await?;

        assert_ne!(first.file_id, second.file_id);
        assert_eq!(Transaction::find().all(&db).await?.len(), 4);
        Ok(())
    }
}
