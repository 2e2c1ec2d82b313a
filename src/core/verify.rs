//! Verification Workflow - human confirmation of suggested categories.
//!
//! Ownership and mutation are one conditional `UPDATE ... WHERE id = ? AND
//! user_id = ?` so that concurrent verifications of the same row can never
//! interleave into an inconsistent state; the loser of a race simply
//! overwrites the winner. Verifying an already verified row is the same
//! last-write-wins overwrite.

use chrono::Utc;
use sea_orm::prelude::*;

use crate::core::categories;
use crate::entities::{Transaction, TransactionModel, VerificationStatus, transaction};
use crate::errors::{Error, Result};

/// Confirms the category of one transaction and marks it verified.
///
/// The category must belong to some context's vocabulary (the sentinel
/// counts). Zero rows affected means the row is missing (`NotFound`) or
/// owned by someone else (`Forbidden`).
pub async fn verify(
    db: &DatabaseConnection,
    user_id: i64,
    transaction_id: i64,
    category: &str,
) -> Result<TransactionModel> {
    let category = validated_category(category)?;

    let affected = conditional_verify_update(db, user_id, &[transaction_id], &category).await?;
    if affected == 0 {
        return Err(missing_or_foreign(db, transaction_id).await?);
    }

    tracing::debug!(transaction_id, category = %category, "transaction verified");

    Transaction::find_by_id(transaction_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound)
}

/// Verifies many transactions under one category in a single conditional
/// update. Foreign and missing ids are silently skipped; the returned count
/// tells the caller how many rows actually changed.
pub async fn bulk_verify(
    db: &DatabaseConnection,
    user_id: i64,
    transaction_ids: &[i64],
    category: &str,
) -> Result<u64> {
    let category = validated_category(category)?;
    if transaction_ids.is_empty() {
        return Ok(0);
    }

    let affected = conditional_verify_update(db, user_id, transaction_ids, &category).await?;
    tracing::debug!(
        requested = transaction_ids.len(),
        affected,
        category = %category,
        "bulk verification applied"
    );
    Ok(affected)
}

fn validated_category(category: &str) -> Result<String> {
    let category = category.trim();
    if !categories::is_known_category(category) {
        return Err(Error::Validation {
            message: format!("unknown category: {category}"),
        });
    }
    Ok(category.to_string())
}

async fn conditional_verify_update(
    db: &DatabaseConnection,
    user_id: i64,
    transaction_ids: &[i64],
    category: &str,
) -> Result<u64> {
    use sea_orm::sea_query::Expr;

    let result = Transaction::update_many()
        .col_expr(
            transaction::Column::ConfirmedCategory,
            Expr::value(category),
        )
        .col_expr(
            transaction::Column::Status,
            Expr::value(VerificationStatus::Verified.as_str()),
        )
        .col_expr(transaction::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(transaction::Column::Id.is_in(transaction_ids.iter().copied()))
        .filter(transaction::Column::UserId.eq(user_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// Distinguishes `NotFound` from `Forbidden` after a conditional update hit
/// nothing. Used only on the failure path, so the extra read is cheap.
async fn missing_or_foreign(db: &DatabaseConnection, transaction_id: i64) -> Result<Error> {
    let exists = Transaction::find_by_id(transaction_id).one(db).await?;
    Ok(if exists.is_some() {
        Error::Forbidden
    } else {
        Error::NotFound
    })
}
