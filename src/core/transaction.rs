//! Transaction business logic - manual entry, direct edits, deletion, and
//! ownership-scoped queries.
//!
//! Manually entered transactions are born verified: the user supplying the
//! category counts as confirmation, so the `confirmed_category ⇔ verified`
//! invariant holds from the first insert. Direct edits never change
//! verification status.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*};

use crate::core::{categories, normalize};
use crate::entities::{
    Direction, Transaction, TransactionModel, VerificationStatus, transaction,
};
use crate::errors::{Error, Result};

/// Input for a manually entered transaction.
#[derive(Debug, Clone)]
pub struct NewManualTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub category: String,
}

/// Partial update for a direct edit; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub direction: Option<Direction>,
    pub category: Option<String>,
}

/// Optional filters for [`list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<VerificationStatus>,
    pub direction: Option<Direction>,
}

/// Creates a user-entered transaction, already verified under the supplied
/// category.
pub async fn create_manual(
    db: &DatabaseConnection,
    user_id: i64,
    input: NewManualTransaction,
) -> Result<TransactionModel> {
    let category = input.category.trim();
    if !categories::is_known_category(category) {
        return Err(Error::Validation {
            message: format!("unknown category: {category}"),
        });
    }
    if input.amount < Decimal::ZERO {
        return Err(Error::Validation {
            message: format!("amount must not be negative: {}", input.amount),
        });
    }

    let now = Utc::now();
    let model = transaction::ActiveModel {
        user_id: Set(user_id),
        file_id: Set(None),
        date: Set(Some(input.date)),
        description: Set(input.description.trim().to_string()),
        amount_minor: Set(normalize::decimal_to_minor(input.amount)),
        direction: Set(input.direction.as_str().to_string()),
        suggested_category: Set(category.to_string()),
        confirmed_category: Set(Some(category.to_string())),
        status: Set(VerificationStatus::Verified.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::debug!(transaction_id = model.id, "manual transaction created");
    Ok(model)
}

/// Applies a direct edit to an owned transaction. Verification status is
/// never changed here; a category edit is only accepted on a verified row
/// (pending rows must go through verification instead).
pub async fn update(
    db: &DatabaseConnection,
    user_id: i64,
    transaction_id: i64,
    patch: TransactionPatch,
) -> Result<TransactionModel> {
    let existing = find_owned(db, user_id, transaction_id).await?;

    if patch.category.is_some()
        && VerificationStatus::parse(&existing.status) != Some(VerificationStatus::Verified)
    {
        return Err(Error::Validation {
            message: "category can only be edited on a verified transaction".to_string(),
        });
    }
    if let Some(category) = patch.category.as_deref() {
        if !categories::is_known_category(category.trim()) {
            return Err(Error::Validation {
                message: format!("unknown category: {category}"),
            });
        }
    }
    if let Some(amount) = patch.amount {
        if amount < Decimal::ZERO {
            return Err(Error::Validation {
                message: format!("amount must not be negative: {amount}"),
            });
        }
    }

    let mut row: transaction::ActiveModel = existing.into();
    if let Some(date) = patch.date {
        row.date = Set(Some(date));
    }
    if let Some(description) = patch.description {
        row.description = Set(description.trim().to_string());
    }
    if let Some(amount) = patch.amount {
        row.amount_minor = Set(normalize::decimal_to_minor(amount));
    }
    if let Some(direction) = patch.direction {
        row.direction = Set(direction.as_str().to_string());
    }
    if let Some(category) = patch.category {
        row.confirmed_category = Set(Some(category.trim().to_string()));
    }
    row.updated_at = Set(Utc::now());

    row.update(db).await.map_err(Into::into)
}

/// Deletes an owned transaction.
pub async fn delete(db: &DatabaseConnection, user_id: i64, transaction_id: i64) -> Result<()> {
    let result = Transaction::delete_many()
        .filter(transaction::Column::Id.eq(transaction_id))
        .filter(transaction::Column::UserId.eq(user_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let exists = Transaction::find_by_id(transaction_id).one(db).await?;
        return Err(if exists.is_some() {
            Error::Forbidden
        } else {
            Error::NotFound
        });
    }
    tracing::debug!(transaction_id, "transaction deleted");
    Ok(())
}

/// Retrieves one owned transaction.
pub async fn get(
    db: &DatabaseConnection,
    user_id: i64,
    transaction_id: i64,
) -> Result<TransactionModel> {
    find_owned(db, user_id, transaction_id).await
}

/// Lists a user's transactions, newest dates first, with optional filters.
pub async fn list(
    db: &DatabaseConnection,
    user_id: i64,
    filter: TransactionFilter,
) -> Result<Vec<TransactionModel>> {
    let mut query = Transaction::find().filter(transaction::Column::UserId.eq(user_id));

    if let Some(from) = filter.from {
        query = query.filter(transaction::Column::Date.gte(from));
    }
    if let Some(to) = filter.to {
        query = query.filter(transaction::Column::Date.lte(to));
    }
    if let Some(status) = filter.status {
        query = query.filter(transaction::Column::Status.eq(status.as_str()));
    }
    if let Some(direction) = filter.direction {
        query = query.filter(transaction::Column::Direction.eq(direction.as_str()));
    }

    query
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Verified transactions of one user whose date falls inside the inclusive
/// period. Rows without a date can never match.
pub async fn verified_in_period(
    db: &DatabaseConnection,
    user_id: i64,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<Vec<TransactionModel>> {
    Transaction::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::Status.eq(VerificationStatus::Verified.as_str()))
        .filter(transaction::Column::Date.gte(period_start))
        .filter(transaction::Column::Date.lte(period_end))
        .order_by_asc(transaction::Column::Date)
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn find_owned(
    db: &DatabaseConnection,
    user_id: i64,
    transaction_id: i64,
) -> Result<TransactionModel> {
    let found = Transaction::find_by_id(transaction_id).one(db).await?;
    match found {
        Some(model) if model.user_id == user_id => Ok(model),
        Some(_) => Err(Error::Forbidden),
        None => Err(Error::NotFound),
    }
}
