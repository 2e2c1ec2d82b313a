//! Upload bookkeeping - listing stored files, fetching one with its
//! transactions, and cascade deletion.

use sea_orm::{QueryOrder, TransactionTrait, prelude::*};

use crate::entities::{
    File, FileModel, FileStatus, Transaction, TransactionModel, file, transaction,
};
use crate::errors::{Error, Result};

/// A stored file together with the transactions parsed out of it.
#[derive(Debug, Clone)]
pub struct FileWithTransactions {
    pub file: FileModel,
    pub transactions: Vec<TransactionModel>,
}

/// Lists a user's uploaded files, newest first.
pub async fn list(db: &DatabaseConnection, user_id: i64) -> Result<Vec<FileModel>> {
    File::find()
        .filter(file::Column::UserId.eq(user_id))
        .order_by_desc(file::Column::CreatedAt)
        .order_by_desc(file::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves one owned file along with every transaction ingested from it.
pub async fn get(
    db: &DatabaseConnection,
    user_id: i64,
    file_id: i64,
) -> Result<FileWithTransactions> {
    let file = find_owned(db, user_id, file_id).await?;
    let transactions = Transaction::find()
        .filter(transaction::Column::FileId.eq(file.id))
        .filter(transaction::Column::UserId.eq(user_id))
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await?;
    Ok(FileWithTransactions { file, transactions })
}

/// Deletes an owned file and all transactions ingested from it, atomically.
pub async fn delete_cascade(db: &DatabaseConnection, user_id: i64, file_id: i64) -> Result<()> {
    let file = find_owned(db, user_id, file_id).await?;

    let txn = db.begin().await?;
    let removed = Transaction::delete_many()
        .filter(transaction::Column::FileId.eq(file.id))
        .filter(transaction::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    File::delete_by_id(file.id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(
        file_id = file.id,
        transactions_removed = removed.rows_affected,
        "file deleted"
    );
    Ok(())
}

/// Moves a file to a new parse status.
pub(crate) async fn set_status<C: ConnectionTrait>(
    conn: &C,
    file_id: i64,
    status: FileStatus,
) -> Result<()> {
    use sea_orm::sea_query::Expr;

    File::update_many()
        .col_expr(file::Column::Status, Expr::value(status.as_str()))
        .col_expr(file::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(file::Column::Id.eq(file_id))
        .exec(conn)
        .await?;
    Ok(())
}

async fn find_owned(db: &DatabaseConnection, user_id: i64, file_id: i64) -> Result<FileModel> {
    let found = File::find_by_id(file_id).one(db).await?;
    match found {
        Some(model) if model.user_id == user_id => Ok(model),
        Some(_) => Err(Error::Forbidden),
        None => Err(Error::NotFound),
    }
}
