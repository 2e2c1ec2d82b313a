//! Submission state machine - aggregate a period, deliver it to the
//! authority, and record the outcome.
//!
//! A submission row is only ever written with a settled status. The send and
//! the recording run on a spawned task, so the row lands even when the caller
//! disconnects mid-flight. Retries re-send the stored payload bytes and are
//! serialized per submission id; rows are never deleted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use tokio::sync::Mutex;

use crate::core::{aggregate, transaction};
use crate::entities::{Submission, SubmissionKind, SubmissionModel, SubmissionStatus, submission};
use crate::errors::{Error, Result};
use crate::services::authority::{AuthorityApi, AuthorityCallError, AuthorityResponse};
use crate::services::token_manager::TokenManager;

/// Drives creation and retry of authority submissions.
#[derive(Clone)]
pub struct SubmissionWorkflow<A> {
    db: DatabaseConnection,
    authority: A,
    tokens: Arc<TokenManager>,
    retry_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl<A> SubmissionWorkflow<A>
where
    A: AuthorityApi + Clone + 'static,
{
    pub fn new(db: DatabaseConnection, authority: A, tokens: Arc<TokenManager>) -> Self {
        Self {
            db,
            authority,
            tokens,
            retry_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Aggregates the user's verified transactions for the period and sends
    /// the result to the authority.
    ///
    /// Returns the new submission id on acceptance. A rejection or outage
    /// still persists the row (status `failed`) and surfaces as
    /// [`Error::AuthorityRejected`] / [`Error::AuthorityUnavailable`]
    /// carrying that id. When nothing qualifies for the period, no row is
    /// written at all.
    pub async fn create(
        &self,
        user_id: i64,
        period_start: NaiveDate,
        period_end: NaiveDate,
        kind: SubmissionKind,
    ) -> Result<i64> {
        if period_start > period_end {
            return Err(Error::Validation {
                message: format!("period start {period_start} is after period end {period_end}"),
            });
        }

        let transactions =
            transaction::verified_in_period(&self.db, user_id, period_start, period_end).await?;
        if transactions.is_empty() {
            return Err(Error::NoVerifiedTransactions);
        }

        let payload = aggregate::aggregate(&transactions, period_start, period_end, kind);
        let payload_json = serde_json::to_string(&payload)?;

        let access_token = self
            .tokens
            .valid_access_token(&self.db, &self.authority, user_id)
            .await?;

        tracing::info!(
            user_id,
            kind = kind.as_str(),
            transaction_count = transactions.len(),
            "sending submission"
        );
        tokio::spawn(send_and_record(
            self.db.clone(),
            self.authority.clone(),
            RecordTarget::New {
                user_id,
                period_start,
                period_end,
                kind,
            },
            payload_json,
            access_token,
        ))
        .await
        .map_err(|e| Error::AuthorityUnavailable {
            submission_id: None,
            reason: format!("send task aborted: {e}"),
        })?
    }

    /// Re-sends a failed submission's stored payload, byte for byte.
    ///
    /// Concurrent retries of the same id queue behind one lock, held until
    /// the attempt's outcome is recorded even if this caller disconnects.
    /// An accepted submission is final; retrying it fails with
    /// [`Error::NotRetryable`] and leaves the row untouched.
    pub async fn retry(&self, user_id: i64, submission_id: i64) -> Result<()> {
        // Owned guard: it rides on the send task below, so a dropped caller
        // cannot release the id while its send is still in flight.
        let guard = self.retry_lock(submission_id).await.lock_owned().await;

        let row = Submission::find_by_id(submission_id)
            .one(&self.db)
            .await?
            .filter(|model| model.user_id == user_id)
            .ok_or(Error::NotFound)?;

        if SubmissionStatus::parse(&row.status) != Some(SubmissionStatus::Failed) {
            return Err(Error::NotRetryable { status: row.status });
        }

        let access_token = self
            .tokens
            .valid_access_token(&self.db, &self.authority, user_id)
            .await?;

        tracing::info!(submission_id, "retrying submission");
        let db = self.db.clone();
        let authority = self.authority.clone();
        tokio::spawn(async move {
            let _guard = guard;
            send_and_record(
                db,
                authority,
                RecordTarget::Existing { submission_id },
                row.payload,
                access_token,
            )
            .await
        })
        .await
        .map_err(|e| Error::AuthorityUnavailable {
            submission_id: Some(submission_id),
            reason: format!("send task aborted: {e}"),
        })?
        .map(|_| ())
    }

    async fn retry_lock(&self, submission_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.retry_locks.lock().await;
        // An entry with no clones outside the map has no holder or waiter
        // left, so it is safe to drop.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(submission_id).or_default().clone()
    }
}

/// Lists a user's submissions, newest first.
pub async fn list(db: &DatabaseConnection, user_id: i64) -> Result<Vec<SubmissionModel>> {
    Submission::find()
        .filter(submission::Column::UserId.eq(user_id))
        .order_by_desc(submission::Column::CreatedAt)
        .order_by_desc(submission::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves one submission with its payload and recorded response.
pub async fn get(
    db: &DatabaseConnection,
    user_id: i64,
    submission_id: i64,
) -> Result<SubmissionModel> {
    Submission::find_by_id(submission_id)
        .one(db)
        .await?
        .filter(|model| model.user_id == user_id)
        .ok_or(Error::NotFound)
}

/// Lightweight status probe.
pub async fn status(db: &DatabaseConnection, user_id: i64, submission_id: i64) -> Result<String> {
    Ok(get(db, user_id, submission_id).await?.status)
}

enum RecordTarget {
    New {
        user_id: i64,
        period_start: NaiveDate,
        period_end: NaiveDate,
        kind: SubmissionKind,
    },
    Existing {
        submission_id: i64,
    },
}

async fn send_and_record<A>(
    db: DatabaseConnection,
    authority: A,
    target: RecordTarget,
    payload_json: String,
    access_token: String,
) -> Result<i64>
where
    A: AuthorityApi,
{
    match authority.submit(&payload_json, &access_token).await {
        Ok(AuthorityResponse { status, body }) => {
            let id = record(
                &db,
                &target,
                &payload_json,
                SubmissionStatus::Accepted,
                Some(body),
            )
            .await?;
            tracing::info!(submission_id = id, status, "submission accepted");
            Ok(id)
        }
        Err(AuthorityCallError::Rejected { status, body }) => {
            let id = record(
                &db,
                &target,
                &payload_json,
                SubmissionStatus::Failed,
                Some(body.clone()),
            )
            .await?;
            tracing::warn!(submission_id = id, status, "submission rejected");
            Err(Error::AuthorityRejected {
                submission_id: id,
                status,
                body,
            })
        }
        Err(AuthorityCallError::Unavailable(reason)) => {
            let id = record(&db, &target, &payload_json, SubmissionStatus::Failed, None).await?;
            tracing::warn!(submission_id = id, reason = %reason, "authority unreachable");
            Err(Error::AuthorityUnavailable {
                submission_id: Some(id),
                reason,
            })
        }
    }
}

async fn record(
    db: &DatabaseConnection,
    target: &RecordTarget,
    payload_json: &str,
    status: SubmissionStatus,
    response_body: Option<String>,
) -> Result<i64> {
    let now = Utc::now();
    match *target {
        RecordTarget::New {
            user_id,
            period_start,
            period_end,
            kind,
        } => {
            let model = submission::ActiveModel {
                user_id: Set(user_id),
                period_start: Set(period_start),
                period_end: Set(period_end),
                kind: Set(kind.as_str().to_string()),
                payload: Set(payload_json.to_string()),
                authority_response: Set(response_body),
                status: Set(status.as_str().to_string()),
                submitted_at: Set(now),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?;
            Ok(model.id)
        }
        RecordTarget::Existing { submission_id } => {
            submission::ActiveModel {
                id: Set(submission_id),
                authority_response: Set(response_body),
                status: Set(status.as_str().to_string()),
                submitted_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .update(db)
            .await?;
            Ok(submission_id)
        }
    }
}
