//! Shared test utilities for `TaxBridge`.
//!
//! This module provides common helper functions for setting up test
//! databases, seeding transaction and token rows, and scripted doubles for
//! the classifier and authority seams.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{ConnectOptions, DatabaseConnection, Set, prelude::*};

use crate::core::categories::TaxContext;
use crate::core::normalize::CanonicalRow;
use crate::entities::{Direction, TransactionModel, authority_token, transaction};
use crate::errors::{Error, Result};
use crate::services::authority::{
    AuthorityApi, AuthorityCallError, AuthorityResponse, TokenGrant,
};
use crate::services::classifier::Classifier;

/// Canned 2xx body [`StubAuthority`] returns when nothing is queued.
pub const STUB_ACCEPT_BODY: &str = r#"{"transactionReference":"TR-0001"}"#;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
///
/// The pool is pinned to one connection: every pooled connection to
/// `sqlite::memory:` opens its own empty database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Inserts an ingested-looking expense transaction awaiting verification.
///
/// # Defaults
/// * `direction`: expense
/// * `confirmed_category`: None
/// * `file_id`: None
pub async fn insert_pending_transaction(
    db: &DatabaseConnection,
    user_id: i64,
    date: &str,
    amount_minor: i64,
    suggested: &str,
) -> Result<TransactionModel> {
    insert_transaction_row(
        db,
        user_id,
        Some(date),
        amount_minor,
        Direction::Expense,
        suggested,
        None,
        "pending_verification",
    )
    .await
}

/// Inserts an already-verified transaction with a confirmed category.
pub async fn insert_verified_transaction(
    db: &DatabaseConnection,
    user_id: i64,
    date: &str,
    amount_minor: i64,
    direction: Direction,
    category: &str,
) -> Result<TransactionModel> {
    insert_transaction_row(
        db,
        user_id,
        Some(date),
        amount_minor,
        direction,
        category,
        Some(category),
        "verified",
    )
    .await
}

/// Inserts a verified expense without a date; such rows can never fall into
/// a submission period.
pub async fn insert_dateless_verified_transaction(
    db: &DatabaseConnection,
    user_id: i64,
    amount_minor: i64,
    category: &str,
) -> Result<TransactionModel> {
    insert_transaction_row(
        db,
        user_id,
        None,
        amount_minor,
        Direction::Expense,
        category,
        Some(category),
        "verified",
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn insert_transaction_row(
    db: &DatabaseConnection,
    user_id: i64,
    date: Option<&str>,
    amount_minor: i64,
    direction: Direction,
    suggested: &str,
    confirmed: Option<&str>,
    status: &str,
) -> Result<TransactionModel> {
    let date = match date {
        Some(text) => Some(text.parse::<NaiveDate>().map_err(|e| Error::Parse {
            message: format!("bad test date {text}: {e}"),
        })?),
        None => None,
    };
    let now = Utc::now();
    transaction::ActiveModel {
        user_id: Set(user_id),
        file_id: Set(None),
        date: Set(date),
        description: Set("Seeded transaction".to_string()),
        amount_minor: Set(amount_minor),
        direction: Set(direction.as_str().to_string()),
        suggested_category: Set(suggested.to_string()),
        confirmed_category: Set(confirmed.map(str::to_string)),
        status: Set(status.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Seeds an authority token row. A negative `expires_offset_secs` produces
/// an already-expired token.
pub async fn insert_authority_token(
    db: &DatabaseConnection,
    user_id: i64,
    access_token: &str,
    refresh_token: &str,
    expires_offset_secs: i64,
) -> Result<()> {
    let now = Utc::now();
    authority_token::ActiveModel {
        user_id: Set(user_id),
        access_token: Set(access_token.to_string()),
        refresh_token: Set(refresh_token.to_string()),
        expires_at: Set(now + chrono::Duration::seconds(expires_offset_secs)),
        scope: Set("read write".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Classifier double that returns one canned completion for every call.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    response: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    /// Replies to every call with `text`.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every call as a model-side outage.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Number of classify calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _rows: &[CanonicalRow], _context: TaxContext) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(Error::ClassifierUnavailable {
                reason: "scripted outage".to_string(),
            }),
        }
    }
}

/// One recorded `submit` call on [`StubAuthority`].
#[derive(Debug, Clone)]
pub struct SubmittedPayload {
    pub payload: String,
    pub access_token: String,
}

/// Scripted stand-in for the authority API.
///
/// Clones share state, so a test can hand one to a workflow and keep
/// asserting on the original handle. Unqueued submits are accepted with
/// [`STUB_ACCEPT_BODY`]; grants are issued as `access-1`, `access-2`, ...
#[derive(Debug, Clone, Default)]
pub struct StubAuthority {
    inner: Arc<StubAuthorityState>,
}

#[derive(Debug, Default)]
struct StubAuthorityState {
    grants_issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    refresh_delay_ms: AtomicU64,
    submit_delay_ms: AtomicU64,
    queued_submissions: Mutex<VecDeque<std::result::Result<AuthorityResponse, AuthorityCallError>>>,
    queued_refresh_errors: Mutex<VecDeque<AuthorityCallError>>,
    submitted: Mutex<Vec<SubmittedPayload>>,
}

impl StubAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every refresh grant pause, widening refresh race windows.
    pub fn with_refresh_delay(self, delay: Duration) -> Self {
        self.inner
            .refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Makes every submit pause before answering.
    pub fn with_submit_delay(self, delay: Duration) -> Self {
        self.inner
            .submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Queues the outcome of the next unanswered submit call.
    pub fn queue_submit(
        &self,
        outcome: std::result::Result<AuthorityResponse, AuthorityCallError>,
    ) {
        self.inner
            .queued_submissions
            .lock()
            .unwrap()
            .push_back(outcome);
    }

    /// Queues a failure for the next refresh grant.
    pub fn queue_refresh_error(&self, error: AuthorityCallError) {
        self.inner
            .queued_refresh_errors
            .lock()
            .unwrap()
            .push_back(error);
    }

    pub fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.inner.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.inner.submit_calls.load(Ordering::SeqCst)
    }

    /// Every submit observed so far, in call order.
    pub fn submitted(&self) -> Vec<SubmittedPayload> {
        self.inner.submitted.lock().unwrap().clone()
    }

    fn next_grant(&self) -> TokenGrant {
        let n = self.inner.grants_issued.fetch_add(1, Ordering::SeqCst) + 1;
        TokenGrant {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            expires_in: 14_400,
            scope: "read write".to_string(),
        }
    }

    async fn pause(ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl AuthorityApi for StubAuthority {
    async fn submit(
        &self,
        payload_json: &str,
        access_token: &str,
    ) -> std::result::Result<AuthorityResponse, AuthorityCallError> {
        self.inner.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.submitted.lock().unwrap().push(SubmittedPayload {
            payload: payload_json.to_string(),
            access_token: access_token.to_string(),
        });
        Self::pause(self.inner.submit_delay_ms.load(Ordering::SeqCst)).await;

        let queued = self.inner.queued_submissions.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(AuthorityResponse {
                status: 200,
                body: STUB_ACCEPT_BODY.to_string(),
            })
        })
    }

    async fn exchange_code(
        &self,
        _code: &str,
    ) -> std::result::Result<TokenGrant, AuthorityCallError> {
        self.inner.exchange_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_grant())
    }

    async fn refresh(
        &self,
        _refresh_token: &str,
    ) -> std::result::Result<TokenGrant, AuthorityCallError> {
        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.inner.queued_refresh_errors.lock().unwrap().pop_front();
        if let Some(error) = queued {
            return Err(error);
        }
        Self::pause(self.inner.refresh_delay_ms.load(Ordering::SeqCst)).await;
        Ok(self.next_grant())
    }
}
