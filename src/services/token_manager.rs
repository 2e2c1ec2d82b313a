//! Authority token lifecycle - consent-code exchange, storage, and lazy
//! refresh.
//!
//! Refreshes are serialized per user: concurrent callers race to one
//! `tokio::sync::Mutex`, the winner performs the grant exchange and upserts
//! the row, and losers re-read and reuse the fresh token. At most one
//! refresh-token exchange happens per expiry window.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{Set, prelude::*};
use tokio::sync::Mutex;

use crate::entities::{AuthorityToken, AuthorityTokenModel, authority_token};
use crate::errors::{Error, Result};
use crate::services::authority::{AuthorityApi, AuthorityCallError, TokenGrant};

/// Result of a connection probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Whether the stored access token is still inside its expiry window.
    pub valid: bool,
}

/// Per-user token store coordinator.
#[derive(Debug, Default)]
pub struct TokenManager {
    refresh_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completes the OAuth2 consent flow by exchanging the callback code and
    /// upserting the user's token row.
    pub async fn connect<A>(
        &self,
        db: &DatabaseConnection,
        authority: &A,
        user_id: i64,
        code: &str,
    ) -> Result<()>
    where
        A: AuthorityApi + ?Sized,
    {
        let grant = authority
            .exchange_code(code)
            .await
            .map_err(grant_failure)?;
        store_grant(db, user_id, &grant).await?;
        tracing::info!(user_id, "authority account connected");
        Ok(())
    }

    /// Returns an access token that is valid right now, refreshing lazily if
    /// the stored one has expired.
    pub async fn valid_access_token<A>(
        &self,
        db: &DatabaseConnection,
        authority: &A,
        user_id: i64,
    ) -> Result<String>
    where
        A: AuthorityApi + ?Sized,
    {
        let token = find_token(db, user_id).await?.ok_or(Error::NotConnected)?;
        if is_current(&token) {
            return Ok(token.access_token);
        }

        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        // A concurrent caller may have refreshed while we waited.
        let token = find_token(db, user_id).await?.ok_or(Error::NotConnected)?;
        if is_current(&token) {
            tracing::debug!(user_id, "reusing token refreshed by concurrent caller");
            return Ok(token.access_token);
        }

        let grant = authority
            .refresh(&token.refresh_token)
            .await
            .map_err(grant_failure)?;
        store_grant(db, user_id, &grant).await?;
        tracing::info!(user_id, "access token refreshed");
        Ok(grant.access_token)
    }

    /// Reports whether the user has connected an authority account and
    /// whether the stored token is still current.
    pub async fn connection_status(
        &self,
        db: &DatabaseConnection,
        user_id: i64,
    ) -> Result<ConnectionStatus> {
        Ok(match find_token(db, user_id).await? {
            Some(token) => ConnectionStatus {
                connected: true,
                valid: is_current(&token),
            },
            None => ConnectionStatus {
                connected: false,
                valid: false,
            },
        })
    }

    async fn user_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        // An entry with no clones outside the map has no holder or waiter
        // left, so it is safe to drop.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(user_id).or_default().clone()
    }
}

fn is_current(token: &AuthorityTokenModel) -> bool {
    token.expires_at > Utc::now()
}

/// A failed grant exchange either demands a fresh consent flow or was a
/// transient outage; nothing in between.
fn grant_failure(err: AuthorityCallError) -> Error {
    match err {
        AuthorityCallError::Rejected { .. } => Error::AuthExpired {
            reason: err.to_string(),
        },
        AuthorityCallError::Unavailable(reason) => Error::AuthorityUnavailable {
            submission_id: None,
            reason,
        },
    }
}

async fn find_token(
    db: &DatabaseConnection,
    user_id: i64,
) -> Result<Option<AuthorityTokenModel>> {
    AuthorityToken::find_by_id(user_id)
        .one(db)
        .await
        .map_err(Into::into)
}

async fn store_grant(db: &DatabaseConnection, user_id: i64, grant: &TokenGrant) -> Result<()> {
    let now = Utc::now();
    let model = authority_token::ActiveModel {
        user_id: Set(user_id),
        access_token: Set(grant.access_token.clone()),
        refresh_token: Set(grant.refresh_token.clone()),
        expires_at: Set(now + Duration::seconds(grant.expires_in)),
        scope: Set(grant.scope.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    AuthorityToken::insert(model)
        .on_conflict(
            OnConflict::column(authority_token::Column::UserId)
                .update_columns([
                    authority_token::Column::AccessToken,
                    authority_token::Column::RefreshToken,
                    authority_token::Column::ExpiresAt,
                    authority_token::Column::Scope,
                    authority_token::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}
