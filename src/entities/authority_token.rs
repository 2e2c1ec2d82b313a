//! AuthorityToken entity - OAuth2 credentials for one user's tax authority
//! connection.
//!
//! Keyed by `user_id` (one connection per user). `expires_at` is the absolute
//! expiry of the access token, computed from the grant's `expires_in` at the
//! moment the grant was stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Authority token database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "authority_tokens")]
pub struct Model {
    /// Owning user; doubles as the primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    /// Current access token, presented as a bearer credential
    pub access_token: String,
    /// Long-lived refresh token used to mint new access tokens
    pub refresh_token: String,
    /// Absolute expiry of `access_token`
    pub expires_at: DateTimeUtc,
    /// Scope string granted by the authority
    pub scope: String,
    /// When the connection was first established
    pub created_at: DateTimeUtc,
    /// When the tokens were last rotated
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
