//! Persisted token material for one authenticated identity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair plus metadata for one authenticated user.
///
/// Created on the first successful code exchange, rewritten in place on every
/// refresh, and deleted on logout. The store owns the canonical copy; the
/// auth subsystem reads and writes through the `TokenStore` interface and
/// never caches a private copy.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Provider user id the tokens belong to
    pub user_id: String,

    /// Login name at the time of authentication
    pub username: String,

    /// Current access token
    pub access_token: String,

    /// Refresh token used to renew the access token
    pub refresh_token: String,

    /// Scopes actually granted (may differ from the requested set)
    pub scopes: Vec<String>,

    /// Token type reported by the provider (usually "bearer")
    pub token_type: String,

    /// Absolute expiry. Absent means the provider reported no lifetime;
    /// such a token is treated as live until a 401 proves otherwise.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the current access token was acquired
    pub acquired_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the access token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(at) => at <= Utc::now() + margin,
            None => false,
        }
    }
}

// Token values must never reach logs; only their presence is diagnostic.
impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("access_token", &"<present>")
            .field("refresh_token", &"<present>")
            .field("scopes", &self.scopes)
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}
