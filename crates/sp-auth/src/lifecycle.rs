//! Stored token lifecycle
//!
//! After a login has persisted a token record, callers come here for a live
//! access token. Records near expiry are refreshed proactively (and written
//! back) before the token is handed out; logout revokes best-effort and
//! always deletes locally.

use crate::config::AuthConfig;
use crate::events::{AuthEvent, AuthEvents};
use crate::exchange::TokenExchangeClient;
use chrono::Utc;
use sp_store::{CredentialStore, TokenStore};
use sp_types::{AuthError, AuthResult, Role, TokenRecord};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TokenLifecycleManager {
    exchange: TokenExchangeClient,
    tokens: Arc<dyn TokenStore>,
    events: AuthEvents,
    refresh_margin: chrono::Duration,
}

impl TokenLifecycleManager {
    pub fn new(
        config: Arc<AuthConfig>,
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        events: AuthEvents,
    ) -> Self {
        let refresh_margin = config.refresh_margin();
        Self {
            exchange: TokenExchangeClient::new(config, credentials),
            tokens,
            events,
            refresh_margin,
        }
    }

    /// Return a live access token for a user, refreshing first when the
    /// stored one expires within the proactive margin.
    ///
    /// A refresh failure propagates; whether to fall back to a fresh
    /// interactive login is the caller's decision, not this manager's.
    pub async fn valid_access_token(&self, user_id: &str) -> AuthResult<String> {
        let record = self
            .tokens
            .get(user_id)?
            .ok_or_else(|| AuthError::UnknownUser(user_id.to_string()))?;

        if !record.expires_within(self.refresh_margin) {
            return Ok(record.access_token);
        }

        info!("Token for user {} is near expiry, refreshing", user_id);
        let role = self.determine_role(&record)?;
        let grant = self.exchange.refresh(&record.refresh_token, role).await?;

        // The record is rewritten in place; the user identity is unchanged.
        let mut updated = record;
        updated.access_token = grant.access_token;
        updated.refresh_token = grant.refresh_token;
        if !grant.scopes.is_empty() {
            updated.scopes = grant.scopes;
        }
        if !grant.token_type.is_empty() {
            updated.token_type = grant.token_type;
        }
        updated.expires_at = grant.expires_at;
        updated.acquired_at = Utc::now();

        self.tokens.save(&updated)?;
        self.events.emit(AuthEvent::TokenRefreshed {
            role,
            user_id: updated.user_id.clone(),
        });
        info!("Refreshed {} token for user {}", role, updated.user_id);

        Ok(updated.access_token)
    }

    /// Resolve which role a stored record belongs to.
    ///
    /// The app-level "current broadcaster"/"current bot" pointers are
    /// authoritative. Failing those, the granted scopes are matched against
    /// each role's exclusive scope set; an ambiguous result is an error, not
    /// a guess.
    pub fn determine_role(&self, record: &TokenRecord) -> AuthResult<Role> {
        for role in Role::ALL {
            if self.tokens.current_user(role)?.as_deref() == Some(record.user_id.as_str()) {
                return Ok(role);
            }
        }

        let exclusive_matches = |role: Role| {
            role.exclusive_scopes()
                .iter()
                .filter(|scope| record.scopes.iter().any(|granted| granted == *scope))
                .count()
        };
        let broadcaster = exclusive_matches(Role::Broadcaster);
        let bot = exclusive_matches(Role::Bot);

        match broadcaster.cmp(&bot) {
            Ordering::Greater => Ok(Role::Broadcaster),
            Ordering::Less => Ok(Role::Bot),
            Ordering::Equal => Err(AuthError::RoleUndetermined(record.user_id.clone())),
        }
    }

    /// Log a user out: revoke the access token best-effort, then delete the
    /// record and clear any role pointer naming this user. Logout is always
    /// locally effective even when the provider-side revoke fails.
    pub async fn logout(&self, user_id: &str) -> AuthResult<()> {
        let record = self
            .tokens
            .get(user_id)?
            .ok_or_else(|| AuthError::UnknownUser(user_id.to_string()))?;

        match self.determine_role(&record) {
            Ok(role) => match self.exchange.revoke(&record.access_token, role).await {
                Ok(()) => info!("Revoked token for user {}", user_id),
                Err(e) => warn!("Token revocation failed, continuing with local logout: {}", e),
            },
            Err(e) => warn!("Skipping provider-side revocation: {}", e),
        }

        self.tokens.delete(user_id)?;
        for role in Role::ALL {
            if self.tokens.current_user(role)?.as_deref() == Some(user_id) {
                self.tokens.clear_current_user(role)?;
            }
        }

        self.events.emit(AuthEvent::Revoked {
            user_id: record.user_id.clone(),
            username: record.username.clone(),
        });
        info!("Logged out user {} ({})", record.username, record.user_id);
        Ok(())
    }

    /// Whether a role currently has a usable stored identity.
    pub fn is_authenticated(&self, role: Role) -> AuthResult<bool> {
        match self.tokens.current_user(role)? {
            Some(user_id) => Ok(self.tokens.get(&user_id)?.is_some()),
            None => Ok(false),
        }
    }
}
