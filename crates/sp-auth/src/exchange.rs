//! Outbound calls to the identity provider
//!
//! Four network round-trips: code exchange, token validation, refresh, and
//! revocation. None of them retry automatically; callers decide what a
//! failure means for the flow they are driving.

use crate::config::AuthConfig;
use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Client, Response};
use serde::Deserialize;
use sp_store::CredentialStore;
use sp_types::{AuthError, AuthResult, Role, TokenRecord};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,

    #[serde(default)]
    refresh_token: Option<String>,

    /// Lifetime in seconds, when the provider reports one
    #[serde(default)]
    expires_in: Option<i64>,

    /// Granted scopes; the provider sends these as an array
    #[serde(default)]
    scope: Option<Vec<String>>,

    #[serde(default)]
    token_type: String,
}

/// Identity attached to an access token, from the validate endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserIdentity {
    pub client_id: String,
    pub login: String,
    pub user_id: String,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// Remaining token lifetime in seconds, as reported by the provider
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Tokens granted by one exchange or refresh, before an identity is attached.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub scopes: Vec<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenGrant {
    /// Combine the grant with the identity the validate endpoint reported.
    pub fn into_record(self, identity: &UserIdentity) -> TokenRecord {
        let scopes = if self.scopes.is_empty() {
            identity.scopes.clone()
        } else {
            self.scopes
        };
        TokenRecord {
            user_id: identity.user_id.clone(),
            username: identity.login.clone(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scopes,
            token_type: self.token_type,
            expires_at: self.expires_at,
            acquired_at: Utc::now(),
        }
    }
}

// Token values must never reach logs.
impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<present>")
            .field("refresh_token", &"<present>")
            .field("scopes", &self.scopes)
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Client for the provider's token, validate, and revoke endpoints.
///
/// Resolves each role's client credentials through the credential store at
/// call time, so a credential rotation takes effect without rebuilding the
/// client.
#[derive(Clone)]
pub struct TokenExchangeClient {
    http: Client,
    config: Arc<AuthConfig>,
    credentials: Arc<dyn CredentialStore>,
}

impl TokenExchangeClient {
    pub fn new(config: Arc<AuthConfig>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            http: Client::new(),
            config,
            credentials,
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// The redirect URI in the form body must match the one used to build
    /// the authorization URL byte-for-byte or the provider rejects the
    /// exchange with `redirect_mismatch`.
    pub async fn exchange_code(&self, code: &str, role: Role) -> AuthResult<TokenGrant> {
        let credentials = self.credentials.load(role)?;
        let redirect_uri = self.config.redirect_uri(role);

        info!("Exchanging authorization code for {} tokens", role);
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(HTTP_TIMEOUT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Token request failed: {}", e)))?;

        let token = parse_token_response(response).await?;
        let refresh_token = token.refresh_token.ok_or_else(|| {
            AuthError::Network("Token response did not include a refresh token".to_string())
        })?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token,
            scopes: token.scope.unwrap_or_default(),
            token_type: token.token_type,
            expires_at: expiry_from(token.expires_in),
        })
    }

    /// Confirm a token was issued to this application and fetch its identity.
    pub async fn validate(&self, access_token: &str, role: Role) -> AuthResult<UserIdentity> {
        let credentials = self.credentials.load(role)?;

        let response = self
            .http
            .get(&self.config.validate_url)
            .timeout(HTTP_TIMEOUT)
            .header(header::AUTHORIZATION, format!("OAuth {}", access_token))
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Validate request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Token validation failed with status {}: {}", status, body);
            return Err(AuthError::ExchangeFailed { status, body });
        }

        let identity: UserIdentity = response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("Invalid validate response: {}", e)))?;

        if identity.client_id != credentials.client_id {
            error!("Validated token belongs to a different client id");
            return Err(AuthError::TokenNotOurs);
        }

        debug!(
            "Validated token for user {} ({})",
            identity.login, identity.user_id
        );
        Ok(identity)
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str, role: Role) -> AuthResult<TokenGrant> {
        let credentials = self.credentials.load(role)?;

        info!("Refreshing {} tokens", role);
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(HTTP_TIMEOUT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Refresh request failed: {}", e)))?;

        let token = parse_token_response(response).await?;

        Ok(TokenGrant {
            access_token: token.access_token,
            // The provider may rotate the refresh token; keep the old one
            // when it does not.
            refresh_token: token
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            scopes: token.scope.unwrap_or_default(),
            token_type: token.token_type,
            expires_at: expiry_from(token.expires_in),
        })
    }

    /// Revoke an access token. Best effort: callers log a failure and carry
    /// on with local deletion.
    pub async fn revoke(&self, access_token: &str, role: Role) -> AuthResult<()> {
        let credentials = self.credentials.load(role)?;

        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("token", access_token),
        ];

        let response = self
            .http
            .post(&self.config.revoke_url)
            .timeout(HTTP_TIMEOUT)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Revoke request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Token revocation returned status {}: {}", status, body);
            return Err(AuthError::ExchangeFailed { status, body });
        }

        Ok(())
    }
}

async fn parse_token_response(response: Response) -> AuthResult<TokenResponse> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!("Token endpoint returned status {}: {}", status, body);
        return Err(AuthError::ExchangeFailed { status, body });
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::Network(format!("Invalid token response: {}", e)))
}

fn expiry_from(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in.map(|seconds| Utc::now() + Duration::seconds(seconds))
}
