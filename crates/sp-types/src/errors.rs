//! Error types and conversions

use crate::role::Role;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("A {0} login is already in progress")]
    AlreadyInProgress(Role),

    #[error("Callback state token is unknown or already used (possible CSRF)")]
    CsrfMismatch,

    #[error("Authorization failed: {error}: {description}")]
    Provider { error: String, description: String },

    #[error("Redirect did not include an authorization code")]
    NoCodeReceived,

    #[error("Provider endpoint returned status {status}: {body}")]
    ExchangeFailed { status: u16, body: String },

    #[error("Access token was not issued to this application's client id")]
    TokenNotOurs,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Port {0} is already in use and could not be reclaimed; restart the application or wait for the previous login to finish")]
    PortConflict(u16),

    #[error("Login timed out before the browser redirect arrived")]
    TimedOut,

    #[error("Login was cancelled")]
    Cancelled,

    #[error("Credential store error: {0}")]
    Credentials(String),

    #[error("Token store error: {0}")]
    Storage(String),

    #[error("No stored token for user {0}")]
    UnknownUser(String),

    #[error("Cannot determine account role for user {0}")]
    RoleUndetermined(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    /// Build a provider error from the redirect's `error`/`error_description`
    /// parameters. The `redirect_mismatch` case gets extra guidance, since it
    /// almost always means the registered redirect URI differs byte-for-byte
    /// from the one this process used.
    pub fn provider(error: impl Into<String>, description: impl Into<String>) -> Self {
        let error = error.into();
        let mut description = description.into();
        if error == "redirect_mismatch" {
            description.push_str(
                "; the redirect URI must match exactly what is registered in the Twitch application settings",
            );
        }
        AuthError::Provider { error, description }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
