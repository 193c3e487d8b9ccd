//! OAuth application credential storage
//!
//! Each role is a separate Twitch application with its own client id and
//! secret. Secrets live in the OS keychain; tests use the in-memory mock.

use parking_lot::RwLock;
use sp_types::{AuthError, AuthResult, Role};
use std::collections::HashMap;

const KEYCHAIN_SERVICE: &str = "StreamPilot-TwitchApp";

/// Client id + secret pair for one role's Twitch application.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

// The secret must never reach logs.
impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<present>")
            .finish()
    }
}

/// Storage interface for per-role application credentials.
pub trait CredentialStore: Send + Sync {
    /// Load the credentials for a role. Missing credentials are an error:
    /// a login cannot even start without them.
    fn load(&self, role: Role) -> AuthResult<ClientCredentials>;

    /// Store (or replace) the credentials for a role.
    fn store(&self, role: Role, credentials: &ClientCredentials) -> AuthResult<()>;
}

/// OS keychain backed credential store.
///
/// Stores the client id and secret as two keychain entries per role under a
/// single service name.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self {
            service: KEYCHAIN_SERVICE.to_string(),
        }
    }

    /// Use a custom service name (e.g. to isolate a development profile).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> AuthResult<keyring::Entry> {
        keyring::Entry::new(&self.service, account)
            .map_err(|e| AuthError::Credentials(format!("Keychain unavailable: {}", e)))
    }

    fn get(&self, account: &str) -> AuthResult<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Credentials(format!(
                "Failed to read keychain entry {}: {}",
                account, e
            ))),
        }
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self, role: Role) -> AuthResult<ClientCredentials> {
        let client_id = self.get(&format!("{}_client_id", role))?;
        let client_secret = self.get(&format!("{}_client_secret", role))?;

        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => {
                tracing::debug!("Loaded {} application credentials from keychain", role);
                Ok(ClientCredentials {
                    client_id,
                    client_secret,
                })
            }
            _ => Err(AuthError::Credentials(format!(
                "No Twitch application credentials stored for the {} account",
                role
            ))),
        }
    }

    fn store(&self, role: Role, credentials: &ClientCredentials) -> AuthResult<()> {
        self.entry(&format!("{}_client_id", role))?
            .set_password(&credentials.client_id)
            .map_err(|e| AuthError::Credentials(format!("Failed to store client id: {}", e)))?;
        self.entry(&format!("{}_client_secret", role))?
            .set_password(&credentials.client_secret)
            .map_err(|e| AuthError::Credentials(format!("Failed to store client secret: {}", e)))?;

        tracing::info!("Stored {} application credentials in keychain", role);
        Ok(())
    }
}

/// In-memory credential store for tests.
#[derive(Default)]
pub struct MockCredentialStore {
    credentials: RwLock<HashMap<Role, ClientCredentials>>,
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion for test setup.
    pub fn with(self, role: Role, client_id: &str, client_secret: &str) -> Self {
        self.credentials
            .write()
            .insert(role, ClientCredentials::new(client_id, client_secret));
        self
    }
}

impl CredentialStore for MockCredentialStore {
    fn load(&self, role: Role) -> AuthResult<ClientCredentials> {
        self.credentials.read().get(&role).cloned().ok_or_else(|| {
            AuthError::Credentials(format!(
                "No Twitch application credentials stored for the {} account",
                role
            ))
        })
    }

    fn store(&self, role: Role, credentials: &ClientCredentials) -> AuthResult<()> {
        self.credentials.write().insert(role, credentials.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_store_round_trip() {
        let store = MockCredentialStore::new();
        let credentials = ClientCredentials::new("id-123", "secret-456");

        store.store(Role::Broadcaster, &credentials).unwrap();
        let loaded = store.load(Role::Broadcaster).unwrap();
        assert_eq!(loaded, credentials);
    }

    #[test]
    fn test_mock_store_missing_role_is_an_error() {
        let store = MockCredentialStore::new().with(Role::Broadcaster, "id", "secret");
        let err = store.load(Role::Bot).unwrap_err();
        assert!(matches!(err, AuthError::Credentials(_)));
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let credentials = ClientCredentials::new("id-123", "super-secret");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("id-123"));
        assert!(!debug.contains("super-secret"));
    }
}
