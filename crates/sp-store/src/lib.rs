//! Credential and token storage for StreamPilot
//!
//! Two storage interfaces back the auth subsystem: `CredentialStore` holds
//! the per-role OAuth application credentials (client id + secret), and
//! `TokenStore` holds the tokens acquired for each authenticated user plus
//! the app-level "current broadcaster" / "current bot" pointers.

pub mod credentials;
pub mod tokens;

pub use credentials::{ClientCredentials, CredentialStore, KeyringCredentialStore, MockCredentialStore};
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenStore};
