//! Browser-based OAuth login coordination for StreamPilot
//!
//! Signs the broadcaster and bot accounts into Twitch with the OAuth2
//! authorization-code flow: opens the consent screen in the user's browser,
//! receives the redirect on a short-lived local HTTP listener, validates the
//! exchange against forgery, trades the code for tokens, persists them, and
//! keeps them fresh for the rest of the session.
//!
//! # Components
//! - [`AuthFlowCoordinator`] - orchestrates one end-to-end login per role
//! - [`TokenLifecycleManager`] - proactive refresh, logout, role lookup
//! - [`TokenExchangeClient`] - the four outbound calls to the provider
//! - [`StateTokenRegistry`] - single-use CSRF state tokens
//!
//! # Usage Example
//! ```no_run
//! # async fn run() -> sp_types::AuthResult<()> {
//! use std::sync::Arc;
//! use sp_auth::{AuthConfig, AuthFlowCoordinator};
//! use sp_store::{FileTokenStore, KeyringCredentialStore};
//! use sp_types::Role;
//!
//! let coordinator = AuthFlowCoordinator::new(
//!     AuthConfig::default(),
//!     Arc::new(KeyringCredentialStore::new()),
//!     Arc::new(FileTokenStore::open_default()?),
//! );
//! let record = coordinator.login(Role::Broadcaster).await?;
//! println!("signed in as {}", record.username);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod events;
pub mod exchange;
pub mod flow;
pub mod guard;
pub mod lifecycle;
pub mod signal;
pub mod state;
pub mod watchdog;

pub use callback::CallbackListener;
pub use config::AuthConfig;
pub use events::{AuthEvent, AuthEvents};
pub use exchange::{TokenExchangeClient, TokenGrant, UserIdentity};
pub use flow::{AuthFlowCoordinator, SystemOpener, UrlOpener};
pub use guard::SessionGuard;
pub use lifecycle::TokenLifecycleManager;
pub use state::StateTokenRegistry;
pub use watchdog::TimeoutWatchdog;
