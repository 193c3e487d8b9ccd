//! Login flow coordination
//!
//! One `login` call drives a complete authorization-code flow: claim the
//! role's session slot, issue the CSRF state, open the consent screen, wait
//! for exactly one of redirect / timeout / cancel, validate and exchange,
//! persist, notify. Cleanup (watchdog, listener, guard, pending state) runs
//! once on every exit path.

use crate::callback::{CallbackListener, RedirectOutcome};
use crate::config::AuthConfig;
use crate::events::{AuthEvent, AuthEvents};
use crate::exchange::TokenExchangeClient;
use crate::guard::SessionGuard;
use crate::signal::{CompletionSignal, FlowWake};
use crate::state::StateTokenRegistry;
use crate::watchdog::TimeoutWatchdog;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sp_store::{CredentialStore, TokenStore};
use sp_types::{AuthError, AuthResult, Role, TokenRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Ephemeral state for one login attempt. Owned exclusively by the
/// coordinator and destroyed when the attempt completes, is cancelled, or
/// times out.
struct LoginSession {
    role: Role,
    state: String,
    port: u16,
    created_at: DateTime<Utc>,
    signal: Arc<CompletionSignal>,
}

/// Opens an authorization URL for the user. Fire-and-forget; the flow keeps
/// waiting on the listener regardless of whether the launch succeeded.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the operating system's default browser.
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Orchestrates one end-to-end login per role.
pub struct AuthFlowCoordinator {
    config: Arc<AuthConfig>,
    registry: StateTokenRegistry,
    guard: SessionGuard,
    exchange: TokenExchangeClient,
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
    events: AuthEvents,
    opener: Arc<dyn UrlOpener>,

    /// Completion signals of in-flight logins, for the cancel path
    active: Mutex<HashMap<Role, Arc<CompletionSignal>>>,
}

impl AuthFlowCoordinator {
    pub fn new(
        config: AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self::with_opener(config, credentials, tokens, Arc::new(SystemOpener))
    }

    /// Use a custom URL opener. Useful for testing without a browser.
    pub fn with_opener(
        config: AuthConfig,
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        let config = Arc::new(config);
        let exchange = TokenExchangeClient::new(Arc::clone(&config), Arc::clone(&credentials));
        Self {
            config,
            registry: StateTokenRegistry::new(),
            guard: SessionGuard::new(),
            exchange,
            credentials,
            tokens,
            events: AuthEvents::new(),
            opener,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Events emitted when logins complete or tokens change.
    pub fn events(&self) -> AuthEvents {
        self.events.clone()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Run one complete login for a role.
    ///
    /// Returns the persisted token record on success. Fails fast with
    /// [`AuthError::AlreadyInProgress`] when a login for the same role is
    /// still in flight.
    pub async fn login(&self, role: Role) -> AuthResult<TokenRecord> {
        if !self.guard.try_acquire(role) {
            warn!("Rejected {} login: one is already in progress", role);
            return Err(AuthError::AlreadyInProgress(role));
        }
        info!("Starting {} login", role);

        let state = self.registry.issue(role);
        let result = self.run(role, &state).await;

        // Single cleanup step for every outcome. The listener and watchdog
        // are torn down inside run(); what remains is the pending state, the
        // cancel slot, and the session guard.
        self.registry.discard(&state);
        self.active.lock().remove(&role);
        self.guard.release(role);

        match &result {
            Ok(record) => info!(
                "{} login completed as {} ({})",
                role, record.username, record.user_id
            ),
            Err(e) => warn!("{} login failed: {}", role, e),
        }
        result
    }

    /// Cancel an in-flight login for a role. No-op when none is active.
    pub fn cancel(&self, role: Role) {
        if let Some(signal) = self.active.lock().get(&role).cloned() {
            info!("Cancelling {} login", role);
            signal.resolve(FlowWake::Cancelled);
        }
    }

    async fn run(&self, role: Role, state: &str) -> AuthResult<TokenRecord> {
        let credentials = self.credentials.load(role)?;
        let (signal, rx) = CompletionSignal::new();
        let session = LoginSession {
            role,
            state: state.to_string(),
            port: role.callback_port(),
            created_at: Utc::now(),
            signal,
        };

        // Bind before opening the browser so the redirect always has a
        // target, then arm the watchdog and publish the cancel slot.
        let listener = CallbackListener::start(session.port, Arc::clone(&session.signal)).await?;
        let watchdog =
            TimeoutWatchdog::arm(Arc::clone(&session.signal), self.config.flow_timeout());
        self.active.lock().insert(role, Arc::clone(&session.signal));

        let url = self.authorization_url(&credentials.client_id, session.role, &session.state);
        if self.config.open_browser {
            if let Err(e) = self.opener.open(&url) {
                // The user can still finish by opening the URL manually.
                error!("Failed to open browser: {}", e);
            }
        }
        debug!("Awaiting redirect on port {}", session.port);

        // Suspend until redirect, timeout, or cancel - whichever wins.
        let wake = rx.await.unwrap_or(FlowWake::Cancelled);
        watchdog.disarm();

        let result = self.complete(role, wake).await;
        debug!(
            "{} login session finished after {}s",
            role,
            (Utc::now() - session.created_at).num_seconds()
        );

        // Torn down after the exchange so the browser's final page delivery
        // is not cut short.
        listener.shutdown().await;
        result
    }

    async fn complete(&self, role: Role, wake: FlowWake) -> AuthResult<TokenRecord> {
        let outcome = match wake {
            FlowWake::TimedOut => return Err(AuthError::TimedOut),
            FlowWake::Cancelled => return Err(AuthError::Cancelled),
            FlowWake::Redirect(outcome) => outcome,
        };

        match outcome {
            RedirectOutcome::Error { error, description } => {
                Err(AuthError::provider(error, description))
            }
            RedirectOutcome::NoCode => Err(AuthError::NoCodeReceived),
            RedirectOutcome::Code { code, state } => {
                // The listener forwards state opaquely; the authoritative
                // CSRF validation happens here.
                let returned = state.ok_or(AuthError::CsrfMismatch)?;
                match self.registry.consume(&returned) {
                    Some(issued) if issued == role => {}
                    Some(other) => {
                        warn!("Redirect state was issued for a {} login", other);
                        return Err(AuthError::CsrfMismatch);
                    }
                    None => return Err(AuthError::CsrfMismatch),
                }

                let grant = self.exchange.exchange_code(&code, role).await?;
                let identity = self.exchange.validate(&grant.access_token, role).await?;
                let record = grant.into_record(&identity);

                self.tokens.save(&record)?;
                self.tokens.set_current_user(role, &record.user_id)?;
                self.events.emit(AuthEvent::Updated {
                    role,
                    user_id: record.user_id.clone(),
                    username: record.username.clone(),
                });
                Ok(record)
            }
        }
    }

    fn authorization_url(&self, client_id: &str, role: Role, state: &str) -> String {
        let scopes = role.scopes().join(" ");
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&force_verify={}",
            self.config.authorize_url,
            urlencoding::encode(client_id),
            urlencoding::encode(&self.config.redirect_uri(role)),
            urlencoding::encode(&scopes),
            urlencoding::encode(state),
            self.config.force_verify,
        )
    }
}
