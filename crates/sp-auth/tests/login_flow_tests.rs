//! End-to-end login flow tests
//!
//! Drive the coordinator through real localhost listeners on the fixed role
//! ports, with the provider endpoints stubbed by wiremock and the browser
//! replaced by a capturing opener. Serialized because the role ports are
//! fixed by design.

use parking_lot::Mutex;
use serial_test::serial;
use sp_auth::{AuthConfig, AuthEvent, AuthFlowCoordinator, UrlOpener};
use sp_store::{MemoryTokenStore, MockCredentialStore, TokenStore};
use sp_types::{AuthError, Role, TokenRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Captures authorization URLs instead of launching a browser.
#[derive(Default)]
struct CapturingOpener {
    urls: Mutex<Vec<String>>,
}

impl CapturingOpener {
    async fn wait_for_url(&self) -> String {
        self.wait_for_url_number(1).await
    }

    /// Wait until the `n`th authorization URL has been opened and return it.
    async fn wait_for_url_number(&self, n: usize) -> String {
        for _ in 0..250 {
            let urls = self.urls.lock();
            if urls.len() >= n {
                return urls[n - 1].clone();
            }
            drop(urls);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("authorization URL number {} was never opened", n);
    }

    fn open_count(&self) -> usize {
        self.urls.lock().len()
    }
}

impl UrlOpener for CapturingOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.urls.lock().push(url.to_string());
        Ok(())
    }
}

/// Token store wrapper that counts save calls.
struct CountingTokenStore {
    inner: MemoryTokenStore,
    saves: AtomicUsize,
}

impl CountingTokenStore {
    fn new() -> Self {
        Self {
            inner: MemoryTokenStore::new(),
            saves: AtomicUsize::new(0),
        }
    }
}

impl TokenStore for CountingTokenStore {
    fn get(&self, user_id: &str) -> sp_types::AuthResult<Option<TokenRecord>> {
        self.inner.get(user_id)
    }
    fn save(&self, record: &TokenRecord) -> sp_types::AuthResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(record)
    }
    fn delete(&self, user_id: &str) -> sp_types::AuthResult<()> {
        self.inner.delete(user_id)
    }
    fn current_user(&self, role: Role) -> sp_types::AuthResult<Option<String>> {
        self.inner.current_user(role)
    }
    fn set_current_user(&self, role: Role, user_id: &str) -> sp_types::AuthResult<()> {
        self.inner.set_current_user(role, user_id)
    }
    fn clear_current_user(&self, role: Role) -> sp_types::AuthResult<()> {
        self.inner.clear_current_user(role)
    }
}

struct Harness {
    coordinator: Arc<AuthFlowCoordinator>,
    opener: Arc<CapturingOpener>,
    tokens: Arc<CountingTokenStore>,
    server: MockServer,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sp_auth=debug".into()),
        )
        .try_init();
}

async fn harness_with(configure: impl FnOnce(&mut AuthConfig)) -> Harness {
    init_tracing();
    let server = MockServer::start().await;
    let mut config = AuthConfig {
        token_url: format!("{}/token", server.uri()),
        validate_url: format!("{}/validate", server.uri()),
        revoke_url: format!("{}/revoke", server.uri()),
        ..AuthConfig::default()
    };
    configure(&mut config);

    let credentials = MockCredentialStore::new()
        .with(Role::Broadcaster, "caster-id", "caster-secret")
        .with(Role::Bot, "bot-id", "bot-secret");
    let opener = Arc::new(CapturingOpener::default());
    let tokens = Arc::new(CountingTokenStore::new());

    let coordinator = Arc::new(AuthFlowCoordinator::with_opener(
        config,
        Arc::new(credentials),
        Arc::clone(&tokens) as Arc<dyn TokenStore>,
        Arc::clone(&opener) as Arc<dyn UrlOpener>,
    ));

    Harness {
        coordinator,
        opener,
        tokens,
        server,
    }
}

fn state_param(url: &str) -> String {
    url.split(['?', '&'])
        .find_map(|param| param.strip_prefix("state="))
        .expect("authorization URL has no state parameter")
        .to_string()
}

async fn deliver_redirect(port: u16, query: &str) {
    let body = reqwest::get(format!("http://127.0.0.1:{}/?{}", port, query))
        .await
        .expect("callback listener is not answering")
        .text()
        .await
        .unwrap();
    assert!(body.contains("StreamPilot"));
}

fn mount_success_endpoints(server: &MockServer, client_id: &str) -> (wiremock::Mock, wiremock::Mock) {
    let token = Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-access",
            "refresh_token": "fresh-refresh",
            "expires_in": 14400,
            "scope": ["chat:read", "chat:edit"],
            "token_type": "bearer"
        })));
    let validate = Mock::given(method("GET"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "client_id": client_id,
            "login": "somestreamer",
            "user_id": "100",
            "scopes": ["chat:read", "chat:edit"],
            "expires_in": 14400
        })));
    (token, validate)
}

#[tokio::test]
#[serial]
async fn test_successful_broadcaster_login() {
    let harness = harness_with(|_| {}).await;
    let (token, validate) = mount_success_endpoints(&harness.server, "caster-id");
    token.expect(1).mount(&harness.server).await;
    validate.expect(1).mount(&harness.server).await;

    let mut events = harness.coordinator.subscribe();
    let coordinator = Arc::clone(&harness.coordinator);
    let login = tokio::spawn(async move { coordinator.login(Role::Broadcaster).await });

    let url = harness.opener.wait_for_url().await;
    let state = state_param(&url);
    deliver_redirect(17563, &format!("code=abc123&state={}", state)).await;

    let record = login.await.unwrap().expect("login should succeed");
    assert_eq!(record.user_id, "100");
    assert_eq!(record.username, "somestreamer");
    assert_eq!(record.access_token, "fresh-access");

    // Persisted exactly once, with the broadcaster pointer updated.
    assert_eq!(harness.tokens.saves.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.tokens.current_user(Role::Broadcaster).unwrap(),
        Some("100".to_string())
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        AuthEvent::Updated { role: Role::Broadcaster, .. }
    ));
}

#[tokio::test]
#[serial]
async fn test_provider_error_fails_without_exchange() {
    let harness = harness_with(|_| {}).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let coordinator = Arc::clone(&harness.coordinator);
    let login = tokio::spawn(async move { coordinator.login(Role::Broadcaster).await });

    let url = harness.opener.wait_for_url().await;
    let state = state_param(&url);
    deliver_redirect(
        17563,
        &format!("error=access_denied&error_description=The+user+denied+access&state={}", state),
    )
    .await;

    let err = login.await.unwrap().unwrap_err();
    match err {
        AuthError::Provider { error, .. } => assert_eq!(error, "access_denied"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(harness.tokens.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn test_unknown_state_is_a_csrf_mismatch() {
    let harness = harness_with(|_| {}).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.server)
        .await;

    let coordinator = Arc::clone(&harness.coordinator);
    let login = tokio::spawn(async move { coordinator.login(Role::Broadcaster).await });

    harness.opener.wait_for_url().await;
    deliver_redirect(17563, "code=abc123&state=UNKNOWN").await;

    let err = login.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::CsrfMismatch));
    assert_eq!(harness.tokens.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn test_second_login_for_same_role_fails_fast() {
    let harness = harness_with(|_| {}).await;

    let coordinator = Arc::clone(&harness.coordinator);
    let first = tokio::spawn(async move { coordinator.login(Role::Bot).await });
    harness.opener.wait_for_url().await;

    // The second attempt is rejected immediately, with no new browser tab
    // and no second listener.
    let err = harness.coordinator.login(Role::Bot).await.unwrap_err();
    assert!(matches!(err, AuthError::AlreadyInProgress(Role::Bot)));
    assert_eq!(harness.opener.open_count(), 1);

    // The first attempt is still alive; cancel it to finish.
    harness.coordinator.cancel(Role::Bot);
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::Cancelled));

    // And the role is free again.
    harness.coordinator.cancel(Role::Bot); // no-op
}

#[tokio::test]
#[serial]
async fn test_timeout_frees_the_port() {
    let harness = harness_with(|config| config.flow_timeout_secs = 1).await;

    let coordinator = Arc::clone(&harness.coordinator);
    let login = tokio::spawn(async move { coordinator.login(Role::Broadcaster).await });
    harness.opener.wait_for_url().await;

    let err = login.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::TimedOut));

    // The listener is gone; the port is immediately bindable again.
    let rebound = tokio::net::TcpListener::bind("127.0.0.1:17563").await;
    assert!(rebound.is_ok());
}

#[tokio::test]
#[serial]
async fn test_role_can_log_in_again_after_failure() {
    let harness = harness_with(|_| {}).await;
    let (token, validate) = mount_success_endpoints(&harness.server, "caster-id");
    token.mount(&harness.server).await;
    validate.mount(&harness.server).await;

    // First attempt is cancelled.
    let coordinator = Arc::clone(&harness.coordinator);
    let first = tokio::spawn(async move { coordinator.login(Role::Broadcaster).await });
    harness.opener.wait_for_url().await;
    harness.coordinator.cancel(Role::Broadcaster);
    assert!(matches!(
        first.await.unwrap().unwrap_err(),
        AuthError::Cancelled
    ));

    // Second attempt succeeds with a fresh state token.
    let coordinator = Arc::clone(&harness.coordinator);
    let second = tokio::spawn(async move { coordinator.login(Role::Broadcaster).await });
    let url = harness.opener.wait_for_url_number(2).await;
    let state = state_param(&url);
    deliver_redirect(17563, &format!("code=xyz789&state={}", state)).await;

    let record = second.await.unwrap().expect("second login should succeed");
    assert_eq!(record.user_id, "100");
}
