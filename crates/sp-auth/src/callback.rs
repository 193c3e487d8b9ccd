//! Local HTTP listener for the OAuth redirect
//!
//! Owns one role's fixed callback port for the lifetime of a single login.
//! The first meaningful request (a `code` or an `error` in the query string)
//! resolves the flow's completion signal; everything else, and everything
//! after resolution, is answered with a static page and otherwise ignored.
//! The state parameter is forwarded opaquely; the coordinator performs the
//! authoritative CSRF check against the registry.

use crate::signal::{CompletionSignal, FlowWake};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::{routing::get, Router};
use serde::Deserialize;
use sp_types::{AuthError, AuthResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Query parameters the provider may attach to the redirect.
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// What the redirect delivered.
#[derive(Debug, Clone)]
pub enum RedirectOutcome {
    /// Authorization code plus the echoed state parameter
    Code { code: String, state: Option<String> },

    /// The provider reported an error instead of a code
    Error { error: String, description: String },

    /// The provider round-tripped our state but sent neither code nor error
    NoCode,
}

const SUCCESS_PAGE: &str = r#"<html><head><title>StreamPilot Login</title></head>
<body style="font-family:sans-serif;text-align:center;margin-top:10em;">
<h1>Login successful!</h1>
<p>You are signed in. You can close this page and return to StreamPilot.</p>
</body></html>"#;

const ERROR_PAGE: &str = r#"<html><head><title>StreamPilot Login</title></head>
<body style="font-family:sans-serif;text-align:center;margin-top:10em;">
<h1>Login failed</h1>
<p>There was an error during the login process. Please check the application for details.</p>
</body></html>"#;

const WAITING_PAGE: &str = r#"<html><head><title>StreamPilot Login</title></head>
<body style="font-family:sans-serif;text-align:center;margin-top:10em;">
<h1>Waiting for login&hellip;</h1>
<p>Complete the authorization in the Twitch window.</p>
</body></html>"#;

/// One login's callback responder.
#[derive(Debug)]
pub struct CallbackListener {
    port: u16,
    task: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind the role's fixed port and start answering redirect requests.
    ///
    /// Resolves `signal` at most once. Requests that arrive after resolution
    /// (duplicate browser loads, refreshes) still get their page but cannot
    /// re-trigger completion.
    pub async fn start(port: u16, signal: Arc<CompletionSignal>) -> AuthResult<Self> {
        let listener = bind_or_reclaim(port).await?;

        // The provider may append a path to the registered redirect URI, and
        // browsers request /favicon.ico; every path gets the same handler.
        let app = Router::new()
            .route("/", get(handle_redirect))
            .fallback(handle_redirect)
            .with_state(signal);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Callback server error on port {}: {}", port, e);
            }
        });

        info!("Callback listener bound to http://localhost:{}/", port);
        Ok(Self { port, task })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop listening and release the port. Runs on every exit path of the
    /// flow: success, provider error, cancellation, and timeout.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
        debug!("Callback listener on port {} stopped", self.port);
    }
}

async fn handle_redirect(
    State(signal): State<Arc<CompletionSignal>>,
    Query(query): Query<CallbackQuery>,
) -> Html<&'static str> {
    if let Some(err) = query.error {
        let description = query
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!("Redirect carried a provider error: {}: {}", err, description);
        if !signal.resolve(FlowWake::Redirect(RedirectOutcome::Error {
            error: err,
            description,
        })) {
            debug!("Ignoring redirect after flow completion");
        }
        return Html(ERROR_PAGE);
    }

    if let Some(code) = query.code {
        info!("Received authorization code on callback listener");
        if !signal.resolve(FlowWake::Redirect(RedirectOutcome::Code {
            code,
            state: query.state,
        })) {
            debug!("Ignoring duplicate redirect after flow completion");
        }
        return Html(SUCCESS_PAGE);
    }

    if query.state.is_some() {
        // A state-bearing request is a genuine redirect, not browser noise.
        warn!("Redirect arrived without an authorization code");
        signal.resolve(FlowWake::Redirect(RedirectOutcome::NoCode));
        return Html(ERROR_PAGE);
    }

    // Favicon requests and other noise; the flow keeps waiting.
    Html(WAITING_PAGE)
}

/// Bind the fixed local port, reclaiming it from a stale owner if needed.
///
/// A previous process that crashed mid-login can leave the port in TIME_WAIT;
/// one retry with SO_REUSEADDR recovers that case. A port held by a live
/// listener is a fatal conflict.
async fn bind_or_reclaim(port: u16) -> AuthResult<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            warn!("Port {} is in use, attempting forced rebind", port);
            let socket = TcpSocket::new_v4()?;
            socket.set_reuseaddr(true)?;
            if socket.bind(addr).is_err() {
                error!("Could not reclaim port {}", port);
                return Err(AuthError::PortConflict(port));
            }
            socket.listen(64).map_err(|_| AuthError::PortConflict(port))
        }
        Err(e) => Err(AuthError::Io(e)),
    }
}
