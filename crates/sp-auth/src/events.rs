//! Auth change notifications
//!
//! The UI and the chat/automation collaborators subscribe here to learn when
//! stored auth material changes. Delivery is best effort; a subscriber that
//! lags simply misses events.

use sp_types::Role;
use tokio::sync::broadcast;

/// Emitted when stored auth material changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A login completed and tokens were persisted
    Updated {
        role: Role,
        user_id: String,
        username: String,
    },

    /// A stored token was refreshed in place
    TokenRefreshed { role: Role, user_id: String },

    /// Tokens were revoked and removed for a user
    Revoked { user_id: String, username: String },
}

/// Broadcast fan-out for [`AuthEvent`]s.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        tracing::debug!("Auth event: {:?}", event);
        // A send error only means nobody is subscribed right now.
        let _ = self.tx.send(event);
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}
