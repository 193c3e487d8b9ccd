//! CSRF state token registry
//!
//! Every login attempt round-trips an opaque state token through the
//! provider redirect to prove the callback belongs to a login this process
//! actually started. Tokens are single-use: consumption atomically removes
//! them, so a replayed redirect can never complete a second flow.

use parking_lot::Mutex;
use rand::{thread_rng, Rng};
use sp_types::Role;
use std::collections::HashMap;
use tracing::debug;

/// Generate a cryptographically random, URL-safe state string.
///
/// 32 characters from [A-Z a-z 0-9]; safe to embed in a query string
/// without encoding.
pub fn generate_state() -> String {
    let mut rng = thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..62);
            match idx {
                0..=25 => (b'A' + idx) as char,
                26..=51 => (b'a' + (idx - 26)) as char,
                _ => (b'0' + (idx - 52)) as char,
            }
        })
        .collect()
}

/// Issues and consumes the pending state tokens, mapping each to the role
/// being authenticated.
#[derive(Default)]
pub struct StateTokenRegistry {
    pending: Mutex<HashMap<String, Role>>,
}

impl StateTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh state token for a login attempt.
    pub fn issue(&self, role: Role) -> String {
        let state = generate_state();
        self.pending.lock().insert(state.clone(), role);
        debug!("Issued state token for {} login", role);
        state
    }

    /// Atomically consume a state token, returning the role it was issued
    /// for. Unknown and already-consumed tokens return `None`; the caller
    /// must treat that as a CSRF violation and fail the flow.
    pub fn consume(&self, state: &str) -> Option<Role> {
        self.pending.lock().remove(state)
    }

    /// Drop a pending token that will never be consumed (failed or abandoned
    /// flow). No-op when the token was already consumed.
    pub fn discard(&self, state: &str) {
        if self.pending.lock().remove(state).is_some() {
            debug!("Discarded unconsumed state token");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tokens_are_unique() {
        let mut states = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(states.insert(generate_state()), "Generated duplicate state");
        }
    }

    #[test]
    fn test_state_is_url_safe() {
        let state = generate_state();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_consume_returns_issued_role() {
        let registry = StateTokenRegistry::new();
        let state = registry.issue(Role::Broadcaster);
        assert_eq!(registry.consume(&state), Some(Role::Broadcaster));
    }

    #[test]
    fn test_consume_is_single_use() {
        let registry = StateTokenRegistry::new();
        let state = registry.issue(Role::Bot);

        assert_eq!(registry.consume(&state), Some(Role::Bot));
        assert_eq!(registry.consume(&state), None);
    }

    #[test]
    fn test_unknown_state_is_not_found() {
        let registry = StateTokenRegistry::new();
        registry.issue(Role::Bot);
        assert_eq!(registry.consume("UNKNOWN"), None);
    }

    #[test]
    fn test_discard_removes_pending_token() {
        let registry = StateTokenRegistry::new();
        let state = registry.issue(Role::Broadcaster);
        assert_eq!(registry.pending_count(), 1);

        registry.discard(&state);
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.consume(&state), None);
    }
}
