//! Per-role login session guard
//!
//! At most one login may be in flight per role: the roles own fixed local
//! ports, and two concurrent attempts for the same role would race for the
//! same listener. The guard is plain owned state on the coordinator, not a
//! process-wide singleton.

use parking_lot::Mutex;
use sp_types::Role;
use std::collections::HashSet;
use tracing::debug;

#[derive(Default)]
pub struct SessionGuard {
    active: Mutex<HashSet<Role>>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the role for a new login. Returns false when a login for
    /// that role is already active; the caller must fail fast rather than
    /// queue.
    pub fn try_acquire(&self, role: Role) -> bool {
        let acquired = self.active.lock().insert(role);
        if acquired {
            debug!("Acquired {} login session", role);
        }
        acquired
    }

    /// Release the role. Called unconditionally in the flow's cleanup step.
    pub fn release(&self, role: Role) {
        if self.active.lock().remove(&role) {
            debug!("Released {} login session", role);
        }
    }

    pub fn is_active(&self, role: Role) -> bool {
        self.active.lock().contains(&role)
    }
}
