//! Per-lead mutual exclusion
//!
//! The read tier → compute → write tier section for one lead must not
//! interleave with another for the same lead. Locks are keyed by email and
//! dropped from the registry once no task holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Mutex for one email plus the number of tasks holding or waiting on it
#[derive(Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

type Registry = Arc<Mutex<HashMap<String, Slot>>>;

/// Registry of per-email async mutexes
#[derive(Clone, Default)]
pub struct LeadLocks {
    slots: Registry,
}

/// Counts one user of a slot; dropping it removes the slot once unused
///
/// Exists before the wait starts, so a task cancelled while queued still
/// gives up its place.
struct Registration {
    email: String,
    slots: Registry,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&self.email) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.email);
            }
        }
    }
}

/// Held while a lead's tier is being evaluated and written
pub struct LeadGuard {
    // Field order matters: the mutex is released before the registration
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}

impl LeadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `email`
    pub async fn lock(&self, email: &str) -> LeadGuard {
        let registration = Registration {
            email: email.to_string(),
            slots: Arc::clone(&self.slots),
        };

        let mutex = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(email.to_string()).or_default();
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };

        let guard = mutex.lock_owned().await;

        LeadGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    /// Number of emails with a live lock slot
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
