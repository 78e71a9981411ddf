//! Connectivity state, reported by the host and observed by components.

use tokio::sync::watch;

/// Explicit online/offline observable. The embedding application reports
/// transitions via `set_online`; components read the current state or
/// subscribe for changes.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// Start in the given state. Offline-first clients usually start
    /// pessimistic and flip online once a probe succeeds.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a connectivity transition. No-op notifications for repeated
    /// identical states are suppressed.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|state| {
            let changed = *state != online;
            *state = online;
            changed
        });
    }

    /// Subscribe to connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
