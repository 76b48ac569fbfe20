//! Online/offline signal shared between the app and the orchestrator.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared connectivity flag.
///
/// Cloning yields another handle to the same flag. The orchestrator
/// watches it and schedules a sync when it flips from offline to online.
#[derive(Debug, Clone)]
pub struct Connectivity {
    state: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Creates a flag with the given initial state.
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self {
            state: Arc::new(state),
        }
    }

    /// Returns true if the device is online.
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Updates the flag. Watchers are only woken by actual changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online, "connectivity changed");
        }
    }

    /// Returns a receiver that observes every change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let connectivity = Connectivity::new(false);
        let handle = connectivity.clone();

        handle.set_online(true);
        assert!(connectivity.is_online());
    }

    #[tokio::test]
    async fn subscribers_see_changes_only() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }
}
