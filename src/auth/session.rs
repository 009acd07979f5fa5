//! Session lifecycle notifications.

use tokio::sync::broadcast;

/// Something happened to the session that the host application may care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// New credentials were obtained.
    Refreshed,
    /// Credentials were discarded; the user must sign in again.
    Invalidated { reason: String },
}

/// Broadcast channel for session events.
///
/// Publishing never blocks and never fails; events sent with no
/// subscribers are dropped.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
