//! Server lifecycle notifications.
//!
//! The core pushes events onto subscriber channels; monitoring UIs and
//! loggers attach via [`RtspServer::subscribe`](crate::server::RtspServer::subscribe)
//! without the core ever depending on them. Emission never blocks: a
//! subscriber that went away is silently dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::session::SessionSnapshot;

/// Something observable happened inside the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// The listener is up and both background loops are running.
    Started,
    /// Both loops have exited and all sessions are closed.
    Stopped,
    /// An inbound connection was dropped by admission control.
    Rejected { peer: SocketAddr },
    /// A client connected and was registered in the session table.
    Connected(SessionSnapshot),
    /// An inactive session was reaped from the session table.
    Disconnected(SessionSnapshot),
    /// A session exceeded the activity timeout and was marked inactive.
    Timeout(SessionSnapshot),
    /// A session handled a request (method/stream-name changed).
    Updated(SessionSnapshot),
}

/// Fan-out registry of event subscribers.
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<ServerEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new subscriber; events emitted from now on are delivered
    /// to the returned channel.
    pub fn subscribe(&self) -> Receiver<ServerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, pruning dead ones.
    pub(crate) fn emit(&self, event: ServerEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_events() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        hub.emit(ServerEvent::Started);
        assert!(matches!(rx.recv().unwrap(), ServerEvent::Started));
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        drop(rx);
        hub.emit(ServerEvent::Stopped);
        assert!(hub.subscribers.lock().is_empty());
    }
}
