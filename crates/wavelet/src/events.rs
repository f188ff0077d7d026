//! Typed events fanned out to subscribers.
//!
//! The bus is a bounded broadcast channel: emission never blocks the reader
//! task, and a subscriber that falls behind loses the oldest events with a
//! warning instead of growing the queue without bound. Subscribers run on
//! their own tasks, so one panicking consumer cannot disturb the others.

use tokio::sync::broadcast;

use wavelet_codec::{Jid, Node};

use crate::error::PairError;

/// Queue depth per subscriber before drop-oldest kicks in.
const EVENT_QUEUE_DEPTH: usize = 512;

/// Immutable event records delivered to subscribers.
#[derive(Debug, Clone)]
pub enum Event {
    /// QR pairing codes, one per rotated server ref, in rotation order.
    Qr { codes: Vec<String> },
    /// Device pairing committed.
    PairSuccess {
        id: Jid,
        lid: Jid,
        business_name: String,
        platform: String,
    },
    /// Device pairing failed; the connection is being torn down.
    PairError { error: PairError },

    /// Authentication completed; the session is live.
    Connected,
    /// The connection dropped unexpectedly.
    Disconnected,
    /// The server rejected our credentials. `on_connect` is true when the
    /// rejection happened during login rather than mid-session.
    LoggedOut { on_connect: bool },
    /// The server refused the connection because this client build is too
    /// old to speak the current protocol.
    ClientOutdated,
    /// Unhandled `<stream:error>`; carries the server's code.
    StreamError { code: String },

    /// An inbound chat message stanza (payload still end-to-end encrypted).
    Message {
        from: Jid,
        id: String,
        timestamp: u64,
        stanza: Node,
    },
    /// Delivery/read receipt.
    Receipt {
        from: Jid,
        ids: Vec<String>,
        receipt_type: String,
    },
    /// Peer presence change.
    Presence { from: Jid, unavailable: bool },
    /// Typing / recording indicator.
    ChatState { from: Jid, composing: bool },
    /// Server notification stanza (group changes, account updates, …).
    Notification(Node),
    /// Incoming call offer.
    CallOffer { from: Jid, call_id: String },
}

/// The fan-out bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
        Self { sender }
    }

    /// Emit to all current subscribers. An event with no subscribers is
    /// dropped silently.
    pub fn emit(&self, event: Event) {
        tracing::trace!(?event, "dispatch");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream { receiver: self.sender.subscribe() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's ordered event stream.
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<Event>,
}

impl EventStream {
    /// The next event, or `None` once the client is dropped. Falling behind
    /// skips the lost events (drop-oldest) and keeps the stream alive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event subscriber lagging; dropped oldest events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_fan_out_to_every_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(Event::Connected);
        assert!(matches!(a.recv().await, Some(Event::Connected)));
        assert!(matches!(b.recv().await, Some(Event::Connected)));
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_but_survives() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        for i in 0..(EVENT_QUEUE_DEPTH + 10) {
            bus.emit(Event::StreamError { code: i.to_string() });
        }
        // The first event delivered is not the first emitted.
        let Some(Event::StreamError { code }) = sub.recv().await else {
            panic!("expected stream error event");
        };
        assert_ne!(code, "0");

        // The stream still works after the lag.
        bus.emit(Event::Connected);
        let mut saw_connected = false;
        while let Some(event) = sub.recv().await {
            if matches!(event, Event::Connected) {
                saw_connected = true;
                break;
            }
        }
        assert!(saw_connected);
    }

    #[tokio::test]
    async fn stream_ends_when_bus_drops() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
