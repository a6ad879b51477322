//! An in-memory, in-process [`Transport`] pair used by this crate's own test suite
//! (spec §1: "the crate ships one in-memory transport ... so the crate's own test
//! suite ... can exercise the full stack without depending on a concrete I/O transport
//! crate"). Not a reference implementation of every transport-contract edge case —
//! in particular its reentrant-listener support is simplified (see [`Inbox::set_listener`]).

use crate::transport::{ConnectionState, Listener, Transport, TransportError};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

struct Inbox {
    listener: Option<Arc<dyn Fn(Value) + Send + Sync>>,
    buffer: VecDeque<Value>,
}

impl Inbox {
    fn push(inbox: &Mutex<Inbox>, value: Value) {
        let listener = {
            let mut guard = inbox.lock().expect("inbox poisoned");
            match &guard.listener {
                Some(listener) => Some(Arc::clone(listener)),
                None => {
                    guard.buffer.push_back(value.clone());
                    None
                }
            }
        };
        if let Some(listener) = listener {
            listener(value);
        }
    }

    /// Installs `new_listener` and synchronously drains whatever was buffered at the
    /// moment of installation, in arrival order. If the listener replaces itself
    /// mid-drain, the replacement takes effect for subsequently arriving messages; the
    /// remainder of the in-flight drain still completes under the listener that was
    /// active when the drain began.
    fn set_listener(inbox: &Mutex<Inbox>, new_listener: Listener) {
        let new_listener: Arc<dyn Fn(Value) + Send + Sync> = Arc::from(new_listener);
        let buffered = {
            let mut guard = inbox.lock().expect("inbox poisoned");
            guard.listener = Some(Arc::clone(&new_listener));
            guard.buffer.drain(..).collect::<Vec<_>>()
        };
        for message in buffered {
            new_listener(message);
        }
    }
}

/// One endpoint of an in-memory duplex transport pair.
pub struct DuplexTransport {
    name: &'static str,
    outbound: mpsc::UnboundedSender<Value>,
    inbox: Arc<Mutex<Inbox>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl fmt::Debug for DuplexTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexTransport").field("name", &self.name).finish()
    }
}

#[async_trait::async_trait]
impl Transport for DuplexTransport {
    fn name(&self) -> &str {
        self.name
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    async fn send(&self, message: Value) -> Result<(), TransportError> {
        if self.state_rx.borrow().is_closed() {
            return Err(TransportError("transport is closed".to_string()));
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError("peer has disconnected".to_string()))
    }

    fn set_listener(&self, listener: Listener) {
        Inbox::set_listener(&self.inbox, listener);
    }
}

impl DuplexTransport {
    /// Marks this endpoint (and, by extension, its peer's view of it) as closed.
    pub fn close(&self) {
        let _ = self.state_tx.send(ConnectionState::Closed { error: None });
    }
}

/// Builds a connected pair of in-memory transports: messages sent on `a` are delivered
/// to `b`'s listener (buffered if none is installed yet) and vice versa.
pub fn duplex_pair() -> (Arc<DuplexTransport>, Arc<DuplexTransport>) {
    let (a_to_b_tx, mut a_to_b_rx) = mpsc::unbounded_channel::<Value>();
    let (b_to_a_tx, mut b_to_a_rx) = mpsc::unbounded_channel::<Value>();

    let a_inbox = Arc::new(Mutex::new(Inbox {
        listener: None,
        buffer: VecDeque::new(),
    }));
    let b_inbox = Arc::new(Mutex::new(Inbox {
        listener: None,
        buffer: VecDeque::new(),
    }));

    let (a_state_tx, a_state_rx) = watch::channel(ConnectionState::Open);
    let (b_state_tx, b_state_rx) = watch::channel(ConnectionState::Open);

    let a = Arc::new(DuplexTransport {
        name: "duplex-a",
        outbound: a_to_b_tx,
        inbox: Arc::clone(&a_inbox),
        state_tx: a_state_tx,
        state_rx: a_state_rx,
    });
    let b = Arc::new(DuplexTransport {
        name: "duplex-b",
        outbound: b_to_a_tx,
        inbox: Arc::clone(&b_inbox),
        state_tx: b_state_tx,
        state_rx: b_state_rx,
    });

    let b_inbox_for_a_feed = Arc::clone(&b_inbox);
    tokio::spawn(async move {
        while let Some(value) = a_to_b_rx.recv().await {
            Inbox::push(&b_inbox_for_a_feed, value);
        }
    });
    let a_inbox_for_b_feed = Arc::clone(&a_inbox);
    tokio::spawn(async move {
        while let Some(value) = b_to_a_rx.recv().await {
            Inbox::push(&a_inbox_for_b_feed, value);
        }
    });

    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffered_messages_are_delivered_on_listener_install() {
        let (a, b) = duplex_pair();
        a.send(serde_json::json!({"method": "ping"})).await.unwrap();
        // Give the feeder task a tick to move the message into b's inbox buffer.
        tokio::task::yield_now().await;

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        b.set_listener(Box::new(move |v| received_clone.lock().unwrap().push(v)));

        tokio::task::yield_now().await;
        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
