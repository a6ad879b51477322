//! The message transport contract consumed by [`crate::channel::Channel`] (spec §4.3).
//!
//! A transport is a duplex channel of framed JSON values plus a connection-state
//! signal. Concrete transports (WebSocket, length-prefixed or newline-delimited byte
//! streams, inter-window message passing) are external collaborators; this module only
//! defines the interface the rest of the crate consumes. See [`crate::testing`] for the
//! in-memory pair used by this crate's own tests.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tokio::sync::watch;

/// Monotonic connection lifecycle (spec §3). Never reopens once `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed { error: Option<String> },
}

impl ConnectionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed { .. })
    }
}

/// Error returned when a transport fails to hand a message to the underlying channel.
#[derive(Debug, thiserror::Error)]
#[error("transport send failed: {0}")]
pub struct TransportError(pub String);

/// A listener installed on a transport to receive inbound messages.
///
/// Boxed so transports can hold it behind a single reentrant slot (spec §4.3:
/// `set_listener` must synchronously drain buffered messages before returning, while
/// remaining safe to call again from within the listener itself).
pub type Listener = Box<dyn Fn(Value) + Send + Sync>;

/// Duplex channel of framed JSON values with a connection-state signal.
///
/// Implementations must:
/// - deliver messages in the order they were observed on the wire,
/// - buffer inbound messages until a listener is installed (no loss on a late
///   `set_listener` call),
/// - synchronously drain any buffered messages when a listener is installed, while
///   tolerating the listener replacing itself mid-drain,
/// - treat closing as terminal.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// A human-readable identifier, surfaced in diagnostics.
    fn name(&self) -> &str;

    /// The current connection state plus a channel of subsequent changes.
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    /// Hands `message` to the underlying channel. Resolves once accepted for delivery;
    /// a rejected future indicates the message was not, and will not be, sent.
    async fn send(&self, message: Value) -> Result<(), TransportError>;

    /// Installs (or replaces) the single inbound-message listener. Implementations must
    /// synchronously drain any buffered inbound messages into the new listener, in
    /// arrival order, before returning.
    fn set_listener(&self, listener: Listener);
}
