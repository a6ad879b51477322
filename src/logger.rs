//! Observability (spec §7): this crate logs through `tracing` at every layer rather than
//! defining its own logger abstraction, matching the codex crate's approach (`debug!`/
//! `warn!`/`trace!` calls directly against the ambient subscriber). [`TransportLogger`]
//! is the one piece worth naming: a transparent [`Transport`] wrapper that traces every
//! inbound and outbound message, for applications that want wire-level visibility without
//! instrumenting their own transport.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{trace, Level};

use crate::transport::{ConnectionState, Listener, Transport, TransportError};

/// A pluggable log sink (spec §2.8). [`TracingLogger`] is the default, routing through
/// the ambient `tracing` subscriber; applications that want messages routed elsewhere
/// (a UI console, a file independent of the subscriber) can supply their own.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// The default [`Logger`]: forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            Level::TRACE => tracing::trace!("{message}"),
        }
    }
}

/// Wraps `inner`, logging every message that crosses it at `level`.
pub struct TransportLogger {
    inner: Arc<dyn Transport>,
    level: Level,
}

impl TransportLogger {
    pub fn new(inner: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_level(inner, Level::TRACE)
    }

    pub fn with_level(inner: Arc<dyn Transport>, level: Level) -> Arc<Self> {
        Arc::new(Self { inner, level })
    }
}

impl fmt::Debug for TransportLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLogger").field("inner", &self.inner).finish()
    }
}

#[async_trait]
impl Transport for TransportLogger {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state()
    }

    async fn send(&self, message: Value) -> Result<(), TransportError> {
        log_message(self.level, self.inner.name(), "outbound", &message);
        self.inner.send(message).await
    }

    fn set_listener(&self, listener: Listener) {
        let name = self.inner.name().to_string();
        let level = self.level;
        let wrapped: Listener = Box::new(move |message| {
            log_message(level, &name, "inbound", &message);
            listener(message);
        });
        self.inner.set_listener(wrapped);
    }
}

fn log_message(_level: Level, transport: &str, direction: &str, message: &Value) {
    let method = message.get("method").and_then(Value::as_str);
    let id = message.get("id");
    trace!(%transport, direction, method, ?id, "jsonrpc message");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::duplex_pair;

    #[tokio::test]
    async fn forwards_messages_unmodified() {
        let (a, b) = duplex_pair();
        let logged_a = TransportLogger::new(a);
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        b.set_listener(Box::new(move |v| received_clone.lock().unwrap().push(v)));

        logged_a.send(serde_json::json!({"method": "ping", "id": 1})).await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
