//! The stream-based channel (spec §4.5): turns a [`Transport`] into a request/response
//! multiplexor plus an inbound request/notification dispatcher.
//!
//! Grounded on the codex crate's `JsonRpcTransport` (`pending: Arc<Mutex<HashMap<_, oneshot::Sender<_>>>>`,
//! an atomic id counter, and a reader/writer task split), generalized from "one fixed
//! peer process over stdio" to "any `Transport` impl, with the channel able to receive
//! requests too, not only notifications".

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::message::{
    classify, validate_params_shape, ErrorObject, Incoming, Notification, Request, RequestId,
    Response,
};
use crate::transport::{ConnectionState, Transport};

/// Outcome of an inbound request dispatched to the installed [`RequestHandler`].
pub enum RequestOutcome {
    Result(Value),
    Error(ErrorObject),
}

/// The single handler installed on a [`Channel`] for inbound requests/notifications
/// (spec §4.5: "Otherwise invoke the handler"). [`crate::typed::TypedChannel`] is the
/// concrete implementation the rest of the crate uses.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle_request(&self, method: &str, params: Option<Value>, id: &RequestId) -> RequestOutcome;
    async fn handle_notification(&self, method: &str, params: Option<Value>);
}

type PendingRequests = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value, ChannelError>>>>>;

/// A request/response multiplexor over a [`Transport`].
///
/// The channel exclusively owns the transport it is constructed on (spec §3
/// "Ownership"): constructing a second `Channel` over the same transport handle is a
/// caller error this crate does not attempt to detect at runtime, matching the codex
/// crate's `JsonRpcTransport`, which likewise assumes exclusive ownership of the child
/// process handles it is spawned with.
pub struct Channel {
    transport: Arc<dyn Transport>,
    pending: PendingRequests,
    next_id: AtomicI64,
    handler_installed: AtomicBool,
}

impl Channel {
    /// Constructs a channel over `transport`. The listener is not installed until
    /// [`Channel::install_handler`] is called, so outbound requests can be issued
    /// immediately but inbound requests/notifications are only buffered by the
    /// transport (per its own buffering contract) until a handler is installed.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicI64::new(0),
            handler_installed: AtomicBool::new(false),
        })
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn connection_state(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.transport.connection_state()
    }

    /// Installs `handler` as the channel's single inbound dispatcher. A second call
    /// fails fast with [`ChannelError::ChannelClosed`]-shaped semantics: spec §4.5's
    /// "materialized only once per transport (second attempt fails fast)".
    pub fn install_handler(self: &Arc<Self>, handler: Arc<dyn RequestHandler>) -> Result<(), ChannelError> {
        if self
            .handler_installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ChannelError::SendFailed(
                "a handler is already installed on this channel".to_string(),
            ));
        }

        let this = Arc::clone(self);
        self.transport.set_listener(Box::new(move |value| {
            let this = Arc::clone(&this);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                this.dispatch_inbound(value, handler).await;
            });
        }));

        self.spawn_close_watcher();
        Ok(())
    }

    /// Fails every outstanding request once the transport closes (Open Question §9
    /// resolved in favor of failing pending requests, matching the codex crate's
    /// `reader_task`, which drains `pending` with `McpError::ChannelClosed` on EOF).
    fn spawn_close_watcher(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let mut state_rx = self.transport.connection_state();
        tokio::spawn(async move {
            loop {
                if state_rx.borrow().is_closed() {
                    break;
                }
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
            let mut pending = this.pending.lock().expect("pending table poisoned");
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(ChannelError::ChannelClosed));
            }
        });
    }

    async fn dispatch_inbound(self: Arc<Self>, value: Value, handler: Arc<dyn RequestHandler>) {
        let Some(incoming) = classify(value) else {
            debug!("dropping message that does not match any JSON-RPC shape");
            return;
        };

        match incoming {
            Incoming::Request(request) => self.handle_inbound_request(request, handler).await,
            Incoming::Notification(notification) => {
                self.handle_inbound_notification(notification, handler).await
            }
            Incoming::Response(response) => self.handle_inbound_response(response).await,
        }
    }

    async fn handle_inbound_request(&self, request: Request, handler: Arc<dyn RequestHandler>) {
        let outcome = handler
            .handle_request(&request.method, request.params, &request.id)
            .await;
        let response = match outcome {
            RequestOutcome::Result(result) => Response::success(request.id, result),
            RequestOutcome::Error(error) => Response::error(
                serde_json::to_value(&request.id).expect("RequestId always serializes"),
                error,
            ),
        };
        let value = serde_json::to_value(&response).expect("Response always serializes");
        if let Err(err) = self.transport.send(value).await {
            warn!(error = %err, "failed to send response to peer");
        }
    }

    async fn handle_inbound_notification(&self, notification: Notification, handler: Arc<dyn RequestHandler>) {
        handler
            .handle_notification(&notification.method, notification.params)
            .await;
    }

    async fn handle_inbound_response(&self, response: Response) {
        let Some(id_key) = response_id_key(&response.id) else {
            debug!("dropping response with a malformed id");
            return;
        };

        let sender = {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.remove(&id_key)
        };
        let Some(sender) = sender else {
            debug!(id = %id_key, "dropping response for unknown or already-completed request id");
            return;
        };

        let outcome = if let Some(error) = response.error {
            Err(ChannelError::Rpc(error))
        } else if let Some(result) = response.result {
            Ok(result)
        } else {
            Err(ChannelError::ProtocolViolation)
        };
        let _ = sender.send(outcome);
    }

    /// Sends a request and returns a future resolving to the raw JSON result, or a
    /// [`ChannelError`] if the peer responded with an error, the response was malformed,
    /// or the send failed.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Result<Value, ChannelError>, ChannelError> {
        if let Some(params) = &params {
            validate_params_shape(params).map_err(ChannelError::SendFailed)?;
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.insert(id.as_key(), tx);
        }

        let request = Request::new(method, params, id.clone());
        let value = serde_json::to_value(&request).expect("Request always serializes");

        if let Err(err) = self.transport.send(value).await {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.remove(&id.as_key());
            return Err(ChannelError::SendFailed(err.0));
        }

        match rx.await {
            Ok(result) => Ok(result),
            Err(_) => Err(ChannelError::ChannelClosed),
        }
    }

    /// Sends a notification. Resolves once the transport accepts the bytes; no
    /// pending-table entry is created.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ChannelError> {
        if let Some(params) = &params {
            validate_params_shape(params).map_err(ChannelError::SendFailed)?;
        }
        let notification = Notification::new(method, params);
        let value = serde_json::to_value(&notification).expect("Notification always serializes");
        self.transport
            .send(value)
            .await
            .map_err(|err| ChannelError::SendFailed(err.0))
    }
}

fn response_id_key(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::duplex_pair;

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler for EchoHandler {
        async fn handle_request(&self, method: &str, params: Option<Value>, _id: &RequestId) -> RequestOutcome {
            if method == "echo" {
                RequestOutcome::Result(params.unwrap_or(Value::Null))
            } else {
                RequestOutcome::Error(ErrorObject::method_not_found(method))
            }
        }

        async fn handle_notification(&self, _method: &str, _params: Option<Value>) {}
    }

    #[tokio::test]
    async fn request_round_trips_through_handler() {
        let (a, b) = duplex_pair();
        let server = Channel::new(a);
        server.install_handler(Arc::new(EchoHandler)).unwrap();
        let client = Channel::new(b);

        let result = client
            .request("echo", Some(serde_json::json!({"value": 42})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, serde_json::json!({"value": 42}));
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let (a, b) = duplex_pair();
        let server = Channel::new(a);
        server.install_handler(Arc::new(EchoHandler)).unwrap();
        let client = Channel::new(b);

        let result = client.request("nope", None).await.unwrap();
        match result {
            Err(ChannelError::Rpc(err)) => assert_eq!(err.code, crate::message::codes::METHOD_NOT_FOUND),
            other => panic!("expected Rpc(method_not_found), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_install_handler_fails_fast() {
        let (a, _b) = duplex_pair();
        let server = Channel::new(a);
        server.install_handler(Arc::new(EchoHandler)).unwrap();
        assert!(server.install_handler(Arc::new(EchoHandler)).is_err());
    }

    #[tokio::test]
    async fn each_concurrent_request_gets_a_distinct_id() {
        let (a, b) = duplex_pair();
        let server = Channel::new(a);
        server.install_handler(Arc::new(EchoHandler)).unwrap();
        let client = Channel::new(b);

        let (r1, r2) = tokio::join!(
            client.request("echo", Some(serde_json::json!({"value": 1}))),
            client.request("echo", Some(serde_json::json!({"value": 2}))),
        );
        assert_eq!(r1.unwrap().unwrap(), serde_json::json!({"value": 1}));
        assert_eq!(r2.unwrap().unwrap(), serde_json::json!({"value": 2}));
    }
}
