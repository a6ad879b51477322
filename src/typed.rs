//! The typed channel (spec §4.6): method-dispatch table, schema-driven (de)serialization,
//! and error-kind classification layered on top of a [`crate::channel::Channel`].

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::channel::{Channel, RequestHandler, RequestOutcome};
use crate::descriptor::{NotificationType, RequestType};
use crate::error::{ChannelError, DomainError, TypedChannelError};
use crate::message::{codes, ErrorObject, RequestId};
use crate::serializer::Serializer;

/// Options controlling a [`TypedChannel`]'s behavior (spec §6).
#[derive(Debug, Clone, Default)]
pub struct TypedChannelOptions {
    /// Sets the `$ignoreUnexpectedProperties` marker on outgoing params so a peer whose
    /// serializer supports it relaxes strict schema checking (spec §9 Open Question:
    /// peers that don't understand the marker just ignore the extra property).
    pub ignore_unexpected_properties_in_responses: bool,
    /// Echoes exception text to the peer on unexpected handler failures. Off by default.
    pub send_exception_details: bool,
}

/// Wire marker applied to outgoing params when `ignore_unexpected_properties_in_responses`
/// is enabled.
pub const IGNORE_UNEXPECTED_PROPERTIES_KEY: &str = "$ignoreUnexpectedProperties";

/// Observed lifecycle of a typed channel (spec §4.8 state machine, generalized to every
/// typed channel, not just the reflection contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedChannelState {
    Constructed,
    Listening,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type ErasedRequestFn<Cin> =
    Arc<dyn Fn(Option<Value>, RequestId, Cin) -> BoxFuture<Result<Value, DispatchFailure>> + Send + Sync>;
type ErasedNotificationFn<Cin> = Arc<dyn Fn(Option<Value>, Cin) -> BoxFuture<()> + Send + Sync>;
type ErasedUnknownNotificationFn<Cin> = Arc<dyn Fn(String, Option<Value>, Cin) -> BoxFuture<()> + Send + Sync>;

enum DispatchFailure {
    InvalidParams(String),
    Domain { code: i64, message: String, data: Option<Value> },
}

/// `std::any::type_name` of a descriptor's params/result/error types, carried in the
/// dispatch table so the reflection contract can describe registered methods (spec §4.8
/// `paramsType`/`resultType`/`errorType`) without re-deriving them from the handler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryTypeNames {
    pub params: &'static str,
    pub result: Option<&'static str>,
    pub error: Option<&'static str>,
}

enum Entry<Cin> {
    Request(ErasedRequestFn<Cin>, EntryTypeNames),
    Notification(Vec<(u64, ErasedNotificationFn<Cin>)>, EntryTypeNames),
}

impl<Cin> Clone for Entry<Cin> {
    fn clone(&self) -> Self {
        match self {
            Entry::Request(h, types) => Entry::Request(Arc::clone(h), *types),
            Entry::Notification(hs, types) => Entry::Notification(hs.clone(), *types),
        }
    }
}

/// Disposes a registration (or an aggregate of registrations) when called. Calling
/// [`Disposer::dispose`] more than once is a no-op after the first.
pub struct Disposer {
    dispose: Option<Box<dyn FnMut() + Send>>,
}

impl Disposer {
    pub fn new(dispose: impl FnMut() + Send + 'static) -> Self {
        Self { dispose: Some(Box::new(dispose)) }
    }

    pub fn dispose(&mut self) {
        if let Some(mut f) = self.dispose.take() {
            f();
        }
    }

    /// Combines several disposers into one that disposes all of them, in order.
    pub fn aggregate(disposers: Vec<Disposer>) -> Disposer {
        let disposers = Arc::new(Mutex::new(disposers));
        Disposer::new(move || {
            for d in disposers.lock().expect("disposer list poisoned").iter_mut() {
                d.dispose();
            }
        })
    }
}

/// The structured error a typed outbound request resolves to: a JSON-RPC error code and
/// message, plus the domain error payload decoded through the descriptor's error
/// serializer (spec §8 invariant 5: "the caller receives the same deserialized data the
/// handler produced").
#[derive(Debug)]
pub struct TypedRequestError<E> {
    pub code: i64,
    pub message: String,
    pub data: Option<E>,
}

impl<E: fmt::Debug> fmt::Display for TypedRequestError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl<E: fmt::Debug> std::error::Error for TypedRequestError<E> {}

/// The outcome of an [optional request](crate::descriptor::RequestType::optional): either
/// the typed result, or a sentinel meaning the peer didn't recognize the method (spec
/// §4.6, §8 invariant 7).
#[derive(Debug, Clone, PartialEq)]
pub enum OptionalResult<R> {
    Ok(R),
    MethodNotFound,
}

impl<R> OptionalResult<R> {
    pub fn into_option(self) -> Option<R> {
        match self {
            OptionalResult::Ok(r) => Some(r),
            OptionalResult::MethodNotFound => None,
        }
    }
}

/// Layers typed dispatch on a [`Channel`]. Generic over a receive-context type `Cin`
/// (threaded into inbound handlers, produced per-dispatch by a context factory) and a
/// send-context type `Cout` (threaded explicitly into outbound calls by the caller).
pub struct TypedChannel<Cin, Cout> {
    channel: Arc<Channel>,
    dispatch: Mutex<HashMap<String, Entry<Cin>>>,
    unknown_notification_handlers: Mutex<Vec<(u64, ErasedUnknownNotificationFn<Cin>)>>,
    next_disposal_id: AtomicU64,
    state: Mutex<TypedChannelState>,
    started: tokio::sync::Notify,
    started_flag: AtomicBool,
    options: TypedChannelOptions,
    context_factory: Arc<dyn Fn() -> Cin + Send + Sync>,
    _cout: std::marker::PhantomData<fn() -> Cout>,
}

impl<Cin, Cout> fmt::Debug for TypedChannel<Cin, Cout> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedChannel")
            .field("transport", &self.channel.transport_name())
            .field("state", &*self.state.lock().expect("state poisoned"))
            .finish()
    }
}

impl<Cin, Cout> TypedChannel<Cin, Cout>
where
    Cin: Clone + Send + Sync + 'static,
    Cout: Send + Sync + 'static,
{
    /// Constructs a typed channel over `channel`. `context_factory` produces a fresh
    /// `Cin` for each inbound dispatch.
    pub fn new(channel: Arc<Channel>, context_factory: Arc<dyn Fn() -> Cin + Send + Sync>) -> Arc<Self> {
        Self::with_options(channel, context_factory, TypedChannelOptions::default())
    }

    pub fn with_options(
        channel: Arc<Channel>,
        context_factory: Arc<dyn Fn() -> Cin + Send + Sync>,
        options: TypedChannelOptions,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            channel,
            dispatch: Mutex::new(HashMap::new()),
            unknown_notification_handlers: Mutex::new(Vec::new()),
            next_disposal_id: AtomicU64::new(0),
            state: Mutex::new(TypedChannelState::Constructed),
            started: tokio::sync::Notify::new(),
            started_flag: AtomicBool::new(false),
            options,
            context_factory,
            _cout: std::marker::PhantomData,
        });
        this.spawn_start_warning();
        this
    }

    fn spawn_start_warning(self: &Arc<Self>) {
        if !cfg!(debug_assertions) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if !this.started_flag.load(Ordering::SeqCst) {
                warn!(
                    transport = %this.channel.transport_name(),
                    "typed channel was not started within 1 second of construction"
                );
            }
        });
    }

    pub fn state(&self) -> TypedChannelState {
        *self.state.lock().expect("state poisoned")
    }

    /// Resolves once [`TypedChannel::start`] has been called.
    pub async fn started(&self) {
        if self.started_flag.load(Ordering::SeqCst) {
            return;
        }
        self.started.notified().await;
    }

    /// Registers a request handler. Duplicate registration for the same method fails
    /// (spec §4.6 dispatch-table rule).
    pub fn register_request<P, R, E, F, Fut>(
        self: &Arc<Self>,
        descriptor: &RequestType<P, R, E>,
        handler: F,
    ) -> Result<Disposer, TypedChannelError>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(P, RequestId, Cin) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, DomainError>> + Send + 'static,
    {
        let method = descriptor.method.clone();
        let params_ser = Arc::clone(&descriptor.params);
        let result_ser = Arc::clone(&descriptor.result);
        let handler = Arc::new(handler);

        let erased: ErasedRequestFn<Cin> = Arc::new(move |raw_params, id, ctx| {
            let params_ser = Arc::clone(&params_ser);
            let result_ser = Arc::clone(&result_ser);
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let params = params_ser
                    .deserialize(raw_params.unwrap_or(Value::Null))
                    .map_err(|err| DispatchFailure::InvalidParams(err.0))?;
                match handler(params, id, ctx).await {
                    Ok(result) => Ok(result_ser.serialize(&result)),
                    Err(domain) => Err(DispatchFailure::Domain {
                        code: domain.code.unwrap_or(codes::GENERIC_APPLICATION_ERROR),
                        message: domain
                            .message
                            .clone()
                            .unwrap_or_else(|| "An error was returned".to_string()),
                        data: domain.data,
                    }),
                }
            })
        });

        let types = EntryTypeNames {
            params: descriptor.params_type,
            result: Some(descriptor.result_type),
            error: Some(descriptor.error_type),
        };

        let mut dispatch = self.dispatch.lock().expect("dispatch table poisoned");
        if dispatch.contains_key(&method) {
            return Err(TypedChannelError::DuplicateRequestHandler(method));
        }
        dispatch.insert(method.clone(), Entry::Request(erased, types));
        drop(dispatch);

        let this = Arc::clone(self);
        Ok(Disposer::new(move || {
            this.dispatch.lock().expect("dispatch table poisoned").remove(&method);
        }))
    }

    /// Registers a notification handler. A second registration for the same method adds
    /// to the set; every registered handler runs for each inbound notification.
    pub fn register_notification<P, F, Fut>(
        self: &Arc<Self>,
        descriptor: &NotificationType<P>,
        handler: F,
    ) -> Result<Disposer, TypedChannelError>
    where
        P: Send + 'static,
        F: Fn(P, Cin) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let method = descriptor.method.clone();
        let params_ser = Arc::clone(&descriptor.params);
        let handler = Arc::new(handler);

        let erased: ErasedNotificationFn<Cin> = Arc::new(move |raw_params, ctx| {
            let params_ser = Arc::clone(&params_ser);
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                match params_ser.deserialize(raw_params.unwrap_or(Value::Null)) {
                    Ok(params) => handler(params, ctx).await,
                    Err(err) => debug!(error = %err.0, "dropping notification with invalid params"),
                }
            })
        });

        let types = EntryTypeNames { params: descriptor.params_type, result: None, error: None };

        let id = self.next_disposal_id.fetch_add(1, Ordering::SeqCst);
        let mut dispatch = self.dispatch.lock().expect("dispatch table poisoned");
        match dispatch.get_mut(&method) {
            Some(Entry::Request(..)) => {
                return Err(TypedChannelError::ConflictingNotificationRegistration(method));
            }
            Some(Entry::Notification(handlers, _)) => handlers.push((id, erased)),
            None => {
                dispatch.insert(method.clone(), Entry::Notification(vec![(id, erased)], types));
            }
        }
        drop(dispatch);

        let this = Arc::clone(self);
        Ok(Disposer::new(move || {
            let mut dispatch = this.dispatch.lock().expect("dispatch table poisoned");
            if let Some(Entry::Notification(handlers, _)) = dispatch.get_mut(&method) {
                handlers.retain(|(hid, _)| *hid != id);
            }
        }))
    }

    /// Registers a handler for inbound notifications whose method has no registered
    /// [`NotificationType`] (spec §4.6: "the channel offers an 'unknown notification'
    /// handler set — all such handlers are invoked; if none are installed, log at
    /// debug"). All handlers in the set run for every unrecognized method.
    pub fn register_unknown_notification_handler<F, Fut>(self: &Arc<Self>, handler: F) -> Disposer
    where
        F: Fn(String, Option<Value>, Cin) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let erased: ErasedUnknownNotificationFn<Cin> =
            Arc::new(move |method, params, ctx| Box::pin(handler(method, params, ctx)));

        let id = self.next_disposal_id.fetch_add(1, Ordering::SeqCst);
        self.unknown_notification_handlers
            .lock()
            .expect("unknown-notification handler list poisoned")
            .push((id, erased));

        let this = Arc::clone(self);
        Disposer::new(move || {
            this.unknown_notification_handlers
                .lock()
                .expect("unknown-notification handler list poisoned")
                .retain(|(hid, _)| *hid != id);
        })
    }

    /// Starts the channel: installs its dispatcher on the underlying [`Channel`]. A
    /// second call fails with [`TypedChannelError::AlreadyStarted`].
    pub fn start(self: &Arc<Self>) -> Result<(), TypedChannelError> {
        if self
            .started_flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TypedChannelError::AlreadyStarted);
        }

        *self.state.lock().expect("state poisoned") = TypedChannelState::Listening;
        self.started.notify_waiters();

        let dispatcher: Arc<dyn RequestHandler> = Arc::new(TypedDispatcher { channel: Arc::clone(self) });
        self.channel
            .install_handler(dispatcher)
            .map_err(TypedChannelError::Channel)?;
        Ok(())
    }

    /// Issues a typed request and awaits the typed response (spec §4.6).
    pub async fn request<P, R, E>(
        &self,
        descriptor: &RequestType<P, R, E>,
        params: P,
        _ctx: Cout,
    ) -> Result<OptionalResult<R>, TypedRequestError<E>>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        if !self.started_flag.load(Ordering::SeqCst) {
            let err = TypedRequestError {
                code: codes::INTERNAL_ERROR,
                message: "typed channel must be started before sending requests".to_string(),
                data: None,
            };
            emit_request_error(&descriptor.method, err.code, &err.message);
            return Err(err);
        }

        let raw_params = apply_ignore_unexpected_properties(
            descriptor.params.serialize(&params),
            self.options.ignore_unexpected_properties_in_responses,
        );
        let params_for_send = match raw_params {
            Value::Null => None,
            other => Some(other),
        };

        let outcome = match self.channel.request(&descriptor.method, params_for_send).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = TypedRequestError {
                    code: codes::INTERNAL_ERROR,
                    message: err.to_string(),
                    data: None,
                };
                emit_request_error(&descriptor.method, err.code, &err.message);
                return Err(err);
            }
        };

        match outcome {
            Ok(raw_result) => match descriptor.result.deserialize(raw_result) {
                Ok(result) => Ok(OptionalResult::Ok(result)),
                Err(err) => {
                    let err = TypedRequestError {
                        code: codes::INTERNAL_ERROR,
                        message: err.0,
                        data: None,
                    };
                    emit_request_error(&descriptor.method, err.code, &err.message);
                    Err(err)
                }
            },
            Err(ChannelError::Rpc(error)) => {
                if descriptor.optional && error.code == codes::METHOD_NOT_FOUND {
                    return Ok(OptionalResult::MethodNotFound);
                }
                let data = match error.data {
                    Some(raw) => descriptor.error.deserialize(raw).ok(),
                    None => None,
                };
                emit_request_error(&descriptor.method, error.code, &error.message);
                Err(TypedRequestError { code: error.code, message: error.message, data })
            }
            Err(other) => {
                let err = TypedRequestError {
                    code: codes::INTERNAL_ERROR,
                    message: other.to_string(),
                    data: None,
                };
                emit_request_error(&descriptor.method, err.code, &err.message);
                Err(err)
            }
        }
    }

    /// Sends a typed notification (spec §4.6).
    pub async fn notify<P>(
        &self,
        descriptor: &NotificationType<P>,
        params: P,
        _ctx: Cout,
    ) -> Result<(), ChannelError>
    where
        P: Send + 'static,
    {
        if !self.started_flag.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed(
                "typed channel must be started before sending notifications".to_string(),
            ));
        }

        let raw_params = apply_ignore_unexpected_properties(
            descriptor.params.serialize(&params),
            self.options.ignore_unexpected_properties_in_responses,
        );
        let params_for_send = match raw_params {
            Value::Null => None,
            other => Some(other),
        };
        self.channel.notify(&descriptor.method, params_for_send).await
    }

    /// Lists the methods currently registered in the dispatch table, for the reflection
    /// contract (spec §4.9).
    pub(crate) fn registered_methods(&self) -> Vec<(String, crate::descriptor::MethodKind)> {
        self.registered_method_details()
            .into_iter()
            .map(|d| (d.method, d.kind))
            .collect()
    }

    /// Lists the methods currently registered, with each descriptor's params/result/error
    /// type names, for `reflector/v1/list-registered-request-and-notification-types`
    /// (spec §4.8).
    pub(crate) fn registered_method_details(&self) -> Vec<RegisteredMethodDetail> {
        self.dispatch
            .lock()
            .expect("dispatch table poisoned")
            .iter()
            .map(|(method, entry)| match entry {
                Entry::Request(_, types) => RegisteredMethodDetail {
                    method: method.clone(),
                    kind: crate::descriptor::MethodKind::Request,
                    params_type: types.params,
                    result_type: types.result,
                    error_type: types.error,
                },
                Entry::Notification(_, types) => RegisteredMethodDetail {
                    method: method.clone(),
                    kind: crate::descriptor::MethodKind::Notification,
                    params_type: types.params,
                    result_type: types.result,
                    error_type: types.error,
                },
            })
            .collect()
    }
}

/// One entry of [`TypedChannel::registered_method_details`].
pub(crate) struct RegisteredMethodDetail {
    pub method: String,
    pub kind: crate::descriptor::MethodKind,
    pub params_type: &'static str,
    pub result_type: Option<&'static str>,
    pub error_type: Option<&'static str>,
}

/// Fires the "request did error" observability event (spec §4.6, §7) for every error a
/// caller's typed request resolves to.
fn emit_request_error(method: &str, code: i64, message: &str) {
    tracing::event!(
        target: "typed_rpc::request_error",
        tracing::Level::DEBUG,
        method,
        code,
        error_message = message,
    );
}

fn apply_ignore_unexpected_properties(value: Value, enabled: bool) -> Value {
    if !enabled {
        return value;
    }
    match value {
        Value::Object(mut map) => {
            map.insert(IGNORE_UNEXPECTED_PROPERTIES_KEY.to_string(), Value::Bool(true));
            Value::Object(map)
        }
        other => other,
    }
}

/// Context remapping (spec §4.6): wraps a `TypedChannel<Cin, Cout>` so application code
/// can work in terms of a different receive/send-context pair, converting at the
/// boundary with user-supplied functions. Registrations forward to the inner channel by
/// applying `from_inner` to the context it produces before calling the caller's handler;
/// outbound calls apply `to_inner` to the caller's context before delegating.
pub struct ContextMap<Cin, Cout, Cin2, Cout2> {
    inner: Arc<TypedChannel<Cin, Cout>>,
    to_inner: Arc<dyn Fn(Cout2) -> Cout + Send + Sync>,
    from_inner: Arc<dyn Fn(Cin) -> Cin2 + Send + Sync>,
}

impl<Cin, Cout, Cin2, Cout2> ContextMap<Cin, Cout, Cin2, Cout2>
where
    Cin: Clone + Send + Sync + 'static,
    Cout: Send + Sync + 'static,
    Cin2: Clone + Send + Sync + 'static,
    Cout2: Send + Sync + 'static,
{
    pub fn new(
        inner: Arc<TypedChannel<Cin, Cout>>,
        to_inner: Arc<dyn Fn(Cout2) -> Cout + Send + Sync>,
        from_inner: Arc<dyn Fn(Cin) -> Cin2 + Send + Sync>,
    ) -> Self {
        Self { inner, to_inner, from_inner }
    }

    pub fn register_request<P, R, E, F, Fut>(
        &self,
        descriptor: &RequestType<P, R, E>,
        handler: F,
    ) -> Result<Disposer, TypedChannelError>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(P, RequestId, Cin2) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, DomainError>> + Send + 'static,
    {
        let from_inner = Arc::clone(&self.from_inner);
        self.inner
            .register_request(descriptor, move |params, id, ctx| handler(params, id, from_inner(ctx)))
    }

    pub fn register_notification<P, F, Fut>(
        &self,
        descriptor: &NotificationType<P>,
        handler: F,
    ) -> Result<Disposer, TypedChannelError>
    where
        P: Send + 'static,
        F: Fn(P, Cin2) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let from_inner = Arc::clone(&self.from_inner);
        self.inner
            .register_notification(descriptor, move |params, ctx| handler(params, from_inner(ctx)))
    }

    pub async fn request<P, R, E>(
        &self,
        descriptor: &RequestType<P, R, E>,
        params: P,
        ctx: Cout2,
    ) -> Result<OptionalResult<R>, TypedRequestError<E>>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        self.inner.request(descriptor, params, (self.to_inner)(ctx)).await
    }

    pub async fn notify<P>(&self, descriptor: &NotificationType<P>, params: P, ctx: Cout2) -> Result<(), ChannelError>
    where
        P: Send + 'static,
    {
        self.inner.notify(descriptor, params, (self.to_inner)(ctx)).await
    }

    pub fn start(&self) -> Result<(), TypedChannelError> {
        self.inner.start()
    }
}

struct TypedDispatcher<Cin, Cout> {
    channel: Arc<TypedChannel<Cin, Cout>>,
}

#[async_trait::async_trait]
impl<Cin, Cout> RequestHandler for TypedDispatcher<Cin, Cout>
where
    Cin: Clone + Send + Sync + 'static,
    Cout: Send + Sync + 'static,
{
    async fn handle_request(&self, method: &str, params: Option<Value>, id: &RequestId) -> RequestOutcome {
        let entry = {
            let dispatch = self.channel.dispatch.lock().expect("dispatch table poisoned");
            match dispatch.get(method) {
                Some(Entry::Request(handler, _)) => Ok(Some(Arc::clone(handler))),
                Some(Entry::Notification(..)) => Err(()),
                None => Ok(None),
            }
        };

        let handler = match entry {
            Err(()) => {
                return RequestOutcome::Error(ErrorObject::invalid_request(format!(
                    "{method:?} is registered as a notification method, not a request method"
                )));
            }
            Ok(None) => return RequestOutcome::Error(ErrorObject::method_not_found(method)),
            Ok(Some(handler)) => handler,
        };

        let ctx = (self.channel.context_factory)();
        let id_for_handler = id.clone();
        let join = tokio::spawn(async move { handler(params, id_for_handler, ctx).await });

        match join.await {
            Ok(Ok(value)) => RequestOutcome::Result(value),
            Ok(Err(DispatchFailure::InvalidParams(detail))) => {
                RequestOutcome::Error(ErrorObject::invalid_params(detail))
            }
            Ok(Err(DispatchFailure::Domain { code, message, data })) => {
                let mut error = ErrorObject::new(code, message);
                if let Some(data) = data {
                    error = error.with_data(data);
                }
                RequestOutcome::Error(error)
            }
            Err(join_err) => {
                warn!(error = %join_err, %method, "request handler task failed unexpectedly");
                let detail = if self.channel.options.send_exception_details {
                    join_err.to_string()
                } else {
                    "An unexpected error occurred".to_string()
                };
                RequestOutcome::Error(ErrorObject::unexpected_server_error(detail))
            }
        }
    }

    async fn handle_notification(&self, method: &str, params: Option<Value>) {
        let handlers = {
            let dispatch = self.channel.dispatch.lock().expect("dispatch table poisoned");
            match dispatch.get(method) {
                Some(Entry::Notification(handlers, _)) => Some(handlers.clone()),
                _ => None,
            }
        };

        let Some(handlers) = handlers else {
            let unknown_handlers = self
                .channel
                .unknown_notification_handlers
                .lock()
                .expect("unknown-notification handler list poisoned")
                .clone();

            if unknown_handlers.is_empty() {
                debug!(%method, "no notification handler installed; dropping");
                return;
            }

            for (_, handler) in unknown_handlers {
                let ctx = (self.channel.context_factory)();
                let owned_method = method.to_string();
                let params = params.clone();
                let join = tokio::spawn(async move {
                    handler(owned_method, params, ctx).await;
                });
                if let Err(join_err) = join.await {
                    warn!(error = %join_err, %method, "unknown-notification handler task failed unexpectedly");
                }
            }
            return;
        };

        for (_, handler) in handlers {
            let ctx = (self.channel.context_factory)();
            let params = params.clone();
            let join = tokio::spawn(async move {
                handler(params, ctx).await;
            });
            if let Err(join_err) = join.await {
                warn!(error = %join_err, %method, "notification handler task failed unexpectedly");
            }
        }
    }
}
