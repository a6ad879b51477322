//! The contract runtime (spec §4.7): names a pair of method sets — what one role must
//! handle, and what its peer exposes — and binds them to a [`TypedChannel`], validating
//! that every declared request method got a handler and deriving a call-proxy for the
//! other side.
//!
//! Grounded on the codex crate's `McpClient`, which pairs a fixed set of request/
//! notification descriptors with a single `JsonRpcTransport`; generalized here so either
//! peer in a connection can play either role, and a contract is declared once and shared
//! by both. Rust's static typing has no equivalent of the original JS source's
//! dynamically-named proxy object (spec §9 redesign note): instead of synthesizing a
//! method per descriptor at runtime, [`Counterpart`] exposes one generic `request`/
//! `notify` pair, and callers invoke it with the same [`RequestType`]/[`NotificationType`]
//! value used to declare the peer's side of the contract.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::channel::Channel;
use crate::descriptor::{MethodKind, NotificationType, RequestType};
use crate::error::{ContractError, DomainError};
use crate::message::RequestId;
use crate::typed::{Disposer, OptionalResult, TypedChannel, TypedChannelError, TypedChannelOptions, TypedRequestError};

/// Builds a [`DomainError`] from a message, handed to contract-registered handlers so
/// they can construct a domain-error wrapper without naming `DomainError` directly (spec
/// §4.7: "a factory for constructing a domain-error wrapper").
pub type DomainErrorFactory = Arc<dyn Fn(String) -> DomainError + Send + Sync>;

fn domain_error_factory() -> DomainErrorFactory {
    Arc::new(|message: String| DomainError::new(message))
}

/// Which role's descriptor set a [`Contract`] operation is addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

/// A named, optionally-tagged interface declaration: the method names and kinds a
/// server side exposes, and the ones a client side exposes (spec §4.7).
#[derive(Debug, Clone, Default)]
pub struct Contract {
    pub name: String,
    pub tags: Vec<String>,
    server: HashMap<String, MethodKind>,
    client: HashMap<String, MethodKind>,
}

impl Contract {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn server_request<P, R, E>(mut self, descriptor: &RequestType<P, R, E>) -> Self {
        self.server.insert(descriptor.method.clone(), MethodKind::Request);
        self
    }

    pub fn server_notification<P>(mut self, descriptor: &NotificationType<P>) -> Self {
        self.server.insert(descriptor.method.clone(), MethodKind::Notification);
        self
    }

    pub fn client_request<P, R, E>(mut self, descriptor: &RequestType<P, R, E>) -> Self {
        self.client.insert(descriptor.method.clone(), MethodKind::Request);
        self
    }

    pub fn client_notification<P>(mut self, descriptor: &NotificationType<P>) -> Self {
        self.client.insert(descriptor.method.clone(), MethodKind::Notification);
        self
    }

    fn descriptors(&self, side: Side) -> &HashMap<String, MethodKind> {
        match side {
            Side::Server => &self.server,
            Side::Client => &self.client,
        }
    }

    /// Checks that every request method declared on `side` has a handler registered on
    /// `channel` (spec §4.7: "a required method with no installed handler is a hard
    /// error"). Notification methods are never required.
    pub fn verify_installed<Cin, Cout>(
        &self,
        side: Side,
        channel: &TypedChannel<Cin, Cout>,
    ) -> Result<(), ContractError>
    where
        Cin: Clone + Send + Sync + 'static,
        Cout: Send + Sync + 'static,
    {
        let registered: HashMap<String, MethodKind> = channel.registered_methods().into_iter().collect();
        for (method, kind) in self.descriptors(side) {
            if *kind == MethodKind::Request && !registered.contains_key(method) {
                return Err(ContractError::MissingRequestHandler(method.clone()));
            }
        }
        Ok(())
    }

    /// This role is the client: the caller registers client-side handlers directly on
    /// `channel` beforehand (see [`TypedChannel::register_request`]/`register_notification`),
    /// then calls this to validate them, start the channel, and obtain a proxy for the
    /// server's methods.
    pub fn get_server<Cin, Cout>(
        &self,
        channel: &Arc<TypedChannel<Cin, Cout>>,
    ) -> Result<Counterpart<Cin, Cout>, ContractError>
    where
        Cin: Clone + Send + Sync + 'static,
        Cout: Send + Sync + 'static,
    {
        self.verify_installed(Side::Client, channel)?;
        channel.start().map_err(ContractError::Typed)?;
        Ok(Counterpart::new(Arc::clone(channel)))
    }

    /// This role is the server: the caller registers server-side handlers directly on
    /// `channel` beforehand, then calls this to validate them, start the channel, and
    /// obtain a proxy for the client's methods.
    pub fn register_server<Cin, Cout>(
        &self,
        channel: &Arc<TypedChannel<Cin, Cout>>,
    ) -> Result<Counterpart<Cin, Cout>, ContractError>
    where
        Cin: Clone + Send + Sync + 'static,
        Cout: Send + Sync + 'static,
    {
        self.verify_installed(Side::Server, channel)?;
        channel.start().map_err(ContractError::Typed)?;
        Ok(Counterpart::new(Arc::clone(channel)))
    }

    /// Convenience: builds a `Channel`/`TypedChannel` pair over `transport`, runs
    /// `install_handlers` to register this role's (client-side) handlers, starts the
    /// channel, and returns both the proxy for the peer's methods and the channel itself
    /// (spec §4.7: "create a typed channel from the transport, register the handlers,
    /// start the channel, and return both the proxy and the channel").
    pub fn get_server_over<Cin, Cout>(
        &self,
        transport: Arc<dyn crate::transport::Transport>,
        context_factory: Arc<dyn Fn() -> Cin + Send + Sync>,
        options: TypedChannelOptions,
        install_handlers: impl FnOnce(&Arc<TypedChannel<Cin, Cout>>) -> Result<(), TypedChannelError>,
    ) -> Result<(Counterpart<Cin, Cout>, Arc<TypedChannel<Cin, Cout>>), ContractError>
    where
        Cin: Clone + Send + Sync + 'static,
        Cout: Send + Sync + 'static,
    {
        let channel = TypedChannel::with_options(Channel::new(transport), context_factory, options);
        install_handlers(&channel).map_err(ContractError::Typed)?;
        let proxy = self.get_server(&channel)?;
        Ok((proxy, channel))
    }

    /// Convenience: builds a `Channel`/`TypedChannel` pair over `transport`, runs
    /// `install_handlers` to register this role's (server-side) handlers, starts the
    /// channel, and returns both the proxy for the peer's methods and the channel itself.
    pub fn register_server_over<Cin, Cout>(
        &self,
        transport: Arc<dyn crate::transport::Transport>,
        context_factory: Arc<dyn Fn() -> Cin + Send + Sync>,
        options: TypedChannelOptions,
        install_handlers: impl FnOnce(&Arc<TypedChannel<Cin, Cout>>) -> Result<(), TypedChannelError>,
    ) -> Result<(Counterpart<Cin, Cout>, Arc<TypedChannel<Cin, Cout>>), ContractError>
    where
        Cin: Clone + Send + Sync + 'static,
        Cout: Send + Sync + 'static,
    {
        let channel = TypedChannel::with_options(Channel::new(transport), context_factory, options);
        install_handlers(&channel).map_err(ContractError::Typed)?;
        let proxy = self.register_server(&channel)?;
        Ok((proxy, channel))
    }

    /// The method names and kinds declared on `side`, used by the reflection contract.
    pub(crate) fn descriptor_names(&self, side: Side) -> Vec<(String, MethodKind)> {
        self.descriptors(side).iter().map(|(m, k)| (m.clone(), *k)).collect()
    }

    /// Registers a request handler on `channel`, the way [`TypedChannel::register_request`]
    /// does, except the handler additionally receives a [`Counterpart`] for calling back
    /// into the peer and a [`DomainErrorFactory`] for constructing its domain error (spec
    /// §4.7: "each registered handler is wrapped so it receives ... a reference to the
    /// proxy object for the peer ... and a factory for constructing a domain-error
    /// wrapper").
    pub fn register_request<Cin, Cout, P, R, E, F, Fut>(
        &self,
        channel: &Arc<TypedChannel<Cin, Cout>>,
        descriptor: &RequestType<P, R, E>,
        handler: F,
    ) -> Result<Disposer, TypedChannelError>
    where
        Cin: Clone + Send + Sync + 'static,
        Cout: Send + Sync + 'static,
        P: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(P, RequestId, Cin, Counterpart<Cin, Cout>, DomainErrorFactory) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, DomainError>> + Send + 'static,
    {
        let counterpart = Counterpart::new(Arc::clone(channel));
        let error_factory = domain_error_factory();
        channel.register_request(descriptor, move |params, id, ctx| {
            handler(params, id, ctx, counterpart.clone(), Arc::clone(&error_factory))
        })
    }

    /// Registers a notification handler on `channel`, the way
    /// [`TypedChannel::register_notification`] does, wrapped the same way as
    /// [`Contract::register_request`].
    pub fn register_notification<Cin, Cout, P, F, Fut>(
        &self,
        channel: &Arc<TypedChannel<Cin, Cout>>,
        descriptor: &NotificationType<P>,
        handler: F,
    ) -> Result<Disposer, TypedChannelError>
    where
        Cin: Clone + Send + Sync + 'static,
        Cout: Send + Sync + 'static,
        P: Send + 'static,
        F: Fn(P, Cin, Counterpart<Cin, Cout>, DomainErrorFactory) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let counterpart = Counterpart::new(Arc::clone(channel));
        let error_factory = domain_error_factory();
        channel.register_notification(descriptor, move |params, ctx| {
            handler(params, ctx, counterpart.clone(), Arc::clone(&error_factory))
        })
    }
}

/// A thin proxy over a [`TypedChannel`] used to call the peer's declared methods.
/// Callers invoke it with the same descriptor value used to declare the peer's side of
/// the contract.
#[derive(Clone)]
pub struct Counterpart<Cin, Cout> {
    channel: Arc<TypedChannel<Cin, Cout>>,
}

impl<Cin, Cout> Counterpart<Cin, Cout>
where
    Cin: Clone + Send + Sync + 'static,
    Cout: Send + Sync + 'static,
{
    pub fn new(channel: Arc<TypedChannel<Cin, Cout>>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<TypedChannel<Cin, Cout>> {
        &self.channel
    }

    pub async fn request<P, R, E>(
        &self,
        descriptor: &RequestType<P, R, E>,
        params: P,
        ctx: Cout,
    ) -> Result<OptionalResult<R>, TypedRequestError<E>>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        self.channel.request(descriptor, params, ctx).await
    }

    pub async fn notify<P>(
        &self,
        descriptor: &NotificationType<P>,
        params: P,
        ctx: Cout,
    ) -> Result<(), crate::error::ChannelError>
    where
        P: Send + 'static,
    {
        self.channel.notify(descriptor, params, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::descriptor::{request_type_with};
    use crate::serializer::SerdeSerializer;
    use crate::testing::duplex_pair;

    fn calculate_descriptor() -> RequestType<i64, i64, String> {
        request_type_with(
            "calculate",
            Arc::new(SerdeSerializer),
            Arc::new(SerdeSerializer),
            Arc::new(SerdeSerializer),
        )
    }

    #[tokio::test]
    async fn missing_required_handler_fails_verification() {
        let (a, _b) = duplex_pair();
        let channel = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
        let descriptor = calculate_descriptor();
        let contract = Contract::new("demo").server_request(&descriptor);

        let err = contract.verify_installed(Side::Server, &channel);
        assert!(matches!(err, Err(ContractError::MissingRequestHandler(_))));
    }

    #[tokio::test]
    async fn get_server_yields_working_proxy() {
        let (a, b) = duplex_pair();
        let server_channel = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
        let descriptor = calculate_descriptor();
        server_channel
            .register_request(&descriptor, |n: i64, _id, _ctx| async move { Ok(n * 2) })
            .unwrap();
        server_channel.start().unwrap();

        let client_channel = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
        let contract = Contract::new("demo").server_request(&descriptor).client_notification(
            &crate::descriptor::notification_type_with::<()>("noop", Arc::new(crate::serializer::EmptyObjectSerializer)),
        );

        let proxy = contract.get_server(&client_channel).unwrap();
        let result = proxy.request(&descriptor, 21, ()).await.unwrap();
        assert_eq!(result, OptionalResult::Ok(42));
    }

    #[tokio::test]
    async fn registered_handler_receives_counterpart_and_error_factory() {
        use crate::descriptor::notification_type_with;
        use std::sync::Mutex;

        let (a, b) = duplex_pair();
        let server_channel = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
        let request_descriptor = calculate_descriptor();
        let ack_descriptor: NotificationType<i64> =
            notification_type_with("ack", Arc::new(SerdeSerializer));
        let contract = Contract::new("demo")
            .server_request(&request_descriptor)
            .client_notification(&ack_descriptor);

        let ack_for_handler = ack_descriptor.clone();
        contract
            .register_request(
                &server_channel,
                &request_descriptor,
                move |n: i64, _id, _ctx, counterpart, error_factory| {
                    let ack_descriptor = ack_for_handler.clone();
                    async move {
                        if n < 0 {
                            return Err(error_factory("negative input".to_string()));
                        }
                        // Back-call the peer using the injected proxy.
                        counterpart.notify(&ack_descriptor, n, ()).await.unwrap();
                        Ok(n * 2)
                    }
                },
            )
            .unwrap();
        contract.register_server(&server_channel).unwrap();

        let client_channel = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
        let acked = Arc::new(Mutex::new(Vec::new()));
        let acked_clone = Arc::clone(&acked);
        client_channel
            .register_notification(&ack_descriptor, move |n: i64, _ctx| {
                let acked = Arc::clone(&acked_clone);
                async move {
                    acked.lock().unwrap().push(n);
                }
            })
            .unwrap();

        let proxy = contract.get_server(&client_channel).unwrap();
        let result = proxy.request(&request_descriptor, 10, ()).await.unwrap();
        assert_eq!(result, OptionalResult::Ok(20));
        assert_eq!(*acked.lock().unwrap(), vec![10]);

        let err = proxy.request(&request_descriptor, -1, ()).await.unwrap_err();
        assert_eq!(err.code, crate::message::codes::GENERIC_APPLICATION_ERROR);
        assert_eq!(err.message, "negative input");
    }
}
