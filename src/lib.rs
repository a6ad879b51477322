//! A bidirectional, peer-symmetric JSON-RPC 2.0 runtime.
//!
//! Four layers, each usable on its own:
//!
//! - [`transport`]: the duplex-channel-of-JSON-values interface the rest of the crate
//!   consumes. [`testing`] ships an in-memory implementation for tests.
//! - [`channel`]: turns a transport into a request/response multiplexor with an inbound
//!   request/notification dispatcher.
//! - [`typed`]: adds a method-dispatch table, schema-driven (de)serialization via
//!   [`serializer`] and [`descriptor`], and typed request/notification calls.
//! - [`contract`]: names a pair of method sets exchanged by two peers and derives a
//!   handler-installation side and a call-proxy side from one declaration.
//!
//! [`reflection`] is an optional, dogfooded contract built on the same primitives, and
//! [`logger`] adds wire-level tracing to any transport.

pub mod channel;
pub mod contract;
pub mod descriptor;
pub mod error;
pub mod logger;
pub mod message;
pub mod reflection;
pub mod serializer;
pub mod transport;
pub mod typed;

/// An in-memory transport pair for exercising the stack without a real I/O transport.
/// Public so downstream crates can reuse it in their own tests. Gated behind the
/// `testing` feature (on by default) rather than `#[cfg(test)]` so integration tests
/// under `tests/`, which compile as a separate crate, can reach it too.
#[cfg(feature = "testing")]
pub mod testing;

pub use channel::{Channel, RequestHandler, RequestOutcome};
pub use contract::{Contract, Counterpart, DomainErrorFactory, Side};
pub use descriptor::{
    notification_type, notification_type_with, request_type, request_type_with, MethodKind,
    NotificationType, RequestType,
};
pub use error::{ChannelError, ContractError, DomainError, HandlerResult, RequestHandlingError, TypedChannelError};
pub use logger::{Logger, TracingLogger, TransportLogger};
pub use message::{codes, ErrorObject, RequestId};
pub use serializer::{AnySerializer, EmptyObjectSerializer, Serializer, SerializerError, VoidSerializer};
pub use transport::{ConnectionState, Listener, Transport, TransportError};
pub use typed::{
    ContextMap, Disposer, OptionalResult, TypedChannel, TypedChannelOptions, TypedChannelState,
    TypedRequestError,
};
