//! Error types shared across the crate's layers (spec §7).
//!
//! Each layer gets its own `thiserror`-derived enum, one variant per failure mode,
//! mirroring the codex crate's `McpError`. [`RequestHandlingError`] is the structured
//! error a caller observes for both domain errors and unexpected-server errors — the
//! crate exposes it as a concrete type rather than a runtime-branded "looks like an
//! error" object, per spec §9's design note on structural wrapped-error tagging.

use crate::message::ErrorObject;
use serde_json::Value;

/// The error a caller's outbound request future resolves to when the peer responds
/// with an error, when the response is malformed, or when the local transport fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RequestHandlingError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RequestHandlingError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn from_error_object(error: ErrorObject) -> Self {
        Self {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }

    pub fn into_error_object(self) -> ErrorObject {
        ErrorObject {
            code: self.code,
            message: self.message,
            data: self.data,
        }
    }
}

/// A domain error a request handler returns to signal application-level failure,
/// distinct from raising an unexpected exception (spec §4.6 step 4/5).
#[derive(Debug, Clone, Default)]
pub struct DomainError {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl DomainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub(crate) fn into_error_object(self) -> ErrorObject {
        ErrorObject {
            code: self
                .code
                .unwrap_or(crate::message::codes::GENERIC_APPLICATION_ERROR),
            message: self.message.unwrap_or_else(|| "An error was returned".to_string()),
            data: self.data,
        }
    }
}

/// A request handler's outcome: a success value, a domain error, or (via `Err` at the
/// call site raising) an unexpected exception. Spec §9's "structural wrapped-error
/// tagging" design note: this sum type replaces the runtime-branded wrapper object the
/// TypeScript source used.
pub type HandlerResult<T> = Result<T, DomainError>;

/// Errors from the stream-based [`crate::channel::Channel`] layer. This layer does not
/// interpret error *meaning* (that's the typed channel's job via descriptor error
/// serializers) — it only reports transport/protocol-level failures and hands back the
/// raw peer [`ErrorObject`] when one arrives.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("transport send failed: {0}")]
    SendFailed(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("response contained neither result nor error")]
    ProtocolViolation,
    #[error("peer returned error {0}")]
    Rpc(ErrorObject),
}

/// Errors from the [`crate::typed::TypedChannel`] layer.
#[derive(Debug, thiserror::Error)]
pub enum TypedChannelError {
    #[error("typed channel already started")]
    AlreadyStarted,
    #[error("typed channel must be started before use")]
    NotStarted,
    #[error("a request handler is already registered for method {0:?}")]
    DuplicateRequestHandler(String),
    #[error("method {0:?} is already registered as a request method")]
    ConflictingNotificationRegistration(String),
    #[error(transparent)]
    Request(#[from] RequestHandlingError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("failed to serialize outgoing params/result: {0}")]
    Serialization(String),
}

/// Errors from the [`crate::contract::Contract`] composition layer.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("no handler supplied for required request method {0:?}")]
    MissingRequestHandler(String),
    #[error(transparent)]
    Typed(#[from] TypedChannelError),
}
