//! Method descriptors (spec §2.5, §6).
//!
//! A descriptor is an immutable record naming a method, its kind (request or
//! notification), and the serializers used for its params/result/error. Descriptors are
//! shared (`Arc`) immutable values referenced from a [`crate::typed::TypedChannel`]'s
//! dispatch table and from a [`crate::contract::Contract`]'s descriptor maps.

use crate::serializer::{EmptyObjectSerializer, Serializer, VoidSerializer};
use std::sync::Arc;

/// Whether a method is a request (expects a response) or a notification (one-way).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Request,
    Notification,
}

/// A request method descriptor: method name, params/result/error serializers, and
/// whether the method is optional (spec §4.6 "optional request variant").
pub struct RequestType<P, R, E> {
    pub method: String,
    pub params: Arc<dyn Serializer<P>>,
    pub result: Arc<dyn Serializer<R>>,
    pub error: Arc<dyn Serializer<E>>,
    pub optional: bool,
    /// `std::any::type_name` of `P`/`R`/`E`, reported by the reflection contract's
    /// `list-registered-request-and-notification-types` (spec §4.8 `paramsType`/
    /// `resultType`/`errorType`). Not meant for (de)serialization, only description.
    pub(crate) params_type: &'static str,
    pub(crate) result_type: &'static str,
    pub(crate) error_type: &'static str,
}

impl<P, R, E> Clone for RequestType<P, R, E> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            params: self.params.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            optional: self.optional,
            params_type: self.params_type,
            result_type: self.result_type,
            error_type: self.error_type,
        }
    }
}

impl<P, R, E> RequestType<P, R, E> {
    pub fn kind(&self) -> MethodKind {
        MethodKind::Request
    }

    /// Returns a clone of this descriptor marked optional (spec §4.6).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Returns a clone of this descriptor with `method` substituted — used by
    /// [`crate::contract::Contract`] to fill in a descriptor's method name from the map
    /// key it was registered under (spec §4.7 "descriptors may omit a method name").
    pub fn with_method(&self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: self.params.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            optional: self.optional,
            params_type: self.params_type,
            result_type: self.result_type,
            error_type: self.error_type,
        }
    }
}

/// A notification method descriptor: method name and params serializer.
pub struct NotificationType<P> {
    pub method: String,
    pub params: Arc<dyn Serializer<P>>,
    pub(crate) params_type: &'static str,
}

impl<P> Clone for NotificationType<P> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            params: self.params.clone(),
            params_type: self.params_type,
        }
    }
}

impl<P> NotificationType<P> {
    pub fn kind(&self) -> MethodKind {
        MethodKind::Notification
    }

    pub fn with_method(&self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: self.params.clone(),
            params_type: self.params_type,
        }
    }
}

/// Builds a [`RequestType`] whose params/result/error default to the empty-object and
/// void↔null serializers (spec §6: "default serializers are empty-object for params and
/// void↔null for result/error").
pub fn request_type<P, R, E>(method: impl Into<String>) -> RequestType<P, R, E>
where
    EmptyObjectSerializer: Serializer<P>,
    VoidSerializer: Serializer<R>,
    VoidSerializer: Serializer<E>,
{
    RequestType {
        method: method.into(),
        params: Arc::new(EmptyObjectSerializer),
        result: Arc::new(VoidSerializer),
        error: Arc::new(VoidSerializer),
        optional: false,
        params_type: std::any::type_name::<P>(),
        result_type: std::any::type_name::<R>(),
        error_type: std::any::type_name::<E>(),
    }
}

/// Builds a [`RequestType`] from explicit serializers, for params/result/error types
/// that aren't `()`.
pub fn request_type_with<P, R, E>(
    method: impl Into<String>,
    params: Arc<dyn Serializer<P>>,
    result: Arc<dyn Serializer<R>>,
    error: Arc<dyn Serializer<E>>,
) -> RequestType<P, R, E> {
    RequestType {
        method: method.into(),
        params,
        result,
        error,
        optional: false,
        params_type: std::any::type_name::<P>(),
        result_type: std::any::type_name::<R>(),
        error_type: std::any::type_name::<E>(),
    }
}

/// Builds a [`NotificationType`] whose params default to the empty-object serializer.
pub fn notification_type<P>(method: impl Into<String>) -> NotificationType<P>
where
    EmptyObjectSerializer: Serializer<P>,
{
    NotificationType {
        method: method.into(),
        params: Arc::new(EmptyObjectSerializer),
        params_type: std::any::type_name::<P>(),
    }
}

/// Builds a [`NotificationType`] from an explicit params serializer.
pub fn notification_type_with<P>(
    method: impl Into<String>,
    params: Arc<dyn Serializer<P>>,
) -> NotificationType<P> {
    NotificationType { method: method.into(), params, params_type: std::any::type_name::<P>() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::SerdeSerializer;

    #[test]
    fn optional_marks_descriptor() {
        let d: RequestType<(), (), ()> = request_type("demo/method");
        assert!(!d.optional);
        let d = d.optional();
        assert!(d.optional);
    }

    #[test]
    fn with_method_renames_without_touching_serializers() {
        let d: RequestType<(), (), ()> = request_type("placeholder");
        let d2 = d.with_method("server.calculate");
        assert_eq!(d2.method, "server.calculate");
    }

    #[test]
    fn request_type_with_uses_explicit_serde_serializer() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Params {
            name: String,
        }
        let d = request_type_with::<Params, String, String>(
            "server.calculate",
            Arc::new(SerdeSerializer),
            Arc::new(SerdeSerializer),
            Arc::new(SerdeSerializer),
        );
        assert_eq!(d.method, "server.calculate");
    }
}
