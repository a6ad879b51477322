//! Pluggable serializer interface (spec §4.4).
//!
//! A serializer converts between an application value of type `T` and a JSON value,
//! reporting deserialization failures with a short message rather than panicking. The
//! crate ships three built-in helpers; schema-validation libraries are expected to
//! provide their own `Serializer<T>` impls, discoverable through the [`MapperRegistry`]
//! for callers that want to resolve a serializer from an arbitrary schema descriptor at
//! runtime (e.g. a `serde_json::Value`-based JSON Schema, or a third-party validator).

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// Error produced when a JSON value cannot be deserialized into the target type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("deserialization failed: {0}")]
pub struct SerializerError(pub String);

/// Converts between `T` and JSON. Implementations must be able to round-trip any value
/// they produced themselves (`deserialize(serialize(x)) == x`).
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Value;
    fn deserialize(&self, value: Value) -> Result<T, SerializerError>;
}

/// Identity serializer: `T = serde_json::Value`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnySerializer;

impl Serializer<Value> for AnySerializer {
    fn serialize(&self, value: &Value) -> Value {
        value.clone()
    }

    fn deserialize(&self, value: Value) -> Result<Value, SerializerError> {
        Ok(value)
    }
}

/// Accepts any JSON on the wire and yields `()`; serializes `()` to `{}`. Used as the
/// default params serializer for descriptors that declare no params type.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyObjectSerializer;

impl Serializer<()> for EmptyObjectSerializer {
    fn serialize(&self, _value: &()) -> Value {
        Value::Object(Default::default())
    }

    fn deserialize(&self, _value: Value) -> Result<(), SerializerError> {
        Ok(())
    }
}

/// `()` on the Rust side maps to JSON `null` on the wire. Used as the default
/// result/error serializer for descriptors that declare no result/error type.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoidSerializer;

impl Serializer<()> for VoidSerializer {
    fn serialize(&self, _value: &()) -> Value {
        Value::Null
    }

    fn deserialize(&self, value: Value) -> Result<(), SerializerError> {
        match value {
            Value::Null => Ok(()),
            other => Err(SerializerError(format!(
                "expected null for void result, got {other}"
            ))),
        }
    }
}

/// A `serde`-derived serializer for any type implementing [`Serialize`] +
/// [`DeserializeOwned`]. This is the serializer most application descriptors use; it is
/// the "serializer" mapper referenced by [`MapperRegistry`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SerdeSerializer;

impl<T: Serialize + DeserializeOwned + Send + Sync> Serializer<T> for SerdeSerializer {
    fn serialize(&self, value: &T) -> Value {
        serde_json::to_value(value).expect("T: Serialize must not fail for a well-formed value")
    }

    fn deserialize(&self, value: Value) -> Result<T, SerializerError> {
        serde_json::from_value(value).map_err(|err| SerializerError(err.to_string()))
    }
}

/// A type-erased schema descriptor an application might hand to [`MapperRegistry::resolve`].
///
/// Real applications typically pass something like a `schemars::SchemaObject` or a
/// third-party validator's descriptor type; the registry treats it opaquely.
pub type SchemaDescriptor = dyn Any + Send + Sync;

/// A named strategy for turning a [`SchemaDescriptor`] into type-erased serialize/deserialize
/// closures. Mappers are tried in registration order; the first to recognize the
/// descriptor wins.
pub trait Mapper: Send + Sync {
    fn name(&self) -> &str;

    /// Attempts to resolve `descriptor` into serialize/deserialize closures operating on
    /// `serde_json::Value`. Returns `None` if this mapper does not recognize the
    /// descriptor's concrete type.
    fn try_resolve(&self, descriptor: &SchemaDescriptor) -> Option<ErasedSerializer>;
}

/// A serializer over `serde_json::Value`, produced by a [`Mapper`].
#[derive(Clone)]
pub struct ErasedSerializer {
    pub mapper_name: &'static str,
    pub serialize: std::sync::Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    pub deserialize: std::sync::Arc<dyn Fn(Value) -> Result<Value, SerializerError> + Send + Sync>,
}

impl fmt::Debug for ErasedSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedSerializer")
            .field("mapper_name", &self.mapper_name)
            .finish()
    }
}

/// The built-in "identity" mapper: recognizes a descriptor that already *is* an
/// `ErasedSerializer` and returns it unchanged.
struct IdentityMapper;

impl Mapper for IdentityMapper {
    fn name(&self) -> &str {
        "serializer"
    }

    fn try_resolve(&self, descriptor: &SchemaDescriptor) -> Option<ErasedSerializer> {
        descriptor.downcast_ref::<ErasedSerializer>().cloned()
    }
}

/// Process-wide registry of named [`Mapper`]s, consulted by [`convert_serializer`].
///
/// Frozen-after-init in spirit: mappers are typically registered once at startup, then
/// only read from. A `Mutex` guards the registration list for thread safety during that
/// startup window, matching the spec's "configuration surface with a register-mapper
/// entry point" design note.
pub struct MapperRegistry {
    mappers: Mutex<Vec<Box<dyn Mapper>>>,
}

impl MapperRegistry {
    fn new() -> Self {
        Self {
            mappers: Mutex::new(vec![Box::new(IdentityMapper)]),
        }
    }

    pub fn global() -> &'static MapperRegistry {
        static REGISTRY: OnceLock<MapperRegistry> = OnceLock::new();
        REGISTRY.get_or_init(MapperRegistry::new)
    }

    /// Registers an additional mapper. Applications call this to teach the registry
    /// about a third-party schema/validation library.
    pub fn register(&self, mapper: Box<dyn Mapper>) {
        self.mappers.lock().expect("mapper registry poisoned").push(mapper);
    }

    /// Iterates the installed mappers in registration order and returns the first
    /// non-`None` resolution.
    pub fn resolve(&self, descriptor: &SchemaDescriptor) -> Option<ErasedSerializer> {
        let mappers = self.mappers.lock().expect("mapper registry poisoned");
        mappers.iter().find_map(|mapper| mapper.try_resolve(descriptor))
    }
}

/// Convenience wrapper over [`MapperRegistry::global`].
pub fn convert_serializer(descriptor: &SchemaDescriptor) -> Option<ErasedSerializer> {
    MapperRegistry::global().resolve(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_serializer_round_trips() {
        let s = VoidSerializer;
        assert_eq!(s.serialize(&()), Value::Null);
        assert_eq!(s.deserialize(Value::Null).unwrap(), ());
        assert!(s.deserialize(Value::Bool(true)).is_err());
    }

    #[test]
    fn empty_object_serializer_accepts_anything() {
        let s = EmptyObjectSerializer;
        assert_eq!(s.serialize(&()), serde_json::json!({}));
        assert!(s.deserialize(serde_json::json!({"unexpected": 1})).is_ok());
        assert!(s.deserialize(Value::Null).is_ok());
    }

    #[test]
    fn any_serializer_is_identity() {
        let s = AnySerializer;
        let v = serde_json::json!({"a": 1});
        assert_eq!(s.serialize(&v), v);
    }

    #[test]
    fn serde_serializer_round_trips_structs() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Params {
            name: String,
        }
        let s = SerdeSerializer;
        let p = Params { name: "foo".into() };
        let json = Serializer::<Params>::serialize(&s, &p);
        let back: Params = Serializer::<Params>::deserialize(&s, json).unwrap();
        assert_eq!(p, back);
    }
}
