//! The optional, dogfooded reflection contract (spec §4.9): lets a peer ask what
//! protocol versions and methods the other side supports, without requiring advance
//! agreement on anything but these two method names.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::descriptor::{request_type_with, MethodKind, RequestType};
use crate::error::TypedChannelError;
use crate::serializer::SerdeSerializer;
use crate::typed::{Disposer, TypedChannel};

/// The reflection protocol versions this crate implements. Always includes `1` (spec
/// §4.8).
pub const SUPPORTED_VERSIONS: &[i64] = &[1];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedVersions {
    pub versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredMethod {
    pub method: String,
    pub kind: RegisteredMethodKind,
    /// `std::any::type_name` of the registered params type.
    pub params_type: String,
    /// Present only for request methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    /// Present only for request methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisteredMethodKind {
    Request,
    Notification,
}

impl From<MethodKind> for RegisteredMethodKind {
    fn from(kind: MethodKind) -> Self {
        match kind {
            MethodKind::Request => RegisteredMethodKind::Request,
            MethodKind::Notification => RegisteredMethodKind::Notification,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRegisteredTypesResult {
    pub methods: Vec<RegisteredMethod>,
}

/// Descriptor for `reflector/supported-versions`: takes no params, returns the
/// versions this side implements.
pub fn supported_versions_descriptor() -> RequestType<(), SupportedVersions, ()> {
    request_type_with(
        "reflector/supported-versions",
        Arc::new(crate::serializer::EmptyObjectSerializer),
        Arc::new(SerdeSerializer),
        Arc::new(crate::serializer::VoidSerializer),
    )
}

/// Descriptor for `reflector/v1/list-registered-request-and-notification-types`: takes
/// no params, returns every method registered on the responding side's dispatch table.
pub fn list_registered_types_descriptor() -> RequestType<(), ListRegisteredTypesResult, ()> {
    request_type_with(
        "reflector/v1/list-registered-request-and-notification-types",
        Arc::new(crate::serializer::EmptyObjectSerializer),
        Arc::new(SerdeSerializer),
        Arc::new(crate::serializer::VoidSerializer),
    )
}

/// Installs both reflection request handlers on `channel`. Call before
/// [`TypedChannel::start`], alongside an application's own `register_request` calls.
pub fn install<Cin, Cout>(channel: &Arc<TypedChannel<Cin, Cout>>) -> Result<Disposer, TypedChannelError>
where
    Cin: Clone + Send + Sync + 'static,
    Cout: Send + Sync + 'static,
{
    let versions_disposer = channel.register_request(&supported_versions_descriptor(), |_params, _id, _ctx| async move {
        Ok(SupportedVersions { versions: SUPPORTED_VERSIONS.to_vec() })
    })?;

    let channel_for_list = Arc::clone(channel);
    let list_disposer = channel.register_request(&list_registered_types_descriptor(), move |_params, _id, _ctx| {
        let channel = Arc::clone(&channel_for_list);
        async move {
            let methods = channel
                .registered_method_details()
                .into_iter()
                .map(|d| RegisteredMethod {
                    method: d.method,
                    kind: d.kind.into(),
                    params_type: d.params_type.to_string(),
                    result_type: d.result_type.map(str::to_string),
                    error_type: d.error_type.map(str::to_string),
                })
                .collect();
            Ok(ListRegisteredTypesResult { methods })
        }
    })?;

    Ok(Disposer::aggregate(vec![versions_disposer, list_disposer]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::testing::duplex_pair;

    #[tokio::test]
    async fn reports_supported_versions_and_registered_methods() {
        let (a, b) = duplex_pair();
        let server = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
        let demo = request_type_with::<(), (), ()>(
            "demo/ping",
            Arc::new(crate::serializer::EmptyObjectSerializer),
            Arc::new(crate::serializer::VoidSerializer),
            Arc::new(crate::serializer::VoidSerializer),
        );
        server.register_request(&demo, |_p, _id, _ctx| async move { Ok(()) }).unwrap();
        install(&server).unwrap();
        server.start().unwrap();

        let client = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
        client.start().unwrap();

        let versions = client
            .request(&supported_versions_descriptor(), (), ())
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(versions.versions, vec![1]);

        let listed = client
            .request(&list_registered_types_descriptor(), (), ())
            .await
            .unwrap()
            .into_option()
            .unwrap();
        let methods: Vec<_> = listed.methods.iter().map(|m| m.method.as_str()).collect();
        assert!(methods.contains(&"demo/ping"));
        assert!(methods.contains(&"reflector/supported-versions"));
    }
}
