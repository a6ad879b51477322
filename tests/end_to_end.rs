//! End-to-end scenarios against a `server.calculate`/`client.progress` contract, one
//! test per scenario in spec.md §8. Unlike the per-module `#[cfg(test)]` suites, these
//! drive the crate the way an application would: build two `TypedChannel`s over an
//! in-memory duplex pair, register handlers, start, and call through.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use typed_rpc::testing::duplex_pair;
use typed_rpc::{
    codes, request_type_with, notification_type_with, Channel, Contract,
    DomainError, OptionalResult, TypedChannel,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalculateParams {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Progress {
    progress: f64,
}

fn calculate_descriptor() -> typed_rpc::RequestType<CalculateParams, String, String> {
    request_type_with(
        "server.calculate",
        Arc::new(typed_rpc::serializer::SerdeSerializer),
        Arc::new(typed_rpc::serializer::SerdeSerializer),
        Arc::new(typed_rpc::serializer::SerdeSerializer),
    )
}

fn progress_descriptor() -> typed_rpc::NotificationType<Progress> {
    notification_type_with("client.progress", Arc::new(typed_rpc::serializer::SerdeSerializer))
}

fn contract() -> Contract {
    Contract::new("demo")
        .server_request(&calculate_descriptor())
        .client_notification(&progress_descriptor())
}

#[tokio::test]
async fn success_call_resolves_with_transformed_name() {
    let (a, b) = duplex_pair();
    let server = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
    server
        .register_request(&calculate_descriptor(), |params: CalculateParams, _id, _ctx| async move {
            Ok(format!("bla{}", params.name))
        })
        .unwrap();
    contract().register_server(&server).unwrap();

    let client = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
    let server_proxy = contract().get_server(&client).unwrap();

    let result = server_proxy
        .request(&calculate_descriptor(), CalculateParams { name: "foo".to_string() }, ())
        .await
        .unwrap();
    assert_eq!(result, OptionalResult::Ok("blafoo".to_string()));
}

#[tokio::test]
async fn progress_notifications_arrive_before_final_result() {
    let (a, b) = duplex_pair();
    let server = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
    let demo = contract();
    demo.register_request(
        &server,
        &calculate_descriptor(),
        move |params: CalculateParams, _id, _ctx, progress_proxy, _error_factory| async move {
            for i in 0..=10 {
                progress_proxy
                    .notify(&progress_descriptor(), Progress { progress: i as f64 / 10.0 }, ())
                    .await
                    .unwrap();
            }
            Ok(format!("bla{}", params.name))
        },
    )
    .unwrap();
    demo.register_server(&server).unwrap();

    let client = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    client
        .register_notification(&progress_descriptor(), move |p: Progress, _ctx| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().unwrap().push(p.progress);
            }
        })
        .unwrap();
    let server_proxy = contract().get_server(&client).unwrap();

    let result = server_proxy
        .request(&calculate_descriptor(), CalculateParams { name: "foo".to_string() }, ())
        .await
        .unwrap();
    assert_eq!(result, OptionalResult::Ok("blafoo".to_string()));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 11);
    for (i, value) in seen.iter().enumerate() {
        assert!((value - i as f64 / 10.0).abs() < f64::EPSILON);
    }
}

#[tokio::test]
async fn domain_error_surfaces_message_and_generic_code() {
    let (a, b) = duplex_pair();
    let server = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
    server
        .register_request(&calculate_descriptor(), |params: CalculateParams, _id, _ctx| async move {
            if params.name == "bar" {
                Err(DomainError::new("`bar` is not supported."))
            } else {
                Ok(format!("bla{}", params.name))
            }
        })
        .unwrap();
    contract().register_server(&server).unwrap();

    let client = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
    let server_proxy = contract().get_server(&client).unwrap();

    let err = server_proxy
        .request(&calculate_descriptor(), CalculateParams { name: "bar".to_string() }, ())
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::GENERIC_APPLICATION_ERROR);
    assert_eq!(err.message, "`bar` is not supported.");
}

#[tokio::test]
async fn unknown_method_fails_or_resolves_to_sentinel_when_optional() {
    let (a, b) = duplex_pair();
    let server = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
    server.start().unwrap();

    let client = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
    client.start().unwrap();

    let unregistered = calculate_descriptor();
    let err = client
        .request(&unregistered, CalculateParams { name: "foo".to_string() }, ())
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::METHOD_NOT_FOUND);

    let optional = unregistered.optional();
    let result = client
        .request(&optional, CalculateParams { name: "foo".to_string() }, ())
        .await
        .unwrap();
    assert_eq!(result, OptionalResult::MethodNotFound);
}

#[tokio::test]
async fn transport_close_before_response_fails_the_pending_request() {
    let (a, b) = duplex_pair();
    // `a` has no handler installed, so whatever the client sends is never answered;
    // closing `b` (the client's own transport) simulates the connection dropping
    // while a request is still in flight.
    let _a = a;

    let client = TypedChannel::<(), ()>::new(Channel::new(Arc::clone(&b)), Arc::new(|| ()));
    client.start().unwrap();

    let client_for_task = Arc::clone(&client);
    let handle = tokio::spawn(async move {
        client_for_task
            .request(&calculate_descriptor(), CalculateParams { name: "foo".to_string() }, ())
            .await
    });

    // Give the request time to be sent and land in the pending table before closing.
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    b.close();

    let result = handle.await.unwrap();
    let err = result.unwrap_err();
    assert_eq!(err.code, codes::INTERNAL_ERROR);
}

#[tokio::test]
async fn reflection_lists_registered_methods_with_correct_kind() {
    let (a, b) = duplex_pair();
    let server = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
    server
        .register_request(&calculate_descriptor(), |params: CalculateParams, _id, _ctx| async move {
            Ok(format!("bla{}", params.name))
        })
        .unwrap();
    server
        .register_notification(&progress_descriptor(), |_p: Progress, _ctx| async move {})
        .unwrap();
    typed_rpc::reflection::install(&server).unwrap();
    server.start().unwrap();

    let client = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
    client.start().unwrap();

    let listed = client
        .request(&typed_rpc::reflection::list_registered_types_descriptor(), (), ())
        .await
        .unwrap()
        .into_option()
        .unwrap();

    let mut by_method = std::collections::HashMap::new();
    for m in listed.methods {
        by_method.insert(m.method, m.kind);
    }
    assert_eq!(
        by_method.get("server.calculate"),
        Some(&typed_rpc::reflection::RegisteredMethodKind::Request)
    );
    assert_eq!(
        by_method.get("client.progress"),
        Some(&typed_rpc::reflection::RegisteredMethodKind::Notification)
    );
}

// Guards against accidental reuse of the same atomic counter across independent
// channels (a regression that would make ids collide across unrelated connections).
#[tokio::test]
async fn independent_channels_do_not_share_id_state() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let (a1, b1) = duplex_pair();
    let (a2, b2) = duplex_pair();

    for (a, b) in [(a1, b1), (a2, b2)] {
        let server = TypedChannel::<(), ()>::new(Channel::new(a), Arc::new(|| ()));
        server
            .register_request(&calculate_descriptor(), |p: CalculateParams, _id, _ctx| async move {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(format!("bla{}", p.name))
            })
            .unwrap();
        server.start().unwrap();

        let client = TypedChannel::<(), ()>::new(Channel::new(b), Arc::new(|| ()));
        client.start().unwrap();
        let result = client
            .request(&calculate_descriptor(), CalculateParams { name: "x".to_string() }, ())
            .await
            .unwrap();
        assert_eq!(result, OptionalResult::Ok("blax".to_string()));
    }
    assert_eq!(CALLS.load(Ordering::SeqCst), 2);
}
