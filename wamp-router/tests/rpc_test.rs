use std::time::Duration;

use anyhow::Result;
use futures_util::{
    SinkExt,
    StreamExt,
};
use tokio::task::JoinHandle;
use wamp_router::{
    core::{
        id::Id,
        stream::{
            MessageStream,
            StreamMessage,
        },
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::Uri,
    },
    message::message::{
        CallMessage,
        ErrorMessage,
        GoodbyeMessage,
        HelloMessage,
        INVOCATION_TAG,
        Message,
        RegisterMessage,
        UnregisterMessage,
        YieldMessage,
    },
    router::{
        RealmConfig,
        RouterConfig,
        RouterHandle,
        new_web_socket_router,
    },
    serializer::serializer::SerializerType,
};

const REALM: &str = "test.realm";

async fn start_router() -> Result<(RouterHandle, JoinHandle<()>)> {
    let mut config = RouterConfig::default();
    config.realms.push(RealmConfig {
        name: "test".to_owned(),
        uri: Uri::try_from(REALM)?,
    });
    let router = new_web_socket_router(config, None)?;
    router.start().await
}

async fn connect(router_handle: &RouterHandle) -> MessageStream {
    router_handle
        .direct_connect(SerializerType::Json)
        .await
        .unwrap()
        .stream()
}

async fn send(stream: &mut MessageStream, message: Message) {
    stream.send(StreamMessage::Message(message)).await.unwrap();
}

async fn receive(stream: &mut MessageStream) -> Option<Message> {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
        {
            Some(Ok(StreamMessage::Message(message))) => return Some(message),
            Some(Ok(StreamMessage::Ping(_))) => continue,
            Some(Ok(StreamMessage::Malformed(err))) => {
                panic!("received malformed message: {err:#}")
            }
            Some(Err(_)) | None => return None,
        }
    }
}

async fn join_realm(stream: &mut MessageStream) {
    send(
        stream,
        Message::Hello(HelloMessage {
            realm: Uri::try_from(REALM).unwrap(),
            details: Dictionary::default(),
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(stream).await, Some(Message::Welcome(_)));
}

fn register(request: u64, procedure: &str) -> Message {
    Message::Register(RegisterMessage {
        request: Id::try_from(request).unwrap(),
        options: Dictionary::default(),
        procedure: Uri::try_from(procedure).unwrap(),
    })
}

fn call(request: u64, procedure: &str, arguments: Option<List>) -> Message {
    Message::Call(CallMessage {
        request: Id::try_from(request).unwrap(),
        options: Dictionary::default(),
        procedure: Uri::try_from(procedure).unwrap(),
        arguments,
        arguments_keyword: None,
    })
}

async fn register_procedure(stream: &mut MessageStream, request: u64, procedure: &str) -> Id {
    send(stream, register(request, procedure)).await;
    assert_matches::assert_matches!(receive(stream).await, Some(Message::Registered(registered)) => {
        assert_eq!(registered.register_request.value(), request);
        registered.registration
    })
}

#[tokio::test]
async fn calls_registered_procedure() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut callee = connect(&router_handle).await;
    let mut caller = connect(&router_handle).await;
    join_realm(&mut callee).await;
    join_realm(&mut caller).await;

    let registration = register_procedure(&mut callee, 1, "com.myapp.add2").await;

    send(
        &mut caller,
        call(
            7,
            "com.myapp.add2",
            Some(List::from_iter([Value::Integer(23), Value::Integer(7)])),
        ),
    )
    .await;
    let invocation = assert_matches::assert_matches!(receive(&mut callee).await, Some(Message::Invocation(invocation)) => {
        assert_eq!(invocation.registered_registration, registration);
        pretty_assertions::assert_eq!(
            invocation.call_arguments,
            Some(List::from_iter([Value::Integer(23), Value::Integer(7)]))
        );
        invocation.request
    });

    send(
        &mut callee,
        Message::Yield(YieldMessage {
            invocation_request: invocation,
            options: Dictionary::default(),
            arguments: Some(List::from_iter([Value::Integer(30)])),
            arguments_keyword: None,
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(&mut caller).await, Some(Message::Result(result)) => {
        assert_eq!(result.call_request.value(), 7);
        pretty_assertions::assert_eq!(
            result.yield_arguments,
            Some(List::from_iter([Value::Integer(30)]))
        );
    });

    // A second YIELD for the same invocation is ignored.
    send(
        &mut callee,
        Message::Yield(YieldMessage {
            invocation_request: invocation,
            options: Dictionary::default(),
            arguments: None,
            arguments_keyword: None,
        }),
    )
    .await;
    send(&mut caller, call(8, "com.myapp.add2", None)).await;
    assert_matches::assert_matches!(
        receive(&mut callee).await,
        Some(Message::Invocation(_))
    );

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn fails_call_to_unregistered_procedure() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut caller = connect(&router_handle).await;
    join_realm(&mut caller).await;

    send(&mut caller, call(1, "com.myapp.add2", None)).await;
    assert_matches::assert_matches!(receive(&mut caller).await, Some(Message::Error(error)) => {
        assert_eq!(error.request.value(), 1);
        assert_eq!(error.error, Uri::NO_SUCH_PROCEDURE);
    });

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn forwards_callee_error_to_caller() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut callee = connect(&router_handle).await;
    let mut caller = connect(&router_handle).await;
    join_realm(&mut callee).await;
    join_realm(&mut caller).await;
    register_procedure(&mut callee, 1, "com.myapp.divide").await;

    send(
        &mut caller,
        call(
            2,
            "com.myapp.divide",
            Some(List::from_iter([Value::Integer(1), Value::Integer(0)])),
        ),
    )
    .await;
    let invocation = assert_matches::assert_matches!(receive(&mut callee).await, Some(Message::Invocation(invocation)) => invocation.request);
    send(
        &mut callee,
        Message::Error(ErrorMessage {
            request_type: INVOCATION_TAG,
            request: invocation,
            details: Dictionary::default(),
            error: Uri::try_from("com.myapp.error.divide_by_zero").unwrap(),
            arguments: Some(List::from_iter([Value::String(
                "cannot divide by zero".to_owned(),
            )])),
            arguments_keyword: None,
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(&mut caller).await, Some(Message::Error(error)) => {
        assert_eq!(error.request.value(), 2);
        assert_eq!(error.error.as_ref(), "com.myapp.error.divide_by_zero");
        pretty_assertions::assert_eq!(
            error.arguments,
            Some(List::from_iter([Value::String(
                "cannot divide by zero".to_owned()
            )]))
        );
    });

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn registers_procedure_once() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut first = connect(&router_handle).await;
    let mut second = connect(&router_handle).await;
    join_realm(&mut first).await;
    join_realm(&mut second).await;

    let registration = register_procedure(&mut first, 1, "com.myapp.add2").await;
    send(&mut second, register(1, "com.myapp.add2")).await;
    assert_matches::assert_matches!(receive(&mut second).await, Some(Message::Error(error)) => {
        assert_eq!(error.error, Uri::PROCEDURE_ALREADY_EXISTS);
    });

    // Only the owner can unregister.
    send(
        &mut second,
        Message::Unregister(UnregisterMessage {
            request: Id::try_from(2).unwrap(),
            registered_registration: registration,
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(&mut second).await, Some(Message::Error(error)) => {
        assert_eq!(error.error, Uri::NO_SUCH_REGISTRATION);
    });

    send(
        &mut first,
        Message::Unregister(UnregisterMessage {
            request: Id::try_from(2).unwrap(),
            registered_registration: registration,
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(&mut first).await, Some(Message::Unregistered(unregistered)) => {
        assert_eq!(unregistered.unregister_request.value(), 2);
    });

    register_procedure(&mut second, 3, "com.myapp.add2").await;

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn cancels_call_when_callee_leaves() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut callee = connect(&router_handle).await;
    let mut caller = connect(&router_handle).await;
    join_realm(&mut callee).await;
    join_realm(&mut caller).await;
    register_procedure(&mut callee, 1, "com.myapp.slow").await;

    send(&mut caller, call(2, "com.myapp.slow", None)).await;
    assert_matches::assert_matches!(
        receive(&mut callee).await,
        Some(Message::Invocation(_))
    );

    send(
        &mut callee,
        Message::Goodbye(GoodbyeMessage {
            details: Dictionary::default(),
            reason: Uri::CLOSE_REALM,
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(&mut callee).await, Some(Message::Goodbye(goodbye)) => {
        assert_eq!(goodbye.reason, Uri::GOODBYE_AND_OUT);
    });

    assert_matches::assert_matches!(receive(&mut caller).await, Some(Message::Error(error)) => {
        assert_eq!(error.request.value(), 2);
        assert_eq!(error.error, Uri::CANCELED);
    });

    // The procedure is gone with its callee.
    send(&mut caller, call(3, "com.myapp.slow", None)).await;
    assert_matches::assert_matches!(receive(&mut caller).await, Some(Message::Error(error)) => {
        assert_eq!(error.error, Uri::NO_SUCH_PROCEDURE);
    });

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}
