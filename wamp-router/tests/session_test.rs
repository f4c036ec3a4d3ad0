use std::time::Duration;

use anyhow::Result;
use futures_util::{
    SinkExt,
    StreamExt,
};
use tokio::task::JoinHandle;
use wamp_router::{
    core::{
        error::InteractionError,
        id::Id,
        stream::{
            MessageStream,
            StreamMessage,
        },
        types::Dictionary,
        uri::Uri,
    },
    message::message::{
        AbortMessage,
        GoodbyeMessage,
        HelloMessage,
        Message,
        SubscribeMessage,
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

async fn start_router_with_config(
    mut config: RouterConfig,
) -> Result<(RouterHandle, JoinHandle<()>)> {
    config.realms.push(RealmConfig {
        name: "test".to_owned(),
        uri: Uri::try_from(REALM)?,
    });
    let router = new_web_socket_router(config, None)?;
    router.start().await
}

async fn start_router() -> Result<(RouterHandle, JoinHandle<()>)> {
    start_router_with_config(RouterConfig::default()).await
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

fn hello(realm: &str) -> Message {
    Message::Hello(HelloMessage {
        realm: Uri::try_from(realm).unwrap(),
        details: Dictionary::default(),
    })
}

fn goodbye(reason: Uri) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason,
    })
}

#[tokio::test]
async fn welcomes_session_with_router_details() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut peer = connect(&router_handle).await;

    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Welcome(welcome)) => {
        assert!(welcome.session.value() > 0);
        assert_matches::assert_matches!(welcome.details.get("agent"), Some(agent) => {
            assert_eq!(agent.string(), Some(concat!("wamp-router-", env!("CARGO_PKG_VERSION"))));
        });
        assert_matches::assert_matches!(welcome.details.get("roles").and_then(|roles| roles.dictionary()), Some(roles) => {
            let mut roles = roles.keys().cloned().collect::<Vec<_>>();
            roles.sort();
            pretty_assertions::assert_eq!(roles, ["broker", "dealer"]);
        });
    });

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn aborts_unknown_realm() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut peer = connect(&router_handle).await;

    send(&mut peer, hello("other.realm")).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Abort(abort)) => {
        assert_eq!(abort.reason, Uri::NO_SUCH_REALM);
    });
    assert_matches::assert_matches!(receive(&mut peer).await, None);

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn aborts_message_before_hello() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut peer = connect(&router_handle).await;

    send(
        &mut peer,
        Message::Subscribe(SubscribeMessage {
            request: Id::try_from(5432).unwrap(),
            options: Dictionary::default(),
            topic: Uri::try_from("my.topic").unwrap(),
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Abort(abort)) => {
        assert_eq!(abort.reason, Uri::PROTOCOL_VIOLATION);
    });
    assert_matches::assert_matches!(receive(&mut peer).await, None);

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn aborts_second_hello() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut peer = connect(&router_handle).await;

    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Welcome(_)));
    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Abort(abort)) => {
        assert_eq!(abort.reason, Uri::PROTOCOL_VIOLATION);
    });
    assert_matches::assert_matches!(receive(&mut peer).await, None);

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn closes_on_peer_abort() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut peer = connect(&router_handle).await;

    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Welcome(_)));
    send(
        &mut peer,
        Message::Abort(AbortMessage {
            details: Dictionary::default(),
            reason: Uri::SYSTEM_SHUTDOWN,
        }),
    )
    .await;
    assert_matches::assert_matches!(receive(&mut peer).await, None);

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn acknowledges_goodbye() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut peer = connect(&router_handle).await;

    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Welcome(_)));
    send(&mut peer, goodbye(Uri::CLOSE_REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Goodbye(goodbye)) => {
        assert_eq!(goodbye.reason, Uri::GOODBYE_AND_OUT);
    });
    assert_matches::assert_matches!(receive(&mut peer).await, None);

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn router_shutdown_says_goodbye() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut established = connect(&router_handle).await;
    let mut establishing = connect(&router_handle).await;

    send(&mut established, hello(REALM)).await;
    assert_matches::assert_matches!(
        receive(&mut established).await,
        Some(Message::Welcome(_))
    );

    router_handle.cancel().unwrap();

    assert_matches::assert_matches!(receive(&mut establishing).await, Some(Message::Abort(abort)) => {
        assert_eq!(abort.reason, Uri::SYSTEM_SHUTDOWN);
    });
    assert_matches::assert_matches!(receive(&mut established).await, Some(Message::Goodbye(goodbye)) => {
        assert_eq!(goodbye.reason, Uri::SYSTEM_SHUTDOWN);
    });
    send(&mut established, goodbye(Uri::GOODBYE_AND_OUT)).await;
    assert_matches::assert_matches!(receive(&mut established).await, None);

    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn router_shutdown_closes_unresponsive_sessions() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router_with_config(RouterConfig {
        shutdown_timeout: Duration::from_millis(100),
        ..Default::default()
    })
    .await
    .unwrap();
    let mut peer = connect(&router_handle).await;
    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Welcome(_)));

    router_handle.cancel().unwrap();
    assert_matches::assert_matches!(
        receive(&mut peer).await,
        Some(Message::Goodbye(_))
    );
    // The peer never acknowledges, so the router closes the connection on its own.
    assert_matches::assert_matches!(receive(&mut peer).await, None);
    router_join_handle.await.unwrap();
}

#[tokio::test]
async fn closes_realm_with_goodbye() {
    test_utils::setup::setup_test_environment();

    let (router_handle, router_join_handle) = start_router().await.unwrap();
    let mut peer = connect(&router_handle).await;
    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Welcome(_)));

    let realm = Uri::try_from(REALM).unwrap();
    let (closed, _) = tokio::join!(router_handle.close_realm(&realm), async {
        assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Goodbye(goodbye)) => {
            assert_eq!(goodbye.reason, Uri::CLOSE_REALM);
        });
        send(&mut peer, goodbye(Uri::GOODBYE_AND_OUT)).await;
        assert_matches::assert_matches!(receive(&mut peer).await, None);
    });
    assert_matches::assert_matches!(closed, Ok(()));

    // The realm itself stays open.
    let mut peer = connect(&router_handle).await;
    send(&mut peer, hello(REALM)).await;
    assert_matches::assert_matches!(receive(&mut peer).await, Some(Message::Welcome(_)));

    assert_matches::assert_matches!(
        router_handle
            .close_realm(&Uri::try_from("other.realm").unwrap())
            .await,
        Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<InteractionError>(), Some(InteractionError::NoSuchRealm));
        }
    );

    router_handle.cancel().unwrap();
    router_join_handle.await.unwrap();
}
