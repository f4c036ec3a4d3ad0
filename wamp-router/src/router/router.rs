use std::{
    net::{
        IpAddr,
        Ipv4Addr,
        SocketAddr,
    },
    sync::Arc,
    time::Duration,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::SinkExt;
use log::{
    debug,
    error,
    info,
    warn,
};
use tokio::{
    net::{
        TcpListener,
        TcpStream,
    },
    sync::broadcast,
    task::JoinHandle,
};
use tokio_tungstenite::MaybeTlsStream;
use uuid::Uuid;

use crate::{
    core::{
        close::CloseReason,
        error::InteractionError,
        hash::HashSet,
        id::IdAllocatorType,
        roles::RouterRole,
        stream::MessageStream,
        uri::Uri,
    },
    router::{
        acceptor::acceptor::AcceptorFactory,
        authorization::{
            AuthorizationPolicy,
            ClientAuthorization,
            ConnectionInfo,
        },
        connection::Connection,
        context::RouterContext,
        realm::{
            RealmConfig,
            shut_down_sessions,
        },
    },
    serializer::serializer::{
        SerializerType,
        new_serializer,
    },
    transport::{
        direct_transport::direct_transport_pair,
        transport::TransportFactory,
    },
};

const DEFAULT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Router`].
#[derive(Debug)]
pub struct RouterConfig {
    /// IP address the router starts on.
    pub address: IpAddr,
    /// Network port the router starts on.
    pub port: u16,
    /// Agent name, communicated to peers.
    pub agent: String,
    /// Roles implemented by the router.
    pub roles: HashSet<RouterRole>,
    /// Allowed serializers.
    ///
    /// The actual serializer will be selected when the connection with the router is established.
    pub serializers: HashSet<SerializerType>,
    /// Realms available on the router.
    pub realms: Vec<RealmConfig>,
    /// Strategy for IDs of sessions, subscriptions, and registrations.
    pub id_allocator: IdAllocatorType,
    /// How long shutdown waits for sessions to acknowledge GOODBYE before closing them abruptly.
    pub shutdown_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 0,
            agent: DEFAULT_AGENT.to_owned(),
            roles: HashSet::from_iter([RouterRole::Broker, RouterRole::Dealer]),
            serializers: HashSet::from_iter([SerializerType::Json, SerializerType::MessagePack]),
            realms: Vec::default(),
            id_allocator: IdAllocatorType::default(),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// A direct connection made to a router, managed externally in the same process.
#[derive(Debug)]
pub struct DirectConnection {
    uuid: Uuid,
    stream: MessageStream,
}

impl DirectConnection {
    /// The unique identifier of the connection.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The message stream for talking to the router.
    pub fn stream(self) -> MessageStream {
        self.stream
    }
}

/// A handle to an asynchronously-running [`Router`].
///
/// The router's ownership is transferred away when it starts. This handle allows interaction with
/// the router as it is running asynchronously.
pub struct RouterHandle {
    context: RouterContext,
    local_addr: SocketAddr,
    cancel_tx: broadcast::Sender<()>,
}

impl RouterHandle {
    /// Cancels the router.
    ///
    /// Cancellation is asynchronous. Join the handle returned from [`Router::start`] to wait for
    /// the router to stop.
    pub fn cancel(&self) -> Result<()> {
        self.cancel_tx.send(()).map(|_| ()).map_err(Error::new)
    }

    /// The local address of the router.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts a direct connection to the router.
    ///
    /// The connection is authenticated like any other, so the authorization policy may reject it.
    pub async fn direct_connect(&self, serializer: SerializerType) -> Result<DirectConnection> {
        let (router_transport, peer_transport) = direct_transport_pair();
        let authorization = authenticate(&self.context, &ConnectionInfo::direct())
            .await
            .map_err(|err| err.context("direct connection rejected"))?;
        let uuid = start_connection_over_stream(
            &self.context,
            MessageStream::new(Box::new(router_transport), new_serializer(serializer)),
            authorization,
        )
        .await;
        Ok(DirectConnection {
            uuid,
            stream: MessageStream::new(Box::new(peer_transport), new_serializer(serializer)),
        })
    }

    /// Closes every session in a realm, waiting for each peer to acknowledge.
    ///
    /// The realm stays open, so peers may join it again afterwards.
    pub async fn close_realm(&self, realm: &Uri) -> Result<()> {
        let realm = self
            .context
            .realm(realm)
            .ok_or_else(|| Error::new(InteractionError::NoSuchRealm))?;
        realm
            .shut_down(
                CloseReason::CloseRealm,
                self.context.config().shutdown_timeout,
            )
            .await
    }
}

/// A WAMP router (a.k.a., server) that accepts incoming connections and handles sessions.
pub struct Router<S> {
    context: RouterContext,
    acceptor_factory: Box<dyn AcceptorFactory<S>>,
    transport_factory: Box<dyn TransportFactory<S>>,
}

impl<S> Router<S>
where
    S: Send + 'static,
{
    /// Creates a new [`Router`].
    pub fn new(
        config: RouterConfig,
        policy: Option<Arc<dyn AuthorizationPolicy>>,
        acceptor_factory: Box<dyn AcceptorFactory<S>>,
        transport_factory: Box<dyn TransportFactory<S>>,
    ) -> Result<Self> {
        if config.serializers.is_empty() {
            return Err(Error::msg("router requires at least one serializer"));
        }
        Ok(Self {
            context: RouterContext::new(config, policy),
            acceptor_factory,
            transport_factory,
        })
    }

    /// Starts the router asynchronously.
    ///
    /// The returned handle can be used to interact with the router since its ownership is
    /// transferred away. The join handle completes once the router has stopped and every session
    /// has been shut down.
    pub async fn start(self) -> Result<(RouterHandle, JoinHandle<()>)> {
        let config = self.context.config();
        let addr = format!("{}:{}", config.address, config.port);
        info!("Starting router {} at {addr}: {config:?}", config.agent);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let (cancel_tx, _) = broadcast::channel(1);
        let context = self.context.clone();
        let start_handle = tokio::spawn(self.handle_connections(listener, cancel_tx.subscribe()));

        Ok((
            RouterHandle {
                context,
                local_addr,
                cancel_tx,
            },
            start_handle,
        ))
    }

    async fn handle_connections(self, listener: TcpListener, cancel_rx: broadcast::Receiver<()>) {
        let router = Arc::new(self);
        router.clone().connection_loop(listener, cancel_rx).await;
        shut_down(&router.context).await;
    }

    async fn connection_loop(
        self: Arc<Self>,
        listener: TcpListener,
        mut cancel_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                accept = listener.accept() => {
                    let (stream, addr) = match accept {
                        Ok((stream, addr)) => (stream, addr),
                        Err(err) => {
                            error!("Failed to accept connection: {err}");
                            break;
                        }
                    };
                    tokio::spawn(self.clone().handle_connection(
                        addr,
                        MaybeTlsStream::Plain(stream),
                    ));
                }
                _ = cancel_rx.recv() => {
                    break;
                }
            }
        }
    }

    async fn handle_connection(
        self: Arc<Self>,
        addr: SocketAddr,
        stream: MaybeTlsStream<TcpStream>,
    ) {
        if let Err(err) = self.start_connection(addr, stream).await {
            error!("Failed to start handling connection from {addr}: {err:#}");
        }
    }

    async fn start_connection(
        &self,
        addr: SocketAddr,
        stream: MaybeTlsStream<TcpStream>,
    ) -> Result<()> {
        debug!("Incoming TCP connection from {addr}");
        let acceptor = self.acceptor_factory.new_acceptor();
        let acceptance = acceptor.accept(self.context.config(), addr, stream).await?;
        debug!("WAMP connection established with {addr}");

        let serializer = new_serializer(acceptance.serializer);
        let transport = self
            .transport_factory
            .new_transport(acceptance.stream, acceptance.serializer);
        let mut stream = MessageStream::new(transport, serializer);

        let authorization = match authenticate(&self.context, &acceptance.connection).await {
            Ok(authorization) => authorization,
            Err(err) => {
                // Ignore error with the stream, since the connection is being dropped.
                stream.close().await.ok();
                return Err(err);
            }
        };
        start_connection_over_stream(&self.context, stream, authorization).await;
        Ok(())
    }
}

async fn authenticate(
    context: &RouterContext,
    connection: &ConnectionInfo,
) -> Result<Option<ClientAuthorization>> {
    let policy = match context.policy() {
        Some(policy) => policy,
        None => return Ok(None),
    };
    match policy.authenticate_connection(connection).await {
        Some(client) => Ok(Some(ClientAuthorization {
            policy: policy.clone(),
            client,
        })),
        None => {
            info!(
                "Connection {:?} rejected by authorization policy",
                connection.connection_type
            );
            Err(Error::msg("connection not authenticated"))
        }
    }
}

async fn start_connection_over_stream(
    context: &RouterContext,
    stream: MessageStream,
    authorization: Option<ClientAuthorization>,
) -> Uuid {
    let connection = Connection::new();
    let uuid = connection.uuid();
    info!("Created connection {uuid}");
    connection
        .start(context.clone(), stream, authorization)
        .await;
    uuid
}

async fn shut_down(context: &RouterContext) {
    let sessions = context.sessions().await;
    info!("Shutting down router with {} sessions", sessions.len());
    if let Err(err) = shut_down_sessions(
        &sessions,
        CloseReason::SystemShutdown,
        context.config().shutdown_timeout,
    )
    .await
    {
        warn!("Router did not shut down cleanly: {err:#}");
    }
}
