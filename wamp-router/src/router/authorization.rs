use std::{
    any::Any,
    fmt::Debug,
    net::SocketAddr,
    sync::Arc,
};

use async_trait::async_trait;

use crate::{
    core::{
        hash::HashMap,
        uri::Uri,
    },
    message::message::EventMessage,
};

/// How a connection reached the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionType {
    /// A network connection from a remote address.
    Remote(SocketAddr),
    /// A direct connection from within the same process.
    Direct,
}

/// Information about an incoming connection, available to the authorization policy before any
/// session exists.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_type: ConnectionType,
    /// Request headers, keyed by lowercase header name.
    pub headers: HashMap<String, String>,
}

impl ConnectionInfo {
    /// Information for a direct connection.
    pub fn direct() -> Self {
        Self {
            connection_type: ConnectionType::Direct,
            headers: HashMap::default(),
        }
    }
}

/// Opaque per-connection context produced by an [`AuthorizationPolicy`].
///
/// The router never looks inside. The policy that produced it can recover its own type with
/// [`ClientInfo::downcast_ref`].
#[derive(Clone)]
pub struct ClientInfo(Arc<dyn Any + Send + Sync>);

impl ClientInfo {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.0.downcast_ref()
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new(())
    }
}

impl Debug for ClientInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientInfo").finish_non_exhaustive()
    }
}

/// A deployment-provided policy that authenticates connections and authorizes operations.
///
/// Every hook has a permissive default, so a policy only implements the hooks it cares about.
#[async_trait]
pub trait AuthorizationPolicy: Send + Sync {
    /// Authenticates a new connection.
    ///
    /// Returning [`None`] rejects the connection, which is closed before a session is created.
    async fn authenticate_connection(&self, _connection: &ConnectionInfo) -> Option<ClientInfo> {
        Some(ClientInfo::default())
    }

    /// Releases any resources held for a connection that has closed.
    async fn release_connection(&self, _client: &ClientInfo) {}

    /// Authorizes a session to join a realm.
    async fn authorize_hello(&self, _client: &ClientInfo, _realm: &Uri) -> bool {
        true
    }

    /// Authorizes a session to subscribe to a topic.
    async fn authorize_subscribe(&self, _client: &ClientInfo, _realm: &Uri, _topic: &Uri) -> bool {
        true
    }

    /// Authorizes a session to publish to a topic.
    async fn authorize_publish(&self, _client: &ClientInfo, _realm: &Uri, _topic: &Uri) -> bool {
        true
    }

    /// Authorizes a session to register a procedure.
    async fn authorize_register(
        &self,
        _client: &ClientInfo,
        _realm: &Uri,
        _procedure: &Uri,
    ) -> bool {
        true
    }

    /// Authorizes a session to call a procedure.
    async fn authorize_call(&self, _client: &ClientInfo, _realm: &Uri, _procedure: &Uri) -> bool {
        true
    }

    /// Authorizes a single event to be delivered to a subscriber.
    async fn authorize_event(
        &self,
        _subscriber: &ClientInfo,
        _topic: &Uri,
        _event: &EventMessage,
    ) -> bool {
        true
    }
}

/// The authorization policy attached to a session, along with the client it authenticated.
#[derive(Clone)]
pub struct ClientAuthorization {
    pub policy: Arc<dyn AuthorizationPolicy>,
    pub client: ClientInfo,
}

impl Debug for ClientAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAuthorization")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
