mod acceptor;
mod authorization;
mod connection;
mod context;
mod realm;
mod router;
mod session;
mod web_socket_router;

pub use acceptor::{
    acceptor::{
        Acceptance,
        Acceptor,
        AcceptorFactory,
    },
    web_socket_acceptor::WebSocketAcceptorFactory,
};
pub use authorization::{
    AuthorizationPolicy,
    ClientInfo,
    ConnectionInfo,
    ConnectionType,
};
pub use realm::{
    RealmConfig,
    RpcError,
    RpcYield,
};
pub use router::{
    DirectConnection,
    Router,
    RouterConfig,
    RouterHandle,
};
pub use session::SessionState;
pub use web_socket_router::{
    WebSocketRouter,
    new_web_socket_router,
};
