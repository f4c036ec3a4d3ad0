pub mod direct_transport;
pub mod transport;
pub mod web_socket_transport;
