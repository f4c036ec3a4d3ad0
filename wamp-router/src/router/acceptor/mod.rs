pub mod acceptor;
pub mod web_socket_acceptor;
