use std::net::SocketAddr;

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    tungstenite::{
        handshake::server::{
            Callback,
            ErrorResponse,
            Request,
            Response,
        },
        http::{
            HeaderValue,
            StatusCode,
            header::SEC_WEBSOCKET_PROTOCOL,
        },
    },
};

use crate::{
    core::hash::{
        HashMap,
        HashSet,
    },
    router::{
        acceptor::acceptor::{
            Acceptance,
            Acceptor,
            AcceptorFactory,
        },
        authorization::{
            ConnectionInfo,
            ConnectionType,
        },
        router::RouterConfig,
    },
    serializer::serializer::SerializerType,
};

struct WebSocketWampNegotiator {
    supported_protocols: HashSet<String>,
    selected_protocol: Option<String>,
    headers: HashMap<String, String>,
}

impl WebSocketWampNegotiator {
    fn new(config: &RouterConfig) -> Self {
        let supported_protocols = config
            .serializers
            .iter()
            .map(|serializer| serializer.uri().to_string())
            .collect();
        Self {
            supported_protocols,
            selected_protocol: None,
            headers: HashMap::default(),
        }
    }

    fn reject_response<S>(message: S) -> ErrorResponse
    where
        S: Into<String>,
    {
        let mut response = ErrorResponse::new(Some(message.into()));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        response
    }

    fn callback(&mut self) -> impl Callback + use<'_> {
        |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            // Header names are normalized to lowercase.
            self.headers = request
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_owned(), value.to_owned()))
                })
                .collect();

            // Protocols are listed in order of client preference.
            let selected_protocol = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|protocols| protocols.to_str().ok())
                .and_then(|protocols| {
                    protocols
                        .split(',')
                        .map(|protocol| protocol.trim())
                        .find(|protocol| self.supported_protocols.contains(*protocol))
                });
            let selected_protocol = match selected_protocol {
                Some(protocol) => protocol,
                None => return Err(Self::reject_response("no supported protocol")),
            };
            self.selected_protocol = Some(selected_protocol.to_owned());
            let header = match HeaderValue::from_str(selected_protocol) {
                Ok(header) => header,
                Err(_) => return Err(Self::reject_response("failed to create response header")),
            };
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, header);
            Ok(response)
        }
    }
}

#[derive(Default)]
struct WebSocketAcceptor {}

#[async_trait]
impl Acceptor<WebSocketStream<MaybeTlsStream<TcpStream>>> for WebSocketAcceptor {
    async fn accept(
        &self,
        config: &RouterConfig,
        addr: SocketAddr,
        stream: MaybeTlsStream<TcpStream>,
    ) -> Result<Acceptance<WebSocketStream<MaybeTlsStream<TcpStream>>>> {
        let mut negotiator = WebSocketWampNegotiator::new(config);
        let stream = tokio_tungstenite::accept_hdr_async(stream, negotiator.callback()).await?;
        let protocol = match negotiator.selected_protocol {
            Some(protocol) => protocol,
            None => return Err(Error::msg("expected protocol after negotiation")),
        };
        let serializer = SerializerType::try_from(protocol.as_str()).map_err(Error::msg)?;
        debug!("Negotiated {protocol} with {addr}");
        Ok(Acceptance {
            stream,
            serializer,
            connection: ConnectionInfo {
                connection_type: ConnectionType::Remote(addr),
                headers: negotiator.headers,
            },
        })
    }
}

/// A factory for an [`Acceptor`] for WebSocket connections.
#[derive(Default)]
pub struct WebSocketAcceptorFactory {}

impl AcceptorFactory<WebSocketStream<MaybeTlsStream<TcpStream>>> for WebSocketAcceptorFactory {
    fn new_acceptor(
        &self,
    ) -> Box<dyn Acceptor<WebSocketStream<MaybeTlsStream<TcpStream>>> + Send + Sync> {
        Box::new(WebSocketAcceptor::default())
    }
}
