use log::{
    debug,
    error,
    info,
};
use tokio::sync::mpsc::{
    UnboundedReceiver,
    unbounded_channel,
};
use uuid::Uuid;

use crate::{
    core::{
        service::{
            IncomingMessage,
            Service,
            ServiceHandle,
        },
        stream::MessageStream,
    },
    router::{
        authorization::ClientAuthorization,
        context::RouterContext,
        session::{
            Session,
            SessionControl,
            SessionHandle,
        },
    },
};

/// A connection from a router to a client.
///
/// On its own, a connection is not very meaningful. When started, it uses a WAMP [`Service`] to
/// send and receive messages on an underlying transport. Messages drive a single [`Session`],
/// which handles all interactions with the router. The connection ends when the session closes or
/// the transport goes away, whichever happens first.
#[derive(Debug)]
pub struct Connection {
    uuid: Uuid,
}

impl Connection {
    /// Creates a new connection.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
        }
    }

    /// The unique identifier of the connection.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Starts the connection on the runtime.
    ///
    /// The session is registered with the router before this method returns, so router shutdown
    /// always reaches it.
    pub async fn start(
        self,
        context: RouterContext,
        stream: MessageStream,
        authorization: Option<ClientAuthorization>,
    ) {
        let (service, message_rx) = Service::new(self.uuid.to_string(), stream);
        let service_handle = service.start();

        let session_id = context.id_allocator().generate_id().await;
        let (control_tx, control_rx) = unbounded_channel();
        let handle = SessionHandle::new(
            session_id,
            authorization,
            service_handle.message_tx(),
            control_tx,
        );
        context.add_session(handle.clone()).await;
        let session = Session::new(handle, context);
        info!(
            "Started router session {session_id} for connection {}",
            self.uuid
        );

        tokio::spawn(self.run(session, service_handle, message_rx, control_rx));
    }

    async fn run(
        self,
        mut session: Session,
        service_handle: ServiceHandle,
        mut message_rx: UnboundedReceiver<IncomingMessage>,
        mut control_rx: UnboundedReceiver<SessionControl>,
    ) {
        let session_id = session.id();
        loop {
            tokio::select! {
                // Received a message from the peer.
                message = message_rx.recv() => {
                    match message {
                        Some(message) => session.handle_message(message).await,
                        None => {
                            debug!("Service for connection {} ended", self.uuid);
                            break;
                        }
                    }
                }
                // Received a control signal from some part of the router.
                control = control_rx.recv() => {
                    // The session holds its own sender, so the channel never closes first.
                    if let Some(control) = control {
                        session.handle_control(control).await;
                    }
                }
            }

            if session.closed() {
                break;
            }
        }

        session.close().await;
        info!(
            "Router session {session_id} for connection {} finished",
            self.uuid
        );

        if let Err(err) = service_handle.cancel() {
            debug!(
                "Failed to cancel service for connection {}: {err}",
                self.uuid
            );
        }
        if let Err(err) = service_handle.join().await {
            error!("Failed to join service for connection {}: {err}", self.uuid);
        }
    }
}
