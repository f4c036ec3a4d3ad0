use std::{
    fmt::Debug,
    sync::Arc,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    FutureExt,
    future::BoxFuture,
    lock::Mutex,
};
use log::{
    debug,
    info,
    warn,
};
use tokio::sync::{
    mpsc::UnboundedSender,
    oneshot,
};

use crate::{
    core::{
        close::CloseReason,
        error::InteractionError,
        hash::HashMap,
        id::Id,
        service::{
            IncomingMessage,
            OutgoingMessage,
        },
        types::{
            Dictionary,
            List,
            Value,
        },
    },
    message::{
        common::{
            abort_message_for_error,
            abort_message_with_reason,
            call_error,
            error_for_request,
            goodbye_and_out,
            goodbye_with_close_reason,
        },
        message::{
            CallMessage,
            ErrorMessage,
            HelloMessage,
            INVOCATION_TAG,
            InvocationMessage,
            Message,
            PublishMessage,
            PublishedMessage,
            RegisterMessage,
            RegisteredMessage,
            ResultMessage,
            SubscribeMessage,
            SubscribedMessage,
            UnregisterMessage,
            UnregisteredMessage,
            UnsubscribeMessage,
            UnsubscribedMessage,
            WelcomeMessage,
            YieldMessage,
        },
    },
    router::{
        authorization::ClientAuthorization,
        context::RouterContext,
        realm::{
            InvocationResult,
            Realm,
            RpcError,
            RpcYield,
        },
    },
};

/// A control signal for a session, sent from outside of the session's own message handling.
#[derive(Debug)]
pub enum SessionControl {
    /// Shut down the session cleanly, signaling `done_tx` once it has closed.
    ShutDown {
        close_reason: CloseReason,
        done_tx: oneshot::Sender<()>,
    },
    /// Close the session immediately, without any further protocol negotiation.
    Close,
}

struct SessionShared {
    id: Id,
    authorization: Option<ClientAuthorization>,
    message_tx: UnboundedSender<OutgoingMessage>,
    control_tx: UnboundedSender<SessionControl>,
    // None once the session has closed.
    pending_invocations: Mutex<Option<HashMap<Id, oneshot::Sender<InvocationResult>>>>,
}

/// A handle to an asynchronously-running router session.
///
/// The handle is how other sessions and realms interact with a session: sending messages,
/// invoking procedures, and shutting it down. It can be freely cloned.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: Id,
        authorization: Option<ClientAuthorization>,
        message_tx: UnboundedSender<OutgoingMessage>,
        control_tx: UnboundedSender<SessionControl>,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                id,
                authorization,
                message_tx,
                control_tx,
                pending_invocations: Mutex::new(Some(HashMap::default())),
            }),
        }
    }

    /// Creates a handle with no session behind it, returning the channels the session would read.
    #[cfg(test)]
    pub(crate) fn detached(
        id: Id,
        authorization: Option<ClientAuthorization>,
    ) -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<OutgoingMessage>,
        tokio::sync::mpsc::UnboundedReceiver<SessionControl>,
    ) {
        let (message_tx, message_rx) = tokio::sync::mpsc::unbounded_channel();
        let (control_tx, control_rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Self::new(id, authorization, message_tx, control_tx),
            message_rx,
            control_rx,
        )
    }

    /// The session ID.
    pub fn id(&self) -> Id {
        self.shared.id
    }

    /// The authorization attached to the session's connection, if any.
    pub fn authorization(&self) -> Option<&ClientAuthorization> {
        self.shared.authorization.as_ref()
    }

    /// Sends a message over the session, without waiting for it to be written.
    pub fn send_message(&self, message: Message) -> Result<()> {
        self.shared
            .message_tx
            .send(OutgoingMessage {
                message,
                sent_tx: None,
            })
            .map_err(|_| Error::msg(format!("session {} is closed", self.id())))
    }

    /// Queues a message for sending.
    ///
    /// The message is queued immediately, so messages queued in order are sent in order. The
    /// returned future resolves once the message has been written to the transport, or has failed
    /// to be.
    pub fn queue_message(&self, message: Message) -> BoxFuture<'static, Result<()>> {
        let (outgoing, sent_rx) = OutgoingMessage::with_completion(message);
        let queued = self
            .shared
            .message_tx
            .send(outgoing)
            .map_err(|_| Error::msg(format!("session {} is closed", self.id())));
        async move {
            queued?;
            sent_rx.await?
        }
        .boxed()
    }

    /// Delivers an INVOCATION to the session, returning a receiver for the callee's response.
    ///
    /// Fails if the session has closed.
    pub async fn invoke(
        &self,
        invocation: Id,
        registration: Id,
        arguments: Option<List>,
        arguments_keyword: Option<Dictionary>,
    ) -> Result<oneshot::Receiver<InvocationResult>> {
        let (result_tx, result_rx) = oneshot::channel();
        {
            let mut pending_invocations = self.shared.pending_invocations.lock().await;
            pending_invocations
                .as_mut()
                .ok_or(InteractionError::Canceled)?
                .insert(invocation, result_tx);
        }
        let sent = self.send_message(Message::Invocation(InvocationMessage {
            request: invocation,
            registered_registration: registration,
            details: Dictionary::default(),
            call_arguments: arguments,
            call_arguments_keyword: arguments_keyword,
        }));
        if sent.is_err() {
            if let Some(pending_invocations) =
                self.shared.pending_invocations.lock().await.as_mut()
            {
                pending_invocations.remove(&invocation);
            }
            return Err(InteractionError::Canceled.into());
        }
        Ok(result_rx)
    }

    /// Resolves a pending invocation with the callee's response.
    ///
    /// Returns whether a pending invocation was resolved.
    pub async fn complete_invocation(&self, invocation: Id, result: InvocationResult) -> bool {
        let result_tx = match self.shared.pending_invocations.lock().await.as_mut() {
            Some(pending_invocations) => pending_invocations.remove(&invocation),
            None => None,
        };
        match result_tx {
            Some(result_tx) => {
                result_tx.send(result).ok();
                true
            }
            None => false,
        }
    }

    /// Cancels all pending invocations, and rejects any future ones.
    pub async fn cancel_invocations(&self) {
        let pending_invocations = self.shared.pending_invocations.lock().await.take();
        if let Some(pending_invocations) = pending_invocations {
            if !pending_invocations.is_empty() {
                debug!(
                    "Canceled {} pending invocations of session {}",
                    pending_invocations.len(),
                    self.id()
                );
            }
        }
    }

    /// Shuts down the session cleanly.
    ///
    /// The returned receiver resolves once the session has closed.
    pub fn shut_down(&self, close_reason: CloseReason) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        // If the session is already gone, the sender is dropped and the receiver resolves.
        self.shared
            .control_tx
            .send(SessionControl::ShutDown {
                close_reason,
                done_tx,
            })
            .ok();
        done_rx
    }

    /// Closes the session immediately.
    pub fn close(&self) {
        self.shared.control_tx.send(SessionControl::Close).ok();
    }
}

impl Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

/// The state of a router session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for HELLO.
    #[default]
    Establishing,
    /// Joined to a realm.
    Established,
    /// The peer said GOODBYE, and the router is acknowledging it.
    Closing,
    /// The router said GOODBYE, and is waiting for the peer to acknowledge it.
    ShuttingDown,
    Closed,
}

impl SessionState {
    /// Checks if a message can be received in this state.
    ///
    /// ABORT is handled separately, since it is accepted in every open state.
    pub fn allows(&self, message: &Message) -> bool {
        match self {
            Self::Establishing => matches!(message, Message::Hello(_)),
            Self::Established => match message {
                Message::Subscribe(_)
                | Message::Unsubscribe(_)
                | Message::Publish(_)
                | Message::Register(_)
                | Message::Unregister(_)
                | Message::Call(_)
                | Message::Yield(_)
                | Message::Goodbye(_) => true,
                Message::Error(message) => message.request_type == INVOCATION_TAG,
                _ => false,
            },
            Self::ShuttingDown => matches!(message, Message::Goodbye(_)),
            Self::Closing | Self::Closed => false,
        }
    }
}

/// The router end of a WAMP session.
///
/// Handles WAMP messages in a state machine and holds all session-scoped state. A session is
/// driven by exactly one task, so its state is never shared.
pub(crate) struct Session {
    handle: SessionHandle,
    context: RouterContext,
    state: SessionState,
    realm: Option<Arc<Realm>>,
    shutdown_done_tx: Vec<oneshot::Sender<()>>,
}

impl Session {
    /// Creates a new session.
    pub fn new(handle: SessionHandle, context: RouterContext) -> Self {
        Self {
            handle,
            context,
            state: SessionState::default(),
            realm: None,
            shutdown_done_tx: Vec::default(),
        }
    }

    /// The session ID.
    pub fn id(&self) -> Id {
        self.handle.id()
    }

    /// The current state of the session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Checks if the session is closed.
    pub fn closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    fn realm(&self) -> Result<Arc<Realm>> {
        self.realm
            .clone()
            .ok_or_else(|| Error::msg("session has not joined a realm"))
    }

    /// Handles a message received from the peer.
    pub async fn handle_message(&mut self, message: IncomingMessage) {
        if self.closed() {
            return;
        }
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                warn!("Session {} received a malformed message: {err:#}", self.id());
                return self
                    .abort(InteractionError::ProtocolViolation(format!("{err:#}")).into())
                    .await;
            }
        };
        debug!(
            "Session {} received {} message",
            self.id(),
            message.message_name()
        );

        if let Message::Abort(abort) = &message {
            warn!("Session {} aborted by peer: {}", self.id(), abort.reason);
            return self.close().await;
        }
        if !self.state.allows(&message) {
            let err = InteractionError::ProtocolViolation(format!(
                "received {} message in the {:?} state",
                message.message_name(),
                self.state
            ));
            return self.abort(err.into()).await;
        }

        let result = match &message {
            Message::Hello(hello) => return self.handle_hello(hello).await,
            Message::Goodbye(_) => return self.handle_goodbye().await,
            Message::Subscribe(subscribe) => self.handle_subscribe(subscribe).await,
            Message::Unsubscribe(unsubscribe) => self.handle_unsubscribe(unsubscribe).await,
            Message::Publish(publish) => self.handle_publish(publish).await,
            Message::Register(register) => self.handle_register(register).await,
            Message::Unregister(unregister) => self.handle_unregister(unregister).await,
            Message::Call(call) => self.handle_call(call).await,
            Message::Yield(message) => {
                self.handle_yield(message).await;
                Ok(())
            }
            Message::Error(error) => {
                self.handle_invocation_error(error).await;
                Ok(())
            }
            _ => {
                let err = InteractionError::ProtocolViolation(format!(
                    "no handler for {} message",
                    message.message_name()
                ));
                return self.abort(err.into()).await;
            }
        };
        if let Err(err) = result {
            debug!(
                "Session {} failed to handle {} message: {err:#}",
                self.id(),
                message.message_name()
            );
            self.send_message(error_for_request(&message, &err));
        }
    }

    fn send_message(&self, message: Message) {
        // A session whose service has ended is closed as soon as its incoming channel closes.
        if let Err(err) = self.handle.send_message(message) {
            debug!("Failed to send message: {err:#}");
        }
    }

    async fn abort(&mut self, error: Error) {
        self.send_message(abort_message_for_error(&error));
        self.close().await;
    }

    fn welcome_details(&self) -> Dictionary {
        let config = self.context.config();
        Dictionary::from_iter([
            ("agent".to_owned(), Value::String(config.agent.clone())),
            (
                "roles".to_owned(),
                Value::Dictionary(
                    config
                        .roles
                        .iter()
                        .map(|role| {
                            (
                                role.key_for_details().to_owned(),
                                Value::Dictionary(Dictionary::default()),
                            )
                        })
                        .collect(),
                ),
            ),
        ])
    }

    async fn handle_hello(&mut self, message: &HelloMessage) {
        if let Err(err) = self.join_realm(message).await {
            info!(
                "Session {} failed to join realm {}: {err:#}",
                self.id(),
                message.realm
            );
            self.abort(err).await;
        }
    }

    async fn join_realm(&mut self, message: &HelloMessage) -> Result<()> {
        let realm = self
            .context
            .realm(&message.realm)
            .ok_or(InteractionError::NoSuchRealm)?;
        if let Some(authorization) = self.handle.authorization() {
            if !authorization
                .policy
                .authorize_hello(&authorization.client, realm.uri())
                .await
            {
                return Err(InteractionError::NotAuthorized.into());
            }
        }

        realm.add_session(self.handle.clone()).await;
        info!("Session {} joined realm {}", self.id(), realm.uri());
        self.realm = Some(realm);
        self.state = SessionState::Established;
        self.handle.send_message(Message::Welcome(WelcomeMessage {
            session: self.id(),
            details: self.welcome_details(),
        }))
    }

    async fn handle_goodbye(&mut self) {
        match self.state {
            SessionState::Established => {
                self.state = SessionState::Closing;
                self.send_message(goodbye_and_out());
                self.close().await;
            }
            SessionState::ShuttingDown => self.close().await,
            _ => (),
        }
    }

    async fn handle_subscribe(&mut self, message: &SubscribeMessage) -> Result<()> {
        let realm = self.realm()?;
        if let Some(authorization) = self.handle.authorization() {
            if !authorization
                .policy
                .authorize_subscribe(&authorization.client, realm.uri(), &message.topic)
                .await
            {
                return Err(InteractionError::NotAuthorized.into());
            }
        }

        // SUBSCRIBED is queued before any EVENT for the new subscription can be.
        let handle = self.handle.clone();
        let (_, sent) = realm
            .add_subscription_with(
                self.handle.clone(),
                message.topic.clone(),
                |subscription| {
                    handle.send_message(Message::Subscribed(SubscribedMessage {
                        subscribe_request: message.request,
                        subscription,
                    }))
                },
            )
            .await;
        sent
    }

    async fn handle_unsubscribe(&mut self, message: &UnsubscribeMessage) -> Result<()> {
        let realm = self.realm()?;
        if !realm
            .remove_subscription(self.id(), message.subscribed_subscription)
            .await
        {
            return Err(InteractionError::NoSuchSubscription.into());
        }
        self.handle
            .send_message(Message::Unsubscribed(UnsubscribedMessage {
                unsubscribe_request: message.request,
            }))
    }

    async fn handle_publish(&mut self, message: &PublishMessage) -> Result<()> {
        let realm = self.realm()?;
        if let Some(authorization) = self.handle.authorization() {
            if !authorization
                .policy
                .authorize_publish(&authorization.client, realm.uri(), &message.topic)
                .await
            {
                return Err(InteractionError::NotAuthorized.into());
            }
        }

        // Events are queued here, so that publications from one session are delivered in order.
        let publication = realm
            .start_publish(
                &message.topic,
                message.arguments.clone(),
                message.arguments_keyword.clone(),
            )
            .await;
        debug!(
            "Session {} published {} to {} subscribers",
            self.id(),
            publication.id(),
            publication.deliveries()
        );
        let handle = self.handle.clone();
        let publish_request = message.request;
        tokio::spawn(async move {
            let publication = publication.complete().await;
            handle
                .send_message(Message::Published(PublishedMessage {
                    publish_request,
                    publication,
                }))
                .ok();
        });
        Ok(())
    }

    async fn handle_register(&mut self, message: &RegisterMessage) -> Result<()> {
        let realm = self.realm()?;
        if let Some(authorization) = self.handle.authorization() {
            if !authorization
                .policy
                .authorize_register(&authorization.client, realm.uri(), &message.procedure)
                .await
            {
                return Err(InteractionError::NotAuthorized.into());
            }
        }

        let handle = self.handle.clone();
        let (_, sent) = realm
            .add_registration_with(
                self.handle.clone(),
                message.procedure.clone(),
                |registration| {
                    handle.send_message(Message::Registered(RegisteredMessage {
                        register_request: message.request,
                        registration,
                    }))
                },
            )
            .await?;
        sent
    }

    async fn handle_unregister(&mut self, message: &UnregisterMessage) -> Result<()> {
        let realm = self.realm()?;
        if !realm
            .remove_registration(self.id(), message.registered_registration)
            .await
        {
            return Err(InteractionError::NoSuchRegistration.into());
        }
        self.handle
            .send_message(Message::Unregistered(UnregisteredMessage {
                unregister_request: message.request,
            }))
    }

    async fn handle_call(&mut self, message: &CallMessage) -> Result<()> {
        let realm = self.realm()?;
        // Checked before the procedure is looked up, so that unauthorized callers cannot probe for
        // registered procedures.
        if let Some(authorization) = self.handle.authorization() {
            if !authorization
                .policy
                .authorize_call(&authorization.client, realm.uri(), &message.procedure)
                .await
            {
                return Err(InteractionError::NotAuthorized.into());
            }
        }

        let pending = realm
            .start_call(
                &message.procedure,
                message.arguments.clone(),
                message.arguments_keyword.clone(),
            )
            .await?;
        debug!(
            "Session {} called {} with invocation {}",
            self.id(),
            message.procedure,
            pending.id()
        );
        let handle = self.handle.clone();
        let call_request = message.request;
        tokio::spawn(async move {
            let reply = match pending.result().await {
                Ok(rpc_yield) => Message::Result(ResultMessage {
                    call_request,
                    details: Dictionary::default(),
                    yield_arguments: rpc_yield.arguments,
                    yield_arguments_keyword: rpc_yield.arguments_keyword,
                }),
                Err(err) => call_error(
                    call_request,
                    err.error,
                    err.details,
                    err.arguments,
                    err.arguments_keyword,
                ),
            };
            handle.send_message(reply).ok();
        });
        Ok(())
    }

    async fn handle_yield(&mut self, message: &YieldMessage) {
        let resolved = self
            .handle
            .complete_invocation(
                message.invocation_request,
                Ok(RpcYield {
                    arguments: message.arguments.clone(),
                    arguments_keyword: message.arguments_keyword.clone(),
                }),
            )
            .await;
        if !resolved {
            debug!(
                "Session {} yielded for unknown invocation {}",
                self.id(),
                message.invocation_request
            );
        }
    }

    async fn handle_invocation_error(&mut self, message: &ErrorMessage) {
        let resolved = self
            .handle
            .complete_invocation(
                message.request,
                Err(RpcError {
                    error: message.error.clone(),
                    details: message.details.clone(),
                    arguments: message.arguments.clone(),
                    arguments_keyword: message.arguments_keyword.clone(),
                }),
            )
            .await;
        if !resolved {
            debug!(
                "Session {} reported an error for unknown invocation {}",
                self.id(),
                message.request
            );
        }
    }

    /// Handles a control signal for the session.
    pub async fn handle_control(&mut self, control: SessionControl) {
        match control {
            SessionControl::ShutDown {
                close_reason,
                done_tx,
            } => self.shut_down(close_reason, done_tx).await,
            SessionControl::Close => self.close().await,
        }
    }

    async fn shut_down(&mut self, close_reason: CloseReason, done_tx: oneshot::Sender<()>) {
        match self.state {
            SessionState::Establishing => {
                self.shutdown_done_tx.push(done_tx);
                self.send_message(abort_message_with_reason(
                    close_reason.uri(),
                    Dictionary::default(),
                ));
                self.close().await;
            }
            SessionState::Established => {
                info!("Shutting down session {}: {}", self.id(), close_reason.uri());
                self.shutdown_done_tx.push(done_tx);
                self.send_message(goodbye_with_close_reason(close_reason));
                self.state = SessionState::ShuttingDown;
            }
            SessionState::ShuttingDown => self.shutdown_done_tx.push(done_tx),
            SessionState::Closing | SessionState::Closed => {
                done_tx.send(()).ok();
            }
        }
    }

    /// Closes the session, releasing everything it holds.
    ///
    /// Closing is idempotent.
    pub async fn close(&mut self) {
        if self.closed() {
            return;
        }
        self.state = SessionState::Closed;
        if let Some(realm) = self.realm.take() {
            realm.remove_session(self.id()).await;
            info!("Session {} left realm {}", self.id(), realm.uri());
        }
        self.handle.cancel_invocations().await;
        if let Some(authorization) = self.handle.authorization() {
            authorization
                .policy
                .release_connection(&authorization.client)
                .await;
        }
        self.context.remove_session(self.id()).await;
        for done_tx in self.shutdown_done_tx.drain(..) {
            done_tx.send(()).ok();
        }
        debug!("Session {} closed", self.id());
    }
}
