use anyhow::{
    Error,
    Result,
};
use futures_util::{
    SinkExt,
    StreamExt,
};
use log::{
    debug,
    error,
};
use tokio::{
    sync::{
        broadcast,
        mpsc::{
            UnboundedReceiver,
            UnboundedSender,
            unbounded_channel,
        },
        oneshot,
    },
    task::JoinHandle,
};

use crate::{
    core::stream::{
        MessageStream,
        StreamMessage,
    },
    message::message::Message,
};

/// A message queued for sending, with an optional signal for when it has been written to the
/// transport.
#[derive(Debug)]
pub struct OutgoingMessage {
    pub message: Message,
    pub sent_tx: Option<oneshot::Sender<Result<()>>>,
}

impl OutgoingMessage {
    /// Creates a message whose completion is reported on the returned receiver.
    pub fn with_completion(message: Message) -> (Self, oneshot::Receiver<Result<()>>) {
        let (sent_tx, sent_rx) = oneshot::channel();
        (
            Self {
                message,
                sent_tx: Some(sent_tx),
            },
            sent_rx,
        )
    }
}

/// A message received by a [`Service`].
///
/// An error indicates the frame could not be decoded.
pub type IncomingMessage = Result<Message>;

/// A handle to an asynchronously-running [`Service`].
pub struct ServiceHandle {
    start_handle: JoinHandle<()>,
    cancel_tx: broadcast::Sender<()>,
    message_tx: UnboundedSender<OutgoingMessage>,
}

impl ServiceHandle {
    /// Joins the task running the service.
    pub async fn join(self) -> Result<()> {
        self.start_handle.await.map_err(Error::new)
    }

    /// Cancels the service.
    ///
    /// Cancellation is the correct way to cleanly exit a service. Messages already queued are
    /// written before the underlying stream is closed.
    pub fn cancel(&self) -> Result<()> {
        self.cancel_tx.send(()).map(|_| ()).map_err(Error::new)
    }

    /// The message transmission channel.
    pub fn message_tx(&self) -> UnboundedSender<OutgoingMessage> {
        self.message_tx.clone()
    }
}

/// The core asynchronous service that sends and receives WAMP messages over an underlying
/// transport.
///
/// Received messages are passed to a channel for the session to process. Frames that fail to
/// decode are passed along as errors, so that the session can decide how to terminate.
///
/// The service ends when the stream ends, when writing to the stream fails, or when canceled. In
/// every case, the incoming message channel is closed.
pub struct Service {
    name: String,
    stream: MessageStream,
    message_tx: UnboundedSender<IncomingMessage>,
    cancel_tx: broadcast::Sender<()>,
    cancel_rx: broadcast::Receiver<()>,

    user_message_tx: UnboundedSender<OutgoingMessage>,
    user_message_rx: UnboundedReceiver<OutgoingMessage>,
}

impl Service {
    /// Creates a new service with the given message stream.
    ///
    /// Returns the service and the receiver for incoming messages.
    pub fn new(name: String, stream: MessageStream) -> (Self, UnboundedReceiver<IncomingMessage>) {
        let (message_tx, message_rx) = unbounded_channel();
        let (cancel_tx, cancel_rx) = broadcast::channel(1);
        let (user_message_tx, user_message_rx) = unbounded_channel();
        (
            Self {
                name,
                stream,
                message_tx,
                cancel_tx,
                cancel_rx,
                user_message_tx,
                user_message_rx,
            },
            message_rx,
        )
    }

    /// Starts the service asynchronously.
    ///
    /// This method takes ownership of the service. All future interactions with the service should
    /// be made through the returned handle.
    pub fn start(self) -> ServiceHandle {
        let cancel_tx = self.cancel_tx.clone();
        let message_tx = self.user_message_tx.clone();
        let start_handle = tokio::spawn(self.run());
        ServiceHandle {
            start_handle,
            cancel_tx,
            message_tx,
        }
    }

    async fn run(mut self) {
        if let Err(err) = self.service_loop().await {
            error!("Service {} failed: {err:#}", self.name);
        }
        self.end().await;
    }

    async fn send_message(&mut self, outgoing: OutgoingMessage) -> Result<()> {
        let message_name = outgoing.message.message_name();
        let result = self
            .stream
            .send(StreamMessage::Message(outgoing.message))
            .await;
        match result {
            Ok(()) => {
                if let Some(sent_tx) = outgoing.sent_tx {
                    sent_tx.send(Ok(())).ok();
                }
                Ok(())
            }
            Err(err) => {
                if let Some(sent_tx) = outgoing.sent_tx {
                    sent_tx
                        .send(Err(Error::msg(format!(
                            "failed to send {message_name} message: {err:#}"
                        ))))
                        .ok();
                }
                Err(err.context(format!("failed to send {message_name} message")))
            }
        }
    }

    async fn service_loop(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                message = self.stream.next() => {
                    match message {
                        Some(Ok(StreamMessage::Ping(data))) => {
                            // Ping the message back.
                            self.stream.send(StreamMessage::Ping(data)).await?;
                        }
                        Some(Ok(StreamMessage::Message(message))) => {
                            // Send the message out for handling.
                            self.message_tx.send(Ok(message)).map_err(Error::new)?;
                        }
                        Some(Ok(StreamMessage::Malformed(err))) => {
                            self.message_tx.send(Err(err)).map_err(Error::new)?;
                        }
                        Some(Err(err)) => {
                            return Err(err.context("failed to read from stream"));
                        }
                        None => {
                            debug!("Stream for service {} ended", self.name);
                            return Ok(());
                        }
                    }
                }
                message = self.user_message_rx.recv() => {
                    match message {
                        Some(message) => self.send_message(message).await?,
                        None => return Err(Error::msg("user message stream closed")),
                    }
                }
                // We expect that cancellation is the correct way to cleanly exit the service.
                _ = self.cancel_rx.recv() => {
                    while let Ok(message) = self.user_message_rx.try_recv() {
                        self.send_message(message).await?;
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn end(&mut self) {
        // Ignore error with the stream, since it may already be closed.
        self.stream.close().await.ok();
        // Pending completions observe the service ending.
        self.user_message_rx.close();
        while let Ok(message) = self.user_message_rx.try_recv() {
            if let Some(sent_tx) = message.sent_tx {
                sent_tx.send(Err(Error::msg("service ended"))).ok();
            }
        }
    }
}
