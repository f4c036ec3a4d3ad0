use std::{
    pin::Pin,
    task,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
};

use crate::{
    message::message::Message,
    serializer::serializer::Serializer,
    transport::transport::{
        Transport,
        TransportData,
    },
};

/// An item flowing through a [`MessageStream`].
#[derive(Debug)]
pub enum StreamMessage {
    /// A health check, which should be sent back to the sender.
    Ping(Vec<u8>),
    /// A decoded WAMP message.
    Message(Message),
    /// A frame that arrived intact but could not be decoded as a WAMP message.
    ///
    /// Only produced when reading. The stream remains usable afterwards.
    Malformed(Error),
}

/// A stream of WAMP messages over a [`Transport`], encoded with a [`Serializer`].
#[derive(Debug)]
pub struct MessageStream {
    transport: Box<dyn Transport>,
    serializer: Box<dyn Serializer>,
}

impl MessageStream {
    pub fn new(transport: Box<dyn Transport>, serializer: Box<dyn Serializer>) -> Self {
        Self {
            transport,
            serializer,
        }
    }
}

impl Stream for MessageStream {
    type Item = Result<StreamMessage>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        match futures_util::ready!(self.transport.poll_next_unpin(cx)) {
            Some(Ok(TransportData::Ping(data))) => {
                task::Poll::Ready(Some(Ok(StreamMessage::Ping(data))))
            }
            Some(Ok(TransportData::Message(data))) => match self.serializer.deserialize(&data) {
                Ok(message) => task::Poll::Ready(Some(Ok(StreamMessage::Message(message)))),
                Err(err) => task::Poll::Ready(Some(Ok(StreamMessage::Malformed(err)))),
            },
            Some(Err(err)) => task::Poll::Ready(Some(Err(err))),
            None => task::Poll::Ready(None),
        }
    }
}

impl Sink<StreamMessage> for MessageStream {
    type Error = Error;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_ready_unpin(cx)
    }

    fn start_send(
        mut self: Pin<&mut Self>,
        item: StreamMessage,
    ) -> std::result::Result<(), Self::Error> {
        let data = match item {
            StreamMessage::Ping(data) => TransportData::Ping(data),
            StreamMessage::Message(message) => {
                TransportData::Message(self.serializer.serialize(&message)?)
            }
            StreamMessage::Malformed(err) => {
                return Err(err.context("malformed messages cannot be sent"));
            }
        };
        self.transport.start_send_unpin(data)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_flush_unpin(cx)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_close_unpin(cx)
    }
}
