use std::fmt::Debug;

use anyhow::{
    Error,
    Result,
};

use crate::{
    core::{
        error::DecodeError,
        types::{
            Integer,
            Value,
        },
        uri::Uri,
    },
    message::{
        fields::MessageFields,
        message::{
            Message,
            is_known_tag,
        },
    },
    serializer::{
        json::JsonSerializer,
        message_pack::MessagePackSerializer,
    },
};

/// The type of serializer to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SerializerType {
    /// Serializes messages to and from JavaScript Object Notation.
    Json,
    /// Serializes messages to and from the MessagePack format.
    MessagePack,
}

impl SerializerType {
    /// The protocol URI used during protocol negotiation.
    pub fn uri(&self) -> Uri {
        match self {
            Self::Json => Uri::from_known("wamp.2.json"),
            Self::MessagePack => Uri::from_known("wamp.2.msgpack"),
        }
    }
}

impl TryFrom<&str> for SerializerType {
    type Error = &'static str;
    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "wamp.2.json" => Ok(Self::Json),
            "wamp.2.msgpack" => Ok(Self::MessagePack),
            _ => Err("unsupported serializer"),
        }
    }
}

/// A serializer, which serializes and deserializes WAMP messages to a well-known format that can be
/// passed over wire.
///
/// Does not implement message batching.
pub trait Serializer: Send + Sync + Debug {
    /// Serializes the given message to bytes.
    fn serialize(&self, message: &Message) -> Result<Vec<u8>>;

    /// Decodes bytes to a message type and a reader over the message's fields.
    fn decode(&self, bytes: &[u8]) -> Result<(Integer, MessageFields)>;

    /// Deserializes bytes to a message.
    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        let (tag, fields) = self.decode(bytes)?;
        Message::from_fields(tag, &fields)
    }
}

/// Splits a deserialized value into a message type and fields, rejecting unknown message types.
pub(crate) fn decode_envelope(envelope: Value) -> Result<(Integer, MessageFields)> {
    let (tag, fields) = MessageFields::from_envelope(envelope)?;
    if !is_known_tag(tag) {
        return Err(DecodeError::UnknownMessageType(tag).into());
    }
    Ok((tag, fields))
}

/// Wraps a format-level parse failure so that it is reported as a malformed envelope.
pub(crate) fn malformed<E>(error: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::new(error).context(DecodeError::MalformedEnvelope)
}

/// Creates a new [`Serializer`] for the given type.
pub fn new_serializer(serializer_type: SerializerType) -> Box<dyn Serializer> {
    match serializer_type {
        SerializerType::Json => Box::new(JsonSerializer::default()),
        SerializerType::MessagePack => Box::new(MessagePackSerializer::default()),
    }
}
