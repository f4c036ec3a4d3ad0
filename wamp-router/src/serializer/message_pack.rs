use std::io::Cursor;

use anyhow::Result;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    core::types::{
        Integer,
        Value,
    },
    message::{
        fields::MessageFields,
        message::Message,
    },
    serializer::serializer::{
        Serializer,
        decode_envelope,
        malformed,
    },
};

/// A serializer implemented for MessagePack.
#[derive(Debug, Default)]
pub struct MessagePackSerializer {}

impl Serializer for MessagePackSerializer {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&message.envelope())?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Integer, MessageFields)> {
        let mut cursor = Cursor::new(bytes);
        let envelope = Value::deserialize(&mut rmp_serde::Deserializer::new(&mut cursor))
            .map_err(malformed)?;
        // A single message per frame.
        if cursor.position() as usize != bytes.len() {
            return Err(malformed(TrailingBytes));
        }
        decode_envelope(envelope)
    }
}

#[derive(Debug, Error)]
#[error("trailing bytes after message")]
struct TrailingBytes;

#[cfg(test)]
mod message_pack_test {
    use crate::{
        core::{
            error::DecodeError,
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
        },
        message::message::{
            EventMessage,
            Message,
            sample_messages,
        },
        serializer::{
            message_pack::MessagePackSerializer,
            serializer::Serializer,
        },
    };

    #[test]
    fn round_trips_every_message() {
        let serializer = MessagePackSerializer::default();
        for message in sample_messages() {
            let serialized = serializer.serialize(&message).unwrap();
            assert_matches::assert_matches!(serializer.deserialize(&serialized), Ok(deserialized) => {
                pretty_assertions::assert_eq!(deserialized, message);
            });
        }
    }

    #[test]
    fn round_trips_binary_values() {
        let serializer = MessagePackSerializer::default();
        let message = Message::Event(EventMessage {
            subscribed_subscription: Id::MIN,
            published_publication: Id::MAX,
            details: Dictionary::default(),
            publish_arguments: Some(List::from_iter([Value::Bytes(vec![0, 1, 255])])),
            publish_arguments_keyword: Some(Dictionary::from_iter([(
                "blob".to_owned(),
                Value::Bytes(Vec::default()),
            )])),
        });
        let serialized = serializer.serialize(&message).unwrap();
        assert_matches::assert_matches!(serializer.deserialize(&serialized), Ok(deserialized) => {
            pretty_assertions::assert_eq!(deserialized, message);
        });
    }

    #[test]
    fn encodes_compact_array() {
        let serializer = MessagePackSerializer::default();
        let message = Message::Event(EventMessage {
            subscribed_subscription: Id::MIN,
            published_publication: Id::try_from(2).unwrap(),
            details: Dictionary::default(),
            publish_arguments: None,
            publish_arguments_keyword: None,
        });
        // fixarray(4), 36, 1, 2, fixmap(0)
        assert_matches::assert_matches!(serializer.serialize(&message), Ok(serialized) => {
            assert_eq!(serialized, [0x94, 0x24, 0x01, 0x02, 0x80]);
        });
    }

    #[test]
    fn encodes_null_and_negative_integers() {
        let serializer = MessagePackSerializer::default();
        let message = Message::Event(EventMessage {
            subscribed_subscription: Id::MIN,
            published_publication: Id::try_from(2).unwrap(),
            details: Dictionary::default(),
            publish_arguments: Some(List::from_iter([Value::Null, Value::SignedInteger(-1)])),
            publish_arguments_keyword: Some(Dictionary::default()),
        });
        // fixarray(6), 36, 1, 2, fixmap(0), fixarray(2), nil, negative fixint(-1), fixmap(0)
        let serialized = serializer.serialize(&message).unwrap();
        assert_eq!(
            serialized,
            [0x96, 0x24, 0x01, 0x02, 0x80, 0x92, 0xc0, 0xff, 0x80]
        );
        assert_matches::assert_matches!(serializer.deserialize(&serialized), Ok(deserialized) => {
            pretty_assertions::assert_eq!(deserialized, message);
        });

        // An empty argument list survives, even without keyword arguments.
        assert_matches::assert_matches!(
            serializer.deserialize(&[0x95, 0x24, 0x01, 0x02, 0x80, 0x90]),
            Ok(Message::Event(event)) => {
                assert_eq!(event.publish_arguments, Some(List::default()));
                assert_eq!(event.publish_arguments_keyword, None);
            }
        );
    }

    #[track_caller]
    fn assert_decode_error(bytes: &[u8]) {
        let serializer = MessagePackSerializer::default();
        assert_matches::assert_matches!(serializer.deserialize(bytes), Err(err) => {
            assert!(err.downcast_ref::<DecodeError>().is_some(), "{err:#}");
        });
    }

    #[test]
    fn fails_malformed_envelopes() {
        // Empty input.
        assert_decode_error(&[]);
        // Empty array.
        assert_decode_error(&[0x90]);
        // Map instead of array.
        assert_decode_error(&[0x80]);
        // String type code.
        assert_decode_error(&[0x91, 0xa1, b'x']);
        // Two messages in one frame.
        assert_decode_error(&[0x92, 0x23, 0x01, 0x92, 0x23, 0x01]);
        // Truncated array.
        assert_decode_error(&[0x93, 0x23]);
    }

    #[test]
    fn fails_unknown_message_type() {
        let serializer = MessagePackSerializer::default();
        assert_matches::assert_matches!(serializer.decode(&[0x91, 0x05]), Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<DecodeError>(), Some(DecodeError::UnknownMessageType(5)));
        });
    }
}
