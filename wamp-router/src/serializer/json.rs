use anyhow::Result;

use crate::{
    core::{
        error::InteractionError,
        types::{
            Integer,
            Value,
        },
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

/// A serializer implemented for JavaScript Object Notation.
///
/// JSON has no byte string type, so messages carrying binary values are refused.
#[derive(Debug, Default)]
pub struct JsonSerializer {}

impl Serializer for JsonSerializer {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        let envelope = message.envelope();
        if envelope.contains_bytes() {
            return Err(InteractionError::InvalidArgument(format!(
                "{} message contains binary data, which cannot be serialized to JSON",
                message.message_name()
            ))
            .into());
        }
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Integer, MessageFields)> {
        let envelope = serde_json::from_slice::<Value>(bytes).map_err(malformed)?;
        decode_envelope(envelope)
    }
}
