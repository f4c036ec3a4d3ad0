use anyhow::{
    Error,
    Result,
};

use crate::core::{
    error::DecodeError,
    id::Id,
    types::{
        Dictionary,
        Integer,
        List,
        Value,
    },
    uri::Uri,
};

/// Positional reader over the fields of a decoded message, independent of the wire encoding.
///
/// Index 0 is the first field after the message type.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MessageFields {
    fields: List,
}

impl MessageFields {
    /// Creates a reader over the given fields.
    pub fn new(fields: List) -> Self {
        Self { fields }
    }

    /// Splits a decoded envelope into its message type and fields.
    ///
    /// The envelope must be a non-empty list that begins with an integer message type.
    pub fn from_envelope(envelope: Value) -> Result<(Integer, Self), DecodeError> {
        let mut list = match envelope {
            Value::List(list) => list,
            _ => return Err(DecodeError::MalformedEnvelope),
        };
        if list.is_empty() {
            return Err(DecodeError::MalformedEnvelope);
        }
        let tag = match list.remove(0) {
            Value::Integer(tag) => tag,
            _ => return Err(DecodeError::MalformedEnvelope),
        };
        Ok((tag, Self::new(list)))
    }

    /// The number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Checks if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn get(&self, index: usize) -> Result<&Value, DecodeError> {
        self.fields
            .get(index)
            .ok_or(DecodeError::MissingField { index })
    }

    fn wrong_kind(index: usize, expected: &'static str, found: &Value) -> DecodeError {
        DecodeError::WrongKind {
            index,
            expected,
            found: found.kind(),
        }
    }

    /// Reads a string.
    pub fn string(&self, index: usize) -> Result<&str, DecodeError> {
        let value = self.get(index)?;
        value
            .string()
            .ok_or_else(|| Self::wrong_kind(index, "string", value))
    }

    /// Reads a string and validates it as a URI.
    pub fn uri(&self, index: usize) -> Result<Uri> {
        let value = self.string(index)?;
        Uri::try_from(value)
            .map_err(|err| Error::new(err).context(format!("invalid URI at index {index}")))
    }

    /// Reads an integer.
    pub fn integer(&self, index: usize) -> Result<Integer, DecodeError> {
        let value = self.get(index)?;
        value
            .integer()
            .ok_or_else(|| Self::wrong_kind(index, "integer", value))
    }

    /// Reads an integer and validates it as an ID.
    pub fn id(&self, index: usize) -> Result<Id> {
        let value = self.integer(index)?;
        Id::try_from(value).map_err(|err| Error::new(err).context(format!("invalid ID at index {index}")))
    }

    /// Reads a dictionary.
    pub fn dictionary(&self, index: usize) -> Result<Dictionary, DecodeError> {
        let value = self.get(index)?;
        value
            .dictionary()
            .cloned()
            .ok_or_else(|| Self::wrong_kind(index, "dictionary", value))
    }

    /// Reads a list.
    pub fn list(&self, index: usize) -> Result<List, DecodeError> {
        let value = self.get(index)?;
        value
            .list()
            .cloned()
            .ok_or_else(|| Self::wrong_kind(index, "list", value))
    }

    /// Reads a trailing list, which may be absent.
    pub fn optional_list(&self, index: usize) -> Result<Option<List>, DecodeError> {
        if index >= self.len() {
            return Ok(None);
        }
        self.list(index).map(Some)
    }

    /// Reads a trailing dictionary, which may be absent.
    pub fn optional_dictionary(&self, index: usize) -> Result<Option<Dictionary>, DecodeError> {
        if index >= self.len() {
            return Ok(None);
        }
        self.dictionary(index).map(Some)
    }
}

#[cfg(test)]
mod fields_test {
    use crate::{
        core::{
            error::DecodeError,
            id::IdOutOfRange,
            types::{
                Dictionary,
                List,
                Value,
            },
            uri::InvalidUri,
        },
        message::fields::MessageFields,
    };

    fn fields() -> MessageFields {
        MessageFields::new(List::from_iter([
            Value::Integer(5432),
            Value::Dictionary(Dictionary::default()),
            Value::String("my.topic".to_owned()),
            Value::List(List::from_iter([Value::Bool(true)])),
        ]))
    }

    #[test]
    fn reads_fields_by_position() {
        let fields = fields();
        assert_eq!(fields.len(), 4);
        assert_matches::assert_matches!(fields.integer(0), Ok(5432));
        assert_matches::assert_matches!(fields.id(0), Ok(id) => {
            assert_eq!(id.value(), 5432);
        });
        assert_matches::assert_matches!(fields.dictionary(1), Ok(dictionary) => {
            assert!(dictionary.is_empty());
        });
        assert_matches::assert_matches!(fields.string(2), Ok("my.topic"));
        assert_matches::assert_matches!(fields.uri(2), Ok(uri) => {
            assert_eq!(uri.as_ref(), "my.topic");
        });
        assert_matches::assert_matches!(fields.list(3), Ok(list) => {
            assert_eq!(list, List::from_iter([Value::Bool(true)]));
        });
    }

    #[test]
    fn distinguishes_absent_trailing_fields() {
        let fields = fields();
        assert_matches::assert_matches!(fields.optional_list(3), Ok(Some(list)) => {
            assert_eq!(list, List::from_iter([Value::Bool(true)]));
        });
        assert_matches::assert_matches!(fields.optional_list(4), Ok(None));
        assert_matches::assert_matches!(fields.optional_dictionary(5), Ok(None));
        assert_matches::assert_matches!(fields.optional_dictionary(1), Ok(Some(dictionary)) => {
            assert!(dictionary.is_empty());
        });
        assert_matches::assert_matches!(
            fields.optional_dictionary(3),
            Err(DecodeError::WrongKind {
                index: 3,
                expected: "dictionary",
                found: "list"
            })
        );
    }

    #[test]
    fn fails_missing_or_mistyped_fields() {
        let fields = fields();
        assert_matches::assert_matches!(
            fields.string(4),
            Err(DecodeError::MissingField { index: 4 })
        );
        assert_matches::assert_matches!(
            fields.integer(2),
            Err(DecodeError::WrongKind {
                index: 2,
                expected: "integer",
                found: "string"
            })
        );
        assert_matches::assert_matches!(
            fields.dictionary(0),
            Err(DecodeError::WrongKind { index: 0, .. })
        );
    }

    #[test]
    fn fails_invalid_uris_and_ids() {
        let fields = MessageFields::new(List::from_iter([
            Value::String("my topic".to_owned()),
            Value::Integer(0),
        ]));
        assert_matches::assert_matches!(fields.uri(0), Err(err) => {
            assert!(err.downcast_ref::<InvalidUri>().is_some());
        });
        assert_matches::assert_matches!(fields.id(1), Err(err) => {
            assert!(err.downcast_ref::<IdOutOfRange>().is_some());
        });
    }

    #[test]
    fn splits_envelope() {
        assert_matches::assert_matches!(
            MessageFields::from_envelope(Value::List(List::from_iter([
                Value::Integer(1),
                Value::String("test.realm".to_owned()),
            ]))),
            Ok((1, fields)) => {
                assert_eq!(fields.len(), 1);
            }
        );
        assert_matches::assert_matches!(
            MessageFields::from_envelope(Value::List(List::default())),
            Err(DecodeError::MalformedEnvelope)
        );
        assert_matches::assert_matches!(
            MessageFields::from_envelope(Value::Dictionary(Dictionary::default())),
            Err(DecodeError::MalformedEnvelope)
        );
        assert_matches::assert_matches!(
            MessageFields::from_envelope(Value::List(List::from_iter([Value::String(
                "HELLO".to_owned()
            )]))),
            Err(DecodeError::MalformedEnvelope)
        );
    }
}
