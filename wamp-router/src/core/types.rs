use std::fmt;

use serde::{
    Deserialize,
    Serialize,
    de::{
        MapAccess,
        SeqAccess,
        Visitor,
    },
    ser::{
        SerializeMap,
        SerializeSeq,
    },
};

use crate::core::hash::HashMap;

/// An integer type for WAMP messages.
pub type Integer = u64;

/// A negative integer, which only appears in application payloads.
pub type SignedInteger = i64;

/// A dictionary of key-value pairs.
pub type Dictionary = HashMap<String, Value>;

/// A sequence of values.
pub type List = Vec<Value>;

/// A value for WAMP messages.
///
/// Values are independent of any wire encoding. Both serializers read and write this model.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(Integer),
    /// Always negative. Non-negative integers decode as [`Value::Integer`].
    SignedInteger(SignedInteger),
    Float(f64),
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Dictionary(Dictionary),
    List(List),
}

impl Value {
    /// The value as an [`Integer`].
    pub fn integer(&self) -> Option<Integer> {
        match self {
            Self::Integer(val) => Some(*val),
            _ => None,
        }
    }

    /// The value as a [`SignedInteger`], if it fits.
    pub fn signed_integer(&self) -> Option<SignedInteger> {
        match self {
            Self::Integer(val) => SignedInteger::try_from(*val).ok(),
            Self::SignedInteger(val) => Some(*val),
            _ => None,
        }
    }

    /// Checks if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as a [`str`].
    pub fn string(&self) -> Option<&str> {
        match self {
            Self::String(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`bool`].
    pub fn bool(&self) -> Option<bool> {
        match self {
            Self::Bool(val) => Some(*val),
            _ => None,
        }
    }

    /// The value as a [`Dictionary`].
    pub fn dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`List`].
    pub fn list(&self) -> Option<&List> {
        match self {
            Self::List(val) => Some(val),
            _ => None,
        }
    }

    /// Checks if the value contains a byte string at any depth.
    pub fn contains_bytes(&self) -> bool {
        match self {
            Self::Bytes(_) => true,
            Self::Dictionary(val) => val.values().any(|val| val.contains_bytes()),
            Self::List(val) => val.iter().any(|val| val.contains_bytes()),
            _ => false,
        }
    }

    /// The kind of value, mostly for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) | Self::SignedInteger(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Dictionary(_) => "dictionary",
            Self::List(_) => "list",
        }
    }
}

impl From<Integer> for Value {
    fn from(value: Integer) -> Self {
        Self::Integer(value)
    }
}

impl From<SignedInteger> for Value {
    fn from(value: SignedInteger) -> Self {
        match Integer::try_from(value) {
            Ok(value) => Self::Integer(value),
            Err(_) => Self::SignedInteger(value),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl From<List> for Value {
    fn from(value: List) -> Self {
        Self::List(value)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Integer(val) => serializer.serialize_u64(*val),
            Self::SignedInteger(val) => serializer.serialize_i64(*val),
            Self::Float(val) => serializer.serialize_f64(*val),
            Self::String(val) => serializer.serialize_str(val),
            Self::Bool(val) => serializer.serialize_bool(*val),
            Self::Bytes(val) => serializer.serialize_bytes(val),
            Self::Dictionary(val) => {
                let mut map = serializer.serialize_map(Some(val.len()))?;
                for (key, val) in val {
                    map.serialize_entry(key, val)?;
                }
                map.end()
            }
            Self::List(val) => {
                let mut seq = serializer.serialize_seq(Some(val.len()))?;
                for val in val {
                    seq.serialize_element(val)?;
                }
                seq.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a WAMP value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Integer(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Bytes(v))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut list = List::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(value) = seq.next_element()? {
            list.push(value);
        }
        Ok(Value::List(list))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut dictionary = Dictionary::default();
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            dictionary.insert(key, value);
        }
        Ok(Value::Dictionary(dictionary))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}
