use std::{
    borrow::Cow,
    fmt::Display,
    sync::LazyLock,
};

use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
    de::{
        Unexpected,
        Visitor,
    },
};
use thiserror::Error;

/// Error for an invalid URI.
#[derive(Debug, Error)]
#[error("{uri:?} is not a valid URI")]
pub struct InvalidUri {
    uri: String,
}

impl InvalidUri {
    fn new<S>(uri: S) -> Self
    where
        S: Into<String>,
    {
        Self { uri: uri.into() }
    }
}

/// Validates a URI in the basic profile.
///
/// Components are separated by `.`, must be non-empty, and may not contain whitespace or `#`.
pub fn validate_uri<S>(uri: S) -> Result<(), InvalidUri>
where
    S: AsRef<str>,
{
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([^\s\.#]+\.)*([^\s\.#]+)$").unwrap());
    if !RE.is_match(uri.as_ref()) {
        return Err(InvalidUri::new(uri.as_ref()));
    }
    Ok(())
}

/// A uniform resource identifier, used in many aspects of WAMP messaging for identifying resources,
/// such as realms, topics, and procedures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Uri(Cow<'static, str>);

impl Uri {
    pub const INVALID_URI: Uri = Uri::from_static("wamp.error.invalid_uri");
    pub const NO_SUCH_PROCEDURE: Uri = Uri::from_static("wamp.error.no_such_procedure");
    pub const PROCEDURE_ALREADY_EXISTS: Uri =
        Uri::from_static("wamp.error.procedure_already_exists");
    pub const NO_SUCH_REGISTRATION: Uri = Uri::from_static("wamp.error.no_such_registration");
    pub const NO_SUCH_SUBSCRIPTION: Uri = Uri::from_static("wamp.error.no_such_subscription");
    pub const INVALID_ARGUMENT: Uri = Uri::from_static("wamp.error.invalid_argument");
    pub const SYSTEM_SHUTDOWN: Uri = Uri::from_static("wamp.close.system_shutdown");
    pub const CLOSE_REALM: Uri = Uri::from_static("wamp.close.close_realm");
    pub const GOODBYE_AND_OUT: Uri = Uri::from_static("wamp.close.goodbye_and_out");
    pub const PROTOCOL_VIOLATION: Uri = Uri::from_static("wamp.error.protocol_violation");
    pub const NOT_AUTHORIZED: Uri = Uri::from_static("wamp.error.not_authorized");
    pub const AUTHORIZATION_FAILED: Uri = Uri::from_static("wamp.error.authorization_failed");
    pub const NO_SUCH_REALM: Uri = Uri::from_static("wamp.error.no_such_realm");
    pub const NO_SUCH_ROLE: Uri = Uri::from_static("wamp.error.no_such_role");
    pub const CANCELED: Uri = Uri::from_static("wamp.error.canceled");

    const fn from_static(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    /// Constructs a URI directly from a value known to be valid, skipping validation.
    pub(crate) fn from_known<S>(value: S) -> Self
    where
        S: Into<String>,
    {
        Self(Cow::Owned(value.into()))
    }

    /// Splits the URI into its components.
    pub fn split(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uri {
    type Error = InvalidUri;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_uri(&value)?;
        Ok(Self(Cow::Owned(value)))
    }
}

impl TryFrom<&str> for Uri {
    type Error = InvalidUri;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_uri(value)?;
        Ok(Self(Cow::Owned(value.to_owned())))
    }
}

impl From<Uri> for String {
    fn from(value: Uri) -> Self {
        value.0.into_owned()
    }
}

struct UriVisitor;

impl<'de> Visitor<'de> for UriVisitor {
    type Value = Uri;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a URI")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Uri::try_from(v).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(UriVisitor)
    }
}

#[cfg(test)]
mod uri_test {
    use crate::core::{
        hash::HashSet,
        uri::{
            Uri,
            validate_uri,
        },
    };

    #[test]
    fn validates_uris() {
        assert_matches::assert_matches!(validate_uri("com"), Ok(()));
        assert_matches::assert_matches!(validate_uri("valid.uri123"), Ok(()));
        assert_matches::assert_matches!(validate_uri("com.myapp.TOPIC"), Ok(()));
        assert_matches::assert_matches!(validate_uri("com.myapp.topic_123-@!!"), Ok(()));
        assert_matches::assert_matches!(validate_uri("com.1"), Ok(()));
        assert_matches::assert_matches!(validate_uri("foo bar"), Err(_));
        assert_matches::assert_matches!(validate_uri("foo.\tbar"), Err(_));
        assert_matches::assert_matches!(validate_uri(""), Err(_));
        assert_matches::assert_matches!(validate_uri("."), Err(_));
        assert_matches::assert_matches!(validate_uri(".."), Err(_));
        assert_matches::assert_matches!(validate_uri(".com.myapp.topic"), Err(_));
        assert_matches::assert_matches!(validate_uri("com.myapp."), Err(_));
        assert_matches::assert_matches!(validate_uri("com..myapp"), Err(_));
        assert_matches::assert_matches!(validate_uri("com.myapp#"), Err(_));
    }

    #[test]
    fn round_trips_through_string() {
        for value in ["com", "test.realm", "my.topic", "com.myapp.user.new", "a.B.c-d"] {
            let uri = Uri::try_from(value).unwrap();
            assert_eq!(uri.to_string(), value);
            assert_eq!(String::from(uri.clone()), value);
            assert_eq!(Uri::try_from(uri.to_string()).unwrap(), uri);
        }
    }

    #[test]
    fn compares_and_hashes_by_string() {
        let uris = HashSet::from_iter([
            Uri::try_from("wamp.error.no_such_realm").unwrap(),
            Uri::NO_SUCH_REALM,
        ]);
        assert_eq!(uris.len(), 1);
        assert_eq!(
            Uri::try_from("wamp.close.goodbye_and_out").unwrap(),
            Uri::GOODBYE_AND_OUT
        );
    }

    #[test]
    fn splits_components() {
        let uri = Uri::try_from("com.myapp.topic").unwrap();
        assert_eq!(uri.split().collect::<Vec<_>>(), ["com", "myapp", "topic"]);
    }

    #[test]
    fn fails_deserialization_invalid_uri() {
        assert_matches::assert_matches!(serde_json::from_str::<Uri>(r#""com.myapp topic""#), Err(err) => {
            assert!(err.to_string().contains("expected a URI"));
        });
        assert_matches::assert_matches!(serde_json::from_str::<Uri>(r#""com.myapp.topic""#), Ok(uri) => {
            assert_eq!(uri.as_ref(), "com.myapp.topic");
        });
    }
}
