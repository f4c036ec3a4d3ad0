use anyhow::Error;
use thiserror::Error;

use crate::core::{
    id::IdOutOfRange,
    uri::{
        InvalidUri,
        Uri,
    },
};

/// An interaction error that occurs while processing a WAMP message.
///
/// Interaction errors are clearly defined in the WAMP standard and are reserved for errors that
/// peers must be able to parse easily.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The incoming message violates the WAMP protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The procedure being called does not exist.
    #[error("no such procedure")]
    NoSuchProcedure,
    /// The procedure being registered already exists.
    #[error("procedure already exists")]
    ProcedureAlreadyExists,
    /// The registration being referenced does not exist.
    #[error("no such registration")]
    NoSuchRegistration,
    /// The subscription being referenced does not exist.
    #[error("no such subscription")]
    NoSuchSubscription,
    /// The realm being referenced does not exist.
    #[error("no such realm")]
    NoSuchRealm,
    /// The role being referenced does not exist.
    #[error("no such role")]
    NoSuchRole,
    /// The authorization policy denied the operation.
    #[error("not authorized")]
    NotAuthorized,
    /// The authorization policy could not evaluate the operation.
    #[error("authorization failed")]
    AuthorizationFailed,
    /// An invalid argument was passed.
    #[error("{0}")]
    InvalidArgument(String),
    /// The operation was abandoned before it completed.
    #[error("canceled")]
    Canceled,
}

impl InteractionError {
    /// The reserved URI for the error.
    pub fn uri(&self) -> Uri {
        match self {
            Self::ProtocolViolation(_) => Uri::PROTOCOL_VIOLATION,
            Self::NoSuchProcedure => Uri::NO_SUCH_PROCEDURE,
            Self::ProcedureAlreadyExists => Uri::PROCEDURE_ALREADY_EXISTS,
            Self::NoSuchRegistration => Uri::NO_SUCH_REGISTRATION,
            Self::NoSuchSubscription => Uri::NO_SUCH_SUBSCRIPTION,
            Self::NoSuchRealm => Uri::NO_SUCH_REALM,
            Self::NoSuchRole => Uri::NO_SUCH_ROLE,
            Self::NotAuthorized => Uri::NOT_AUTHORIZED,
            Self::AuthorizationFailed => Uri::AUTHORIZATION_FAILED,
            Self::InvalidArgument(_) => Uri::INVALID_ARGUMENT,
            Self::Canceled => Uri::CANCELED,
        }
    }
}

/// An error for a single field of a message that could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("missing required field at index {index}")]
    MissingField { index: usize },
    #[error("expected {expected} at index {index}, found {found}")]
    WrongKind {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unknown message type {0}")]
    UnknownMessageType(u64),
    #[error("message is not a non-empty list beginning with a message type")]
    MalformedEnvelope,
}

impl Uri {
    /// Selects the reserved URI that describes the given error.
    pub fn for_error(error: &Error) -> Uri {
        if let Some(error) = error.downcast_ref::<InteractionError>() {
            error.uri()
        } else if error.downcast_ref::<InvalidUri>().is_some() {
            Uri::INVALID_URI
        } else if error.downcast_ref::<DecodeError>().is_some() {
            Uri::PROTOCOL_VIOLATION
        } else if error.downcast_ref::<IdOutOfRange>().is_some() {
            Uri::PROTOCOL_VIOLATION
        } else {
            Uri::INVALID_ARGUMENT
        }
    }
}
