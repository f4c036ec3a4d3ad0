use anyhow::Error;

use crate::{
    core::{
        close::CloseReason,
        id::Id,
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::Uri,
    },
    message::message::{
        AbortMessage,
        CALL_TAG,
        ErrorMessage,
        GoodbyeMessage,
        Message,
    },
};

fn details_for_error(error: &Error) -> Dictionary {
    Dictionary::from_iter([("message".to_owned(), Value::String(format!("{error:#}")))])
}

pub fn abort_message_for_error(error: &Error) -> Message {
    abort_message_with_reason(Uri::for_error(error), details_for_error(error))
}

pub fn abort_message_with_reason(reason: Uri, details: Dictionary) -> Message {
    Message::Abort(AbortMessage { details, reason })
}

pub fn goodbye_with_close_reason(close_reason: CloseReason) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason: close_reason.uri(),
    })
}

pub fn goodbye_and_out() -> Message {
    goodbye_with_close_reason(CloseReason::GoodbyeAndOut)
}

pub fn error_for_request(message: &Message, error: &Error) -> Message {
    Message::Error(ErrorMessage {
        request_type: message.tag(),
        request: message.request_id().unwrap_or_default(),
        details: details_for_error(error),
        error: Uri::for_error(error),
        arguments: None,
        arguments_keyword: None,
    })
}

/// An ERROR for a CALL, forwarding an error reported by the callee.
pub fn call_error(
    call_request: Id,
    error: Uri,
    details: Dictionary,
    arguments: Option<List>,
    arguments_keyword: Option<Dictionary>,
) -> Message {
    Message::Error(ErrorMessage {
        request_type: CALL_TAG,
        request: call_request,
        details,
        error,
        arguments,
        arguments_keyword,
    })
}
