use anyhow::Result;

use crate::{
    core::{
        error::DecodeError,
        id::Id,
        types::{
            Dictionary,
            Integer,
            List,
            Value,
        },
        uri::Uri,
    },
    message::fields::MessageFields,
};

pub const HELLO_TAG: Integer = 1;
pub const WELCOME_TAG: Integer = 2;
pub const ABORT_TAG: Integer = 3;
pub const GOODBYE_TAG: Integer = 6;
pub const ERROR_TAG: Integer = 8;
pub const PUBLISH_TAG: Integer = 16;
pub const PUBLISHED_TAG: Integer = 17;
pub const SUBSCRIBE_TAG: Integer = 32;
pub const SUBSCRIBED_TAG: Integer = 33;
pub const UNSUBSCRIBE_TAG: Integer = 34;
pub const UNSUBSCRIBED_TAG: Integer = 35;
pub const EVENT_TAG: Integer = 36;
pub const CALL_TAG: Integer = 48;
pub const RESULT_TAG: Integer = 50;
pub const REGISTER_TAG: Integer = 64;
pub const REGISTERED_TAG: Integer = 65;
pub const UNREGISTER_TAG: Integer = 66;
pub const UNREGISTERED_TAG: Integer = 67;
pub const INVOCATION_TAG: Integer = 68;
pub const YIELD_TAG: Integer = 70;

/// Checks if the message type is one this router understands.
pub fn is_known_tag(tag: Integer) -> bool {
    matches!(
        tag,
        HELLO_TAG
            | WELCOME_TAG
            | ABORT_TAG
            | GOODBYE_TAG
            | ERROR_TAG
            | PUBLISH_TAG
            | PUBLISHED_TAG
            | SUBSCRIBE_TAG
            | SUBSCRIBED_TAG
            | UNSUBSCRIBE_TAG
            | UNSUBSCRIBED_TAG
            | EVENT_TAG
            | CALL_TAG
            | RESULT_TAG
            | REGISTER_TAG
            | REGISTERED_TAG
            | UNREGISTER_TAG
            | UNREGISTERED_TAG
            | INVOCATION_TAG
            | YIELD_TAG
    )
}

/// A HELLO message for a peer to initiate a WAMP session in a realm.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    pub realm: Uri,
    pub details: Dictionary,
}

/// A WELCOME message for a router to confirm a peer's WAMP session in a realm.
#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeMessage {
    pub session: Id,
    pub details: Dictionary,
}

/// An ABORT message for quickly terminating a WAMP session.
#[derive(Debug, Clone, PartialEq)]
pub struct AbortMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// A GOODBYE message for ending a WAMP session with a two-way handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct GoodbyeMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// An ERROR message for communicating an error in response to a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub request_type: Integer,
    pub request: Id,
    pub details: Dictionary,
    pub error: Uri,
    pub arguments: Option<List>,
    pub arguments_keyword: Option<Dictionary>,
}

/// A PUBLISH message for publishing an event to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: Uri,
    pub arguments: Option<List>,
    pub arguments_keyword: Option<Dictionary>,
}

/// A PUBLISHED message for confirming an event was published.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub publish_request: Id,
    pub publication: Id,
}

/// A SUBSCRIBE message for subscribing to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: Uri,
}

/// A SUBSCRIBED message for confirming a peer has subscribed to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribedMessage {
    pub subscribe_request: Id,
    pub subscription: Id,
}

/// An UNSUBSCRIBE message for unsubscribing from a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribeMessage {
    pub request: Id,
    pub subscribed_subscription: Id,
}

/// An UNSUBSCRIBED message for confirming a peer has unsubscribed from a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribedMessage {
    pub unsubscribe_request: Id,
}

/// An EVENT message for relaying a published event to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub subscribed_subscription: Id,
    pub published_publication: Id,
    pub details: Dictionary,
    pub publish_arguments: Option<List>,
    pub publish_arguments_keyword: Option<Dictionary>,
}

/// A CALL message for invoking a procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
    pub arguments: Option<List>,
    pub arguments_keyword: Option<Dictionary>,
}

/// A RESULT message for sending the result of a procedure invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    pub call_request: Id,
    pub details: Dictionary,
    pub yield_arguments: Option<List>,
    pub yield_arguments_keyword: Option<Dictionary>,
}

/// A REGISTER message for registering a procedure in the realm.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
}

/// A REGISTERED message for confirming a procedure has been registered.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

/// An UNREGISTER message for unregistering a procedure in the realm.
#[derive(Debug, Clone, PartialEq)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

/// An UNREGISTERED message for confirming a procedure has been unregistered.
#[derive(Debug, Clone, PartialEq)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

/// An INVOCATION message for invoking a procedure on its callee.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationMessage {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary,
    pub call_arguments: Option<List>,
    pub call_arguments_keyword: Option<Dictionary>,
}

/// A YIELD message for yielding the result of an invocation from the callee.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
    pub arguments: Option<List>,
    pub arguments_keyword: Option<Dictionary>,
}

/// A WAMP message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(HelloMessage),
    Welcome(WelcomeMessage),
    Abort(AbortMessage),
    Goodbye(GoodbyeMessage),
    Error(ErrorMessage),
    Publish(PublishMessage),
    Published(PublishedMessage),
    Subscribe(SubscribeMessage),
    Subscribed(SubscribedMessage),
    Unsubscribe(UnsubscribeMessage),
    Unsubscribed(UnsubscribedMessage),
    Event(EventMessage),
    Call(CallMessage),
    Result(ResultMessage),
    Register(RegisterMessage),
    Registered(RegisteredMessage),
    Unregister(UnregisterMessage),
    Unregistered(UnregisteredMessage),
    Invocation(InvocationMessage),
    Yield(YieldMessage),
}

/// Appends optional positional and keyword arguments to a payload.
///
/// Keyword arguments occupy the slot after positional arguments, so an empty list is emitted in
/// front of them when there are no positional arguments. Present but empty arguments are kept.
fn push_arguments(
    payload: &mut List,
    arguments: Option<&List>,
    arguments_keyword: Option<&Dictionary>,
) {
    match (arguments, arguments_keyword) {
        (arguments, Some(arguments_keyword)) => {
            payload.push(Value::List(arguments.cloned().unwrap_or_default()));
            payload.push(Value::Dictionary(arguments_keyword.clone()));
        }
        (Some(arguments), None) => payload.push(Value::List(arguments.clone())),
        (None, None) => (),
    }
}

impl Message {
    /// The message type, used on the wire.
    pub fn tag(&self) -> Integer {
        match self {
            Self::Hello(_) => HELLO_TAG,
            Self::Welcome(_) => WELCOME_TAG,
            Self::Abort(_) => ABORT_TAG,
            Self::Goodbye(_) => GOODBYE_TAG,
            Self::Error(_) => ERROR_TAG,
            Self::Publish(_) => PUBLISH_TAG,
            Self::Published(_) => PUBLISHED_TAG,
            Self::Subscribe(_) => SUBSCRIBE_TAG,
            Self::Subscribed(_) => SUBSCRIBED_TAG,
            Self::Unsubscribe(_) => UNSUBSCRIBE_TAG,
            Self::Unsubscribed(_) => UNSUBSCRIBED_TAG,
            Self::Event(_) => EVENT_TAG,
            Self::Call(_) => CALL_TAG,
            Self::Result(_) => RESULT_TAG,
            Self::Register(_) => REGISTER_TAG,
            Self::Registered(_) => REGISTERED_TAG,
            Self::Unregister(_) => UNREGISTER_TAG,
            Self::Unregistered(_) => UNREGISTERED_TAG,
            Self::Invocation(_) => INVOCATION_TAG,
            Self::Yield(_) => YIELD_TAG,
        }
    }

    /// The message name, mostly for logging.
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Abort(_) => "ABORT",
            Self::Goodbye(_) => "GOODBYE",
            Self::Error(_) => "ERROR",
            Self::Publish(_) => "PUBLISH",
            Self::Published(_) => "PUBLISHED",
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::Subscribed(_) => "SUBSCRIBED",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::Unsubscribed(_) => "UNSUBSCRIBED",
            Self::Event(_) => "EVENT",
            Self::Call(_) => "CALL",
            Self::Result(_) => "RESULT",
            Self::Register(_) => "REGISTER",
            Self::Registered(_) => "REGISTERED",
            Self::Unregister(_) => "UNREGISTER",
            Self::Unregistered(_) => "UNREGISTERED",
            Self::Invocation(_) => "INVOCATION",
            Self::Yield(_) => "YIELD",
        }
    }

    /// The request ID on the message.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Published(message) => Some(message.publish_request),
            Self::Subscribe(message) => Some(message.request),
            Self::Subscribed(message) => Some(message.subscribe_request),
            Self::Unsubscribe(message) => Some(message.request),
            Self::Unsubscribed(message) => Some(message.unsubscribe_request),
            Self::Call(message) => Some(message.request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// The details dictionary on the message.
    pub fn details(&self) -> Option<&Dictionary> {
        match self {
            Self::Hello(message) => Some(&message.details),
            Self::Welcome(message) => Some(&message.details),
            Self::Abort(message) => Some(&message.details),
            Self::Goodbye(message) => Some(&message.details),
            Self::Error(message) => Some(&message.details),
            Self::Event(message) => Some(&message.details),
            Self::Result(message) => Some(&message.details),
            Self::Invocation(message) => Some(&message.details),
            _ => None,
        }
    }

    /// The error reason on the message.
    pub fn reason(&self) -> Option<&Uri> {
        match self {
            Self::Abort(message) => Some(&message.reason),
            Self::Goodbye(message) => Some(&message.reason),
            Self::Error(message) => Some(&message.error),
            _ => None,
        }
    }

    /// The canonical sequence of fields that follow the message type on the wire.
    pub fn payload(&self) -> List {
        let mut payload = List::new();
        match self {
            Self::Hello(message) => {
                payload.push(message.realm.to_string().into());
                payload.push(message.details.clone().into());
            }
            Self::Welcome(message) => {
                payload.push(message.session.into());
                payload.push(message.details.clone().into());
            }
            Self::Abort(message) => {
                payload.push(message.details.clone().into());
                payload.push(message.reason.to_string().into());
            }
            Self::Goodbye(message) => {
                payload.push(message.details.clone().into());
                payload.push(message.reason.to_string().into());
            }
            Self::Error(message) => {
                payload.push(message.request_type.into());
                payload.push(message.request.into());
                payload.push(message.details.clone().into());
                payload.push(message.error.to_string().into());
                push_arguments(
                    &mut payload,
                    message.arguments.as_ref(),
                    message.arguments_keyword.as_ref(),
                );
            }
            Self::Publish(message) => {
                payload.push(message.request.into());
                payload.push(message.options.clone().into());
                payload.push(message.topic.to_string().into());
                push_arguments(
                    &mut payload,
                    message.arguments.as_ref(),
                    message.arguments_keyword.as_ref(),
                );
            }
            Self::Published(message) => {
                payload.push(message.publish_request.into());
                payload.push(message.publication.into());
            }
            Self::Subscribe(message) => {
                payload.push(message.request.into());
                payload.push(message.options.clone().into());
                payload.push(message.topic.to_string().into());
            }
            Self::Subscribed(message) => {
                payload.push(message.subscribe_request.into());
                payload.push(message.subscription.into());
            }
            Self::Unsubscribe(message) => {
                payload.push(message.request.into());
                payload.push(message.subscribed_subscription.into());
            }
            Self::Unsubscribed(message) => {
                payload.push(message.unsubscribe_request.into());
            }
            Self::Event(message) => {
                payload.push(message.subscribed_subscription.into());
                payload.push(message.published_publication.into());
                payload.push(message.details.clone().into());
                push_arguments(
                    &mut payload,
                    message.publish_arguments.as_ref(),
                    message.publish_arguments_keyword.as_ref(),
                );
            }
            Self::Call(message) => {
                payload.push(message.request.into());
                payload.push(message.options.clone().into());
                payload.push(message.procedure.to_string().into());
                push_arguments(
                    &mut payload,
                    message.arguments.as_ref(),
                    message.arguments_keyword.as_ref(),
                );
            }
            Self::Result(message) => {
                payload.push(message.call_request.into());
                payload.push(message.details.clone().into());
                push_arguments(
                    &mut payload,
                    message.yield_arguments.as_ref(),
                    message.yield_arguments_keyword.as_ref(),
                );
            }
            Self::Register(message) => {
                payload.push(message.request.into());
                payload.push(message.options.clone().into());
                payload.push(message.procedure.to_string().into());
            }
            Self::Registered(message) => {
                payload.push(message.register_request.into());
                payload.push(message.registration.into());
            }
            Self::Unregister(message) => {
                payload.push(message.request.into());
                payload.push(message.registered_registration.into());
            }
            Self::Unregistered(message) => {
                payload.push(message.unregister_request.into());
            }
            Self::Invocation(message) => {
                payload.push(message.request.into());
                payload.push(message.registered_registration.into());
                payload.push(message.details.clone().into());
                push_arguments(
                    &mut payload,
                    message.call_arguments.as_ref(),
                    message.call_arguments_keyword.as_ref(),
                );
            }
            Self::Yield(message) => {
                payload.push(message.invocation_request.into());
                payload.push(message.options.clone().into());
                push_arguments(
                    &mut payload,
                    message.arguments.as_ref(),
                    message.arguments_keyword.as_ref(),
                );
            }
        }
        payload
    }

    /// The full wire envelope: the message type followed by the payload.
    pub fn envelope(&self) -> Value {
        let mut envelope = List::from_iter([Value::Integer(self.tag())]);
        envelope.extend(self.payload());
        Value::List(envelope)
    }

    /// Constructs a message from its type and positional fields.
    pub fn from_fields(tag: Integer, fields: &MessageFields) -> Result<Self> {
        let message = match tag {
            HELLO_TAG => Self::Hello(HelloMessage {
                realm: fields.uri(0)?,
                details: fields.optional_dictionary(1)?.unwrap_or_default(),
            }),
            WELCOME_TAG => Self::Welcome(WelcomeMessage {
                session: fields.id(0)?,
                details: fields.optional_dictionary(1)?.unwrap_or_default(),
            }),
            ABORT_TAG => Self::Abort(AbortMessage {
                details: fields.dictionary(0)?,
                reason: fields.uri(1)?,
            }),
            GOODBYE_TAG => Self::Goodbye(GoodbyeMessage {
                details: fields.dictionary(0)?,
                reason: fields.uri(1)?,
            }),
            ERROR_TAG => Self::Error(ErrorMessage {
                request_type: fields.integer(0)?,
                request: fields.id(1)?,
                details: fields.dictionary(2)?,
                error: fields.uri(3)?,
                arguments: fields.optional_list(4)?,
                arguments_keyword: fields.optional_dictionary(5)?,
            }),
            PUBLISH_TAG => Self::Publish(PublishMessage {
                request: fields.id(0)?,
                options: fields.dictionary(1)?,
                topic: fields.uri(2)?,
                arguments: fields.optional_list(3)?,
                arguments_keyword: fields.optional_dictionary(4)?,
            }),
            PUBLISHED_TAG => Self::Published(PublishedMessage {
                publish_request: fields.id(0)?,
                publication: fields.id(1)?,
            }),
            SUBSCRIBE_TAG => Self::Subscribe(SubscribeMessage {
                request: fields.id(0)?,
                options: fields.dictionary(1)?,
                topic: fields.uri(2)?,
            }),
            SUBSCRIBED_TAG => Self::Subscribed(SubscribedMessage {
                subscribe_request: fields.id(0)?,
                subscription: fields.id(1)?,
            }),
            UNSUBSCRIBE_TAG => Self::Unsubscribe(UnsubscribeMessage {
                request: fields.id(0)?,
                subscribed_subscription: fields.id(1)?,
            }),
            UNSUBSCRIBED_TAG => Self::Unsubscribed(UnsubscribedMessage {
                unsubscribe_request: fields.id(0)?,
            }),
            EVENT_TAG => Self::Event(EventMessage {
                subscribed_subscription: fields.id(0)?,
                published_publication: fields.id(1)?,
                details: fields.dictionary(2)?,
                publish_arguments: fields.optional_list(3)?,
                publish_arguments_keyword: fields.optional_dictionary(4)?,
            }),
            CALL_TAG => Self::Call(CallMessage {
                request: fields.id(0)?,
                options: fields.dictionary(1)?,
                procedure: fields.uri(2)?,
                arguments: fields.optional_list(3)?,
                arguments_keyword: fields.optional_dictionary(4)?,
            }),
            RESULT_TAG => Self::Result(ResultMessage {
                call_request: fields.id(0)?,
                details: fields.dictionary(1)?,
                yield_arguments: fields.optional_list(2)?,
                yield_arguments_keyword: fields.optional_dictionary(3)?,
            }),
            REGISTER_TAG => Self::Register(RegisterMessage {
                request: fields.id(0)?,
                options: fields.dictionary(1)?,
                procedure: fields.uri(2)?,
            }),
            REGISTERED_TAG => Self::Registered(RegisteredMessage {
                register_request: fields.id(0)?,
                registration: fields.id(1)?,
            }),
            UNREGISTER_TAG => Self::Unregister(UnregisterMessage {
                request: fields.id(0)?,
                registered_registration: fields.id(1)?,
            }),
            UNREGISTERED_TAG => Self::Unregistered(UnregisteredMessage {
                unregister_request: fields.id(0)?,
            }),
            INVOCATION_TAG => Self::Invocation(InvocationMessage {
                request: fields.id(0)?,
                registered_registration: fields.id(1)?,
                details: fields.dictionary(2)?,
                call_arguments: fields.optional_list(3)?,
                call_arguments_keyword: fields.optional_dictionary(4)?,
            }),
            YIELD_TAG => Self::Yield(YieldMessage {
                invocation_request: fields.id(0)?,
                options: fields.dictionary(1)?,
                arguments: fields.optional_list(2)?,
                arguments_keyword: fields.optional_dictionary(3)?,
            }),
            _ => return Err(DecodeError::UnknownMessageType(tag).into()),
        };
        Ok(message)
    }
}

/// One message of every type, with representative payloads.
#[cfg(test)]
pub(crate) fn sample_messages() -> Vec<Message> {
    let id = |value: u64| Id::try_from(value).unwrap();
    let uri = |value: &str| Uri::try_from(value).unwrap();
    let nested = Dictionary::from_iter([
        ("a".to_owned(), Value::Integer(1)),
        ("b".to_owned(), Value::String("s".to_owned())),
        ("c".to_owned(), Value::Bool(false)),
        (
            "d".to_owned(),
            Value::Dictionary(Dictionary::from_iter([(
                "e".to_owned(),
                Value::Dictionary(Dictionary::default()),
            )])),
        ),
        (
            "g".to_owned(),
            Value::List(List::from_iter([
                Value::Integer(0),
                Value::SignedInteger(-17),
                Value::Float(-2.5),
                Value::Null,
                Value::List(List::default()),
                Value::Dictionary(Dictionary::default()),
            ])),
        ),
    ]);
    let args = List::from_iter([Value::String("Johnny".to_owned()), Value::Integer(23)]);
    vec![
        Message::Hello(HelloMessage {
            realm: uri("test.realm"),
            details: nested.clone(),
        }),
        Message::Welcome(WelcomeMessage {
            session: id(9129137332),
            details: Dictionary::from_iter([(
                "roles".to_owned(),
                Value::Dictionary(Dictionary::from_iter([(
                    "broker".to_owned(),
                    Value::Dictionary(Dictionary::default()),
                )])),
            )]),
        }),
        Message::Abort(AbortMessage {
            details: Dictionary::from_iter([("message".to_owned(), Value::from("bye"))]),
            reason: Uri::NO_SUCH_REALM,
        }),
        Message::Goodbye(GoodbyeMessage {
            details: Dictionary::default(),
            reason: Uri::GOODBYE_AND_OUT,
        }),
        Message::Error(ErrorMessage {
            request_type: CALL_TAG,
            request: id(7814135),
            details: Dictionary::default(),
            error: uri("com.myapp.error.object_write_protected"),
            arguments: Some(List::from_iter([Value::from("Object is write protected.")])),
            arguments_keyword: Some(Dictionary::from_iter([(
                "severity".to_owned(),
                Value::Integer(3),
            )])),
        }),
        Message::Publish(PublishMessage {
            request: id(1),
            options: Dictionary::default(),
            topic: uri("my.topic"),
            arguments: None,
            arguments_keyword: None,
        }),
        Message::Publish(PublishMessage {
            request: id(2),
            options: Dictionary::default(),
            topic: uri("my.topic"),
            arguments: Some(List::default()),
            arguments_keyword: Some(Dictionary::default()),
        }),
        Message::Publish(PublishMessage {
            request: id(3),
            options: Dictionary::default(),
            topic: uri("my.topic"),
            arguments: Some(List::default()),
            arguments_keyword: None,
        }),
        Message::Published(PublishedMessage {
            publish_request: id(1),
            publication: id(5677668769870992),
        }),
        Message::Subscribe(SubscribeMessage {
            request: id(5432),
            options: Dictionary::default(),
            topic: uri("my.topic"),
        }),
        Message::Subscribed(SubscribedMessage {
            subscribe_request: id(5432),
            subscription: Id::MAX,
        }),
        Message::Unsubscribe(UnsubscribeMessage {
            request: id(85346237),
            subscribed_subscription: id(5512315355),
        }),
        Message::Unsubscribed(UnsubscribedMessage {
            unsubscribe_request: id(85346237),
        }),
        Message::Event(EventMessage {
            subscribed_subscription: id(5512315355),
            published_publication: id(4429313566),
            details: Dictionary::default(),
            publish_arguments: Some(List::default()),
            publish_arguments_keyword: Some(nested.clone()),
        }),
        Message::Call(CallMessage {
            request: id(7814135),
            options: Dictionary::default(),
            procedure: uri("com.myapp.user.new"),
            arguments: Some(args.clone()),
            arguments_keyword: Some(nested.clone()),
        }),
        Message::Result(ResultMessage {
            call_request: id(7814135),
            details: Dictionary::default(),
            yield_arguments: Some(List::from_iter([Value::Integer(30)])),
            yield_arguments_keyword: None,
        }),
        Message::Register(RegisterMessage {
            request: id(25349185),
            options: Dictionary::default(),
            procedure: uri("com.myapp.myprocedure1"),
        }),
        Message::Registered(RegisteredMessage {
            register_request: id(25349185),
            registration: id(2103333224),
        }),
        Message::Unregister(UnregisterMessage {
            request: id(788923562),
            registered_registration: id(2103333224),
        }),
        Message::Unregistered(UnregisteredMessage {
            unregister_request: id(788923562),
        }),
        Message::Invocation(InvocationMessage {
            request: id(6131533),
            registered_registration: id(9823526),
            details: Dictionary::default(),
            call_arguments: Some(args),
            call_arguments_keyword: None,
        }),
        Message::Yield(YieldMessage {
            invocation_request: id(6131533),
            options: Dictionary::default(),
            arguments: Some(List::default()),
            arguments_keyword: Some(nested),
        }),
    ]
}

#[cfg(test)]
mod message_test {
    use crate::{
        core::{
            error::DecodeError,
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
            uri::Uri,
        },
        message::{
            fields::MessageFields,
            message::{
                CallMessage,
                ErrorMessage,
                EventMessage,
                HelloMessage,
                Message,
                ResultMessage,
                SubscribeMessage,
                UnsubscribedMessage,
            },
        },
    };

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn uri(value: &str) -> Uri {
        Uri::try_from(value).unwrap()
    }

    #[test]
    fn emits_required_fields_in_order() {
        let message = Message::Subscribe(SubscribeMessage {
            request: id(5432),
            options: Dictionary::default(),
            topic: uri("my.topic"),
        });
        assert_eq!(message.tag(), 32);
        pretty_assertions::assert_eq!(
            message.payload(),
            List::from_iter([
                Value::Integer(5432),
                Value::Dictionary(Dictionary::default()),
                Value::String("my.topic".to_owned()),
            ])
        );

        let message = Message::Unsubscribed(UnsubscribedMessage {
            unsubscribe_request: id(7),
        });
        pretty_assertions::assert_eq!(
            message.envelope(),
            Value::List(List::from_iter([Value::Integer(35), Value::Integer(7)]))
        );
    }

    #[test]
    fn omits_absent_trailing_arguments() {
        let message = Message::Call(CallMessage {
            request: id(7814135),
            options: Dictionary::default(),
            procedure: uri("com.myapp.ping"),
            arguments: None,
            arguments_keyword: None,
        });
        assert_eq!(message.payload().len(), 3);

        let message = Message::Call(CallMessage {
            request: id(7814135),
            options: Dictionary::default(),
            procedure: uri("com.myapp.echo"),
            arguments: Some(List::from_iter([Value::String("Hello, world!".to_owned())])),
            arguments_keyword: None,
        });
        pretty_assertions::assert_eq!(
            message.payload()[3..].to_vec(),
            vec![Value::List(List::from_iter([Value::String(
                "Hello, world!".to_owned()
            )]))]
        );
    }

    #[test]
    fn emits_placeholder_arguments_before_keyword_arguments() {
        let kwargs = Dictionary::from_iter([("firstname".to_owned(), Value::from("John"))]);
        let message = Message::Event(EventMessage {
            subscribed_subscription: id(1),
            published_publication: id(2),
            details: Dictionary::default(),
            publish_arguments: None,
            publish_arguments_keyword: Some(kwargs.clone()),
        });
        pretty_assertions::assert_eq!(
            message.payload(),
            List::from_iter([
                Value::Integer(1),
                Value::Integer(2),
                Value::Dictionary(Dictionary::default()),
                Value::List(List::default()),
                Value::Dictionary(kwargs),
            ])
        );
    }

    #[test]
    fn keeps_present_empty_arguments() {
        let message = Message::Call(CallMessage {
            request: id(1),
            options: Dictionary::default(),
            procedure: uri("com.myapp.ping"),
            arguments: Some(List::default()),
            arguments_keyword: Some(Dictionary::default()),
        });
        pretty_assertions::assert_eq!(
            message.payload()[3..].to_vec(),
            vec![
                Value::List(List::default()),
                Value::Dictionary(Dictionary::default()),
            ]
        );

        let message = Message::Call(CallMessage {
            request: id(1),
            options: Dictionary::default(),
            procedure: uri("com.myapp.ping"),
            arguments: Some(List::default()),
            arguments_keyword: None,
        });
        pretty_assertions::assert_eq!(
            message.payload()[3..].to_vec(),
            vec![Value::List(List::default())]
        );
    }

    #[test]
    fn reads_message_from_fields() {
        let fields = MessageFields::new(List::from_iter([
            Value::Integer(7814135),
            Value::Dictionary(Dictionary::default()),
            Value::String("com.myapp.user.new".to_owned()),
            Value::List(List::from_iter([Value::from("Johnny")])),
            Value::Dictionary(Dictionary::from_iter([
                ("firstname".to_owned(), Value::from("John")),
                ("surname".to_owned(), Value::from("Doe")),
            ])),
        ]));
        assert_matches::assert_matches!(Message::from_fields(48, &fields), Ok(Message::Call(message)) => {
            pretty_assertions::assert_eq!(message, CallMessage {
                request: id(7814135),
                options: Dictionary::default(),
                procedure: uri("com.myapp.user.new"),
                arguments: Some(List::from_iter([Value::from("Johnny")])),
                arguments_keyword: Some(Dictionary::from_iter([
                    ("firstname".to_owned(), Value::from("John")),
                    ("surname".to_owned(), Value::from("Doe")),
                ])),
            });
        });
    }

    #[test]
    fn reads_hello_without_details() {
        let fields = MessageFields::new(List::from_iter([Value::from("test.realm")]));
        assert_matches::assert_matches!(Message::from_fields(1, &fields), Ok(Message::Hello(message)) => {
            pretty_assertions::assert_eq!(message, HelloMessage {
                realm: uri("test.realm"),
                details: Dictionary::default(),
            });
        });
    }

    #[test]
    fn round_trips_every_variant_through_fields() {
        let args = List::from_iter([Value::Integer(23), Value::Float(1.5)]);
        let kwargs = Dictionary::from_iter([(
            "nested".to_owned(),
            Value::Dictionary(Dictionary::from_iter([(
                "list".to_owned(),
                Value::List(List::default()),
            )])),
        )]);
        let messages = [
            Message::Error(ErrorMessage {
                request_type: 48,
                request: id(3),
                details: Dictionary::default(),
                error: Uri::NO_SUCH_PROCEDURE,
                arguments: Some(args.clone()),
                arguments_keyword: Some(kwargs.clone()),
            }),
            Message::Result(ResultMessage {
                call_request: id(3),
                details: Dictionary::default(),
                yield_arguments: Some(List::default()),
                yield_arguments_keyword: Some(kwargs.clone()),
            }),
            Message::Result(ResultMessage {
                call_request: id(3),
                details: Dictionary::default(),
                yield_arguments: Some(args.clone()),
                yield_arguments_keyword: None,
            }),
            Message::Result(ResultMessage {
                call_request: id(3),
                details: Dictionary::default(),
                yield_arguments: Some(List::default()),
                yield_arguments_keyword: Some(Dictionary::default()),
            }),
            Message::Result(ResultMessage {
                call_request: id(3),
                details: Dictionary::default(),
                yield_arguments: None,
                yield_arguments_keyword: None,
            }),
        ];
        for message in messages {
            let fields = MessageFields::new(message.payload());
            assert_matches::assert_matches!(Message::from_fields(message.tag(), &fields), Ok(decoded) => {
                pretty_assertions::assert_eq!(decoded, message);
            });
        }
    }

    #[test]
    fn fails_unknown_message_type() {
        assert_matches::assert_matches!(Message::from_fields(4, &MessageFields::default()), Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<DecodeError>(), Some(DecodeError::UnknownMessageType(4)));
        });
    }

    #[test]
    fn fails_missing_required_field() {
        let fields = MessageFields::new(List::from_iter([Value::Integer(5432)]));
        assert_matches::assert_matches!(Message::from_fields(32, &fields), Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<DecodeError>(), Some(DecodeError::MissingField { index: 1 }));
        });
    }
}
