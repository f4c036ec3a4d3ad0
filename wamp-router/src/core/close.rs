use crate::core::uri::Uri;

/// The reason for closing a WAMP session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The router is shutting down.
    #[default]
    SystemShutdown,
    /// The realm the session joined is closing.
    CloseRealm,
    /// Acknowledgement of a GOODBYE from the other side.
    GoodbyeAndOut,
}

impl CloseReason {
    fn uri_component(&self) -> &str {
        match self {
            Self::SystemShutdown => "system_shutdown",
            Self::CloseRealm => "close_realm",
            Self::GoodbyeAndOut => "goodbye_and_out",
        }
    }

    /// URI for the close reason.
    pub fn uri(&self) -> Uri {
        Uri::from_known(format!("wamp.close.{}", self.uri_component()))
    }
}
