/// A role a router can take on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouterRole {
    /// Supports RPC calls.
    Dealer,
    /// Supports pub/sub.
    Broker,
}

impl RouterRole {
    /// The key used for the role in WELCOME details.
    pub fn key_for_details(&self) -> &'static str {
        match self {
            Self::Dealer => "dealer",
            Self::Broker => "broker",
        }
    }
}

impl TryFrom<&str> for RouterRole {
    type Error = anyhow::Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "dealer" => Ok(Self::Dealer),
            "broker" => Ok(Self::Broker),
            _ => Err(Self::Error::msg(format!("invalid router role: {value}"))),
        }
    }
}
