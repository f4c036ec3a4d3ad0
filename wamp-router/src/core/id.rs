use std::fmt::Display;

use async_trait::async_trait;
use futures_util::lock::Mutex;
use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
    de::{
        Unexpected,
        Visitor,
    },
};
use thiserror::Error;

use crate::core::{
    hash::HashSet,
    types::{
        Integer,
        Value,
    },
};

/// An integer ID, used for identification of resources and requests.
///
/// IDs must be exactly representable as IEEE 754 doubles, so they are restricted to `[1, 2^53 - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Id(u64);

impl Id {
    /// The minimum allowable value of an ID.
    pub const MIN: Id = Id(1);

    /// The maximum allowable value of an ID.
    pub const MAX: Id = Id((1 << 53) - 1);

    /// The integer value of the ID.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::MIN
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Id> for u64 {
    fn from(value: Id) -> Self {
        value.0
    }
}

impl From<Id> for Value {
    fn from(value: Id) -> Self {
        Value::Integer(value.0)
    }
}

/// Error for an ID being out of range.
#[derive(Debug, Error)]
#[error("{value} is out of range for IDs")]
pub struct IdOutOfRange {
    value: u64,
}

impl IdOutOfRange {
    fn new(value: u64) -> Self {
        Self { value }
    }
}

impl TryFrom<Integer> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: Integer) -> Result<Self, Self::Error> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            Err(IdOutOfRange::new(value))
        } else {
            Ok(Id(value))
        }
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "an unsigned integer in the range [{}, {}]",
            Id::MIN,
            Id::MAX
        )
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Id::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u64(IdVisitor)
    }
}

/// An ID allocator.
///
/// Implementations must be safe to share across sessions that allocate and release concurrently.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Generates a new ID.
    async fn generate_id(&self) -> Id;

    /// Releases an ID that is no longer referenced, so that it may be generated again.
    async fn release_id(&self, id: Id);
}

/// The ID allocation strategy for the router-wide ID space shared by sessions, subscriptions, and
/// registrations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IdAllocatorType {
    /// Random IDs that are never handed out twice while still alive.
    #[default]
    Random,
    /// Sequential IDs that wrap around after [`Id::MAX`].
    Sequential,
}

/// Creates a new [`IdAllocator`] for the given type.
pub fn new_id_allocator(allocator_type: IdAllocatorType) -> Box<dyn IdAllocator> {
    match allocator_type {
        IdAllocatorType::Random => Box::new(RandomIdAllocator::default()),
        IdAllocatorType::Sequential => Box::new(SequentialIdAllocator::default()),
    }
}

/// An ID allocator that generates IDs from a cryptographically-secure random sequence.
///
/// Every generated ID is tracked until it is released, and a tracked ID is never generated again.
/// Used for long-lived IDs, such as sessions, subscriptions, and registrations.
#[derive(Debug, Default)]
pub struct RandomIdAllocator {
    live: Mutex<HashSet<Id>>,
}

impl RandomIdAllocator {
    fn random_id() -> Id {
        Id(rand::rng().random_range(Id::MIN.0..=Id::MAX.0))
    }

    /// The number of IDs currently in use.
    pub async fn live_ids(&self) -> usize {
        self.live.lock().await.len()
    }
}

#[async_trait]
impl IdAllocator for RandomIdAllocator {
    async fn generate_id(&self) -> Id {
        let mut live = self.live.lock().await;
        loop {
            let id = Self::random_id();
            if live.insert(id) {
                return id;
            }
        }
    }

    async fn release_id(&self, id: Id) {
        self.live.lock().await.remove(&id);
    }
}

/// An ID allocator that generates IDs sequentially, wrapping around to [`Id::MIN`] after
/// [`Id::MAX`].
#[derive(Debug, Default)]
pub struct SequentialIdAllocator {
    next: Mutex<Id>,
}

impl SequentialIdAllocator {
    /// Creates an allocator whose first ID is `start`.
    pub fn starting_at(start: Id) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

#[async_trait]
impl IdAllocator for SequentialIdAllocator {
    async fn generate_id(&self) -> Id {
        let mut next = self.next.lock().await;
        let id = *next;
        *next = if id == Id::MAX { Id::MIN } else { Id(id.0 + 1) };
        id
    }

    async fn release_id(&self, _: Id) {}
}
