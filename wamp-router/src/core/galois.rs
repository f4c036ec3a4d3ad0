use async_trait::async_trait;
use futures_util::lock::Mutex;
use rand::Rng;

use crate::core::id::{
    Id,
    IdAllocator,
};

const DEGREE: u32 = 53;
const MASK: u64 = (1 << DEGREE) - 1;

/// x^53 + x^6 + x^2 + x + 1, primitive over GF(2).
const POLYNOMIAL: u64 = (1 << DEGREE) | (1 << 6) | (1 << 2) | (1 << 1) | 1;

/// A generator of the multiplicative group of GF(2^53).
///
/// Equal to x^k for some k coprime to 2^53 - 1, so it has full order.
const GENERATOR: u64 = 0x1ff27bf42eaff6;

/// Multiplies two elements of GF(2^53), reducing by [`POLYNOMIAL`].
fn multiply(mut a: u64, mut b: u64) -> u64 {
    a &= MASK;
    b &= MASK;
    let mut product = 0;
    while b != 0 {
        if b & 1 == 1 {
            product ^= a;
        }
        b >>= 1;
        a <<= 1;
        if a & (1 << DEGREE) != 0 {
            a ^= POLYNOMIAL;
        }
    }
    product
}

/// A deterministic generator of IDs that walks the nonzero elements of GF(2^53).
///
/// Each step multiplies the state by a primitive element, so the sequence is a permutation of
/// `[1, 2^53 - 1]`: no value repeats until all 2^53 - 1 values have been produced, and 0 is never
/// produced. The sequence is uniformly spread but not cryptographically secure.
///
/// Two generators created with the same seed produce exactly the same sequence.
#[derive(Debug)]
pub struct GaloisFieldIdGenerator {
    state: u64,
}

impl GaloisFieldIdGenerator {
    /// Creates a new generator.
    ///
    /// If no seed is given, one is drawn from the thread-local random number generator.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| Self::generate_seed());
        Self {
            state: Self::initial_state(seed),
        }
    }

    fn generate_seed() -> u64 {
        let mut rng = rand::rng();
        rng.random()
    }

    fn initial_state(seed: u64) -> u64 {
        match seed & MASK {
            0 => 1,
            state => state,
        }
    }

    /// Returns the next ID in the sequence.
    pub fn next(&mut self) -> Id {
        self.state = multiply(self.state, GENERATOR);
        // The state is a nonzero field element below 2^53, which is always in range.
        Id::try_from(self.state).unwrap_or(Id::MIN)
    }
}

impl Default for GaloisFieldIdGenerator {
    fn default() -> Self {
        Self::new(None)
    }
}

/// An [`IdAllocator`] wrapper around [`GaloisFieldIdGenerator`], for sharing across tasks.
///
/// Releasing is a no-op: the sequence does not avoid values still in use, only values produced
/// recently.
#[derive(Debug, Default)]
pub struct GaloisFieldIdAllocator {
    generator: Mutex<GaloisFieldIdGenerator>,
}

impl GaloisFieldIdAllocator {
    /// Creates a new allocator.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            generator: Mutex::new(GaloisFieldIdGenerator::new(seed)),
        }
    }
}

#[async_trait]
impl IdAllocator for GaloisFieldIdAllocator {
    async fn generate_id(&self) -> Id {
        self.generator.lock().await.next()
    }

    async fn release_id(&self, _: Id) {}
}
