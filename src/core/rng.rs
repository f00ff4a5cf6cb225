//! Randomness Sources
//!
//! Salt generation is injected through [`SaltSource`] instead of a global RNG:
//! - [`DeterministicRng`]: seeded Xorshift128+, used for tests, replays and
//!   auto-setup. Same seed gives the same sequence on every platform.
//! - [`OsSaltSource`]: operating-system randomness for real matches.

use rand::RngCore;
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Random salt mixed into every commitment.
pub type Salt = [u8; 32];

/// Anything that can produce fresh commitment salts.
pub trait SaltSource {
    /// Produce the next salt.
    fn next_salt(&mut self) -> Salt;
}

/// Deterministic PRNG using Xorshift128+ algorithm.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create RNG bound to a match and a purpose label.
    pub fn from_match_params(match_id: &[u8; 16], label: &[u8]) -> Self {
        Self::new(derive_seed(match_id, label))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Fill a buffer with random bytes.
    pub fn fill_bytes(&mut self, out: &mut [u8]) {
        for chunk in out.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    /// Shuffle a slice in place using Fisher-Yates algorithm.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            Some(&slice[idx])
        }
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

impl SaltSource for DeterministicRng {
    fn next_salt(&mut self) -> Salt {
        let mut salt = [0u8; 32];
        self.fill_bytes(&mut salt);
        salt
    }
}

/// Salt source backed by the operating system RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsSaltSource;

impl SaltSource for OsSaltSource {
    fn next_salt(&mut self) -> Salt {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a seed from a match id and a purpose label.
pub fn derive_seed(match_id: &[u8; 16], label: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"STRATAGEM_SEED_V1");
    hasher.update(match_id);
    hasher.update(label);
    let hash = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_determinism() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_rng_different_seeds() {
        let mut rng1 = DeterministicRng::new(12345);
        let mut rng2 = DeterministicRng::new(54321);

        assert_ne!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
        }

        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_salts_are_fresh_and_reproducible() {
        let mut rng = DeterministicRng::new(7);
        let a = rng.next_salt();
        let b = rng.next_salt();
        assert_ne!(a, b);

        let mut replay = DeterministicRng::new(7);
        assert_eq!(replay.next_salt(), a);
        assert_eq!(replay.next_salt(), b);
    }

    #[test]
    fn test_os_salts_differ() {
        let mut os = OsSaltSource;
        assert_ne!(os.next_salt(), os.next_salt());
    }

    #[test]
    fn test_fill_bytes_partial_chunk() {
        let mut rng = DeterministicRng::new(3);
        let mut buf = [0u8; 13];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|b| *b != 0));
    }

    #[test]
    fn test_shuffle_determinism() {
        let mut rng1 = DeterministicRng::new(1111);
        let mut rng2 = DeterministicRng::new(1111);

        let mut arr1 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut arr2 = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        rng1.shuffle(&mut arr1);
        rng2.shuffle(&mut arr2);

        assert_eq!(arr1, arr2);
    }

    #[test]
    fn test_derive_seed() {
        let match_id = [1u8; 16];
        assert_eq!(derive_seed(&match_id, b"red"), derive_seed(&match_id, b"red"));
        assert_ne!(derive_seed(&match_id, b"red"), derive_seed(&match_id, b"blue"));
    }

    #[test]
    fn test_state_checkpoint() {
        let mut rng = DeterministicRng::new(5555);
        for _ in 0..50 {
            rng.next_u64();
        }

        let saved_state = rng.state();
        let next_values: Vec<u64> = (0..10).map(|_| rng.next_u64()).collect();

        rng.set_state(saved_state);
        for expected in next_values {
            assert_eq!(rng.next_u64(), expected);
        }
    }
}
