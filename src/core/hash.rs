//! Hashing Primitives
//!
//! Deterministic SHA-256 hashing used for:
//! - Commitments to hidden ranks and moves
//! - Merkle tree nodes
//! - Board state agreement between both participants

use sha2::{Sha256, Digest as _};
use super::coord::Coord;

/// Hash output type (256 bits / 32 bytes)
pub type Digest = [u8; 32];

/// Deterministic hasher with a domain separator.
///
/// Wraps SHA-256 with helpers for board types.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for board state.
    pub fn for_board_state() -> Self {
        Self::new(b"STRATAGEM_STATE_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a coordinate.
    #[inline]
    pub fn update_coord(&mut self, value: Coord) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Digest {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute state hash for board agreement.
///
/// The closure adds state-specific data after the turn number.
pub fn compute_state_hash<F>(turn: u32, add_state: F) -> Digest
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_board_state();
    hasher.update_u32(turn);
    add_state(&mut hasher);
    hasher.finalize()
}

/// Short hex prefix of a digest for log lines.
pub fn short_hex(digest: &Digest) -> String {
    hex::encode(&digest[..6])
}

/// Serde adapter writing digests as lowercase hex strings.
pub mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use super::Digest;

    /// Serialize a digest as hex.
    pub fn serialize<S: Serializer>(digest: &Digest, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(digest))
    }

    /// Parse a 64-character hex digest.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Digest, D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))
    }

    /// Same, for `Option<Digest>`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use super::super::Digest;

        /// Serialize an optional digest as hex or null.
        pub fn serialize<S: Serializer>(digest: &Option<Digest>, s: S) -> Result<S::Ok, S::Error> {
            match digest {
                Some(d) => s.serialize_some(&hex::encode(d)),
                None => s.serialize_none(),
            }
        }

        /// Parse an optional hex digest.
        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Digest>, D::Error> {
            let text: Option<String> = Option::deserialize(d)?;
            text.map(|t| {
                let bytes = hex::decode(&t).map_err(serde::de::Error::custom)?;
                bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))
            })
            .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_hasher_determinism() {
        let make_hash = || {
            let mut hasher = StateHasher::for_board_state();
            hasher.update_u32(100);
            hasher.update_coord(Coord::new(3, 4));
            hasher.update_bool(true);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];

        let hash1 = hash_with_domain(b"DOMAIN_A", &data);
        let hash2 = hash_with_domain(b"DOMAIN_B", &data);

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_compute_state_hash() {
        let hash = compute_state_hash(7, |hasher| hasher.update_bool(true));
        let hash2 = compute_state_hash(7, |hasher| hasher.update_bool(true));
        assert_eq!(hash, hash2);

        let hash3 = compute_state_hash(8, |hasher| hasher.update_bool(true));
        assert_ne!(hash, hash3);
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab; 32]), "abababababab");
    }

    #[test]
    fn test_hex_serde() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Wrapped {
            #[serde(with = "hex_serde")]
            digest: Digest,
            #[serde(with = "hex_serde::option")]
            maybe: Option<Digest>,
        }

        let value = Wrapped { digest: [0x0f; 32], maybe: None };
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains(&"0f".repeat(32)));
        assert_eq!(serde_json::from_str::<Wrapped>(&json).unwrap(), value);

        let short = r#"{"digest":"abcd","maybe":null}"#;
        assert!(serde_json::from_str::<Wrapped>(short).is_err());
    }
}
