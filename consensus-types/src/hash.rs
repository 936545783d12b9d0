use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::cmp::Ordering;
use std::fmt;

/// Opaque 32-byte identifier: txid, wtxid, block hash, Merkle root, short-id seed.
///
/// Equality is bytewise. Ordering is bytewise big-endian, matching spec's tie-break
/// rule for fork choice and eviction (ascending on the raw bytes, not on any
/// derived numeric interpretation).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// SHA3-256 of `data`.
    #[must_use]
    pub fn sha3_256(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// SHA3-256 of the concatenation of two hashes, used by the Merkle tree.
    #[must_use]
    pub fn sha3_256_concat(left: &Hash32, right: &Hash32) -> Self {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&left.0);
        buf[32..].copy_from_slice(&right.0);
        Self::sha3_256(&buf)
    }

    /// Interprets the hash as a big-endian 256-bit integer, for PoW comparisons.
    #[must_use]
    pub fn as_u256(&self) -> primitive_types::U256 {
        primitive_types::U256::from_big_endian(&self.0)
    }

    /// Inverse of [`Hash32::as_u256`]: renders a 256-bit integer back to its
    /// big-endian byte form, used to materialize a retargeted PoW target.
    #[must_use]
    pub fn from_u256(value: primitive_types::U256) -> Self {
        let mut out = [0u8; 32];
        value.to_big_endian(&mut out);
        Self(out)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl PartialOrd for Hash32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl Default for Hash32 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Builds a domain-separated preimage: `tag_len:u8 ‖ tag ‖ rest...`, then hashes it.
///
/// Used by SigHashV1 (spec.md §4.2) to bind a digest to a fixed ASCII domain tag
/// before any chain- or transaction-specific bytes, preventing cross-protocol
/// signature reuse.
#[must_use]
pub fn domain_tagged_hash(tag: &str, rest: &[&[u8]]) -> Hash32 {
    let mut buf = Vec::new();
    buf.extend_from_slice(tag.as_bytes());
    for chunk in rest {
        buf.extend_from_slice(chunk);
    }
    Hash32::sha3_256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_all_zero_bytes() {
        assert!(Hash32::ZERO.is_zero());
        assert_eq!(Hash32::ZERO.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn sha3_256_is_deterministic_and_nonzero() {
        let a = Hash32::sha3_256(b"hello world");
        let b = Hash32::sha3_256(b"hello world");
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn hex_roundtrip() {
        let h = Hash32::sha3_256(b"roundtrip");
        let hex = h.to_hex();
        let back = Hash32::from_hex(&hex).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = Hash32::from_bytes([0x01; 32]);
        let b = Hash32::from_bytes([0x02; 32]);
        assert!(a < b);
    }

    #[test]
    fn sha3_256_matches_known_vector() {
        // NIST SHA3-256 empty-message test vector.
        let h = Hash32::sha3_256(b"");
        assert_eq!(
            h.to_hex(),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }
}
