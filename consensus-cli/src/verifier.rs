//! A signature verifier the CLI can run without linking a real PQC crate
//! (spec.md §1 keeps ML-DSA-87/SLH-DSA-SHAKE-256F an external collaborator).
//! `ThinVerifier` accepts exactly the signature a caller would get back from
//! `sha3_256(pubkey ++ digest)` — a deterministic stand-in, not a real
//! signature scheme. A production deployment swaps this for a verifier
//! backed by the actual suites.

use consensus_core::SignatureVerifier;
use consensus_types::Hash32;

pub struct ThinVerifier;

impl SignatureVerifier for ThinVerifier {
    fn verify(&self, _suite_id: u8, pubkey: &[u8], digest: &Hash32, signature: &[u8]) -> bool {
        let mut buf = Vec::with_capacity(pubkey.len() + 32);
        buf.extend_from_slice(pubkey);
        buf.extend_from_slice(digest.as_bytes());
        Hash32::sha3_256(&buf).as_bytes().as_slice() == signature
    }
}
