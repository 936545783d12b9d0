//! Canonical identifiers: txid, wtxid, Merkle roots, witness commitment,
//! compact-block short-id, SigHashV1 (spec.md §4.2).
//!
//! Every hash in this module is SHA3-256, wrapped by `consensus_types::Hash32`.
//! The teacher hashes with Keccak256 (`shared/src/hash.rs`); this crate uses
//! `Hash32::sha3_256`/`sha3_256_concat` throughout instead (see DESIGN.md).

use consensus_types::Hash32;

use crate::codec::{serialize_outputs_for_sighash, serialize_tx, serialize_tx_without_witness};
use crate::model::Transaction;

const DOMAIN_SIGHASH_V1: &str = "RUBIN-SIGHASH-V1";

/// `txid = SHA3_256(tx_bytes_without_witness)`.
#[must_use]
pub fn txid(tx: &Transaction) -> Hash32 {
    Hash32::sha3_256(&serialize_tx_without_witness(tx))
}

/// `wtxid = SHA3_256(full_tx_bytes)`, except a coinbase's wtxid is defined as
/// all-zero for witness-Merkle purposes (spec.md §4.2).
#[must_use]
pub fn wtxid(tx: &Transaction) -> Hash32 {
    if tx.is_coinbase() {
        Hash32::ZERO
    } else {
        Hash32::sha3_256(&serialize_tx(tx))
    }
}

/// Merkle root over a sequence of leaves: pairwise SHA3-256, doubling the
/// last leaf of an odd level, iterating to a single root. Empty input yields
/// the zero hash (spec.md §4.2).
#[must_use]
pub fn merkle_root(leaves: &[Hash32]) -> Hash32 {
    if leaves.is_empty() {
        return Hash32::ZERO;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().expect("non-empty level");
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| Hash32::sha3_256_concat(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// `SHA3_256(witness_merkle_root ‖ 0^32)`, embedded in the coinbase's anchor
/// output (spec.md §4.2).
#[must_use]
pub fn witness_commitment(witness_merkle_root: Hash32) -> Hash32 {
    Hash32::sha3_256_concat(&witness_merkle_root, &Hash32::ZERO)
}

/// 6-byte compact-block short-id derived from `(wtxid, nonce1, nonce2)`
/// (spec.md §4.2): SHA3-256 of the concatenation, first 6 bytes.
#[must_use]
pub fn short_id(wtxid: Hash32, nonce1: u64, nonce2: u64) -> [u8; 6] {
    let mut buf = Vec::with_capacity(32 + 8 + 8);
    buf.extend_from_slice(wtxid.as_bytes());
    buf.extend_from_slice(&nonce1.to_le_bytes());
    buf.extend_from_slice(&nonce2.to_le_bytes());
    let digest = Hash32::sha3_256(&buf);
    let mut out = [0u8; 6];
    out.copy_from_slice(&digest.as_bytes()[0..6]);
    out
}

/// SigHashV1 preimage and digest for input `i` of value `input_value`
/// under chain id `chain_id` (spec.md §4.2):
///
/// `domain_tag ‖ chain_id ‖ version ‖ tx_kind ‖ tx_nonce ‖ input_index ‖
/// input_value ‖ SHA3_256(inputs_without_scriptsig) ‖ SHA3_256(outputs) ‖
/// locktime ‖ SHA3_256(da_payload)`, then SHA3-256 of the whole preimage.
#[must_use]
pub fn sighash_v1(tx: &Transaction, input_index: u32, input_value: u64, chain_id: &str) -> Hash32 {
    let mut preimage = Vec::new();
    preimage.extend_from_slice(DOMAIN_SIGHASH_V1.as_bytes());
    preimage.extend_from_slice(chain_id.as_bytes());
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.push(tx.tx_kind);
    preimage.extend_from_slice(&tx.tx_nonce.to_le_bytes());
    preimage.extend_from_slice(&input_index.to_le_bytes());
    preimage.extend_from_slice(&input_value.to_le_bytes());
    preimage.extend_from_slice(serialize_inputs_without_scriptsig(tx).as_bytes());
    preimage.extend_from_slice(Hash32::sha3_256(&serialize_outputs_for_sighash(tx)).as_bytes());
    preimage.extend_from_slice(&tx.locktime.to_le_bytes());
    preimage.extend_from_slice(Hash32::sha3_256(&tx.da_payload).as_bytes());
    Hash32::sha3_256(&preimage)
}

/// `SHA3_256` over each input's `(prev_txid, prev_vout, sequence)`, omitting
/// `script_sig`, concatenated in index order.
fn serialize_inputs_without_scriptsig(tx: &Transaction) -> Hash32 {
    let mut buf = Vec::new();
    for input in &tx.inputs {
        buf.extend_from_slice(input.prev_outpoint.txid.as_bytes());
        buf.extend_from_slice(&input.prev_outpoint.vout.to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    }
    Hash32::sha3_256(&buf)
}
