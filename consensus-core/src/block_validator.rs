//! Block Validator (spec.md §4.4): header PoW/target/timestamp/retarget
//! checks, body checks (Merkle roots, weight, tx count), coinbase subsidy.
//!
//! Grounded on `zebra-consensus::block::check`'s style of small composable
//! check functions (`difficulty_is_valid`, `coinbase_is_first`, …) rather
//! than the teacher's single `Blockchain::validate_block`
//! (`bond-core/src/blockchain.rs`), since this spec's header rules are
//! richer (retarget math, witness commitment) than the teacher's mining
//! model covers.

use std::collections::HashSet;

use consensus_types::{BlockError, Hash32, TxError};
use primitive_types::U256;

use crate::config::ChainProfile;
use crate::covenant::{Covenant, TAG_ANCHOR};
use crate::hashing::{merkle_root, txid, witness_commitment, wtxid};
use crate::model::Block;
use crate::sigauth::SignatureVerifier;
use crate::storage::UtxoView;
use crate::tx_validator::apply_non_coinbase_tx;

/// Maximum target value (minimum difficulty): all bits set.
const POW_LIMIT: Hash32 = Hash32::from_bytes([0xFF; 32]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBasicOutcome {
    pub block_hash: Hash32,
    pub block: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub new_utxo_count_delta: i64,
    pub already_generated_after: u64,
    pub sum_fees: u64,
}

/// Header + body structural/PoW/timestamp checks (spec.md §4.4), independent
/// of any UTXO view. `prev_timestamps` holds up to the 11 most recent block
/// timestamps, oldest first, for the median-time-past checks.
pub fn validate_block_basic(
    bytes: &[u8],
    expected_prev: Option<Hash32>,
    expected_target: Option<Hash32>,
    height: u64,
    prev_timestamps: &[u64],
    max_future_drift_secs: u64,
    profile: &ChainProfile,
) -> Result<BlockBasicOutcome, BlockError> {
    if bytes.len() < ChainProfile::BLOCK_HEADER_SIZE {
        return Err(BlockError::Parse);
    }
    let block = crate::codec::parse_block(bytes)?;
    let header = &block.header;

    if let Some(expected) = expected_prev {
        if header.prev_block_hash != expected {
            return Err(BlockError::BadPrevHash);
        }
    }
    if let Some(expected) = expected_target {
        if header.target != expected {
            return Err(BlockError::BadTarget);
        }
    }

    let header_bytes = crate::codec::serialize_block_header(header);
    let block_hash = Hash32::sha3_256(&header_bytes);
    if block_hash.as_u256() > header.target.as_u256() {
        return Err(BlockError::PowInvalid);
    }

    if !prev_timestamps.is_empty() {
        let mtp = median_timestamp(prev_timestamps);
        if header.timestamp <= mtp {
            return Err(BlockError::TimestampOld);
        }
        if header.timestamp > mtp.saturating_add(max_future_drift_secs) {
            return Err(BlockError::TimestampFuture);
        }
    }

    if block.txs.len() as u64 > profile.max_txs {
        return Err(BlockError::TooManyTxs);
    }
    if bytes.len() as u64 > profile.max_block_weight {
        return Err(BlockError::WeightExceeded);
    }

    let coinbase = block.txs.first().ok_or(BlockError::BadCoinbase)?;
    if !coinbase.is_coinbase() {
        return Err(BlockError::BadCoinbase);
    }
    if block.txs.iter().skip(1).any(|tx| tx.is_coinbase()) {
        return Err(BlockError::BadCoinbase);
    }
    if coinbase.coinbase_height() as u64 != height {
        return Err(BlockError::BadCoinbase);
    }

    let txids: Vec<Hash32> = block.txs.iter().map(txid).collect();
    if merkle_root(&txids) != header.merkle_root {
        return Err(BlockError::BadMerkleRoot);
    }

    let wtxids: Vec<Hash32> = block.txs.iter().map(wtxid).collect();
    let computed_witness_root = merkle_root(&wtxids);
    let commitment = find_witness_commitment(coinbase)?;
    if witness_commitment(computed_witness_root) != commitment {
        return Err(BlockError::BadWitnessCommitment);
    }

    Ok(BlockBasicOutcome { block_hash, block })
}

fn find_witness_commitment(coinbase: &crate::model::Transaction) -> Result<Hash32, BlockError> {
    for output in &coinbase.outputs {
        if output.covenant_type == TAG_ANCHOR && output.covenant_data.len() == 32 {
            let mut buf = [0u8; 32];
            buf.copy_from_slice(&output.covenant_data);
            return Ok(Hash32::from_bytes(buf));
        }
    }
    Err(BlockError::BadWitnessCommitment)
}

fn median_timestamp(timestamps: &[u64]) -> u64 {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

/// `subsidy(h) = floor(SUBSIDY_TOTAL / DURATION)` for `h < DURATION`,
/// otherwise 0; the `SUBSIDY_TOTAL mod DURATION` remainder is distributed by
/// adding 1 to the first that many heights (spec.md §4.4).
#[must_use]
pub fn subsidy(height: u64, profile: &ChainProfile) -> u64 {
    if height >= profile.subsidy_duration {
        return 0;
    }
    let base = profile.subsidy_total / profile.subsidy_duration;
    let remainder = profile.subsidy_total % profile.subsidy_duration;
    if height < remainder {
        base + 1
    } else {
        base
    }
}

/// Retargets `old_target` over a window of `window_len` blocks spanning
/// `[window_first_timestamp, window_last_timestamp]` (spec.md §4.4):
/// `new_target = old_target * actual_span / ideal_span`, clamped to
/// `[old/4, old*4]` and to `POW_LIMIT`.
#[must_use]
pub fn retarget_v1(
    old_target: Hash32,
    window_first_timestamp: u64,
    window_last_timestamp: u64,
    window_len: u64,
    target_block_time_secs: u64,
) -> Hash32 {
    let actual_span = window_last_timestamp.saturating_sub(window_first_timestamp).max(1);
    let ideal_span = window_len.saturating_mul(target_block_time_secs).max(1);

    let old = old_target.as_u256();
    let scaled = old
        .checked_mul(U256::from(actual_span))
        .unwrap_or(U256::MAX)
        / U256::from(ideal_span);

    let floor = old / U256::from(4u8);
    let ceil = old.saturating_mul(U256::from(4u8)).min(POW_LIMIT.as_u256());

    let clamped = scaled.clamp(floor, ceil).min(POW_LIMIT.as_u256());
    Hash32::from_u256(clamped)
}

/// Validates and applies a block's body against `utxo_view` (spec.md §4.5
/// apply path step (a)/(b)): every non-coinbase tx via
/// `apply_non_coinbase_tx`, then the coinbase subsidy check.
#[allow(clippy::too_many_arguments)]
pub fn connect_block(
    block: &Block,
    utxo_view: &impl UtxoView,
    height: u64,
    block_mtp: u64,
    already_generated: u64,
    chain_id: &str,
    profile: &ChainProfile,
    verifier: &dyn SignatureVerifier,
) -> Result<ConnectOutcome, BlockError> {
    let mut seen_nonces = HashSet::new();
    let mut sum_fees: u64 = 0;
    let mut utxo_count_delta: i64 = 0;

    let coinbase = block.txs.first().ok_or(BlockError::BadCoinbase)?;
    seen_nonces.insert(coinbase.tx_nonce);
    for tx in block.txs.iter().skip(1) {
        let outcome = apply_non_coinbase_tx(
            tx,
            utxo_view,
            height,
            block.header.timestamp,
            block_mtp,
            chain_id,
            profile,
            &mut seen_nonces,
            verifier,
        )
        .map_err(BlockError::Tx)?;
        sum_fees = sum_fees.checked_add(outcome.fee).ok_or(BlockError::SubsidyExceeded)?;
        utxo_count_delta += outcome.utxo_count_delta;
    }

    let entitlement = subsidy(height, profile)
        .checked_add(sum_fees)
        .ok_or(BlockError::SubsidyExceeded)?;
    let mut coinbase_out_sum: u64 = 0;
    for output in &coinbase.outputs {
        coinbase_out_sum = coinbase_out_sum
            .checked_add(output.value)
            .ok_or(BlockError::SubsidyExceeded)?;
    }
    if coinbase_out_sum > entitlement {
        return Err(BlockError::SubsidyExceeded);
    }

    utxo_count_delta += coinbase.outputs.len() as i64;

    Ok(ConnectOutcome {
        new_utxo_count_delta: utxo_count_delta,
        already_generated_after: already_generated.saturating_add(subsidy(height, profile)),
        sum_fees,
    })
}

/// Validates the covenant-policy shape of every output in a block, without
/// resolving inputs. Used as a cheap pre-filter before full `connect_block`.
pub fn validate_output_covenants(block: &Block) -> Result<(), TxError> {
    for tx in &block.txs {
        for output in &tx.outputs {
            let covenant = crate::covenant::parse_covenant(output.covenant_type, &output.covenant_data, output.value)?;
            let _: Covenant = covenant;
        }
    }
    Ok(())
}
