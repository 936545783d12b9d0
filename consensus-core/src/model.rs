//! Consensus data model (spec.md §3).

use consensus_types::Hash32;
use serde::{Deserialize, Serialize};

/// (txid, vout) pair identifying one output of one transaction.
///
/// Total order: txid ascending, then vout ascending — the UTXO map's
/// canonical iteration order (spec.md §3, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: Hash32,
    pub vout: u32,
}

impl Outpoint {
    #[must_use]
    pub const fn new(txid: Hash32, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// The outpoint coinbase inputs carry: all-zero txid, `0xFFFFFFFF` vout.
    #[must_use]
    pub const fn coinbase_marker() -> Self {
        Self {
            txid: Hash32::ZERO,
            vout: 0xFFFF_FFFF,
        }
    }

    #[must_use]
    pub fn is_coinbase_marker(&self) -> bool {
        self.txid.is_zero() && self.vout == 0xFFFF_FFFF
    }
}

/// A living element of chainstate: created when its containing tx applies,
/// destroyed on spend, immutable while live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub value: u64,
    pub covenant_type: u16,
    pub covenant_data: Vec<u8>,
    pub creation_height: u64,
    pub created_by_coinbase: bool,
}

/// Per-input witness: a pubkey/signature pair (or a sentinel suite_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub suite_id: u8,
    pub pubkey: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Witness {
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.suite_id == crate::SUITE_ID_SENTINEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_outpoint: Outpoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub covenant_type: u16,
    pub covenant_data: Vec<u8>,
}

/// tx_kind discriminant (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    Standard = 0,
    DaBearing1 = 1,
    DaBearing2 = 2,
}

impl TxKind {
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TxKind::Standard),
            1 => Some(TxKind::DaBearing1),
            2 => Some(TxKind::DaBearing2),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn carries_da_payload(self) -> bool {
        matches!(self, TxKind::DaBearing1 | TxKind::DaBearing2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub tx_kind: u8,
    pub tx_nonce: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
    pub witnesses: Vec<Witness>,
    pub da_payload: Vec<u8>,
}

impl Transaction {
    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_outpoint.is_coinbase_marker()
            && self.inputs[0].sequence == 0xFFFF_FFFF
    }

    /// height of a well-formed coinbase is its `locktime` (spec.md §3).
    #[must_use]
    pub fn coinbase_height(&self) -> u32 {
        self.locktime
    }
}

/// Block header (spec.md §3): version ‖ prev_hash[32] ‖ merkle_root[32] ‖
/// timestamp ‖ target[32] ‖ nonce, little-endian, 116 bytes total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash32,
    pub merkle_root: Hash32,
    pub timestamp: u64,
    pub target: Hash32,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    #[must_use]
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.txs.first()
    }
}

/// Status of a known block header (spec.md §3). Monotone toward terminal
/// invalidity, except `Orphaned -> anything` on the parent's arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    Unknown,
    Valid,
    InvalidHeader,
    InvalidAncestry,
    Orphaned,
}

impl BlockStatus {
    #[must_use]
    pub fn is_terminal_invalid(self) -> bool {
        matches!(self, BlockStatus::InvalidHeader | BlockStatus::InvalidAncestry)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockIndexEntry {
    pub height: u64,
    pub prev_hash: Hash32,
    pub timestamp: u64,
    pub cumulative_work: consensus_types::ChainWork,
    pub already_generated: u64,
    pub status: BlockStatus,
}

/// Exact reversal data for one applied block (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoRecord {
    pub spent: Vec<(Outpoint, UtxoEntry)>,
    pub created: Vec<Outpoint>,
}

/// Single commit point persisted atomically after every apply or undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub chain_id: String,
    pub tip_hash: Hash32,
    pub tip_height: u64,
    pub tip_cumulative_work: consensus_types::ChainWork,
    /// Running total of coins minted by coinbase subsidies up to and
    /// including the tip (spec.md §4.5's `already_generated` tracked across
    /// applies, not merely the single-block hint `connect_block` receives).
    pub already_generated: u64,
}

impl Manifest {
    #[must_use]
    pub fn genesis(chain_id: String) -> Self {
        Self {
            schema_version: 1,
            chain_id,
            tip_hash: Hash32::ZERO,
            tip_height: 0,
            tip_cumulative_work: consensus_types::ChainWork::ZERO,
            already_generated: 0,
        }
    }
}
