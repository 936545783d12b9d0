//! Profile-specified consensus constants.
//!
//! spec.md §9 Open Questions is explicit that `COINBASE_MATURITY`,
//! `MAX_BLOCK_WEIGHT`, `MAX_TXS`, the retarget window size `W`, and
//! `SUBSIDY_TOTAL`/`DURATION` are chain-instance profile values that must be
//! parameterized, not hardcoded. `ChainProfile` is that parameter set;
//! `ChainProfile::default()` picks one concrete instantiation (documented in
//! DESIGN.md) so the crate and its tests have something to run against, the
//! way the teacher's `NetworkParams::default()` (`bond-core/blockchain.rs`)
//! picks concrete devnet values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProfile {
    /// Human-readable chain identifier, echoed into the manifest.
    pub chain_id: String,

    /// Blocks a coinbase output must age before it can be spent (spec.md §4.3 step 4).
    pub coinbase_maturity: u64,

    /// Maximum block weight in weight units (spec.md §4.4).
    pub max_block_weight: u64,

    /// Maximum transaction count per block (spec.md §4.4).
    pub max_txs: u64,

    /// Retarget window size `W` in blocks (spec.md §4.4).
    pub retarget_window: u64,

    /// Target inter-block spacing in seconds, defining the retarget window's
    /// ideal span as `retarget_window * target_block_time_secs`.
    pub target_block_time_secs: u64,

    /// Total base-unit supply distributed across `subsidy_duration` blocks,
    /// per the flat (non-halving) subsidy schedule of spec.md §4.4.
    pub subsidy_total: u64,

    /// Number of blocks over which `subsidy_total` is distributed.
    pub subsidy_duration: u64,

    /// Maximum permitted future drift of a block timestamp past MTP, in seconds.
    pub max_future_drift_secs: u64,

    /// Activation height for SLH-DSA-SHAKE-256F (suite 0x02), spec.md §4.3.2.
    pub suite_slh_dsa_activation_height: u64,

    /// Byte cap for a single peer's orphan DA chunk holdings (spec.md §6).
    pub per_peer_orphan_limit_bytes: u64,

    /// Byte cap for a single da_id's orphan chunk holdings.
    pub per_da_id_orphan_limit_bytes: u64,

    /// Global byte cap across all orphan chunk holdings.
    pub global_orphan_limit_bytes: u64,

    /// Byte cap for pinned (complete) compact-set payloads.
    pub pinned_cap_bytes: u64,

    /// Storm-mode trigger threshold, as a percentage of `global_orphan_limit_bytes`.
    pub storm_trigger_pct: u8,

    /// Compact-set eviction TTL, in blocks, before a non-pinned set decays.
    pub compact_set_ttl_blocks: u32,

    /// Peer-quality grace window, in blocks, during which negative deltas are halved.
    pub peer_quality_grace_blocks: u64,
}

impl ChainProfile {
    /// Maximum DA chunk count per spec.md §6: `floor(32_000_000 / 524_288)`.
    pub const MAX_DA_CHUNK_COUNT: u32 = 32_000_000 / 524_288;

    /// Hash size in bytes (spec.md §3, §6).
    pub const HASH_SIZE: usize = 32;

    /// Block header size in bytes (spec.md §3).
    pub const BLOCK_HEADER_SIZE: usize = 116;

    /// Median-time-past window length (spec.md §4.4).
    pub const MTP_WINDOW: usize = 11;
}

impl Default for ChainProfile {
    fn default() -> Self {
        Self {
            chain_id: "devnet".to_string(),
            coinbase_maturity: 100,
            max_block_weight: 4_000_000,
            max_txs: 100_000,
            retarget_window: 2016,
            target_block_time_secs: 600,
            subsidy_total: 2_100_000_000_000_000,
            subsidy_duration: 10_500_000,
            max_future_drift_secs: 7_200,
            suite_slh_dsa_activation_height: 0,
            per_peer_orphan_limit_bytes: 4 * 1024 * 1024,
            per_da_id_orphan_limit_bytes: 8 * 1024 * 1024,
            global_orphan_limit_bytes: 64 * 1024 * 1024,
            pinned_cap_bytes: 96_000_000,
            storm_trigger_pct: 90,
            compact_set_ttl_blocks: 3,
            peer_quality_grace_blocks: 1_440,
        }
    }
}
