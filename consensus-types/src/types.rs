//! Primitive aliases shared across the consensus crates.

/// Value in the chain's base unit.
pub type Amount = u64;

/// Block height, counted from the genesis block at height 0.
pub type BlockHeight = u64;

/// Unix timestamp in seconds, as carried in block headers and locktimes.
pub type Timestamp = u64;

/// Compact-block / DA chunk peer identifier; opaque to the consensus core.
pub type PeerId = String;

/// Data-availability set identifier; opaque to the consensus core.
pub type DaId = String;
