//! Leaf types shared across the consensus core.
//!
//! Nothing in this crate depends on transaction or block shapes — those live
//! in `consensus-core`. This mirrors the teacher repo's `shared`/`bond-core`
//! split, one level removed from any single chain's transaction format.

pub mod error;
pub mod hash;
pub mod types;
pub mod work;

pub use error::{BlockError, ChainError, CompactRelayError, ConsensusError, TxError};
pub use hash::{domain_tagged_hash, Hash32};
pub use types::{Amount, BlockHeight, DaId, PeerId, Timestamp};
pub use work::ChainWork;
