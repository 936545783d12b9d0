//! UTXO Layer-1 consensus core.
//!
//! Module layout mirrors the component table: codec and hashing are leaves,
//! validators sit on top of the data model, the chain manager and
//! compact-block engine sit on top of the validators. This follows the
//! teacher's `bond-core` layering (`utxo` → `transaction`/`block` →
//! `blockchain`), generalized to the covenant/chain-work/reorg model this
//! spec requires.

pub mod codec;
pub mod compact_relay;
pub mod config;
pub mod covenant;
pub mod featurebits;
pub mod hashing;
pub mod model;
pub mod sigauth;
pub mod storage;

mod block_validator;
mod chain_manager;
mod tx_validator;

pub use block_validator::{
    connect_block, retarget_v1, subsidy, validate_block_basic, validate_output_covenants,
    BlockBasicOutcome, ConnectOutcome,
};
pub use chain_manager::{ChainManager, ForkChoiceOutcome};
pub use config::ChainProfile;
pub use tx_validator::{apply_non_coinbase_tx, ApplyTxOutcome};

pub use compact_relay::{
    evaluate_admission, eviction_order, missing_indices, prefill_round_trip,
    resolve_duplicate_commits, sendcmpct_mode, short_id_collision_fallback, AdmissionDecision,
    AdmissionRequest, CommitSighting, CompactSet, CompactTelemetry, DuplicateCommitOutcome,
    EvictionCandidate, PeerQuality, PrefillOutcome, QualityEvent, SetState,
};
pub use featurebits::{evaluate_deployment, Deployment, DeploymentState, DeploymentStatus};
pub use sigauth::SignatureVerifier;

/// Sentinel `suite_id` marking an unused witness slot (spec.md §6). Permitted
/// only where a covenant explicitly allows an optional slot (e.g. unused
/// MULTISIG positions).
pub const SUITE_ID_SENTINEL: u8 = 0;

/// `suite_id` for ML-DSA-87 (spec.md §4.3.2).
pub const SUITE_ID_ML_DSA_87: u8 = 0x01;

/// `suite_id` for SLH-DSA-SHAKE-256F, gated by `ChainProfile::suite_slh_dsa_activation_height`.
pub const SUITE_ID_SLH_DSA_SHAKE_256F: u8 = 0x02;
