use thiserror::Error;

/// Transaction-level consensus rejections (spec.md §6).
///
/// Each `Display` string is the stable error code the CLI/telemetry layer
/// must emit verbatim; never reword these once published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("TX_ERR_PARSE")]
    Parse,
    #[error("TX_ERR_NONCE_REPLAY")]
    NonceReplay,
    #[error("TX_ERR_TIMELOCK_NOT_MET")]
    TimelockNotMet,
    #[error("TX_ERR_SIG_ALG_INVALID")]
    SigAlgInvalid,
    #[error("TX_ERR_SIG_INVALID")]
    SigInvalid,
    #[error("TX_ERR_VALUE_CONSERVATION")]
    ValueConservation,
    #[error("TX_ERR_VAULT_MULTI_INPUT_FORBIDDEN")]
    VaultMultiInputForbidden,
    #[error("TX_ERR_VAULT_OWNER_AUTH_REQUIRED")]
    VaultOwnerAuthRequired,
    #[error("TX_ERR_VAULT_FEE_SPONSOR_FORBIDDEN")]
    VaultFeeSponsorForbidden,
    #[error("TX_ERR_VAULT_WHITELIST_NOT_CANONICAL")]
    VaultWhitelistNotCanonical,
    /// Structural/covenant failures that do not have a dedicated §6 code get a
    /// freeform message; the code (`TX_ERR_STRUCTURAL`) is still stable.
    #[error("TX_ERR_STRUCTURAL: {0}")]
    Structural(String),
    #[error("TX_ERR_UTXO_MISSING")]
    UtxoMissing,
    #[error("TX_ERR_COINBASE_IMMATURE")]
    CoinbaseImmature,
}

/// Block-level consensus rejections (spec.md §6).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("BLOCK_ERR_TIMESTAMP_OLD")]
    TimestampOld,
    #[error("BLOCK_ERR_TIMESTAMP_FUTURE")]
    TimestampFuture,
    #[error("BLOCK_ERR_SUBSIDY_EXCEEDED")]
    SubsidyExceeded,
    #[error("BLOCK_ERR_PARSE")]
    Parse,
    #[error("BLOCK_ERR_POW_INVALID")]
    PowInvalid,
    #[error("BLOCK_ERR_BAD_PREV_HASH")]
    BadPrevHash,
    #[error("BLOCK_ERR_BAD_TARGET")]
    BadTarget,
    #[error("BLOCK_ERR_BAD_MERKLE_ROOT")]
    BadMerkleRoot,
    #[error("BLOCK_ERR_BAD_WITNESS_COMMITMENT")]
    BadWitnessCommitment,
    #[error("BLOCK_ERR_WEIGHT_EXCEEDED")]
    WeightExceeded,
    #[error("BLOCK_ERR_TOO_MANY_TXS")]
    TooManyTxs,
    #[error("BLOCK_ERR_BAD_COINBASE")]
    BadCoinbase,
    #[error("BLOCK_ERR_TX: {0}")]
    Tx(TxError),
}

/// Chain-manager-level failures: fork choice, apply, reorg (spec.md §4.5, §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("CHAIN_ERR_UNKNOWN_PARENT")]
    UnknownParent,
    #[error("CHAIN_ERR_BLOCK: {0}")]
    Block(BlockError),
    #[error("CHAIN_ERR_NO_COMMON_ANCESTOR")]
    NoCommonAncestor,
    #[error("CHAIN_ERR_STORAGE: {0}")]
    Storage(String),
}

impl From<BlockError> for ChainError {
    fn from(err: BlockError) -> Self {
        ChainError::Block(err)
    }
}

impl From<TxError> for BlockError {
    fn from(err: TxError) -> Self {
        BlockError::Tx(err)
    }
}

/// Compact-block relay engine failures (spec.md §4.6).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompactRelayError {
    #[error("COMPACT_ERR_SET_EVICTED")]
    SetEvicted,
    #[error("COMPACT_ERR_CAP_EXCEEDED")]
    CapExceeded,
}

/// Top-level error the persistence/crypto interfaces (spec.md §6) hand back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    CompactRelay(#[from] CompactRelayError),
}
