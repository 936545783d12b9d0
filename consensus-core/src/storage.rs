//! Storage interface (spec.md §3, §4.5, §8): an abstract UTXO map plus undo
//! record and manifest persistence, consumed by the Chain Manager.
//!
//! The teacher keeps chainstate as a bare `HashMap<String, Utxo>`
//! (`bond-core/src/utxo.rs`), with no undo log and no manifest. This module
//! generalizes that into a trait so a host can back it with bbolt, sled, or
//! plain memory, while keeping the in-memory reference impl the teacher's
//! tests exercise directly.

use std::collections::BTreeMap;

use consensus_types::{ChainError, ChainWork, Hash32};

use crate::model::{BlockIndexEntry, BlockStatus, Manifest, Outpoint, UndoRecord, UtxoEntry};

/// Read-only view of a UTXO set, as seen during transaction validation.
/// Ascending-outpoint iteration is required wherever iteration order
/// influences a hash or a decision (spec.md §4.5).
pub trait UtxoView {
    fn get_utxo(&self, outpoint: &Outpoint) -> Option<UtxoEntry>;
}

/// Full chainstate storage: UTXO map, block index, undo log, manifest.
/// All mutation happens through `apply_block`/`undo_block`-style atomic
/// batches at the Chain Manager layer; this trait exposes the primitives
/// those batches compose.
pub trait ChainStore: UtxoView {
    fn insert_utxo(&mut self, outpoint: Outpoint, entry: UtxoEntry);
    fn remove_utxo(&mut self, outpoint: &Outpoint) -> Option<UtxoEntry>;

    fn block_index_entry(&self, hash: &Hash32) -> Option<BlockIndexEntry>;
    fn set_block_index_entry(&mut self, hash: Hash32, entry: BlockIndexEntry);

    fn store_undo(&mut self, block_hash: Hash32, undo: UndoRecord);
    fn load_undo(&self, block_hash: &Hash32) -> Option<UndoRecord>;

    fn manifest(&self) -> Manifest;
    fn set_manifest(&mut self, manifest: Manifest);

    /// Applies `undo` against the current UTXO set: deletes every created
    /// outpoint, restores every spent entry (spec.md §4.5 step (b)/(c) and
    /// the reorg disconnect path).
    fn apply_undo(&mut self, undo: &UndoRecord) {
        for outpoint in &undo.created {
            self.remove_utxo(outpoint);
        }
        for (outpoint, entry) in &undo.spent {
            self.insert_utxo(*outpoint, entry.clone());
        }
    }
}

/// In-memory reference implementation. `BTreeMap` gives deterministic
/// ascending-outpoint iteration for free, matching spec.md §4.5's
/// determinism requirement without a separate sort step.
#[derive(Debug, Default)]
pub struct MemChainStore {
    utxos: BTreeMap<Outpoint, UtxoEntry>,
    block_index: BTreeMap<Hash32, BlockIndexEntry>,
    undo_log: BTreeMap<Hash32, UndoRecord>,
    manifest: Option<Manifest>,
}

impl MemChainStore {
    #[must_use]
    pub fn new(chain_id: String) -> Self {
        Self {
            utxos: BTreeMap::new(),
            block_index: BTreeMap::new(),
            undo_log: BTreeMap::new(),
            manifest: Some(Manifest::genesis(chain_id)),
        }
    }

    /// Ascending-outpoint iterator over the live UTXO set (spec.md §4.5).
    pub fn iter_utxos(&self) -> impl Iterator<Item = (&Outpoint, &UtxoEntry)> {
        self.utxos.iter()
    }

    #[must_use]
    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }
}

impl UtxoView for MemChainStore {
    fn get_utxo(&self, outpoint: &Outpoint) -> Option<UtxoEntry> {
        self.utxos.get(outpoint).cloned()
    }
}

impl ChainStore for MemChainStore {
    fn insert_utxo(&mut self, outpoint: Outpoint, entry: UtxoEntry) {
        self.utxos.insert(outpoint, entry);
    }

    fn remove_utxo(&mut self, outpoint: &Outpoint) -> Option<UtxoEntry> {
        self.utxos.remove(outpoint)
    }

    fn block_index_entry(&self, hash: &Hash32) -> Option<BlockIndexEntry> {
        self.block_index.get(hash).cloned()
    }

    fn set_block_index_entry(&mut self, hash: Hash32, entry: BlockIndexEntry) {
        self.block_index.insert(hash, entry);
    }

    fn store_undo(&mut self, block_hash: Hash32, undo: UndoRecord) {
        self.undo_log.insert(block_hash, undo);
    }

    fn load_undo(&self, block_hash: &Hash32) -> Option<UndoRecord> {
        self.undo_log.get(block_hash).cloned()
    }

    fn manifest(&self) -> Manifest {
        self.manifest
            .clone()
            .unwrap_or_else(|| Manifest::genesis(String::new()))
    }

    fn set_manifest(&mut self, manifest: Manifest) {
        self.manifest = Some(manifest);
    }
}

/// Looks up the greatest cumulative work across a set of candidate tip
/// hashes, breaking ties by lexicographically smallest hash (spec.md §4.5).
pub fn best_tip(store: &impl ChainStore, candidates: &[Hash32]) -> Result<Hash32, ChainError> {
    candidates
        .iter()
        .filter_map(|hash| store.block_index_entry(hash).map(|entry| (*hash, entry.cumulative_work)))
        .max_by(|(hash_a, work_a), (hash_b, work_b)| {
            work_a.cmp(work_b).then_with(|| hash_b.cmp(hash_a))
        })
        .map(|(hash, _)| hash)
        .ok_or(ChainError::NoCommonAncestor)
}
