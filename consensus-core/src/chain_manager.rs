//! Chain Manager (spec.md §4.5): header index, ChainWork-ordered fork
//! choice, atomic apply with undo emission, disconnect/connect reorg.
//!
//! The teacher's `Blockchain` (`bond-core/src/blockchain.rs`) holds a single
//! linear `Vec<Block>` with no fork choice, no undo log, and no reorg path.
//! This module keeps its role (the single owner of chainstate mutation) but
//! rebuilds the mechanism entirely: a `ChainStore`-backed index keyed by
//! hash, ChainWork accumulation, and an explicit disconnect/connect walk.

use std::collections::HashSet;

use consensus_types::{ChainError, ChainWork, Hash32};

use crate::block_validator::connect_block;
use crate::config::ChainProfile;
use crate::hashing::txid;
use crate::model::{Block, BlockIndexEntry, BlockStatus, Manifest, Outpoint, UndoRecord, UtxoEntry};
use crate::sigauth::SignatureVerifier;
use crate::storage::{best_tip, ChainStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkChoiceOutcome {
    pub new_tip: Hash32,
    pub new_height: u64,
}

pub struct ChainManager<S: ChainStore> {
    store: S,
    chain_id: String,
}

impl<S: ChainStore> ChainManager<S> {
    pub fn new(store: S, chain_id: String) -> Self {
        Self { store, chain_id }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[must_use]
    pub fn tip(&self) -> Manifest {
        self.store.manifest()
    }

    /// ChainWork-ordered fork choice with lexicographically-smallest-hash
    /// tie-break (spec.md §4.5).
    pub fn fork_choice_select(&self, candidates: &[Hash32]) -> Result<Hash32, ChainError> {
        best_tip(&self.store, candidates)
    }

    /// Median of up to the 11 most recent block timestamps ending at
    /// `parent_hash`, for the child's MTP check (spec.md §4.4, §6).
    pub fn median_time_past(&self, parent_hash: Hash32) -> u64 {
        let mut timestamps = Vec::with_capacity(ChainProfile::MTP_WINDOW);
        let mut cursor = Some(parent_hash);
        while timestamps.len() < ChainProfile::MTP_WINDOW {
            let Some(hash) = cursor else { break };
            let Some(entry) = self.store.block_index_entry(&hash) else { break };
            timestamps.push(entry.timestamp);
            cursor = if entry.height == 0 { None } else { Some(entry.prev_hash) };
        }
        if timestamps.is_empty() {
            return 0;
        }
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }

    /// Applies `block` extending the current tip: full validation via
    /// `connect_block`, then a single atomic commit — delete spent
    /// outpoints, insert created outpoints, store the undo record, advance
    /// the manifest, mark the block index entry Valid (spec.md §4.5).
    pub fn apply_block(
        &mut self,
        block: Block,
        height: u64,
        profile: &ChainProfile,
        verifier: &dyn SignatureVerifier,
    ) -> Result<ForkChoiceOutcome, ChainError> {
        let tip = self.store.manifest();
        if height > 0 && block.header.prev_block_hash != tip.tip_hash {
            return Err(ChainError::UnknownParent);
        }

        let header_bytes = crate::codec::serialize_block_header(&block.header);
        let block_hash = Hash32::sha3_256(&header_bytes);
        let block_mtp = self.median_time_past(block.header.prev_block_hash);

        let connect_outcome = connect_block(
            &block,
            &self.store,
            height,
            block_mtp,
            tip.already_generated,
            &self.chain_id,
            profile,
            verifier,
        )?;

        let mut undo = UndoRecord::default();
        let mut seen_nonces: HashSet<u64> = HashSet::new();
        for tx in block.txs.iter().skip(1) {
            seen_nonces.insert(tx.tx_nonce);
            for input in &tx.inputs {
                let entry = self
                    .store
                    .get_utxo(&input.prev_outpoint)
                    .expect("connect_block already validated this input resolves");
                self.store.remove_utxo(&input.prev_outpoint);
                undo.spent.push((input.prev_outpoint, entry));
            }
            let tx_id = txid(tx);
            for (i, output) in tx.outputs.iter().enumerate() {
                let outpoint = Outpoint::new(tx_id, i as u32);
                self.store.insert_utxo(
                    outpoint,
                    UtxoEntry {
                        value: output.value,
                        covenant_type: output.covenant_type,
                        covenant_data: output.covenant_data.clone(),
                        creation_height: height,
                        created_by_coinbase: false,
                    },
                );
                undo.created.push(outpoint);
            }
        }

        let coinbase = &block.txs[0];
        let coinbase_txid = txid(coinbase);
        for (i, output) in coinbase.outputs.iter().enumerate() {
            let outpoint = Outpoint::new(coinbase_txid, i as u32);
            self.store.insert_utxo(
                outpoint,
                UtxoEntry {
                    value: output.value,
                    covenant_type: output.covenant_type,
                    covenant_data: output.covenant_data.clone(),
                    creation_height: height,
                    created_by_coinbase: true,
                },
            );
            undo.created.push(outpoint);
        }

        self.store.store_undo(block_hash, undo);

        let work = ChainWork::from_target(&block.header.target);
        let cumulative_work = tip.tip_cumulative_work + work;
        self.store.set_block_index_entry(
            block_hash,
            BlockIndexEntry {
                height,
                prev_hash: block.header.prev_block_hash,
                timestamp: block.header.timestamp,
                cumulative_work,
                already_generated: connect_outcome.already_generated_after,
                status: BlockStatus::Valid,
            },
        );
        self.store.set_manifest(Manifest {
            schema_version: 1,
            chain_id: self.chain_id.clone(),
            tip_hash: block_hash,
            tip_height: height,
            tip_cumulative_work: cumulative_work,
            already_generated: connect_outcome.already_generated_after,
        });

        tracing::debug!(
            block_hash = %block_hash,
            height,
            cumulative_work = %cumulative_work,
            "applied block"
        );

        Ok(ForkChoiceOutcome {
            new_tip: block_hash,
            new_height: height,
        })
    }

    /// Disconnects the current tip: restores its undo record, rewinds the
    /// manifest to the parent (spec.md §4.5 reorg step (3)).
    pub fn disconnect_tip(&mut self) -> Result<Hash32, ChainError> {
        let manifest = self.store.manifest();
        let undo = self
            .store
            .load_undo(&manifest.tip_hash)
            .ok_or_else(|| ChainError::Storage("missing undo record for tip".to_string()))?;
        self.store.apply_undo(&undo);

        let tip_entry = self
            .store
            .block_index_entry(&manifest.tip_hash)
            .ok_or(ChainError::UnknownParent)?;
        let parent_hash = tip_entry.prev_hash;
        let parent_entry = self
            .store
            .block_index_entry(&parent_hash)
            .ok_or(ChainError::UnknownParent)?;

        self.store.set_manifest(Manifest {
            schema_version: 1,
            chain_id: self.chain_id.clone(),
            tip_hash: parent_hash,
            tip_height: parent_entry.height,
            tip_cumulative_work: parent_entry.cumulative_work,
            already_generated: parent_entry.already_generated,
        });

        tracing::debug!(disconnected = %manifest.tip_hash, new_tip = %parent_hash, "disconnected tip");

        Ok(parent_hash)
    }

    /// Reorgs from the current tip to `new_tip_hash`: walks both branches to
    /// a common ancestor, disconnects the old branch down to the fork
    /// point, then connects the new branch block-by-block via
    /// `fetch_block` (spec.md §4.5 reorg). A failure mid-connect marks the
    /// failing block `InvalidAncestry` and stops; the chain remains at
    /// whatever tip the last successful commit reached.
    pub fn reorg_to(
        &mut self,
        new_tip_hash: Hash32,
        fetch_block: &dyn Fn(Hash32) -> Option<Block>,
        profile: &ChainProfile,
        verifier: &dyn SignatureVerifier,
    ) -> Result<ForkChoiceOutcome, ChainError> {
        let old_tip_hash = self.store.manifest().tip_hash;
        let fork_point = self.find_common_ancestor(old_tip_hash, new_tip_hash)?;

        tracing::warn!(old_tip = %old_tip_hash, new_tip = %new_tip_hash, fork_point = %fork_point, "reorg starting");

        loop {
            let manifest = self.store.manifest();
            if manifest.tip_hash == fork_point {
                break;
            }
            self.disconnect_tip()?;
        }

        let path = self.path_from_fork_to(fork_point, new_tip_hash)?;
        for hash in path {
            let entry = self
                .store
                .block_index_entry(&hash)
                .ok_or(ChainError::UnknownParent)?;
            let block = fetch_block(hash)
                .ok_or_else(|| ChainError::Storage("missing block body for reorg".to_string()))?;
            match self.apply_block(block, entry.height, profile, verifier) {
                Ok(_) => {}
                Err(err) => {
                    self.store.set_block_index_entry(
                        hash,
                        BlockIndexEntry {
                            height: entry.height,
                            prev_hash: entry.prev_hash,
                            timestamp: entry.timestamp,
                            cumulative_work: entry.cumulative_work,
                            already_generated: entry.already_generated,
                            status: BlockStatus::InvalidAncestry,
                        },
                    );
                    tracing::warn!(block_hash = %hash, error = %err, "reorg connect failed, marking ancestry invalid");
                    return Err(err);
                }
            }
        }

        let manifest = self.store.manifest();
        Ok(ForkChoiceOutcome {
            new_tip: manifest.tip_hash,
            new_height: manifest.tip_height,
        })
    }

    fn find_common_ancestor(&self, mut a: Hash32, mut b: Hash32) -> Result<Hash32, ChainError> {
        let mut height_a = self.store.block_index_entry(&a).ok_or(ChainError::NoCommonAncestor)?.height;
        let mut height_b = self.store.block_index_entry(&b).ok_or(ChainError::NoCommonAncestor)?.height;

        while height_a > height_b {
            a = self.store.block_index_entry(&a).ok_or(ChainError::NoCommonAncestor)?.prev_hash;
            height_a -= 1;
        }
        while height_b > height_a {
            b = self.store.block_index_entry(&b).ok_or(ChainError::NoCommonAncestor)?.prev_hash;
            height_b -= 1;
        }
        while a != b {
            a = self.store.block_index_entry(&a).ok_or(ChainError::NoCommonAncestor)?.prev_hash;
            b = self.store.block_index_entry(&b).ok_or(ChainError::NoCommonAncestor)?.prev_hash;
        }
        Ok(a)
    }

    fn path_from_fork_to(&self, fork_point: Hash32, target: Hash32) -> Result<Vec<Hash32>, ChainError> {
        let mut path = Vec::new();
        let mut cursor = target;
        while cursor != fork_point {
            path.push(cursor);
            cursor = self
                .store
                .block_index_entry(&cursor)
                .ok_or(ChainError::NoCommonAncestor)?
                .prev_hash;
        }
        path.reverse();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockHeader, Transaction, TxInput, TxOutput, Witness};
    use crate::storage::MemChainStore;
    use crate::SUITE_ID_ML_DSA_87;

    struct AlwaysTrue;
    impl SignatureVerifier for AlwaysTrue {
        fn verify(&self, _suite_id: u8, _pubkey: &[u8], _digest: &Hash32, _signature: &[u8]) -> bool {
            true
        }
    }

    fn coinbase(height: u32, anchor_commitment: Hash32, reward: u64) -> Transaction {
        Transaction {
            version: 1,
            tx_kind: 0,
            tx_nonce: u64::from(height),
            inputs: vec![TxInput {
                prev_outpoint: Outpoint::coinbase_marker(),
                script_sig: vec![],
                sequence: 0xFFFF_FFFF,
            }],
            outputs: vec![
                TxOutput { value: reward, covenant_type: crate::covenant::TAG_P2PK, covenant_data: {
                    let mut d = vec![SUITE_ID_ML_DSA_87];
                    d.extend_from_slice(&[0xAAu8; 2592]);
                    d
                } },
                TxOutput {
                    value: 0,
                    covenant_type: crate::covenant::TAG_ANCHOR,
                    covenant_data: anchor_commitment.as_bytes().to_vec(),
                },
            ],
            locktime: height,
            witnesses: vec![Witness { suite_id: 0, pubkey: vec![], signature: vec![] }],
            da_payload: vec![],
        }
    }

    fn mine_block(height: u32, prev_hash: Hash32, timestamp: u64, reward: u64) -> (Block, Hash32) {
        let cb = coinbase(height, Hash32::ZERO, reward);
        let txids = vec![txid(&cb)];
        let wtxids = vec![crate::hashing::wtxid(&cb)];
        let merkle = crate::hashing::merkle_root(&txids);
        let witness_root = crate::hashing::merkle_root(&wtxids);
        let commitment = crate::hashing::witness_commitment(witness_root);
        let cb = coinbase(height, commitment, reward);
        let txids = vec![txid(&cb)];
        let merkle = crate::hashing::merkle_root(&txids);

        let header = BlockHeader {
            version: 1,
            prev_block_hash: prev_hash,
            merkle_root: merkle,
            timestamp,
            target: Hash32::from_bytes([0xFF; 32]),
            nonce: 0,
        };
        let block = Block { header: header.clone(), txs: vec![cb] };
        let block_hash = Hash32::sha3_256(&crate::codec::serialize_block_header(&header));
        let _ = witness_root;
        (block, block_hash)
    }

    #[test]
    fn apply_genesis_extension_advances_tip() {
        let store = MemChainStore::new("devnet".to_string());
        let mut manager = ChainManager::new(store, "devnet".to_string());
        manager.store_mut().set_block_index_entry(
            Hash32::ZERO,
            BlockIndexEntry {
                height: 0,
                prev_hash: Hash32::ZERO,
                timestamp: 0,
                cumulative_work: ChainWork::ZERO,
                already_generated: 0,
                status: BlockStatus::Valid,
            },
        );

        let profile = ChainProfile::default();
        let (block, block_hash) = mine_block(1, Hash32::ZERO, 1000, subsidy_for(&profile, 1));
        let outcome = manager.apply_block(block, 1, &profile, &AlwaysTrue).unwrap();
        assert_eq!(outcome.new_tip, block_hash);
        assert_eq!(manager.tip().tip_height, 1);
    }

    #[test]
    fn disconnect_restores_parent_tip() {
        let store = MemChainStore::new("devnet".to_string());
        let mut manager = ChainManager::new(store, "devnet".to_string());
        manager.store_mut().set_block_index_entry(
            Hash32::ZERO,
            BlockIndexEntry {
                height: 0,
                prev_hash: Hash32::ZERO,
                timestamp: 0,
                cumulative_work: ChainWork::ZERO,
                already_generated: 0,
                status: BlockStatus::Valid,
            },
        );
        let profile = ChainProfile::default();
        let (block, _) = mine_block(1, Hash32::ZERO, 1000, subsidy_for(&profile, 1));
        manager.apply_block(block, 1, &profile, &AlwaysTrue).unwrap();
        assert_eq!(manager.tip().tip_height, 1);

        let parent = manager.disconnect_tip().unwrap();
        assert_eq!(parent, Hash32::ZERO);
        assert_eq!(manager.tip().tip_height, 0);
    }

    fn subsidy_for(profile: &ChainProfile, height: u64) -> u64 {
        crate::block_validator::subsidy(height, profile)
    }
}
