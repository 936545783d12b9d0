//! Tx Validator (spec.md §4.3): `apply_non_coinbase_tx`, the fixed seven-step
//! validation order. Any reordering of these steps is a consensus fork, so
//! they run as one straight-line function rather than a chain of
//! independently reusable passes — mirroring the teacher's
//! `Blockchain::validate_transaction` (`bond-core/src/blockchain.rs`), which
//! is likewise a single ordered function rather than a rule registry.

use std::collections::HashSet;

use consensus_types::{Hash32, TxError};

use crate::config::ChainProfile;
use crate::covenant::{parse_covenant, Covenant};
use crate::hashing::sighash_v1;
use crate::model::{Transaction, UtxoEntry};
use crate::sigauth::{authorize_input, key_id, SignatureVerifier};
use crate::storage::UtxoView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyTxOutcome {
    pub fee: u64,
    pub utxo_count_delta: i64,
}

/// Validates and prices one non-coinbase transaction against `utxo_view`,
/// in the fixed order spec.md §4.3 mandates. `seen_nonces` accumulates
/// `tx_nonce` values across the whole block, for the intrablock
/// nonce-replay check (step 1).
#[allow(clippy::too_many_arguments)]
pub fn apply_non_coinbase_tx(
    tx: &Transaction,
    utxo_view: &impl UtxoView,
    height: u64,
    block_timestamp: u64,
    block_mtp: u64,
    chain_id: &str,
    profile: &ChainProfile,
    seen_nonces: &mut HashSet<u64>,
    verifier: &dyn SignatureVerifier,
) -> Result<ApplyTxOutcome, TxError> {
    // Step 1: structural.
    if tx.inputs.is_empty() {
        return Err(TxError::Structural("input_count must be >= 1".to_string()));
    }
    if tx.outputs.is_empty() {
        return Err(TxError::Structural("output_count must be >= 1".to_string()));
    }
    let mut outpoints = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !outpoints.insert(input.prev_outpoint) {
            return Err(TxError::Structural("duplicate input outpoint within tx".to_string()));
        }
    }
    if !seen_nonces.insert(tx.tx_nonce) {
        return Err(TxError::NonceReplay);
    }

    // Step 2: locktime.
    if tx.locktime != 0 {
        let reached = if u64::from(tx.locktime) >= 500_000_000 {
            block_timestamp >= u64::from(tx.locktime)
        } else {
            height >= u64::from(tx.locktime)
        };
        if !reached {
            return Err(TxError::TimelockNotMet);
        }
    }

    // Step 3: input lookup.
    let mut spent_entries: Vec<UtxoEntry> = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let entry = utxo_view
            .get_utxo(&input.prev_outpoint)
            .ok_or(TxError::UtxoMissing)?;
        spent_entries.push(entry);
    }

    // Step 4: coinbase maturity.
    for entry in &spent_entries {
        if entry.created_by_coinbase && height.saturating_sub(entry.creation_height) < profile.coinbase_maturity {
            return Err(TxError::CoinbaseImmature);
        }
    }

    // Step 5: covenant policy, one parse per output and per spent entry.
    let output_covenants: Vec<Covenant> = tx
        .outputs
        .iter()
        .map(|output| parse_covenant(output.covenant_type, &output.covenant_data, output.value))
        .collect::<Result<_, _>>()?;
    let _ = &output_covenants;

    let input_covenants: Vec<Covenant> = spent_entries
        .iter()
        .map(|entry| parse_covenant(entry.covenant_type, &entry.covenant_data, entry.value))
        .collect::<Result<_, _>>()?;

    enforce_vault_tx_rules(&input_covenants)?;

    // Step 6: signature authorization, input index order.
    let mut witness_base = 0usize;
    for (i, covenant) in input_covenants.iter().enumerate() {
        let digest = sighash_v1(tx, i as u32, spent_entries[i].value, chain_id);
        authorize_input(
            covenant,
            &tx.witnesses,
            witness_base,
            &tx.inputs[i].script_sig,
            &digest,
            height,
            block_mtp,
            profile.suite_slh_dsa_activation_height,
            verifier,
        )?;
        witness_base += covenant.witness_slot_count();
    }

    // Step 7: value conservation.
    let mut sum_in: u64 = 0;
    for entry in &spent_entries {
        sum_in = sum_in
            .checked_add(entry.value)
            .ok_or(TxError::ValueConservation)?;
    }
    let mut sum_out: u64 = 0;
    for output in &tx.outputs {
        sum_out = sum_out
            .checked_add(output.value)
            .ok_or(TxError::ValueConservation)?;
    }
    if sum_out > sum_in {
        return Err(TxError::ValueConservation);
    }
    let fee = sum_in - sum_out;

    Ok(ApplyTxOutcome {
        fee,
        utxo_count_delta: tx.outputs.len() as i64 - tx.inputs.len() as i64,
    })
}

/// VAULT rules (spec.md §4.3.1): at most one VAULT input per tx; every other
/// input must already be locked to the same owner key (no fee-sponsor
/// inputs); the set of referenced owner key-ids must be canonical
/// (sorted, unique) once deduplicated.
fn enforce_vault_tx_rules(input_covenants: &[Covenant]) -> Result<(), TxError> {
    let vault_owners: Vec<Hash32> = input_covenants
        .iter()
        .filter_map(|c| match c {
            Covenant::Vault { owner_key_id, .. } => Some(*owner_key_id),
            _ => None,
        })
        .collect();
    if vault_owners.len() > 1 {
        return Err(TxError::VaultMultiInputForbidden);
    }
    let Some(owner_key_id) = vault_owners.first().copied() else {
        return Ok(());
    };

    let mut referenced_ids = Vec::with_capacity(input_covenants.len());
    referenced_ids.push(owner_key_id);
    for covenant in input_covenants {
        match covenant {
            Covenant::Vault { .. } => {}
            Covenant::P2pk(key) => {
                let id = key_id(key.suite_id, &key.pubkey);
                if id != owner_key_id {
                    return Err(TxError::VaultFeeSponsorForbidden);
                }
                referenced_ids.push(id);
            }
            _ => return Err(TxError::VaultFeeSponsorForbidden),
        }
    }

    referenced_ids.sort();
    referenced_ids.dedup();
    if referenced_ids.len() != 1 {
        return Err(TxError::VaultWhitelistNotCanonical);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outpoint, TxInput, TxOutput, Witness};
    use crate::storage::MemChainStore;
    use crate::storage::ChainStore;
    use crate::SUITE_ID_ML_DSA_87;

    struct AlwaysTrue;
    impl SignatureVerifier for AlwaysTrue {
        fn verify(&self, _suite_id: u8, _pubkey: &[u8], _digest: &Hash32, _signature: &[u8]) -> bool {
            true
        }
    }

    fn p2pk_entry(value: u64, pubkey: &[u8]) -> UtxoEntry {
        let mut data = vec![SUITE_ID_ML_DSA_87];
        data.extend_from_slice(pubkey);
        UtxoEntry {
            value,
            covenant_type: crate::covenant::TAG_P2PK,
            covenant_data: data,
            creation_height: 0,
            created_by_coinbase: false,
        }
    }

    fn spend_tx(outpoint: Outpoint, pubkey: Vec<u8>, out_value: u64, nonce: u64) -> Transaction {
        Transaction {
            version: 1,
            tx_kind: 0,
            tx_nonce: nonce,
            inputs: vec![TxInput {
                prev_outpoint: outpoint,
                script_sig: vec![],
                sequence: 0,
            }],
            outputs: vec![TxOutput {
                value: out_value,
                covenant_type: crate::covenant::TAG_P2PK,
                covenant_data: {
                    let mut d = vec![SUITE_ID_ML_DSA_87];
                    d.extend_from_slice(&pubkey);
                    d
                },
            }],
            locktime: 0,
            witnesses: vec![Witness {
                suite_id: SUITE_ID_ML_DSA_87,
                pubkey,
                signature: vec![9; 4627],
            }],
            da_payload: vec![],
        }
    }

    #[test]
    fn accepts_a_well_formed_spend_and_computes_fee() {
        let pubkey = vec![0xAB; 2592];
        let mut store = MemChainStore::new("devnet".to_string());
        let outpoint = Outpoint::new(Hash32::sha3_256(b"prev"), 0);
        store.insert_utxo(outpoint, p2pk_entry(1000, &pubkey));

        let tx = spend_tx(outpoint, pubkey, 900, 1);
        let profile = ChainProfile::default();
        let mut seen = HashSet::new();
        let outcome = apply_non_coinbase_tx(
            &tx, &store, 10, 1000, 1000, "devnet", &profile, &mut seen, &AlwaysTrue,
        )
        .unwrap();
        assert_eq!(outcome.fee, 100);
        assert_eq!(outcome.utxo_count_delta, 0);
    }

    #[test]
    fn rejects_missing_input() {
        let store = MemChainStore::new("devnet".to_string());
        let outpoint = Outpoint::new(Hash32::sha3_256(b"missing"), 0);
        let tx = spend_tx(outpoint, vec![0xAB; 2592], 900, 1);
        let profile = ChainProfile::default();
        let mut seen = HashSet::new();
        let err = apply_non_coinbase_tx(
            &tx, &store, 10, 1000, 1000, "devnet", &profile, &mut seen, &AlwaysTrue,
        )
        .unwrap_err();
        assert_eq!(err, TxError::UtxoMissing);
    }

    #[test]
    fn rejects_immature_coinbase_spend() {
        let pubkey = vec![0xAB; 2592];
        let mut store = MemChainStore::new("devnet".to_string());
        let outpoint = Outpoint::new(Hash32::sha3_256(b"coinbase-out"), 0);
        let mut entry = p2pk_entry(1000, &pubkey);
        entry.created_by_coinbase = true;
        entry.creation_height = 95;
        store.insert_utxo(outpoint, entry);

        let tx = spend_tx(outpoint, pubkey, 900, 1);
        let profile = ChainProfile::default();
        let mut seen = HashSet::new();
        let err = apply_non_coinbase_tx(
            &tx, &store, 100, 1000, 1000, "devnet", &profile, &mut seen, &AlwaysTrue,
        )
        .unwrap_err();
        assert_eq!(err, TxError::CoinbaseImmature);
    }

    #[test]
    fn rejects_intrablock_nonce_replay() {
        let pubkey = vec![0xAB; 2592];
        let mut store = MemChainStore::new("devnet".to_string());
        let outpoint_a = Outpoint::new(Hash32::sha3_256(b"a"), 0);
        let outpoint_b = Outpoint::new(Hash32::sha3_256(b"b"), 0);
        store.insert_utxo(outpoint_a, p2pk_entry(1000, &pubkey));
        store.insert_utxo(outpoint_b, p2pk_entry(1000, &pubkey));

        let tx_a = spend_tx(outpoint_a, pubkey.clone(), 900, 7);
        let tx_b = spend_tx(outpoint_b, pubkey, 900, 7);
        let profile = ChainProfile::default();
        let mut seen = HashSet::new();
        apply_non_coinbase_tx(&tx_a, &store, 10, 1000, 1000, "devnet", &profile, &mut seen, &AlwaysTrue)
            .unwrap();
        let err = apply_non_coinbase_tx(
            &tx_b, &store, 10, 1000, 1000, "devnet", &profile, &mut seen, &AlwaysTrue,
        )
        .unwrap_err();
        assert_eq!(err, TxError::NonceReplay);
    }

    #[test]
    fn rejects_value_creation() {
        let pubkey = vec![0xAB; 2592];
        let mut store = MemChainStore::new("devnet".to_string());
        let outpoint = Outpoint::new(Hash32::sha3_256(b"prev"), 0);
        store.insert_utxo(outpoint, p2pk_entry(1000, &pubkey));

        let tx = spend_tx(outpoint, pubkey, 1001, 1);
        let profile = ChainProfile::default();
        let mut seen = HashSet::new();
        let err = apply_non_coinbase_tx(
            &tx, &store, 10, 1000, 1000, "devnet", &profile, &mut seen, &AlwaysTrue,
        )
        .unwrap_err();
        assert_eq!(err, TxError::ValueConservation);
    }

    #[test]
    fn vault_forbids_more_than_one_vault_input() {
        let owner = Hash32::sha3_256(b"owner");
        let vault_entry = UtxoEntry {
            value: 500,
            covenant_type: crate::covenant::TAG_VAULT,
            covenant_data: {
                let mut d = owner.as_bytes().to_vec();
                d.extend_from_slice(Hash32::sha3_256(b"recovery").as_bytes());
                d.extend_from_slice(&100u32.to_le_bytes());
                d
            },
            creation_height: 0,
            created_by_coinbase: false,
        };
        let mut store = MemChainStore::new("devnet".to_string());
        let outpoint_a = Outpoint::new(Hash32::sha3_256(b"vault-a"), 0);
        let outpoint_b = Outpoint::new(Hash32::sha3_256(b"vault-b"), 0);
        store.insert_utxo(outpoint_a, vault_entry.clone());
        store.insert_utxo(outpoint_b, vault_entry);

        let tx = Transaction {
            version: 1,
            tx_kind: 0,
            tx_nonce: 1,
            inputs: vec![
                TxInput { prev_outpoint: outpoint_a, script_sig: vec![], sequence: 0 },
                TxInput { prev_outpoint: outpoint_b, script_sig: vec![], sequence: 0 },
            ],
            outputs: vec![TxOutput { value: 900, covenant_type: crate::covenant::TAG_P2PK, covenant_data: {
                let mut d = vec![SUITE_ID_ML_DSA_87];
                d.extend_from_slice(&[1u8; 2592]);
                d
            } }],
            locktime: 0,
            witnesses: vec![
                Witness { suite_id: SUITE_ID_ML_DSA_87, pubkey: vec![1u8; 2592], signature: vec![1; 4627] },
                Witness { suite_id: SUITE_ID_ML_DSA_87, pubkey: vec![1u8; 2592], signature: vec![1; 4627] },
            ],
            da_payload: vec![],
        };
        let profile = ChainProfile::default();
        let mut seen = HashSet::new();
        let err = apply_non_coinbase_tx(
            &tx, &store, 200, 1000, 1000, "devnet", &profile, &mut seen, &AlwaysTrue,
        )
        .unwrap_err();
        assert_eq!(err, TxError::VaultMultiInputForbidden);
    }
}
