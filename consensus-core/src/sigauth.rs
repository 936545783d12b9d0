//! Signature authorization (spec.md §4.3.2): per-input witness checking
//! against the covenant of the UTXO being spent. Crypto verification itself
//! is delegated to a `SignatureVerifier` the host supplies — this crate
//! never embeds ML-DSA-87/SLH-DSA-SHAKE-256F directly (spec.md §1 keeps
//! crypto primitives an external collaborator), unlike the teacher's
//! `shared::crypto`, which calls `pqcrypto_dilithium` inline.

use consensus_types::{Hash32, TxError};

use crate::covenant::Covenant;
use crate::model::Witness;
use crate::{SUITE_ID_ML_DSA_87, SUITE_ID_SLH_DSA_SHAKE_256F};

/// Host-supplied signature verification. A real implementation wraps
/// ML-DSA-87/SLH-DSA-SHAKE-256F; tests use a deterministic stand-in.
pub trait SignatureVerifier {
    fn verify(&self, suite_id: u8, pubkey: &[u8], digest: &Hash32, signature: &[u8]) -> bool;
}

/// Expected pubkey byte length per suite (spec.md §4.3.2: "a pubkey of the
/// covenant-specified length"). ML-DSA-87 and SLH-DSA-SHAKE-256F have fixed
/// public key sizes; these are the NIST-specified lengths.
#[must_use]
pub fn expected_pubkey_len(suite_id: u8) -> Option<usize> {
    match suite_id {
        SUITE_ID_ML_DSA_87 => Some(2592),
        SUITE_ID_SLH_DSA_SHAKE_256F => Some(64),
        _ => None,
    }
}

pub(crate) fn key_id(suite_id: u8, pubkey: &[u8]) -> Hash32 {
    let mut buf = Vec::with_capacity(1 + pubkey.len());
    buf.push(suite_id);
    buf.extend_from_slice(pubkey);
    Hash32::sha3_256(&buf)
}

fn check_suite_active(suite_id: u8, height: u64, slh_dsa_activation_height: u64) -> Result<(), TxError> {
    if suite_id == SUITE_ID_SLH_DSA_SHAKE_256F && height < slh_dsa_activation_height {
        return Err(TxError::SigAlgInvalid);
    }
    if suite_id != SUITE_ID_ML_DSA_87 && suite_id != SUITE_ID_SLH_DSA_SHAKE_256F {
        return Err(TxError::SigAlgInvalid);
    }
    Ok(())
}

fn check_key_ref(
    witness: &Witness,
    expected_suite: u8,
    expected_pubkey: &[u8],
    digest: &Hash32,
    height: u64,
    slh_dsa_activation_height: u64,
    verifier: &dyn SignatureVerifier,
) -> Result<(), TxError> {
    if witness.suite_id != expected_suite {
        return Err(TxError::SigAlgInvalid);
    }
    check_suite_active(witness.suite_id, height, slh_dsa_activation_height)?;
    if let Some(len) = expected_pubkey_len(witness.suite_id) {
        if witness.pubkey.len() != len {
            return Err(TxError::SigAlgInvalid);
        }
    }
    if witness.pubkey != expected_pubkey {
        return Err(TxError::SigInvalid);
    }
    if !verifier.verify(witness.suite_id, &witness.pubkey, digest, &witness.signature) {
        return Err(TxError::SigInvalid);
    }
    Ok(())
}

/// Authorizes input `input_index`'s spend of a UTXO carrying `covenant`,
/// using the witness slots `witnesses[witness_base..]` this covenant
/// consumes (spec.md §4.3.1, §4.3.2).
#[allow(clippy::too_many_arguments)]
pub fn authorize_input(
    covenant: &Covenant,
    witnesses: &[Witness],
    witness_base: usize,
    script_sig: &[u8],
    digest: &Hash32,
    height: u64,
    block_timestamp: u64,
    slh_dsa_activation_height: u64,
    verifier: &dyn SignatureVerifier,
) -> Result<(), TxError> {
    match covenant {
        Covenant::P2pk(key) => {
            let witness = witnesses
                .get(witness_base)
                .ok_or_else(|| TxError::Structural("missing witness slot for P2PK input".to_string()))?;
            check_key_ref(
                witness,
                key.suite_id,
                &key.pubkey,
                digest,
                height,
                slh_dsa_activation_height,
                verifier,
            )
        }
        Covenant::Anchor { .. } => Err(TxError::Structural(
            "ANCHOR outputs are unspendable".to_string(),
        )),
        Covenant::Multisig { k, keys } => {
            let slots = witnesses
                .get(witness_base..witness_base + keys.len())
                .ok_or_else(|| TxError::Structural("missing witness slots for MULTISIG input".to_string()))?;
            let mut signed = 0u8;
            for (slot, key) in slots.iter().zip(keys.iter()) {
                if slot.is_sentinel() {
                    continue;
                }
                check_key_ref(
                    slot,
                    key.suite_id,
                    &key.pubkey,
                    digest,
                    height,
                    slh_dsa_activation_height,
                    verifier,
                )?;
                signed += 1;
            }
            if signed != *k {
                return Err(TxError::Structural(format!(
                    "MULTISIG expected exactly {k} signatures, got {signed}"
                )));
            }
            Ok(())
        }
        Covenant::Vault { owner_key_id, .. } => {
            let witness = witnesses
                .get(witness_base)
                .ok_or_else(|| TxError::Structural("missing witness slot for VAULT input".to_string()))?;
            if witness.is_sentinel() {
                return Err(TxError::VaultOwnerAuthRequired);
            }
            check_suite_active(witness.suite_id, height, slh_dsa_activation_height)?;
            if key_id(witness.suite_id, &witness.pubkey) != *owner_key_id {
                return Err(TxError::VaultOwnerAuthRequired);
            }
            if !verifier.verify(witness.suite_id, &witness.pubkey, digest, &witness.signature) {
                return Err(TxError::SigInvalid);
            }
            Ok(())
        }
        Covenant::Htlc {
            preimage_hash,
            claim_key,
            refund_key,
            timeout,
        } => {
            let witness = witnesses
                .get(witness_base)
                .ok_or_else(|| TxError::Structural("missing witness slot for HTLC input".to_string()))?;
            if !script_sig.is_empty() {
                if Hash32::sha3_256(script_sig) != *preimage_hash {
                    return Err(TxError::Structural("HTLC preimage does not match commitment".to_string()));
                }
                check_key_ref(
                    witness,
                    claim_key.suite_id,
                    &claim_key.pubkey,
                    digest,
                    height,
                    slh_dsa_activation_height,
                    verifier,
                )
            } else {
                let timeout_reached = if u64::from(*timeout) >= 500_000_000 {
                    block_timestamp >= u64::from(*timeout)
                } else {
                    height >= u64::from(*timeout)
                };
                if !timeout_reached {
                    return Err(TxError::TimelockNotMet);
                }
                check_key_ref(
                    witness,
                    refund_key.suite_id,
                    &refund_key.pubkey,
                    digest,
                    height,
                    slh_dsa_activation_height,
                    verifier,
                )
            }
        }
        Covenant::CoreExt { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covenant::KeyRef;

    struct AlwaysTrue;
    impl SignatureVerifier for AlwaysTrue {
        fn verify(&self, _suite_id: u8, _pubkey: &[u8], _digest: &Hash32, _signature: &[u8]) -> bool {
            true
        }
    }

    struct AlwaysFalse;
    impl SignatureVerifier for AlwaysFalse {
        fn verify(&self, _suite_id: u8, _pubkey: &[u8], _digest: &Hash32, _signature: &[u8]) -> bool {
            false
        }
    }

    fn p2pk_witness(suite_id: u8, pubkey: Vec<u8>) -> Witness {
        Witness {
            suite_id,
            pubkey,
            signature: vec![1, 2, 3],
        }
    }

    #[test]
    fn p2pk_authorizes_on_matching_key_and_verifier_true() {
        let pubkey = vec![0xAB; 2592];
        let covenant = Covenant::P2pk(KeyRef {
            suite_id: SUITE_ID_ML_DSA_87,
            pubkey: pubkey.clone(),
        });
        let witnesses = vec![p2pk_witness(SUITE_ID_ML_DSA_87, pubkey)];
        let digest = Hash32::sha3_256(b"digest");
        assert!(authorize_input(&covenant, &witnesses, 0, &[], &digest, 10, 0, 0, &AlwaysTrue).is_ok());
    }

    #[test]
    fn p2pk_rejects_mismatched_pubkey() {
        let covenant = Covenant::P2pk(KeyRef {
            suite_id: SUITE_ID_ML_DSA_87,
            pubkey: vec![0xAB; 2592],
        });
        let witnesses = vec![p2pk_witness(SUITE_ID_ML_DSA_87, vec![0xCD; 2592])];
        let digest = Hash32::sha3_256(b"digest");
        assert_eq!(
            authorize_input(&covenant, &witnesses, 0, &[], &digest, 10, 0, 0, &AlwaysTrue),
            Err(TxError::SigInvalid)
        );
    }

    #[test]
    fn slh_dsa_gated_by_activation_height() {
        let pubkey = vec![0xAB; 64];
        let covenant = Covenant::P2pk(KeyRef {
            suite_id: SUITE_ID_SLH_DSA_SHAKE_256F,
            pubkey: pubkey.clone(),
        });
        let witnesses = vec![p2pk_witness(SUITE_ID_SLH_DSA_SHAKE_256F, pubkey)];
        let digest = Hash32::sha3_256(b"digest");
        assert_eq!(
            authorize_input(&covenant, &witnesses, 0, &[], &digest, 10, 0, 100, &AlwaysTrue),
            Err(TxError::SigAlgInvalid)
        );
        assert!(authorize_input(&covenant, &witnesses, 0, &[], &digest, 100, 0, 100, &AlwaysTrue).is_ok());
    }

    #[test]
    fn multisig_requires_exactly_k_signatures() {
        let keys: Vec<KeyRef> = (0..3)
            .map(|i| KeyRef {
                suite_id: SUITE_ID_ML_DSA_87,
                pubkey: vec![i as u8; 2592],
            })
            .collect();
        let covenant = Covenant::Multisig { k: 2, keys: keys.clone() };
        let digest = Hash32::sha3_256(b"digest");

        let sentinel = Witness {
            suite_id: crate::SUITE_ID_SENTINEL,
            pubkey: vec![],
            signature: vec![],
        };
        let witnesses = vec![
            p2pk_witness(keys[0].suite_id, keys[0].pubkey.clone()),
            p2pk_witness(keys[1].suite_id, keys[1].pubkey.clone()),
            sentinel,
        ];
        assert!(authorize_input(&covenant, &witnesses, 0, &[], &digest, 10, 0, 0, &AlwaysTrue).is_ok());

        let all_sentinel = vec![
            Witness { suite_id: 0, pubkey: vec![], signature: vec![] },
            Witness { suite_id: 0, pubkey: vec![], signature: vec![] },
            Witness { suite_id: 0, pubkey: vec![], signature: vec![] },
        ];
        assert!(authorize_input(&covenant, &all_sentinel, 0, &[], &digest, 10, 0, 0, &AlwaysTrue).is_err());
    }

    #[test]
    fn htlc_claim_path_requires_matching_preimage() {
        let claim_key = KeyRef { suite_id: SUITE_ID_ML_DSA_87, pubkey: vec![1u8; 2592] };
        let refund_key = KeyRef { suite_id: SUITE_ID_ML_DSA_87, pubkey: vec![2u8; 2592] };
        let preimage = b"secret".to_vec();
        let covenant = Covenant::Htlc {
            preimage_hash: Hash32::sha3_256(&preimage),
            claim_key: claim_key.clone(),
            refund_key,
            timeout: 1000,
        };
        let witnesses = vec![p2pk_witness(claim_key.suite_id, claim_key.pubkey.clone())];
        let digest = Hash32::sha3_256(b"digest");
        assert!(authorize_input(&covenant, &witnesses, 0, &preimage, &digest, 10, 0, 0, &AlwaysTrue).is_ok());
        assert!(authorize_input(&covenant, &witnesses, 0, b"wrong", &digest, 10, 0, 0, &AlwaysTrue).is_err());
    }

    #[test]
    fn htlc_refund_path_requires_timeout_reached() {
        let claim_key = KeyRef { suite_id: SUITE_ID_ML_DSA_87, pubkey: vec![1u8; 2592] };
        let refund_key = KeyRef { suite_id: SUITE_ID_ML_DSA_87, pubkey: vec![2u8; 2592] };
        let covenant = Covenant::Htlc {
            preimage_hash: Hash32::sha3_256(b"secret"),
            claim_key,
            refund_key: refund_key.clone(),
            timeout: 1000,
        };
        let witnesses = vec![p2pk_witness(refund_key.suite_id, refund_key.pubkey.clone())];
        let digest = Hash32::sha3_256(b"digest");
        assert_eq!(
            authorize_input(&covenant, &witnesses, 0, &[], &digest, 999, 0, 0, &AlwaysTrue),
            Err(TxError::TimelockNotMet)
        );
        assert!(authorize_input(&covenant, &witnesses, 0, &[], &digest, 1000, 0, 0, &AlwaysTrue).is_ok());
    }

    #[test]
    fn core_ext_is_anyone_can_spend_at_consensus() {
        let covenant = Covenant::CoreExt { ext_id: 1, data: vec![] };
        let digest = Hash32::sha3_256(b"digest");
        assert!(authorize_input(&covenant, &[], 0, &[], &digest, 10, 0, 0, &AlwaysFalse).is_ok());
    }
}
