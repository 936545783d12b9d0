//! The `op` dispatch table (spec.md §6): one function per request kind,
//! each taking the request's JSON body and returning the response body
//! (`main` wraps it with `ok`/`err`). Hex fields are unprefixed lowercase
//! throughout, matching the wire convention spec.md §6 fixes.

use std::collections::BTreeMap;

use consensus_core::{
    connect_block, eviction_order, evaluate_admission, evaluate_deployment, missing_indices,
    prefill_round_trip, resolve_duplicate_commits, retarget_v1, sendcmpct_mode,
    short_id_collision_fallback, validate_block_basic, AdmissionRequest, ChainProfile,
    CommitSighting, Deployment, EvictionCandidate,
};
use consensus_types::Hash32;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::verifier::ThinVerifier;
use crate::view::RequestUtxoView;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown op: {0}")]
    UnknownOp(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Consensus(String),
}

pub fn dispatch(op: &str, body: Value) -> Result<Value, DispatchError> {
    match op {
        "parse_tx" => parse_tx(body),
        "merkle_root" => merkle_root(body),
        "sighash_v1" => sighash_v1(body),
        "pow_check" => pow_check(body),
        "retarget_v1" => retarget(body),
        "block_basic_check" => block_basic_check(body),
        "connect_block_basic" => connect_block_basic(body),
        "fork_choice_select" => fork_choice_select(body),
        "featurebits_state" => featurebits_state(body),
        "compact_admission" => compact_admission(body),
        "compact_eviction_order" => compact_eviction_order(body),
        "compact_duplicate_commits" => compact_duplicate_commits(body),
        "compact_prefill_round_trip" => compact_prefill_round_trip(body),
        "compact_sendcmpct_mode" => compact_sendcmpct_mode(body),
        "vault_policy_rules" => vault_policy_rules(),
        "htlc_ordering_policy" => htlc_ordering_policy(),
        "nonce_replay_intrablock" => nonce_replay_intrablock(body),
        "timestamp_bounds" => timestamp_bounds(body),
        "determinism_order" => determinism_order(),
        "validation_order" => validation_order(),
        other => Err(DispatchError::UnknownOp(other.to_string())),
    }
}

fn hex_field(body: &Value, name: &str) -> Result<Vec<u8>, DispatchError> {
    let raw = body
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::BadRequest(format!("missing field: {name}")))?;
    hex::decode(raw).map_err(|e| DispatchError::BadRequest(format!("{name}: {e}")))
}

fn hash_field(body: &Value, name: &str) -> Result<Hash32, DispatchError> {
    let raw = body
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::BadRequest(format!("missing field: {name}")))?;
    Hash32::from_hex(raw).map_err(|e| DispatchError::BadRequest(format!("{name}: {e}")))
}

fn u64_field(body: &Value, name: &str) -> Result<u64, DispatchError> {
    body.get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| DispatchError::BadRequest(format!("missing field: {name}")))
}

fn parse_tx(body: Value) -> Result<Value, DispatchError> {
    let bytes = hex_field(&body, "tx_hex")?;
    let (tx, consumed) = consensus_core::codec::parse_tx(&bytes)
        .map_err(|e| DispatchError::Consensus(e.to_string()))?;
    Ok(json!({ "tx": tx, "consumed": consumed }))
}

fn merkle_root(body: Value) -> Result<Value, DispatchError> {
    let leaves_raw = body
        .get("leaves")
        .and_then(Value::as_array)
        .ok_or_else(|| DispatchError::BadRequest("missing field: leaves".to_string()))?;
    let mut leaves = Vec::with_capacity(leaves_raw.len());
    for leaf in leaves_raw {
        let s = leaf
            .as_str()
            .ok_or_else(|| DispatchError::BadRequest("leaves: expected hex strings".to_string()))?;
        leaves.push(Hash32::from_hex(s).map_err(|e| DispatchError::BadRequest(e.to_string()))?);
    }
    let root = consensus_core::hashing::merkle_root(&leaves);
    Ok(json!({ "merkle_root": root.to_hex() }))
}

fn sighash_v1(body: Value) -> Result<Value, DispatchError> {
    #[derive(Deserialize)]
    struct Req {
        tx: consensus_core::model::Transaction,
        input_index: u32,
        input_value: u64,
        chain_id: String,
    }
    let req: Req = serde_json::from_value(body).map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    let digest = consensus_core::hashing::sighash_v1(&req.tx, req.input_index, req.input_value, &req.chain_id);
    Ok(json!({ "digest": digest.to_hex() }))
}

fn pow_check(body: Value) -> Result<Value, DispatchError> {
    let block_hash = hash_field(&body, "block_hash")?;
    let target = hash_field(&body, "target")?;
    let valid = block_hash.as_u256() <= target.as_u256();
    Ok(json!({ "valid": valid }))
}

fn retarget(body: Value) -> Result<Value, DispatchError> {
    let old_target = hash_field(&body, "old_target")?;
    let window_first_timestamp = u64_field(&body, "window_first_timestamp")?;
    let window_last_timestamp = u64_field(&body, "window_last_timestamp")?;
    let window_len = u64_field(&body, "window_len")?;
    let target_block_time_secs = u64_field(&body, "target_block_time_secs")?;
    let new_target = retarget_v1(old_target, window_first_timestamp, window_last_timestamp, window_len, target_block_time_secs);
    Ok(json!({ "new_target": new_target.to_hex() }))
}

fn profile_from_body(body: &Value) -> ChainProfile {
    body.get("profile")
        .and_then(|p| serde_json::from_value(p.clone()).ok())
        .unwrap_or_default()
}

fn block_basic_check(body: Value) -> Result<Value, DispatchError> {
    let bytes = hex_field(&body, "block_hex")?;
    let expected_prev = body.get("expected_prev").and_then(Value::as_str).map(Hash32::from_hex).transpose()
        .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    let expected_target = body.get("expected_target").and_then(Value::as_str).map(Hash32::from_hex).transpose()
        .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    let height = u64_field(&body, "height")?;
    let prev_timestamps: Vec<u64> = body
        .get("prev_timestamps")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    let max_future_drift_secs = body
        .get("max_future_drift_secs")
        .and_then(Value::as_u64)
        .unwrap_or(ChainProfile::default().max_future_drift_secs);
    let profile = profile_from_body(&body);

    let outcome = validate_block_basic(&bytes, expected_prev, expected_target, height, &prev_timestamps, max_future_drift_secs, &profile)
        .map_err(|e| DispatchError::Consensus(e.to_string()))?;
    Ok(json!({ "block_hash": outcome.block_hash.to_hex() }))
}

fn connect_block_basic(body: Value) -> Result<Value, DispatchError> {
    #[derive(Deserialize)]
    struct Req {
        block: consensus_core::model::Block,
        height: u64,
        block_mtp: u64,
        already_generated: u64,
        chain_id: String,
        #[serde(default)]
        utxos: BTreeMap<String, consensus_core::model::UtxoEntry>,
        #[serde(default)]
        profile: Option<ChainProfile>,
    }
    let req: Req = serde_json::from_value(body).map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    let view = RequestUtxoView::from_hex_map(&req.utxos).map_err(DispatchError::BadRequest)?;
    let profile = req.profile.unwrap_or_default();
    let verifier = ThinVerifier;

    let outcome = connect_block(&req.block, &view, req.height, req.block_mtp, req.already_generated, &req.chain_id, &profile, &verifier)
        .map_err(|e| DispatchError::Consensus(e.to_string()))?;
    Ok(json!({
        "new_utxo_count_delta": outcome.new_utxo_count_delta,
        "already_generated_after": outcome.already_generated_after,
        "sum_fees": outcome.sum_fees,
    }))
}

fn fork_choice_select(body: Value) -> Result<Value, DispatchError> {
    #[derive(Deserialize)]
    struct Candidate {
        hash: String,
        cumulative_work: String,
    }
    let candidates: Vec<Candidate> = serde_json::from_value(
        body.get("candidates").cloned().ok_or_else(|| DispatchError::BadRequest("missing field: candidates".to_string()))?,
    )
    .map_err(|e| DispatchError::BadRequest(e.to_string()))?;

    let mut best: Option<(Hash32, primitive_types::U256)> = None;
    for candidate in &candidates {
        let hash = Hash32::from_hex(&candidate.hash).map_err(|e| DispatchError::BadRequest(e.to_string()))?;
        let work = primitive_types::U256::from_dec_str(&candidate.cumulative_work)
            .map_err(|_| DispatchError::BadRequest("cumulative_work: not a decimal integer".to_string()))?;
        best = Some(match best {
            None => (hash, work),
            Some((best_hash, best_work)) => {
                if work > best_work || (work == best_work && hash < best_hash) {
                    (hash, work)
                } else {
                    (best_hash, best_work)
                }
            }
        });
    }
    let (hash, _) = best.ok_or_else(|| DispatchError::BadRequest("candidates: must be non-empty".to_string()))?;
    Ok(json!({ "selected": hash.to_hex() }))
}

fn featurebits_state(body: Value) -> Result<Value, DispatchError> {
    let deployment: Deployment = serde_json::from_value(
        body.get("deployment").cloned().ok_or_else(|| DispatchError::BadRequest("missing field: deployment".to_string()))?,
    )
    .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    deployment.validate().map_err(DispatchError::BadRequest)?;
    let height = u64_field(&body, "height")?;
    let closed_window_counts: Vec<u64> = body
        .get("closed_window_counts")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();

    let status = evaluate_deployment(&deployment, height, &closed_window_counts);
    Ok(serde_json::to_value(status).expect("DeploymentStatus serializes"))
}

fn compact_admission(body: Value) -> Result<Value, DispatchError> {
    let request: AdmissionRequest = serde_json::from_value(
        body.get("request").cloned().ok_or_else(|| DispatchError::BadRequest("missing field: request".to_string()))?,
    )
    .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    let profile = profile_from_body(&body);
    let recovery_success_rate = body.get("recovery_success_rate").and_then(Value::as_f64);
    let observation_minutes = body.get("observation_minutes").and_then(Value::as_u64).unwrap_or(0);

    let decision = evaluate_admission(&request, &profile, recovery_success_rate, observation_minutes);
    Ok(serde_json::to_value(decision).expect("AdmissionDecision serializes"))
}

fn nonce_replay_intrablock(body: Value) -> Result<Value, DispatchError> {
    let nonces: Vec<u64> = body
        .get("tx_nonces")
        .and_then(Value::as_array)
        .ok_or_else(|| DispatchError::BadRequest("missing field: tx_nonces".to_string()))?
        .iter()
        .filter_map(Value::as_u64)
        .collect();
    let mut seen = std::collections::HashSet::new();
    let mut first_duplicate_index = None;
    for (i, nonce) in nonces.iter().enumerate() {
        if !seen.insert(*nonce) {
            first_duplicate_index = Some(i);
            break;
        }
    }
    Ok(json!({
        "has_replay": first_duplicate_index.is_some(),
        "first_duplicate_index": first_duplicate_index,
    }))
}

fn timestamp_bounds(body: Value) -> Result<Value, DispatchError> {
    let timestamp = u64_field(&body, "timestamp")?;
    let median_time_past = u64_field(&body, "median_time_past")?;
    let now = u64_field(&body, "now")?;
    let max_future_drift_secs = u64_field(&body, "max_future_drift_secs")?;

    if timestamp <= median_time_past {
        return Ok(json!({ "valid": false, "reason": "BLOCK_ERR_TIMESTAMP_OLD" }));
    }
    if timestamp > now.saturating_add(max_future_drift_secs) {
        return Ok(json!({ "valid": false, "reason": "BLOCK_ERR_TIMESTAMP_FUTURE" }));
    }
    Ok(json!({ "valid": true, "reason": Value::Null }))
}

/// Static description of the fixed hash-input ordering rule (spec.md §9):
/// every hash input derived from a map is computed from its sorted-by-key
/// sequence, never insertion order.
fn determinism_order() -> Result<Value, DispatchError> {
    Ok(json!({
        "rule": "every hash input derived from a map is computed from the sorted-by-key sequence, never insertion order",
    }))
}

/// Static description of the fixed per-tx validation order (spec.md §4.3).
fn validation_order() -> Result<Value, DispatchError> {
    Ok(json!({
        "steps": [
            "structural",
            "locktime",
            "input_lookup",
            "coinbase_maturity",
            "covenant_policy",
            "signature_authorization",
            "value_conservation",
        ],
    }))
}

fn compact_eviction_order(body: Value) -> Result<Value, DispatchError> {
    #[derive(Deserialize)]
    struct Candidate {
        fee_per_byte: u64,
        received_time: u64,
        da_id: String,
    }
    let candidates: Vec<Candidate> = serde_json::from_value(
        body.get("candidates")
            .cloned()
            .ok_or_else(|| DispatchError::BadRequest("missing field: candidates".to_string()))?,
    )
    .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    let ordered = eviction_order(
        candidates
            .into_iter()
            .map(|c| EvictionCandidate {
                fee_per_byte: c.fee_per_byte,
                received_time: c.received_time,
                da_id: c.da_id,
            })
            .collect(),
    );
    Ok(json!({
        "order": ordered.into_iter().map(|c| c.da_id).collect::<Vec<_>>(),
    }))
}

fn compact_duplicate_commits(body: Value) -> Result<Value, DispatchError> {
    let sightings: Vec<CommitSighting> = serde_json::from_value(
        body.get("sightings")
            .cloned()
            .ok_or_else(|| DispatchError::BadRequest("missing field: sightings".to_string()))?,
    )
    .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
    let outcomes = resolve_duplicate_commits(&sightings);
    Ok(serde_json::to_value(outcomes).expect("DuplicateCommitOutcome serializes"))
}

fn compact_prefill_round_trip(body: Value) -> Result<Value, DispatchError> {
    let tx_count = u64_field(&body, "tx_count")? as u32;
    let prefilled: std::collections::BTreeSet<u32> = body
        .get("prefilled")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_u64().map(|n| n as u32)).collect())
        .unwrap_or_default();
    let mempool: std::collections::BTreeSet<u32> = body
        .get("mempool")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_u64().map(|n| n as u32)).collect())
        .unwrap_or_default();
    let blocktxn_response: Option<std::collections::BTreeSet<u32>> = body.get("blocktxn_response").and_then(Value::as_array).map(|arr| {
        arr.iter().filter_map(|v| v.as_u64().map(|n| n as u32)).collect()
    });

    let missing = missing_indices(tx_count, &prefilled, &mempool);
    let outcome = if body.get("short_id_collision").and_then(Value::as_bool).unwrap_or(false) {
        let acceptable = body.get("getblocktxn_acceptable").and_then(Value::as_bool).unwrap_or(true);
        short_id_collision_fallback(&missing, acceptable)
    } else {
        prefill_round_trip(tx_count, &prefilled, &mempool, blocktxn_response.as_ref())
    };

    Ok(match outcome {
        consensus_core::PrefillOutcome::Reconstructed => json!({ "outcome": "reconstructed" }),
        consensus_core::PrefillOutcome::RequestBlocktxn(indices) => json!({
            "outcome": "request_blocktxn",
            "missing": indices.into_iter().collect::<Vec<_>>(),
        }),
        consensus_core::PrefillOutcome::RequestFullBlock => json!({ "outcome": "request_full_block" }),
    })
}

fn compact_sendcmpct_mode(body: Value) -> Result<Value, DispatchError> {
    let in_ibd = body.get("in_ibd").and_then(Value::as_bool).unwrap_or(false);
    let recent_miss_rate = body.get("recent_miss_rate").and_then(Value::as_f64).unwrap_or(0.0);
    let recent_miss_rate_observed_blocks = body
        .get("recent_miss_rate_observed_blocks")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let warmup_done = body.get("warmup_done").and_then(Value::as_bool).unwrap_or(false);
    let mode = sendcmpct_mode(in_ibd, recent_miss_rate, recent_miss_rate_observed_blocks, warmup_done);
    Ok(json!({ "mode": mode }))
}

/// Static description of VAULT covenant policy (spec.md §4.3.1): at most one
/// VAULT input per tx, owner authorization required, no fee-sponsor inputs,
/// and a canonical (sorted, unique) whitelist of referenced key-ids.
fn vault_policy_rules() -> Result<Value, DispatchError> {
    Ok(json!({
        "rules": [
            "at_most_one_vault_input_per_tx",
            "owner_authorization_required",
            "no_fee_sponsor_inputs",
            "whitelist_must_be_sorted_and_unique",
        ],
    }))
}

/// Static description of HTLC spend-path ordering (spec.md §4.3.1): the
/// claim path (preimage match) is attempted before the refund path
/// (locktime reached), selected by whether `script_sig` carries a preimage.
fn htlc_ordering_policy() -> Result<Value, DispatchError> {
    Ok(json!({
        "paths": ["claim_requires_preimage", "refund_requires_locktime"],
        "selector": "non_empty_script_sig_selects_claim_path",
    }))
}
