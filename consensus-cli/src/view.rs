//! A `UtxoView` built from the `utxos` object a request supplies, since the
//! CLI has no chainstate of its own (spec.md §1: storage is an external
//! collaborator; this process only ever sees the slice of UTXO set a caller
//! hands it).

use std::collections::BTreeMap;

use consensus_core::model::{Outpoint, UtxoEntry};
use consensus_core::storage::UtxoView;
use consensus_types::Hash32;

pub struct RequestUtxoView {
    utxos: BTreeMap<Outpoint, UtxoEntry>,
}

impl RequestUtxoView {
    /// Keys are `"<txid_hex>:<vout>"`.
    pub fn from_hex_map(raw: &BTreeMap<String, UtxoEntry>) -> Result<Self, String> {
        let mut utxos = BTreeMap::new();
        for (key, entry) in raw {
            let (txid_hex, vout_str) = key
                .split_once(':')
                .ok_or_else(|| format!("utxos key {key:?}: expected \"<txid_hex>:<vout>\""))?;
            let txid = Hash32::from_hex(txid_hex).map_err(|e| format!("utxos key {key:?}: {e}"))?;
            let vout: u32 = vout_str
                .parse()
                .map_err(|_| format!("utxos key {key:?}: vout is not a valid u32"))?;
            utxos.insert(Outpoint::new(txid, vout), entry.clone());
        }
        Ok(Self { utxos })
    }
}

impl UtxoView for RequestUtxoView {
    fn get_utxo(&self, outpoint: &Outpoint) -> Option<UtxoEntry> {
        self.utxos.get(outpoint).cloned()
    }
}
