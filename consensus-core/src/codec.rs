//! Canonical binary codec (spec.md §4.1).
//!
//! Every accepted byte string round-trips exactly: `parse(serialize(x)) = x`
//! and `serialize(parse(b)) = b`. Trailing bytes are never permitted, and
//! CompactSize decoding enforces minimality. The shape of this module
//! (explicit cursor position, `read_*`/`write_*` pairs, `byteorder` for the
//! fixed-width fields) follows `zebra-chain`'s `serialization`/`compactint`
//! split rather than the teacher's `serde_json`-based persistence, since the
//! teacher has no canonical wire format to generalize.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use consensus_types::{BlockError, Hash32, TxError};
use std::io::Cursor;

use crate::model::{Block, BlockHeader, Outpoint, Transaction, TxInput, TxOutput, Witness};

/// Upper bound on any single length-prefixed byte field, independent of the
/// profile's block-weight cap. Guards the parser against allocating gigabytes
/// from a single malformed compact-size prefix.
const MAX_FIELD_LEN: u64 = 1 << 32;

// ---------------------------------------------------------------------
// CompactSize
// ---------------------------------------------------------------------

/// Encodes `n` using Bitcoin-style CompactSize framing (spec.md §4.1):
/// values below `0xFD` are a single byte; `0xFD`/`0xFE`/`0xFF` prefix a
/// little-endian u16/u32/u64 respectively, always in the narrowest form
/// that represents `n`.
pub fn encode_compact_size(n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_compact_size(&mut out, n);
    out
}

fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xFD {
        out.push(n as u8);
    } else if n <= u64::from(u16::MAX) {
        out.push(0xFD);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= u64::from(u32::MAX) {
        out.push(0xFE);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xFF);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

/// Decodes a CompactSize prefix from `buf`, returning `(value, bytes_consumed)`.
/// Rejects a short buffer, an invalid prefix, or a non-minimal encoding.
pub fn decode_compact_size(buf: &[u8]) -> Result<(u64, usize), TxError> {
    let first = *buf.first().ok_or_else(|| parse_err("compact_size: empty buffer"))?;
    match first {
        0..=0xFC => Ok((u64::from(first), 1)),
        0xFD => {
            let bytes = buf
                .get(1..3)
                .ok_or_else(|| parse_err("compact_size: truncated u16 prefix"))?;
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            if u64::from(v) < 0xFD {
                return Err(parse_err("compact_size: non-minimal u16 encoding"));
            }
            Ok((u64::from(v), 3))
        }
        0xFE => {
            let bytes = buf
                .get(1..5)
                .ok_or_else(|| parse_err("compact_size: truncated u32 prefix"))?;
            let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if u64::from(v) <= u64::from(u16::MAX) {
                return Err(parse_err("compact_size: non-minimal u32 encoding"));
            }
            Ok((u64::from(v), 5))
        }
        0xFF => {
            let bytes = buf
                .get(1..9)
                .ok_or_else(|| parse_err("compact_size: truncated u64 prefix"))?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(bytes);
            let v = u64::from_le_bytes(arr);
            if v <= u64::from(u32::MAX) {
                return Err(parse_err("compact_size: non-minimal u64 encoding"));
            }
            Ok((v, 9))
        }
    }
}

fn parse_err(msg: &str) -> TxError {
    TxError::Structural(msg.to_string())
}

// ---------------------------------------------------------------------
// Byte-string fields (length-prefixed with CompactSize)
// ---------------------------------------------------------------------

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_compact_size(out, data.len() as u64);
    out.extend_from_slice(data);
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, TxError> {
    let remaining = remaining_slice(cursor);
    let (len, consumed) = decode_compact_size(remaining)?;
    if len > MAX_FIELD_LEN {
        return Err(parse_err("field length exceeds hard cap"));
    }
    let start = cursor.position() as usize + consumed;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| parse_err("field length overflow"))?;
    let buf = cursor.get_ref();
    if end > buf.len() {
        return Err(parse_err("field truncated"));
    }
    let data = buf[start..end].to_vec();
    cursor.set_position(end as u64);
    Ok(data)
}

fn remaining_slice<'a>(cursor: &Cursor<&'a [u8]>) -> &'a [u8] {
    let pos = cursor.position() as usize;
    &cursor.get_ref()[pos.min(cursor.get_ref().len())..]
}

fn read_hash32(cursor: &mut Cursor<&[u8]>) -> Result<Hash32, TxError> {
    let mut buf = [0u8; 32];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| parse_err("truncated 32-byte field"))?;
    Ok(Hash32::from_bytes(buf))
}

use std::io::Read;

// ---------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------

/// Serializes every field except the witness list — this is the byte string
/// `txid` is hashed over (spec.md §4.2).
pub fn serialize_tx_without_witness(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::new();
    write_tx_body(&mut out, tx);
    out
}

/// Serializes the full transaction including witnesses — the byte string
/// `wtxid` is hashed over, and the canonical wire form of a transaction.
pub fn serialize_tx(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::new();
    write_tx_body(&mut out, tx);
    write_compact_size(&mut out, tx.witnesses.len() as u64);
    for w in &tx.witnesses {
        out.push(w.suite_id);
        write_bytes(&mut out, &w.pubkey);
        write_bytes(&mut out, &w.signature);
    }
    out
}

/// Serializes just the output list (value ‖ covenant_type ‖ covenant_data per
/// output), used as the `serialize_outputs` input to SigHashV1 (spec.md §4.2).
pub fn serialize_outputs_for_sighash(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::new();
    write_compact_size(&mut out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        out.write_u64::<LittleEndian>(output.value).expect("vec write");
        out.write_u16::<LittleEndian>(output.covenant_type)
            .expect("vec write");
        write_bytes(&mut out, &output.covenant_data);
    }
    out
}

fn write_tx_body(out: &mut Vec<u8>, tx: &Transaction) {
    out.write_u32::<LittleEndian>(tx.version).expect("vec write");
    out.push(tx.tx_kind);
    out.write_u64::<LittleEndian>(tx.tx_nonce).expect("vec write");
    write_compact_size(out, tx.inputs.len() as u64);
    for input in &tx.inputs {
        out.extend_from_slice(input.prev_outpoint.txid.as_bytes());
        out.write_u32::<LittleEndian>(input.prev_outpoint.vout)
            .expect("vec write");
        write_bytes(out, &input.script_sig);
        out.write_u32::<LittleEndian>(input.sequence).expect("vec write");
    }
    write_compact_size(out, tx.outputs.len() as u64);
    for output in &tx.outputs {
        out.write_u64::<LittleEndian>(output.value).expect("vec write");
        out.write_u16::<LittleEndian>(output.covenant_type)
            .expect("vec write");
        write_bytes(out, &output.covenant_data);
    }
    out.write_u32::<LittleEndian>(tx.locktime).expect("vec write");
}

/// Parses a transaction, requiring that every byte of `bytes` is consumed.
/// Returns the decoded transaction and the number of bytes read (always
/// `bytes.len()` on success, since trailing bytes are rejected).
pub fn parse_tx(bytes: &[u8]) -> Result<(Transaction, usize), TxError> {
    let mut cursor = Cursor::new(bytes);
    let version = cursor.read_u32::<LittleEndian>().map_err(|_| parse_err("tx: truncated version"))?;
    let mut kind_buf = [0u8; 1];
    cursor
        .read_exact(&mut kind_buf)
        .map_err(|_| parse_err("tx: truncated tx_kind"))?;
    let tx_kind = kind_buf[0];
    let tx_nonce = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| parse_err("tx: truncated tx_nonce"))?;

    let (input_count, consumed) = decode_compact_size(remaining_slice(&cursor))?;
    cursor.set_position(cursor.position() + consumed as u64);
    if input_count == 0 {
        return Err(parse_err("tx: input_count is zero"));
    }
    let mut inputs = Vec::with_capacity(input_count as usize);
    for _ in 0..input_count {
        let txid = read_hash32(&mut cursor)?;
        let vout = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| parse_err("tx: truncated vout"))?;
        let script_sig = read_bytes(&mut cursor)?;
        let sequence = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| parse_err("tx: truncated sequence"))?;
        inputs.push(TxInput {
            prev_outpoint: Outpoint::new(txid, vout),
            script_sig,
            sequence,
        });
    }

    let (output_count, consumed) = decode_compact_size(remaining_slice(&cursor))?;
    cursor.set_position(cursor.position() + consumed as u64);
    if output_count == 0 {
        return Err(parse_err("tx: output_count is zero"));
    }
    let mut outputs = Vec::with_capacity(output_count as usize);
    for _ in 0..output_count {
        let value = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| parse_err("tx: truncated output value"))?;
        if value > (1u64 << 63) - 1 {
            return Err(parse_err("tx: output value exceeds 2^63-1"));
        }
        let covenant_type = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| parse_err("tx: truncated covenant_type"))?;
        let covenant_data = read_bytes(&mut cursor)?;
        outputs.push(TxOutput {
            value,
            covenant_type,
            covenant_data,
        });
    }

    let locktime = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| parse_err("tx: truncated locktime"))?;

    let (witness_count, consumed) = decode_compact_size(remaining_slice(&cursor))?;
    cursor.set_position(cursor.position() + consumed as u64);
    let mut witnesses = Vec::with_capacity(witness_count as usize);
    for _ in 0..witness_count {
        let mut suite_buf = [0u8; 1];
        cursor
            .read_exact(&mut suite_buf)
            .map_err(|_| parse_err("tx: truncated witness suite_id"))?;
        let pubkey = read_bytes(&mut cursor)?;
        let signature = read_bytes(&mut cursor)?;
        witnesses.push(Witness {
            suite_id: suite_buf[0],
            pubkey,
            signature,
        });
    }

    let da_payload = read_bytes(&mut cursor)?;

    let consumed_total = cursor.position() as usize;
    if consumed_total != bytes.len() {
        return Err(parse_err("tx: trailing bytes after da_payload"));
    }

    let tx = Transaction {
        version,
        tx_kind,
        tx_nonce,
        inputs,
        outputs,
        locktime,
        witnesses,
        da_payload,
    };
    Ok((tx, consumed_total))
}

// ---------------------------------------------------------------------
// Block header / block
// ---------------------------------------------------------------------

/// Serializes a header to its fixed 116-byte canonical form (spec.md §3).
pub fn serialize_block_header(hdr: &BlockHeader) -> [u8; 116] {
    let mut out = [0u8; 116];
    out[0..4].copy_from_slice(&hdr.version.to_le_bytes());
    out[4..36].copy_from_slice(hdr.prev_block_hash.as_bytes());
    out[36..68].copy_from_slice(hdr.merkle_root.as_bytes());
    out[68..76].copy_from_slice(&hdr.timestamp.to_le_bytes());
    out[76..108].copy_from_slice(hdr.target.as_bytes());
    out[108..116].copy_from_slice(&hdr.nonce.to_le_bytes());
    out
}

/// Parses exactly 116 bytes into a `BlockHeader`.
pub fn parse_block_header(bytes: &[u8]) -> Result<BlockHeader, BlockError> {
    if bytes.len() != 116 {
        return Err(BlockError::Parse);
    }
    let mut version_buf = [0u8; 4];
    version_buf.copy_from_slice(&bytes[0..4]);
    let version = u32::from_le_bytes(version_buf);

    let mut prev_buf = [0u8; 32];
    prev_buf.copy_from_slice(&bytes[4..36]);
    let prev_block_hash = Hash32::from_bytes(prev_buf);

    let mut merkle_buf = [0u8; 32];
    merkle_buf.copy_from_slice(&bytes[36..68]);
    let merkle_root = Hash32::from_bytes(merkle_buf);

    let mut ts_buf = [0u8; 8];
    ts_buf.copy_from_slice(&bytes[68..76]);
    let timestamp = u64::from_le_bytes(ts_buf);

    let mut target_buf = [0u8; 32];
    target_buf.copy_from_slice(&bytes[76..108]);
    let target = Hash32::from_bytes(target_buf);

    let mut nonce_buf = [0u8; 8];
    nonce_buf.copy_from_slice(&bytes[108..116]);
    let nonce = u64::from_le_bytes(nonce_buf);

    Ok(BlockHeader {
        version,
        prev_block_hash,
        merkle_root,
        timestamp,
        target,
        nonce,
    })
}

/// Serializes a full block: 116-byte header, compact-size tx_count, then
/// each transaction's canonical (witness-included) bytes, each itself
/// length-prefixed so `parse_block` can locate tx boundaries without
/// re-parsing neighbors on error.
pub fn serialize_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&serialize_block_header(&block.header));
    write_compact_size(&mut out, block.txs.len() as u64);
    for tx in &block.txs {
        write_bytes(&mut out, &serialize_tx(tx));
    }
    out
}

/// Parses a full block, requiring that every byte of `bytes` is consumed.
pub fn parse_block(bytes: &[u8]) -> Result<Block, BlockError> {
    if bytes.len() < 116 {
        return Err(BlockError::Parse);
    }
    let header = parse_block_header(&bytes[0..116])?;
    let mut cursor = Cursor::new(&bytes[116..]);
    let (tx_count, consumed) = decode_compact_size(remaining_slice(&cursor))
        .map_err(|_| BlockError::Parse)?;
    cursor.set_position(consumed as u64);
    if tx_count == 0 {
        return Err(BlockError::Parse);
    }

    let mut txs = Vec::with_capacity(tx_count as usize);
    for _ in 0..tx_count {
        let tx_bytes = read_bytes(&mut cursor).map_err(|_| BlockError::Parse)?;
        let (tx, consumed) = parse_tx(&tx_bytes).map_err(BlockError::Tx)?;
        if consumed != tx_bytes.len() {
            return Err(BlockError::Parse);
        }
        txs.push(tx);
    }

    if cursor.position() as usize != bytes.len() - 116 {
        return Err(BlockError::Parse);
    }

    Ok(Block { header, txs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TxInput, TxOutput};

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            tx_kind: 0,
            tx_nonce: 42,
            inputs: vec![TxInput {
                prev_outpoint: Outpoint::new(Hash32::from_bytes([7u8; 32]), 3),
                script_sig: vec![1, 2, 3],
                sequence: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOutput {
                value: 5000,
                covenant_type: 1,
                covenant_data: vec![9; 33],
            }],
            locktime: 0,
            witnesses: vec![Witness {
                suite_id: 1,
                pubkey: vec![0xAB; 2592],
                signature: vec![0xCD; 4627],
            }],
            da_payload: vec![],
        }
    }

    #[test]
    fn compact_size_round_trips_boundary_values() {
        for n in [0u64, 1, 0xFC, 0xFD, 0xFFFF, 0x10000, u32::MAX as u64, u32::MAX as u64 + 1, u64::MAX] {
            let encoded = encode_compact_size(n);
            let (decoded, consumed) = decode_compact_size(&encoded).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn compact_size_rejects_non_minimal_encoding() {
        let non_minimal = [0xFD, 0x05, 0x00];
        assert!(decode_compact_size(&non_minimal).is_err());
    }

    #[test]
    fn compact_size_rejects_truncated_buffer() {
        assert!(decode_compact_size(&[0xFD, 0x05]).is_err());
        assert!(decode_compact_size(&[]).is_err());
    }

    #[test]
    fn tx_round_trips_through_parse_and_serialize() {
        let tx = sample_tx();
        let bytes = serialize_tx(&tx);
        let (parsed, consumed) = parse_tx(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, tx);
        assert_eq!(serialize_tx(&parsed), bytes);
    }

    #[test]
    fn tx_parse_rejects_trailing_bytes() {
        let tx = sample_tx();
        let mut bytes = serialize_tx(&tx);
        bytes.push(0xFF);
        assert!(parse_tx(&bytes).is_err());
    }

    #[test]
    fn tx_without_witness_omits_witness_bytes() {
        let tx = sample_tx();
        let full = serialize_tx(&tx);
        let without = serialize_tx_without_witness(&tx);
        assert!(without.len() < full.len());
        assert!(full.starts_with(&without));
    }

    #[test]
    fn block_header_round_trips() {
        let hdr = BlockHeader {
            version: 7,
            prev_block_hash: Hash32::from_bytes([1u8; 32]),
            merkle_root: Hash32::from_bytes([2u8; 32]),
            timestamp: 1_700_000_000,
            target: Hash32::from_bytes([0xFFu8; 32]),
            nonce: 123_456_789,
        };
        let bytes = serialize_block_header(&hdr);
        assert_eq!(bytes.len(), 116);
        let parsed = parse_block_header(&bytes).unwrap();
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn block_round_trips_with_multiple_txs() {
        let hdr = BlockHeader {
            version: 1,
            prev_block_hash: Hash32::ZERO,
            merkle_root: Hash32::ZERO,
            timestamp: 10,
            target: Hash32::from_bytes([0xFFu8; 32]),
            nonce: 0,
        };
        let block = Block {
            header: hdr,
            txs: vec![sample_tx(), sample_tx()],
        };
        let bytes = serialize_block(&block);
        let parsed = parse_block(&bytes).unwrap();
        assert_eq!(parsed, block);
    }

    proptest::proptest! {
        /// `decode(encode(n)) == n` for any `u64` (spec.md §4.1, §8 codec round-trip).
        #[test]
        fn compact_size_round_trips_any_u64(n in proptest::num::u64::ANY) {
            let encoded = encode_compact_size(n);
            let (decoded, consumed) = decode_compact_size(&encoded).unwrap();
            prop_assert_eq!(decoded, n);
            prop_assert_eq!(consumed, encoded.len());
        }

        /// A CompactSize prefix followed by fewer bytes than it promises is
        /// always rejected, never panics.
        #[test]
        fn compact_size_rejects_arbitrary_truncation(n in proptest::num::u64::ANY, cut in 0usize..9) {
            let encoded = encode_compact_size(n);
            if cut < encoded.len() {
                let _ = decode_compact_size(&encoded[..cut]);
            }
        }
    }

    #[test]
    fn block_parse_rejects_trailing_bytes() {
        let hdr = BlockHeader {
            version: 1,
            prev_block_hash: Hash32::ZERO,
            merkle_root: Hash32::ZERO,
            timestamp: 10,
            target: Hash32::from_bytes([0xFFu8; 32]),
            nonce: 0,
        };
        let block = Block {
            header: hdr,
            txs: vec![sample_tx()],
        };
        let mut bytes = serialize_block(&block);
        bytes.push(0x00);
        assert!(parse_block(&bytes).is_err());
    }
}
