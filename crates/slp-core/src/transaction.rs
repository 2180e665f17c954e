//! Transaction decoding and serialization.
//!
//! Only the legacy (non-witness) layout exists on this chain, so the txid is
//! simply the double SHA256 of the full serialization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::{double_sha256, hash_to_display_hex};

/// Transaction decoding errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TxError {
    #[error("invalid transaction hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("unexpected end of data at offset {offset}: needed {needed} bytes")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("{count} {what} cannot fit in the remaining {remaining} bytes")]
    ImplausibleCount { what: &'static str, count: u64, remaining: usize },
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
}

/// Reference to an output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Txid in internal byte order.
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// Txid in display (reversed) hex.
    pub fn txid_hex(&self) -> String {
        hash_to_display_hex(&self.txid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Decode a serialized transaction. The input must contain exactly one
    /// transaction.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TxError> {
        let mut reader = Reader::new(bytes);

        let version = reader.read_u32()? as i32;

        // Smallest input is 41 bytes, smallest output 9.
        let input_count = reader.read_count("inputs", 41)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let txid = reader.read_array::<32>()?;
            let vout = reader.read_u32()?;
            let script_sig = reader.read_var_bytes()?;
            let sequence = reader.read_u32()?;
            inputs.push(TxIn { previous_output: OutPoint { txid, vout }, script_sig, sequence });
        }

        let output_count = reader.read_count("outputs", 9)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let value = reader.read_u64()?;
            let script_pubkey = reader.read_var_bytes()?;
            outputs.push(TxOut { value, script_pubkey });
        }

        let lock_time = reader.read_u32()?;

        let remaining = reader.remaining();
        if remaining != 0 {
            return Err(TxError::TrailingBytes(remaining));
        }

        Ok(Transaction { version, inputs, outputs, lock_time })
    }

    /// Decode a transaction from hex.
    pub fn from_hex(hex_str: &str) -> Result<Self, TxError> {
        let bytes = hex::decode(hex_str.trim())?;
        Self::deserialize(&bytes)
    }

    /// Serialize the transaction.
    pub fn serialize(&self) -> Vec<u8> {
        let mut raw_tx = Vec::with_capacity(200);

        raw_tx.extend_from_slice(&self.version.to_le_bytes());

        encode_varint(self.inputs.len() as u64, &mut raw_tx);
        for input in &self.inputs {
            raw_tx.extend_from_slice(&input.previous_output.txid);
            raw_tx.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            encode_varint(input.script_sig.len() as u64, &mut raw_tx);
            raw_tx.extend_from_slice(&input.script_sig);
            raw_tx.extend_from_slice(&input.sequence.to_le_bytes());
        }

        encode_varint(self.outputs.len() as u64, &mut raw_tx);
        for output in &self.outputs {
            raw_tx.extend_from_slice(&output.value.to_le_bytes());
            encode_varint(output.script_pubkey.len() as u64, &mut raw_tx);
            raw_tx.extend_from_slice(&output.script_pubkey);
        }

        raw_tx.extend_from_slice(&self.lock_time.to_le_bytes());
        raw_tx
    }

    /// Transaction id in internal byte order.
    pub fn txid(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }

    /// Transaction id as display hex.
    pub fn txid_hex(&self) -> String {
        hash_to_display_hex(&self.txid())
    }

    /// Outpoint referring to output `vout` of this transaction.
    pub fn outpoint(&self, vout: u32) -> OutPoint {
        OutPoint { txid: self.txid(), vout }
    }
}

/// Encode a variable-length integer (Bitcoin varint).
pub fn encode_varint(value: u64, output: &mut Vec<u8>) {
    if value < 0xfd {
        output.push(value as u8);
    } else if value <= 0xffff {
        output.push(0xfd);
        output.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffffffff {
        output.push(0xfe);
        output.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        output.push(0xff);
        output.extend_from_slice(&value.to_le_bytes());
    }
}

/// Cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TxError> {
        if n > self.remaining() {
            return Err(TxError::UnexpectedEof { offset: self.pos, needed: n });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TxError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, TxError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, TxError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32, TxError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64, TxError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_varint(&mut self) -> Result<u64, TxError> {
        match self.read_u8()? {
            0xfd => Ok(self.read_u16()? as u64),
            0xfe => Ok(self.read_u32()? as u64),
            0xff => self.read_u64(),
            n => Ok(n as u64),
        }
    }

    /// Read an element count, rejecting counts the remaining data cannot hold.
    fn read_count(&mut self, what: &'static str, min_size: usize) -> Result<usize, TxError> {
        let count = self.read_varint()?;
        let remaining = self.remaining();
        if count > (remaining / min_size) as u64 {
            return Err(TxError::ImplausibleCount { what, count, remaining });
        }
        Ok(count as usize)
    }

    fn read_var_bytes(&mut self) -> Result<Vec<u8>, TxError> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(TxError::UnexpectedEof { offset: self.pos, needed: len as usize });
        }
        Ok(self.take(len as usize)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Coinbase of the genesis block.
    const GENESIS_COINBASE: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

    #[test]
    fn test_decode_known_transaction() {
        let tx = Transaction::from_hex(GENESIS_COINBASE).unwrap();

        assert_eq!(tx.version, 1);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].previous_output.txid, [0u8; 32]);
        assert_eq!(tx.inputs[0].previous_output.vout, 0xffff_ffff);
        assert_eq!(tx.inputs[0].script_sig.len(), 0x4d);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, 5_000_000_000);
        assert_eq!(tx.lock_time, 0);

        assert_eq!(tx.txid_hex(), "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b");
        assert_eq!(hex::encode(tx.serialize()), GENESIS_COINBASE);
    }

    #[test]
    fn test_trailing_and_truncated() {
        let mut bytes = hex::decode(GENESIS_COINBASE).unwrap();
        bytes.push(0x00);
        assert_eq!(Transaction::deserialize(&bytes), Err(TxError::TrailingBytes(1)));

        bytes.truncate(bytes.len() - 3);
        assert!(matches!(Transaction::deserialize(&bytes), Err(TxError::UnexpectedEof { .. })));

        assert!(matches!(Transaction::from_hex("zz"), Err(TxError::InvalidHex(_))));
    }

    #[test]
    fn test_hex_errors_are_wrapped() {
        assert_eq!(Transaction::from_hex("abc"), Err(TxError::InvalidHex(hex::FromHexError::OddLength)));
        let err = Transaction::from_hex("0g").unwrap_err();
        assert!(err.to_string().starts_with("invalid transaction hex"));
    }

    #[test]
    fn test_implausible_count() {
        // version, then a varint claiming 0xffffffff inputs
        let bytes = [1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            Transaction::deserialize(&bytes),
            Err(TxError::ImplausibleCount { what: "inputs", count: 0xffff_ffff, .. })
        ));
    }

    #[test]
    fn test_encode_varint() {
        let mut output = Vec::new();

        encode_varint(100, &mut output);
        assert_eq!(output, vec![100]);

        output.clear();
        encode_varint(0x1234, &mut output);
        assert_eq!(output, vec![0xfd, 0x34, 0x12]);

        output.clear();
        encode_varint(0x1_0000, &mut output);
        assert_eq!(output, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn test_large_script_uses_wide_varint() {
        let tx = Transaction {
            version: 2,
            inputs: vec![TxIn {
                previous_output: OutPoint::new([7u8; 32], 3),
                script_sig: vec![0x51; 300],
                sequence: 0xffff_fffe,
            }],
            outputs: vec![TxOut { value: 546, script_pubkey: vec![0x6a] }],
            lock_time: 600_000,
        };

        let bytes = tx.serialize();
        assert_eq!(Transaction::deserialize(&bytes).unwrap(), tx);
        assert_eq!(tx.outpoint(1).txid, tx.txid());
    }
}
