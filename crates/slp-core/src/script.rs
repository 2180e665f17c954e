//! Script chunking and construction.
//!
//! Only the subset of script needed to read OP_RETURN metadata and recognise
//! pay-to-hash outputs is implemented; nothing here evaluates scripts.

use thiserror::Error;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Largest length a direct push opcode can carry.
const MAX_DIRECT_PUSH: usize = 0x4b;

/// Script decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// A push opcode claims more bytes than the script holds.
    #[error("push at offset {offset} needs {needed} bytes, {available} available")]
    Truncated { offset: usize, needed: usize, available: usize },
}

/// One opcode of a script together with the bytes it pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptChunk {
    /// The opcode byte.
    pub opcode: u8,
    /// Pushed bytes; `None` for opcodes that push nothing.
    pub data: Option<Vec<u8>>,
}

/// Split a script into chunks.
pub fn parse_chunks(script: &[u8]) -> Result<Vec<ScriptChunk>, ScriptError> {
    let mut chunks = Vec::new();
    let mut pos = 0;

    while pos < script.len() {
        let offset = pos;
        let opcode = script[pos];
        pos += 1;

        let len = match opcode {
            OP_0 => Some(0),
            0x01..=0x4b => Some(opcode as usize),
            OP_PUSHDATA1 => Some(read_le(script, &mut pos, 1, offset)?),
            OP_PUSHDATA2 => Some(read_le(script, &mut pos, 2, offset)?),
            OP_PUSHDATA4 => Some(read_le(script, &mut pos, 4, offset)?),
            _ => None,
        };

        let data = match len {
            Some(len) => {
                let available = script.len() - pos;
                if len > available {
                    return Err(ScriptError::Truncated { offset, needed: len, available });
                }
                let data = script[pos..pos + len].to_vec();
                pos += len;
                Some(data)
            }
            None => None,
        };

        chunks.push(ScriptChunk { opcode, data });
    }

    Ok(chunks)
}

/// Read a little-endian length prefix of `width` bytes.
fn read_le(script: &[u8], pos: &mut usize, width: usize, offset: usize) -> Result<usize, ScriptError> {
    let available = script.len() - *pos;
    if width > available {
        return Err(ScriptError::Truncated { offset, needed: width, available });
    }
    let value = script[*pos..*pos + width]
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    *pos += width;
    Ok(value)
}

/// Builder for output scripts.
///
/// Pushes always carry their bytes literally; a one-byte push of `0x01` stays
/// `01 01` and is never rewritten to `OP_1`.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bare opcode.
    pub fn push_opcode(mut self, opcode: u8) -> Self {
        self.script.push(opcode);
        self
    }

    /// Append a push of `data` using the shortest push encoding.
    pub fn push_data(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len == 0 {
            self.script.push(OP_0);
        } else if len <= MAX_DIRECT_PUSH {
            self.script.push(len as u8);
        } else if len <= 0xff {
            self.script.push(OP_PUSHDATA1);
            self.script.push(len as u8);
        } else if len <= 0xffff {
            self.script.push(OP_PUSHDATA2);
            self.script.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.script.push(OP_PUSHDATA4);
            self.script.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    /// Append an empty push encoded as `OP_PUSHDATA1 0x00`.
    pub fn push_empty(mut self) -> Self {
        self.script.push(OP_PUSHDATA1);
        self.script.push(0x00);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.script
    }
}

/// Whether the script starts with `OP_RETURN`.
pub fn is_op_return(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN)
}

/// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
pub fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

/// `OP_HASH160 <20> OP_EQUAL`
pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Build a pay-to-pubkey-hash output script.
pub fn p2pkh_script(hash: &[u8]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .build()
}

/// Build a pay-to-script-hash output script.
pub fn p2sh_script(hash: &[u8]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_HASH160)
        .push_data(hash)
        .push_opcode(OP_EQUAL)
        .build()
}
