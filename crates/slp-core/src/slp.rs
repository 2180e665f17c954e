//! SLP token type 1 OP_RETURN classification, parsing and construction.
//!
//! An SLP transaction carries its token metadata in output 0:
//!
//! ```text
//! OP_RETURN <"SLP\0"> <0x01> <tx type> <type-specific fields...> <amount>...
//! ```
//!
//! Amount chunk `i` assigns tokens to output `i + 1`.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::hash_to_display_hex;
use crate::script::{self, parse_chunks, ScriptBuilder, ScriptChunk, ScriptError, OP_RETURN};
use crate::transaction::{OutPoint, Transaction};

/// Protocol identifier pushed as chunk 1.
pub const LOKAD_ID: [u8; 4] = *b"SLP\0";

/// The only token type understood here.
pub const TOKEN_TYPE_1: u8 = 0x01;

/// Largest number of outputs a SEND may assign tokens to.
pub const MAX_SEND_OUTPUTS: usize = 19;

/// Largest number of decimal places a token may declare.
pub const MAX_DECIMALS: u8 = 9;

const PROTOCOL_CHUNK: usize = 1;
const TOKEN_TYPE_CHUNK: usize = 2;
const TX_TYPE_CHUNK: usize = 3;
const TOKEN_ID_CHUNK: usize = 4;

/// SLP transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlpTxType {
    Genesis,
    Mint,
    Send,
}

impl SlpTxType {
    /// The marker pushed as chunk 3.
    pub fn marker(&self) -> &'static [u8] {
        match self {
            SlpTxType::Genesis => b"GENESIS",
            SlpTxType::Mint => b"MINT",
            SlpTxType::Send => b"SEND",
        }
    }

    pub fn from_marker(marker: &[u8]) -> Option<Self> {
        match marker {
            b"GENESIS" => Some(SlpTxType::Genesis),
            b"MINT" => Some(SlpTxType::Mint),
            b"SEND" => Some(SlpTxType::Send),
            _ => None,
        }
    }

    /// Index of the first amount chunk.
    pub fn amounts_offset(&self) -> usize {
        match self {
            SlpTxType::Genesis => 10,
            SlpTxType::Mint => 6,
            SlpTxType::Send => 5,
        }
    }

    /// Index of the mint baton vout chunk, for types that have one.
    pub fn baton_chunk(&self) -> Option<usize> {
        match self {
            SlpTxType::Genesis => Some(9),
            SlpTxType::Mint => Some(5),
            SlpTxType::Send => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SlpTxType::Genesis => "GENESIS",
            SlpTxType::Mint => "MINT",
            SlpTxType::Send => "SEND",
        }
    }
}

/// Why an SLP-tagged OP_RETURN could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlpMalformed {
    #[error("OP_RETURN script does not parse: {0}")]
    Script(#[from] ScriptError),
    #[error("{tx_type:?} needs chunk {index}, script has {count}")]
    MissingChunk { tx_type: SlpTxType, index: usize, count: usize },
    #[error("chunk {index} must be a data push")]
    NullChunk { index: usize },
    #[error("token id must be 32 bytes, found {0}")]
    TokenIdLength(usize),
    #[error("amount chunk {index} is {len} bytes, expected 1 to 8")]
    AmountLength { index: usize, len: usize },
    #[error("SEND assigns {0} outputs, at most 19 allowed")]
    TooManyAmounts(usize),
    #[error("amount for output {vout} but the transaction has {outputs} outputs")]
    MissingOutput { vout: usize, outputs: usize },
    #[error("mint baton chunk is {0} bytes")]
    BatonLength(usize),
    #[error("mint baton cannot sit at output {0}")]
    BatonVout(u32),
    #[error("decimals chunk is {0} bytes, expected 1")]
    DecimalsLength(usize),
    #[error("{0} decimals exceeds the maximum of 9")]
    Decimals(u8),
    #[error("document hash must be empty or 32 bytes, found {0}")]
    DocumentHashLength(usize),
}

/// GENESIS metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlpGenesisInfo {
    pub ticker: String,
    pub name: String,
    pub document_url: String,
    pub document_hash: Option<[u8; 32]>,
    pub decimals: u8,
}

/// A parsed SLP transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlpTransaction {
    /// Id of the classified transaction (internal byte order).
    pub txid: [u8; 32],
    pub tx_type: SlpTxType,
    /// Token id as lowercase display hex.
    pub token_id: String,
    /// Raw amounts; entry `i` belongs to output `i + 1`.
    pub amounts: Vec<u64>,
    pub mint_baton_vout: Option<u32>,
    /// Present for GENESIS only.
    pub genesis: Option<SlpGenesisInfo>,
}

/// Kind of token-carrying output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlpUtxoKind {
    Normal,
    MintBaton,
}

/// A token-carrying output of an SLP transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlpUtxo {
    pub outpoint: OutPoint,
    pub token_id: String,
    pub amount: u64,
    pub kind: SlpUtxoKind,
}

impl SlpTransaction {
    pub fn has_mint_baton(&self) -> bool {
        self.mint_baton_vout.is_some()
    }

    /// Raw amount assigned to output `vout`, zero if none.
    pub fn amount_at(&self, vout: u32) -> u64 {
        (vout as usize)
            .checked_sub(1)
            .and_then(|i| self.amounts.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Outputs that carry tokens or the mint baton.
    pub fn utxos(&self) -> Vec<SlpUtxo> {
        let mut utxos: Vec<SlpUtxo> = self
            .amounts
            .iter()
            .enumerate()
            .filter(|(_, amount)| **amount > 0)
            .map(|(i, &amount)| SlpUtxo {
                outpoint: OutPoint::new(self.txid, i as u32 + 1),
                token_id: self.token_id.clone(),
                amount,
                kind: SlpUtxoKind::Normal,
            })
            .collect();

        if let Some(vout) = self.mint_baton_vout {
            utxos.push(SlpUtxo {
                outpoint: OutPoint::new(self.txid, vout),
                token_id: self.token_id.clone(),
                amount: 0,
                kind: SlpUtxoKind::MintBaton,
            });
        }
        utxos
    }
}

/// Result of inspecting a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlpClassification {
    /// Output 0 is not an SLP token type 1 OP_RETURN.
    NotSlp,
    /// Output 0 is tagged as SLP but violates the layout.
    Malformed(SlpMalformed),
    Slp(SlpTransaction),
}

impl SlpClassification {
    pub fn is_slp(&self) -> bool {
        matches!(self, SlpClassification::Slp(_))
    }

    pub fn slp(&self) -> Option<&SlpTransaction> {
        match self {
            SlpClassification::Slp(tx) => Some(tx),
            _ => None,
        }
    }

    pub fn into_slp(self) -> Option<SlpTransaction> {
        match self {
            SlpClassification::Slp(tx) => Some(tx),
            _ => None,
        }
    }
}

/// Classify a transaction.
pub fn classify(tx: &Transaction) -> SlpClassification {
    let Some(first) = tx.outputs.first() else {
        return SlpClassification::NotSlp;
    };
    let script = &first.script_pubkey;
    if !script::is_op_return(script) {
        return SlpClassification::NotSlp;
    }

    let chunks = match parse_chunks(script) {
        Ok(chunks) => chunks,
        Err(err) if has_lokad_prefix(script) => {
            debug!("SLP-tagged OP_RETURN does not parse: {}", err);
            return SlpClassification::Malformed(err.into());
        }
        Err(_) => return SlpClassification::NotSlp,
    };

    let Some(tx_type) = recognise(&chunks) else {
        return SlpClassification::NotSlp;
    };

    match parse(tx, tx_type, &chunks) {
        Ok(slp) => {
            trace!("{} {} for token {}", slp.tx_type.name(), tx.txid_hex(), slp.token_id);
            SlpClassification::Slp(slp)
        }
        Err(reason) => {
            debug!("malformed SLP {} in {}: {}", tx_type.name(), tx.txid_hex(), reason);
            SlpClassification::Malformed(reason)
        }
    }
}

/// `OP_RETURN` followed by a direct push of the lokad id.
fn has_lokad_prefix(script: &[u8]) -> bool {
    script.len() >= 6 && script[0] == OP_RETURN && script[1] == 4 && script[2..6] == LOKAD_ID
}

/// Match the protocol id, token type and transaction type chunks.
fn recognise(chunks: &[ScriptChunk]) -> Option<SlpTxType> {
    let data = |index: usize| chunks.get(index).and_then(|c| c.data.as_deref());

    if data(PROTOCOL_CHUNK)? != LOKAD_ID {
        return None;
    }
    if data(TOKEN_TYPE_CHUNK)? != [TOKEN_TYPE_1] {
        return None;
    }
    SlpTxType::from_marker(data(TX_TYPE_CHUNK)?)
}

fn parse(tx: &Transaction, tx_type: SlpTxType, chunks: &[ScriptChunk]) -> Result<SlpTransaction, SlpMalformed> {
    let offset = tx_type.amounts_offset();
    if chunks.len() < offset {
        return Err(SlpMalformed::MissingChunk { tx_type, index: offset - 1, count: chunks.len() });
    }

    let txid = tx.txid();
    let token_id = match tx_type {
        SlpTxType::Genesis => hash_to_display_hex(&txid),
        SlpTxType::Mint | SlpTxType::Send => {
            let id = required(chunks, TOKEN_ID_CHUNK)?;
            if id.len() != 32 {
                return Err(SlpMalformed::TokenIdLength(id.len()));
            }
            hex::encode(id)
        }
    };

    let genesis = match tx_type {
        SlpTxType::Genesis => Some(parse_genesis_info(chunks)?),
        _ => None,
    };

    let amounts = chunks[offset..]
        .iter()
        .enumerate()
        .map(|(i, chunk)| parse_amount(chunk, offset + i))
        .collect::<Result<Vec<u64>, _>>()?;

    if tx_type == SlpTxType::Send && amounts.len() > MAX_SEND_OUTPUTS {
        return Err(SlpMalformed::TooManyAmounts(amounts.len()));
    }
    if amounts.len() >= tx.outputs.len() {
        return Err(SlpMalformed::MissingOutput { vout: amounts.len(), outputs: tx.outputs.len() });
    }

    let mint_baton_vout = match tx_type.baton_chunk() {
        Some(index) => parse_baton(&chunks[index])?,
        None => None,
    };

    Ok(SlpTransaction { txid, tx_type, token_id, amounts, mint_baton_vout, genesis })
}

/// Data of a chunk that must be a push.
fn required(chunks: &[ScriptChunk], index: usize) -> Result<&[u8], SlpMalformed> {
    chunks[index].data.as_deref().ok_or(SlpMalformed::NullChunk { index })
}

fn parse_genesis_info(chunks: &[ScriptChunk]) -> Result<SlpGenesisInfo, SlpMalformed> {
    let text = |index: usize| required(chunks, index).map(|d| String::from_utf8_lossy(d).into_owned());

    let document_hash = match required(chunks, 7)? {
        [] => None,
        bytes => {
            let hash: [u8; 32] =
                bytes.try_into().map_err(|_| SlpMalformed::DocumentHashLength(bytes.len()))?;
            Some(hash)
        }
    };

    let decimals = match required(chunks, 8)? {
        [d] => *d,
        other => return Err(SlpMalformed::DecimalsLength(other.len())),
    };
    if decimals > MAX_DECIMALS {
        return Err(SlpMalformed::Decimals(decimals));
    }

    Ok(SlpGenesisInfo {
        ticker: text(4)?,
        name: text(5)?,
        document_url: text(6)?,
        document_hash,
        decimals,
    })
}

/// Big-endian amount of 1 to 8 bytes.
fn parse_amount(chunk: &ScriptChunk, index: usize) -> Result<u64, SlpMalformed> {
    let data = chunk.data.as_deref().ok_or(SlpMalformed::NullChunk { index })?;
    if data.is_empty() || data.len() > 8 {
        return Err(SlpMalformed::AmountLength { index, len: data.len() });
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// An absent or empty baton chunk means no baton.
fn parse_baton(chunk: &ScriptChunk) -> Result<Option<u32>, SlpMalformed> {
    let data = match chunk.data.as_deref() {
        None | Some([]) => return Ok(None),
        Some(data) => data,
    };
    if data.len() > 4 {
        return Err(SlpMalformed::BatonLength(data.len()));
    }
    let vout = data.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
    if vout < 2 {
        return Err(SlpMalformed::BatonVout(vout));
    }
    Ok(Some(vout))
}

// ============================================================================
// OP_RETURN construction
// ============================================================================

/// Errors building an SLP OP_RETURN.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlpBuildError {
    #[error("token id must be 64 hex characters: {0:?}")]
    InvalidTokenId(String),
    #[error("SEND needs 1 to 19 amounts, got {0}")]
    AmountCount(usize),
    #[error("{0} decimals exceeds the maximum of 9")]
    Decimals(u8),
    #[error("quantity {quantity} with {decimals} decimals overflows 64 bits")]
    Overflow { quantity: u64, decimals: u8 },
    #[error("mint baton cannot sit at output {0}")]
    BatonVout(u8),
}

/// Parameters of a new token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisParams {
    pub ticker: String,
    pub name: String,
    pub document_url: String,
    pub document_hash: Option<[u8; 32]>,
    pub decimals: u8,
    /// Initial supply in whole tokens; scaled by `10^decimals`.
    pub initial_quantity: u64,
    pub mint_baton_vout: Option<u8>,
}

fn slp_header(tx_type: SlpTxType) -> ScriptBuilder {
    ScriptBuilder::new()
        .push_opcode(OP_RETURN)
        .push_data(&LOKAD_ID)
        .push_data(&[TOKEN_TYPE_1])
        .push_data(tx_type.marker())
}

fn push_text(builder: ScriptBuilder, text: &str) -> ScriptBuilder {
    if text.is_empty() {
        builder.push_empty()
    } else {
        builder.push_data(text.as_bytes())
    }
}

fn push_baton(builder: ScriptBuilder, vout: Option<u8>) -> Result<ScriptBuilder, SlpBuildError> {
    match vout {
        None => Ok(builder.push_empty()),
        Some(v) if v < 2 => Err(SlpBuildError::BatonVout(v)),
        Some(v) => Ok(builder.push_data(&[v])),
    }
}

fn decode_token_id(token_id: &str) -> Result<[u8; 32], SlpBuildError> {
    hex::decode(token_id)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| SlpBuildError::InvalidTokenId(token_id.to_string()))
}

/// OP_RETURN for a SEND of `amounts` to outputs `1..=amounts.len()`.
pub fn send_script(token_id: &str, amounts: &[u64]) -> Result<Vec<u8>, SlpBuildError> {
    if amounts.is_empty() || amounts.len() > MAX_SEND_OUTPUTS {
        return Err(SlpBuildError::AmountCount(amounts.len()));
    }
    let id = decode_token_id(token_id)?;

    let builder = slp_header(SlpTxType::Send).push_data(&id);
    let builder = amounts
        .iter()
        .fold(builder, |b, amount| b.push_data(&amount.to_be_bytes()));
    Ok(builder.build())
}

/// OP_RETURN creating a new token; the supply goes to output 1.
pub fn genesis_script(params: &GenesisParams) -> Result<Vec<u8>, SlpBuildError> {
    if params.decimals > MAX_DECIMALS {
        return Err(SlpBuildError::Decimals(params.decimals));
    }
    let raw = 10u64
        .checked_pow(params.decimals as u32)
        .and_then(|scale| params.initial_quantity.checked_mul(scale))
        .ok_or(SlpBuildError::Overflow { quantity: params.initial_quantity, decimals: params.decimals })?;

    let mut builder = slp_header(SlpTxType::Genesis);
    builder = push_text(builder, &params.ticker);
    builder = push_text(builder, &params.name);
    builder = push_text(builder, &params.document_url);
    builder = match &params.document_hash {
        Some(hash) => builder.push_data(hash),
        None => builder.push_empty(),
    };
    builder = builder.push_data(&[params.decimals]);
    builder = push_baton(builder, params.mint_baton_vout)?;
    Ok(builder.push_data(&raw.to_be_bytes()).build())
}

/// OP_RETURN minting `amount` raw units to output 1.
pub fn mint_script(token_id: &str, mint_baton_vout: Option<u8>, amount: u64) -> Result<Vec<u8>, SlpBuildError> {
    let id = decode_token_id(token_id)?;
    let builder = slp_header(SlpTxType::Mint).push_data(&id);
    let builder = push_baton(builder, mint_baton_vout)?;
    Ok(builder.push_data(&amount.to_be_bytes()).build())
}
