//! Plain view types handed to JavaScript.
//!
//! Raw token amounts are rendered as decimal strings because they can exceed
//! the range JavaScript numbers hold exactly.

use serde::{Deserialize, Serialize};
use slp_core::slp::{SlpGenesisInfo, SlpTransaction};
use slp_core::{Address, SlpClassification, TokenBalance};
use wasm_bindgen::prelude::*;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {:?}", e)))
}

/// A decoded address in every format it can be rendered in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub network: String,
    pub address_type: String,
    /// Hash payload as hex.
    pub hash: String,
    pub cash_address: String,
    pub slp_address: String,
    /// Only 20-byte hashes have a legacy form.
    pub legacy_address: Option<String>,
}

impl AddressInfo {
    pub fn from_address(address: &Address) -> Self {
        AddressInfo {
            network: address.network().name().to_string(),
            address_type: address.address_type().name().to_string(),
            hash: hex::encode(address.hash()),
            cash_address: address.to_cash_address(),
            slp_address: address.to_slp_address(),
            legacy_address: address.to_legacy().ok(),
        }
    }

    pub fn to_js(&self) -> Result<JsValue, JsValue> {
        to_js(self)
    }
}

/// GENESIS metadata with the document hash as hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisView {
    pub ticker: String,
    pub name: String,
    pub document_url: String,
    pub document_hash: Option<String>,
    pub decimals: u8,
}

impl From<&SlpGenesisInfo> for GenesisView {
    fn from(info: &SlpGenesisInfo) -> Self {
        GenesisView {
            ticker: info.ticker.clone(),
            name: info.name.clone(),
            document_url: info.document_url.clone(),
            document_hash: info.document_hash.map(hex::encode),
            decimals: info.decimals,
        }
    }
}

/// A parsed SLP transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTxView {
    pub tx_type: String,
    pub token_id: String,
    pub amounts: Vec<String>,
    pub mint_baton_vout: Option<u32>,
    pub genesis: Option<GenesisView>,
}

impl From<&SlpTransaction> for TokenTxView {
    fn from(slp: &SlpTransaction) -> Self {
        TokenTxView {
            tx_type: slp.tx_type.name().to_string(),
            token_id: slp.token_id.clone(),
            amounts: slp.amounts.iter().map(u64::to_string).collect(),
            mint_baton_vout: slp.mint_baton_vout,
            genesis: slp.genesis.as_ref().map(GenesisView::from),
        }
    }
}

/// Classification outcome: `kind` is `not_slp`, `malformed` or `slp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationInfo {
    pub txid: String,
    pub kind: String,
    /// Why a malformed transaction was rejected.
    pub reason: Option<String>,
    pub token: Option<TokenTxView>,
}

impl ClassificationInfo {
    pub fn new(txid: String, classification: &SlpClassification) -> Self {
        let (kind, reason, token) = match classification {
            SlpClassification::NotSlp => ("not_slp", None, None),
            SlpClassification::Malformed(reason) => ("malformed", Some(reason.to_string()), None),
            SlpClassification::Slp(slp) => ("slp", None, Some(TokenTxView::from(slp))),
        };
        ClassificationInfo { txid, kind: kind.to_string(), reason, token }
    }

    pub fn to_js(&self) -> Result<JsValue, JsValue> {
        to_js(self)
    }
}

/// Balance of one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub token_id: String,
    pub raw: String,
    pub decimals: Option<u8>,
    /// Exact human-scale amount.
    pub display: String,
    pub value: f64,
    pub utxo_count: usize,
    pub mint_batons: usize,
}

impl From<&TokenBalance> for BalanceInfo {
    fn from(balance: &TokenBalance) -> Self {
        BalanceInfo {
            token_id: balance.token_id.clone(),
            raw: balance.raw.to_string(),
            decimals: balance.decimals,
            display: balance.to_string(),
            value: balance.as_f64(),
            utxo_count: balance.utxo_count,
            mint_batons: balance.mint_batons,
        }
    }
}

/// Serialize a list of balances.
pub fn balances_to_js(balances: &[BalanceInfo]) -> Result<JsValue, JsValue> {
    to_js(&balances)
}
