//! Address decoding and format conversion.

use slp_core::{Address, AddressFormat, Network};
use wasm_bindgen::prelude::*;

use crate::state::AddressInfo;

/// Output formats accepted by `convertAddress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    CashAddr(AddressFormat),
    Legacy,
}

impl TargetFormat {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash" | "cashaddr" | "bitcoincash" => Some(TargetFormat::CashAddr(AddressFormat::Cash)),
            "slp" | "simpleledger" => Some(TargetFormat::CashAddr(AddressFormat::Slp)),
            "legacy" | "base58" => Some(TargetFormat::Legacy),
            _ => None,
        }
    }
}

pub(crate) fn parse_network(network: &str) -> Result<Network, String> {
    Network::from_str(network).ok_or_else(|| format!("Invalid network: {}", network))
}

pub(crate) fn parse_address(text: &str, network: &str) -> Result<Address, String> {
    let params = parse_network(network)?.params();
    Address::parse(text.trim(), &params).map_err(|e| format!("Invalid address: {}", e))
}

pub(crate) fn convert(text: &str, network: &str, format: &str) -> Result<String, String> {
    let target = TargetFormat::from_str(format).ok_or_else(|| format!("Unknown address format: {}", format))?;
    let address = parse_address(text, network)?;
    match target {
        TargetFormat::CashAddr(AddressFormat::Cash) => Ok(address.to_cash_address()),
        TargetFormat::CashAddr(AddressFormat::Slp) => Ok(address.to_slp_address()),
        TargetFormat::Legacy => address.to_legacy().map_err(|e| e.to_string()),
    }
}

/// Decode an address in any format for the given network.
///
/// # Arguments
/// * `text` - CashAddr, SLP or legacy address
/// * `network` - The network ("mainnet", "testnet3", "testnet4", "scalenet" or "regtest")
#[wasm_bindgen(js_name = decodeAddress)]
pub fn decode_address(text: &str, network: &str) -> Result<JsValue, JsValue> {
    let address = parse_address(text, network).map_err(|e| JsValue::from_str(&e))?;
    AddressInfo::from_address(&address).to_js()
}

/// Re-render an address as `cashaddr`, `slp` or `legacy`.
#[wasm_bindgen(js_name = convertAddress)]
pub fn convert_address(text: &str, network: &str, format: &str) -> Result<String, JsValue> {
    convert(text, network, format).map_err(|e| JsValue::from_str(&e))
}
