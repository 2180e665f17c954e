//! Token balance scanner for browser wallets.

use std::collections::{BTreeSet, HashMap};

use slp_core::hash::hash_from_display_hex;
use slp_core::wallet::{raw_value, token_balances};
use slp_core::{classify, MemoryWallet, Network, OutPoint, Transaction};
use wasm_bindgen::prelude::*;

use crate::address::{parse_address, parse_network};
use crate::state::{balances_to_js, BalanceInfo, ClassificationInfo};

fn parse_tx(tx_hex: &str) -> Result<Transaction, String> {
    Transaction::from_hex(tx_hex.trim()).map_err(|e| format!("Invalid transaction: {}", e))
}

pub(crate) fn classification_info(tx_hex: &str) -> Result<ClassificationInfo, String> {
    let tx = parse_tx(tx_hex)?;
    Ok(ClassificationInfo::new(tx.txid_hex(), &classify(&tx)))
}

/// Classify a raw transaction as SLP, malformed SLP, or not SLP.
#[wasm_bindgen(js_name = classifyTransaction)]
pub fn classify_transaction(tx_hex: &str) -> Result<JsValue, JsValue> {
    classification_info(tx_hex).map_err(|e| JsValue::from_str(&e))?.to_js()
}

/// Accumulates a wallet's transactions and reports token balances.
#[wasm_bindgen]
pub struct TokenScanner {
    network: Network,
    wallet: MemoryWallet,
    /// Explicitly supplied wallet outputs; empty means derive them.
    outpoints: BTreeSet<OutPoint>,
    transaction_count: u32,
}

impl TokenScanner {
    pub(crate) fn create(network: &str) -> Result<TokenScanner, String> {
        Ok(TokenScanner {
            network: parse_network(network)?,
            wallet: MemoryWallet::new(),
            outpoints: BTreeSet::new(),
            transaction_count: 0,
        })
    }

    pub(crate) fn watch(&mut self, address: &str) -> Result<(), String> {
        let address = parse_address(address, self.network.name())?;
        self.wallet.add_script(address.script_pubkey());
        Ok(())
    }

    pub(crate) fn add_tx(&mut self, tx_hex: &str) -> Result<String, String> {
        let tx = parse_tx(tx_hex)?;
        let txid_hex = tx.txid_hex();
        self.wallet.add_transaction(tx);
        self.transaction_count += 1;
        Ok(txid_hex)
    }

    pub(crate) fn add_outpoint(&mut self, txid: &str, vout: u32) -> Result<(), String> {
        let txid = hash_from_display_hex(txid.trim()).ok_or_else(|| format!("Invalid txid: {}", txid))?;
        self.outpoints.insert(OutPoint::new(txid, vout));
        Ok(())
    }

    pub(crate) fn balance_list(&self, decimals: &HashMap<String, u8>) -> Vec<BalanceInfo> {
        let utxos: Vec<OutPoint> = if self.outpoints.is_empty() {
            self.wallet.unspent()
        } else {
            self.outpoints.iter().copied().collect()
        };
        token_balances(&utxos, &self.wallet, decimals).values().map(BalanceInfo::from).collect()
    }

    pub(crate) fn value_of(&self, tx_hex: &str) -> Result<i128, String> {
        let tx = parse_tx(tx_hex)?;
        Ok(raw_value(&tx, &self.wallet))
    }
}

#[wasm_bindgen]
impl TokenScanner {
    /// Create a scanner for a network ("mainnet", "testnet3", ...).
    #[wasm_bindgen(constructor)]
    pub fn new(network: &str) -> Result<TokenScanner, JsValue> {
        Self::create(network).map_err(|e| JsValue::from_str(&e))
    }

    /// Treat outputs paying to `address` as the wallet's own.
    #[wasm_bindgen(js_name = watchAddress)]
    pub fn watch_address(&mut self, address: &str) -> Result<(), JsValue> {
        self.watch(address).map_err(|e| JsValue::from_str(&e))
    }

    /// Add a raw transaction; returns its txid.
    #[wasm_bindgen(js_name = addTransaction)]
    pub fn add_transaction(&mut self, tx_hex: &str) -> Result<String, JsValue> {
        self.add_tx(tx_hex).map_err(|e| JsValue::from_str(&e))
    }

    /// Declare an unspent wallet output. Once any are declared, balances
    /// cover exactly the declared outputs.
    #[wasm_bindgen(js_name = addOutpoint)]
    pub fn add_outpoint_js(&mut self, txid: &str, vout: u32) -> Result<(), JsValue> {
        self.add_outpoint(txid, vout).map_err(|e| JsValue::from_str(&e))
    }

    /// Balances per token.
    ///
    /// # Arguments
    /// * `decimals` - Object mapping token id to decimals; may be undefined
    #[wasm_bindgen]
    pub fn balances(&self, decimals: JsValue) -> Result<JsValue, JsValue> {
        let decimals: HashMap<String, u8> = if decimals.is_undefined() || decimals.is_null() {
            HashMap::new()
        } else {
            serde_wasm_bindgen::from_value(decimals)
                .map_err(|e| JsValue::from_str(&format!("Invalid decimals map: {:?}", e)))?
        };
        balances_to_js(&self.balance_list(&decimals))
    }

    /// Net raw token change a transaction causes for the wallet, as a
    /// decimal string.
    #[wasm_bindgen(js_name = rawValue)]
    pub fn raw_value(&self, tx_hex: &str) -> Result<String, JsValue> {
        self.value_of(tx_hex)
            .map(|value| value.to_string())
            .map_err(|e| JsValue::from_str(&e))
    }

    /// Number of transactions added.
    #[wasm_bindgen(getter, js_name = transactionCount)]
    pub fn transaction_count(&self) -> u32 {
        self.transaction_count
    }

    #[wasm_bindgen(getter)]
    pub fn network(&self) -> String {
        self.network.name().to_string()
    }

    /// Forget all transactions, outputs and watched addresses.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.wallet = MemoryWallet::new();
        self.outpoints.clear();
        self.transaction_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slp_core::script::p2pkh_script;
    use slp_core::slp::{genesis_script, send_script, GenesisParams};
    use slp_core::transaction::{TxIn, TxOut};

    const WATCHED: &str = "bchtest:qpm2qsznhks23z7629mms6s4cwef74vcwvqcw003ap";

    fn tx(previous_output: OutPoint, scripts: Vec<Vec<u8>>) -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![TxIn { previous_output, script_sig: vec![], sequence: 0xffff_ffff }],
            outputs: scripts.into_iter().map(|script_pubkey| TxOut { value: 546, script_pubkey }).collect(),
            lock_time: 0,
        }
    }

    fn to_hex(tx: &Transaction) -> String {
        hex::encode(tx.serialize())
    }

    #[test]
    fn test_scanner_balances() {
        let mine = p2pkh_script(&hex::decode("76a04053bda0a88bda5177b86a15c3b29f559873").unwrap());
        let other = p2pkh_script(&[7u8; 20]);

        let genesis = tx(
            OutPoint::new([9u8; 32], 0),
            vec![
                genesis_script(&GenesisParams { ticker: "SCN".into(), decimals: 3, initial_quantity: 10, ..Default::default() })
                    .unwrap(),
                mine.clone(),
            ],
        );
        let token_id = genesis.txid_hex();
        let send = tx(genesis.outpoint(1), vec![send_script(&token_id, &[4_000, 6_000]).unwrap(), other, mine]);

        let mut scanner = TokenScanner::create("testnet4").unwrap();
        scanner.watch(WATCHED).unwrap();
        assert_eq!(scanner.add_tx(&to_hex(&genesis)).unwrap(), token_id);
        scanner.add_tx(&to_hex(&send)).unwrap();
        assert_eq!(scanner.transaction_count, 2);

        let decimals: HashMap<String, u8> = [(token_id.clone(), 3)].into_iter().collect();
        let balances = scanner.balance_list(&decimals);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].raw, "6000");
        assert_eq!(balances[0].display, "6.000");

        assert_eq!(scanner.value_of(&to_hex(&send)).unwrap(), -4_000);

        // Declared outputs replace the derived set.
        scanner.add_outpoint(&token_id, 1).unwrap();
        assert_eq!(scanner.balance_list(&decimals)[0].raw, "10000");
    }

    #[test]
    fn test_classification_info() {
        let plain = tx(OutPoint::new([1u8; 32], 0), vec![p2pkh_script(&[2u8; 20])]);
        let info = classification_info(&to_hex(&plain)).unwrap();
        assert_eq!(info.kind, "not_slp");
        assert_eq!(info.txid, plain.txid_hex());
        assert!(classification_info("zz").is_err());
    }

    #[test]
    fn test_scanner_rejects_bad_input() {
        assert!(TokenScanner::create("nonsense").is_err());
        let mut scanner = TokenScanner::create("mainnet").unwrap();
        assert!(scanner.watch(WATCHED).is_err());
        assert!(scanner.add_outpoint("1234", 0).is_err());
    }
}
