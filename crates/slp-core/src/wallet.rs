//! Wallet-side token accounting.
//!
//! The wallet itself (key ownership, transaction storage) and token metadata
//! are supplied by the caller through [`WalletView`] and [`TokenMetadata`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::slp::{classify, SlpClassification};
use crate::transaction::{OutPoint, Transaction};

/// Source of token decimals, typically an indexer.
pub trait TokenMetadata {
    fn decimals(&self, token_id: &str) -> Option<u8>;
}

impl TokenMetadata for HashMap<String, u8> {
    fn decimals(&self, token_id: &str) -> Option<u8> {
        self.get(token_id).copied()
    }
}

/// What the accounting needs to know about a wallet.
pub trait WalletView {
    /// Whether an output script belongs to the wallet.
    fn is_mine(&self, script_pubkey: &[u8]) -> bool;

    /// A transaction the wallet knows about, by txid (internal byte order).
    fn transaction(&self, txid: &[u8; 32]) -> Option<&Transaction>;
}

/// A wallet held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWallet {
    scripts: HashSet<Vec<u8>>,
    transactions: HashMap<[u8; 32], Transaction>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an output script as owned.
    pub fn add_script(&mut self, script_pubkey: Vec<u8>) {
        self.scripts.insert(script_pubkey);
    }

    /// Store a transaction, returning its txid.
    pub fn add_transaction(&mut self, tx: Transaction) -> [u8; 32] {
        let txid = tx.txid();
        self.transactions.insert(txid, tx);
        txid
    }

    /// Outputs of stored transactions that pay to owned scripts and are not
    /// spent by another stored transaction.
    pub fn unspent(&self) -> Vec<OutPoint> {
        let spent: HashSet<OutPoint> = self
            .transactions
            .values()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.previous_output))
            .collect();

        let mut unspent: Vec<OutPoint> = self
            .transactions
            .iter()
            .flat_map(|(txid, tx)| {
                tx.outputs
                    .iter()
                    .enumerate()
                    .filter(|(_, output)| self.is_mine(&output.script_pubkey))
                    .map(move |(vout, _)| OutPoint::new(*txid, vout as u32))
            })
            .filter(|outpoint| !spent.contains(outpoint))
            .collect();
        unspent.sort();
        unspent
    }
}

impl WalletView for MemoryWallet {
    fn is_mine(&self, script_pubkey: &[u8]) -> bool {
        self.scripts.contains(script_pubkey)
    }

    fn transaction(&self, txid: &[u8; 32]) -> Option<&Transaction> {
        self.transactions.get(txid)
    }
}

/// Aggregated holdings of one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_id: String,
    /// Sum of raw amounts.
    pub raw: u128,
    /// `None` when the metadata source does not know the token.
    pub decimals: Option<u8>,
    /// Number of token-carrying outputs counted.
    pub utxo_count: usize,
    pub mint_batons: usize,
}

impl TokenBalance {
    fn new(token_id: &str, decimals: Option<u8>) -> Self {
        TokenBalance { token_id: token_id.to_string(), raw: 0, decimals, utxo_count: 0, mint_batons: 0 }
    }

    /// Approximate human-scale balance. Unknown decimals count as zero.
    pub fn as_f64(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.decimals.unwrap_or(0) as i32)
    }
}

/// Exact decimal rendering, e.g. `12345` with two decimals is `123.45`.
impl fmt::Display for TokenBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimals = self.decimals.unwrap_or(0) as usize;
        if decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        let digits = format!("{:0>width$}", self.raw, width = decimals + 1);
        let (whole, frac) = digits.split_at(digits.len() - decimals);
        write!(f, "{}.{}", whole, frac)
    }
}

/// Per-token balances of the wallet outputs in `utxos`.
///
/// Outputs whose parent is unknown, not SLP, or malformed contribute nothing.
pub fn token_balances<W, M>(utxos: &[OutPoint], wallet: &W, metadata: &M) -> BTreeMap<String, TokenBalance>
where
    W: WalletView + ?Sized,
    M: TokenMetadata + ?Sized,
{
    let mut classified: HashMap<[u8; 32], SlpClassification> = HashMap::new();
    let mut balances: BTreeMap<String, TokenBalance> = BTreeMap::new();

    for outpoint in utxos {
        let Some(parent) = wallet.transaction(&outpoint.txid) else {
            warn!("parent {} of wallet output is unknown, skipping", outpoint.txid_hex());
            continue;
        };

        let classification = classified.entry(outpoint.txid).or_insert_with(|| classify(parent));
        let slp = match classification {
            SlpClassification::Slp(slp) => slp,
            SlpClassification::Malformed(reason) => {
                warn!("skipping output of malformed SLP transaction {}: {}", outpoint.txid_hex(), reason);
                continue;
            }
            SlpClassification::NotSlp => continue,
        };

        let amount = slp.amount_at(outpoint.vout);
        let is_baton = slp.mint_baton_vout == Some(outpoint.vout);
        if amount == 0 && !is_baton {
            continue;
        }

        let balance = balances.entry(slp.token_id.clone()).or_insert_with(|| {
            let decimals = metadata.decimals(&slp.token_id);
            if decimals.is_none() {
                warn!("decimals unknown for token {}", slp.token_id);
            }
            TokenBalance::new(&slp.token_id, decimals)
        });
        balance.raw += amount as u128;
        if amount > 0 {
            balance.utxo_count += 1;
        }
        if is_baton {
            balance.mint_batons += 1;
        }
    }

    debug!("computed balances for {} tokens over {} outputs", balances.len(), utxos.len());
    balances
}

/// Raw tokens `tx` assigns to outputs owned by the wallet.
pub fn raw_tokens_sent_to_me<W: WalletView + ?Sized>(tx: &Transaction, wallet: &W) -> u128 {
    let SlpClassification::Slp(slp) = classify(tx) else {
        return 0;
    };

    slp.amounts
        .iter()
        .enumerate()
        .filter(|(i, _)| tx.outputs.get(i + 1).is_some_and(|output| wallet.is_mine(&output.script_pubkey)))
        .map(|(_, &amount)| amount as u128)
        .sum()
}

/// Raw tokens of the same token id that `tx` spends from outputs owned by
/// the wallet.
pub fn raw_tokens_sent_from_me<W: WalletView + ?Sized>(tx: &Transaction, wallet: &W) -> u128 {
    let SlpClassification::Slp(slp) = classify(tx) else {
        return 0;
    };

    let mut total = 0u128;
    for input in &tx.inputs {
        let prev = input.previous_output;
        let Some(parent) = wallet.transaction(&prev.txid) else {
            continue;
        };
        let Some(connected) = parent.outputs.get(prev.vout as usize) else {
            continue;
        };
        if !wallet.is_mine(&connected.script_pubkey) {
            continue;
        }
        if let SlpClassification::Slp(parent_slp) = classify(parent) {
            if parent_slp.token_id == slp.token_id {
                total += parent_slp.amount_at(prev.vout) as u128;
            }
        }
    }
    total
}

/// Net raw token change `tx` causes for the wallet.
pub fn raw_value<W: WalletView + ?Sized>(tx: &Transaction, wallet: &W) -> i128 {
    raw_tokens_sent_to_me(tx, wallet) as i128 - raw_tokens_sent_from_me(tx, wallet) as i128
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::p2pkh_script;
    use crate::slp::{genesis_script, send_script, GenesisParams};
    use crate::transaction::{TxIn, TxOut};

    fn mine() -> Vec<u8> {
        p2pkh_script(&[0x01; 20])
    }

    fn theirs() -> Vec<u8> {
        p2pkh_script(&[0x02; 20])
    }

    fn tx(inputs: Vec<OutPoint>, outputs: Vec<Vec<u8>>) -> Transaction {
        Transaction {
            version: 2,
            inputs: inputs
                .into_iter()
                .map(|previous_output| TxIn { previous_output, script_sig: vec![], sequence: 0xffff_ffff })
                .collect(),
            outputs: outputs.into_iter().map(|script_pubkey| TxOut { value: 546, script_pubkey }).collect(),
            lock_time: 0,
        }
    }

    /// A GENESIS of 1000.00 tokens paid to the wallet, baton included,
    /// then a SEND of 250.00 to someone else with 750.00 change.
    fn scenario() -> (MemoryWallet, Transaction, Transaction) {
        let mut wallet = MemoryWallet::new();
        wallet.add_script(mine());

        let genesis = tx(
            vec![OutPoint::new([0xee; 32], 0)],
            vec![
                genesis_script(&GenesisParams {
                    ticker: "TT".into(),
                    decimals: 2,
                    initial_quantity: 1000,
                    mint_baton_vout: Some(2),
                    ..Default::default()
                })
                .unwrap(),
                mine(),
                mine(),
            ],
        );
        let token_id = genesis.txid_hex();
        let genesis_txid = wallet.add_transaction(genesis.clone());

        let send = tx(
            vec![OutPoint::new(genesis_txid, 1)],
            vec![send_script(&token_id, &[25_000, 75_000]).unwrap(), theirs(), mine()],
        );
        wallet.add_transaction(send.clone());
        (wallet, genesis, send)
    }

    #[test]
    fn test_balances_after_send() {
        let (wallet, genesis, send) = scenario();
        let token_id = genesis.txid_hex();
        let metadata: HashMap<String, u8> = [(token_id.clone(), 2)].into_iter().collect();

        let utxos = wallet.unspent();
        assert_eq!(utxos.len(), 2);

        let balances = token_balances(&utxos, &wallet, &metadata);
        let balance = &balances[&token_id];
        assert_eq!(balance.raw, 75_000);
        assert_eq!(balance.utxo_count, 1);
        assert_eq!(balance.mint_batons, 1);
        assert_eq!(balance.to_string(), "750.00");
        assert!((balance.as_f64() - 750.0).abs() < 1e-9);

        assert_eq!(raw_tokens_sent_to_me(&send, &wallet), 75_000);
        assert_eq!(raw_tokens_sent_from_me(&send, &wallet), 100_000);
        assert_eq!(raw_value(&send, &wallet), -25_000);
        assert_eq!(raw_value(&genesis, &wallet), 100_000);
    }

    #[test]
    fn test_unknown_decimals_and_foreign_outputs() {
        let (wallet, genesis, _) = scenario();
        let metadata: HashMap<String, u8> = HashMap::new();

        let unknown = OutPoint::new([0x99; 32], 0);
        let plain = OutPoint::new(genesis.txid(), 0);
        let mut utxos = wallet.unspent();
        utxos.push(unknown);
        utxos.push(plain);

        let balances = token_balances(&utxos, &wallet, &metadata);
        assert_eq!(balances.len(), 1);
        let balance = balances.values().next().unwrap();
        assert_eq!(balance.decimals, None);
        assert_eq!(balance.to_string(), "75000");
    }

    #[test]
    fn test_malformed_parent_is_skipped() {
        let mut wallet = MemoryWallet::new();
        wallet.add_script(mine());

        let mut script = send_script(&"ab".repeat(32), &[5]).unwrap();
        script.truncate(script.len() - 1);
        let bad = tx(vec![OutPoint::new([1; 32], 0)], vec![script, mine()]);
        let txid = wallet.add_transaction(bad);

        let balances = token_balances(&[OutPoint::new(txid, 1)], &wallet, &HashMap::new());
        assert!(balances.is_empty());
    }

    #[test]
    fn test_balance_display() {
        let balance = |raw: u128, decimals: Option<u8>| TokenBalance {
            token_id: String::new(),
            raw,
            decimals,
            utxo_count: 1,
            mint_batons: 0,
        };
        assert_eq!(balance(12_345, Some(2)).to_string(), "123.45");
        assert_eq!(balance(5, Some(3)).to_string(), "0.005");
        assert_eq!(balance(0, Some(9)).to_string(), "0.000000000");
        assert_eq!(balance(42, Some(0)).to_string(), "42");
        assert_eq!(balance(u64::MAX as u128 * 3, Some(9)).to_string(), "55340232221.128654845");
    }
}
