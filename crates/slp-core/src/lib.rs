//! Wallet core for Bitcoin Cash SLP tokens.
//!
//! This crate provides pure Rust implementations of:
//! - CashAddr and SLP address encoding over a shared checksum codec
//! - Legacy Base58Check addresses and cross-format conversion
//! - SLP OP_RETURN classification, parsing and building
//! - ASERT (aserti3-2d) difficulty retargeting against a block store
//! - Wallet-side token balance accounting

pub mod address;
pub mod asert;
pub mod bech32;
pub mod cashaddr;
pub mod chain;
pub mod difficulty;
pub mod hash;
pub mod network;
pub mod script;
pub mod slp;
pub mod transaction;
pub mod wallet;

pub use address::{Address, AddressError, AddressType};
pub use asert::{check_difficulty, compute_asert_target, next_work_required, DifficultyCheck, RetargetError};
pub use cashaddr::AddressFormat;
pub use chain::{AncestorSource, BlockHeader, MemoryChain, StoreError, StoredBlock};
pub use difficulty::{decode_compact, encode_compact, CompactError};
pub use network::{AsertAnchor, Network, NetworkParams, ParamsError};
pub use slp::{classify, SlpClassification, SlpMalformed, SlpTransaction, SlpTxType, SlpUtxo};
pub use transaction::{OutPoint, Transaction, TxError};
pub use wallet::{token_balances, MemoryWallet, TokenBalance, TokenMetadata, WalletView};
