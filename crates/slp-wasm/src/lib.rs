//! WebAssembly bindings for the SLP wallet core.
//!
//! This crate provides JavaScript-accessible APIs for:
//! - Decoding and converting CashAddr, SLP and legacy addresses
//! - Classifying raw transactions as SLP token transactions
//! - Computing ASERT difficulty targets
//! - Scanning a wallet's transactions for token balances

use wasm_bindgen::prelude::*;

pub mod address;
pub mod retarget;
pub mod scanner;
pub mod state;

pub use address::{convert_address, decode_address};
pub use retarget::{asert_next_bits_js, compute_asert_target_js};
pub use scanner::{classify_transaction, TokenScanner};

/// Initialize the WASM module with better panic messages.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
