//! Address decoding, conversion and scriptPubKey generation.
//!
//! Supports:
//! - CashAddr (`bitcoincash:` / `bchtest:` / `bchreg:`)
//! - SLP addresses (`simpleledger:` / `slptest:` / `slpreg:`)
//! - Legacy Base58Check addresses (`1...`/`3...` on mainnet, `m`/`n`/`2` on test networks)
//!
//! All three encode the same `(type, hash)` pair, so conversion between them
//! never changes the hash.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bech32;
use crate::cashaddr::{self, AddressFormat};
use crate::hash::double_sha256;
use crate::network::{Network, NetworkParams};
use crate::script::{is_p2pkh, is_p2sh, p2pkh_script, p2sh_script};

/// Address decoding errors.
///
/// Everything except [`AddressError::WrongNetwork`] is a format error: the
/// text is not a well-formed address at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid character {0:?} in address payload")]
    InvalidChar(char),
    #[error("symbol {0} out of range for bit regrouping")]
    InvalidSymbol(u8),
    #[error("non-zero padding bits in address payload")]
    InvalidPadding,
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("empty address payload")]
    EmptyPayload,
    #[error("reserved bit set in version byte {0:#04x}")]
    ReservedVersionBit(u8),
    #[error("version byte expects a {expected}-byte hash, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("unsupported hash length {0}")]
    InvalidHashLength(usize),
    #[error("unknown address type in version byte {0:#04x}")]
    UnknownType(u8),
    #[error("invalid Base58 character {0:?}")]
    InvalidBase58Char(char),
    #[error("unknown legacy version byte {0:#04x}")]
    InvalidLegacyVersion(u8),
    #[error("legacy addresses carry 20-byte hashes, found {0}")]
    UnsupportedLegacyLength(usize),
    #[error("script is neither P2PKH nor P2SH")]
    UnrecognizedScript,
    #[error("address belongs to {found}, expected {expected}")]
    WrongNetwork { expected: String, found: String },
}

impl AddressError {
    /// True for malformed encodings, false when the address is well-formed
    /// but belongs to another network.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, AddressError::WrongNetwork { .. })
    }
}

/// Address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressType {
    /// OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
    P2PKH,
    /// OP_HASH160 <hash> OP_EQUAL
    P2SH,
}

impl AddressType {
    /// Get the display name for this address type.
    pub fn name(&self) -> &'static str {
        match self {
            AddressType::P2PKH => "P2PKH",
            AddressType::P2SH => "P2SH",
        }
    }

    /// The type field of a CashAddr version byte (bits 3-6).
    pub fn type_bits(&self) -> u8 {
        match self {
            AddressType::P2PKH => 0,
            AddressType::P2SH => 1,
        }
    }

    pub fn from_type_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(AddressType::P2PKH),
            1 => Some(AddressType::P2SH),
            _ => None,
        }
    }
}

/// Prefixes and legacy version bytes an address renders with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Encoding {
    cashaddr_prefix: String,
    slp_prefix: String,
    p2pkh_version: u8,
    p2sh_version: u8,
}

impl Encoding {
    fn from_params(params: &NetworkParams) -> Self {
        Encoding {
            cashaddr_prefix: params.cashaddr_prefix.clone(),
            slp_prefix: params.slp_prefix.clone(),
            p2pkh_version: params.p2pkh_version,
            p2sh_version: params.p2sh_version,
        }
    }
}

/// A decoded address: network, type and hash.
///
/// The hash length is always one of [`HASH_SIZES`](crate::cashaddr::HASH_SIZES).
/// An address remembers the prefixes and version bytes of the parameters it
/// was built with, so rendering it never falls back to the built-in table of
/// a custom network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    network: Network,
    address_type: AddressType,
    hash: Vec<u8>,
    version_byte: u8,
    encoding: Encoding,
}

impl Address {
    /// Build an address from its parts using the built-in network table.
    pub fn from_hash(network: Network, address_type: AddressType, hash: &[u8]) -> Result<Self, AddressError> {
        Self::from_hash_with(&network.params(), address_type, hash)
    }

    /// Build an address from its parts for explicit network parameters.
    pub fn from_hash_with(
        params: &NetworkParams,
        address_type: AddressType,
        hash: &[u8],
    ) -> Result<Self, AddressError> {
        let version_byte = cashaddr::version_byte(address_type, hash.len())?;
        Ok(Address {
            network: params.network,
            address_type,
            hash: hash.to_vec(),
            version_byte,
            encoding: Encoding::from_params(params),
        })
    }

    /// Decode a CashAddr address for the given network.
    pub fn from_cash_address(text: &str, params: &NetworkParams) -> Result<Self, AddressError> {
        Self::decode(AddressFormat::Cash, text, params)
    }

    /// Decode an SLP address for the given network.
    pub fn from_slp_address(text: &str, params: &NetworkParams) -> Result<Self, AddressError> {
        Self::decode(AddressFormat::Slp, text, params)
    }

    /// Decode a prefixed-family address.
    pub fn decode(format: AddressFormat, text: &str, params: &NetworkParams) -> Result<Self, AddressError> {
        let (address_type, hash) = cashaddr::decode_typed(format, params, text)?;
        Self::from_hash_with(params, address_type, &hash)
    }

    /// Decode a legacy Base58Check address for the given network.
    pub fn from_legacy(text: &str, params: &NetworkParams) -> Result<Self, AddressError> {
        let payload = base58check_decode(text.trim())?;
        let (&version, hash) = payload.split_first().ok_or(AddressError::EmptyPayload)?;

        let address_type = if version == params.p2pkh_version {
            AddressType::P2PKH
        } else if version == params.p2sh_version {
            AddressType::P2SH
        } else if let Some(other) = Network::ALL
            .into_iter()
            .find(|n| n.p2pkh_version() == version || n.p2sh_version() == version)
        {
            return Err(AddressError::WrongNetwork {
                expected: params.network.name().to_string(),
                found: other.name().to_string(),
            });
        } else {
            return Err(AddressError::InvalidLegacyVersion(version));
        };

        if hash.len() != 20 {
            return Err(AddressError::UnsupportedLegacyLength(hash.len()));
        }

        Self::from_hash_with(params, address_type, hash)
    }

    /// Decode an address in any of the three formats.
    ///
    /// A prefixed address is routed by its prefix; an unprefixed one is tried
    /// as CashAddr, then SLP, then legacy. When all three fail, text written
    /// entirely in the CashAddr alphabet reports the CashAddr error.
    pub fn parse(text: &str, params: &NetworkParams) -> Result<Self, AddressError> {
        let text = text.trim();
        if let (Some(prefix), _) = cashaddr::split_prefix(text) {
            if prefix.eq_ignore_ascii_case(&params.slp_prefix) {
                return Self::from_slp_address(text, params);
            }
            return Self::from_cash_address(text, params);
        }

        let cash_err = match Self::from_cash_address(text, params) {
            Ok(address) => return Ok(address),
            Err(err) => err,
        };
        if let Ok(address) = Self::from_slp_address(text, params) {
            return Ok(address);
        }
        match Self::from_legacy(text, params) {
            Ok(address) => Ok(address),
            Err(_) if text.bytes().all(|b| bech32::CHARSET.contains(&b)) => Err(cash_err),
            Err(err) => Err(err),
        }
    }

    /// Recognise a P2PKH or P2SH output script.
    pub fn from_script_pubkey(script: &[u8], network: Network) -> Result<Self, AddressError> {
        if is_p2pkh(script) {
            Self::from_hash(network, AddressType::P2PKH, &script[3..23])
        } else if is_p2sh(script) {
            Self::from_hash(network, AddressType::P2SH, &script[2..22])
        } else {
            Err(AddressError::UnrecognizedScript)
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// CashAddr version byte for this address.
    pub fn version_byte(&self) -> u8 {
        self.version_byte
    }

    /// Render in the given family with explicit network parameters.
    pub fn encode(&self, format: AddressFormat, params: &NetworkParams) -> String {
        cashaddr::encode_unchecked(format.prefix(params), self.version_byte, &self.hash)
    }

    /// Render as a CashAddr address.
    pub fn to_cash_address(&self) -> String {
        cashaddr::encode_unchecked(&self.encoding.cashaddr_prefix, self.version_byte, &self.hash)
    }

    /// Render as an SLP address.
    pub fn to_slp_address(&self) -> String {
        cashaddr::encode_unchecked(&self.encoding.slp_prefix, self.version_byte, &self.hash)
    }

    /// Render as a legacy Base58Check address.
    pub fn to_legacy(&self) -> Result<String, AddressError> {
        self.legacy(self.encoding.p2pkh_version, self.encoding.p2sh_version)
    }

    /// Render as a legacy address using explicit network parameters.
    pub fn to_legacy_with(&self, params: &NetworkParams) -> Result<String, AddressError> {
        self.legacy(params.p2pkh_version, params.p2sh_version)
    }

    fn legacy(&self, p2pkh_version: u8, p2sh_version: u8) -> Result<String, AddressError> {
        if self.hash.len() != 20 {
            return Err(AddressError::UnsupportedLegacyLength(self.hash.len()));
        }
        let version = match self.address_type {
            AddressType::P2PKH => p2pkh_version,
            AddressType::P2SH => p2sh_version,
        };
        let mut payload = Vec::with_capacity(21);
        payload.push(version);
        payload.extend_from_slice(&self.hash);
        Ok(base58check_encode(&payload))
    }

    /// The output script paying to this address.
    pub fn script_pubkey(&self) -> Vec<u8> {
        match self.address_type {
            AddressType::P2PKH => p2pkh_script(&self.hash),
            AddressType::P2SH => p2sh_script(&self.hash),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cash_address())
    }
}

// ============================================================================
// Base58 Implementation
// ============================================================================

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn base58_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let mut result: Vec<u8> = Vec::new();

    let leading_zeros = input.chars().take_while(|&c| c == '1').count();

    for c in input.chars() {
        let value = BASE58_ALPHABET
            .iter()
            .position(|&x| x as char == c)
            .ok_or(AddressError::InvalidBase58Char(c))? as u32;

        // result = result * 58 + value, big-endian
        let mut carry = value;
        for byte in result.iter_mut().rev() {
            let temp = (*byte as u32) * 58 + carry;
            *byte = (temp & 0xFF) as u8;
            carry = temp >> 8;
        }
        while carry > 0 {
            result.insert(0, (carry & 0xFF) as u8);
            carry >>= 8;
        }
    }

    let mut decoded = vec![0u8; leading_zeros];
    decoded.extend(result);
    Ok(decoded)
}

fn base58_encode(input: &[u8]) -> String {
    let leading_zeros = input.iter().take_while(|&&b| b == 0).count();

    // Little-endian base-58 digits.
    let mut digits: Vec<u8> = Vec::with_capacity(input.len() * 138 / 100 + 1);
    for &byte in &input[leading_zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            let temp = ((*digit as u32) << 8) + carry;
            *digit = (temp % 58) as u8;
            carry = temp / 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(leading_zeros + digits.len());
    out.extend(core::iter::repeat('1').take(leading_zeros));
    out.extend(digits.iter().rev().map(|&d| BASE58_ALPHABET[d as usize] as char));
    out
}

/// Decode Base58Check text and verify its 4-byte checksum.
pub fn base58check_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let decoded = base58_decode(input)?;
    if decoded.len() < 5 {
        return Err(AddressError::EmptyPayload);
    }

    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    if checksum != &double_sha256(payload)[..4] {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

/// Encode a payload as Base58Check.
pub fn base58check_encode(payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&double_sha256(payload)[..4]);
    base58_encode(&data)
}
