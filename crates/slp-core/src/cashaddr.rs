//! CashAddr-style address codec, shared by the `bitcoincash:` and
//! `simpleledger:` address families.
//!
//! The version byte packs the address type into bits 3-6 and a size class
//! into bits 0-2; bit 7 is reserved and must be zero.

use serde::{Deserialize, Serialize};

use crate::address::{AddressError, AddressType};
use crate::bech32::{self, CHECKSUM_LEN};
use crate::network::NetworkParams;

/// Hash lengths selectable by the three size bits of the version byte.
pub const HASH_SIZES: [usize; 8] = [20, 24, 28, 32, 40, 48, 56, 64];

const RESERVED_BIT: u8 = 0x80;

/// Which family of prefixes an address is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    /// `bitcoincash:` / `bchtest:` / `bchreg:`
    Cash,
    /// `simpleledger:` / `slptest:` / `slpreg:`
    Slp,
}

impl AddressFormat {
    /// The prefix this family uses on the given network.
    pub fn prefix<'a>(&self, params: &'a NetworkParams) -> &'a str {
        match self {
            AddressFormat::Cash => &params.cashaddr_prefix,
            AddressFormat::Slp => &params.slp_prefix,
        }
    }

    /// Address types this family will decode.
    pub fn accepted_types(&self) -> &'static [AddressType] {
        match self {
            AddressFormat::Cash => &[AddressType::P2PKH, AddressType::P2SH],
            AddressFormat::Slp => &[AddressType::P2PKH, AddressType::P2SH],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AddressFormat::Cash => "cashaddr",
            AddressFormat::Slp => "slp",
        }
    }
}

/// Hash length encoded by a version byte.
pub fn hash_size(version_byte: u8) -> usize {
    let mut size = 20 + 4 * (version_byte & 0x03) as usize;
    if version_byte & 0x04 != 0 {
        size *= 2;
    }
    size
}

/// Build the version byte for an address type and hash length.
pub fn version_byte(address_type: AddressType, hash_len: usize) -> Result<u8, AddressError> {
    let size_code = HASH_SIZES
        .iter()
        .position(|&size| size == hash_len)
        .ok_or(AddressError::InvalidHashLength(hash_len))?;
    Ok((address_type.type_bits() << 3) | size_code as u8)
}

/// Address type encoded by a version byte.
pub fn address_type(version_byte: u8) -> Result<AddressType, AddressError> {
    AddressType::from_type_bits((version_byte >> 3) & 0x0f)
        .ok_or(AddressError::UnknownType(version_byte))
}

/// Encode `version_byte ‖ hash` as `prefix:payload`.
pub fn encode(prefix: &str, version_byte: u8, hash: &[u8]) -> Result<String, AddressError> {
    if version_byte & RESERVED_BIT != 0 {
        return Err(AddressError::ReservedVersionBit(version_byte));
    }
    let expected = hash_size(version_byte);
    if hash.len() != expected {
        return Err(AddressError::LengthMismatch { expected, found: hash.len() });
    }
    Ok(encode_unchecked(prefix, version_byte, hash))
}

/// Encode without validating the version byte against the hash length.
pub(crate) fn encode_unchecked(prefix: &str, version_byte: u8, hash: &[u8]) -> String {
    let prefix = prefix.to_lowercase();

    let mut bytes = Vec::with_capacity(1 + hash.len());
    bytes.push(version_byte);
    bytes.extend_from_slice(hash);

    // Padding enabled: regrouping 8-bit input into 5-bit output cannot fail.
    let mut payload = bech32::convert_bits(&bytes, 8, 5, true).unwrap_or_default();
    let checksum = bech32::create_checksum(&prefix, &payload);
    payload.extend_from_slice(&checksum);

    let mut out = String::with_capacity(prefix.len() + 1 + payload.len());
    out.push_str(&prefix);
    out.push(':');
    out.push_str(&bech32::encode_base32(&payload));
    out
}

/// Split an address into its explicit prefix (if any) and payload text.
pub fn split_prefix(text: &str) -> (Option<&str>, &str) {
    match text.split_once(':') {
        Some((prefix, payload)) => (Some(prefix), payload),
        None => (None, text),
    }
}

/// Decode an address expected to carry `expected_prefix`.
///
/// The prefix may be omitted, in which case `expected_prefix` is used for the
/// checksum. Prefix comparison ignores case; the payload must be lowercase.
pub fn decode(expected_prefix: &str, text: &str) -> Result<(u8, Vec<u8>), AddressError> {
    let text = text.trim();
    let (given, payload_text) = split_prefix(text);

    let prefix = match given {
        Some(prefix) => {
            if !prefix.eq_ignore_ascii_case(expected_prefix) {
                return Err(AddressError::WrongNetwork {
                    expected: expected_prefix.to_lowercase(),
                    found: prefix.to_lowercase(),
                });
            }
            prefix.to_lowercase()
        }
        None => expected_prefix.to_lowercase(),
    };

    if payload_text.is_empty() {
        return Err(AddressError::EmptyPayload);
    }

    let data = bech32::decode_base32(payload_text)?;
    if data.len() <= CHECKSUM_LEN {
        return Err(AddressError::EmptyPayload);
    }
    if !bech32::verify_checksum(&prefix, &data) {
        return Err(AddressError::InvalidChecksum);
    }

    let values = &data[..data.len() - CHECKSUM_LEN];
    let bytes = bech32::convert_bits(values, 5, 8, false)?;
    let (&version, hash) = bytes.split_first().ok_or(AddressError::EmptyPayload)?;

    if version & RESERVED_BIT != 0 {
        return Err(AddressError::ReservedVersionBit(version));
    }
    let expected = hash_size(version);
    if hash.len() != expected {
        return Err(AddressError::LengthMismatch { expected, found: hash.len() });
    }

    Ok((version, hash.to_vec()))
}

/// Decode an address of the given family and resolve its type.
pub fn decode_typed(
    format: AddressFormat,
    params: &NetworkParams,
    text: &str,
) -> Result<(AddressType, Vec<u8>), AddressError> {
    let (version, hash) = decode(format.prefix(params), text)?;
    let address_type = address_type(version)?;
    if !format.accepted_types().contains(&address_type) {
        return Err(AddressError::UnknownType(version));
    }
    Ok((address_type, hash))
}

/// Encode a typed hash in the given family.
pub fn encode_typed(
    format: AddressFormat,
    params: &NetworkParams,
    address_type: AddressType,
    hash: &[u8],
) -> Result<String, AddressError> {
    let version = version_byte(address_type, hash.len())?;
    Ok(encode_unchecked(format.prefix(params), version, hash))
}
