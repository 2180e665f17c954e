//! Bech32-style base32 alphabet, bit regrouping and the 40-bit CashAddr
//! polymod checksum.
//!
//! These primitives are shared by the CashAddr and SLP address families; the
//! only thing that differs between the two is the prefix fed into the
//! checksum.

use crate::address::AddressError;

/// Base32 alphabet used by CashAddr-style addresses.
pub const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Number of 5-bit checksum symbols appended to every payload.
pub const CHECKSUM_LEN: usize = 8;

const GENERATORS: [u64; 5] = [
    0x98_f2bc_8e61,
    0x79_b76d_99e2,
    0xf3_3e5f_b3c4,
    0xae_2eab_e2a8,
    0x1e_4f43_e470,
];

/// Regroup a stream of `from_bits`-wide symbols into `to_bits`-wide symbols,
/// most significant bit first.
///
/// With `pad == false` any leftover bits must be fewer than `from_bits` and
/// all zero, otherwise the input is rejected.
pub fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Result<Vec<u8>, AddressError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut result = Vec::with_capacity(data.len() * from_bits as usize / to_bits as usize + 1);
    let max_value = (1u32 << to_bits) - 1;
    let max_acc = (1u32 << (from_bits + to_bits - 1)) - 1;

    for &value in data {
        let value = value as u32;
        if value >> from_bits != 0 {
            return Err(AddressError::InvalidSymbol(value as u8));
        }
        acc = ((acc << from_bits) | value) & max_acc;
        bits += from_bits;

        while bits >= to_bits {
            bits -= to_bits;
            result.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            result.push(((acc << (to_bits - bits)) & max_value) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & max_value) != 0 {
        return Err(AddressError::InvalidPadding);
    }

    Ok(result)
}

/// Expand a prefix into checksum input: the low five bits of every
/// lowercased character followed by a zero separator.
pub fn prefix_expand(prefix: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(prefix.len() + 1);
    for b in prefix.bytes() {
        result.push(b.to_ascii_lowercase() & 0x1f);
    }
    result.push(0);
    result
}

/// BCH code checksum over 5-bit values.
///
/// A valid address (prefix, payload and checksum together) evaluates to zero.
pub fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;

    for &d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ (d as u64);
        for (i, &g) in GENERATORS.iter().enumerate() {
            if (c0 >> i) & 1 == 1 {
                c ^= g;
            }
        }
    }

    c ^ 1
}

/// Compute the eight checksum symbols for `payload` under `prefix`.
pub fn create_checksum(prefix: &str, payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut values = prefix_expand(prefix);
    values.extend_from_slice(payload);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let modulus = polymod(&values);

    let mut checksum = [0u8; CHECKSUM_LEN];
    for (i, symbol) in checksum.iter_mut().enumerate() {
        *symbol = ((modulus >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f) as u8;
    }
    checksum
}

/// Check that `data` (payload followed by its checksum) is valid under `prefix`.
pub fn verify_checksum(prefix: &str, data: &[u8]) -> bool {
    let mut values = prefix_expand(prefix);
    values.extend_from_slice(data);
    polymod(&values) == 0
}

/// Render 5-bit values with the base32 alphabet.
pub fn encode_base32(values: &[u8]) -> String {
    values.iter().map(|&v| CHARSET[(v & 0x1f) as usize] as char).collect()
}

/// Map base32 characters back to 5-bit values.
///
/// Only the lowercase alphabet is accepted.
pub fn decode_base32(text: &str) -> Result<Vec<u8>, AddressError> {
    text.chars()
        .map(|c| {
            CHARSET
                .iter()
                .position(|&x| x as char == c)
                .map(|idx| idx as u8)
                .ok_or(AddressError::InvalidChar(c))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_bits_8_to_5_and_back() {
        let bytes = [0x00, 0xf5, 0xbf, 0x48];
        let five = convert_bits(&bytes, 8, 5, true).unwrap();
        assert_eq!(five.len(), 7);
        assert!(five.iter().all(|&v| v < 32));

        let back = convert_bits(&five, 5, 8, false).unwrap();
        assert_eq!(back, bytes);
    }

    #[test]
    fn test_convert_bits_rejects_nonzero_padding() {
        // 0b00001 in the last symbol leaves a set bit in the discarded tail
        let five = [0u8, 0, 0, 0, 0, 0, 1];
        assert!(matches!(convert_bits(&five, 5, 8, false), Err(AddressError::InvalidPadding)));
    }

    #[test]
    fn test_convert_bits_rejects_oversized_symbol() {
        assert!(matches!(convert_bits(&[32], 5, 8, true), Err(AddressError::InvalidSymbol(32))));
    }

    #[test]
    fn test_prefix_expand() {
        assert_eq!(prefix_expand("ab"), vec![1, 2, 0]);
        assert_eq!(prefix_expand("AB"), vec![1, 2, 0]);
    }

    #[test]
    fn test_checksum_roundtrip() {
        let payload = convert_bits(&[0x08, 1, 2, 3], 8, 5, true).unwrap();
        let checksum = create_checksum("bitcoincash", &payload);

        let mut data = payload.clone();
        data.extend_from_slice(&checksum);
        assert!(verify_checksum("bitcoincash", &data));
        assert!(verify_checksum("BITCOINCASH", &data));
        assert!(!verify_checksum("simpleledger", &data));
    }

    #[test]
    fn test_base32_alphabet() {
        let values: Vec<u8> = (0..32).collect();
        let text = encode_base32(&values);
        assert_eq!(text.as_bytes(), CHARSET);
        assert_eq!(decode_base32(&text).unwrap(), values);
        assert!(matches!(decode_base32("qb"), Err(AddressError::InvalidChar('b'))));
        assert!(matches!(decode_base32("Q"), Err(AddressError::InvalidChar('Q'))));
    }
}
