//! Compact target conversion and proof-of-work arithmetic.
//!
//! The compact "bits" format is `[exponent (1 byte)][mantissa (3 bytes)]`
//! with `target = mantissa * 256^(exponent - 3)`. Bit 23 of the mantissa is a
//! sign flag, so a mantissa with its top bit set is shifted into the next
//! exponent when encoding.

use primitive_types::U256;
use thiserror::Error;

/// Compact target decoding errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompactError {
    #[error("compact target {0:#010x} is negative")]
    Negative(u32),
    #[error("compact target {0:#010x} overflows 256 bits")]
    Overflow(u32),
}

/// Decode a compact target.
pub fn decode_compact(bits: u32) -> Result<U256, CompactError> {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;

    if word != 0 && bits & 0x0080_0000 != 0 {
        return Err(CompactError::Negative(bits));
    }
    if word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)) {
        return Err(CompactError::Overflow(bits));
    }

    if size <= 3 {
        word >>= 8 * (3 - size);
        Ok(U256::from(word))
    } else {
        Ok(U256::from(word) << (8 * (size - 3)) as usize)
    }
}

/// Encode a target in compact form.
///
/// Precision beyond the top three significant bytes is discarded.
pub fn encode_compact(target: U256) -> u32 {
    let mut size = ((target.bits() + 7) / 8) as u32;
    let mut compact = if size <= 3 {
        target.low_u32() << (8 * (3 - size))
    } else {
        (target >> (8 * (size - 3)) as usize).low_u32()
    };

    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Check whether a hash (internal byte order) is at or below the target.
#[inline]
pub fn hash_meets_target(hash: &[u8; 32], target: &U256) -> bool {
    U256::from_little_endian(hash) <= *target
}

/// Expected number of hashes needed to meet the target: `2^256 / (target + 1)`.
///
/// Returns zero for an invalid or zero target.
pub fn block_proof(bits: u32) -> U256 {
    let target = match decode_compact(bits) {
        Ok(target) if !target.is_zero() => target,
        _ => return U256::zero(),
    };
    // 2^256 / (t + 1) == (~t / (t + 1)) + 1, which stays inside 256 bits.
    match target.checked_add(U256::one()) {
        Some(divisor) => (!target / divisor) + U256::one(),
        None => U256::one(),
    }
}
