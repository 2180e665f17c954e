//! ASERT difficulty retargeting (aserti3-2d).
//!
//! Every target is computed from a single anchor block:
//!
//! ```text
//! next = anchor_target * 2^((time_diff - spacing * (height_diff + 1)) / half_life)
//! ```
//!
//! evaluated in 16.16 fixed point with a cubic approximation of the
//! fractional power of two. The anchor is the first block of the unbroken
//! run of blocks on which ASERT is enabled.

use log::{debug, trace, warn};
use primitive_types::{U256, U512};
use thiserror::Error;

use crate::chain::{median_time_past, AncestorSource, BlockHeader, StoreError, StoredBlock};
use crate::difficulty::{decode_compact, encode_compact, CompactError};
use crate::network::{AsertAnchor, NetworkParams};

/// Fractional bits of the fixed-point exponent.
const RADIX_BITS: u32 = 16;
const RADIX: i128 = 1 << RADIX_BITS;

/// Width of the intermediate product.
const WIDE_BITS: usize = 512;

/// Retargeting errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetargetError {
    /// The block store has not seen a block the computation needs yet.
    #[error("insufficient history: block {height} is not in the store")]
    InsufficientHistory { height: u32 },
    /// ASERT does not govern the block after `height`.
    #[error("ASERT is not active after block {height}")]
    NotActivated { height: u32 },
    /// The block claims a target other than the computed one.
    #[error("block {height} has bits {found:#010x}, expected {expected:#010x}")]
    BadDifficultyBits { height: u32, expected: u32, found: u32 },
    /// A compact target in the anchor or the parameters is invalid.
    #[error(transparent)]
    Compact(#[from] CompactError),
    /// The half-life in the network parameters is not positive.
    #[error("ASERT half-life must be positive, got {0}")]
    InvalidHalfLife(i64),
    /// The block store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl RetargetError {
    /// Whether retrying after more blocks are stored can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RetargetError::InsufficientHistory { .. })
    }
}

impl From<StoreError> for RetargetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { height } => RetargetError::InsufficientHistory { height },
            other => RetargetError::Store(other),
        }
    }
}

/// Outcome of checking a block's claimed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyCheck {
    /// The claimed bits match the computed target.
    Valid,
    /// Not enough stored history to decide; retry once `height` is known.
    Deferred { height: u32 },
}

/// Compute the ASERT target for a block.
///
/// `time_diff` is measured from the anchor's parent to the block being built
/// on; `height_diff` from the anchor to that same block. The result never
/// exceeds `pow_limit` and is never zero. A non-positive `half_life` is
/// rejected with [`RetargetError::InvalidHalfLife`].
pub fn compute_asert_target(
    ref_target: U256,
    pow_limit: U256,
    target_spacing: i64,
    half_life: i64,
    time_diff: i64,
    height_diff: i64,
) -> Result<U256, RetargetError> {
    if half_life <= 0 {
        return Err(RetargetError::InvalidHalfLife(half_life));
    }
    let ideal = target_spacing as i128 * (height_diff as i128 + 1);
    let exponent = ((time_diff as i128 - ideal) * RADIX) / half_life as i128;

    // Floor division keeps the fractional part non-negative.
    let shifts = exponent >> RADIX_BITS;
    let frac = (exponent - shifts * RADIX) as u128;

    // 2^x - 1 for x in [0, 1), scaled by 2^16.
    let factor = (195_766_423_245_049u128 * frac
        + 971_821_376u128 * frac * frac
        + 5_127u128 * frac * frac * frac
        + (1u128 << 47))
        >> 48;

    let multiplier = (RADIX as u128 + factor) as u64;
    let product = U512::from(ref_target) * U512::from(multiplier);

    // The multiplier carries 16 fractional bits.
    let next = shift_wide(product, shifts - RADIX_BITS as i128);

    let limit = U512::from(pow_limit);
    let target = if next.is_zero() {
        U256::one()
    } else if next > limit {
        warn!(
            "ASERT target exceeds the proof-of-work limit (time_diff={}, height_diff={}), clamping",
            time_diff, height_diff
        );
        pow_limit
    } else {
        narrow(next)
    };
    Ok(target)
}

/// Shift left for positive `shift`, right for negative.
fn shift_wide(value: U512, shift: i128) -> U512 {
    if shift <= 0 {
        let right = shift.unsigned_abs();
        if right >= WIDE_BITS as u128 {
            U512::zero()
        } else {
            value >> right as usize
        }
    } else if value.is_zero() {
        value
    } else if value.bits() as u128 + shift as u128 > WIDE_BITS as u128 {
        U512::max_value()
    } else {
        value << shift as usize
    }
}

/// Truncate a value already known to fit into 256 bits.
fn narrow(value: U512) -> U256 {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}

/// Compact bits for the block after `(eval_height, eval_time)` relative to
/// `anchor`.
pub fn asert_next_bits(
    params: &NetworkParams,
    anchor: &AsertAnchor,
    eval_height: u32,
    eval_time: i64,
) -> Result<u32, RetargetError> {
    let ref_target = decode_compact(anchor.bits)?;
    let pow_limit = decode_compact(params.pow_limit_bits)?;

    let height_diff = eval_height as i64 - anchor.height as i64;
    let time_diff = eval_time - anchor.prev_block_time;
    let next = compute_asert_target(
        ref_target,
        pow_limit,
        params.target_spacing,
        params.asert_half_life,
        time_diff,
        height_diff,
    )?;
    let bits = encode_compact(next);

    debug!(
        "ASERT next bits {:#010x} (anchor {}, height_diff {}, time_diff {})",
        bits, anchor.height, height_diff, time_diff
    );
    Ok(bits)
}

/// Whether ASERT governs the block after `block`: its median-time-past has
/// reached the activation time.
pub fn is_asert_enabled<S: AncestorSource + ?Sized>(
    params: &NetworkParams,
    source: &S,
    block: &StoredBlock,
) -> Result<bool, RetargetError> {
    Ok(median_time_past(source, block)? >= params.asert_activation_time)
}

/// Whether ASERT governs the block after `prev`, short-circuiting on a fixed
/// anchor.
fn asert_active<S: AncestorSource + ?Sized>(
    params: &NetworkParams,
    source: &S,
    prev: &StoredBlock,
) -> Result<bool, RetargetError> {
    match params.asert_anchor {
        Some(anchor) => Ok(prev.height >= anchor.height),
        None => is_asert_enabled(params, source, prev),
    }
}

/// Locate the anchor for the block after `prev`.
///
/// A fixed anchor in `params` wins; otherwise walk back from `prev` to the
/// earliest block of its unbroken ASERT-enabled run.
pub fn find_anchor<S: AncestorSource + ?Sized>(
    params: &NetworkParams,
    source: &S,
    prev: &StoredBlock,
) -> Result<AsertAnchor, RetargetError> {
    if let Some(anchor) = params.asert_anchor {
        return Ok(anchor);
    }

    if !is_asert_enabled(params, source, prev)? {
        return Err(RetargetError::NotActivated { height: prev.height });
    }

    let mut anchor = *prev;
    while anchor.height > 0 {
        let parent = source.ancestor(anchor.height - 1)?;
        if !is_asert_enabled(params, source, &parent)? {
            break;
        }
        anchor = parent;
    }

    let prev_block_time = if anchor.height == 0 {
        anchor.time()
    } else {
        source.ancestor(anchor.height - 1)?.time()
    };

    trace!("ASERT anchor at height {} (walked from {})", anchor.height, prev.height);
    Ok(AsertAnchor { height: anchor.height, bits: anchor.bits(), prev_block_time })
}

/// Compact bits required for a block built on `prev` with timestamp
/// `next_time`.
pub fn next_work_required<S: AncestorSource + ?Sized>(
    params: &NetworkParams,
    source: &S,
    prev: &StoredBlock,
    next_time: i64,
) -> Result<u32, RetargetError> {
    if params.no_retargeting {
        return Ok(prev.bits());
    }

    if !asert_active(params, source, prev)? {
        return Err(RetargetError::NotActivated { height: prev.height });
    }

    if params.allow_min_difficulty_blocks && next_time > prev.time() + 2 * params.target_spacing {
        debug!("minimum-difficulty block after {}", prev.height);
        return Ok(encode_compact(decode_compact(params.pow_limit_bits)?));
    }

    let anchor = find_anchor(params, source, prev)?;
    asert_next_bits(params, &anchor, prev.height, prev.time())
}

/// Check the bits claimed by `header`, the block after `prev`.
///
/// Missing history defers the check instead of failing it.
pub fn check_difficulty<S: AncestorSource + ?Sized>(
    params: &NetworkParams,
    source: &S,
    prev: &StoredBlock,
    header: &BlockHeader,
) -> Result<DifficultyCheck, RetargetError> {
    match next_work_required(params, source, prev, header.timestamp as i64) {
        Ok(expected) if expected == header.bits => Ok(DifficultyCheck::Valid),
        Ok(expected) => Err(RetargetError::BadDifficultyBits {
            height: prev.height + 1,
            expected,
            found: header.bits,
        }),
        Err(RetargetError::InsufficientHistory { height }) => {
            debug!("deferring difficulty check of block {}: missing {}", prev.height + 1, height);
            Ok(DifficultyCheck::Deferred { height })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use crate::network::{Network, ASERT_HALF_LIFE_TWO_DAYS};

    const BASE_TIME: u32 = 1_000_000;
    const ANCHOR_BITS: u32 = 0x1c0ffff0;

    /// Walk-based parameters: activation is reached by the MTP of block 55.
    fn synthetic_params() -> NetworkParams {
        let mut params = Network::Regtest.params();
        params.no_retargeting = false;
        params.allow_min_difficulty_blocks = false;
        params.asert_anchor = None;
        params.pow_limit_bits = 0x1d00ffff;
        params.asert_activation_time = BASE_TIME as i64 + 600 * 50;
        params
    }

    fn header(height: u32) -> BlockHeader {
        BlockHeader {
            version: 4,
            prev_block_hash: [0u8; 32],
            merkle_root: [height as u8; 32],
            timestamp: BASE_TIME + 600 * height,
            bits: if height == 55 { ANCHOR_BITS } else { 0x1d00ffff },
            nonce: height,
        }
    }

    /// On-schedule chain covering heights `from..=to`.
    fn chain(from: u32, to: u32) -> MemoryChain {
        let mut chain = MemoryChain::new(from);
        for height in from..=to {
            chain.push(header(height));
        }
        chain
    }

    struct FailingStore;

    impl AncestorSource for FailingStore {
        fn ancestor(&self, _height: u32) -> Result<StoredBlock, StoreError> {
            Err(StoreError::Backend("disk offline".into()))
        }
    }

    #[test]
    fn test_known_targets_from_mainnet_anchor() {
        let params = Network::Mainnet.params();
        let anchor = params.asert_anchor.unwrap();
        let cases = [
            (0, 600, 0x1804dafe),
            (288, 600 * 289 + ASERT_HALF_LIFE_TWO_DAYS, 0x1809b5fc),
            (288, 600 * 289 - ASERT_HALF_LIFE_TWO_DAYS, 0x18026d7f),
            (1, 1500, 0x1804dc7d),
            (100, 48255, 0x18049f0e),
            (2016, 1_815_000, 0x1836eda7),
        ];

        for (height_diff, time_diff, expected) in cases {
            let bits = asert_next_bits(
                &params,
                &anchor,
                anchor.height + height_diff,
                anchor.prev_block_time + time_diff,
            )
            .unwrap();
            assert_eq!(bits, expected, "height_diff {} time_diff {}", height_diff, time_diff);
        }
    }

    #[test]
    fn test_known_targets_one_hour_half_life() {
        let params = Network::Testnet4.params();
        let anchor = params.asert_anchor.unwrap();
        let bits = asert_next_bits(&params, &anchor, anchor.height + 1, anchor.prev_block_time - 600).unwrap();
        assert_eq!(bits, 0x1d00b500);
        let bits = asert_next_bits(&params, &anchor, anchor.height + 5, anchor.prev_block_time - 3600).unwrap();
        assert_eq!(bits, 0x1c3fffc0);
    }

    #[test]
    fn test_clamping() {
        let pow_limit = decode_compact(0x1d00ffff).unwrap();
        let ref_target = decode_compact(0x1804dafe).unwrap();

        // Forty half-lives late: far above the limit.
        let late = 600 * 11 + 40 * ASERT_HALF_LIFE_TWO_DAYS;
        let easy = compute_asert_target(ref_target, pow_limit, 600, ASERT_HALF_LIFE_TWO_DAYS, late, 10).unwrap();
        assert_eq!(easy, pow_limit);

        // A million blocks in no time never reaches zero.
        let hard = compute_asert_target(U256::one(), pow_limit, 600, ASERT_HALF_LIFE_TWO_DAYS, 0, 1_000_000).unwrap();
        assert_eq!(hard, U256::one());
        assert_eq!(encode_compact(hard), 0x01010000);
    }

    #[test]
    fn test_rejects_non_positive_half_life() {
        let pow_limit = decode_compact(0x1d00ffff).unwrap();
        let ref_target = decode_compact(0x1804dafe).unwrap();
        for half_life in [0, -3600] {
            assert_eq!(
                compute_asert_target(ref_target, pow_limit, 600, half_life, 600, 0),
                Err(RetargetError::InvalidHalfLife(half_life))
            );
        }

        let mut params = Network::Mainnet.params();
        params.asert_half_life = 0;
        let anchor = params.asert_anchor.unwrap();
        assert_eq!(
            asert_next_bits(&params, &anchor, anchor.height + 1, anchor.prev_block_time + 1200),
            Err(RetargetError::InvalidHalfLife(0))
        );
    }

    #[test]
    fn test_no_drift_at_anchor() {
        for network in [Network::Mainnet, Network::Testnet3, Network::Testnet4, Network::Scalenet] {
            let params = network.params();
            let anchor = params.asert_anchor.unwrap();
            let bits = asert_next_bits(&params, &anchor, anchor.height, anchor.prev_block_time + 600).unwrap();
            assert_eq!(bits, anchor.bits, "{}", network);
        }
    }

    #[test]
    fn test_monotonic_in_time_and_height() {
        let pow_limit = decode_compact(0x1d00ffff).unwrap();
        let ref_target = decode_compact(0x1804dafe).unwrap();
        let target = |time_diff: i64, height_diff: i64| {
            compute_asert_target(ref_target, pow_limit, 600, ASERT_HALF_LIFE_TWO_DAYS, time_diff, height_diff).unwrap()
        };

        let mut previous = U256::zero();
        for step in 0..2000 {
            let next = target(-100_000 + step * 397, 144);
            assert!(next >= previous, "target fell as time increased at step {}", step);
            previous = next;
        }

        let mut previous = pow_limit;
        for height_diff in 0..2000 {
            let next = target(86_400, height_diff);
            assert!(next <= previous, "target rose as height increased at {}", height_diff);
            previous = next;
        }
    }

    #[test]
    fn test_anchor_walk_on_synthetic_chain() {
        let params = synthetic_params();
        let chain = chain(0, 70);
        let prev = chain.ancestor(70).unwrap();

        assert!(!is_asert_enabled(&params, &chain, &chain.ancestor(54).unwrap()).unwrap());
        assert!(is_asert_enabled(&params, &chain, &chain.ancestor(55).unwrap()).unwrap());

        let anchor = find_anchor(&params, &chain, &prev).unwrap();
        assert_eq!(
            anchor,
            AsertAnchor { height: 55, bits: ANCHOR_BITS, prev_block_time: (BASE_TIME + 600 * 54) as i64 }
        );

        // On schedule since the anchor: the anchor's target carries over.
        let bits = next_work_required(&params, &chain, &prev, prev.time() + 600).unwrap();
        assert_eq!(bits, ANCHOR_BITS);
    }

    #[test]
    fn test_check_difficulty() {
        let params = synthetic_params();
        let chain = chain(0, 70);
        let prev = chain.ancestor(70).unwrap();

        let mut next = header(71);
        next.bits = ANCHOR_BITS;
        assert_eq!(check_difficulty(&params, &chain, &prev, &next), Ok(DifficultyCheck::Valid));

        next.bits = 0x1d00ffff;
        assert_eq!(
            check_difficulty(&params, &chain, &prev, &next),
            Err(RetargetError::BadDifficultyBits { height: 71, expected: ANCHOR_BITS, found: 0x1d00ffff })
        );
    }

    #[test]
    fn test_insufficient_history_defers() {
        let params = synthetic_params();
        let partial = chain(60, 70);
        let prev = partial.ancestor(70).unwrap();

        let err = next_work_required(&params, &partial, &prev, prev.time() + 600).unwrap_err();
        assert_eq!(err, RetargetError::InsufficientHistory { height: 59 });
        assert!(err.is_recoverable());

        let next = header(71);
        assert_eq!(
            check_difficulty(&params, &partial, &prev, &next),
            Ok(DifficultyCheck::Deferred { height: 59 })
        );
    }

    #[test]
    fn test_backend_failure_is_fatal() {
        let params = synthetic_params();
        let prev = StoredBlock::new(header(70), 70);
        let err = next_work_required(&params, &FailingStore, &prev, prev.time() + 600).unwrap_err();
        assert!(matches!(err, RetargetError::Store(StoreError::Backend(_))));
        assert!(!err.is_recoverable());
        assert!(check_difficulty(&params, &FailingStore, &prev, &header(71)).is_err());
    }

    #[test]
    fn test_not_activated() {
        let params = synthetic_params();
        let chain = chain(0, 70);
        let prev = chain.ancestor(40).unwrap();
        assert_eq!(
            next_work_required(&params, &chain, &prev, prev.time() + 600),
            Err(RetargetError::NotActivated { height: 40 })
        );

        let mainnet = Network::Mainnet.params();
        let before_anchor = StoredBlock::new(header(0), 600_000);
        assert_eq!(
            next_work_required(&mainnet, &MemoryChain::default(), &before_anchor, 0),
            Err(RetargetError::NotActivated { height: 600_000 })
        );
    }

    #[test]
    fn test_fixed_anchor_needs_no_history() {
        let params = Network::Mainnet.params();
        let anchor = params.asert_anchor.unwrap();

        let mut tip = header(0);
        tip.timestamp = (anchor.prev_block_time + 600 * 289 + ASERT_HALF_LIFE_TWO_DAYS) as u32;
        let prev = StoredBlock::new(tip, anchor.height + 288);

        let bits = next_work_required(&params, &MemoryChain::default(), &prev, prev.time() + 600).unwrap();
        assert_eq!(bits, 0x1809b5fc);
    }

    #[test]
    fn test_special_rules() {
        let mut params = synthetic_params();
        params.allow_min_difficulty_blocks = true;
        let chain = chain(0, 70);
        let prev = chain.ancestor(70).unwrap();

        let late = prev.time() + 2 * 600 + 1;
        assert_eq!(next_work_required(&params, &chain, &prev, late).unwrap(), 0x1d00ffff);
        let on_time = prev.time() + 2 * 600;
        assert_eq!(next_work_required(&params, &chain, &prev, on_time).unwrap(), ANCHOR_BITS);

        let regtest = Network::Regtest.params();
        assert_eq!(next_work_required(&regtest, &chain, &prev, late).unwrap(), prev.bits());
    }
}
