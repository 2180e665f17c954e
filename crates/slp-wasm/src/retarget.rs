//! ASERT target computation for JavaScript callers.

use slp_core::asert::asert_next_bits;
use slp_core::{compute_asert_target, decode_compact, encode_compact};
use wasm_bindgen::prelude::*;

use crate::address::parse_network;

/// JavaScript numbers are doubles; only exact integers are accepted.
fn to_integer(value: f64, what: &str) -> Result<i64, String> {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > 9_007_199_254_740_991.0 {
        return Err(format!("{} must be an integer, got {}", what, value));
    }
    Ok(value as i64)
}

pub(crate) fn target_bits(network: &str, anchor_bits: u32, time_diff: f64, height_diff: f64) -> Result<u32, String> {
    let params = parse_network(network)?.params();
    let ref_target = decode_compact(anchor_bits).map_err(|e| e.to_string())?;
    let pow_limit = decode_compact(params.pow_limit_bits).map_err(|e| e.to_string())?;

    let next = compute_asert_target(
        ref_target,
        pow_limit,
        params.target_spacing,
        params.asert_half_life,
        to_integer(time_diff, "time_diff")?,
        to_integer(height_diff, "height_diff")?,
    )
    .map_err(|e| e.to_string())?;
    Ok(encode_compact(next))
}

pub(crate) fn anchored_bits(network: &str, eval_height: u32, eval_time: f64) -> Result<u32, String> {
    let params = parse_network(network)?.params();
    let anchor = params
        .asert_anchor
        .ok_or_else(|| format!("{} has no fixed ASERT anchor", params.network))?;
    asert_next_bits(&params, &anchor, eval_height, to_integer(eval_time, "eval_time")?).map_err(|e| e.to_string())
}

/// Compact target for a block `height_diff` blocks and `time_diff` seconds
/// past the anchor, using the network's spacing, half-life and limit.
#[wasm_bindgen(js_name = computeAsertTarget)]
pub fn compute_asert_target_js(network: &str, anchor_bits: u32, time_diff: f64, height_diff: f64) -> Result<u32, JsValue> {
    target_bits(network, anchor_bits, time_diff, height_diff).map_err(|e| JsValue::from_str(&e))
}

/// Compact target for the block after `(eval_height, eval_time)` relative
/// to the network's built-in anchor.
#[wasm_bindgen(js_name = asertNextBits)]
pub fn asert_next_bits_js(network: &str, eval_height: u32, eval_time: f64) -> Result<u32, JsValue> {
    anchored_bits(network, eval_height, eval_time).map_err(|e| JsValue::from_str(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_bits_mainnet() {
        assert_eq!(target_bits("mainnet", 0x1804dafe, 600.0, 0.0).unwrap(), 0x1804dafe);
        assert_eq!(target_bits("mainnet", 0x1804dafe, 1500.0, 1.0).unwrap(), 0x1804dc7d);
    }

    #[test]
    fn test_anchored_bits() {
        // One block past the anchor, exactly on schedule.
        let bits = anchored_bits("mainnet", 661_648, (1_605_447_844 + 2 * 600) as f64).unwrap();
        assert_eq!(bits, 0x1804dafe);
        assert!(anchored_bits("regtest", 10, 0.0).unwrap_err().contains("anchor"));
    }

    #[test]
    fn test_rejects_fractional_input() {
        assert!(target_bits("mainnet", 0x1804dafe, 600.5, 0.0).is_err());
        assert!(target_bits("mainnet", 0x1804dafe, f64::NAN, 0.0).is_err());
        assert!(target_bits("mainnet", 0x04923456, 600.0, 0.0).is_err());
    }
}
