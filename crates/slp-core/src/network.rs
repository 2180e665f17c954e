//! Network definitions and per-network consensus constants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Target spacing between blocks, in seconds.
pub const TARGET_BLOCK_SPACING: i64 = 600;

/// Two days, the ASERT half-life on most networks.
pub const ASERT_HALF_LIFE_TWO_DAYS: i64 = 2 * 24 * 60 * 60;

/// Median-time-past at which ASERT retargeting activated (2020-11-15 12:00 UTC).
pub const ASERT_ACTIVATION_TIME: i64 = 1_605_441_600;

/// Number of blocks used for median-time-past.
pub const MEDIAN_TIME_SPAN: u32 = 11;

/// Network type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network
    Mainnet,
    /// Long-running public test network
    Testnet3,
    /// Low-difficulty public test network
    Testnet4,
    /// Large-block scaling test network
    Scalenet,
    /// Local regression-test network
    Regtest,
}

impl Network {
    /// All known networks, in lookup order.
    pub const ALL: [Network; 5] = [
        Network::Mainnet,
        Network::Testnet3,
        Network::Testnet4,
        Network::Scalenet,
        Network::Regtest,
    ];

    /// Get the CashAddr prefix for this network.
    pub fn cashaddr_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "bitcoincash",
            Network::Testnet3 | Network::Testnet4 | Network::Scalenet => "bchtest",
            Network::Regtest => "bchreg",
        }
    }

    /// Get the SLP (simpleledger) address prefix for this network.
    pub fn slp_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "simpleledger",
            Network::Testnet3 | Network::Testnet4 | Network::Scalenet => "slptest",
            Network::Regtest => "slpreg",
        }
    }

    /// Get the legacy version byte for P2PKH addresses.
    pub fn p2pkh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            _ => 0x6f,
        }
    }

    /// Get the legacy version byte for P2SH addresses.
    pub fn p2sh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            _ => 0xc4,
        }
    }

    /// The built-in consensus parameters for this network.
    pub fn params(&self) -> NetworkParams {
        let (half_life, anchor, pow_limit_bits, allow_min_difficulty_blocks, no_retargeting) = match self {
            Network::Mainnet => (
                ASERT_HALF_LIFE_TWO_DAYS,
                Some(AsertAnchor { height: 661_647, bits: 0x1804_dafe, prev_block_time: 1_605_447_844 }),
                0x1d00_ffff,
                false,
                false,
            ),
            Network::Testnet3 => (
                ASERT_HALF_LIFE_TWO_DAYS,
                Some(AsertAnchor { height: 1_421_481, bits: 0x1d00_ffff, prev_block_time: 1_605_445_400 }),
                0x1d00_ffff,
                true,
                false,
            ),
            Network::Testnet4 => (
                60 * 60,
                Some(AsertAnchor { height: 16_844, bits: 0x1d00_ffff, prev_block_time: 1_605_451_779 }),
                0x1d00_ffff,
                true,
                false,
            ),
            Network::Scalenet => (
                ASERT_HALF_LIFE_TWO_DAYS,
                Some(AsertAnchor { height: 16_868, bits: 0x1d00_ffff, prev_block_time: 1_605_448_590 }),
                0x1d00_ffff,
                false,
                false,
            ),
            Network::Regtest => (ASERT_HALF_LIFE_TWO_DAYS, None, 0x207f_ffff, true, true),
        };

        NetworkParams {
            network: *self,
            cashaddr_prefix: self.cashaddr_prefix().to_string(),
            slp_prefix: self.slp_prefix().to_string(),
            p2pkh_version: self.p2pkh_version(),
            p2sh_version: self.p2sh_version(),
            target_spacing: TARGET_BLOCK_SPACING,
            asert_half_life: half_life,
            asert_activation_time: ASERT_ACTIVATION_TIME,
            asert_anchor: anchor,
            pow_limit_bits,
            allow_min_difficulty_blocks,
            no_retargeting,
        }
    }

    /// Find the network whose CashAddr prefix matches (case-insensitive).
    pub fn from_cashaddr_prefix(prefix: &str) -> Option<Self> {
        let prefix = prefix.to_lowercase();
        Network::ALL.into_iter().find(|n| n.cashaddr_prefix() == prefix)
    }

    /// Find the network whose SLP prefix matches (case-insensitive).
    pub fn from_slp_prefix(prefix: &str) -> Option<Self> {
        let prefix = prefix.to_lowercase();
        Network::ALL.into_iter().find(|n| n.slp_prefix() == prefix)
    }

    /// Parse network from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoincash" => Some(Network::Mainnet),
            "testnet3" | "testnet" | "test" => Some(Network::Testnet3),
            "testnet4" => Some(Network::Testnet4),
            "scalenet" => Some(Network::Scalenet),
            "regtest" | "reg" => Some(Network::Regtest),
            _ => None,
        }
    }

    /// Get network name as string.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet3 => "testnet3",
            Network::Testnet4 => "testnet4",
            Network::Scalenet => "scalenet",
            Network::Regtest => "regtest",
        }
    }
}

impl core::fmt::Display for Network {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

/// The block ASERT computes every target relative to.
///
/// `prev_block_time` is the timestamp of the anchor's parent, not of the
/// anchor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsertAnchor {
    /// Height of the anchor block.
    pub height: u32,
    /// Compact target of the anchor block.
    pub bits: u32,
    /// Timestamp of the block preceding the anchor.
    pub prev_block_time: i64,
}

/// Errors raised while loading network parameters.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// The JSON document could not be decoded.
    #[error("invalid network parameters JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A prefix was empty or not lowercase ASCII.
    #[error("invalid address prefix {0:?}")]
    InvalidPrefix(String),
    /// A time constant was zero or negative.
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: i64 },
    /// The legacy version bytes for P2PKH and P2SH collide.
    #[error("P2PKH and P2SH version bytes are both {0:#04x}")]
    VersionCollision(u8),
}

/// Consensus and address parameters for one network.
///
/// The built-in table comes from [`Network::params`]; a wallet pointed at a
/// private chain can load its own table with [`NetworkParams::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Which network these parameters describe.
    pub network: Network,
    /// CashAddr human-readable prefix.
    pub cashaddr_prefix: String,
    /// SLP human-readable prefix.
    pub slp_prefix: String,
    /// Legacy Base58 version byte for P2PKH.
    pub p2pkh_version: u8,
    /// Legacy Base58 version byte for P2SH.
    pub p2sh_version: u8,
    /// Target seconds between blocks.
    pub target_spacing: i64,
    /// ASERT half-life in seconds.
    pub asert_half_life: i64,
    /// Median-time-past at which ASERT becomes active.
    pub asert_activation_time: i64,
    /// Hard-coded anchor, if the network has one.
    #[serde(default)]
    pub asert_anchor: Option<AsertAnchor>,
    /// Proof-of-work limit (easiest target) in compact form.
    pub pow_limit_bits: u32,
    /// Whether a block may use the minimum difficulty after a long gap.
    #[serde(default)]
    pub allow_min_difficulty_blocks: bool,
    /// Whether difficulty never changes (regtest).
    #[serde(default)]
    pub no_retargeting: bool,
}

impl NetworkParams {
    /// Load and validate parameters from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ParamsError> {
        let params: NetworkParams = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Serialize these parameters to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ParamsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the invariants the codecs and the retarget engine rely on.
    pub fn validate(&self) -> Result<(), ParamsError> {
        for prefix in [&self.cashaddr_prefix, &self.slp_prefix] {
            let valid = !prefix.is_empty()
                && prefix.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
            if !valid {
                return Err(ParamsError::InvalidPrefix(prefix.clone()));
            }
        }
        if self.target_spacing <= 0 {
            return Err(ParamsError::NonPositive { name: "target_spacing", value: self.target_spacing });
        }
        if self.asert_half_life <= 0 {
            return Err(ParamsError::NonPositive { name: "asert_half_life", value: self.asert_half_life });
        }
        if self.p2pkh_version == self.p2sh_version {
            return Err(ParamsError::VersionCollision(self.p2pkh_version));
        }
        Ok(())
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Network::default().params()
    }
}
