//! Engine configuration with profile support.
//!
//! Range and rebalance tuning lives here. Adapters and liquidators listed in
//! the file are applied through the engine's admin surface at startup, so
//! they go through the same owner check and notifications as runtime calls.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::u256_math::parse_wad;

/// Main configuration structure containing all engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Liquidators authorized at startup
    #[serde(default)]
    pub liquidators: Vec<Address>,

    /// LP range optimizer parameters
    #[serde(default)]
    pub range: RangeConfig,

    /// User position rebalance parameters
    #[serde(default)]
    pub positions: PositionConfig,

    /// Adapters registered at startup
    #[serde(default)]
    pub adapters: Vec<AdapterEntry>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// LP range optimizer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeConfig {
    /// Tick spacing ranges are aligned to
    #[serde(default = "default_tick_spacing")]
    pub tick_spacing: i32,

    /// Downside offset as a share of the threshold (bps)
    #[serde(default = "default_lower_offset_factor")]
    pub lower_offset_factor_bps: u32,

    /// Upside offset as a share of the threshold (bps)
    #[serde(default = "default_upper_offset_factor")]
    pub upper_offset_factor_bps: u32,

    /// Bound drift tolerated before rebalancing, in bps of current width
    #[serde(default = "default_hysteresis")]
    pub hysteresis_bps: u32,
}

fn default_tick_spacing() -> i32 {
    60
}
fn default_lower_offset_factor() -> u32 {
    2000
}
fn default_upper_offset_factor() -> u32 {
    1500
}
fn default_hysteresis() -> u32 {
    500
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            tick_spacing: default_tick_spacing(),
            lower_offset_factor_bps: default_lower_offset_factor(),
            upper_offset_factor_bps: default_upper_offset_factor(),
            hysteresis_bps: default_hysteresis(),
        }
    }
}

/// Auto-rebalance parameters for user positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Distance from a boundary that triggers a rebalance, in bps of width
    #[serde(default = "default_proximity")]
    pub proximity_bps: u32,

    /// Smallest half width of a rebalanced range (ticks)
    #[serde(default = "default_min_half_width")]
    pub min_half_width: i32,

    /// Largest half width of a rebalanced range (ticks)
    #[serde(default = "default_max_half_width")]
    pub max_half_width: i32,

    /// Extra half width per volatility point (ticks)
    #[serde(default = "default_half_width_per_volatility")]
    pub half_width_per_volatility: i32,
}

fn default_proximity() -> u32 {
    1000
}
fn default_min_half_width() -> i32 {
    200
}
fn default_max_half_width() -> i32 {
    2000
}
fn default_half_width_per_volatility() -> i32 {
    18
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            proximity_bps: default_proximity(),
            min_half_width: default_min_half_width(),
            max_half_width: default_max_half_width(),
            half_width_per_volatility: default_half_width_per_volatility(),
        }
    }
}

/// An adapter registration read from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterEntry {
    pub protocol_id: Address,
    pub adapter: Address,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Decimal ratio, "1.0" = exactly at threshold
    pub liquidation_threshold: String,
}

fn default_enabled() -> bool {
    true
}

impl AdapterEntry {
    /// Threshold on the 1e18 scale.
    pub fn threshold_wad(&self) -> anyhow::Result<U256> {
        parse_wad(&self.liquidation_threshold)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            liquidators: Vec::new(),
            range: RangeConfig::default(),
            positions: PositionConfig::default(),
            adapters: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Wider ranges and less churn.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            range: RangeConfig {
                lower_offset_factor_bps: 2500,
                upper_offset_factor_bps: 2000,
                hysteresis_bps: 750,
                ..Default::default()
            },
            positions: PositionConfig {
                proximity_bps: 1500,
                min_half_width: 400,
                max_half_width: 3000,
                half_width_per_volatility: 24,
            },
            ..Default::default()
        }
    }

    /// Tighter ranges, rebalanced sooner.
    pub fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            range: RangeConfig {
                lower_offset_factor_bps: 1500,
                upper_offset_factor_bps: 1000,
                hysteresis_bps: 300,
                ..Default::default()
            },
            positions: PositionConfig {
                proximity_bps: 500,
                min_half_width: 120,
                max_half_width: 1200,
                half_width_per_volatility: 12,
            },
            ..Default::default()
        }
    }

    /// Get profile from environment variable GUARDIAN_PROFILE, or default.
    /// Supported values: default, conservative, aggressive
    pub fn from_env() -> Self {
        let profile = std::env::var("GUARDIAN_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "conservative" | "safe" => Self::conservative(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        }
    }

    /// Reject parameter combinations the optimizer cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.range.tick_spacing <= 0 {
            anyhow::bail!("tick_spacing must be positive, got {}", self.range.tick_spacing);
        }
        if self.positions.min_half_width <= 0
            || self.positions.min_half_width > self.positions.max_half_width
        {
            anyhow::bail!(
                "half width bounds [{}, {}] are invalid",
                self.positions.min_half_width,
                self.positions.max_half_width
            );
        }
        for entry in &self.adapters {
            entry.threshold_wad().map_err(|e| {
                anyhow::anyhow!("adapter {}: bad liquidation_threshold: {e}", entry.protocol_id)
            })?;
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            tick_spacing = self.range.tick_spacing,
            lower_factor_bps = self.range.lower_offset_factor_bps,
            upper_factor_bps = self.range.upper_offset_factor_bps,
            hysteresis_bps = self.range.hysteresis_bps,
            "Range optimizer"
        );
        tracing::info!(
            proximity_bps = self.positions.proximity_bps,
            min_half_width = self.positions.min_half_width,
            max_half_width = self.positions.max_half_width,
            per_volatility = self.positions.half_width_per_volatility,
            "Position rebalancing"
        );
        tracing::info!(
            adapters = self.adapters.len(),
            liquidators = self.liquidators.len(),
            "Startup registrations"
        );
    }
}
