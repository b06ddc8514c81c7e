//! Engine configuration
//!
//! Everything the engine needs to know about the board that is not part of
//! a program: active channel count, pin assignment and tick rate.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::pins::{PinError, PinTable};
use crate::MAX_CHANNELS;

/// Magic number to identify valid configuration data
pub const CONFIG_MAGIC: u32 = 0x5053_434B; // "PSCK"

/// Current configuration data version
pub const CONFIG_VERSION: u8 = 1;

/// Largest serialized [`EngineConfig`]
pub const MAX_CONFIG_SIZE: usize = 64;

/// Default sequencer tick rate
pub const DEFAULT_TICK_HZ: u32 = 100_000_000;

/// Errors loading or storing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Output buffer too small or encoder failure
    Serialize,
    /// Bytes are not a valid encoding
    Deserialize,
    /// Magic or version mismatch
    InvalidFormat,
    /// Channel count outside 1..=4
    InvalidChannelCount,
    /// Pin table breaks the assignment rules
    InvalidPins(PinError),
}

impl From<PinError> for ConfigError {
    fn from(err: PinError) -> Self {
        ConfigError::InvalidPins(err)
    }
}

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Magic number for validation
    pub magic: u32,
    /// Data format version
    pub version: u8,
    /// Active channels (1..=4)
    pub num_channels: u8,
    /// Per-channel pins
    pub pins: PinTable,
    /// Sequencer tick rate, used to report times in nanoseconds
    pub tick_hz: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Four channels, no pins assigned, default tick rate
    pub const fn new() -> Self {
        Self {
            magic: CONFIG_MAGIC,
            version: CONFIG_VERSION,
            num_channels: MAX_CHANNELS as u8,
            pins: PinTable::new(),
            tick_hz: DEFAULT_TICK_HZ,
        }
    }

    /// Check header and contents
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.magic != CONFIG_MAGIC || self.version != CONFIG_VERSION {
            return Err(ConfigError::InvalidFormat);
        }
        if self.num_channels == 0 || self.num_channels as usize > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannelCount);
        }
        self.pins.validate()?;
        Ok(())
    }

    /// Serialize into `buffer`, returning the used prefix
    #[cfg(feature = "serde")]
    pub fn to_bytes<'b>(&self, buffer: &'b mut [u8]) -> Result<&'b mut [u8], ConfigError> {
        postcard::to_slice(self, buffer).map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize and validate
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;
        config.validate()?;
        Ok(config)
    }
}

/// Convert sequencer ticks to nanoseconds at `tick_hz`
///
/// Saturates instead of overflowing; returns 0 for a zero tick rate.
pub fn ticks_to_ns(ticks: u64, tick_hz: u32) -> u64 {
    if tick_hz == 0 {
        return 0;
    }
    let ns = ticks as u128 * 1_000_000_000 / tick_hz as u128;
    u64::try_from(ns).unwrap_or(u64::MAX)
}
