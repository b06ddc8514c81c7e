//! Shared instruction and wait-result storage
//!
//! Both stores are fixed word arrays split evenly between the active
//! channels. The words are atomics: the control side edits and reads them
//! while the streaming channels read or fill them during a run.

pub mod instructions;
pub mod waits;

use core::ops::Range;

pub use instructions::{InstructionStore, ProgramExtent};
pub use waits::WaitStore;

use crate::error::EngineError;
use crate::MAX_CHANNELS;

/// Split of the stores between `num_channels` channels
///
/// Every channel region ends with one extra instruction that is never
/// written, so a program always has a terminating stop, and one extra wait
/// slot for the stop's completion word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    num_channels: u8,
    total_instructions: usize,
    total_waits: usize,
}

impl Layout {
    /// Layout for `num_channels` sharing the given store capacities
    pub const fn new(
        num_channels: u8,
        total_instructions: usize,
        total_waits: usize,
    ) -> Result<Self, EngineError> {
        if num_channels == 0 || num_channels as usize > MAX_CHANNELS {
            return Err(EngineError::InvalidRequest);
        }
        Ok(Self {
            num_channels,
            total_instructions,
            total_waits,
        })
    }

    /// Every channel active
    pub const fn all_channels(total_instructions: usize, total_waits: usize) -> Self {
        Self {
            num_channels: MAX_CHANNELS as u8,
            total_instructions,
            total_waits,
        }
    }

    /// Active channel count
    pub const fn num_channels(&self) -> u8 {
        self.num_channels
    }

    /// Reject channel indices outside the active count
    pub fn check_channel(&self, channel: u8) -> Result<(), EngineError> {
        if channel < self.num_channels {
            Ok(())
        } else {
            Err(EngineError::InvalidChannel)
        }
    }

    /// Addressable instructions per channel
    pub const fn instruction_capacity(&self) -> usize {
        self.total_instructions / self.num_channels as usize
    }

    /// Word range of a channel's instruction region, terminator included
    pub fn instruction_words(&self, channel: u8) -> Range<usize> {
        let len = 2 * (self.instruction_capacity() + 1);
        let start = channel as usize * len;
        start..start + len
    }

    /// Addressable wait results per channel
    pub const fn wait_capacity(&self) -> usize {
        self.total_waits / self.num_channels as usize
    }

    /// Result slots per channel, completion word included
    pub const fn wait_slots(&self) -> usize {
        self.wait_capacity() + 1
    }

    /// Slot range of a channel's wait region
    pub fn wait_region(&self, channel: u8) -> Range<usize> {
        let start = channel as usize * self.wait_slots();
        start..start + self.wait_slots()
    }
}
