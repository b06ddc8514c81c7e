//! Instruction store
//!
//! Two words per instruction in FIFO order, `(reps, half_period)`, so a
//! channel's program can be streamed straight out of its region.

use portable_atomic::{AtomicU32, Ordering};

use super::Layout;
use crate::error::EngineError;
use crate::instruction::Instruction;
use crate::MAX_CHANNELS;

/// Words and waits a channel's program needs for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramExtent {
    /// Words to stream, up to and including the stop instruction
    pub words: usize,
    /// Result words the program pushes, the stop's completion word included
    pub waits: usize,
}

impl ProgramExtent {
    /// Check if the program is a lone stop instruction
    pub fn is_empty(&self) -> bool {
        self.words == 2
    }

    /// Wait results the host can read back
    pub fn reported_waits(&self) -> usize {
        self.waits.saturating_sub(1)
    }
}

/// Instruction words for all channels
pub struct InstructionStore<const WORDS: usize> {
    words: [AtomicU32; WORDS],
}

impl<const WORDS: usize> Default for InstructionStore<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> InstructionStore<WORDS> {
    /// Addressable instructions shared by all channels
    pub const CAPACITY: usize = WORDS / 2 - MAX_CHANNELS;

    /// Store with every word zero (every instruction a stop)
    pub const fn new() -> Self {
        Self {
            words: [const { AtomicU32::new(0) }; WORDS],
        }
    }

    fn slot(&self, layout: &Layout, channel: u8, address: usize) -> Result<usize, EngineError> {
        layout.check_channel(channel)?;
        if address >= layout.instruction_capacity() {
            return Err(EngineError::InvalidAddress);
        }
        Ok(layout.instruction_words(channel).start + 2 * address)
    }

    /// Reject a `count`-instruction write at `address` that would leave the region
    pub fn check_range(
        &self,
        layout: &Layout,
        channel: u8,
        address: usize,
        count: usize,
    ) -> Result<(), EngineError> {
        layout.check_channel(channel)?;
        match address.checked_add(count) {
            Some(end) if end <= layout.instruction_capacity() => Ok(()),
            _ => Err(EngineError::InvalidAddress),
        }
    }

    /// Read one instruction
    pub fn get(&self, layout: &Layout, channel: u8, address: usize) -> Result<Instruction, EngineError> {
        let base = self.slot(layout, channel, address)?;
        // Edits are published to the sequencer by the start handoff, not by
        // these accesses
        Ok(Instruction::from_words(
            self.words[base].load(Ordering::Relaxed),
            self.words[base + 1].load(Ordering::Relaxed),
        ))
    }

    /// Write one instruction
    pub(crate) fn set(
        &self,
        layout: &Layout,
        channel: u8,
        address: usize,
        instruction: Instruction,
    ) -> Result<(), EngineError> {
        let base = self.slot(layout, channel, address)?;
        let [reps, half_period] = instruction.words();
        self.words[base].store(reps, Ordering::Relaxed);
        self.words[base + 1].store(half_period, Ordering::Relaxed);
        Ok(())
    }

    /// Reset every instruction to stop
    pub(crate) fn clear(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
    }

    /// Find the end of a channel's program and count the waits it reports
    ///
    /// A wait directly after another wait does not report a result. With
    /// `after_wait` set, a leading wait counts as following one, which is
    /// how the hardware-trigger start handshake behaves.
    pub fn scan(
        &self,
        layout: &Layout,
        channel: u8,
        after_wait: bool,
    ) -> Result<ProgramExtent, EngineError> {
        layout.check_channel(channel)?;
        let region = &self.words[layout.instruction_words(channel)];

        let mut waits = 1;
        let mut previous_was_wait = after_wait;
        let mut end = None;
        for (index, pair) in region.chunks_exact(2).enumerate() {
            let instruction = Instruction::from_words(
                pair[0].load(Ordering::Relaxed),
                pair[1].load(Ordering::Relaxed),
            );
            if instruction.is_stop() {
                end = Some(index + 1);
                break;
            }
            if instruction.is_wait() {
                if !previous_was_wait {
                    waits += 1;
                }
                previous_was_wait = true;
            } else {
                previous_was_wait = false;
            }
        }

        let instructions = end.ok_or(EngineError::TooManyInstructions)?;
        if waits > layout.wait_slots() {
            return Err(EngineError::TooManyWaits);
        }
        Ok(ProgramExtent {
            words: 2 * instructions,
            waits,
        })
    }

    /// The first `words` words of a channel's region, for streaming
    pub fn program_words(&self, layout: &Layout, channel: u8, words: usize) -> &[AtomicU32] {
        let region = layout.instruction_words(channel);
        let end = region.start + words.min(region.len());
        &self.words[region.start..end]
    }
}
