//! Execution unit and streaming channel abstractions
//!
//! An execution unit is a small coprocessor (an RP2040 PIO state machine)
//! running one channel's pseudoclock program. It has an instruction FIFO
//! (TX, fed by the host side) and a result FIFO (RX, carrying wait results
//! back). Streaming channels (DMA channels on the RP2040) move words between
//! RAM and those FIFOs without CPU involvement.
//!
//! Both are finite pools. Every claim made for a run must be paired with a
//! release when the run ends, whatever the exit path.

use portable_atomic::AtomicU32;

/// Errors from the execution unit / streaming channel pools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// Requested execution unit is already claimed or does not exist
    NoFreeUnit,
    /// All streaming channels are claimed
    NoFreeStream,
}

/// Source or destination of a streaming transfer
///
/// Memory endpoints are word arrays shared with the control side. They are
/// atomics so that the data mover and readers never alias plain memory.
#[derive(Debug, Clone, Copy)]
pub enum Endpoint<'a> {
    /// Word buffer in RAM, accessed sequentially from its first element
    Memory(&'a [AtomicU32]),
    /// Instruction FIFO of the given execution unit (paced by free space)
    UnitTx(u8),
    /// Result FIFO of the given execution unit (paced by available data)
    UnitRx(u8),
}

/// Per-unit program setup applied before the unit is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnitConfig {
    /// GPIO driven by the program's side-set output
    pub out_pin: u8,
    /// GPIO sampled by the program's trigger checks
    pub in_pin: u8,
    /// Absolute program address the unit starts executing at
    pub initial_pc: u8,
}

/// A DMA-like word mover
///
/// A transfer starts as soon as it is configured, but only moves data when
/// its paced endpoint is ready: an instruction FIFO with free space, or a
/// result FIFO holding data. Units that are not yet enabled therefore hold
/// a configured transfer back once their FIFO is full.
pub trait StreamingChannel<'a> {
    /// Program and start a transfer of `count` words from `source` to `dest`
    fn configure(&mut self, source: Endpoint<'a>, dest: Endpoint<'a>, count: u32);

    /// Check if the transfer still has words to move
    fn is_busy(&self) -> bool;

    /// Number of words the transfer has yet to move
    fn remaining(&self) -> u32;

    /// Cancel the in-flight transfer
    ///
    /// After this returns the channel no longer touches either endpoint.
    fn abort(&mut self);
}

/// Pool of execution units sharing one loaded pseudoclock program
pub trait ExecutionUnits<'a> {
    /// Streaming channel type handed out by [`ExecutionUnits::claim_stream`]
    type Stream: StreamingChannel<'a>;

    /// Address at which the pseudoclock program is loaded
    fn program_offset(&self) -> u8;

    /// Claim execution unit `unit` for exclusive use
    fn claim_unit(&mut self, unit: u8) -> Result<(), HalError>;

    /// Configure a claimed unit's pins and entry point
    ///
    /// The unit is left disabled with empty FIFOs and its output driven low.
    fn init_unit(&mut self, unit: u8, config: UnitConfig);

    /// Write one word into the unit's instruction FIFO, waiting for space
    fn push_blocking(&mut self, unit: u8, word: u32);

    /// Claim any free streaming channel
    fn claim_stream(&mut self) -> Result<Self::Stream, HalError>;

    /// Return a streaming channel to the pool
    fn release_stream(&mut self, stream: Self::Stream);

    /// Enable every unit in `mask` (bit n = unit n) on the same clock edge
    ///
    /// Clock dividers are restarted together so the enabled units share a
    /// common time origin.
    fn enable_in_sync(&mut self, mask: u8);

    /// Discard everything queued in the unit's instruction FIFO
    fn drain_tx(&mut self, unit: u8);

    /// Discard everything queued in the unit's result FIFO
    fn drain_rx(&mut self, unit: u8);

    /// Disable the unit and return it to the pool
    fn release_unit(&mut self, unit: u8);

    /// Number of execution units currently unclaimed
    fn free_units(&self) -> usize;

    /// Number of streaming channels currently unclaimed
    fn free_streams(&self) -> usize;
}
