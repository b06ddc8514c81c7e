//! Simulated execution units for host testing
//!
//! [`SimBank`] implements the HAL's execution-unit pool on the host. Each
//! unit runs [`pseudochron_core::program::ProgramModel`] cycle by cycle
//! behind four-word FIFOs, and each streaming channel moves at most one
//! word per cycle like a DMA channel paced by its FIFO.
//!
//! Simulated time only advances when the sequencer polls a stream, by
//! [`CYCLES_PER_POLL`] cycles per query. A run therefore completes in
//! bounded host time and its edge timing is exactly reproducible.
//!
//! ```text
//!  Sequencer ──poll──► SimStream ──advance──► SimState
//!                                              ├── transfers (one word/cycle)
//!                                              └── units (ProgramModel step)
//!  test ◄──edges, events, pool counts── SimHandle
//! ```

pub mod bank;
pub mod gpio;
pub mod unit;

#[cfg(test)]
mod scenarios;

pub use bank::{SimBank, SimEvent, SimHandle, SimStream};
pub use gpio::SimOutputs;

/// Execution units in the simulated block
pub const SIM_UNITS: usize = 4;

/// Streaming channels in the simulated pool
pub const SIM_STREAMS: usize = 12;

/// Depth of each unit's instruction and result FIFO
pub const FIFO_DEPTH: usize = 4;

/// Cycles simulated per stream query
pub const CYCLES_PER_POLL: u64 = 64;
