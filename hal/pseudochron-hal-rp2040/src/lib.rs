//! RP2040 realization of the Pseudochron execution units
//!
//! This crate implements the `pseudochron-hal` traits on RP2040 hardware:
//!
//! - [`PioBank`] - PIO0 state machines running the pseudoclock program
//! - [`DmaStream`] - DMA channels streaming instructions and wait results
//! - [`SioOutputs`] - Software control of channel outputs between runs
//!
//! Pins are chosen at runtime by number, so the state machines and pads
//! are programmed through the PAC rather than embassy's typed pin API.
//! Embassy still owns the PIO block and the DMA channels, which keeps other
//! drivers from touching them.

#![no_std]

pub mod dma;
pub mod outputs;
pub mod pio;

pub use dma::DmaStream;
pub use outputs::SioOutputs;
pub use pio::PioBank;

/// DMA channels on the RP2040
pub const MAX_STREAMS: usize = 12;

/// GPIO function select values (RP2040 datasheet, IO_BANK0)
pub(crate) const FUNCSEL_SIO: u8 = 5;
pub(crate) const FUNCSEL_PIO0: u8 = 6;

/// Current system clock, which the state machines run at undivided
pub fn tick_hz() -> u32 {
    embassy_rp::clocks::clk_sys_freq()
}
