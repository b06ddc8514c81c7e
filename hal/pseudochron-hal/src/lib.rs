//! Pseudochron Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction traits the timing engine is
//! written against. Chip-specific HALs (RP2040 PIO + DMA) and the host-side
//! simulator implement them, so the same engine runs on the board and in
//! tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  pseudochron-core (engine, sequencer)   │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  pseudochron-hal (this crate - traits)  │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ pseudochron-  │       │ pseudochron-  │
//! │  hal-rp2040   │       │      sim      │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::ManualOutputs`] - Software control of channel outputs outside a run
//! - [`sequencer::ExecutionUnits`] - Pool of execution units running the pseudoclock program
//! - [`sequencer::StreamingChannel`] - DMA-like word mover feeding and draining units

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod sequencer;

// Re-export key traits at crate root for convenience
pub use gpio::{Level, ManualOutputs};
pub use sequencer::{Endpoint, ExecutionUnits, HalError, StreamingChannel, UnitConfig};
