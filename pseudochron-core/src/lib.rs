//! Board-agnostic channel execution engine for the Pseudochron pseudoclock
//!
//! This crate contains everything that does not depend on a specific chip:
//!
//! - Instruction codec (host units to sequencer-native words)
//! - Reference model of the sequencer program, with its timing constants
//! - Shared instruction and wait-result stores
//! - Run status machine
//! - Channel orchestration (claim, configure, synchronized start, teardown)
//! - Control-side [`Engine`] and execution-side [`Sequencer`]
//!
//! The two sides run on different cores on the board. They share one
//! [`Engine`] value, normally a `static`, and only talk through its locked
//! cells, atomics and the start channel.

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod config;
pub mod engine;
pub mod error;
pub mod instruction;
pub mod orchestrator;
pub mod program;
pub mod sequencer;
pub mod status;
pub mod store;

pub use engine::{BulkLoadReport, Engine, ProgramEditor};
pub use error::EngineError;
pub use instruction::Instruction;
pub use sequencer::Sequencer;
pub use status::{ClockStatus, RunStatus};

/// Firmware version reported to the host
pub const VERSION: &str = "1.0.1";

/// Number of independent pseudoclock channels (one execution unit each)
pub const MAX_CHANNELS: usize = 4;

/// Instruction slots shared by all channels
pub const MAX_INSTRUCTIONS: usize = 30_000;

/// Wait result slots shared by all channels
pub const MAX_WAITS: usize = 400;

/// Words backing the instruction store: two per instruction, plus one
/// terminating instruction per channel
pub const INSTRUCTION_WORDS: usize = 2 * (MAX_INSTRUCTIONS + MAX_CHANNELS);

/// Slots backing the wait store: one extra per channel for the completion word
pub const WAIT_SLOTS: usize = MAX_WAITS + MAX_CHANNELS;

/// Engine sized for the RP2040 firmware
pub type Pseudoclock = Engine<INSTRUCTION_WORDS, WAIT_SLOTS>;
