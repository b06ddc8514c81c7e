//! Sequencer program
//!
//! Every channel runs the same small program on its own execution unit. It
//! pulls `(reps, half_period)` word pairs from the instruction FIFO:
//!
//! - `reps > 0`: emit `reps` pulses, each high then low for
//!   `half_period + PATH_LENGTH` ticks
//! - `reps == 0`, `half_period > 0`: wait for the trigger input, polling it
//!   every [`WAIT_LOOP_CYCLES`] ticks until the timeout counter runs out,
//!   then push the remaining count (or [`WAIT_TIMEOUT_SENTINEL`]) to the
//!   result FIFO
//! - `reps == 0`, `half_period == 0`: push [`STOP_COMPLETION_WORD`] and stop
//!
//! A wait that directly follows another wait (or the hardware-trigger start
//! handshake) is untimed and unreported: it blocks on the trigger until it
//! goes high.
//!
//! [`assembly`] holds the PIO source that chip HALs load, and [`model`] a
//! cycle-accurate reference of it that agrees instruction for instruction.

pub mod assembly;
pub mod model;

pub use assembly::{assemble, Assembled, PioProgram};
pub use model::{Phase, ProgramModel, Step, UnitIo};

/// Ticks added to each stored half period by the loop's fixed instructions
pub const PATH_LENGTH: u32 = 6;

/// Ticks from the end of the previous instruction to the first trigger check
pub const WAIT_OFFSET: u32 = 3;

/// Ticks per iteration of the trigger polling loop
pub const WAIT_LOOP_CYCLES: u32 = 2;

/// Shortest wait timeout that encodes to a non-stop instruction
pub const WAIT_MINIMUM: u32 = WAIT_OFFSET + WAIT_LOOP_CYCLES;

/// Result word of a wait that timed out
pub const WAIT_TIMEOUT_SENTINEL: u32 = u32::MAX;

/// Result word pushed when the program reaches its stop instruction
pub const STOP_COMPLETION_WORD: u32 = 0;

/// Word preloaded ahead of the program for a hardware-trigger start
pub const HW_START_WORD: u32 = 1;

/// Program length in instructions
pub const PROGRAM_LEN: usize = 32;

/// Entry point for a software start
pub const ENTRY_START: u8 = 0;

/// Entry point for a hardware-trigger start
///
/// Consumes [`HW_START_WORD`], blocks until the trigger is high, then runs
/// the program as if it had just finished a wait.
pub const ENTRY_AWAIT_TRIGGER: u8 = 27;
