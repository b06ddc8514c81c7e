//! Instruction codec
//!
//! The host describes instructions as `(half_period_ticks, reps)`. The
//! sequencer wants counter values with its fixed overheads already taken
//! off. This module converts between the two:
//!
//! | Host                         | Stored `(reps, half_period)`         |
//! |------------------------------|--------------------------------------|
//! | pulse: `reps > 0`, `hp >= 6` | `(reps, hp - PATH_LENGTH)`           |
//! | wait: `reps == 0`, `t >= 5`  | `(0, (t - WAIT_OFFSET) / 2)`         |
//! | stop: `reps == 0`, `hp == 0` | `(0, 0)`                             |
//!
//! Wait timeouts lose their lowest bit to the two-tick polling loop.

use crate::error::EngineError;
use crate::program::{PATH_LENGTH, WAIT_LOOP_CYCLES, WAIT_MINIMUM, WAIT_OFFSET};

/// Size of one host instruction in a bulk load
pub const BULK_RECORD_SIZE: usize = 8;

/// Instruction in sequencer-native form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instruction {
    /// Pulse count, 0 for waits and stop
    pub reps: u32,
    /// Stored half period (pulse) or timeout counter (wait)
    pub half_period: u32,
}

/// Kind of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InstructionKind {
    Pulse,
    Wait,
    Stop,
}

impl Instruction {
    /// The terminating instruction
    pub const STOP: Self = Self {
        reps: 0,
        half_period: 0,
    };

    /// Instruction from stored words
    pub const fn from_words(reps: u32, half_period: u32) -> Self {
        Self { reps, half_period }
    }

    /// Stored words in FIFO order
    pub const fn words(self) -> [u32; 2] {
        [self.reps, self.half_period]
    }

    /// Classify by stored fields
    pub fn kind(self) -> InstructionKind {
        match (self.reps, self.half_period) {
            (0, 0) => InstructionKind::Stop,
            (0, _) => InstructionKind::Wait,
            _ => InstructionKind::Pulse,
        }
    }

    /// Check for the terminating instruction
    pub fn is_stop(self) -> bool {
        self.kind() == InstructionKind::Stop
    }

    /// Check for a wait
    pub fn is_wait(self) -> bool {
        self.kind() == InstructionKind::Wait
    }

    /// Encode a host instruction of any kind
    ///
    /// `reps == 0` selects a wait (or stop when `half_period_ticks` is 0).
    pub fn encode(half_period_ticks: u32, reps: u32) -> Result<Self, EngineError> {
        match (reps, half_period_ticks) {
            (0, 0) => Ok(encode_stop()),
            (0, timeout) => encode_wait(timeout),
            (reps, half_period) => encode_pulse(half_period, reps),
        }
    }

    /// Convert back to host units `(half_period_ticks, reps)`
    pub fn decode(self) -> (u32, u32) {
        decode(self)
    }
}

/// Encode a train of `reps` pulses with the given half period
pub fn encode_pulse(half_period_ticks: u32, reps: u32) -> Result<Instruction, EngineError> {
    if reps == 0 {
        return Err(EngineError::InvalidRequest);
    }
    if half_period_ticks < PATH_LENGTH {
        return Err(EngineError::HalfPeriodTooShort);
    }
    Ok(Instruction::from_words(reps, half_period_ticks - PATH_LENGTH))
}

/// Encode a wait for the trigger input, giving up after `timeout_ticks`
pub fn encode_wait(timeout_ticks: u32) -> Result<Instruction, EngineError> {
    if timeout_ticks < WAIT_MINIMUM {
        return Err(EngineError::InvalidRequest);
    }
    Ok(Instruction::from_words(
        0,
        (timeout_ticks - WAIT_OFFSET) / WAIT_LOOP_CYCLES,
    ))
}

/// Encode the terminating instruction
pub const fn encode_stop() -> Instruction {
    Instruction::STOP
}

/// Convert a stored instruction back to host units `(half_period_ticks, reps)`
///
/// Waits decode to the effective timeout, which is the requested timeout
/// rounded down to the polling grid.
pub fn decode(instruction: Instruction) -> (u32, u32) {
    match instruction.kind() {
        InstructionKind::Stop => (0, 0),
        InstructionKind::Wait => (
            instruction
                .half_period
                .saturating_mul(WAIT_LOOP_CYCLES)
                .saturating_add(WAIT_OFFSET),
            0,
        ),
        InstructionKind::Pulse => (
            instruction.half_period.saturating_add(PATH_LENGTH),
            instruction.reps,
        ),
    }
}

/// Outcome of a bulk load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BulkLoadReport {
    /// Instructions that encoded and were stored
    pub ok_count: u32,
    /// Waits rejected for a timeout below the minimum
    pub reps_errors: u32,
    /// Pulses rejected for a half period below the minimum
    pub half_period_errors: u32,
}

/// Encode packed little-endian `(reps, half_period_ticks)` records
///
/// `store` receives the record index and encoded instruction of every record
/// that passes validation. Rejected records are counted and skipped.
pub fn encode_bulk(
    bytes: &[u8],
    mut store: impl FnMut(usize, Instruction),
) -> Result<BulkLoadReport, EngineError> {
    if bytes.len() % BULK_RECORD_SIZE != 0 {
        return Err(EngineError::InvalidRequest);
    }

    let mut report = BulkLoadReport::default();
    for (index, record) in bytes.chunks_exact(BULK_RECORD_SIZE).enumerate() {
        let reps = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let half_period = u32::from_le_bytes([record[4], record[5], record[6], record[7]]);
        match Instruction::encode(half_period, reps) {
            Ok(instruction) => {
                store(index, instruction);
                report.ok_count += 1;
            }
            Err(_) if reps == 0 => report.reps_errors += 1,
            Err(_) => report.half_period_errors += 1,
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_pulse_subtracts_path_length() {
        let instr = encode_pulse(10, 3).unwrap();
        assert_eq!(instr.words(), [3, 4]);
        assert_eq!(instr.kind(), InstructionKind::Pulse);
        assert_eq!(decode(instr), (10, 3));
    }

    #[test]
    fn test_pulse_minimum() {
        assert_eq!(encode_pulse(6, 1).unwrap().words(), [1, 0]);
        assert_eq!(encode_pulse(5, 1), Err(EngineError::HalfPeriodTooShort));
        assert_eq!(encode_pulse(100, 0), Err(EngineError::InvalidRequest));
    }

    #[test]
    fn test_wait_encoding_rounds_down() {
        assert_eq!(encode_wait(5).unwrap().words(), [0, 1]);
        assert_eq!(encode_wait(6).unwrap().words(), [0, 1]);
        assert_eq!(encode_wait(7).unwrap().words(), [0, 2]);
        assert_eq!(decode(encode_wait(6).unwrap()), (5, 0));
        assert_eq!(decode(encode_wait(101).unwrap()), (101, 0));
    }

    #[test]
    fn test_wait_below_minimum_rejected() {
        for timeout in 0..WAIT_MINIMUM {
            assert_eq!(encode_wait(timeout), Err(EngineError::InvalidRequest));
        }
    }

    #[test]
    fn test_encode_dispatch() {
        assert_eq!(Instruction::encode(0, 0), Ok(Instruction::STOP));
        assert!(Instruction::encode(50, 0).unwrap().is_wait());
        assert_eq!(Instruction::encode(4, 0), Err(EngineError::InvalidRequest));
        assert_eq!(Instruction::encode(4, 2), Err(EngineError::HalfPeriodTooShort));
    }

    #[test]
    fn test_largest_values() {
        let wait = encode_wait(u32::MAX).unwrap();
        assert_eq!(decode(wait), (u32::MAX, 0));
        let pulse = encode_pulse(u32::MAX, u32::MAX).unwrap();
        assert_eq!(decode(pulse), (u32::MAX, u32::MAX));
    }

    fn record(reps: u32, half_period: u32) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&reps.to_le_bytes());
        bytes[4..].copy_from_slice(&half_period.to_le_bytes());
        bytes
    }

    #[test]
    fn test_bulk_counts_errors_and_skips_bad_records() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&record(2, 20));
        bytes.extend_from_slice(&record(0, 3));
        bytes.extend_from_slice(&record(5, 2));
        bytes.extend_from_slice(&record(0, 0));

        let mut stored = Vec::new();
        let report = encode_bulk(&bytes, |i, instr| stored.push((i, instr))).unwrap();
        assert_eq!(
            report,
            BulkLoadReport {
                ok_count: 2,
                reps_errors: 1,
                half_period_errors: 1,
            }
        );
        assert_eq!(stored, [(0, encode_pulse(20, 2).unwrap()), (3, Instruction::STOP)]);
    }

    #[test]
    fn test_bulk_rejects_partial_record() {
        let result = encode_bulk(&[0u8; 12], |_, _| {});
        assert_eq!(result, Err(EngineError::InvalidRequest));
        assert_eq!(encode_bulk(&[], |_, _| {}), Ok(BulkLoadReport::default()));
    }

    proptest! {
        #[test]
        fn prop_pulse_decodes_exactly(hp in PATH_LENGTH..=u32::MAX, reps in 1u32..) {
            let instr = encode_pulse(hp, reps).unwrap();
            prop_assert_eq!(decode(instr), (hp, reps));
            prop_assert!(!instr.is_stop());
        }

        #[test]
        fn prop_wait_never_collides_with_stop(t in WAIT_MINIMUM..=u32::MAX) {
            let instr = encode_wait(t).unwrap();
            prop_assert!(instr.is_wait());
            let (decoded, reps) = decode(instr);
            prop_assert_eq!(reps, 0);
            prop_assert!(decoded <= t && t - decoded < WAIT_LOOP_CYCLES);
        }
    }
}
