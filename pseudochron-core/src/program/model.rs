//! Cycle-accurate model of the sequencer program
//!
//! The program is kept as a table of instructions in the same order and at
//! the same addresses as the assembled PIO program. One call to
//! [`ProgramModel::step`] is one execution unit clock cycle:
//!
//! - side-set takes effect in the cycle the instruction issues
//! - a stalled `pull`, `push` or `wait` retries next cycle without advancing
//! - delay cycles run after the instruction completes
//! - `jmp x--` / `jmp y--` test the register before decrementing it

use super::{ENTRY_AWAIT_TRIGGER, PROGRAM_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Pull,
    Push,
    MovXOsr,
    MovYOsr,
    MovIsrX,
    Nop,
    Jmp(u8),
    JmpNotX(u8),
    JmpNotY(u8),
    JmpXDec(u8),
    JmpYDec(u8),
    JmpPin(u8),
    WaitPinHigh,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    op: Op,
    side: Option<bool>,
    delay: u8,
}

const fn op(op: Op) -> Slot {
    Slot {
        op,
        side: None,
        delay: 0,
    }
}

const fn side(op: Op, level: bool) -> Slot {
    Slot {
        op,
        side: Some(level),
        delay: 0,
    }
}

const fn delayed(slot: Slot, delay: u8) -> Slot {
    Slot {
        op: slot.op,
        side: slot.side,
        delay,
    }
}

const PULSE_START: u8 = 4;
const PULSE_RELOAD: u8 = 5;
const HIGH_LOOP: u8 = 6;
const LOW_LOOP: u8 = 8;
const CONTINUE_REPS: u8 = 14;
const WAIT_ENTRY: u8 = 16;
const WAIT_LOOP: u8 = 19;
const WAIT_DONE: u8 = 21;
const AFTER_WAIT: u8 = 23;
const INDEFINITE_WAIT: u8 = ENTRY_AWAIT_TRIGGER;

#[rustfmt::skip]
const PROGRAM: [Slot; PROGRAM_LEN] = [
    // start
    op(Op::Pull),
    op(Op::MovYOsr),
    op(Op::JmpNotY(WAIT_ENTRY)),
    side(Op::JmpYDec(PULSE_START), true),
    // pulse_start
    op(Op::Pull),
    // pulse_reload
    delayed(op(Op::MovXOsr), 2),
    // high_loop
    op(Op::JmpXDec(HIGH_LOOP)),
    side(Op::MovXOsr, false),
    // low_loop
    op(Op::JmpXDec(LOW_LOOP)),
    op(Op::JmpYDec(CONTINUE_REPS)),
    op(Op::Pull),
    op(Op::MovYOsr),
    op(Op::JmpNotY(WAIT_ENTRY)),
    side(Op::JmpYDec(PULSE_START), true),
    // continue_reps
    delayed(op(Op::Nop), 2),
    delayed(side(Op::Jmp(PULSE_RELOAD), true), 1),
    // wait_entry
    op(Op::Pull),
    op(Op::MovXOsr),
    op(Op::JmpNotX(WAIT_DONE)),
    // wait_loop
    op(Op::JmpPin(WAIT_DONE)),
    op(Op::JmpXDec(WAIT_LOOP)),
    // wait_done
    op(Op::MovIsrX),
    op(Op::Push),
    // after_wait
    op(Op::Pull),
    op(Op::MovYOsr),
    op(Op::JmpNotY(INDEFINITE_WAIT)),
    side(Op::JmpYDec(PULSE_START), true),
    // indefinite_wait
    op(Op::Pull),
    op(Op::MovXOsr),
    op(Op::JmpNotX(WAIT_DONE)),
    op(Op::WaitPinHigh),
    op(Op::Jmp(AFTER_WAIT)),
];

/// FIFOs and trigger input seen by one execution unit
pub trait UnitIo {
    /// Take the next word from the instruction FIFO
    fn pull(&mut self) -> Option<u32>;

    /// Append a word to the result FIFO, returning false if it is full
    fn push(&mut self, word: u32) -> bool;

    /// Current level of the trigger input
    fn trigger(&self) -> bool;
}

/// Outcome of one clock cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// An instruction or delay cycle completed
    Executed,
    /// Blocked on a FIFO or the trigger input
    Stalled,
    /// The program has reached its stop instruction
    Stopped,
}

/// Where in the program a unit currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Enabled but no instruction has completed yet
    Init,
    /// Fetching the repetition count of a new instruction
    LoadReps,
    /// Raising the output for the first pulse of an instruction
    ShortStart,
    /// Untimed wait for the trigger after a wait
    IndefiniteWaitPrelude,
    /// Output high, counting down the half period
    PulseHigh,
    /// Output low, counting down the half period
    PulseLow,
    /// Deciding whether the instruction has pulses left
    CheckReps,
    /// Fetching the next instruction's repetition count after a pulse train
    LoadNextReps,
    /// Fetching the timeout of a timed wait
    Wait,
    /// Polling the trigger input
    WaitLoop,
    /// Reporting the wait result
    WaitDone,
    /// Stop instruction reached
    Stop,
}

impl Phase {
    fn at(pc: u8) -> Self {
        match pc {
            0..=2 | 23..=25 => Phase::LoadReps,
            3 | 26 => Phase::ShortStart,
            4..=6 => Phase::PulseHigh,
            7..=8 => Phase::PulseLow,
            9 | 14 | 15 => Phase::CheckReps,
            10..=13 => Phase::LoadNextReps,
            16..=18 => Phase::Wait,
            19..=20 => Phase::WaitLoop,
            21..=22 => Phase::WaitDone,
            _ => Phase::IndefiniteWaitPrelude,
        }
    }
}

/// Register-level state of one execution unit
#[derive(Debug, Clone)]
pub struct ProgramModel {
    pc: u8,
    x: u32,
    y: u32,
    osr: u32,
    isr: u32,
    delay: u8,
    output: bool,
    started: bool,
    stopping: bool,
    stopped: bool,
    cycles: u64,
}

impl ProgramModel {
    /// Unit about to start at program address `entry`, output low
    pub fn new(entry: u8) -> Self {
        Self {
            pc: entry,
            x: 0,
            y: 0,
            osr: 0,
            isr: 0,
            delay: 0,
            output: false,
            started: false,
            stopping: false,
            stopped: false,
            cycles: 0,
        }
    }

    /// Run one clock cycle
    pub fn step(&mut self, io: &mut impl UnitIo) -> Step {
        if self.stopped {
            return Step::Stopped;
        }
        self.cycles += 1;

        if self.delay > 0 {
            self.delay -= 1;
            return Step::Executed;
        }

        let slot = PROGRAM[self.pc as usize];
        if let Some(level) = slot.side {
            self.output = level;
        }

        let mut next = self.pc + 1;
        match slot.op {
            Op::Pull => match io.pull() {
                Some(word) => self.osr = word,
                None => return Step::Stalled,
            },
            Op::Push => {
                if !io.push(self.isr) {
                    return Step::Stalled;
                }
                self.isr = 0;
                if self.stopping {
                    self.stopped = true;
                    return Step::Stopped;
                }
            }
            Op::MovXOsr => self.x = self.osr,
            Op::MovYOsr => self.y = self.osr,
            Op::MovIsrX => self.isr = self.x,
            Op::Nop => {}
            Op::Jmp(target) => next = target,
            Op::JmpNotX(target) => {
                if self.x == 0 {
                    // Zero timeout: the stop instruction
                    self.stopping = true;
                    next = target;
                }
            }
            Op::JmpNotY(target) => {
                if self.y == 0 {
                    next = target;
                }
            }
            Op::JmpXDec(target) => {
                if self.x != 0 {
                    next = target;
                }
                self.x = self.x.wrapping_sub(1);
            }
            Op::JmpYDec(target) => {
                if self.y != 0 {
                    next = target;
                }
                self.y = self.y.wrapping_sub(1);
            }
            Op::JmpPin(target) => {
                if io.trigger() {
                    next = target;
                }
            }
            Op::WaitPinHigh => {
                if !io.trigger() {
                    return Step::Stalled;
                }
            }
        }

        self.started = true;
        self.delay = slot.delay;
        self.pc = next;
        Step::Executed
    }

    /// Current level of the side-set output
    pub fn output(&self) -> bool {
        self.output
    }

    /// Program address of the next instruction
    pub fn pc(&self) -> u8 {
        self.pc
    }

    /// Cycles run since the unit was enabled
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Check if the stop instruction has completed
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Current program phase
    pub fn phase(&self) -> Phase {
        if self.stopped {
            Phase::Stop
        } else if !self.started {
            Phase::Init
        } else {
            Phase::at(self.pc)
        }
    }
}
