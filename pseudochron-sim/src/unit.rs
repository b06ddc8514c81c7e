//! One simulated execution unit

use heapless::Deque;
use pseudochron_core::program::{ProgramModel, Step, UnitIo};
use pseudochron_hal::UnitConfig;

use crate::FIFO_DEPTH;

/// Word FIFO between a unit and its streams
pub type Fifo = Deque<u32, FIFO_DEPTH>;

/// FIFO view handed to the program model for one cycle
struct Ports<'s> {
    tx: &'s mut Fifo,
    rx: &'s mut Fifo,
    trigger: bool,
}

impl UnitIo for Ports<'_> {
    fn pull(&mut self) -> Option<u32> {
        self.tx.pop_front()
    }

    fn push(&mut self, word: u32) -> bool {
        self.rx.push_back(word).is_ok()
    }

    fn trigger(&self) -> bool {
        self.trigger
    }
}

/// Execution unit state
#[derive(Debug, Default)]
pub struct SimUnit {
    pub(crate) claimed: bool,
    pub(crate) config: Option<UnitConfig>,
    pub(crate) model: Option<ProgramModel>,
    pub(crate) tx: Fifo,
    pub(crate) rx: Fifo,
    /// Output edges as (cycles since enable, level)
    pub(crate) edges: Vec<(u64, bool)>,
}

impl SimUnit {
    /// Return to the just-initialized state: disabled, FIFOs empty, output low
    pub(crate) fn reset(&mut self, config: UnitConfig) {
        self.config = Some(config);
        self.model = None;
        self.tx.clear();
        self.rx.clear();
        self.edges.clear();
    }

    /// Start executing at `entry` (relative to the program start)
    pub(crate) fn enable(&mut self, entry: u8) {
        self.model = Some(ProgramModel::new(entry));
    }

    pub(crate) fn disable(&mut self) {
        self.model = None;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    /// Run one cycle, `elapsed` cycles after the synchronized enable
    pub(crate) fn step(&mut self, elapsed: u64, trigger: bool) {
        let Some(model) = self.model.as_mut() else {
            return;
        };
        let before = model.output();
        let mut ports = Ports {
            tx: &mut self.tx,
            rx: &mut self.rx,
            trigger,
        };
        if model.step(&mut ports) == Step::Stopped {
            return;
        }
        if model.output() != before {
            self.edges.push((elapsed, model.output()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pseudochron_core::instruction::{encode_pulse, encode_stop};
    use pseudochron_core::program::{Phase, ENTRY_START, STOP_COMPLETION_WORD};

    fn config() -> UnitConfig {
        UnitConfig {
            out_pin: 0,
            in_pin: 1,
            initial_pc: 0,
        }
    }

    #[test]
    fn test_disabled_unit_does_nothing() {
        let mut unit = SimUnit::default();
        unit.reset(config());
        unit.tx.push_back(1).unwrap();
        unit.step(0, false);
        assert_eq!(unit.tx.len(), 1);
        assert!(!unit.is_enabled());
    }

    #[test]
    fn test_runs_program_from_fifo() {
        let mut unit = SimUnit::default();
        unit.reset(config());
        for word in encode_pulse(10, 1).unwrap().words() {
            unit.tx.push_back(word).unwrap();
        }
        for word in encode_stop().words() {
            unit.tx.push_back(word).unwrap();
        }
        unit.enable(ENTRY_START);
        for cycle in 0..100 {
            unit.step(cycle, false);
        }
        assert_eq!(unit.edges.len(), 2);
        assert_eq!(unit.edges[1].0 - unit.edges[0].0, 10);
        assert_eq!(unit.rx.pop_front(), Some(STOP_COMPLETION_WORD));
        assert_eq!(unit.model.as_ref().map(|m| m.phase()), Some(Phase::Stop));
    }
}
