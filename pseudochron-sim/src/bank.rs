//! Simulated execution-unit pool and streaming channels

use std::cell::RefCell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::Ordering;
use pseudochron_core::program::Phase;
use pseudochron_hal::{Endpoint, ExecutionUnits, HalError, StreamingChannel, UnitConfig};

use crate::unit::SimUnit;
use crate::{CYCLES_PER_POLL, SIM_STREAMS, SIM_UNITS};

/// Pool operations in the order they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Claimed(u8),
    Initialized(u8, UnitConfig),
    Preloaded(u8, u32),
    Enabled(u8),
    DrainedTx(u8),
    DrainedRx(u8),
    Released(u8),
}

struct Transfer<'a> {
    source: Endpoint<'a>,
    dest: Endpoint<'a>,
    moved: usize,
    remaining: u32,
}

#[derive(Default)]
struct StreamSlot<'a> {
    claimed: bool,
    transfer: Option<Transfer<'a>>,
}

/// Trigger input held high for `start..end` cycles after the enable
#[derive(Debug, Clone, Copy)]
struct TriggerPulse {
    pin: u8,
    start: u64,
    end: u64,
}

struct SimState<'a> {
    units: [SimUnit; SIM_UNITS],
    streams: [StreamSlot<'a>; SIM_STREAMS],
    triggers: Vec<TriggerPulse>,
    events: Vec<SimEvent>,
    /// Cycles since the last synchronized enable
    elapsed: u64,
}

impl<'a> SimState<'a> {
    fn new() -> Self {
        Self {
            units: Default::default(),
            streams: Default::default(),
            triggers: Vec::new(),
            events: Vec::new(),
            elapsed: 0,
        }
    }

    fn trigger_level(&self, pin: u8) -> bool {
        self.triggers
            .iter()
            .any(|t| t.pin == pin && (t.start..t.end).contains(&self.elapsed))
    }

    /// Let every transfer move at most one word; returns whether any did
    fn move_words(&mut self) -> bool {
        let mut moved_any = false;
        for slot in self.streams.iter_mut() {
            let Some(transfer) = slot.transfer.as_mut() else {
                continue;
            };
            if transfer.remaining == 0 {
                continue;
            }

            let dest_ready = match transfer.dest {
                Endpoint::Memory(words) => transfer.moved < words.len(),
                Endpoint::UnitTx(unit) => self
                    .units
                    .get(unit as usize)
                    .is_some_and(|u| !u.tx.is_full()),
                Endpoint::UnitRx(_) => false,
            };
            if !dest_ready {
                continue;
            }

            let word = match transfer.source {
                Endpoint::Memory(words) => words
                    .get(transfer.moved)
                    .map(|w| w.load(Ordering::Relaxed)),
                Endpoint::UnitRx(unit) => self
                    .units
                    .get_mut(unit as usize)
                    .and_then(|u| u.rx.pop_front()),
                Endpoint::UnitTx(_) => None,
            };
            let Some(word) = word else {
                continue;
            };

            match transfer.dest {
                Endpoint::Memory(words) => {
                    if let Some(slot) = words.get(transfer.moved) {
                        slot.store(word, Ordering::Relaxed);
                    }
                }
                Endpoint::UnitTx(unit) => {
                    if let Some(u) = self.units.get_mut(unit as usize) {
                        let _ = u.tx.push_back(word);
                    }
                }
                Endpoint::UnitRx(_) => {}
            }
            transfer.moved += 1;
            transfer.remaining -= 1;
            moved_any = true;
        }
        moved_any
    }

    /// Move words until every transfer is blocked, without running units
    fn settle(&mut self) {
        while self.move_words() {}
    }

    fn advance(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.move_words();
            let triggers: [bool; SIM_UNITS] = core::array::from_fn(|i| {
                self.units[i]
                    .config
                    .is_some_and(|c| self.trigger_level(c.in_pin))
            });
            let elapsed = self.elapsed;
            for (unit, trigger) in self.units.iter_mut().zip(triggers) {
                unit.step(elapsed, trigger);
            }
            self.elapsed += 1;
        }
    }
}

type Shared<'a> = Arc<Mutex<CriticalSectionRawMutex, RefCell<SimState<'a>>>>;

fn with<'a, R>(shared: &Shared<'a>, f: impl FnOnce(&mut SimState<'a>) -> R) -> R {
    shared.lock(|cell| f(&mut cell.borrow_mut()))
}

/// Simulated execution-unit pool
///
/// Owned by the sequencer; tests observe it through a [`SimHandle`].
pub struct SimBank<'a> {
    shared: Shared<'a>,
    program_offset: u8,
}

impl Default for SimBank<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SimBank<'a> {
    /// Pool with the program loaded at address 0
    pub fn new() -> Self {
        Self::with_program_offset(0)
    }

    /// Pool with the program loaded at `program_offset`
    pub fn with_program_offset(program_offset: u8) -> Self {
        Self {
            shared: Arc::new(Mutex::new(RefCell::new(SimState::new()))),
            program_offset,
        }
    }

    /// Observer sharing this pool's state
    pub fn handle(&self) -> SimHandle<'a> {
        SimHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<'a> ExecutionUnits<'a> for SimBank<'a> {
    type Stream = SimStream<'a>;

    fn program_offset(&self) -> u8 {
        self.program_offset
    }

    fn claim_unit(&mut self, unit: u8) -> Result<(), HalError> {
        with(&self.shared, |s| {
            let u = s
                .units
                .get_mut(unit as usize)
                .ok_or(HalError::NoFreeUnit)?;
            if u.claimed {
                return Err(HalError::NoFreeUnit);
            }
            u.claimed = true;
            s.events.push(SimEvent::Claimed(unit));
            Ok(())
        })
    }

    fn init_unit(&mut self, unit: u8, config: UnitConfig) {
        with(&self.shared, |s| {
            if let Some(u) = s.units.get_mut(unit as usize) {
                u.reset(config);
                s.events.push(SimEvent::Initialized(unit, config));
            }
        });
    }

    fn push_blocking(&mut self, unit: u8, word: u32) {
        with(&self.shared, |s| loop {
            let Some(u) = s.units.get_mut(unit as usize) else {
                return;
            };
            if u.tx.push_back(word).is_ok() {
                s.events.push(SimEvent::Preloaded(unit, word));
                return;
            }
            // A disabled unit never frees space
            if !u.is_enabled() {
                return;
            }
            s.advance(1);
        });
    }

    fn claim_stream(&mut self) -> Result<SimStream<'a>, HalError> {
        let id = with(&self.shared, |s| {
            let (id, slot) = s
                .streams
                .iter_mut()
                .enumerate()
                .find(|(_, slot)| !slot.claimed)
                .ok_or(HalError::NoFreeStream)?;
            slot.claimed = true;
            slot.transfer = None;
            Ok(id)
        })?;
        Ok(SimStream {
            id,
            shared: self.shared.clone(),
        })
    }

    fn release_stream(&mut self, stream: SimStream<'a>) {
        with(&self.shared, |s| {
            if let Some(slot) = s.streams.get_mut(stream.id) {
                slot.claimed = false;
                slot.transfer = None;
            }
        });
    }

    fn enable_in_sync(&mut self, mask: u8) {
        let offset = self.program_offset;
        with(&self.shared, |s| {
            s.elapsed = 0;
            for (index, unit) in s.units.iter_mut().enumerate() {
                if mask & (1 << index) == 0 {
                    continue;
                }
                if let Some(config) = unit.config {
                    unit.enable(config.initial_pc.wrapping_sub(offset));
                }
            }
            s.events.push(SimEvent::Enabled(mask));
        });
    }

    fn drain_tx(&mut self, unit: u8) {
        with(&self.shared, |s| {
            if let Some(u) = s.units.get_mut(unit as usize) {
                u.tx.clear();
                s.events.push(SimEvent::DrainedTx(unit));
            }
        });
    }

    fn drain_rx(&mut self, unit: u8) {
        with(&self.shared, |s| {
            if let Some(u) = s.units.get_mut(unit as usize) {
                u.rx.clear();
                s.events.push(SimEvent::DrainedRx(unit));
            }
        });
    }

    fn release_unit(&mut self, unit: u8) {
        with(&self.shared, |s| {
            if let Some(u) = s.units.get_mut(unit as usize) {
                u.disable();
                u.claimed = false;
                s.events.push(SimEvent::Released(unit));
            }
        });
    }

    fn free_units(&self) -> usize {
        with(&self.shared, |s| s.units.iter().filter(|u| !u.claimed).count())
    }

    fn free_streams(&self) -> usize {
        with(&self.shared, |s| s.streams.iter().filter(|t| !t.claimed).count())
    }
}

/// Simulated streaming channel
///
/// Every status query advances the whole simulation by
/// [`CYCLES_PER_POLL`] cycles.
pub struct SimStream<'a> {
    id: usize,
    shared: Shared<'a>,
}

impl<'a> StreamingChannel<'a> for SimStream<'a> {
    fn configure(&mut self, source: Endpoint<'a>, dest: Endpoint<'a>, count: u32) {
        with(&self.shared, |s| {
            if let Some(slot) = s.streams.get_mut(self.id) {
                slot.transfer = Some(Transfer {
                    source,
                    dest,
                    moved: 0,
                    remaining: count,
                });
            }
            s.settle();
        });
    }

    fn is_busy(&self) -> bool {
        self.remaining() > 0
    }

    fn remaining(&self) -> u32 {
        with(&self.shared, |s| {
            s.advance(CYCLES_PER_POLL);
            s.streams
                .get(self.id)
                .and_then(|slot| slot.transfer.as_ref())
                .map_or(0, |t| t.remaining)
        })
    }

    fn abort(&mut self) {
        with(&self.shared, |s| {
            if let Some(slot) = s.streams.get_mut(self.id) {
                slot.transfer = None;
            }
        });
    }
}

/// Test-side view of a [`SimBank`]
#[derive(Clone)]
pub struct SimHandle<'a> {
    shared: Shared<'a>,
}

impl SimHandle<'_> {
    /// Hold input `pin` high for `length` cycles, starting `start` cycles
    /// after the next (or current) synchronized enable
    pub fn trigger_pulse(&self, pin: u8, start: u64, length: u64) {
        with(&self.shared, |s| {
            s.triggers.push(TriggerPulse {
                pin,
                start,
                end: start + length,
            })
        });
    }

    /// Output edges of `unit` as (cycles since enable, level)
    pub fn edges(&self, unit: u8) -> Vec<(u64, bool)> {
        with(&self.shared, |s| {
            s.units
                .get(unit as usize)
                .map(|u| u.edges.clone())
                .unwrap_or_default()
        })
    }

    /// Pool operations so far
    pub fn events(&self) -> Vec<SimEvent> {
        with(&self.shared, |s| s.events.clone())
    }

    /// Program phase of `unit`, if it is enabled
    pub fn phase(&self, unit: u8) -> Option<Phase> {
        with(&self.shared, |s| {
            s.units
                .get(unit as usize)
                .and_then(|u| u.model.as_ref())
                .map(|m| m.phase())
        })
    }

    /// Cycles since the last synchronized enable
    pub fn elapsed(&self) -> u64 {
        with(&self.shared, |s| s.elapsed)
    }

    /// Unclaimed execution units
    pub fn free_units(&self) -> usize {
        with(&self.shared, |s| s.units.iter().filter(|u| !u.claimed).count())
    }

    /// Unclaimed streaming channels
    pub fn free_streams(&self) -> usize {
        with(&self.shared, |s| s.streams.iter().filter(|t| !t.claimed).count())
    }
}
