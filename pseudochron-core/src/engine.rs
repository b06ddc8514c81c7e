//! Control side of the engine
//!
//! [`Engine`] is shared between the control context (host commands) and
//! the sequencer context ([`crate::Sequencer`]). The control side never
//! waits for a run: it edits programs while idle, starts and aborts runs,
//! and reads status and wait results at any time.
//!
//! Program edits go through a [`ProgramEditor`], which can only be obtained
//! while no run is in progress and blocks `start` while it is alive.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use pseudochron_hal::{Level, ManualOutputs};

use crate::config::{ChannelPins, ConfigError, EngineConfig, PinError, PinTable, DEFAULT_TICK_HZ};
use crate::error::EngineError;
use crate::instruction::{self, Instruction};
use crate::status::{ClockStatus, RunEvent, RunStatus};
use crate::store::{InstructionStore, Layout, WaitStore};
use crate::MAX_CHANNELS;

pub use crate::instruction::BulkLoadReport;

#[derive(Debug, Clone, Copy)]
struct RunControl {
    status: RunStatus,
    editing: bool,
}

#[derive(Debug, Clone, Copy)]
struct ClockState {
    status: ClockStatus,
    tick_hz: u32,
}

/// Shared engine state
///
/// `WORDS` sizes the instruction store (two words per instruction plus one
/// terminator per channel) and `SLOTS` the wait store (one extra slot per
/// channel). See [`crate::Pseudoclock`] for the firmware sizing.
pub struct Engine<const WORDS: usize, const SLOTS: usize> {
    run: Mutex<CriticalSectionRawMutex, Cell<RunControl>>,
    clock: Mutex<CriticalSectionRawMutex, Cell<ClockState>>,
    layout: Mutex<CriticalSectionRawMutex, Cell<Layout>>,
    pins: Mutex<CriticalSectionRawMutex, Cell<PinTable>>,
    start: Channel<CriticalSectionRawMutex, bool, 1>,
    ready: Signal<CriticalSectionRawMutex, ()>,
    instructions: InstructionStore<WORDS>,
    waits: WaitStore<SLOTS>,
}

impl<const WORDS: usize, const SLOTS: usize> Default for Engine<WORDS, SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize, const SLOTS: usize> Engine<WORDS, SLOTS> {
    /// Idle engine: all channels active, empty programs, no pins assigned
    pub const fn new() -> Self {
        Self {
            run: Mutex::new(Cell::new(RunControl {
                status: RunStatus::Stopped,
                editing: false,
            })),
            clock: Mutex::new(Cell::new(ClockState {
                status: ClockStatus::Internal,
                tick_hz: DEFAULT_TICK_HZ,
            })),
            layout: Mutex::new(Cell::new(Layout::all_channels(
                InstructionStore::<WORDS>::CAPACITY,
                WaitStore::<SLOTS>::CAPACITY,
            ))),
            pins: Mutex::new(Cell::new(PinTable::new())),
            start: Channel::new(),
            ready: Signal::new(),
            instructions: InstructionStore::new(),
            waits: WaitStore::new(),
        }
    }

    // --- Status ---

    /// Run status and clock status
    pub fn status(&self) -> (RunStatus, ClockStatus) {
        (self.run_status(), self.clock.lock(|c| c.get().status))
    }

    /// Run status alone
    pub fn run_status(&self) -> RunStatus {
        self.run.lock(|c| c.get().status)
    }

    /// Record the clock source in use
    pub fn set_clock_status(&self, status: ClockStatus) {
        self.clock.lock(|c| {
            let mut clock = c.get();
            clock.status = status;
            c.set(clock);
        });
    }

    /// Sequencer tick rate
    pub fn tick_hz(&self) -> u32 {
        self.clock.lock(|c| c.get().tick_hz)
    }

    /// Record the sequencer tick rate
    pub fn set_tick_hz(&self, tick_hz: u32) {
        self.clock.lock(|c| {
            let mut clock = c.get();
            clock.tick_hz = tick_hz;
            c.set(clock);
        });
    }

    pub(crate) fn apply(&self, event: RunEvent) -> RunStatus {
        self.run.lock(|c| {
            let mut run = c.get();
            let next = run.status.transition(event);
            if next != run.status {
                debug!("run status {:?} -> {:?}", run.status, next);
            }
            run.status = next;
            c.set(run);
            next
        })
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.run_status() == RunStatus::AbortRequested
    }

    // --- Configuration ---

    /// Current channel layout
    pub fn layout(&self) -> Layout {
        self.layout.lock(|c| c.get())
    }

    /// Active channel count
    pub fn num_channels(&self) -> u8 {
        self.layout().num_channels()
    }

    /// Pin assignment of `channel`
    pub fn pins(&self, channel: u8) -> Result<ChannelPins, EngineError> {
        self.pin_table()
            .get(channel)
            .ok_or(EngineError::InvalidChannel)
    }

    pub(crate) fn pin_table(&self) -> PinTable {
        self.pins.lock(|c| c.get())
    }

    /// Snapshot of the configuration, for persisting
    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            num_channels: self.num_channels(),
            pins: self.pin_table(),
            tick_hz: self.tick_hz(),
            ..EngineConfig::new()
        }
    }

    // --- Stores ---

    /// Instruction store, read-only outside a [`ProgramEditor`]
    pub fn instructions(&self) -> &InstructionStore<WORDS> {
        &self.instructions
    }

    /// Wait result store
    pub fn waits(&self) -> &WaitStore<SLOTS> {
        &self.waits
    }

    /// Instruction at `address` of `channel`, in host units `(half_period, reps)`
    pub fn get_instruction(&self, channel: u8, address: usize) -> Result<(u32, u32), EngineError> {
        let layout = self.layout();
        self.instructions
            .get(&layout, channel, address)
            .map(Instruction::decode)
    }

    /// Result of wait `index` on `channel` from the current or last run
    ///
    /// Remaining timeout ticks when the trigger arrived, or
    /// [`crate::program::WAIT_TIMEOUT_SENTINEL`] on timeout.
    pub fn get_wait(&self, channel: u8, index: usize) -> Result<u32, EngineError> {
        let layout = self.layout();
        self.waits.get(&layout, channel, index)
    }

    // --- Editing ---

    /// Take the program editor
    ///
    /// Fails with [`EngineError::InvalidRunState`] during a run or while
    /// another editor is alive.
    pub fn edit(&self) -> Result<ProgramEditor<'_, WORDS, SLOTS>, EngineError> {
        self.run.lock(|c| {
            let mut run = c.get();
            if run.editing || !run.status.is_idle() {
                return Err(EngineError::InvalidRunState);
            }
            run.editing = true;
            c.set(run);
            Ok(ProgramEditor { engine: self })
        })
    }

    /// Store one instruction given in host units
    pub fn set_instruction(
        &self,
        channel: u8,
        address: usize,
        half_period: u32,
        reps: u32,
    ) -> Result<(), EngineError> {
        self.edit()?
            .set_instruction(channel, address, half_period, reps)
    }

    /// Store packed `(reps, half_period)` records starting at `address`
    pub fn set_instructions_bulk(
        &self,
        channel: u8,
        address: usize,
        bytes: &[u8],
    ) -> Result<BulkLoadReport, EngineError> {
        self.edit()?.set_instructions_bulk(channel, address, bytes)
    }

    /// Change the active channel count, clearing every program
    pub fn set_num_channels(&self, num_channels: u8) -> Result<(), EngineError> {
        self.edit()?.set_num_channels(num_channels)
    }

    /// Assign the output pin of `channel`
    pub fn set_out_pin(&self, channel: u8, pin: u8) -> Result<(), EngineError> {
        self.edit()?.set_out_pin(channel, pin)
    }

    /// Assign the trigger input pin of `channel`
    pub fn set_in_pin(&self, channel: u8, pin: u8) -> Result<(), EngineError> {
        self.edit()?.set_in_pin(channel, pin)
    }

    // --- Run control ---

    /// Start a run
    ///
    /// Drives every assigned output low and hands the run to the sequencer.
    /// Returns as soon as the sequencer has been signalled.
    pub fn start(
        &self,
        hardware_trigger: bool,
        outputs: &mut impl ManualOutputs,
    ) -> Result<(), EngineError> {
        let previous = self.run.lock(|c| {
            let mut run = c.get();
            if run.editing || !run.status.is_idle() {
                return Err(EngineError::InvalidRunState);
            }
            let previous = run.status;
            run.status = run.status.transition(RunEvent::StartRequested);
            c.set(run);
            Ok(previous)
        })?;

        self.waits.reset_progress();
        self.drive_outputs_low(outputs);

        if self.start.try_send(hardware_trigger).is_err() {
            warn!("start signal still pending, sequencer not consuming");
            self.run.lock(|c| {
                let mut run = c.get();
                run.status = previous;
                c.set(run);
            });
            return Err(EngineError::InvalidRunState);
        }
        info!("run requested, hardware trigger {}", hardware_trigger);
        Ok(())
    }

    /// Request an abort of the current run
    ///
    /// Drives every assigned output low right away. The sequencer notices on
    /// its next poll and tears the run down; this does not wait for that.
    /// Repeated calls while an abort is under way do nothing.
    pub fn abort(&self, outputs: &mut impl ManualOutputs) -> Result<(), EngineError> {
        let requested = self.run.lock(|c| {
            let mut run = c.get();
            match run.status {
                RunStatus::TransitionToRunning | RunStatus::Running => {
                    run.status = run.status.transition(RunEvent::AbortRequested);
                    c.set(run);
                    Ok(true)
                }
                status if status.is_aborting() => Ok(false),
                _ => Err(EngineError::InvalidRunState),
            }
        })?;

        if requested {
            self.drive_outputs_low(outputs);
            info!("abort requested");
        }
        Ok(())
    }

    /// Drive the output of `channel` by software, outside a run
    pub fn force_output(
        &self,
        channel: u8,
        level: Level,
        outputs: &mut impl ManualOutputs,
    ) -> Result<(), EngineError> {
        if !self.run_status().is_idle() {
            return Err(EngineError::InvalidRunState);
        }
        self.layout().check_channel(channel)?;
        let pin = self
            .pins(channel)?
            .out_pin
            .ok_or(EngineError::InvalidPin(PinError::Unassigned))?;
        outputs.drive(pin, level);
        Ok(())
    }

    fn drive_outputs_low(&self, outputs: &mut impl ManualOutputs) {
        let pins = self.pin_table();
        for channel in 0..self.num_channels() {
            if let Some(pin) = pins.get(channel).and_then(|p| p.out_pin) {
                outputs.set_low(pin);
            }
        }
    }

    // --- Sequencer handshake ---

    /// Wait for the next start request, returning its hardware-trigger flag
    pub async fn wait_for_start(&self) -> bool {
        self.start.receive().await
    }

    /// Tell the control side the sequencer is up
    pub fn announce_ready(&self) {
        self.ready.signal(());
    }

    /// Wait for [`Engine::announce_ready`]
    pub async fn wait_ready(&self) {
        self.ready.wait().await
    }
}

/// Exclusive access to programs and pin assignment
///
/// Only handed out while the engine is idle; `start` is refused until it is
/// dropped.
pub struct ProgramEditor<'e, const WORDS: usize, const SLOTS: usize> {
    engine: &'e Engine<WORDS, SLOTS>,
}

impl<const WORDS: usize, const SLOTS: usize> ProgramEditor<'_, WORDS, SLOTS> {
    /// Change the active channel count, clearing every program
    pub fn set_num_channels(&mut self, num_channels: u8) -> Result<(), EngineError> {
        let layout = Layout::new(
            num_channels,
            InstructionStore::<WORDS>::CAPACITY,
            WaitStore::<SLOTS>::CAPACITY,
        )?;
        self.engine.instructions.clear();
        self.engine.waits.clear();
        self.engine.waits.reset_progress();
        self.engine.layout.lock(|c| c.set(layout));
        debug!(
            "{} channels, {} instructions each",
            num_channels,
            layout.instruction_capacity()
        );
        Ok(())
    }

    /// Store one instruction given in host units
    pub fn set_instruction(
        &mut self,
        channel: u8,
        address: usize,
        half_period: u32,
        reps: u32,
    ) -> Result<(), EngineError> {
        let layout = self.engine.layout();
        let store = &self.engine.instructions;
        store.check_range(&layout, channel, address, 1)?;
        let instruction = Instruction::encode(half_period, reps)?;
        store.set(&layout, channel, address, instruction)
    }

    /// Store packed `(reps, half_period)` records starting at `address`
    ///
    /// The whole range is checked up front. Records that fail validation
    /// are counted in the report and leave their slot untouched.
    pub fn set_instructions_bulk(
        &mut self,
        channel: u8,
        address: usize,
        bytes: &[u8],
    ) -> Result<BulkLoadReport, EngineError> {
        if bytes.len() % instruction::BULK_RECORD_SIZE != 0 {
            return Err(EngineError::InvalidRequest);
        }
        let layout = self.engine.layout();
        let store = &self.engine.instructions;
        let count = bytes.len() / instruction::BULK_RECORD_SIZE;
        store.check_range(&layout, channel, address, count)?;

        let mut written = Ok(());
        let report = instruction::encode_bulk(bytes, |index, instruction| {
            if written.is_ok() {
                written = store.set(&layout, channel, address + index, instruction);
            }
        })?;
        written?;

        if report.reps_errors + report.half_period_errors > 0 {
            warn!(
                "bulk load: {} rejected waits, {} rejected pulses",
                report.reps_errors,
                report.half_period_errors
            );
        }
        Ok(report)
    }

    /// Assign the output pin of `channel`
    pub fn set_out_pin(&mut self, channel: u8, pin: u8) -> Result<(), EngineError> {
        self.update_pins(channel, |table| table.set_out(channel, pin))
    }

    /// Assign the trigger input pin of `channel`
    pub fn set_in_pin(&mut self, channel: u8, pin: u8) -> Result<(), EngineError> {
        self.update_pins(channel, |table| table.set_in(channel, pin))
    }

    fn update_pins(
        &mut self,
        channel: u8,
        f: impl FnOnce(&mut PinTable) -> Result<(), PinError>,
    ) -> Result<(), EngineError> {
        if channel as usize >= MAX_CHANNELS {
            return Err(EngineError::InvalidChannel);
        }
        self.engine.pins.lock(|c| {
            let mut table = c.get();
            f(&mut table)?;
            c.set(table);
            Ok(())
        })
    }

    /// Apply a stored configuration
    ///
    /// Changing the channel count clears every program, as
    /// [`ProgramEditor::set_num_channels`] does.
    pub fn apply_config(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        config.validate().map_err(|err| match err {
            ConfigError::InvalidPins(pin) => EngineError::InvalidPin(pin),
            _ => EngineError::InvalidRequest,
        })?;
        if config.num_channels != self.engine.num_channels() {
            self.set_num_channels(config.num_channels)?;
        }
        self.engine.pins.lock(|c| c.set(config.pins));
        self.engine.set_tick_hz(config.tick_hz);
        Ok(())
    }
}

impl<const WORDS: usize, const SLOTS: usize> Drop for ProgramEditor<'_, WORDS, SLOTS> {
    fn drop(&mut self) {
        self.engine.run.lock(|c| {
            let mut run = c.get();
            run.editing = false;
            c.set(run);
        });
    }
}
