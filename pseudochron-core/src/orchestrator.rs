//! Channel orchestration
//!
//! Sets up one run across all active channels: claims an execution unit
//! and two streaming channels per channel, points the streams at the
//! channel's store regions, starts every unit together and releases
//! everything again afterwards.
//!
//! Each channel uses two streams:
//!
//! ```text
//! instruction region ──(instruction stream)──► unit TX FIFO
//! wait region        ◄──(result stream)─────── unit RX FIFO
//! ```

use pseudochron_hal::{Endpoint, ExecutionUnits, StreamingChannel, UnitConfig};

use crate::config::ChannelPins;
use crate::error::EngineError;
use crate::program::{ENTRY_AWAIT_TRIGGER, ENTRY_START, HW_START_WORD};
use crate::store::{InstructionStore, Layout, WaitStore};
use crate::MAX_CHANNELS;

/// Resources held by one channel during a run
struct ChannelSlot<S> {
    unit_claimed: bool,
    instructions: Option<S>,
    results: Option<S>,
    waits_to_send: u32,
}

impl<S> ChannelSlot<S> {
    const fn new() -> Self {
        Self {
            unit_claimed: false,
            instructions: None,
            results: None,
            waits_to_send: 0,
        }
    }
}

/// Per-run channel bookkeeping
pub struct Orchestrator<S> {
    layout: Layout,
    slots: [ChannelSlot<S>; MAX_CHANNELS],
    active: u8,
}

impl<S> Orchestrator<S> {
    /// Orchestrator for a run with the given channel layout
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            slots: [const { ChannelSlot::new() }; MAX_CHANNELS],
            active: 0,
        }
    }

    /// Bit mask of configured channels (bit n = channel n)
    pub fn active_mask(&self) -> u8 {
        self.active
    }

    /// Check if `channel` was configured for this run
    pub fn is_active(&self, channel: u8) -> bool {
        self.active & (1 << channel) != 0
    }
}

impl<'a, S: StreamingChannel<'a>> Orchestrator<S> {
    /// Prepare `channel` for the run
    ///
    /// Returns `Ok(false)` for a channel whose program is a lone stop; it
    /// takes no resources and stays idle. On error, whatever was claimed so
    /// far stays recorded so [`Orchestrator::teardown`] can release it.
    pub fn configure<B, const WORDS: usize, const SLOTS: usize>(
        &mut self,
        units: &mut B,
        instructions: &'a InstructionStore<WORDS>,
        waits: &'a WaitStore<SLOTS>,
        channel: u8,
        pins: ChannelPins,
        hardware_trigger: bool,
    ) -> Result<bool, EngineError>
    where
        B: ExecutionUnits<'a, Stream = S>,
    {
        let layout = self.layout;
        layout.check_channel(channel)?;

        waits.clear_channel(&layout, channel);
        let extent = instructions.scan(&layout, channel, hardware_trigger)?;
        waits.schedule(channel, extent.reported_waits() as u32);
        if extent.is_empty() {
            debug!("channel {}: empty program, inactive", channel);
            return Ok(false);
        }
        let pins = pins.resolve()?;

        let slot = &mut self.slots[channel as usize];
        units.claim_unit(channel)?;
        slot.unit_claimed = true;

        let entry = if hardware_trigger {
            ENTRY_AWAIT_TRIGGER
        } else {
            ENTRY_START
        };
        units.init_unit(
            channel,
            UnitConfig {
                out_pin: pins.out_pin,
                in_pin: pins.in_pin,
                initial_pc: units.program_offset() + entry,
            },
        );
        if hardware_trigger {
            units.push_blocking(channel, HW_START_WORD);
        }

        let stream = slot.instructions.insert(units.claim_stream()?);
        stream.configure(
            Endpoint::Memory(instructions.program_words(&layout, channel, extent.words)),
            Endpoint::UnitTx(channel),
            extent.words as u32,
        );

        let stream = slot.results.insert(units.claim_stream()?);
        stream.configure(
            Endpoint::UnitRx(channel),
            Endpoint::Memory(waits.result_slots(&layout, channel, extent.waits)),
            extent.waits as u32,
        );

        slot.waits_to_send = extent.waits as u32;
        self.active |= 1 << channel;
        debug!(
            "channel {}: {} words, {} result words",
            channel,
            extent.words,
            extent.waits
        );
        Ok(true)
    }

    /// Enable every configured unit on the same clock edge
    pub fn start_all<B>(&mut self, units: &mut B)
    where
        B: ExecutionUnits<'a, Stream = S>,
    {
        if self.active != 0 {
            units.enable_in_sync(self.active);
        }
    }

    /// Check if `channel` still has instructions to stream
    pub fn instructions_busy(&self, channel: u8) -> bool {
        self.slots
            .get(channel as usize)
            .and_then(|slot| slot.instructions.as_ref())
            .is_some_and(|stream| stream.is_busy())
    }

    /// Check if `channel` still expects result words
    pub fn results_busy(&self, channel: u8) -> bool {
        self.slots
            .get(channel as usize)
            .and_then(|slot| slot.results.as_ref())
            .is_some_and(|stream| stream.is_busy())
    }

    /// Publish how many result words each active channel has received
    pub fn poll_progress<const SLOTS: usize>(&self, waits: &WaitStore<SLOTS>) {
        for (channel, slot) in self.slots.iter().enumerate() {
            if let Some(stream) = &slot.results {
                let remaining = stream.remaining().min(slot.waits_to_send);
                waits.record_progress(channel as u8, slot.waits_to_send - remaining);
            }
        }
    }

    /// Release everything `channel` holds
    ///
    /// With `aborting`, in-flight streams are cancelled and both FIFOs are
    /// drained first. Safe to call more than once.
    pub fn teardown<B>(&mut self, units: &mut B, channel: u8, aborting: bool)
    where
        B: ExecutionUnits<'a, Stream = S>,
    {
        let Some(slot) = self.slots.get_mut(channel as usize) else {
            return;
        };

        if aborting {
            for stream in [&mut slot.instructions, &mut slot.results]
                .into_iter()
                .flatten()
            {
                stream.abort();
            }
            if slot.unit_claimed {
                debug!("channel {}: draining FIFOs", channel);
                units.drain_tx(channel);
                units.drain_rx(channel);
            }
        }

        if let Some(stream) = slot.instructions.take() {
            units.release_stream(stream);
        }
        if let Some(stream) = slot.results.take() {
            units.release_stream(stream);
        }
        if slot.unit_claimed {
            units.drain_tx(channel);
            units.release_unit(channel);
            slot.unit_claimed = false;
        }
        self.active &= !(1 << channel);
    }

    /// Release everything every channel holds
    pub fn teardown_all<B>(&mut self, units: &mut B, aborting: bool)
    where
        B: ExecutionUnits<'a, Stream = S>,
    {
        for channel in 0..MAX_CHANNELS as u8 {
            self.teardown(units, channel, aborting);
        }
    }
}
