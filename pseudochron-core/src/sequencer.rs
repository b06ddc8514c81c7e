//! Execution side of the engine
//!
//! The sequencer owns the execution-unit pool and runs on its own core. It
//! sleeps on the start channel, then drives one run to completion:
//!
//! 1. Configure every active channel; any failure aborts the whole run
//! 2. Enable all configured units together
//! 3. Busy-poll progress until the programs finish or an abort is requested
//! 4. Tear every channel down and settle on `Stopped` or `Aborted`
//!
//! Polling spins rather than sleeping: runs are often shorter than a timer
//! tick and the core has nothing else to do. Abort latency is one poll.

use pseudochron_hal::ExecutionUnits;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::orchestrator::Orchestrator;
use crate::status::{RunEvent, RunStatus};

/// Runs started programs on the execution units
pub struct Sequencer<'e, B, const WORDS: usize, const SLOTS: usize> {
    engine: &'e Engine<WORDS, SLOTS>,
    units: B,
}

impl<'e, B, const WORDS: usize, const SLOTS: usize> Sequencer<'e, B, WORDS, SLOTS>
where
    B: ExecutionUnits<'e>,
{
    pub fn new(engine: &'e Engine<WORDS, SLOTS>, units: B) -> Self {
        Self { engine, units }
    }

    /// The execution-unit pool
    pub fn units(&self) -> &B {
        &self.units
    }

    /// Announce readiness, then serve start requests forever
    pub async fn run(&mut self) -> ! {
        self.engine.announce_ready();
        loop {
            let hardware_trigger = self.engine.wait_for_start().await;
            self.execute(hardware_trigger);
        }
    }

    /// Serve a single start request
    pub async fn run_once(&mut self) -> RunStatus {
        let hardware_trigger = self.engine.wait_for_start().await;
        self.execute(hardware_trigger)
    }

    /// Drive one run from configuration to teardown
    ///
    /// Returns the final status, `Stopped` or `Aborted`.
    pub fn execute(&mut self, hardware_trigger: bool) -> RunStatus {
        let engine = self.engine;
        let layout = engine.layout();
        let mut orchestrator = Orchestrator::new(layout);

        info!(
            "run starting: {} channels, hardware trigger {}",
            layout.num_channels(),
            hardware_trigger
        );

        if let Err(err) = self.configure_all(&mut orchestrator, hardware_trigger) {
            warn!("configuration failed: {:?}", err);
            engine.apply(RunEvent::ConfigurationFailed);
            orchestrator.teardown_all(&mut self.units, true);
            return engine.apply(RunEvent::TeardownComplete);
        }

        if engine.apply(RunEvent::ChannelsStarted) == RunStatus::Running {
            orchestrator.start_all(&mut self.units);
            for channel in 0..layout.num_channels() {
                while orchestrator.instructions_busy(channel) && !engine.abort_requested() {
                    orchestrator.poll_progress(engine.waits());
                }
                while orchestrator.results_busy(channel) && !engine.abort_requested() {
                    orchestrator.poll_progress(engine.waits());
                }
            }
        }
        // Results that landed after the last poll
        orchestrator.poll_progress(engine.waits());

        let aborting = engine.apply(RunEvent::PollExited) == RunStatus::Aborting;
        if aborting {
            info!("abort acknowledged");
        }
        orchestrator.teardown_all(&mut self.units, aborting);

        let status = engine.apply(RunEvent::TeardownComplete);
        info!("run finished: {:?}", status);
        status
    }

    fn configure_all(
        &mut self,
        orchestrator: &mut Orchestrator<B::Stream>,
        hardware_trigger: bool,
    ) -> Result<(), EngineError> {
        let engine = self.engine;
        let pins = engine.pin_table();
        for channel in 0..engine.layout().num_channels() {
            let channel_pins = pins.get(channel).ok_or(EngineError::InvalidChannel)?;
            orchestrator.configure(
                &mut self.units,
                engine.instructions(),
                engine.waits(),
                channel,
                channel_pins,
                hardware_trigger,
            )?;
        }
        Ok(())
    }
}
