//! Whole runs through the engine, the sequencer and the simulated block

use std::time::{Duration, Instant};

use embassy_futures::block_on;
use proptest::prelude::*;
use pseudochron_core::program::{Phase, WAIT_TIMEOUT_SENTINEL};
use pseudochron_core::{Engine, EngineError, RunStatus, Sequencer};
use pseudochron_hal::Level;

use crate::{SimBank, SimEvent, SimHandle, SimOutputs, SIM_STREAMS, SIM_UNITS};

type SimEngine = Engine<{ 2 * (64 + 4) }, { 16 + 4 }>;

const OUT: u8 = 2;
const TRIGGER: u8 = 3;

/// One instruction in host units
#[derive(Debug, Clone, Copy)]
enum Step {
    Pulse(u32, u32),
    Wait(u32),
}

fn load(engine: &SimEngine, channel: u8, program: &[Step]) {
    for (address, step) in program.iter().enumerate() {
        let (half_period, reps) = match *step {
            Step::Pulse(half_period, reps) => (half_period, reps),
            Step::Wait(timeout) => (timeout, 0),
        };
        engine
            .set_instruction(channel, address, half_period, reps)
            .unwrap();
    }
}

/// Single active channel on `OUT`, triggered from `TRIGGER`
fn single_channel(program: &[Step]) -> SimEngine {
    let engine = SimEngine::new();
    engine.set_num_channels(1).unwrap();
    engine.set_out_pin(0, OUT).unwrap();
    engine.set_in_pin(0, TRIGGER).unwrap();
    load(&engine, 0, program);
    engine
}

fn run_with<'e>(
    engine: &'e SimEngine,
    hardware_trigger: bool,
    setup: impl FnOnce(&SimHandle<'e>),
) -> (RunStatus, SimHandle<'e>) {
    let bank = SimBank::new();
    let handle = bank.handle();
    setup(&handle);

    let mut sequencer = Sequencer::new(engine, bank);
    let mut outputs = SimOutputs::new();
    engine.start(hardware_trigger, &mut outputs).unwrap();
    let status = block_on(sequencer.run_once());
    (status, handle)
}

fn run(engine: &SimEngine) -> (RunStatus, SimHandle<'_>) {
    run_with(engine, false, |_| {})
}

fn intervals(edges: &[(u64, bool)]) -> Vec<u64> {
    edges.windows(2).map(|w| w[1].0 - w[0].0).collect()
}

fn assert_pools_restored(handle: &SimHandle<'_>) {
    assert_eq!(handle.free_units(), SIM_UNITS);
    assert_eq!(handle.free_streams(), SIM_STREAMS);
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition never became true");
        std::thread::yield_now();
    }
}

#[test]
fn test_pulse_train_timing() {
    let engine = single_channel(&[Step::Pulse(10, 5)]);
    let (status, handle) = run(&engine);

    assert_eq!(status, RunStatus::Stopped);
    let edges = handle.edges(0);
    assert_eq!(edges.len(), 10);
    assert!(edges[0].1);
    assert!(intervals(&edges).iter().all(|&ticks| ticks == 10));
    assert_eq!(handle.phase(0), None);
    assert_pools_restored(&handle);

    // No waits in the program, nothing to read back
    assert_eq!(engine.get_wait(0, 0), Err(EngineError::InvalidAddress));
}

#[test]
fn test_back_to_back_pulses_keep_their_periods() {
    let engine = single_channel(&[Step::Pulse(8, 2), Step::Pulse(30, 1)]);
    let (status, handle) = run(&engine);

    assert_eq!(status, RunStatus::Stopped);
    assert_eq!(intervals(&handle.edges(0)), [8, 8, 8, 8, 30]);
}

#[test]
fn test_wait_timeout_reports_sentinel() {
    let engine = single_channel(&[Step::Wait(1000), Step::Pulse(10, 1)]);
    let (status, handle) = run(&engine);

    assert_eq!(status, RunStatus::Stopped);
    assert_eq!(engine.get_wait(0, 0), Ok(WAIT_TIMEOUT_SENTINEL));
    assert_eq!(engine.get_wait(0, 1), Err(EngineError::InvalidAddress));

    let edges = handle.edges(0);
    assert_eq!(edges.len(), 2);
    assert!((995..1015).contains(&edges[0].0));
}

#[test]
fn test_triggered_wait_reports_remaining_time() {
    let engine = single_channel(&[Step::Wait(1000), Step::Pulse(10, 1)]);
    let (status, handle) = run_with(&engine, false, |h| h.trigger_pulse(TRIGGER, 100, 5));

    assert_eq!(status, RunStatus::Stopped);
    let remaining = engine.get_wait(0, 0).unwrap();
    assert_ne!(remaining, WAIT_TIMEOUT_SENTINEL);
    assert!((890..=910).contains(&remaining), "remaining {remaining}");

    let edges = handle.edges(0);
    assert!((100..120).contains(&edges[0].0));
}

#[test]
fn test_consecutive_waits_collapse_into_indefinite_wait() {
    let engine = single_channel(&[Step::Wait(200), Step::Wait(300), Step::Pulse(10, 1)]);
    let (status, handle) = run_with(&engine, false, |h| h.trigger_pulse(TRIGGER, 600, 5));

    assert_eq!(status, RunStatus::Stopped);
    // Only the first wait of the run reports
    assert_eq!(engine.get_wait(0, 0), Ok(WAIT_TIMEOUT_SENTINEL));
    assert_eq!(engine.get_wait(0, 1), Err(EngineError::InvalidAddress));

    let edges = handle.edges(0);
    assert_eq!(edges.len(), 2);
    assert!((600..620).contains(&edges[0].0));
}

#[test]
fn test_hardware_trigger_holds_first_edge() {
    let engine = single_channel(&[Step::Pulse(20, 2)]);
    let (status, handle) = run_with(&engine, true, |h| h.trigger_pulse(TRIGGER, 300, 5));

    assert_eq!(status, RunStatus::Stopped);
    let edges = handle.edges(0);
    assert_eq!(edges.len(), 4);
    assert!((300..320).contains(&edges[0].0));
    assert_eq!(engine.get_wait(0, 0), Err(EngineError::InvalidAddress));

    let preloads: Vec<_> = handle
        .events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::Preloaded(..)))
        .collect();
    assert_eq!(preloads, [SimEvent::Preloaded(0, 1)]);
}

#[test]
fn test_hardware_trigger_absorbs_leading_wait() {
    let engine = single_channel(&[Step::Wait(500), Step::Pulse(10, 1)]);
    let (status, handle) = run_with(&engine, true, |h| {
        h.trigger_pulse(TRIGGER, 100, 5);
        h.trigger_pulse(TRIGGER, 1000, 5);
    });

    assert_eq!(status, RunStatus::Stopped);
    let edges = handle.edges(0);
    assert!((1000..1020).contains(&edges[0].0));
    assert_eq!(engine.get_wait(0, 0), Err(EngineError::InvalidAddress));
}

#[test]
fn test_channels_start_on_the_same_cycle() {
    let engine = SimEngine::new();
    engine.set_num_channels(2).unwrap();
    engine.set_out_pin(0, 2).unwrap();
    engine.set_in_pin(0, 3).unwrap();
    engine.set_out_pin(1, 4).unwrap();
    engine.set_in_pin(1, 5).unwrap();
    load(&engine, 0, &[Step::Pulse(12, 3)]);
    load(&engine, 1, &[Step::Pulse(12, 3)]);

    let (status, handle) = run(&engine);
    assert_eq!(status, RunStatus::Stopped);

    let events = handle.events();
    let enables: Vec<_> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, SimEvent::Enabled(_)))
        .collect();
    assert_eq!(enables.len(), 1);
    let (enabled_at, enable) = enables[0];
    assert_eq!(*enable, SimEvent::Enabled(0b11));
    let initialized = events[..enabled_at]
        .iter()
        .filter(|e| matches!(e, SimEvent::Initialized(..)))
        .count();
    assert_eq!(initialized, 2);

    assert_eq!(handle.edges(0), handle.edges(1));
}

#[test]
fn test_empty_channel_stays_idle() {
    let engine = SimEngine::new();
    engine.set_num_channels(2).unwrap();
    engine.set_out_pin(0, 2).unwrap();
    engine.set_in_pin(0, 3).unwrap();
    load(&engine, 0, &[Step::Pulse(10, 1)]);

    // Channel 1 has no pins, which is fine while its program is empty
    let (status, handle) = run(&engine);
    assert_eq!(status, RunStatus::Stopped);
    assert!(!handle.events().contains(&SimEvent::Claimed(1)));
    assert!(handle.edges(1).is_empty());
}

#[test]
fn test_configuration_failure_aborts_and_releases() {
    let engine = SimEngine::new();
    engine.set_num_channels(2).unwrap();
    engine.set_out_pin(0, 2).unwrap();
    engine.set_in_pin(0, 3).unwrap();
    load(&engine, 0, &[Step::Pulse(10, 1)]);
    load(&engine, 1, &[Step::Pulse(10, 1)]);

    let (status, handle) = run(&engine);
    assert_eq!(status, RunStatus::Aborted);
    assert_pools_restored(&handle);

    let events = handle.events();
    assert!(events.contains(&SimEvent::Released(0)));
    assert!(!events.iter().any(|e| matches!(e, SimEvent::Enabled(_))));

    // Idle again: programs can be edited and runs restarted
    engine.set_out_pin(1, 4).unwrap();
    engine.set_in_pin(1, 5).unwrap();
    let (status, _) = run(&engine);
    assert_eq!(status, RunStatus::Stopped);
}

#[test]
fn test_too_many_waits_aborts() {
    let mut program = Vec::new();
    for _ in 0..17 {
        program.push(Step::Wait(10));
        program.push(Step::Pulse(10, 1));
    }
    let engine = single_channel(&program);
    assert_eq!(engine.layout().wait_capacity(), 16);

    let (status, handle) = run(&engine);
    assert_eq!(status, RunStatus::Aborted);
    assert_pools_restored(&handle);
}

#[test]
fn test_waits_and_pulses_interleaved() {
    let engine = single_channel(&[
        Step::Pulse(10, 1),
        Step::Wait(400),
        Step::Pulse(10, 1),
        Step::Wait(400),
        Step::Pulse(10, 1),
    ]);
    let (status, handle) = run_with(&engine, false, |h| h.trigger_pulse(TRIGGER, 200, 5));

    assert_eq!(status, RunStatus::Stopped);
    let first = engine.get_wait(0, 0).unwrap();
    assert_ne!(first, WAIT_TIMEOUT_SENTINEL);
    assert!(first < 400);
    assert_eq!(engine.get_wait(0, 1), Ok(WAIT_TIMEOUT_SENTINEL));
    assert_eq!(handle.edges(0).len(), 6);
}

#[test]
fn test_abort_during_indefinite_wait() {
    let engine = single_channel(&[Step::Wait(1000), Step::Wait(1000), Step::Pulse(10, 1)]);
    let bank = SimBank::new();
    let handle = bank.handle();
    let mut outputs = SimOutputs::new();

    std::thread::scope(|scope| {
        let runner = scope.spawn(|| {
            let mut sequencer = Sequencer::new(&engine, bank);
            block_on(sequencer.run_once())
        });

        engine.start(false, &mut outputs).unwrap();
        // First result is readable while the run is still going
        wait_until(|| engine.get_wait(0, 0) == Ok(WAIT_TIMEOUT_SENTINEL));
        wait_until(|| handle.phase(0) == Some(Phase::IndefiniteWaitPrelude));
        assert_eq!(engine.run_status(), RunStatus::Running);
        assert_eq!(
            engine.set_instruction(0, 0, 10, 1),
            Err(EngineError::InvalidRunState)
        );

        outputs.clear();
        engine.abort(&mut outputs).unwrap();
        assert_eq!(outputs.log(), [(OUT, Level::Low)]);
        assert_eq!(runner.join().unwrap(), RunStatus::Aborted);
    });

    assert_eq!(engine.run_status(), RunStatus::Aborted);
    assert_pools_restored(&handle);
    let events = handle.events();
    assert!(events.contains(&SimEvent::DrainedRx(0)));
    assert!(events.contains(&SimEvent::Released(0)));
    assert!(handle.edges(0).is_empty());

    engine.set_instruction(0, 1, 10, 1).unwrap();
}

#[test]
fn test_abort_before_channels_start() {
    let engine = single_channel(&[Step::Pulse(10, 5)]);
    let mut sequencer = Sequencer::new(&engine, SimBank::new());
    let handle = sequencer.units().handle();
    let mut outputs = SimOutputs::new();

    engine.start(false, &mut outputs).unwrap();
    assert_eq!(engine.run_status(), RunStatus::TransitionToRunning);
    engine.abort(&mut outputs).unwrap();
    assert_eq!(engine.run_status(), RunStatus::AbortRequested);

    assert_eq!(block_on(sequencer.run_once()), RunStatus::Aborted);
    assert_eq!(engine.run_status(), RunStatus::Aborted);

    // Configured and torn down, never enabled
    let events = handle.events();
    assert!(events.iter().any(|e| matches!(e, SimEvent::Initialized(0, _))));
    assert!(!events.iter().any(|e| matches!(e, SimEvent::Enabled(_))));
    assert!(events.contains(&SimEvent::Released(0)));
    assert!(handle.edges(0).is_empty());
    assert_pools_restored(&handle);
}

#[test]
fn test_wait_in_flight_is_not_yet_available() {
    let engine = single_channel(&[
        Step::Pulse(10, 1),
        Step::Wait(1_000_000_000),
        Step::Pulse(10, 1),
    ]);
    let bank = SimBank::new();
    let handle = bank.handle();
    let mut outputs = SimOutputs::new();

    std::thread::scope(|scope| {
        let runner = scope.spawn(|| {
            let mut sequencer = Sequencer::new(&engine, bank);
            block_on(sequencer.run_once())
        });

        engine.start(false, &mut outputs).unwrap();
        wait_until(|| handle.phase(0) == Some(Phase::WaitLoop));
        assert_eq!(engine.run_status(), RunStatus::Running);
        assert_eq!(engine.get_wait(0, 0), Err(EngineError::WaitNotYetAvailable));
        assert_eq!(engine.get_wait(0, 1), Err(EngineError::InvalidAddress));

        // Raise the trigger from now on
        handle.trigger_pulse(TRIGGER, handle.elapsed(), 1_000_000);
        assert_eq!(runner.join().unwrap(), RunStatus::Stopped);
    });

    let remaining = engine.get_wait(0, 0).unwrap();
    assert_ne!(remaining, WAIT_TIMEOUT_SENTINEL);
    assert!(remaining < 1_000_000_000);
    assert_eq!(handle.edges(0).len(), 4);
    assert_pools_restored(&handle);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_pulse_edges_follow_half_period(half_period in 6u32..60, reps in 1u32..6) {
        let engine = single_channel(&[Step::Pulse(half_period, reps)]);
        let (status, handle) = run(&engine);

        prop_assert_eq!(status, RunStatus::Stopped);
        let edges = handle.edges(0);
        prop_assert_eq!(edges.len() as u32, 2 * reps);
        prop_assert!(intervals(&edges).iter().all(|&t| t == half_period as u64));
    }
}
