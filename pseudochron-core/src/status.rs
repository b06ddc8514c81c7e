//! Run status state machine
//!
//! The control side and the sequencer both move the run status, always
//! through [`RunStatus::transition`] under the engine's status lock.
//!
//! ```text
//!            start                 units enabled
//! Stopped ─────────► Transition ───────────────► Running
//! Aborted            ToRunning                      │
//!    ▲                  │ abort                     │ abort      programs done
//!    │                  ▼                           ▼                  │
//!    │              AbortRequested ◄────────────────┘                  ▼
//!    │                  │ poll loop exits                       TransitionToStop
//!    │                  ▼                                              │
//!    └──────────── Aborting                              Stopped ◄─────┘
//!       teardown                                               teardown
//! ```

/// Run status, with the numeric codes reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RunStatus {
    /// Idle after a run finished (or never started)
    Stopped = 0,
    /// Start accepted, channels being configured
    TransitionToRunning = 1,
    /// Units enabled, programs streaming
    Running = 2,
    /// Host asked for an abort, sequencer not yet reacted
    AbortRequested = 3,
    /// Sequencer tearing down after an abort or failed configuration
    Aborting = 4,
    /// Idle after an abort
    Aborted = 5,
    /// Programs completed, sequencer tearing down
    TransitionToStop = 6,
}

/// Things that move the run status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunEvent {
    /// Host start command
    StartRequested,
    /// Host abort command
    AbortRequested,
    /// A channel could not be configured
    ConfigurationFailed,
    /// Every active unit was enabled
    ChannelsStarted,
    /// Sequencer stopped polling progress
    PollExited,
    /// All claimed units and streams were released
    TeardownComplete,
}

impl RunStatus {
    /// Numeric code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Status from its numeric code
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RunStatus::Stopped),
            1 => Some(RunStatus::TransitionToRunning),
            2 => Some(RunStatus::Running),
            3 => Some(RunStatus::AbortRequested),
            4 => Some(RunStatus::Aborting),
            5 => Some(RunStatus::Aborted),
            6 => Some(RunStatus::TransitionToStop),
            _ => None,
        }
    }

    /// Check if no run is in progress
    pub fn is_idle(&self) -> bool {
        matches!(self, RunStatus::Stopped | RunStatus::Aborted)
    }

    /// Check if an abort is already under way
    pub fn is_aborting(&self) -> bool {
        matches!(self, RunStatus::AbortRequested | RunStatus::Aborting)
    }

    /// Process an event and return the next status
    ///
    /// Events that do not apply leave the status unchanged.
    pub fn transition(self, event: RunEvent) -> Self {
        use RunEvent::*;
        use RunStatus::*;

        match (self, event) {
            (Stopped | Aborted, StartRequested) => TransitionToRunning,

            (TransitionToRunning | Running, RunEvent::AbortRequested) => {
                RunStatus::AbortRequested
            }

            (TransitionToRunning | Running | RunStatus::AbortRequested, ConfigurationFailed) => {
                Aborting
            }

            (TransitionToRunning, ChannelsStarted) => Running,

            (RunStatus::AbortRequested, PollExited) => Aborting,
            (TransitionToRunning | Running, PollExited) => TransitionToStop,

            (Aborting, TeardownComplete) => Aborted,
            (TransitionToStop, TeardownComplete) => Stopped,

            (status, _) => status,
        }
    }
}

/// Status of the sequencer clock source, reported alongside the run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockStatus {
    /// Running from the internal oscillator
    #[default]
    Internal = 0,
    /// Running from an external reference
    External = 1,
}

impl ClockStatus {
    /// Numeric code
    pub const fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_run() {
        let status = RunStatus::Stopped
            .transition(RunEvent::StartRequested)
            .transition(RunEvent::ChannelsStarted);
        assert_eq!(status, RunStatus::Running);

        let status = status.transition(RunEvent::PollExited);
        assert_eq!(status, RunStatus::TransitionToStop);
        assert_eq!(status.transition(RunEvent::TeardownComplete), RunStatus::Stopped);
    }

    #[test]
    fn test_abort_while_running() {
        let status = RunStatus::Running.transition(RunEvent::AbortRequested);
        assert_eq!(status, RunStatus::AbortRequested);
        let status = status.transition(RunEvent::PollExited);
        assert_eq!(status, RunStatus::Aborting);
        assert_eq!(status.transition(RunEvent::TeardownComplete), RunStatus::Aborted);
    }

    #[test]
    fn test_abort_before_units_enabled_skips_start() {
        let status = RunStatus::TransitionToRunning.transition(RunEvent::AbortRequested);
        assert_eq!(status.transition(RunEvent::ChannelsStarted), RunStatus::AbortRequested);
    }

    #[test]
    fn test_configuration_failure_aborts() {
        let status = RunStatus::TransitionToRunning.transition(RunEvent::ConfigurationFailed);
        assert_eq!(status, RunStatus::Aborting);
        assert_eq!(status.transition(RunEvent::TeardownComplete), RunStatus::Aborted);
    }

    #[test]
    fn test_start_only_from_idle() {
        assert_eq!(
            RunStatus::Aborted.transition(RunEvent::StartRequested),
            RunStatus::TransitionToRunning
        );
        for status in [
            RunStatus::TransitionToRunning,
            RunStatus::Running,
            RunStatus::AbortRequested,
            RunStatus::Aborting,
            RunStatus::TransitionToStop,
        ] {
            assert_eq!(status.transition(RunEvent::StartRequested), status);
        }
    }

    #[test]
    fn test_codes_round_trip() {
        for code in 0..=6 {
            assert_eq!(RunStatus::from_code(code).map(RunStatus::code), Some(code));
        }
        assert_eq!(RunStatus::from_code(7), None);
        assert_eq!(ClockStatus::External.code(), 1);
    }
}
