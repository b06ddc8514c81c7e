//! Engine error type
//!
//! Every fallible control operation returns one of these. Errors are plain
//! values with a fixed human-readable message; the host protocol decides how
//! to render them.

use pseudochron_hal::HalError;

use crate::config::PinError;

/// Errors reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// Malformed request (bad length, bad argument combination)
    InvalidRequest,
    /// Instruction or wait address outside the channel's region
    InvalidAddress,
    /// Channel index outside the active channel count
    InvalidChannel,
    /// Pulse half period below the sequencer's minimum
    HalfPeriodTooShort,
    /// Program has no terminating instruction inside the channel's region
    TooManyInstructions,
    /// Program schedules more waits than the channel's wait region holds
    TooManyWaits,
    /// No free execution unit or streaming channel
    ResourceExhausted,
    /// Wait has not completed yet in the current run
    WaitNotYetAvailable,
    /// Operation not allowed in the current run status
    InvalidRunState,
    /// Rejected pin assignment
    InvalidPin(PinError),
}

impl EngineError {
    /// Human-readable description
    pub fn message(self) -> &'static str {
        match self {
            EngineError::InvalidRequest => "invalid request",
            EngineError::InvalidAddress => "invalid address",
            EngineError::InvalidChannel => "invalid channel",
            EngineError::HalfPeriodTooShort => "half-period too short",
            EngineError::TooManyInstructions => "too many instructions",
            EngineError::TooManyWaits => "too many waits",
            EngineError::ResourceExhausted => "no free execution unit or stream",
            EngineError::WaitNotYetAvailable => "wait not yet available",
            EngineError::InvalidRunState => "not allowed in current run status",
            EngineError::InvalidPin(err) => err.message(),
        }
    }
}

impl From<HalError> for EngineError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::NoFreeUnit | HalError::NoFreeStream => EngineError::ResourceExhausted,
        }
    }
}

impl From<PinError> for EngineError {
    fn from(err: PinError) -> Self {
        match err {
            PinError::NoSuchChannel => EngineError::InvalidChannel,
            err => EngineError::InvalidPin(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_errors_map_to_resource_exhausted() {
        assert_eq!(EngineError::from(HalError::NoFreeUnit), EngineError::ResourceExhausted);
        assert_eq!(EngineError::from(HalError::NoFreeStream), EngineError::ResourceExhausted);
    }

    #[test]
    fn test_pin_error_message_passes_through() {
        let err = EngineError::from(PinError::ConflictsWithInput);
        assert_eq!(err, EngineError::InvalidPin(PinError::ConflictsWithInput));
        assert_eq!(err.message(), PinError::ConflictsWithInput.message());
        assert_eq!(
            EngineError::from(PinError::NoSuchChannel),
            EngineError::InvalidChannel
        );
    }
}
