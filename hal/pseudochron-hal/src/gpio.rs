//! GPIO abstractions
//!
//! Outside of a run the channel outputs are plain software-driven GPIOs.
//! The engine drives them by pin number through [`ManualOutputs`].

/// Logic level of a digital output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Logic 0
    Low,
    /// Logic 1
    High,
}

impl Level {
    /// Check if this is the high level
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Software control of channel output pins
///
/// Implementations take the pin away from whatever peripheral currently
/// drives it (the PIO block after a run) and make it a plain output before
/// setting the level. Ownership between this and a running execution unit is
/// cooperative: the engine only calls this while no run is in progress, or
/// right after an abort has been requested.
pub trait ManualOutputs {
    /// Configure `pin` as a software output and drive it to `level`
    fn drive(&mut self, pin: u8, level: Level);

    /// Drive `pin` high
    fn set_high(&mut self, pin: u8) {
        self.drive(pin, Level::High);
    }

    /// Drive `pin` low
    fn set_low(&mut self, pin: u8) {
        self.drive(pin, Level::Low);
    }
}
