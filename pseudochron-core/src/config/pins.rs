//! Channel pin assignment
//!
//! Each channel has one output (driven by the sequencer's side-set) and one
//! trigger input. Outputs must be unique and never double as an input; two
//! channels may share a trigger input.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::MAX_CHANNELS;

/// Highest GPIO usable for either direction
pub const MAX_GPIO: u8 = 19;

/// On-board LED, usable as an extra output
pub const LED_PIN: u8 = 25;

/// Rejected pin assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// Pin number not usable for this direction
    OutOfRange,
    /// Pin already serves as some channel's trigger input
    ConflictsWithInput,
    /// Pin already serves as some channel's output
    ConflictsWithOutput,
    /// Channel has no pin assigned for this direction
    Unassigned,
    /// Channel index beyond the table
    NoSuchChannel,
}

impl PinError {
    /// Human-readable description
    pub fn message(self) -> &'static str {
        match self {
            PinError::OutOfRange => "pin must be between 0 and 19 (or 25 for outputs)",
            PinError::ConflictsWithInput => "pin already used as a trigger input",
            PinError::ConflictsWithOutput => "pin already used as an output",
            PinError::Unassigned => "pin not assigned",
            PinError::NoSuchChannel => "no such channel",
        }
    }
}

/// Pins requested for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelPins {
    /// Clock output
    pub out_pin: Option<u8>,
    /// Trigger input
    pub in_pin: Option<u8>,
}

impl ChannelPins {
    /// No pins assigned
    pub const UNASSIGNED: Self = Self {
        out_pin: None,
        in_pin: None,
    };

    /// Both pins, or [`PinError::Unassigned`]
    pub fn resolve(&self) -> Result<UnitPins, PinError> {
        match (self.out_pin, self.in_pin) {
            (Some(out_pin), Some(in_pin)) => Ok(UnitPins { out_pin, in_pin }),
            _ => Err(PinError::Unassigned),
        }
    }
}

/// Fully assigned pins handed to an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnitPins {
    pub out_pin: u8,
    pub in_pin: u8,
}

/// Pin assignment for all channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinTable {
    pub channels: [ChannelPins; MAX_CHANNELS],
}

impl PinTable {
    /// Table with nothing assigned
    pub const fn new() -> Self {
        Self {
            channels: [ChannelPins::UNASSIGNED; MAX_CHANNELS],
        }
    }

    /// Pins of `channel`, if the index exists
    pub fn get(&self, channel: u8) -> Option<ChannelPins> {
        self.channels.get(channel as usize).copied()
    }

    /// Assign the output pin of `channel`
    pub fn set_out(&mut self, channel: u8, pin: u8) -> Result<(), PinError> {
        if self.channels.iter().any(|c| c.in_pin == Some(pin)) {
            return Err(PinError::ConflictsWithInput);
        }
        if pin > MAX_GPIO && pin != LED_PIN {
            return Err(PinError::OutOfRange);
        }
        let taken = self
            .channels
            .iter()
            .enumerate()
            .any(|(i, c)| i != channel as usize && c.out_pin == Some(pin));
        if taken {
            return Err(PinError::ConflictsWithOutput);
        }
        self.slot(channel)?.out_pin = Some(pin);
        Ok(())
    }

    /// Assign the trigger input pin of `channel`
    pub fn set_in(&mut self, channel: u8, pin: u8) -> Result<(), PinError> {
        if self.channels.iter().any(|c| c.out_pin == Some(pin)) {
            return Err(PinError::ConflictsWithOutput);
        }
        if pin > MAX_GPIO {
            return Err(PinError::OutOfRange);
        }
        self.slot(channel)?.in_pin = Some(pin);
        Ok(())
    }

    fn slot(&mut self, channel: u8) -> Result<&mut ChannelPins, PinError> {
        self.channels
            .get_mut(channel as usize)
            .ok_or(PinError::NoSuchChannel)
    }

    /// Re-check every assignment against the rules enforced by the setters
    pub fn validate(&self) -> Result<(), PinError> {
        let mut rebuilt = PinTable::new();
        for (channel, pins) in self.channels.iter().enumerate() {
            if let Some(pin) = pins.in_pin {
                rebuilt.set_in(channel as u8, pin)?;
            }
        }
        for (channel, pins) in self.channels.iter().enumerate() {
            if let Some(pin) = pins.out_pin {
                rebuilt.set_out(channel as u8, pin)?;
            }
        }
        Ok(())
    }
}
