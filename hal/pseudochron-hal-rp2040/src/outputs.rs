//! Software-driven channel outputs

use embassy_rp::pac;
use pseudochron_hal::{Level, ManualOutputs};

use crate::FUNCSEL_SIO;

/// Channel outputs driven through SIO
///
/// Driving a pin takes it back from PIO0. The level is latched before the
/// function switch so the pin never glitches to the opposite level.
#[derive(Debug, Default)]
pub struct SioOutputs {
    _private: (),
}

impl SioOutputs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManualOutputs for SioOutputs {
    fn drive(&mut self, pin: u8, level: Level) {
        let mask = 1u32 << pin;
        let out = pac::SIO.gpio_out(0);
        if level.is_high() {
            out.value_set().write_value(mask);
        } else {
            out.value_clr().write_value(mask);
        }
        pac::SIO.gpio_oe(0).value_set().write_value(mask);
        pac::IO_BANK0
            .gpio(pin as usize)
            .ctrl()
            .write(|w| w.set_funcsel(FUNCSEL_SIO));
    }
}
