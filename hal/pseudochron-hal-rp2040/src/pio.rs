//! PIO-based pseudoclock execution units
//!
//! Every channel gets one PIO0 state machine; all four share the single
//! pseudoclock program loaded once at startup. The state machines run at
//! the full system clock so one program cycle is one tick.
//!
//! The program itself comes from [`pseudochron_core::program::assemble`],
//! which is checked instruction for instruction against the reference model
//! on the host.

use embassy_rp::pac;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::Pio;
use fixed::types::U24F8;
use pseudochron_core::program::{assemble, PROGRAM_LEN};
use pseudochron_hal::{ExecutionUnits, HalError, UnitConfig};

use crate::dma::{DmaChannel, DmaStream};
use crate::{FUNCSEL_PIO0, MAX_STREAMS};

/// State machines per PIO block
pub const UNITS: usize = 4;

/// State machines run undivided: one cycle per system clock tick
pub const CLOCK_DIVIDER: U24F8 = U24F8::ONE;

/// Execution-unit pool on PIO0
pub struct PioBank<'d> {
    /// Held so nothing else can claim the block
    _pio: Pio<'d, PIO0>,
    origin: u8,
    claimed: u8,
    streams: heapless::Vec<DmaChannel<'d>, MAX_STREAMS>,
}

impl<'d> PioBank<'d> {
    /// Load the pseudoclock program and take over the given DMA channels
    pub fn new(mut pio: Pio<'d, PIO0>, streams: impl IntoIterator<Item = DmaChannel<'d>>) -> Self {
        let assembled = assemble();
        let loaded = pio.common.load_program(&assembled.program);
        #[cfg(feature = "defmt")]
        defmt::info!("pseudoclock program loaded at {}", loaded.origin);

        let mut pool = heapless::Vec::new();
        for stream in streams {
            if pool.push(stream).is_err() {
                break;
            }
        }

        Self {
            _pio: pio,
            origin: loaded.origin,
            claimed: 0,
            streams: pool,
        }
    }

    fn disable(&mut self, unit: u8) {
        let bit = 1 << unit;
        pac::PIO0.ctrl().modify(|w| w.set_sm_enable(w.sm_enable() & !bit));
    }

    /// Empty both FIFOs by toggling the join bit
    fn clear_fifos(&mut self, unit: u8) {
        let shiftctrl = pac::PIO0.sm(unit as usize).shiftctrl();
        shiftctrl.modify(|w| w.set_fjoin_rx(!w.fjoin_rx()));
        shiftctrl.modify(|w| w.set_fjoin_rx(!w.fjoin_rx()));
    }

    fn exec(&mut self, unit: u8, instruction: ::pio::InstructionOperands) {
        pac::PIO0
            .sm(unit as usize)
            .instr()
            .write(|w| w.set_instr(instruction.encode()));
    }
}

impl<'d> ExecutionUnits<'d> for PioBank<'d> {
    type Stream = DmaStream<'d>;

    fn program_offset(&self) -> u8 {
        self.origin
    }

    fn claim_unit(&mut self, unit: u8) -> Result<(), HalError> {
        let bit = 1 << unit;
        if unit as usize >= UNITS || self.claimed & bit != 0 {
            return Err(HalError::NoFreeUnit);
        }
        self.claimed |= bit;
        Ok(())
    }

    fn init_unit(&mut self, unit: u8, config: UnitConfig) {
        self.disable(unit);

        let sm = pac::PIO0.sm(unit as usize);
        let divider = CLOCK_DIVIDER.to_bits();
        sm.clkdiv().write(|w| {
            w.set_int((divider >> 8) as u16);
            w.set_frac(divider as u8);
        });
        sm.execctrl().write(|w| {
            w.set_side_en(true);
            w.set_side_pindir(false);
            w.set_jmp_pin(config.in_pin);
            w.set_wrap_bottom(self.origin);
            w.set_wrap_top(self.origin + PROGRAM_LEN as u8 - 1);
        });
        sm.shiftctrl().write(|w| {
            w.set_out_shiftdir(true);
            w.set_in_shiftdir(true);
        });
        // Side-set count includes the enable bit of `.side_set 1 opt`
        sm.pinctrl().write(|w| {
            w.set_sideset_count(2);
            w.set_sideset_base(config.out_pin);
            w.set_set_base(config.out_pin);
            w.set_set_count(1);
            w.set_in_base(config.in_pin);
        });
        self.clear_fifos(unit);
        pac::PIO0.ctrl().modify(|w| w.set_sm_restart(1 << unit));

        for pin in [config.out_pin, config.in_pin] {
            pac::PADS_BANK0.gpio(pin as usize).modify(|w| {
                w.set_ie(true);
                w.set_od(false);
            });
        }
        pac::IO_BANK0
            .gpio(config.out_pin as usize)
            .ctrl()
            .write(|w| w.set_funcsel(FUNCSEL_PIO0));

        use ::pio::{InstructionOperands, JmpCondition, SetDestination};
        self.exec(
            unit,
            InstructionOperands::SET {
                destination: SetDestination::PINS,
                data: 0,
            },
        );
        self.exec(
            unit,
            InstructionOperands::SET {
                destination: SetDestination::PINDIRS,
                data: 1,
            },
        );
        self.exec(
            unit,
            InstructionOperands::JMP {
                condition: JmpCondition::Always,
                address: config.initial_pc,
            },
        );
    }

    fn push_blocking(&mut self, unit: u8, word: u32) {
        let bit = 1 << unit;
        while pac::PIO0.fstat().read().txfull() & bit != 0 {}
        pac::PIO0.txf(unit as usize).write_value(word);
    }

    fn claim_stream(&mut self) -> Result<DmaStream<'d>, HalError> {
        self.streams
            .pop()
            .map(DmaStream::new)
            .ok_or(HalError::NoFreeStream)
    }

    fn release_stream(&mut self, stream: DmaStream<'d>) {
        let _ = self.streams.push(stream.into_channel());
    }

    fn enable_in_sync(&mut self, mask: u8) {
        pac::PIO0.ctrl().modify(|w| {
            w.set_clkdiv_restart(mask);
            w.set_sm_enable(w.sm_enable() | mask);
        });
    }

    fn drain_tx(&mut self, unit: u8) {
        self.disable(unit);
        self.clear_fifos(unit);
    }

    fn drain_rx(&mut self, unit: u8) {
        let bit = 1 << unit;
        while pac::PIO0.fstat().read().rxempty() & bit == 0 {
            let _ = pac::PIO0.rxf(unit as usize).read();
        }
    }

    fn release_unit(&mut self, unit: u8) {
        self.disable(unit);
        self.claimed &= !(1 << unit);
    }

    fn free_units(&self) -> usize {
        UNITS - self.claimed.count_ones() as usize
    }

    fn free_streams(&self) -> usize {
        self.streams.len()
    }
}
