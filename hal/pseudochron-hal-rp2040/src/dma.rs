//! DMA streaming channels
//!
//! One channel feeds a state machine's TX FIFO from an instruction region,
//! another drains its RX FIFO into the wait result slots. Both are paced by
//! the PIO data request of the FIFO end, so a transfer configured before
//! the unit is enabled fills the FIFO and then holds.

use core::sync::atomic::{compiler_fence, Ordering};

use embassy_rp::dma::{AnyChannel, Channel};
use embassy_rp::pac;
use embassy_rp::pac::dma::vals::{DataSize, TreqSel};
use embassy_rp::Peri;
use pseudochron_hal::{Endpoint, StreamingChannel};

/// An owned DMA channel, as handed to [`crate::PioBank::new`]
pub type DmaChannel<'d> = Peri<'d, AnyChannel>;

/// PIO0 data request numbers: TX FIFOs first, then RX FIFOs
const DREQ_PIO0_TX: u8 = 0;
const DREQ_PIO0_RX: u8 = 4;

/// Unpaced transfer
const TREQ_PERMANENT: u8 = 0x3f;

/// Streaming channel backed by one DMA channel
pub struct DmaStream<'d> {
    channel: DmaChannel<'d>,
}

/// Bus address, address increment and pacing request of one endpoint
fn resolve(endpoint: Endpoint<'_>) -> (u32, bool, Option<u8>) {
    match endpoint {
        Endpoint::Memory(words) => (words.as_ptr() as u32, true, None),
        Endpoint::UnitTx(unit) => (
            pac::PIO0.txf(unit as usize).as_ptr() as u32,
            false,
            Some(DREQ_PIO0_TX + unit),
        ),
        Endpoint::UnitRx(unit) => (
            pac::PIO0.rxf(unit as usize).as_ptr() as u32,
            false,
            Some(DREQ_PIO0_RX + unit),
        ),
    }
}

impl<'d> DmaStream<'d> {
    pub(crate) fn new(channel: DmaChannel<'d>) -> Self {
        Self { channel }
    }

    pub(crate) fn into_channel(self) -> DmaChannel<'d> {
        self.channel
    }

    fn regs(&self) -> pac::dma::Channel {
        self.channel.regs()
    }
}

impl<'d> StreamingChannel<'d> for DmaStream<'d> {
    fn configure(&mut self, source: Endpoint<'d>, dest: Endpoint<'d>, count: u32) {
        let (read_addr, incr_read, read_dreq) = resolve(source);
        let (write_addr, incr_write, write_dreq) = resolve(dest);
        let dreq = read_dreq.or(write_dreq).unwrap_or(TREQ_PERMANENT);

        let regs = self.regs();
        regs.read_addr().write_value(read_addr);
        regs.write_addr().write_value(write_addr);
        regs.trans_count().write_value(count);
        compiler_fence(Ordering::SeqCst);
        regs.ctrl_trig().write(|w| {
            w.set_treq_sel(TreqSel::from(dreq));
            w.set_data_size(DataSize::SIZE_WORD);
            w.set_incr_read(incr_read);
            w.set_incr_write(incr_write);
            // Chaining to itself disables chaining
            w.set_chain_to(self.channel.number());
            w.set_en(true);
        });
        compiler_fence(Ordering::SeqCst);
    }

    fn is_busy(&self) -> bool {
        self.regs().ctrl_trig().read().busy()
    }

    fn remaining(&self) -> u32 {
        self.regs().trans_count().read()
    }

    fn abort(&mut self) {
        let regs = self.regs();
        regs.ctrl_trig().modify(|w| w.set_en(false));
        let bit = 1 << self.channel.number();
        pac::DMA.chan_abort().write(|w| w.set_chan_abort(bit));
        while pac::DMA.chan_abort().read().chan_abort() & bit != 0 {}
        compiler_fence(Ordering::SeqCst);
    }
}
