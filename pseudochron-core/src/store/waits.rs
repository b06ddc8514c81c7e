//! Wait result store
//!
//! The result stream writes each channel's wait results into its region as
//! they come back from the execution unit. The sequencer publishes how many
//! have landed; readers must not look past that count.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicU32, Ordering};

use super::Layout;
use crate::error::EngineError;
use crate::program::{WAIT_LOOP_CYCLES, WAIT_TIMEOUT_SENTINEL};
use crate::MAX_CHANNELS;

#[derive(Debug, Clone, Copy, Default)]
struct ChannelProgress {
    /// Results the current run's program reports
    scheduled: u32,
    /// Result words landed so far, completion word included
    processed: u32,
}

/// Wait result slots for all channels
pub struct WaitStore<const SLOTS: usize> {
    slots: [AtomicU32; SLOTS],
    progress: Mutex<CriticalSectionRawMutex, Cell<[ChannelProgress; MAX_CHANNELS]>>,
}

impl<const SLOTS: usize> Default for WaitStore<SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SLOTS: usize> WaitStore<SLOTS> {
    /// Addressable wait results shared by all channels
    pub const CAPACITY: usize = SLOTS - MAX_CHANNELS;

    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicU32::new(0) }; SLOTS],
            progress: Mutex::new(Cell::new(
                [ChannelProgress {
                    scheduled: 0,
                    processed: 0,
                }; MAX_CHANNELS],
            )),
        }
    }

    fn update(&self, channel: u8, f: impl FnOnce(&mut ChannelProgress)) {
        self.progress.lock(|cell| {
            let mut all = cell.get();
            if let Some(progress) = all.get_mut(channel as usize) {
                f(progress);
                cell.set(all);
            }
        });
    }

    fn progress(&self, channel: u8) -> ChannelProgress {
        self.progress
            .lock(|cell| cell.get().get(channel as usize).copied().unwrap_or_default())
    }

    /// Forget every channel's progress, ahead of a new run
    pub(crate) fn reset_progress(&self) {
        self.progress
            .lock(|cell| cell.set([ChannelProgress::default(); MAX_CHANNELS]));
    }

    /// Zero every result slot
    pub(crate) fn clear(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Zero a channel's result slots
    pub(crate) fn clear_channel(&self, layout: &Layout, channel: u8) {
        for slot in &self.slots[layout.wait_region(channel)] {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Record how many results the channel reports this run
    pub(crate) fn schedule(&self, channel: u8, waits: u32) {
        self.update(channel, |p| p.scheduled = waits);
    }

    /// Publish result words landed so far
    ///
    /// Never moves the count backwards.
    pub(crate) fn record_progress(&self, channel: u8, processed: u32) {
        self.update(channel, |p| p.processed = p.processed.max(processed));
    }

    /// Result words landed so far in the current or last run
    pub fn processed(&self, channel: u8) -> u32 {
        self.progress(channel).processed
    }

    /// Results the current or last run reports
    pub fn scheduled(&self, channel: u8) -> u32 {
        self.progress(channel).scheduled
    }

    /// Result of wait `index`: remaining timeout ticks when the trigger
    /// arrived, or [`WAIT_TIMEOUT_SENTINEL`] if it never did
    pub fn get(&self, layout: &Layout, channel: u8, index: usize) -> Result<u32, EngineError> {
        layout.check_channel(channel)?;
        if index >= layout.wait_capacity() {
            return Err(EngineError::InvalidAddress);
        }

        let progress = self.progress(channel);
        if index >= progress.scheduled as usize {
            return Err(EngineError::InvalidAddress);
        }
        if index >= progress.processed as usize {
            return Err(EngineError::WaitNotYetAvailable);
        }

        // Landed results are published under the progress lock above
        let raw = self.slots[layout.wait_region(channel).start + index].load(Ordering::Relaxed);
        Ok(if raw == WAIT_TIMEOUT_SENTINEL {
            raw
        } else {
            raw.saturating_mul(WAIT_LOOP_CYCLES)
        })
    }

    /// The first `count` slots of a channel's region, for the result stream
    pub fn result_slots(&self, layout: &Layout, channel: u8, count: usize) -> &[AtomicU32] {
        let region = layout.wait_region(channel);
        let end = region.start + count.min(region.len());
        &self.slots[region.start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Store = WaitStore<{ 8 + MAX_CHANNELS }>;

    fn layout() -> Layout {
        Layout::new(2, 16, Store::CAPACITY).unwrap()
    }

    fn land(store: &Store, layout: &Layout, channel: u8, words: &[u32]) {
        let slots = store.result_slots(layout, channel, words.len());
        for (slot, word) in slots.iter().zip(words) {
            slot.store(*word, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_results_scaled_to_ticks() {
        let store = Store::new();
        let layout = layout();
        store.schedule(1, 2);
        land(&store, &layout, 1, &[40, WAIT_TIMEOUT_SENTINEL, 0]);
        store.record_progress(1, 2);

        assert_eq!(store.get(&layout, 1, 0), Ok(80));
        assert_eq!(store.get(&layout, 1, 1), Ok(WAIT_TIMEOUT_SENTINEL));
    }

    #[test]
    fn test_not_yet_available() {
        let store = Store::new();
        let layout = layout();
        store.schedule(0, 3);
        store.record_progress(0, 1);
        assert!(store.get(&layout, 0, 0).is_ok());
        assert_eq!(store.get(&layout, 0, 1), Err(EngineError::WaitNotYetAvailable));
    }

    #[test]
    fn test_unscheduled_index_is_invalid() {
        let store = Store::new();
        let layout = layout();
        store.schedule(0, 1);
        store.record_progress(0, 2);
        assert_eq!(store.get(&layout, 0, 1), Err(EngineError::InvalidAddress));
        assert_eq!(store.get(&layout, 0, 4), Err(EngineError::InvalidAddress));
        assert_eq!(store.get(&layout, 2, 0), Err(EngineError::InvalidChannel));
    }

    #[test]
    fn test_progress_is_monotonic_until_reset() {
        let store = Store::new();
        store.record_progress(0, 3);
        store.record_progress(0, 1);
        assert_eq!(store.processed(0), 3);
        store.reset_progress();
        assert_eq!(store.processed(0), 0);
        assert_eq!(store.scheduled(0), 0);
    }

    #[test]
    fn test_clear_channel_only_touches_its_region() {
        let store = Store::new();
        let layout = layout();
        land(&store, &layout, 0, &[7, 7]);
        land(&store, &layout, 1, &[9, 9]);
        store.clear_channel(&layout, 0);

        store.schedule(0, 2);
        store.schedule(1, 2);
        store.record_progress(0, 2);
        store.record_progress(1, 2);
        assert_eq!(store.get(&layout, 0, 0), Ok(0));
        assert_eq!(store.get(&layout, 1, 1), Ok(18));
    }
}
