//! Alternating zone sampling with minimum-filter denoising
//!
//! Both zones share one physical sensor, so each control-loop tick reads
//! exactly one zone and the next tick reads the other. Every zone keeps a
//! short FIFO window of its most recent healthy readings and the operative
//! distance is the window minimum: sensor noise mostly pushes readings up
//! (missed returns), so the minimum keeps a real occupant visible across a
//! single bad sample.

use crate::domain::types::ZoneId;
use crate::domain::zone::{Reading, Zone};
use crate::io::sensor::RangingSensor;
use crate::io::watchdog::Watchdog;
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::trace;

/// Upper bound for the configurable window size
pub const MAX_WINDOW_SIZE: usize = 16;

/// Raw calibration readings of one zone; typical attempt counts stay inline
pub type RawSamples = SmallVec<[u16; 128]>;

/// Fixed-capacity FIFO of recent raw distances
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<u16>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_WINDOW_SIZE);
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    /// Push a reading, evicting the oldest once full
    pub fn push(&mut self, distance_mm: u16) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(distance_mm);
    }

    /// Minimum of the current contents
    pub fn min(&self) -> Option<u16> {
        self.samples.iter().copied().min()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &u16> {
        self.samples.iter()
    }
}

/// Result of sampling the zone whose turn it is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub zone: ZoneId,
    pub raw: Reading,
    /// Window minimum; `None` until the zone has one healthy reading
    pub denoised: Option<u16>,
}

/// Alternating reader owning one sample window per zone
pub struct ZoneSampler {
    windows: [SampleWindow; 2],
    current: ZoneId,
}

impl ZoneSampler {
    pub fn new(window_size: usize) -> Self {
        Self {
            windows: [SampleWindow::new(window_size), SampleWindow::new(window_size)],
            current: ZoneId::Entry,
        }
    }

    /// Zone that the next call to `sample` will read
    pub fn current_zone(&self) -> ZoneId {
        self.current
    }

    /// Restart the alternation at the entry zone
    pub fn restart(&mut self) {
        self.current = ZoneId::Entry;
    }

    /// Read the current zone once, fold the reading into its window and
    /// advance to the other zone.
    ///
    /// Failed reads are reported in `raw.status` but never enter the window.
    pub fn sample<S: RangingSensor + ?Sized>(
        &mut self,
        zones: &mut [Zone; 2],
        sensor: &mut S,
    ) -> Sample {
        let zone = self.current;
        let raw = zones[zone.index()].read_distance(sensor);
        let window = &mut self.windows[zone.index()];
        if raw.status.is_ok() {
            window.push(raw.distance_mm);
        }
        let denoised = window.min();
        trace!(
            zone = %zone,
            raw_mm = raw.distance_mm,
            status = %raw.status,
            denoised_mm = ?denoised,
            window_len = window.len(),
            "zone_sampled"
        );
        self.current = zone.other();
        Sample { zone, raw, denoised }
    }

    /// Read both zones `attempts` times (entry first in each pair), bypassing
    /// the windows. Used by calibration, which needs every raw value.
    ///
    /// Failed reads are retained as-is, matching what the sensor reported.
    pub fn collect_raw<S: RangingSensor + ?Sized>(
        zones: &mut [Zone; 2],
        sensor: &mut S,
        attempts: usize,
        watchdog: &dyn Watchdog,
    ) -> [RawSamples; 2] {
        let mut entry = RawSamples::with_capacity(attempts);
        let mut exit = RawSamples::with_capacity(attempts);
        for _ in 0..attempts {
            entry.push(zones[ZoneId::Entry.index()].read_distance(sensor).distance_mm);
            watchdog.feed();
            exit.push(zones[ZoneId::Exit.index()].read_distance(sensor).distance_mm);
            watchdog.feed();
        }
        [entry, exit]
    }

    /// Drop all windowed history (after a completed crossing)
    pub fn clear_windows(&mut self) {
        for window in &mut self.windows {
            window.clear();
        }
    }

    pub fn window(&self, zone: ZoneId) -> &SampleWindow {
        &self.windows[zone.index()]
    }
}
