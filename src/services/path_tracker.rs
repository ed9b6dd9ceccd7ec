//! Direction detection from two alternating occupancy signals
//!
//! Every time either side changes occupancy, the combined status of both
//! sides is recorded as a 2-bit code (bit 0 = left occupied, bit 1 = right
//! occupied). A single person walking through the doorway produces
//!
//! ```text
//! 0 -> 1 -> 3 -> 2 -> 0   left to right  (exit)
//! 0 -> 2 -> 3 -> 1 -> 0   right to left  (entry)
//! ```
//!
//! Only these two interior sequences count. Anything else that returns to
//! "nobody anywhere" (someone stepping in and back out, glitches) is dropped.

use crate::domain::types::{Direction, Occupancy, ZoneId};
use tracing::{debug, info};

const HISTORY_LEN: usize = 4;

const LEFT_BIT: u8 = 1;
const RIGHT_BIT: u8 = 2;

const EXIT_PATH: [u8; 3] = [1, 3, 2];
const ENTRY_PATH: [u8; 3] = [2, 3, 1];

/// What a single tracking step produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackOutcome {
    /// Completed crossing, if this tick closed one
    pub direction: Option<Direction>,
    /// Presence signal to publish this tick
    pub presence: Option<bool>,
    /// A full 4-step cycle ended; windowed sample history is stale
    pub reset_windows: bool,
    /// A full cycle ended without a recognised path
    pub discarded: bool,
}

/// Path-tracking automaton
#[derive(Debug, Clone)]
pub struct PathTracker {
    history: [u8; HISTORY_LEN],
    /// Starts at 1: slot 0 always holds "nobody anywhere"
    filling_size: usize,
    left_previous: Occupancy,
    right_previous: Occupancy,
    invert_direction: bool,
}

impl PathTracker {
    pub fn new(invert_direction: bool) -> Self {
        Self {
            history: [0; HISTORY_LEN],
            filling_size: 1,
            left_previous: Occupancy::Nobody,
            right_previous: Occupancy::Nobody,
            invert_direction,
        }
    }

    /// Zone that plays the left side of the doorway
    #[inline]
    pub fn left_zone(&self) -> ZoneId {
        if self.invert_direction {
            ZoneId::Exit
        } else {
            ZoneId::Entry
        }
    }

    /// Feed the classification of the zone sampled this tick
    pub fn track(&mut self, zone: ZoneId, status: Occupancy) -> TrackOutcome {
        let mut outcome = TrackOutcome::default();
        if status.is_someone() {
            outcome.presence = Some(true);
        }

        let mut event_occurred = false;
        let mut all_zones_status = 0u8;

        if zone == self.left_zone() {
            if status != self.left_previous {
                event_occurred = true;
                if status.is_someone() {
                    all_zones_status |= LEFT_BIT;
                }
                if self.right_previous.is_someone() {
                    all_zones_status |= RIGHT_BIT;
                }
                self.left_previous = status;
            }
        } else if status != self.right_previous {
            event_occurred = true;
            if status.is_someone() {
                all_zones_status |= RIGHT_BIT;
            }
            if self.left_previous.is_someone() {
                all_zones_status |= LEFT_BIT;
            }
            self.right_previous = status;
        }

        if event_occurred {
            if self.filling_size < HISTORY_LEN {
                self.filling_size += 1;
            }

            if self.nobody_anywhere() {
                if self.filling_size == HISTORY_LEN {
                    outcome.direction = self.match_path();
                    outcome.discarded = outcome.direction.is_none();
                    outcome.reset_windows = true;
                    if outcome.discarded {
                        debug!(path = ?self.history, "path_discarded");
                    }
                } else {
                    debug!(filling_size = self.filling_size, "path_abandoned");
                }
                self.filling_size = 1;
            } else {
                self.history[self.filling_size - 1] = all_zones_status;
            }
        }

        if !status.is_someone() && self.nobody_anywhere() {
            outcome.presence = Some(false);
        }

        outcome
    }

    fn match_path(&self) -> Option<Direction> {
        let interior = &self.history[1..];
        let direction = if interior == EXIT_PATH {
            Some(Direction::Exit)
        } else if interior == ENTRY_PATH {
            Some(Direction::Entry)
        } else {
            None
        };
        if let Some(direction) = direction {
            info!(direction = %direction.label(), path = ?self.history, "crossing_detected");
        }
        direction
    }

    #[inline]
    fn nobody_anywhere(&self) -> bool {
        self.left_previous == Occupancy::Nobody && self.right_previous == Occupancy::Nobody
    }

    pub fn filling_size(&self) -> usize {
        self.filling_size
    }

    pub fn history(&self) -> [u8; HISTORY_LEN] {
        self.history
    }

    pub fn previous(&self) -> (Occupancy, Occupancy) {
        (self.left_previous, self.right_previous)
    }
}
