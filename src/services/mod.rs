//! Services - counting logic and state management
//!
//! This module contains the core counting services:
//! - `counter` - Control loop tying the pieces below together
//! - `sampler` - Alternating zone reads with a min-filter window
//! - `path_tracker` - Zone-transition history and crossing detection
//! - `calibrator` - Floor statistics, range mode and threshold derivation
//! - `ranging` - Range mode tiers and sensor programming
//! - `health` - Ranging status tracking

pub mod calibrator;
pub mod counter;
pub mod health;
pub mod path_tracker;
pub mod ranging;
pub mod sampler;

// Re-export commonly used types
pub use calibrator::Calibrator;
pub use counter::{ControlCommand, PeopleCounter, SetupError};
pub use path_tracker::PathTracker;
pub use sampler::ZoneSampler;
