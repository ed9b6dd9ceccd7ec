//! Shared types for the doorway counter

use serde::{Deserialize, Serialize};

/// Logical identity of one of the two sensing zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneId {
    Entry,
    Exit,
}

impl ZoneId {
    /// Both zones in sampling order
    pub const ALL: [ZoneId; 2] = [ZoneId::Entry, ZoneId::Exit];

    /// Array index used for per-zone storage
    #[inline]
    pub fn index(self) -> usize {
        match self {
            ZoneId::Entry => 0,
            ZoneId::Exit => 1,
        }
    }

    /// The zone sampled after this one
    #[inline]
    pub fn other(self) -> ZoneId {
        match self {
            ZoneId::Entry => ZoneId::Exit,
            ZoneId::Exit => ZoneId::Entry,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneId::Entry => "entry",
            ZoneId::Exit => "exit",
        }
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Occupancy classification of a single zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occupancy {
    #[default]
    Nobody,
    Someone,
}

impl Occupancy {
    #[inline]
    pub fn is_someone(self) -> bool {
        self == Occupancy::Someone
    }
}

/// Direction of a completed doorway crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    /// Signed change applied to the running people count
    #[inline]
    pub fn delta(self) -> i64 {
        match self {
            Direction::Entry => 1,
            Direction::Exit => -1,
        }
    }

    /// Human-readable event label
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Entry => "Entry",
            Direction::Exit => "Exit",
        }
    }
}

/// Region of interest on the sensor's SPAD array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roi {
    pub width: u8,
    pub height: u8,
    /// Optical center, encoded as a SPAD index
    pub center: u8,
}

/// Status code returned by the ranging driver.
///
/// Initialization errors are negative, range statuses are small positive
/// values, and `0` is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
pub struct SensorStatus(pub i16);

impl SensorStatus {
    pub const OK: SensorStatus = SensorStatus(0);

    /// Codes below this value are range/timeout conditions, not driver faults
    pub const TRANSIENT_CEILING: i16 = 28;

    #[inline]
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    #[inline]
    pub fn is_transient_error(self) -> bool {
        !self.is_ok() && self.0 < Self::TRANSIENT_CEILING
    }
}

impl Default for SensorStatus {
    fn default() -> Self {
        Self::OK
    }
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical distance mode of the ranging sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMode {
    Short = 1,
    Long = 2,
}

/// Timing budgets per range tier (ms)
pub const TIMING_BUDGET_SHORT_MS: u16 = 15;
pub const TIMING_BUDGET_MEDIUM_MS: u16 = 33;
pub const TIMING_BUDGET_MEDIUM_LONG_MS: u16 = 50;
pub const TIMING_BUDGET_LONG_MS: u16 = 100;
pub const TIMING_BUDGET_MAX_MS: u16 = 200;

/// Range tier trading maximum distance for timing budget and noise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    Short,
    Medium,
    MediumLong,
    Long,
    Max,
    /// Long distance mode with an operator-supplied timing budget
    Custom(u16),
}

impl RangeMode {
    pub fn timing_budget_ms(self) -> u16 {
        match self {
            RangeMode::Short => TIMING_BUDGET_SHORT_MS,
            RangeMode::Medium => TIMING_BUDGET_MEDIUM_MS,
            RangeMode::MediumLong => TIMING_BUDGET_MEDIUM_LONG_MS,
            RangeMode::Long => TIMING_BUDGET_LONG_MS,
            RangeMode::Max => TIMING_BUDGET_MAX_MS,
            RangeMode::Custom(budget) => budget,
        }
    }

    pub fn distance_mode(self) -> DistanceMode {
        match self {
            RangeMode::Short => DistanceMode::Short,
            _ => DistanceMode::Long,
        }
    }

    /// Delay between two measurements for this tier
    #[inline]
    pub fn inter_measurement_ms(self) -> u16 {
        self.timing_budget_ms().saturating_add(5)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeMode::Short => "short",
            RangeMode::Medium => "medium",
            RangeMode::MediumLong => "medium_long",
            RangeMode::Long => "long",
            RangeMode::Max => "max",
            RangeMode::Custom(_) => "custom",
        }
    }
}
