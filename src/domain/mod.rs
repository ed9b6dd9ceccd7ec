//! Domain models - sensing zones and the types shared by every layer
//!
//! - `Zone` - one of the two logical regions of the sensor's field of view
//! - `ZoneId`, `Occupancy`, `Direction` - classification results
//! - `Roi`, `RangeMode`, `DistanceMode`, `SensorStatus` - sensor vocabulary

pub mod types;
pub mod zone;

pub use types::{Direction, DistanceMode, Occupancy, RangeMode, Roi, SensorStatus, ZoneId};
pub use zone::{Reading, Zone, ZoneSnapshot};
