pub use serde_with;

pub mod device;
pub mod sample;
pub mod track;

pub use device::DeviceId;
pub use sample::{LocationSample, RangeError, Timestamp};
pub use track::{SessionState, TrackSnapshot, TrackState};

pub trait ExampleData {
    fn example_data() -> Self;
}
