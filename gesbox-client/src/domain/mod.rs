pub mod bucket;
pub mod device;
pub mod reading;

pub use bucket::{TimeBucket, UnknownBucket};
pub use device::DeviceFilter;
pub use reading::Reading;
