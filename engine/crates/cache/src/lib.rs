pub mod clock;
pub mod error;
pub mod pattern;
pub mod store;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::CacheError;
pub use store::CacheStore;
