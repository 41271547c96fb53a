//! Utility modules: clock, timeout.

pub mod clock;
pub mod timeout;

pub use clock::{Clock, ManualClock, SystemClock};
