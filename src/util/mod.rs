pub mod clock;

pub use clock::{Clock, ClockArc, ManualClock, SystemClock};
