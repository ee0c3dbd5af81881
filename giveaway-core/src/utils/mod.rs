pub mod clock;

pub use clock::{Clock, SystemClock, time_until};
