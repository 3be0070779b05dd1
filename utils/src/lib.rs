//! Shared utilities for walletdb.

pub mod clock;
pub mod logging;

pub use clock::{Clock, NullClock, SystemClock};
pub use logging::{init_logging, LogFormat, UnknownLogFormat};
