//! Telemetry collected for the outside world.

pub mod history;

pub use self::history::{DispatchLogEvent, History, TrainLogEvent};
