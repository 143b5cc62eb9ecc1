//! Deterministic cooperative event simulation.

pub mod simulation;
pub mod observable;
pub mod channel;

pub use self::simulation::{EventId, Process, ProcessId, ProcessState, Scheduler, Simulation};
pub use self::observable::Observable;
pub use self::channel::Channel;
