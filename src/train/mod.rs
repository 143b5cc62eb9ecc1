//! Per-train subsystems: kinematics, position tracking, navigation
//! compilation and execution, and the agent process itself.

pub mod kinematics;
pub mod position;
pub mod compiler;
pub mod executor;
pub mod agent;

pub use self::agent::TrainAgent;
pub use self::kinematics::{TrainDirection, TrainParams, TrainPhysics};
