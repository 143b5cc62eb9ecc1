use crate::track::graph::{EdgeId, NodeId};
use crate::train::kinematics::TrainDirection;
use crate::yard::{PositionUpdate, TrainId};

#[derive(Debug, Default)]
pub struct History {
    pub dispatch: Vec<DispatchLogEvent>,
    pub trains: Vec<(String, Vec<TrainLogEvent>)>,
}

/// Reservation table activity and world-level faults, logged from the
/// dispatch context.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchLogEvent {
    Granted { train: TrainId, edge: EdgeId },
    Queued { train: TrainId, edge: EdgeId },
    Transferred { train: TrainId, edge: EdgeId },
    Freed { edge: EdgeId },
    NavigationComplete { train: TrainId, node: NodeId },
    Deadlock { trains: Vec<TrainId> },
    WorldStopped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainLogEvent {
    Departed { from: NodeId, to: NodeId },
    Position(PositionUpdate),
    DirectionChanged(TrainDirection),
    Reserved(EdgeId),
    Released(EdgeId),
    GuardStop(EdgeId),
    Resumed(EdgeId),
    StoppedAt(NodeId),
    NavigationCompleted(NodeId),
    Exception(String),
}
