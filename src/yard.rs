//! The shared simulation world: track statics, switch state, the
//! reservation table, and per-train telemetry observables.

use crate::dispatch::Arbiter;
use crate::eventsim::{Observable, Scheduler, Simulation};
use crate::track::graph::{Branch, EdgeId, NodeId, Track};
use crate::train::kinematics::TrainDirection;

pub type TrainId = usize;

pub type Sim = Simulation<Yard>;

/// Snapshot of a train's location and motion, published at the
/// telemetry cadence.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PositionUpdate {
    pub train: TrainId,
    pub direction: TrainDirection,
    pub node: NodeId,
    pub edge: Option<EdgeId>,
    pub offset: f64,
    pub velocity: f64,
}

/// Externally observable per-train state.
#[derive(Debug)]
pub struct TrainTelemetry {
    pub name: String,
    pub position: Observable<PositionUpdate>,
    pub destination: Observable<Option<NodeId>>,
    pub reservations: Observable<Vec<EdgeId>>,
}

pub struct Yard {
    pub track: Track,
    pub switches: Vec<Branch>,
    pub arbiter: Arbiter,
    pub trains: Vec<TrainTelemetry>,
    pub halted: bool,
    pub fault: Option<failure::Error>,
}

impl Yard {
    pub fn new(scheduler: &mut Scheduler, track: Track) -> Yard {
        let switches = vec![Branch::Straight; track.nodes.len()];
        let arbiter = Arbiter::new(scheduler, &track);
        Yard {
            track: track,
            switches: switches,
            arbiter: arbiter,
            trains: Vec::new(),
            halted: false,
            fault: None,
        }
    }

    /// Stops the world: no event fires until the pause is lifted from
    /// the outside.
    pub fn halt(&mut self, fault: failure::Error) {
        if !self.halted {
            self.halted = true;
            self.fault = Some(fault);
        }
    }
}
