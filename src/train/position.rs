use crate::track::graph::{Branch, EdgeId, NodeId, Track};
use crate::train::kinematics::TrainDirection;
use failure::Fail;
use smallvec::SmallVec;

// Rollover slack for stops landing exactly on a node boundary.
const EDGE_EPSILON: f64 = 1e-6;

// A finished stop must land within one unit of a node.
const NODE_TOLERANCE: f64 = 1.0;

#[derive(Debug, Fail)]
pub enum PositionError {
    #[fail(
        display = "stopped {} units into an edge of length {}, outside node tolerance",
        offset, length
    )]
    Diverged { offset: f64, length: f64 },
}

/// The next edge out of `node` in travel direction `dir`: the branch
/// pair for that direction, disambiguated by the node's switch state.
pub fn next_edge(track: &Track, switches: &[Branch], node: NodeId, dir: TrainDirection) -> Option<EdgeId> {
    let pair = match dir {
        TrainDirection::Forward => &track.nodes[node].forward,
        TrainDirection::Backward => &track.nodes[node].reverse,
    };
    pair.active(switches[node])
}

/// Projection of a train onto the track: the node most recently passed,
/// the edge currently being traversed, and the offset along it. A
/// missing edge means the train faces a dead end.
#[derive(Debug, Copy, Clone)]
pub struct TrainPosition {
    pub node: NodeId,
    pub edge: Option<EdgeId>,
    pub offset: f64,
}

impl TrainPosition {
    pub fn at_node(track: &Track, switches: &[Branch], node: NodeId, dir: TrainDirection) -> TrainPosition {
        TrainPosition {
            node: node,
            edge: next_edge(track, switches, node, dir),
            offset: 0.0,
        }
    }

    /// Moves `delta` units along the current edge, hopping across nodes
    /// on rollover. Returns the edges that were fully traversed, in
    /// order, so their reservations can be released behind the train.
    pub fn advance(
        &mut self,
        track: &Track,
        switches: &[Branch],
        dir: TrainDirection,
        delta: f64,
    ) -> SmallVec<[EdgeId; 2]> {
        let mut departed = SmallVec::new();
        if self.edge.is_none() {
            return departed;
        }
        self.offset += delta;
        while let Some(e) = self.edge {
            let length = track.edges[e].length as f64;
            if self.offset + EDGE_EPSILON < length {
                break;
            }
            self.offset = (self.offset - length).max(0.0);
            self.node = track.edges[e].dest;
            departed.push(e);
            self.edge = next_edge(track, switches, self.node, dir);
            if self.edge.is_none() {
                self.offset = 0.0;
            }
        }
        departed
    }

    /// A switch moved under node `n`. If the train is still at `n` the
    /// active branch is re-selected before the train commits to it.
    pub fn switch_changed(&mut self, track: &Track, switches: &[Branch], dir: TrainDirection, n: NodeId) {
        if self.node == n {
            self.edge = next_edge(track, switches, n, dir);
        }
    }

    /// Re-selects the current edge, used when the travel direction has
    /// flipped in place.
    pub fn reorient(&mut self, track: &Track, switches: &[Branch], dir: TrainDirection) {
        self.edge = next_edge(track, switches, self.node, dir);
    }

    /// Snaps to the nearest node once a scheduled stop has completed.
    /// Returns the edge left behind when the snap crosses it.
    pub fn normalize_to_closest_node(
        &mut self,
        track: &Track,
        switches: &[Branch],
        dir: TrainDirection,
    ) -> Result<Option<EdgeId>, PositionError> {
        let e = match self.edge {
            Some(e) => e,
            None => {
                self.offset = 0.0;
                return Ok(None);
            }
        };
        let length = track.edges[e].length as f64;
        if self.offset < NODE_TOLERANCE {
            self.offset = 0.0;
            Ok(None)
        } else if length - self.offset < NODE_TOLERANCE {
            self.node = track.edges[e].dest;
            self.edge = next_edge(track, switches, self.node, dir);
            self.offset = 0.0;
            Ok(Some(e))
        } else {
            Err(PositionError::Diverged {
                offset: self.offset,
                length: length,
            })
        }
    }
}
