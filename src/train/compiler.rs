use crate::track::graph::{Branch, EdgeId, NodeId, Track};
use crate::train::kinematics::TrainDirection;
use failure::Fail;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TrackElement {
    Node(NodeId),
    Edge(EdgeId),
}

/// One atomic instruction of a compiled navigation program.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NavigationEvent {
    SetDirection(TrainDirection),
    Reserve(TrackElement),
    SetSwitch(NodeId, Branch),
    Start,
    Stop {
        origin: NodeId,
        destination: NodeId,
        distance: f64,
    },
}

#[derive(Debug, Fail)]
pub enum CompileError {
    #[fail(display = "no edge connects \"{}\" to \"{}\"", from, to)]
    NoConnection { from: String, to: String },
}

pub struct NavigationPlan {
    pub events: Vec<NavigationEvent>,
    /// The edges the program reserves, in traversal order.
    pub reserved_edges: Vec<EdgeId>,
}

/// The edge connecting two adjacent nodes, its branch slot, and the
/// travel direction it requires.
fn resolve_hop(
    track: &Track,
    from: NodeId,
    to: NodeId,
) -> Result<(EdgeId, Branch, TrainDirection), CompileError> {
    let n = &track.nodes[from];
    let candidates = [
        (n.forward.straight, Branch::Straight, TrainDirection::Forward),
        (n.forward.curve, Branch::Curve, TrainDirection::Forward),
        (n.reverse.straight, Branch::Straight, TrainDirection::Backward),
        (n.reverse.curve, Branch::Curve, TrainDirection::Backward),
    ];
    for &(edge, branch, dir) in candidates.iter() {
        if let Some(e) = edge {
            if track.edges[e].dest == to {
                return Ok((e, branch, dir));
            }
        }
    }
    Err(CompileError::NoConnection {
        from: track.node_name(from).to_string(),
        to: track.node_name(to).to_string(),
    })
}

/// Compiles a node path into an ordered navigation program. The train
/// reserves its starting elements up front, then rolling reservations
/// and switch settings are interleaved with the hops; every direction
/// change is bracketed by a stop at the turnaround node and a fresh
/// start.
pub fn compile(
    track: &Track,
    initial_direction: TrainDirection,
    path: &[NodeId],
) -> Result<NavigationPlan, CompileError> {
    let mut events = Vec::new();
    let mut reserved_edges = Vec::new();
    if path.len() < 2 {
        return Ok(NavigationPlan {
            events: events,
            reserved_edges: reserved_edges,
        });
    }

    let (first_edge, _, first_dir) = resolve_hop(track, path[0], path[1])?;
    let mut direction = initial_direction;
    if first_dir != direction {
        // At path start the train is standing still, so it can flip in
        // place before departure.
        events.push(NavigationEvent::SetDirection(first_dir));
        direction = first_dir;
    }

    events.push(NavigationEvent::Reserve(TrackElement::Node(path[0])));
    events.push(NavigationEvent::Reserve(TrackElement::Edge(first_edge)));
    events.push(NavigationEvent::Reserve(TrackElement::Node(path[1])));
    reserved_edges.push(first_edge);
    events.push(NavigationEvent::Start);

    let mut origin = path[0];
    let mut segment_length = 0.0;

    for i in 0..path.len() - 1 {
        let (edge, branch, dir) = resolve_hop(track, path[i], path[i + 1])?;
        if dir != direction {
            events.push(NavigationEvent::Stop {
                origin: origin,
                destination: path[i],
                distance: segment_length,
            });
            events.push(NavigationEvent::SetDirection(dir));
            events.push(NavigationEvent::Reserve(TrackElement::Edge(edge)));
            events.push(NavigationEvent::Reserve(TrackElement::Node(path[i + 1])));
            events.push(NavigationEvent::SetSwitch(path[i], branch));
            events.push(NavigationEvent::Start);
            reserved_edges.push(edge);
            origin = path[i];
            direction = dir;
            segment_length = 0.0;
        } else if i > 0 {
            events.push(NavigationEvent::Reserve(TrackElement::Edge(edge)));
            events.push(NavigationEvent::Reserve(TrackElement::Node(path[i + 1])));
            events.push(NavigationEvent::SetSwitch(path[i], branch));
            reserved_edges.push(edge);
        } else {
            // First hop: the edge was reserved up front.
            events.push(NavigationEvent::SetSwitch(path[i], branch));
        }
        segment_length += track.edges[edge].length as f64;
    }

    events.push(NavigationEvent::Stop {
        origin: origin,
        destination: path[path.len() - 1],
        distance: segment_length,
    });

    Ok(NavigationPlan {
        events: events,
        reserved_edges: reserved_edges,
    })
}
