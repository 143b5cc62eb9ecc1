use super::graph::{EdgeId, NodeId, Track};
use failure::Fail;
use smallvec::SmallVec;
use std::collections::BinaryHeap;

#[derive(Debug, Fail)]
pub enum PathError {
    #[fail(display = "no path from \"{}\" to \"{}\"", from, to)]
    Unreachable { from: String, to: String },
}

#[derive(Eq, PartialEq)]
struct QueuedNode {
    dist: u64,
    seq: usize,
    node: NodeId,
}

use std::cmp::Ordering;
impl Ord for QueuedNode {
    fn cmp(&self, other: &QueuedNode) -> Ordering {
        // Flipped for a minimum heap; equal distances pop in insertion
        // order so ties follow neighbour declaration order.
        other.dist.cmp(&self.dist).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedNode {
    fn partial_cmp(&self, other: &QueuedNode) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn neighbours(track: &Track, node: NodeId, allow_reversing: bool) -> SmallVec<[EdgeId; 4]> {
    let mut out = SmallVec::new();
    let n = &track.nodes[node];
    out.extend(n.forward.straight);
    out.extend(n.forward.curve);
    if allow_reversing {
        out.extend(n.reverse.straight);
        out.extend(n.reverse.curve);
    }
    out
}

/// Minimum-length node sequence from `start` to `finish`, using forward
/// edges and, when `allow_reversing`, reverse edges as well. Switch
/// states do not constrain the search.
pub fn find_path(
    track: &Track,
    start: NodeId,
    finish: NodeId,
    allow_reversing: bool,
) -> Result<Vec<NodeId>, PathError> {
    if start == finish {
        return Ok(vec![start]);
    }

    let mut dist: Vec<Option<u64>> = vec![None; track.nodes.len()];
    let mut prev: Vec<Option<NodeId>> = vec![None; track.nodes.len()];
    let mut queue = BinaryHeap::new();
    let mut seq = 0;

    dist[start] = Some(0);
    queue.push(QueuedNode {
        dist: 0,
        seq: seq,
        node: start,
    });

    while let Some(QueuedNode { dist: d, node, .. }) = queue.pop() {
        if dist[node] != Some(d) {
            continue; // Superseded entry.
        }
        if node == finish {
            break;
        }
        for edge in neighbours(track, node, allow_reversing) {
            let e = &track.edges[edge];
            let nd = d + e.length as u64;
            if dist[e.dest].map(|old| nd < old).unwrap_or(true) {
                dist[e.dest] = Some(nd);
                prev[e.dest] = Some(node);
                seq += 1;
                queue.push(QueuedNode {
                    dist: nd,
                    seq: seq,
                    node: e.dest,
                });
            }
        }
    }

    if dist[finish].is_none() {
        return Err(PathError::Unreachable {
            from: track.node_name(start).to_string(),
            to: track.node_name(finish).to_string(),
        });
    }

    let mut path = vec![finish];
    let mut at = finish;
    while let Some(p) = prev[at] {
        path.push(p);
        at = p;
    }
    path.reverse();
    Ok(path)
}
