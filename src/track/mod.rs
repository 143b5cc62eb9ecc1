//! Track graph and routing.

pub mod graph;
pub mod path;

pub use self::graph::{Branch, BranchPair, Edge, EdgeId, Node, NodeId, Track, TrackBuilder};
pub use self::path::find_path;
