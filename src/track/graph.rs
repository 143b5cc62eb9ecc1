use failure::Fail;
use std::collections::HashMap;

pub type NodeId = usize;
pub type EdgeId = usize;

pub type NameMap = HashMap<String, NodeId>;

/// Selects between the two outgoing edges of a branching node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Branch {
    Straight,
    Curve,
}

#[derive(Debug, Fail)]
pub enum TopologyError {
    #[fail(display = "node \"{}\" already exists", _0)]
    DuplicateNode(String),
    #[fail(display = "outgoing edges of node \"{}\" are already connected", _0)]
    AlreadyConnected(String),
    #[fail(display = "node \"{}\" cannot take more than two reverse edges", _0)]
    TooManyReverseEdges(String),
    #[fail(display = "zero-length edge from \"{}\" to \"{}\"", _0, _1)]
    ZeroLengthEdge(String, String),
}

/// Up to two outgoing edges in one direction. A curve edge exists only
/// when a straight edge also exists.
#[derive(Debug, Default, Clone)]
pub struct BranchPair {
    pub straight: Option<EdgeId>,
    pub curve: Option<EdgeId>,
}

impl BranchPair {
    pub fn count(&self) -> usize {
        self.straight.iter().count() + self.curve.iter().count()
    }

    /// The active edge of the pair under the given switch state.
    pub fn active(&self, switch: Branch) -> Option<EdgeId> {
        match (self.straight, self.curve) {
            (Some(s), None) => Some(s),
            (Some(s), Some(c)) => match switch {
                Branch::Straight => Some(s),
                Branch::Curve => Some(c),
            },
            (None, Some(c)) => Some(c),
            (None, None) => None,
        }
    }

}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub forward: BranchPair,
    pub reverse: BranchPair,
}

impl Node {
    pub fn edge_count(&self) -> usize {
        self.forward.count() + self.reverse.count()
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Edge {
    pub source: NodeId,
    pub dest: NodeId,
    pub length: u32,
    pub reverse: EdgeId,
}

/// Immutable rail topology. Switch state is runtime state and lives
/// outside the track, next to the reservation table.
#[derive(Debug)]
pub struct Track {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub node_names: NameMap,
}

impl Track {
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_names.get(name).cloned()
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        &self.nodes[node].name
    }

    /// Edges are created in forward/reverse couples, so a directed edge
    /// and its reverse share one exclusive track segment.
    pub fn segment(&self, edge: EdgeId) -> usize {
        edge / 2
    }

    pub fn segment_count(&self) -> usize {
        self.edges.len() / 2
    }

    pub fn edge_label(&self, edge: EdgeId) -> String {
        let e = &self.edges[edge];
        format!("{}->{}", self.nodes[e.source].name, self.nodes[e.dest].name)
    }
}

/// Builds a track from node declarations. Each node declares its forward
/// edges at most once: either a single straight edge or a straight/curve
/// pair. Reverse edges are derived.
pub struct TrackBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_names: NameMap,
}

impl TrackBuilder {
    pub fn new() -> TrackBuilder {
        TrackBuilder {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_names: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, name: &str) -> Result<NodeId, TopologyError> {
        if self.node_names.contains_key(name) {
            return Err(TopologyError::DuplicateNode(name.to_string()));
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            forward: Default::default(),
            reverse: Default::default(),
        });
        self.node_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declares a single forward edge out of `from`.
    pub fn connect(&mut self, from: NodeId, to: NodeId, length: u32) -> Result<EdgeId, TopologyError> {
        if self.nodes[from].forward.count() > 0 {
            return Err(TopologyError::AlreadyConnected(self.nodes[from].name.clone()));
        }
        let e = self.add_edge_pair(from, to, length)?;
        self.nodes[from].forward.straight = Some(e);
        Ok(e)
    }

    /// Declares a branching pair of forward edges out of `from`.
    pub fn connect_branch(
        &mut self,
        from: NodeId,
        straight_to: NodeId,
        straight_length: u32,
        curve_to: NodeId,
        curve_length: u32,
    ) -> Result<(EdgeId, EdgeId), TopologyError> {
        if self.nodes[from].forward.count() > 0 {
            return Err(TopologyError::AlreadyConnected(self.nodes[from].name.clone()));
        }
        let s = self.add_edge_pair(from, straight_to, straight_length)?;
        self.nodes[from].forward.straight = Some(s);
        let c = self.add_edge_pair(from, curve_to, curve_length)?;
        self.nodes[from].forward.curve = Some(c);
        Ok((s, c))
    }

    fn add_edge_pair(&mut self, from: NodeId, to: NodeId, length: u32) -> Result<EdgeId, TopologyError> {
        if length == 0 {
            return Err(TopologyError::ZeroLengthEdge(
                self.nodes[from].name.clone(),
                self.nodes[to].name.clone(),
            ));
        }
        let fwd = self.edges.len();
        let rev = fwd + 1;
        self.edges.push(Edge {
            source: from,
            dest: to,
            length: length,
            reverse: rev,
        });
        self.edges.push(Edge {
            source: to,
            dest: from,
            length: length,
            reverse: fwd,
        });

        let back = &mut self.nodes[to].reverse;
        if back.straight.is_none() {
            back.straight = Some(rev);
        } else if back.curve.is_none() {
            back.curve = Some(rev);
        } else {
            return Err(TopologyError::TooManyReverseEdges(self.nodes[to].name.clone()));
        }
        Ok(fwd)
    }

    pub fn build(self) -> Track {
        Track {
            nodes: self.nodes,
            edges: self.edges,
            node_names: self.node_names,
        }
    }
}
