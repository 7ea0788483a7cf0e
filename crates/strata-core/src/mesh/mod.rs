//! Mesh collaborator: nodes, Voronoi-dual edges and per-node stratigraphy.
//!
//! Geometry is fixed for the duration of an engine call; only node state
//! changes.  Node insertion for adaptive refinement is delegated to a
//! [`MeshRefiner`].
pub mod layers;
pub mod node;
pub mod raster;
pub mod refine;

use serde::{Deserialize, Serialize};

use crate::error::{ErosionError, Result};
pub use layers::{Layer, LayerStack, Material};
pub use node::{Boundary, Node, NodeId};
pub use raster::{RasterMeshBuilder, Side};
pub use refine::EdgeMidpointRefiner;

/// Undirected mesh edge between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub a: NodeId,
    pub b: NodeId,
    /// Distance between the two nodes.
    pub length: f64,
    /// Length of the shared Voronoi face.
    pub voronoi_length: f64,
}

/// Node and edge collections plus adjacency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Per node: `(neighbour, edge index)`.
    adjacency: Vec<Vec<(NodeId, usize)>>,
    num_grain_sizes: usize,
}

impl Mesh {
    /// Build a mesh; node ids are reassigned to their index.
    pub fn new(mut nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self> {
        let count = nodes.len();
        let num_grain_sizes = nodes.first().map_or(1, |n| n.num_grain_sizes());
        for (i, node) in nodes.iter_mut().enumerate() {
            node.id = i;
            if node.num_grain_sizes() != num_grain_sizes || node.layers.num_grain_sizes() != num_grain_sizes {
                return Err(ErosionError::GrainClassMismatch {
                    context: "mesh node stratigraphy",
                    expected: num_grain_sizes,
                    found: node.layers.num_grain_sizes(),
                });
            }
        }

        let mut adjacency = vec![Vec::new(); count];
        for (e, edge) in edges.iter().enumerate() {
            for id in [edge.a, edge.b] {
                if id >= count {
                    return Err(ErosionError::UnknownNode { node: id, count });
                }
            }
            adjacency[edge.a].push((edge.b, e));
            adjacency[edge.b].push((edge.a, e));
        }

        Ok(Self {
            nodes,
            edges,
            adjacency,
            num_grain_sizes,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn try_node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(ErosionError::UnknownNode {
            node: id,
            count: self.nodes.len(),
        })
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn neighbors(&self, id: NodeId) -> &[(NodeId, usize)] {
        &self.adjacency[id]
    }

    pub fn num_grain_sizes(&self) -> usize {
        self.num_grain_sizes
    }

    pub fn interior_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|n| n.is_interior()).map(|n| n.id)
    }

    /// Flow may cross an edge unless one end is a closed boundary.
    pub fn edge_carries_flow(&self, edge: &Edge) -> bool {
        self.nodes[edge.a].boundary != Boundary::Closed && self.nodes[edge.b].boundary != Boundary::Closed
    }

    /// Slope from `edge.a` down to `edge.b`.
    pub fn edge_slope(&self, edge: &Edge) -> f64 {
        if edge.length > 0.0 {
            (self.nodes[edge.a].z - self.nodes[edge.b].z) / edge.length
        } else {
            0.0
        }
    }

    /// Recompute every routed node's slope toward its receiver from current
    /// elevations.  Flooded nodes are flat.
    pub fn update_slopes(&mut self) {
        for i in 0..self.nodes.len() {
            let Some(dn) = self.nodes[i].downstream else {
                self.nodes[i].slope = 0.0;
                continue;
            };
            let z_down = self.nodes[dn].z;
            let node = &mut self.nodes[i];
            let slope = if node.flow_length > 0.0 {
                (node.z - z_down) / node.flow_length
            } else {
                0.0
            };
            node.slope = if node.flooded { slope.max(0.0) } else { slope };
        }
    }

    /// Add a node and its edges (for refiners).  Returns the new id.
    pub fn insert_node(&mut self, mut node: Node, edges: &[Edge]) -> Result<NodeId> {
        if node.num_grain_sizes() != self.num_grain_sizes {
            return Err(ErosionError::GrainClassMismatch {
                context: "inserted node",
                expected: self.num_grain_sizes,
                found: node.num_grain_sizes(),
            });
        }
        let id = self.nodes.len();
        node.id = id;
        self.nodes.push(node);
        self.adjacency.push(Vec::new());
        for edge in edges {
            for end in [edge.a, edge.b] {
                if end >= self.nodes.len() {
                    return Err(ErosionError::UnknownNode {
                        node: end,
                        count: self.nodes.len(),
                    });
                }
            }
            let e = self.edges.len();
            self.edges.push(*edge);
            self.adjacency[edge.a].push((edge.b, e));
            self.adjacency[edge.b].push((edge.a, e));
        }
        Ok(id)
    }

    /// Area-weighted mean elevation of interior nodes.
    pub fn mean_elevation(&self) -> f64 {
        let (mass, area) = self
            .nodes
            .iter()
            .filter(|n| n.is_interior())
            .fold((0.0, 0.0), |(m, a), n| (m + n.z * n.varea, a + n.varea));
        if area > 0.0 {
            mass / area
        } else {
            0.0
        }
    }

    /// Σ z·varea over interior nodes.
    pub fn interior_volume(&self) -> f64 {
        self.nodes
            .iter()
            .filter(|n| n.is_interior())
            .map(|n| n.z * n.varea)
            .sum()
    }

    /// Max − min elevation over all nodes.
    pub fn relief(&self) -> f64 {
        let (lo, hi) = self
            .nodes
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), n| (lo.min(n.z), hi.max(n.z)));
        if self.nodes.is_empty() {
            0.0
        } else {
            hi - lo
        }
    }
}

/// Node insertion around a node whose flux exceeds the refinement threshold.
pub trait MeshRefiner {
    /// Insert new nodes around `node`; returns how many were added.
    fn add_nodes_around(&mut self, mesh: &mut Mesh, node: NodeId, time: f64) -> Result<usize>;
}
