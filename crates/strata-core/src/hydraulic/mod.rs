//! Flow-network collaborator: traversal order, hydraulic geometry and the
//! external sediment inlet.
//!
//! The engine only sees the [`FlowNetwork`] trait.  [`StreamNetwork`] is the
//! reference implementation: priority-flood routing on the mesh, drainage
//! accumulation, discharge from effective rainfall and power-law channel
//! geometry.
pub mod flow_routing;
pub mod geometry;
pub mod stream_network;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mesh::{Mesh, NodeId};
pub use geometry::HydraulicGeometry;
pub use stream_network::StreamNetwork;

/// External sediment and water source entering the mesh at one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedimentInlet {
    pub node: NodeId,
    /// Sediment supply per grain class (m³ per time unit).
    pub supply: Vec<f64>,
    /// Water discharge added at the inlet (m³ per time unit).
    #[serde(default)]
    pub discharge: f64,
}

impl SedimentInlet {
    pub fn total_supply(&self) -> f64 {
        self.supply.iter().sum()
    }
}

/// What the erosion engine needs from the flow network.
pub trait FlowNetwork {
    /// Node ids in upstream-to-downstream order.  The downstream relation
    /// must be acyclic.
    fn sort_by_network_order(&mut self, mesh: &Mesh) -> Result<Vec<NodeId>>;

    /// Recompute width, depth and roughness from current discharge.
    fn update_hydraulic_geometry(&mut self, mesh: &mut Mesh);

    fn inlet(&self) -> Option<&SedimentInlet>;

    /// Rainfall rate (m per time unit).
    fn rainfall_rate(&self) -> f64;

    /// Infiltration capacity (m per time unit).
    fn infiltration_rate(&self) -> f64;

    /// Rainfall in excess of infiltration; non-positive means no runoff.
    fn effective_runoff(&self) -> f64 {
        self.rainfall_rate() - self.infiltration_rate()
    }
}
