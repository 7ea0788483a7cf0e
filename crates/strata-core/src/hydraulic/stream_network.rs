//! Reference flow network built from priority-flood routing.
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::flow_routing::{route_flow, RoutingSummary};
use super::{FlowNetwork, HydraulicGeometry, SedimentInlet};
use crate::error::{ErosionError, Result};
use crate::mesh::{Mesh, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamNetwork {
    /// m per time unit.
    pub rainfall: f64,
    /// m per time unit.
    pub infiltration: f64,
    pub inlet: Option<SedimentInlet>,
    pub geometry: HydraulicGeometry,
}

impl Default for StreamNetwork {
    fn default() -> Self {
        Self {
            rainfall: 1.0,
            infiltration: 0.0,
            inlet: None,
            geometry: HydraulicGeometry::default(),
        }
    }
}

impl StreamNetwork {
    pub fn new(rainfall: f64, infiltration: f64) -> Self {
        Self {
            rainfall,
            infiltration,
            ..Default::default()
        }
    }

    pub fn with_inlet(mut self, inlet: SedimentInlet) -> Self {
        self.inlet = Some(inlet);
        self
    }

    pub fn with_geometry(mut self, geometry: HydraulicGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Re-route flow on the current surface: receivers, drainage area,
    /// discharge, slopes and hydraulic geometry.
    pub fn update_net(&mut self, mesh: &mut Mesh) -> Result<RoutingSummary> {
        let summary = route_flow(mesh, self.effective_runoff(), self.inlet.as_ref())?;
        self.geometry.apply(mesh);
        Ok(summary)
    }
}

impl FlowNetwork for StreamNetwork {
    /// Kahn's algorithm over donors: a node is emitted once every node
    /// draining into it has been.
    fn sort_by_network_order(&mut self, mesh: &Mesh) -> Result<Vec<NodeId>> {
        let n = mesh.len();
        let mut donors = vec![0usize; n];
        for node in mesh.nodes() {
            if let Some(dn) = node.downstream {
                if dn >= n {
                    return Err(ErosionError::UnknownNode { node: dn, count: n });
                }
                donors[dn] += 1;
            }
        }

        let mut ready: VecDeque<NodeId> = (0..n).filter(|&id| donors[id] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(id) = ready.pop_front() {
            order.push(id);
            if let Some(dn) = mesh.node(id).downstream {
                donors[dn] -= 1;
                if donors[dn] == 0 {
                    ready.push_back(dn);
                }
            }
        }

        if order.len() < n {
            let node = (0..n).find(|&id| donors[id] > 0).unwrap_or(0);
            return Err(ErosionError::CyclicNetwork { node });
        }
        Ok(order)
    }

    fn update_hydraulic_geometry(&mut self, mesh: &mut Mesh) {
        self.geometry.apply(mesh);
    }

    fn inlet(&self) -> Option<&SedimentInlet> {
        self.inlet.as_ref()
    }

    fn rainfall_rate(&self) -> f64 {
        self.rainfall
    }

    fn infiltration_rate(&self) -> f64 {
        self.infiltration
    }
}
