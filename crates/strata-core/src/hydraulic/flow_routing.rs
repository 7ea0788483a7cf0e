//! Priority-flood flow routing on the mesh.
//!
//! Flooding starts from the open outlets and grows inward in order of
//! "filled" elevation, so every pit is filled to its spill level.  Each
//! interior node drains to its steepest neighbour on the filled surface,
//! falling back to the neighbour it was flooded from on flats and in
//! lakes.  Filled elevations never increase along the chosen receivers and
//! flats only follow the flood tree, so the receiver relation is acyclic.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use super::SedimentInlet;
use crate::error::{ErosionError, Result};
use crate::mesh::{Boundary, Mesh, NodeId};

/// Outcome of one routing pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingSummary {
    /// Nodes reached from an outlet, in downstream-to-upstream flood order.
    pub flood_order: Vec<NodeId>,
    /// Interior nodes sitting below their spill level.
    pub flooded: usize,
    /// Interior nodes with no path to any outlet.
    pub unreachable: usize,
}

/// Route water over `mesh`: receivers, flow lengths, flood flags, drainage
/// area, discharge `Q = runoff · area (+ inlet discharge)` and slopes.
pub fn route_flow(mesh: &mut Mesh, runoff: f64, inlet: Option<&SedimentInlet>) -> Result<RoutingSummary> {
    let n = mesh.len();
    if let Some(inlet) = inlet {
        mesh.try_node(inlet.node)?;
    }

    for node in mesh.nodes_mut() {
        node.downstream = None;
        node.flooded = false;
        node.flow_length = 0.0;
        node.drainage_area = 0.0;
        node.discharge = 0.0;
    }

    // ── Priority flood ───────────────────────────────────────────────────────
    let mut filled: Vec<f64> = mesh.nodes().iter().map(|nd| nd.z).collect();
    let mut processed = vec![false; n];
    let mut flood_parent: Vec<Option<(NodeId, usize)>> = vec![None; n];
    let mut flood_order = Vec::with_capacity(n);
    let mut queue: BinaryHeap<Reverse<(OrderedFloat<f64>, NodeId)>> = BinaryHeap::new();

    for node in mesh.nodes() {
        if node.boundary == Boundary::OpenOutlet {
            processed[node.id] = true;
            queue.push(Reverse((OrderedFloat(node.z), node.id)));
        }
    }

    while let Some(Reverse((level, id))) = queue.pop() {
        flood_order.push(id);
        let level = level.into_inner();
        for &(nb, e) in mesh.neighbors(id) {
            if processed[nb] || mesh.node(nb).boundary == Boundary::Closed {
                continue;
            }
            processed[nb] = true;
            filled[nb] = filled[nb].max(level);
            flood_parent[nb] = Some((id, e));
            queue.push(Reverse((OrderedFloat(filled[nb]), nb)));
        }
    }

    // ── Receivers ────────────────────────────────────────────────────────────
    let mut flooded = 0;
    let mut unreachable = 0;
    for id in 0..n {
        if !mesh.node(id).is_interior() {
            continue;
        }
        if !processed[id] {
            mesh.node_mut(id).flooded = true;
            unreachable += 1;
            continue;
        }

        let mut best: Option<(NodeId, usize, f64)> = None;
        for &(nb, e) in mesh.neighbors(id) {
            if !processed[nb] || mesh.node(nb).boundary == Boundary::Closed {
                continue;
            }
            let length = mesh.edges()[e].length;
            if length <= 0.0 {
                continue;
            }
            let drop = (filled[id] - filled[nb]) / length;
            if drop > 0.0 && best.map_or(true, |(_, _, d)| drop > d) {
                best = Some((nb, e, drop));
            }
        }
        let Some((receiver, edge)) = best.map(|(nb, e, _)| (nb, e)).or(flood_parent[id]) else {
            return Err(ErosionError::UnknownNode { node: id, count: n });
        };

        let length = mesh.edges()[edge].length;
        let is_flooded = filled[id] > mesh.node(id).z;
        let node = mesh.node_mut(id);
        node.downstream = Some(receiver);
        node.flow_length = length;
        node.flooded = is_flooded;
        if is_flooded {
            flooded += 1;
        }
    }

    if unreachable > 0 {
        log::warn!("{unreachable} interior nodes have no path to an outlet and are treated as closed lakes");
    }

    // ── Accumulation, upstream first ─────────────────────────────────────────
    let runoff = runoff.max(0.0);
    let mut area: Vec<f64> = mesh.nodes().iter().map(|nd| nd.varea).collect();
    let mut discharge: Vec<f64> = area.iter().map(|a| runoff * a).collect();
    if let Some(inlet) = inlet {
        discharge[inlet.node] += inlet.discharge;
    }
    for &id in flood_order.iter().rev() {
        if let Some(dn) = mesh.node(id).downstream {
            area[dn] += area[id];
            discharge[dn] += discharge[id];
        }
    }
    for &id in &flood_order {
        let node = mesh.node_mut(id);
        node.drainage_area = area[id];
        node.discharge = discharge[id];
    }

    mesh.update_slopes();

    log::debug!(
        "routed {} of {n} nodes ({flooded} flooded, {unreachable} unreachable)",
        flood_order.len()
    );

    Ok(RoutingSummary {
        flood_order,
        flooded,
        unreachable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Layer, LayerStack, Material, RasterMeshBuilder};
    use approx::assert_relative_eq;

    fn make_layers() -> LayerStack {
        LayerStack::new(vec![Layer::new(vec![10.0], 1.0e-3, Material::Bedrock, 0.0)], 1.0e-2)
    }

    /// South-draining ramp with a little cross-slope so receivers are unique.
    fn make_ramp(cols: usize, rows: usize) -> (RasterMeshBuilder, Mesh) {
        let builder = RasterMeshBuilder::new(cols, rows, 10.0);
        let mesh = builder.build(|x, y| 0.1 * y + 0.001 * x, &make_layers()).unwrap();
        (builder, mesh)
    }

    fn assert_acyclic(mesh: &Mesh) {
        for start in mesh.interior_ids() {
            let mut id = start;
            let mut steps = 0;
            while let Some(dn) = mesh.node(id).downstream {
                id = dn;
                steps += 1;
                assert!(steps <= mesh.len(), "receiver chain from {start} loops");
            }
        }
    }

    #[test]
    fn ramp_drains_every_interior_node_to_the_outlet() {
        let (_, mut mesh) = make_ramp(5, 6);
        let summary = route_flow(&mut mesh, 1.0, None).unwrap();
        assert_eq!(summary.unreachable, 0);
        assert_eq!(summary.flooded, 0);
        assert_acyclic(&mesh);
        for id in mesh.interior_ids() {
            let node = mesh.node(id);
            assert!(node.downstream.is_some(), "node {id} has no receiver");
            assert!(node.slope >= 0.0, "node {id} slope {}", node.slope);
        }
    }

    #[test]
    fn discharge_is_runoff_times_area() {
        let (builder, mut mesh) = make_ramp(5, 6);
        route_flow(&mut mesh, 0.5, None).unwrap();
        for id in mesh.interior_ids() {
            let node = mesh.node(id);
            assert_relative_eq!(node.discharge, 0.5 * node.drainage_area, epsilon = 1e-9);
        }
        // Everything routed ends at the south outlets.
        let routed_area: f64 = mesh
            .interior_ids()
            .map(|id| mesh.node(id).varea)
            .sum();
        let outlet_inflow: f64 = (0..5)
            .map(|c| mesh.node(builder.index(0, c)).drainage_area - mesh.node(builder.index(0, c)).varea)
            .sum();
        assert_relative_eq!(outlet_inflow, routed_area, epsilon = 1e-9);
    }

    #[test]
    fn pit_is_flooded_and_drains_out() {
        let (builder, mut mesh) = make_ramp(5, 6);
        let pit = builder.index(3, 2);
        mesh.node_mut(pit).z = -5.0;
        let summary = route_flow(&mut mesh, 1.0, None).unwrap();
        assert!(summary.flooded >= 1);
        assert!(mesh.node(pit).flooded);
        assert!(mesh.node(pit).downstream.is_some());
        assert_eq!(mesh.node(pit).slope, 0.0);
        assert_acyclic(&mesh);
    }

    #[test]
    fn inlet_discharge_propagates_downstream() {
        let (builder, mut mesh) = make_ramp(5, 6);
        let inlet = SedimentInlet {
            node: builder.index(4, 2),
            supply: vec![0.0],
            discharge: 1000.0,
        };
        route_flow(&mut mesh, 0.0, Some(&inlet)).unwrap();
        let mut id = inlet.node;
        while let Some(dn) = mesh.node(id).downstream {
            assert_relative_eq!(mesh.node(dn).discharge, 1000.0);
            id = dn;
        }
    }

    #[test]
    fn inlet_outside_mesh_rejected() {
        let (_, mut mesh) = make_ramp(4, 4);
        let inlet = SedimentInlet {
            node: 99,
            supply: vec![1.0],
            discharge: 0.0,
        };
        assert!(matches!(
            route_flow(&mut mesh, 1.0, Some(&inlet)),
            Err(ErosionError::UnknownNode { node: 99, .. })
        ));
    }
}
