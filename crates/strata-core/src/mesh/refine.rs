//! Reference [`MeshRefiner`]: split a node's cell among new midpoint nodes.
//!
//! No retriangulation is done; the original edges stay and the new nodes
//! are stitched onto both ends of the edge they bisect.  Total cell area
//! and interior volume are unchanged.
use super::{Boundary, Edge, Mesh, MeshRefiner, Node, NodeId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeMidpointRefiner;

impl MeshRefiner for EdgeMidpointRefiner {
    fn add_nodes_around(&mut self, mesh: &mut Mesh, id: NodeId, time: f64) -> Result<usize> {
        let centre = mesh.try_node(id)?.clone();
        let targets: Vec<(NodeId, Edge)> = mesh
            .neighbors(id)
            .iter()
            .filter(|&&(nb, _)| mesh.node(nb).boundary != Boundary::Closed)
            .map(|&(nb, e)| (nb, mesh.edges()[e]))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let share = centre.varea / (targets.len() + 1) as f64;
        mesh.node_mut(id).varea = share;

        for (nb, edge) in &targets {
            let other = mesh.node(*nb);
            let (x, y) = (0.5 * (centre.x + other.x), 0.5 * (centre.y + other.y));
            let mut fresh = Node::new(0, x, y, centre.z, share, Boundary::Interior, centre.layers.clone());
            fresh.tau_crit = centre.tau_crit;

            let half = 0.5 * edge.length;
            let new_id = mesh.len();
            let stitches = [
                Edge { a: id, b: new_id, length: half, voronoi_length: edge.voronoi_length },
                Edge { a: new_id, b: *nb, length: half, voronoi_length: edge.voronoi_length },
            ];
            mesh.insert_node(fresh, &stitches)?;
        }
        log::trace!("t={time}: split node {id} into {} cells", targets.len() + 1);
        Ok(targets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Layer, LayerStack, Material, RasterMeshBuilder};
    use approx::assert_relative_eq;

    fn make_mesh() -> Mesh {
        let layers = LayerStack::new(vec![Layer::new(vec![3.0], 0.01, Material::Bedrock, 0.0)], 0.01);
        RasterMeshBuilder::new(3, 3, 10.0)
            .build(|x, y| x + y, &layers)
            .unwrap()
    }

    #[test]
    fn area_and_volume_conserved() {
        let mut mesh = make_mesh();
        let area_before: f64 = mesh.nodes().iter().map(|n| n.varea).sum();
        let volume_before = mesh.interior_volume();

        // Centre node: south side is open, the other three sides are closed.
        let added = EdgeMidpointRefiner.add_nodes_around(&mut mesh, 4, 0.0).unwrap();
        assert_eq!(added, 1, "only the open neighbour gets a midpoint");

        let area_after: f64 = mesh.nodes().iter().map(|n| n.varea).sum();
        assert_relative_eq!(area_after, area_before, epsilon = 1e-9);
        assert_relative_eq!(mesh.interior_volume(), volume_before, epsilon = 1e-9);
    }

    #[test]
    fn midpoint_is_stitched_to_both_ends() {
        let mut mesh = make_mesh();
        EdgeMidpointRefiner.add_nodes_around(&mut mesh, 4, 0.0).unwrap();
        let fresh = mesh.len() - 1;
        let ends: Vec<NodeId> = mesh.neighbors(fresh).iter().map(|&(nb, _)| nb).collect();
        assert_eq!(ends, vec![4, 1]);
        assert_relative_eq!(mesh.node(fresh).y, 5.0);
        let e = mesh.neighbors(fresh)[0].1;
        assert_relative_eq!(mesh.edges()[e].length, 5.0);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let mut mesh = make_mesh();
        assert!(EdgeMidpointRefiner.add_nodes_around(&mut mesh, 99, 0.0).is_err());
    }
}
