//! Regular-grid mesh builder.
//!
//! A raster is the simplest Voronoi mesh: every cell is a square of side
//! `spacing`, every edge joins 4-neighbours and its Voronoi face is one
//! cell side long.  Row 0 lies along the south edge (`y = 0`).
use serde::{Deserialize, Serialize};

use super::{Boundary, Edge, LayerStack, Mesh, Node};
use crate::error::{ErosionError, Result};

/// Side of the grid perimeter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone)]
pub struct RasterMeshBuilder {
    cols: usize,
    rows: usize,
    spacing: f64,
    open_sides: Vec<Side>,
    tau_crit: f64,
}

impl RasterMeshBuilder {
    /// `cols × rows` grid with the south side open.
    pub fn new(cols: usize, rows: usize, spacing: f64) -> Self {
        Self {
            cols,
            rows,
            spacing,
            open_sides: vec![Side::South],
            tau_crit: 0.0,
        }
    }

    /// Replace the set of open (outlet) sides; the rest of the perimeter is closed.
    pub fn open_sides(mut self, sides: &[Side]) -> Self {
        self.open_sides = sides.to_vec();
        self
    }

    /// Critical shear stress given to every node.
    pub fn tau_crit(mut self, tau_crit: f64) -> Self {
        self.tau_crit = tau_crit;
        self
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    fn perimeter_sides(&self, row: usize, col: usize) -> Vec<Side> {
        let mut sides = Vec::new();
        if row == 0 {
            sides.push(Side::South);
        }
        if row + 1 == self.rows {
            sides.push(Side::North);
        }
        if col == 0 {
            sides.push(Side::West);
        }
        if col + 1 == self.cols {
            sides.push(Side::East);
        }
        sides
    }

    /// Build the mesh.  `surface(x, y)` gives initial elevation; every node
    /// gets a copy of `layers`.
    pub fn build<F>(&self, surface: F, layers: &LayerStack) -> Result<Mesh>
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.cols < 3 || self.rows < 3 {
            return Err(ErosionError::config(
                "grid",
                format!("need at least 3×3 nodes, got {}×{}", self.cols, self.rows),
            ));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(ErosionError::config(
                "grid.spacing",
                format!("must be positive, got {}", self.spacing),
            ));
        }

        let area = self.spacing * self.spacing;
        let mut nodes = Vec::with_capacity(self.cols * self.rows);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let x = col as f64 * self.spacing;
                let y = row as f64 * self.spacing;
                let sides = self.perimeter_sides(row, col);
                let boundary = if sides.is_empty() {
                    Boundary::Interior
                } else if sides.iter().any(|s| self.open_sides.contains(s)) {
                    Boundary::OpenOutlet
                } else {
                    Boundary::Closed
                };
                let mut node = Node::new(self.index(row, col), x, y, surface(x, y), area, boundary, layers.clone());
                node.tau_crit = self.tau_crit;
                nodes.push(node);
            }
        }

        let mut edges = Vec::with_capacity(2 * self.cols * self.rows);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let here = self.index(row, col);
                if col + 1 < self.cols {
                    edges.push(self.edge(here, self.index(row, col + 1)));
                }
                if row + 1 < self.rows {
                    edges.push(self.edge(here, self.index(row + 1, col)));
                }
            }
        }

        Mesh::new(nodes, edges)
    }

    fn edge(&self, a: usize, b: usize) -> Edge {
        Edge {
            a,
            b,
            length: self.spacing,
            voronoi_length: self.spacing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Layer, Material};

    fn make_layers() -> LayerStack {
        LayerStack::new(vec![Layer::new(vec![10.0], 1.0e-3, Material::Bedrock, 0.0)], 1.0e-2)
    }

    #[test]
    fn counts_and_areas() {
        let mesh = RasterMeshBuilder::new(5, 4, 10.0)
            .build(|_, y| y, &make_layers())
            .unwrap();
        assert_eq!(mesh.len(), 20);
        assert_eq!(mesh.edges().len(), 4 * 4 + 5 * 3);
        assert!(mesh.nodes().iter().all(|n| n.varea == 100.0));
        assert_eq!(mesh.node(7).z, 10.0);
    }

    #[test]
    fn south_open_rest_closed() {
        let builder = RasterMeshBuilder::new(4, 4, 1.0).tau_crit(2.5);
        let mesh = builder.build(|_, _| 0.0, &make_layers()).unwrap();
        for col in 0..4 {
            assert_eq!(mesh.node(builder.index(0, col)).boundary, Boundary::OpenOutlet);
            assert_eq!(mesh.node(builder.index(3, col)).boundary, Boundary::Closed);
        }
        assert_eq!(mesh.node(builder.index(1, 0)).boundary, Boundary::Closed);
        assert_eq!(mesh.node(builder.index(1, 1)).boundary, Boundary::Interior);
        assert_eq!(mesh.interior_ids().count(), 4);
        assert!(mesh.nodes().iter().all(|n| n.tau_crit == 2.5));
    }

    #[test]
    fn multiple_open_sides() {
        let builder = RasterMeshBuilder::new(4, 4, 1.0).open_sides(&[Side::East, Side::West]);
        let mesh = builder.build(|_, _| 0.0, &make_layers()).unwrap();
        assert_eq!(mesh.node(builder.index(2, 0)).boundary, Boundary::OpenOutlet);
        assert_eq!(mesh.node(builder.index(2, 3)).boundary, Boundary::OpenOutlet);
        assert_eq!(mesh.node(builder.index(0, 2)).boundary, Boundary::Closed);
    }

    #[test]
    fn degenerate_grid_rejected() {
        let err = RasterMeshBuilder::new(2, 8, 1.0)
            .build(|_, _| 0.0, &make_layers())
            .unwrap_err();
        assert!(matches!(err, ErosionError::InvalidConfig { key: "grid", .. }), "unexpected error: {err}");
    }
}
