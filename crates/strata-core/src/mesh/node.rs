use serde::{Deserialize, Serialize};

use super::layers::{Layer, LayerStack};
use crate::error::{ErosionError, Result};

/// Handle into the mesh's node collection.
pub type NodeId = usize;

/// Boundary status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Free to erode and deposit.
    Interior,
    /// Fixed elevation; receives water and sediment leaving the domain.
    OpenOutlet,
    /// Fixed elevation; no flow across it.
    Closed,
}

/// A mesh node: geometry, hydraulic state, sediment state and stratigraphy.
///
/// Owned by the [`Mesh`](super::Mesh).  The solver mutates fields in place;
/// the layer stack only changes through [`Node::apply_mass_change`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    /// Elevation (m).
    pub z: f64,
    /// Voronoi cell area (m²).
    pub varea: f64,
    pub boundary: Boundary,
    /// Node sits in a closed depression (lake).
    pub flooded: bool,

    // ── hydraulic state ──
    pub drainage_area: f64,
    /// Discharge Q (m³ per time unit).
    pub discharge: f64,
    /// Downstream slope S; ≥ 0 while the network is consistent.
    pub slope: f64,
    /// Length of the edge to the downstream neighbour.
    pub flow_length: f64,
    pub hydr_width: f64,
    /// Active channel depth used to composite capacity across layers.
    pub chan_depth: f64,
    pub hydr_rough: f64,
    pub tau: f64,
    pub tau_crit: f64,

    // ── sediment state ──
    /// Transport capacity, total and per grain class.
    pub qs: f64,
    pub qs_by_size: Vec<f64>,
    /// Sediment influx, total and per grain class.
    pub qsin: f64,
    pub qsin_by_size: Vec<f64>,
    pub dzdt: f64,
    pub drdt: f64,

    /// Non-owning link to the receiver in the flow network.
    pub downstream: Option<NodeId>,
    pub layers: LayerStack,
}

impl Node {
    pub fn new(id: NodeId, x: f64, y: f64, z: f64, varea: f64, boundary: Boundary, layers: LayerStack) -> Self {
        let classes = layers.num_grain_sizes().max(1);
        Self {
            id,
            x,
            y,
            z,
            varea,
            boundary,
            flooded: false,
            drainage_area: 0.0,
            discharge: 0.0,
            slope: 0.0,
            flow_length: 0.0,
            hydr_width: 0.0,
            chan_depth: 0.0,
            hydr_rough: 0.0,
            tau: 0.0,
            tau_crit: 0.0,
            qs: 0.0,
            qs_by_size: vec![0.0; classes],
            qsin: 0.0,
            qsin_by_size: vec![0.0; classes],
            dzdt: 0.0,
            drdt: 0.0,
            downstream: None,
            layers,
        }
    }

    pub fn is_interior(&self) -> bool {
        self.boundary == Boundary::Interior
    }

    pub fn num_grain_sizes(&self) -> usize {
        self.qs_by_size.len()
    }

    // ── layer accessors ──────────────────────────────────────────────────────

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        self.layers.get(index).ok_or(ErosionError::LayerOutOfRange {
            node: self.id,
            layer: index,
            count: self.layers.len(),
        })
    }

    /// Depth of layer `index`; a non-positive depth is a broken stratigraphy.
    pub fn layer_depth(&self, index: usize) -> Result<f64> {
        let depth = self.layer(index)?.depth;
        if depth <= 0.0 {
            log::error!(
                "node {} layer {index} has depth {depth:.3e}; stack = {:?}",
                self.id,
                self.layers
            );
            return Err(ErosionError::InvalidLayer {
                node: self.id,
                layer: index,
                depth,
            });
        }
        Ok(depth)
    }

    pub fn layer_erodibility(&self, index: usize) -> Result<f64> {
        Ok(self.layer(index)?.erodibility)
    }

    /// Per-class fractions of layer `index`, validating its depth.
    pub fn layer_fractions(&self, index: usize) -> Result<Vec<f64>> {
        let depth = self.layer_depth(index)?;
        Ok(self.layer(index)?.dgrade.iter().map(|d| d / depth).collect())
    }

    // ── capacity bookkeeping ─────────────────────────────────────────────────

    pub fn reset_capacity(&mut self) {
        self.qs = 0.0;
        self.qs_by_size.iter_mut().for_each(|q| *q = 0.0);
    }

    /// Add to one class's capacity; the total follows.
    pub fn add_qs_by_size(&mut self, class: usize, value: f64) {
        self.qs_by_size[class] += value;
        self.qs += value;
    }

    pub fn set_qs_by_size(&mut self, class: usize, value: f64) {
        self.qs += value - self.qs_by_size[class];
        self.qs_by_size[class] = value;
    }

    // ── influx bookkeeping ───────────────────────────────────────────────────

    pub fn reset_influx(&mut self) {
        self.qsin = 0.0;
        self.qsin_by_size.iter_mut().for_each(|q| *q = 0.0);
    }

    /// Seed influx with an external per-class supply.
    pub fn set_influx(&mut self, supply: &[f64]) {
        self.reset_influx();
        for (j, &s) in supply.iter().enumerate() {
            self.add_qsin_by_size(j, s);
        }
    }

    /// Total-only influx, used for rate estimates before per-class routing.
    pub fn add_qsin(&mut self, value: f64) {
        self.qsin += value;
    }

    pub fn add_qsin_by_size(&mut self, class: usize, value: f64) {
        self.qsin_by_size[class] += value;
        self.qsin += value;
    }

    pub fn set_qsin_by_size(&mut self, class: usize, value: f64) {
        self.qsin += value - self.qsin_by_size[class];
        self.qsin_by_size[class] = value;
    }

    // ── stratigraphy mutation ────────────────────────────────────────────────

    /// Apply a per-class depth change to layer `index` through the layer
    /// stack and move the surface by what was actually applied.
    pub fn apply_mass_change(&mut self, index: usize, delta: &[f64], time: f64) -> Result<Vec<f64>> {
        if delta.len() != self.num_grain_sizes() {
            return Err(ErosionError::GrainClassMismatch {
                context: "layer mass change",
                expected: self.num_grain_sizes(),
                found: delta.len(),
            });
        }
        if index >= self.layers.len() {
            return Err(ErosionError::LayerOutOfRange {
                node: self.id,
                layer: index,
                count: self.layers.len(),
            });
        }
        let applied = self.layers.apply_mass_change(index, delta, time);
        self.z += applied.iter().sum::<f64>();
        Ok(applied)
    }

    /// Raise (`dz > 0`) or lower the surface by `dz`, using the composition
    /// of whichever layers are exposed.  Returns the signed change achieved.
    pub fn apply_depth_change(&mut self, dz: f64, time: f64) -> Result<f64> {
        if dz > 0.0 {
            let fractions = self.layer_fractions(0)?;
            let delta: Vec<f64> = fractions.iter().map(|f| f * dz).collect();
            let applied = self.apply_mass_change(0, &delta, time)?;
            return Ok(applied.iter().sum());
        }

        let mut remaining = -dz;
        let mut removed_total = 0.0;
        let mut i = 0;
        while remaining > 1e-12 && i < self.layers.len() {
            let fractions = self.layer_fractions(i)?;
            let take = remaining.min(self.layer(i)?.depth);
            let delta: Vec<f64> = fractions.iter().map(|f| -f * take).collect();
            let count = self.layers.len();
            let applied = self.apply_mass_change(i, &delta, time)?;
            let removed = -applied.iter().sum::<f64>();
            remaining -= removed;
            removed_total += removed;
            if self.layers.len() == count {
                i += 1;
            }
        }
        Ok(-removed_total)
    }
}
