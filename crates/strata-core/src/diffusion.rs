//! Explicit finite-volume hillslope diffusion over mesh edges.
//!
//! Volumetric flux across an edge is `kd · S · Lv`, downhill positive,
//! where `Lv` is the length of the shared Voronoi face.  Only interior
//! nodes change elevation; flux into or out of boundary nodes leaves or
//! enters the domain.
use serde::Serialize;

use crate::erosion::stability::SubStepClock;
use crate::error::Result;
use crate::mesh::Mesh;

/// Edges whose `kd · Lv` is below this do not constrain the step.
const NEGLIGIBLE_CONDUCTANCE: f64 = 1.0e-6;

/// Unmet loss (m³) below this is rounding, not worth a warning.
const NEGLIGIBLE_VOLUME: f64 = 1.0e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffusionReport {
    pub substeps: usize,
    /// Stable step used for every sub-step but the last.
    pub step: f64,
    pub elapsed: f64,
    /// Σ applied depth change · cell area over interior nodes (m³).
    pub net_volume_change: f64,
    /// Volume (m³) owed to receivers that no donor could supply.
    pub unmet_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionSolver {
    /// kd (m² per time unit).
    pub diffusivity: f64,
}

impl DiffusionSolver {
    pub fn new(diffusivity: f64) -> Self {
        Self { diffusivity }
    }

    /// `min over edges of 0.5 · L² / (2 · kd · Lv)`; infinite when no edge
    /// constrains it.
    pub fn max_stable_step(&self, mesh: &Mesh) -> f64 {
        let kd = self.diffusivity;
        mesh.edges()
            .iter()
            .filter(|e| kd * e.voronoi_length > NEGLIGIBLE_CONDUCTANCE)
            .map(|e| 0.5 * e.length * e.length / (2.0 * kd * e.voronoi_length))
            .fold(f64::INFINITY, f64::min)
    }

    /// Diffuse over `horizon`.  With `no_deposition`, nodes with a net
    /// gain are left unchanged (the gain is assumed carried off by the
    /// channel).
    pub fn diffuse(&self, mesh: &mut Mesh, horizon: f64, no_deposition: bool, time: f64) -> Result<DiffusionReport> {
        let mut report = DiffusionReport::default();
        if self.diffusivity <= 0.0 || horizon <= 0.0 {
            return Ok(report);
        }
        let step = self.max_stable_step(mesh);
        report.step = step;

        // Edges that can move material onto or off an interior node.
        let edges: Vec<usize> = (0..mesh.edges().len())
            .filter(|&e| {
                let edge = &mesh.edges()[e];
                mesh.edge_carries_flow(edge) && (mesh.node(edge.a).is_interior() || mesh.node(edge.b).is_interior())
            })
            .collect();

        let mut clock = SubStepClock::new(horizon);
        let mut volumes = vec![0.0; edges.len()];
        let mut influx = vec![0.0; mesh.len()];
        let mut delivered = vec![1.0; mesh.len()];
        let mut shortfall = vec![0.0; mesh.len()];
        while clock.running() {
            let dt = step.min(clock.remaining());
            influx.iter_mut().for_each(|q| *q = 0.0);
            for (v, &e) in volumes.iter_mut().zip(&edges) {
                let edge = mesh.edges()[e];
                *v = self.diffusivity * mesh.edge_slope(&edge) * edge.voronoi_length * dt;
                influx[edge.a] -= *v;
                influx[edge.b] += *v;
            }
            let stamp = time + clock.elapsed();

            // Losses first; a donor near its basement may give up less.
            delivered.iter_mut().for_each(|r| *r = 1.0);
            for (id, node) in mesh.nodes_mut().iter_mut().enumerate() {
                let q = influx[id];
                if !node.is_interior() || q >= 0.0 {
                    continue;
                }
                let achieved = node.apply_depth_change(q / node.varea, stamp)? * node.varea;
                report.net_volume_change += achieved;
                delivered[id] = achieved / q;
            }

            // Receivers are credited only what their donors delivered.
            shortfall.iter_mut().for_each(|s| *s = 0.0);
            for (&v, &e) in volumes.iter().zip(&edges) {
                let edge = mesh.edges()[e];
                let (donor, receiver) = if v >= 0.0 { (edge.a, edge.b) } else { (edge.b, edge.a) };
                shortfall[receiver] += v.abs() * (1.0 - delivered[donor]);
            }
            for (id, node) in mesh.nodes_mut().iter_mut().enumerate() {
                if !node.is_interior() {
                    continue;
                }
                let q = influx[id];
                let dq = if q > 0.0 {
                    if no_deposition {
                        continue;
                    }
                    q - shortfall[id]
                } else {
                    -shortfall[id]
                };
                if dq == 0.0 {
                    continue;
                }
                let achieved = node.apply_depth_change(dq / node.varea, stamp)? * node.varea;
                report.net_volume_change += achieved;
                if dq < 0.0 {
                    report.unmet_loss += (achieved - dq).max(0.0);
                }
            }
            clock.advance(dt);
        }

        report.substeps = clock.substeps();
        report.elapsed = clock.elapsed();
        if report.unmet_loss > NEGLIGIBLE_VOLUME {
            log::warn!("diffuse: {:.3e} m³ of loss could not be taken from the stratigraphy", report.unmet_loss);
        }
        log::debug!(
            "diffuse: {} sub-steps of {:.3e}, net {:.4e} m³",
            report.substeps,
            report.step,
            report.net_volume_change
        );
        Ok(report)
    }
}
