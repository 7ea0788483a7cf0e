//! Downstream hydraulic geometry: width, depth and roughness as power laws
//! of discharge in m³/s.
use serde::{Deserialize, Serialize};

use crate::mesh::Mesh;
use crate::units::TimeUnits;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraulicGeometry {
    pub width_coeff: f64,
    pub width_exp: f64,
    pub depth_coeff: f64,
    pub depth_exp: f64,
    /// Manning-type roughness coefficient.
    pub rough_coeff: f64,
    pub rough_exp: f64,
    /// Unit in which node discharge is stored.
    pub discharge_units: TimeUnits,
}

impl Default for HydraulicGeometry {
    fn default() -> Self {
        Self {
            width_coeff: 10.0,
            width_exp: 0.5,
            depth_coeff: 1.0,
            depth_exp: 0.4,
            rough_coeff: 0.03,
            rough_exp: 0.0,
            discharge_units: TimeUnits::Years,
        }
    }
}

impl HydraulicGeometry {
    /// `(width, depth, roughness)` for discharge `q` in model units.
    /// Zero discharge gives a dry channel of zero width and depth.
    pub fn at(&self, q: f64) -> (f64, f64, f64) {
        let q_si = q.max(0.0) / self.discharge_units.seconds_per_unit();
        if q_si <= 0.0 {
            return (0.0, 0.0, self.rough_coeff);
        }
        (
            self.width_coeff * q_si.powf(self.width_exp),
            self.depth_coeff * q_si.powf(self.depth_exp),
            self.rough_coeff * q_si.powf(self.rough_exp),
        )
    }

    pub fn apply(&self, mesh: &mut Mesh) {
        for node in mesh.nodes_mut() {
            let (w, d, n) = self.at(node.discharge);
            node.hydr_width = w;
            node.chan_depth = d;
            node.hydr_rough = n;
        }
    }
}
