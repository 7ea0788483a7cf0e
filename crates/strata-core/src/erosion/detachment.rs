//! Bedrock detachment laws.
//!
//! A law is built once from configuration and then only read; the only
//! node state it writes is the documented `tau` and `drdt` side effects.
use std::fmt::Debug;

use crate::config::DetachmentParams;
use crate::error::{ErosionError, Result};
use crate::mesh::Node;
use crate::units::TimeUnits;

/// Fraction of the Courant limit used by [`DetachmentLaw::stable_time_step`].
const COURANT_FRACTION: f64 = 0.2;

pub trait DetachmentLaw: Debug {
    fn name(&self) -> &'static str;

    /// Detachment rate from the surface layer.  Sets `tau` and `drdt`.
    fn detach_rate(&self, node: &mut Node) -> Result<f64> {
        self.detach_rate_in_layer(node, 0)
    }

    /// Detachment rate using the erodibility of layer `layer`.  Sets `tau`
    /// and `drdt`.
    fn detach_rate_in_layer(&self, node: &mut Node, layer: usize) -> Result<f64>;

    /// Depth detached from the surface layer over `dt`.  Sets `tau` only.
    fn detach_depth(&self, node: &mut Node, dt: f64) -> Result<f64>;

    /// Courant-style step bound at `node`; `f64::INFINITY` when there is
    /// no constraint.
    fn stable_time_step(&self, node: &Node) -> Result<f64>;
}

/// `E = k_layer · max(kt (Q/W)^mb S^nb − τc, 0)^pb`.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerLawDetachment {
    kb: f64,
    /// Shear coefficient with the discharge-unit conversion folded in.
    kt: f64,
    mb: f64,
    nb: f64,
    pb: f64,
}

impl PowerLawDetachment {
    pub fn new(params: &DetachmentParams, units: TimeUnits) -> Self {
        Self {
            kb: params.kb,
            kt: params.kt * units.shear_coefficient_factor(params.mb),
            mb: params.mb,
            nb: params.nb,
            pb: params.pb,
        }
    }

    /// Unit-corrected shear coefficient.
    pub fn shear_coefficient(&self) -> f64 {
        self.kt
    }

    fn checked_slope(node: &Node, context: &'static str) -> Result<f64> {
        if node.slope < 0.0 {
            return Err(ErosionError::NegativeSlope {
                node: node.id,
                slope: node.slope,
                context,
            });
        }
        Ok(node.slope)
    }

    fn shear(&self, node: &Node, slope: f64) -> f64 {
        if node.discharge <= 0.0 || node.hydr_width <= 0.0 {
            return 0.0;
        }
        self.kt * (node.discharge / node.hydr_width).powf(self.mb) * slope.powf(self.nb)
    }

    fn excess_term(&self, tau: f64, tau_crit: f64) -> f64 {
        let excess = tau - tau_crit;
        if excess > 0.0 {
            excess.powf(self.pb)
        } else {
            0.0
        }
    }
}

impl DetachmentLaw for PowerLawDetachment {
    fn name(&self) -> &'static str {
        "power_law"
    }

    fn detach_rate_in_layer(&self, node: &mut Node, layer: usize) -> Result<f64> {
        if node.flooded {
            return Ok(0.0);
        }
        let slope = Self::checked_slope(node, "power-law detachment rate")?;
        let tau = self.shear(node, slope);
        node.tau = tau;
        let rate = node.layer_erodibility(layer)? * self.excess_term(tau, node.tau_crit);
        node.drdt = -rate;
        Ok(rate)
    }

    fn detach_depth(&self, node: &mut Node, dt: f64) -> Result<f64> {
        if node.flooded {
            return Ok(0.0);
        }
        let slope = Self::checked_slope(node, "power-law detachment depth")?;
        let tau = self.shear(node, slope);
        node.tau = tau;
        Ok(node.layer_erodibility(0)? * self.excess_term(tau, node.tau_crit) * dt)
    }

    fn stable_time_step(&self, node: &Node) -> Result<f64> {
        let slope = Self::checked_slope(node, "power-law detachment step estimate")?;
        let ero_term = self.kb * node.discharge.max(0.0).powf(self.mb) * slope.powf(self.nb - 1.0);
        if ero_term == 0.0 || !ero_term.is_finite() || node.flow_length <= 0.0 {
            return Ok(f64::INFINITY);
        }
        Ok(COURANT_FRACTION * node.flow_length / ero_term)
    }
}
