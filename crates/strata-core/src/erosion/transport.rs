//! Sediment transport laws.
//!
//! Every law fills the node's per-class capacity accumulators through
//! [`TransportLaw::weighted_capacity`]; the node's total always equals the
//! sum over classes.  When several layers span the active channel depth the
//! engine resets the accumulators once and then calls the weighted form
//! once per layer.
use std::fmt::Debug;

use crate::config::{MultiSizeParams, PowerLawParams};
use crate::error::{ErosionError, Result};
use crate::mesh::Node;
use crate::units::{PhysicalConstants, TimeUnits};

pub trait TransportLaw: Debug {
    fn name(&self) -> &'static str;

    /// Number of grain classes the law is built for, if it is fixed.
    fn grain_classes(&self) -> Option<usize> {
        None
    }

    /// Capacity contributed by layer `layer` scaled by `weight`, added to the
    /// node's accumulators.  Returns the amount added.
    fn weighted_capacity(&self, node: &mut Node, layer: usize, weight: f64) -> Result<f64>;

    /// Capacity from the surface layer alone.  Overwrites the accumulators.
    fn capacity(&self, node: &mut Node) -> Result<f64> {
        node.reset_capacity();
        self.weighted_capacity(node, 0, 1.0)
    }
}

/// `max(tau − tauc, 0)^p`, exactly zero at or below the threshold.
pub(crate) fn excess_power(tau: f64, tauc: f64, p: f64) -> f64 {
    let excess = tau - tauc;
    if excess > 0.0 {
        excess.powf(p)
    } else {
        0.0
    }
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

/// `kt (Q/W)^m S^n`, zero for a dry channel.
fn power_shear(kt: f64, m: f64, n: f64, node: &Node, slope: f64) -> f64 {
    if node.discharge <= 0.0 || node.hydr_width <= 0.0 {
        return 0.0;
    }
    kt * (node.discharge / node.hydr_width).powf(m) * slope.powf(n)
}

// ── Single threshold power law ───────────────────────────────────────────────

/// `Qs = weight · kf · W · max(kt (Q/W)^mf S^nf − τc, 0)^pf`, split across
/// grain classes by the layer's composition.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerLawTransport {
    kf: f64,
    kt: f64,
    mf: f64,
    nf: f64,
    pf: f64,
    tauc: f64,
}

impl PowerLawTransport {
    pub fn new(params: &PowerLawParams, units: TimeUnits) -> Self {
        Self {
            kf: params.kf,
            kt: params.kt * units.shear_coefficient_factor(params.mf),
            mf: params.mf,
            nf: params.nf,
            pf: params.pf,
            tauc: params.tauc,
        }
    }
}

impl TransportLaw for PowerLawTransport {
    fn name(&self) -> &'static str {
        "power_law"
    }

    fn weighted_capacity(&self, node: &mut Node, layer: usize, weight: f64) -> Result<f64> {
        let fractions = node.layer_fractions(layer)?;
        if node.flooded {
            return Ok(0.0);
        }
        let slope = checked_slope(node, "power-law transport capacity")?;
        let tau = power_shear(self.kt, self.mf, self.nf, node, slope);
        node.tau = tau;
        let cap = weight * self.kf * node.hydr_width * excess_power(tau, self.tauc, self.pf);
        for (class, frac) in fractions.iter().enumerate() {
            node.add_qs_by_size(class, cap * frac);
        }
        Ok(cap)
    }
}

// ── Multi-size power law ─────────────────────────────────────────────────────

/// Per-class power law with Shields thresholds and a hiding correction
/// against the layer's mean grain size.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSizeTransport {
    kf: f64,
    kt: f64,
    mf: f64,
    nf: f64,
    pf: f64,
    hiding_exponent: f64,
    diameters: Vec<f64>,
    /// Unhidden critical shear per class.
    tauc0: Vec<f64>,
}

impl MultiSizeTransport {
    pub fn new(params: &MultiSizeParams, diameters: &[f64], constants: &PhysicalConstants, units: TimeUnits) -> Self {
        Self {
            kf: params.kf,
            kt: params.kt * units.shear_coefficient_factor(params.mf),
            mf: params.mf,
            nf: params.nf,
            pf: params.pf,
            hiding_exponent: params.hiding_exponent,
            diameters: diameters.to_vec(),
            tauc0: diameters.iter().map(|&d| constants.critical_shear(d)).collect(),
        }
    }

    pub fn base_critical_shear(&self) -> &[f64] {
        &self.tauc0
    }

    /// Depth-fraction weighted mean diameter.
    pub fn mean_diameter(&self, fractions: &[f64]) -> f64 {
        fractions.iter().zip(&self.diameters).map(|(f, d)| f * d).sum()
    }

    /// Hiding-corrected thresholds for a layer with mean diameter `d50`.
    pub fn hidden_critical_shear(&self, d50: f64) -> Vec<f64> {
        self.tauc0
            .iter()
            .zip(&self.diameters)
            .map(|(t0, d)| t0 * (d / d50).powf(-self.hiding_exponent))
            .collect()
    }
}

impl TransportLaw for MultiSizeTransport {
    fn name(&self) -> &'static str {
        "power_law_multi"
    }

    fn grain_classes(&self) -> Option<usize> {
        Some(self.diameters.len())
    }

    fn weighted_capacity(&self, node: &mut Node, layer: usize, weight: f64) -> Result<f64> {
        if node.num_grain_sizes() != self.diameters.len() {
            return Err(ErosionError::GrainClassMismatch {
                context: "multi-size transport",
                expected: self.diameters.len(),
                found: node.num_grain_sizes(),
            });
        }
        let fractions = node.layer_fractions(layer)?;
        if node.flooded {
            return Ok(0.0);
        }
        let slope = checked_slope(node, "multi-size transport capacity")?;
        let tau = power_shear(self.kt, self.mf, self.nf, node, slope);
        node.tau = tau;

        let d50 = self.mean_diameter(&fractions);
        let tauc = self.hidden_critical_shear(d50);
        let mut total = 0.0;
        for (class, frac) in fractions.iter().enumerate() {
            let cap = frac * weight * self.kf * node.hydr_width * excess_power(tau, tauc[class], self.pf);
            node.add_qs_by_size(class, cap);
            total += cap;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Boundary, Layer, LayerStack, Material};
    use approx::assert_relative_eq;

    fn make_node(dgrade: Vec<f64>) -> Node {
        let classes = dgrade.len();
        let layers = LayerStack::new(
            vec![
                Layer::new(dgrade, 0.01, Material::Sediment, 0.0),
                Layer::new(vec![20.0 / classes as f64; classes], 0.001, Material::Bedrock, 0.0),
            ],
            0.01,
        );
        let mut node = Node::new(0, 0.0, 0.0, 10.0, 100.0, Boundary::Interior, layers);
        node.discharge = 50.0;
        node.hydr_width = 2.0;
        node.slope = 0.02;
        node
    }

    fn make_power_law(tauc: f64) -> PowerLawTransport {
        let params = PowerLawParams {
            kf: 0.5,
            kt: 10.0,
            mf: 1.0,
            nf: 1.0,
            pf: 1.5,
            tauc,
        };
        PowerLawTransport::new(&params, TimeUnits::Seconds)
    }

    #[test]
    fn power_law_capacity_split_by_composition() {
        let law = make_power_law(1.0);
        let mut node = make_node(vec![0.3, 0.1]);
        let cap = law.capacity(&mut node).unwrap();
        // tau = 10 · 25 · 0.02 = 5, excess 4, 4^1.5 = 8
        assert_relative_eq!(node.tau, 5.0, epsilon = 1e-12);
        assert_relative_eq!(cap, 0.5 * 2.0 * 8.0, epsilon = 1e-12);
        assert_relative_eq!(node.qs_by_size[0], 0.75 * cap, epsilon = 1e-12);
        assert_relative_eq!(node.qs, node.qs_by_size.iter().sum::<f64>(), epsilon = 1e-12);
    }

    #[test]
    fn power_law_threshold_exact() {
        // 10 · 25 · 0.25 = 62.5 exactly
        let law = make_power_law(62.5);
        let mut node = make_node(vec![1.0]);
        node.slope = 0.25;
        assert_eq!(law.capacity(&mut node).unwrap(), 0.0);
        assert_eq!(node.tau, 62.5);
        assert_eq!(node.qs, 0.0);
    }

    #[test]
    fn zero_exponent_still_exact_below_threshold() {
        let params = PowerLawParams {
            pf: 0.0,
            tauc: 1.0e9,
            ..Default::default()
        };
        let law = PowerLawTransport::new(&params, TimeUnits::Years);
        let mut node = make_node(vec![1.0]);
        assert_eq!(law.capacity(&mut node).unwrap(), 0.0);
    }

    #[test]
    fn capacity_twice_is_identical() {
        let law = make_power_law(0.5);
        let mut node = make_node(vec![0.3, 0.1]);
        let a = law.capacity(&mut node).unwrap();
        let qs_a = node.qs_by_size.clone();
        let b = law.capacity(&mut node).unwrap();
        assert_eq!(a, b);
        assert_eq!(qs_a, node.qs_by_size);
    }

    #[test]
    fn weighted_layers_accumulate() {
        let law = make_power_law(0.0);
        let mut node = make_node(vec![0.4, 0.0]);
        node.reset_capacity();
        let top = law.weighted_capacity(&mut node, 0, 0.25).unwrap();
        let bottom = law.weighted_capacity(&mut node, 1, 0.75).unwrap();
        assert_relative_eq!(node.qs, top + bottom, epsilon = 1e-12);
        // Top layer is all class 0, bedrock is half and half.
        assert_relative_eq!(node.qs_by_size[0], top + 0.5 * bottom, epsilon = 1e-12);
        assert_relative_eq!(node.qs_by_size[1], 0.5 * bottom, epsilon = 1e-12);
    }

    #[test]
    fn power_law_negative_slope_is_fatal() {
        let law = make_power_law(0.0);
        let mut node = make_node(vec![1.0]);
        node.slope = -0.1;
        assert!(matches!(law.capacity(&mut node), Err(ErosionError::NegativeSlope { .. })));
    }

    #[test]
    fn flooded_node_carries_nothing() {
        let law = make_power_law(0.0);
        let mut node = make_node(vec![1.0]);
        node.flooded = true;
        assert_eq!(law.capacity(&mut node).unwrap(), 0.0);
    }

    fn make_multi(hiding: f64) -> MultiSizeTransport {
        let params = MultiSizeParams {
            kf: 0.5,
            kt: 10.0,
            mf: 1.0,
            nf: 1.0,
            pf: 1.5,
            hiding_exponent: hiding,
        };
        MultiSizeTransport::new(&params, &[0.001, 0.01], &PhysicalConstants::default(), TimeUnits::Seconds)
    }

    #[test]
    fn multi_size_thresholds_follow_shields_and_hiding() {
        let law = make_multi(1.0);
        let c = PhysicalConstants::default();
        assert_relative_eq!(law.base_critical_shear()[1], c.critical_shear(0.01));
        let d50 = law.mean_diameter(&[0.5, 0.5]);
        assert_relative_eq!(d50, 0.0055, epsilon = 1e-15);
        // With a unit hiding exponent every class shares D50's threshold.
        let hidden = law.hidden_critical_shear(d50);
        assert_relative_eq!(hidden[0], c.critical_shear(d50), epsilon = 1e-9);
        assert_relative_eq!(hidden[1], c.critical_shear(d50), epsilon = 1e-9);
    }

    #[test]
    fn multi_size_total_is_sum_of_classes() {
        let law = make_multi(0.75);
        let mut node = make_node(vec![0.2, 0.2]);
        let total = law.capacity(&mut node).unwrap();
        assert!(total > 0.0);
        assert_relative_eq!(total, node.qs_by_size.iter().sum::<f64>(), epsilon = 1e-12);
        assert_relative_eq!(node.qs, total, epsilon = 1e-12);
        assert!(node.qs_by_size[0] > node.qs_by_size[1], "fine fraction should move more");
    }

    #[test]
    fn multi_size_rejects_wrong_class_count() {
        let law = make_multi(0.75);
        let mut node = make_node(vec![1.0]);
        assert!(matches!(
            law.capacity(&mut node),
            Err(ErosionError::GrainClassMismatch { expected: 2, found: 1, .. })
        ));
    }
}
