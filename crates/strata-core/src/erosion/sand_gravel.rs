//! Two-fraction (sand/gravel) empirical transport laws.
//!
//! Both laws share one threshold partition: each fraction's critical shear
//! is a piecewise-linear function of the sand fraction of the reference
//! layer, fitted once from the two grain diameters.  Class 0 is sand,
//! class 1 is gravel.  A negative slope gives zero capacity instead of an
//! error.
use super::transport::TransportLaw;
use crate::error::{ErosionError, Result};
use crate::mesh::Node;
use crate::units::{PhysicalConstants, TimeUnits};

/// Sand fraction below which the "low" threshold applies.
pub const LOW_SAND_FRACTION: f64 = 0.10;
/// Sand fraction above which the "high" threshold applies.
pub const HIGH_SAND_FRACTION: f64 = 0.40;

/// Reduction applied to every reference Shields stress.
const SHIELDS_SCALE: f64 = 0.8531;
/// Exponents of the roughness-based shear closure.
const ROUGHNESS_EXP: f64 = 0.6;
const DISCHARGE_EXP: f64 = 0.3;
const SLOPE_EXP: f64 = 0.7;

/// Critical shear as a function of sand fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiecewiseThreshold {
    pub low: f64,
    pub high: f64,
    pub slope: f64,
    pub intercept: f64,
}

impl PiecewiseThreshold {
    /// Line through `(0.10, low)` and `(0.40, high)`.
    pub fn fitted(low: f64, high: f64) -> Self {
        let slope = (low - high) / (LOW_SAND_FRACTION - HIGH_SAND_FRACTION);
        Self {
            low,
            high,
            slope,
            intercept: low - slope * LOW_SAND_FRACTION,
        }
    }

    pub fn at(&self, persand: f64) -> f64 {
        if persand < LOW_SAND_FRACTION {
            self.low
        } else if persand <= HIGH_SAND_FRACTION {
            self.slope * persand + self.intercept
        } else {
            self.high
        }
    }
}

/// Thresholds and constants shared by both two-fraction laws.
#[derive(Debug, Clone, PartialEq)]
pub struct SandGravelThresholds {
    pub sand: PiecewiseThreshold,
    pub gravel: PiecewiseThreshold,
    /// ρ·g, converts the empirical depth-slope product to a stress.
    taudim: f64,
    sediment_density: f64,
    seconds_per_unit: f64,
}

impl SandGravelThresholds {
    pub fn new(sand_diameter: f64, gravel_diameter: f64, constants: &PhysicalConstants, units: TimeUnits) -> Self {
        let ref_sand = constants.submerged_weight() * sand_diameter;
        let ref_gravel = constants.submerged_weight() * gravel_diameter;

        let low_sand = 0.8 * (gravel_diameter / sand_diameter) * 0.040 * ref_sand * SHIELDS_SCALE;
        let high_sand = 0.04 * ref_sand * SHIELDS_SCALE;
        let low_gravel = 0.04 * ref_gravel * SHIELDS_SCALE;
        let high_gravel = 0.01 * ref_gravel * SHIELDS_SCALE;

        Self {
            sand: PiecewiseThreshold::fitted(low_sand, high_sand),
            gravel: PiecewiseThreshold::fitted(low_gravel, high_gravel),
            taudim: constants.fluid_density * constants.gravity,
            sediment_density: constants.sediment_density,
            seconds_per_unit: units.seconds_per_unit(),
        }
    }

    /// `(sand, gravel)` critical shear for a layer with sand fraction `persand`.
    pub fn critical_shear(&self, persand: f64) -> (f64, f64) {
        (self.sand.at(persand), self.gravel.at(persand))
    }

    /// Discharge in m³/s.
    fn discharge_si(&self, node: &Node) -> f64 {
        node.discharge.max(0.0) / self.seconds_per_unit
    }

    /// Empirical bed shear `ρg · n^0.6 · Q^0.3 · S^0.7`.
    fn shear(&self, node: &Node) -> f64 {
        self.taudim
            * node.hydr_rough.max(0.0).powf(ROUGHNESS_EXP)
            * self.discharge_si(node).powf(DISCHARGE_EXP)
            * node.slope.powf(SLOPE_EXP)
    }

    /// Validate arity, read the sand fraction and shear.  `None` means the
    /// node carries nothing (flooded or adverse slope).
    fn prepare(&self, node: &mut Node, layer: usize, context: &'static str) -> Result<Option<(f64, f64)>> {
        if node.num_grain_sizes() != 2 {
            return Err(ErosionError::GrainClassMismatch {
                context,
                expected: 2,
                found: node.num_grain_sizes(),
            });
        }
        let fractions = node.layer_fractions(layer)?;
        if node.flooded || node.slope < 0.0 {
            return Ok(None);
        }
        let tau = self.shear(node);
        node.tau = tau;
        Ok(Some((fractions[0], tau)))
    }
}

// ── Wilcock sand/gravel ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct WilcockTransport {
    thresholds: SandGravelThresholds,
}

impl WilcockTransport {
    pub fn new(thresholds: SandGravelThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SandGravelThresholds {
        &self.thresholds
    }
}

impl TransportLaw for WilcockTransport {
    fn name(&self) -> &'static str {
        "wilcock"
    }

    fn grain_classes(&self) -> Option<usize> {
        Some(2)
    }

    fn weighted_capacity(&self, node: &mut Node, layer: usize, weight: f64) -> Result<f64> {
        let t = &self.thresholds;
        let Some((persand, tau)) = t.prepare(node, layer, "wilcock transport")? else {
            return Ok(0.0);
        };
        let (tauc_sand, tauc_gravel) = t.critical_shear(persand);
        let scale = 0.058 / t.sediment_density * weight * node.hydr_width * t.seconds_per_unit;

        let sand = if tau > tauc_sand {
            scale * persand * tau.powf(1.5) * (1.0 - (tauc_sand / tau).sqrt()).powf(4.5)
        } else {
            0.0
        };
        let gravel = if tau > tauc_gravel {
            scale * (1.0 - persand) * tau.powf(1.5) * (1.0 - tauc_gravel / tau).powf(4.5)
        } else {
            0.0
        };

        node.add_qs_by_size(0, sand);
        node.add_qs_by_size(1, gravel);
        Ok(sand + gravel)
    }
}

// ── Mine tailings ────────────────────────────────────────────────────────────

/// Tailings-slope law: linear in excess shear, with the Wilcock thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct MineTailingsTransport {
    thresholds: SandGravelThresholds,
}

impl MineTailingsTransport {
    pub fn new(thresholds: SandGravelThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SandGravelThresholds {
        &self.thresholds
    }
}

impl TransportLaw for MineTailingsTransport {
    fn name(&self) -> &'static str {
        "mine_tailings"
    }

    fn grain_classes(&self) -> Option<usize> {
        Some(2)
    }

    fn weighted_capacity(&self, node: &mut Node, layer: usize, weight: f64) -> Result<f64> {
        let t = &self.thresholds;
        let Some((persand, tau)) = t.prepare(node, layer, "mine-tailings transport")? else {
            return Ok(0.0);
        };
        let (tauc_sand, tauc_gravel) = t.critical_shear(persand);
        let scale = 0.0541 / t.sediment_density
            * weight
            * t.seconds_per_unit
            * t.discharge_si(node).powf(1.12)
            * node.slope.powf(-0.24);

        let sand = if tau > tauc_sand {
            scale * persand * (tau - tauc_sand)
        } else {
            0.0
        };
        let gravel = if tau > tauc_gravel {
            scale * (1.0 - persand) * (tau - tauc_gravel)
        } else {
            0.0
        };

        node.add_qs_by_size(0, sand);
        node.add_qs_by_size(1, gravel);
        Ok(sand + gravel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Boundary, Layer, LayerStack, Material};
    use approx::assert_relative_eq;

    fn make_thresholds() -> SandGravelThresholds {
        SandGravelThresholds::new(0.0005, 0.02, &PhysicalConstants::default(), TimeUnits::Seconds)
    }

    fn make_node(sand: f64) -> Node {
        let layers = LayerStack::new(
            vec![
                Layer::new(vec![sand, 1.0 - sand], 0.01, Material::Sediment, 0.0),
                Layer::new(vec![5.0, 5.0], 0.001, Material::Bedrock, 0.0),
            ],
            0.01,
        );
        let mut node = Node::new(0, 0.0, 0.0, 10.0, 100.0, Boundary::Interior, layers);
        node.discharge = 200.0;
        node.hydr_width = 8.0;
        node.hydr_rough = 0.03;
        node.slope = 0.05;
        node
    }

    #[test]
    fn threshold_below_ten_percent_is_low() {
        let t = make_thresholds();
        assert_eq!(t.sand.at(0.05), t.sand.low);
        assert_eq!(t.gravel.at(0.05), t.gravel.low);
    }

    #[test]
    fn threshold_interpolates_between_reference_points() {
        let t = make_thresholds();
        for p in [t.sand, t.gravel] {
            assert_relative_eq!(p.at(LOW_SAND_FRACTION), p.low, epsilon = 1e-12);
            assert_relative_eq!(p.at(HIGH_SAND_FRACTION), p.high, epsilon = 1e-12);
            // 0.25 sits halfway between 0.10 and 0.40.
            assert_relative_eq!(p.at(0.25), 0.5 * p.low + 0.5 * p.high, epsilon = 1e-12);
        }
    }

    #[test]
    fn threshold_above_forty_percent_is_high() {
        let t = make_thresholds();
        assert_eq!(t.sand.at(0.50), t.sand.high);
        assert_eq!(t.gravel.at(0.50), t.gravel.high);
    }

    #[test]
    fn fitted_values_match_reference_stresses() {
        let c = PhysicalConstants::default();
        let t = make_thresholds();
        let ref_sand = (2650.0 - 1000.0) * 9.81 * 0.0005;
        let ref_gravel = (2650.0 - 1000.0) * 9.81 * 0.02;
        assert_relative_eq!(t.sand.low, 0.8 * 40.0 * 0.040 * ref_sand * 0.8531, epsilon = 1e-12);
        assert_relative_eq!(t.sand.high, 0.04 * ref_sand * 0.8531, epsilon = 1e-12);
        assert_relative_eq!(t.gravel.low, 0.04 * ref_gravel * 0.8531, epsilon = 1e-12);
        assert_relative_eq!(t.gravel.high, 0.01 * ref_gravel * 0.8531, epsilon = 1e-12);
        assert_relative_eq!(c.submerged_weight() * 0.0005, ref_sand, epsilon = 1e-12);
    }

    #[test]
    fn wilcock_matches_closed_form() {
        let law = WilcockTransport::new(make_thresholds());
        let mut node = make_node(0.5);
        let total = law.capacity(&mut node).unwrap();
        let tau = 1000.0 * 9.81 * 0.03_f64.powf(0.6) * 200.0_f64.powf(0.3) * 0.05_f64.powf(0.7);
        assert_relative_eq!(node.tau, tau, epsilon = 1e-9);

        let (tcs, tcg) = law.thresholds().critical_shear(0.5);
        let scale = 0.058 / 2650.0 * 8.0;
        let sand = if tau > tcs {
            scale * 0.5 * tau.powf(1.5) * (1.0 - (tcs / tau).sqrt()).powf(4.5)
        } else {
            0.0
        };
        let gravel = if tau > tcg {
            scale * 0.5 * tau.powf(1.5) * (1.0 - tcg / tau).powf(4.5)
        } else {
            0.0
        };
        assert_relative_eq!(node.qs_by_size[0], sand, epsilon = 1e-12);
        assert_relative_eq!(node.qs_by_size[1], gravel, epsilon = 1e-12);
        assert_relative_eq!(total, sand + gravel, epsilon = 1e-12);
        assert!(total > 0.0, "steep channel should move sediment, tau = {tau:.2}");
    }

    #[test]
    fn negative_slope_gives_zero_for_both_fractions() {
        for law in [
            Box::new(WilcockTransport::new(make_thresholds())) as Box<dyn TransportLaw>,
            Box::new(MineTailingsTransport::new(make_thresholds())),
        ] {
            let mut node = make_node(0.3);
            node.slope = -0.01;
            assert_eq!(law.capacity(&mut node).unwrap(), 0.0, "{}", law.name());
            assert_eq!(node.qs_by_size, vec![0.0, 0.0]);
        }
    }

    #[test]
    fn below_threshold_is_exactly_zero() {
        let law = WilcockTransport::new(make_thresholds());
        let mut node = make_node(0.3);
        node.slope = 1.0e-9;
        assert_eq!(law.capacity(&mut node).unwrap(), 0.0);
        let tailings = MineTailingsTransport::new(make_thresholds());
        assert_eq!(tailings.capacity(&mut node).unwrap(), 0.0);
    }

    #[test]
    fn tailings_linear_in_excess_shear() {
        let law = MineTailingsTransport::new(make_thresholds());
        let mut node = make_node(0.6);
        law.capacity(&mut node).unwrap();
        let tau = node.tau;
        let (tcs, tcg) = law.thresholds().critical_shear(0.6);
        let scale = 0.0541 / 2650.0 * 200.0_f64.powf(1.12) * 0.05_f64.powf(-0.24);
        assert_relative_eq!(node.qs_by_size[0], scale * 0.6 * (tau - tcs).max(0.0), epsilon = 1e-12);
        assert_relative_eq!(node.qs_by_size[1], scale * 0.4 * (tau - tcg).max(0.0), epsilon = 1e-12);
    }

    #[test]
    fn one_class_node_rejected() {
        let law = WilcockTransport::new(make_thresholds());
        let layers = LayerStack::new(vec![Layer::new(vec![1.0], 0.01, Material::Sediment, 0.0)], 0.01);
        let mut node = Node::new(0, 0.0, 0.0, 0.0, 1.0, Boundary::Interior, layers);
        assert!(matches!(
            law.capacity(&mut node),
            Err(ErosionError::GrainClassMismatch { expected: 2, found: 1, .. })
        ));
    }
}
