//! Erosion engine: detachment and transport laws plus the sub-stepped
//! solvers that apply them along the flow network.
//!
//! Laws are built once by [`build_detachment_law`] / [`build_transport_law`]
//! and owned by the [`ErosionEngine`], which only reads them.  The solvers
//! live in their own modules as further `impl ErosionEngine` blocks:
//!
//! - [`detach_erode`]: coupled detachment/transport-limited solve with
//!   multi-size stratigraphy.
//! - [`detach_limited`]: single-size detachment-only baseline.
pub mod detach_erode;
pub mod detach_limited;
pub mod detachment;
pub mod sand_gravel;
pub mod stability;
pub mod transport;

use serde::Serialize;

use crate::config::{ErosionConfig, TransportConfig};
use crate::diffusion::{DiffusionReport, DiffusionSolver};
use crate::error::{ErosionError, Result};
use crate::mesh::{Mesh, MeshRefiner, NodeId};
pub use detachment::{DetachmentLaw, PowerLawDetachment};
pub use sand_gravel::{MineTailingsTransport, SandGravelThresholds, WilcockTransport};
pub use stability::SubStepClock;
pub use transport::{MultiSizeTransport, PowerLawTransport, TransportLaw};

// ── Factories ─────────────────────────────────────────────────────────────────

pub fn build_detachment_law(config: &ErosionConfig) -> Box<dyn DetachmentLaw> {
    Box::new(PowerLawDetachment::new(&config.detachment, config.discharge_units))
}

/// Construct the configured transport closure.
pub fn build_transport_law(config: &ErosionConfig) -> Result<Box<dyn TransportLaw>> {
    let units = config.discharge_units;
    let law: Box<dyn TransportLaw> = match &config.transport {
        TransportConfig::PowerLaw(p) => Box::new(PowerLawTransport::new(p, units)),
        TransportConfig::PowerLawMulti(p) => Box::new(MultiSizeTransport::new(
            p,
            &config.grain_diameters,
            &config.constants,
            units,
        )),
        TransportConfig::Wilcock | TransportConfig::MineTailings => {
            let &[sand, gravel] = config.grain_diameters.as_slice() else {
                return Err(ErosionError::UnsupportedGrainConfig {
                    mode: "two-fraction sand/gravel transport",
                    expected: 2,
                    found: config.grain_diameters.len(),
                });
            };
            let thresholds = SandGravelThresholds::new(sand, gravel, &config.constants, units);
            if matches!(config.transport, TransportConfig::Wilcock) {
                Box::new(WilcockTransport::new(thresholds))
            } else {
                Box::new(MineTailingsTransport::new(thresholds))
            }
        }
    };
    Ok(law)
}

// ── Report ────────────────────────────────────────────────────────────────────

/// How often each limiting regime decided a node's change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimitCounts {
    pub detachment: usize,
    pub transport: usize,
}

/// Summary of one engine call.  Volumes are in m³.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErosionReport {
    pub substeps: usize,
    pub elapsed: f64,
    pub smallest_step: f64,
    pub largest_step: f64,
    /// Sediment fed in at the inlet.
    pub sediment_supplied: f64,
    /// Sediment delivered to nodes outside the active network (outlets
    /// and unrouted nodes).
    pub sediment_exported: f64,
    /// Σ applied depth change · cell area over the active nodes; positive
    /// is net deposition.
    pub net_volume_change: f64,
    pub limited: LimitCounts,
}

impl ErosionReport {
    pub(crate) fn record_clock(&mut self, clock: &SubStepClock) {
        self.substeps = clock.substeps();
        self.elapsed = clock.elapsed();
        self.smallest_step = clock.smallest();
        self.largest_step = clock.largest();
    }

    /// `supplied − (net change + exported)`; zero up to round-off for a
    /// coupled solve.
    pub fn mass_balance_residual(&self) -> f64 {
        self.sediment_supplied - (self.net_volume_change + self.sediment_exported)
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ErosionEngine {
    detachment: Box<dyn DetachmentLaw>,
    transport: Box<dyn TransportLaw>,
    diffusion: DiffusionSolver,
    mesh_adapt_max_flux: Option<f64>,
    /// Grain classes the laws were configured for.
    classes: usize,
}

impl ErosionEngine {
    /// Validate `config` and build both laws from it.
    pub fn from_config(config: &ErosionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detachment: build_detachment_law(config),
            transport: build_transport_law(config)?,
            diffusion: DiffusionSolver::new(config.hillslope_diffusivity),
            mesh_adapt_max_flux: config.mesh_adapt_max_flux,
            classes: config.grain_classes(),
        })
    }

    /// Assemble an engine from already-built laws.
    pub fn new(
        detachment: Box<dyn DetachmentLaw>,
        transport: Box<dyn TransportLaw>,
        diffusion: DiffusionSolver,
        classes: usize,
    ) -> Self {
        Self {
            detachment,
            transport,
            diffusion,
            mesh_adapt_max_flux: None,
            classes,
        }
    }

    pub fn with_mesh_adapt_max_flux(mut self, threshold: Option<f64>) -> Self {
        self.mesh_adapt_max_flux = threshold;
        self
    }

    pub fn detachment(&self) -> &dyn DetachmentLaw {
        self.detachment.as_ref()
    }

    pub fn transport(&self) -> &dyn TransportLaw {
        self.transport.as_ref()
    }

    pub fn grain_classes(&self) -> usize {
        self.classes
    }

    fn check_grain_classes(&self, mesh: &Mesh) -> Result<()> {
        let expected = self.transport.grain_classes().unwrap_or(self.classes);
        if mesh.num_grain_sizes() != expected {
            return Err(ErosionError::GrainClassMismatch {
                context: "mesh stratigraphy vs. configured grain classes",
                expected,
                found: mesh.num_grain_sizes(),
            });
        }
        Ok(())
    }

    /// Hillslope diffusion over `horizon`.
    pub fn diffuse(&self, mesh: &mut Mesh, horizon: f64, no_deposition: bool, time: f64) -> Result<DiffusionReport> {
        self.diffusion.diffuse(mesh, horizon, no_deposition, time)
    }

    /// Add `dt` to the exposure time of every interior node's surface layer.
    pub fn update_exposure_time(&self, mesh: &mut Mesh, dt: f64) {
        for node in mesh.nodes_mut().iter_mut().filter(|n| n.is_interior()) {
            node.layers.add_exposure_time(dt);
        }
    }

    /// Smallest Courant-style detachment step over routed interior nodes;
    /// `f64::INFINITY` when nothing constrains it.
    pub fn estimate_stable_step(&self, mesh: &Mesh) -> Result<f64> {
        let mut step = f64::INFINITY;
        for node in mesh.nodes() {
            if !node.is_interior() || node.downstream.is_none() || node.flooded {
                continue;
            }
            step = step.min(self.detachment.stable_time_step(node)?);
        }
        Ok(step)
    }

    /// Interior nodes whose volumetric change rate `|varea · dzdt|` exceeds
    /// the densification threshold, plus the largest such rate seen.
    pub fn flag_high_flux_nodes(&self, mesh: &Mesh) -> (Vec<NodeId>, f64) {
        let Some(threshold) = self.mesh_adapt_max_flux else {
            return (Vec::new(), 0.0);
        };
        let mut max_flux: f64 = 0.0;
        let mut flagged = Vec::new();
        for node in mesh.nodes().iter().filter(|n| n.is_interior()) {
            let flux = (node.varea * node.dzdt).abs();
            max_flux = max_flux.max(flux);
            if flux > threshold {
                flagged.push(node.id);
            }
        }
        (flagged, max_flux)
    }

    /// Hand every high-flux node to `refiner`.  Returns the number of nodes
    /// refined; 0 when no threshold is configured.
    pub fn densify_mesh<R: MeshRefiner>(&self, mesh: &mut Mesh, refiner: &mut R, time: f64) -> Result<usize> {
        if self.mesh_adapt_max_flux.is_none() {
            return Ok(0);
        }
        let (flagged, max_flux) = self.flag_high_flux_nodes(mesh);
        log::info!(
            "densify at t={time}: max node flux {max_flux:.4e}, {} node(s) above threshold",
            flagged.len()
        );
        let mut added = 0;
        for &id in &flagged {
            added += refiner.add_nodes_around(mesh, id, time)?;
        }
        log::debug!("densify inserted {added} node(s)");
        Ok(flagged.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultiSizeParams;
    use crate::mesh::refine::EdgeMidpointRefiner;
    use crate::mesh::{Layer, LayerStack, Material, RasterMeshBuilder};

    fn make_mesh(classes: usize) -> Mesh {
        let layers = LayerStack::new(
            vec![
                Layer::new(vec![0.5 / classes as f64; classes], 0.01, Material::Sediment, 0.0),
                Layer::new(vec![20.0 / classes as f64; classes], 0.001, Material::Bedrock, 0.0),
            ],
            0.01,
        );
        RasterMeshBuilder::new(4, 4, 10.0)
            .build(|_, y| 0.1 * y, &layers)
            .unwrap()
    }

    #[test]
    fn factory_builds_configured_laws() {
        let mut config = ErosionConfig::default();
        assert_eq!(build_transport_law(&config).unwrap().name(), "power_law");

        config.transport = TransportConfig::PowerLawMulti(MultiSizeParams::default());
        config.grain_diameters = vec![0.001, 0.01, 0.05];
        let law = build_transport_law(&config).unwrap();
        assert_eq!(law.name(), "power_law_multi");
        assert_eq!(law.grain_classes(), Some(3));

        config.transport = TransportConfig::MineTailings;
        config.grain_diameters = vec![0.0005, 0.02];
        assert_eq!(build_transport_law(&config).unwrap().name(), "mine_tailings");
    }

    #[test]
    fn two_fraction_law_needs_two_diameters() {
        let config = ErosionConfig {
            transport: TransportConfig::Wilcock,
            grain_diameters: vec![0.001, 0.01, 0.1],
            ..Default::default()
        };
        let err = build_transport_law(&config).unwrap_err();
        assert!(
            matches!(err, ErosionError::UnsupportedGrainConfig { expected: 2, found: 3, .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn engine_rejects_mismatched_mesh() {
        let config = ErosionConfig {
            transport: TransportConfig::PowerLawMulti(MultiSizeParams::default()),
            grain_diameters: vec![0.001, 0.01],
            ..Default::default()
        };
        let engine = ErosionEngine::from_config(&config).unwrap();
        assert!(engine.check_grain_classes(&make_mesh(2)).is_ok());
        let err = engine.check_grain_classes(&make_mesh(3)).unwrap_err();
        assert!(matches!(err, ErosionError::GrainClassMismatch { expected: 2, found: 3, .. }));
    }

    #[test]
    fn exposure_time_skips_boundaries() {
        let engine = ErosionEngine::from_config(&ErosionConfig::default()).unwrap();
        let mut mesh = make_mesh(1);
        engine.update_exposure_time(&mut mesh, 2.0);
        for node in mesh.nodes() {
            let expected = if node.is_interior() { 2.0 } else { 0.0 };
            let exposure = node.layers.surface().map_or(0.0, |l| l.exposure_time);
            assert_eq!(exposure, expected, "node {} exposure", node.id);
        }
    }

    #[test]
    fn unconstrained_mesh_has_infinite_step() {
        let engine = ErosionEngine::from_config(&ErosionConfig::default()).unwrap();
        let mesh = make_mesh(1);
        // No routing yet: nothing constrains the step.
        assert_eq!(engine.estimate_stable_step(&mesh).unwrap(), f64::INFINITY);
    }

    #[test]
    fn high_flux_nodes_are_flagged_and_refined() {
        let config = ErosionConfig {
            mesh_adapt_max_flux: Some(1.0),
            ..Default::default()
        };
        let engine = ErosionEngine::from_config(&config).unwrap();
        let mut mesh = make_mesh(1);
        mesh.node_mut(5).dzdt = -0.05; // 100 m² · 0.05 = 5 > 1
        mesh.node_mut(6).dzdt = 0.001;

        let (flagged, max_flux) = engine.flag_high_flux_nodes(&mesh);
        assert_eq!(flagged, vec![5]);
        assert!((max_flux - 5.0).abs() < 1e-12, "max flux {max_flux}");

        let before = mesh.len();
        let refined = engine.densify_mesh(&mut mesh, &mut EdgeMidpointRefiner, 1.0).unwrap();
        assert_eq!(refined, 1);
        assert!(mesh.len() > before, "no nodes inserted");
    }

    #[test]
    fn densify_is_noop_without_threshold() {
        let engine = ErosionEngine::from_config(&ErosionConfig::default()).unwrap();
        let mut mesh = make_mesh(1);
        mesh.node_mut(5).dzdt = -10.0;
        let refined = engine.densify_mesh(&mut mesh, &mut EdgeMidpointRefiner, 0.0).unwrap();
        assert_eq!(refined, 0);
        assert_eq!(mesh.len(), 16);
    }
}
