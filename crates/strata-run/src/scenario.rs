//! Scenario file: grid, initial surface, stratigraphy, flow network and
//! engine configuration.  Every section has defaults, so `{}` is a valid
//! scenario.
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use strata_core::config::ErosionConfig;
use strata_core::hydraulic::StreamNetwork;
use strata_core::mesh::{Layer, LayerStack, Material, RasterMeshBuilder, Side};
use strata_core::Mesh;

// ── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    pub cols: usize,
    pub rows: usize,
    /// Node spacing (m).
    pub spacing: f64,
    pub open_sides: Vec<Side>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            cols: 24,
            rows: 32,
            spacing: 25.0,
            open_sides: vec![Side::South],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSpec {
    /// Regional gradient rising northward.
    pub base_slope: f64,
    /// Peak amplitude (m) of the fBm roughness.
    pub noise_amplitude: f64,
    /// Cycles per metre of the first octave.
    pub noise_frequency: f64,
    pub octaves: usize,
    /// Upper bound (m) of the random offset that breaks elevation ties.
    pub jitter: f64,
}

impl Default for SurfaceSpec {
    fn default() -> Self {
        Self {
            base_slope: 0.02,
            noise_amplitude: 2.0,
            noise_frequency: 1.0 / 300.0,
            octaves: 5,
            jitter: 1.0e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StratigraphySpec {
    /// Depth (m) of the surface sediment layer; 0 starts on bare bedrock.
    pub regolith_depth: f64,
    /// Grain class composition shared by regolith and bedrock.
    pub grain_fractions: Vec<f64>,
    pub sediment_erodibility: f64,
    pub bedrock_erodibility: f64,
    pub bedrock_depth: f64,
}

impl Default for StratigraphySpec {
    fn default() -> Self {
        Self {
            regolith_depth: 0.5,
            grain_fractions: vec![1.0],
            sediment_erodibility: 0.02,
            bedrock_erodibility: 0.002,
            bedrock_depth: 100.0,
        }
    }
}

impl StratigraphySpec {
    fn layer_stack(&self) -> LayerStack {
        let mut layers = Vec::with_capacity(2);
        if self.regolith_depth > 0.0 {
            layers.push(Layer::from_fractions(
                self.regolith_depth,
                &self.grain_fractions,
                self.sediment_erodibility,
                Material::Sediment,
                0.0,
            ));
        }
        layers.push(Layer::from_fractions(
            self.bedrock_depth,
            &self.grain_fractions,
            self.bedrock_erodibility,
            Material::Bedrock,
            0.0,
        ));
        LayerStack::new(layers, self.sediment_erodibility)
    }
}

// ── Scenario ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub grid: GridSpec,
    pub surface: SurfaceSpec,
    pub stratigraphy: StratigraphySpec,
    pub network: StreamNetwork,
    pub erosion: ErosionConfig,
    /// Rock uplift rate of interior nodes (m per time unit).
    pub uplift_rate: f64,
    /// Run hillslope diffusion after each storm.
    pub diffusion: bool,
    /// Window for the long-term equilibrium rate; 0 disables it.
    pub long_time: f64,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading scenario {}", path.display()))?;
        let scenario: Scenario =
            serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        self.erosion.validate().context("erosion configuration")?;
        let classes = self.erosion.grain_classes();
        if self.stratigraphy.grain_fractions.len() != classes {
            bail!(
                "stratigraphy has {} grain fractions but the erosion configuration uses {classes} classes",
                self.stratigraphy.grain_fractions.len()
            );
        }
        if let Some(inlet) = &self.network.inlet {
            if inlet.supply.len() != classes {
                bail!("inlet supplies {} grain classes, expected {classes}", inlet.supply.len());
            }
        }
        if self.stratigraphy.bedrock_depth <= 0.0 {
            bail!("bedrock depth must be positive, got {}", self.stratigraphy.bedrock_depth);
        }
        Ok(())
    }

    /// Raster mesh with an fBm-roughened ramp and seeded tie-breaking jitter
    /// on interior nodes.
    pub fn build_mesh(&self, seed: u64) -> Result<Mesh> {
        let s = &self.surface;
        let fbm = Fbm::<Perlin>::new(seed as u32)
            .set_octaves(s.octaves.max(1))
            .set_frequency(s.noise_frequency);
        let surface = |x: f64, y: f64| s.base_slope * y + s.noise_amplitude * fbm.get([x, y]);

        let mut mesh = RasterMeshBuilder::new(self.grid.cols, self.grid.rows, self.grid.spacing)
            .open_sides(&self.grid.open_sides)
            .tau_crit(self.erosion.detachment.taucd)
            .build(surface, &self.stratigraphy.layer_stack())
            .context("building raster mesh")?;

        if s.jitter > 0.0 {
            let mut rng = StdRng::seed_from_u64(seed);
            for node in mesh.nodes_mut().iter_mut().filter(|n| n.is_interior()) {
                node.z += rng.gen_range(0.0..s.jitter);
            }
        }
        Ok(mesh)
    }
}
