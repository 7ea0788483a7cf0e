//! Layered stratigraphy at a node, surface first.
//!
//! The engine never edits layers directly: every change goes through
//! [`LayerStack::apply_mass_change`], which reports how much of each grain
//! class was actually moved so the caller can keep its flux books exact.

use serde::{Deserialize, Serialize};

/// Depth the bottom (basement) layer always keeps, scaled by composition.
pub const BASEMENT_RESIDUAL: f64 = 1.0e-3;

/// Layers thinner than this are treated as exhausted.
const EXHAUSTED_DEPTH: f64 = 1.0e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    Sediment,
    Bedrock,
}

/// A depth interval of uniform composition and erodibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Total depth (m), always the sum of `dgrade`.
    pub depth: f64,
    /// Depth (m) of each grain size class.
    pub dgrade: Vec<f64>,
    pub erodibility: f64,
    pub material: Material,
    pub creation_time: f64,
    /// Last time material was added.
    pub recent_time: f64,
    /// Time spent at the surface.
    pub exposure_time: f64,
}

impl Layer {
    pub fn new(dgrade: Vec<f64>, erodibility: f64, material: Material, time: f64) -> Self {
        let depth = dgrade.iter().sum();
        Self {
            depth,
            dgrade,
            erodibility,
            material,
            creation_time: time,
            recent_time: time,
            exposure_time: 0.0,
        }
    }

    /// Layer of `depth` split across classes by `fractions` (normalised).
    pub fn from_fractions(
        depth: f64,
        fractions: &[f64],
        erodibility: f64,
        material: Material,
        time: f64,
    ) -> Self {
        let sum: f64 = fractions.iter().sum();
        let dgrade = if sum > 0.0 {
            fractions.iter().map(|f| depth * f / sum).collect()
        } else {
            vec![depth / fractions.len().max(1) as f64; fractions.len().max(1)]
        };
        Self::new(dgrade, erodibility, material, time)
    }

    /// Mass fraction of grain class `class`; 0 for an empty layer.
    pub fn fraction(&self, class: usize) -> f64 {
        if self.depth > 0.0 {
            self.dgrade[class] / self.depth
        } else {
            0.0
        }
    }

    pub fn fractions(&self) -> Vec<f64> {
        (0..self.dgrade.len()).map(|j| self.fraction(j)).collect()
    }

    pub fn is_sediment(&self) -> bool {
        self.material == Material::Sediment
    }

    fn recompute_depth(&mut self) {
        for d in &mut self.dgrade {
            if *d < 0.0 {
                *d = 0.0;
            }
        }
        self.depth = self.dgrade.iter().sum();
    }
}

/// Ordered sequence of layers; index 0 is the surface, the last layer is
/// the basement and is never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
    /// Erodibility given to freshly deposited sediment layers.
    sediment_erodibility: f64,
}

impl LayerStack {
    /// `layers` must be non-empty and share one grain-class count.
    pub fn new(layers: Vec<Layer>, sediment_erodibility: f64) -> Self {
        debug_assert!(!layers.is_empty(), "a layer stack needs a basement layer");
        Self {
            layers,
            sediment_erodibility,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn surface(&self) -> Option<&Layer> {
        self.layers.first()
    }

    pub fn total_depth(&self) -> f64 {
        self.layers.iter().map(|l| l.depth).sum()
    }

    pub fn num_grain_sizes(&self) -> usize {
        self.layers.first().map_or(0, |l| l.dgrade.len())
    }

    pub fn sediment_erodibility(&self) -> f64 {
        self.sediment_erodibility
    }

    /// Apply a per-class depth change to layer `index` and return what was
    /// actually applied.
    ///
    /// Negative entries erode from layer `index` and are clipped at what the
    /// layer holds (the basement keeps [`BASEMENT_RESIDUAL`]).  Positive
    /// entries deposit onto the surface: merged into a sediment surface
    /// layer, or into a new sediment layer on top of exposed bedrock.
    /// Exhausted non-basement layers are removed.
    ///
    /// Out-of-range `index` applies nothing; `delta` entries beyond the
    /// class count are ignored.
    pub fn apply_mass_change(&mut self, index: usize, delta: &[f64], time: f64) -> Vec<f64> {
        let classes = self.num_grain_sizes();
        let mut applied = vec![0.0; delta.len()];
        if index >= self.layers.len() {
            return applied;
        }
        let basement = index == self.layers.len() - 1;

        // Erosion.
        let layer = &mut self.layers[index];
        let fractions = layer.fractions();
        for (j, &d) in delta.iter().enumerate().take(classes) {
            if d >= 0.0 {
                continue;
            }
            let mut available = layer.dgrade[j];
            if basement {
                available -= BASEMENT_RESIDUAL * fractions[j];
            }
            let take = (-d).min(available.max(0.0));
            layer.dgrade[j] -= take;
            applied[j] = -take;
        }
        layer.recompute_depth();
        if !basement && layer.depth <= EXHAUSTED_DEPTH {
            self.layers.remove(index);
        }

        // Deposition.
        if delta.iter().take(classes).any(|&d| d > 0.0) {
            let surface_is_sediment = self.layers[0].is_sediment();
            if !surface_is_sediment {
                let fresh = Layer::new(vec![0.0; classes], self.sediment_erodibility, Material::Sediment, time);
                self.layers.insert(0, fresh);
            }
            let surface = &mut self.layers[0];
            for (j, &d) in delta.iter().enumerate().take(classes) {
                if d > 0.0 {
                    surface.dgrade[j] += d;
                    applied[j] = d;
                }
            }
            surface.recompute_depth();
            surface.recent_time = time;
        }

        applied
    }

    /// Increment exposure bookkeeping of the surface layer.
    pub fn add_exposure_time(&mut self, dt: f64) {
        if let Some(surface) = self.layers.first_mut() {
            surface.exposure_time += dt;
        }
    }
}
