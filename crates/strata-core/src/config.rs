//! Engine configuration: named numeric parameters per law variant.
//!
//! Everything is plain serde data with defaults, so a scenario file only
//! has to name what it changes.  [`ErosionConfig::validate`] is the single
//! place that range-checks values before laws are built from them.

use serde::{Deserialize, Serialize};

use crate::error::{ErosionError, Result};
use crate::units::{PhysicalConstants, TimeUnits};

/// Upper bound on the number of grain size classes.
pub const MAX_GRAIN_CLASSES: usize = 9;

// ── Detachment ────────────────────────────────────────────────────────────────

/// Power-law bed detachment `E = k_layer · (kt (Q/W)^mb S^nb − τc)^pb`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetachmentParams {
    /// Bulk detachment coefficient; only used by the Courant step estimate.
    pub kb: f64,
    /// Shear coefficient in SI units.
    pub kt: f64,
    /// Specific-discharge exponent.
    pub mb: f64,
    /// Slope exponent.
    pub nb: f64,
    /// Excess-shear exponent.
    pub pb: f64,
    /// Default critical shear stress assigned to nodes (Pa).
    pub taucd: f64,
}

impl Default for DetachmentParams {
    fn default() -> Self {
        Self {
            kb: 1.0e-4,
            kt: 1000.0,
            mb: 0.5,
            nb: 1.0,
            pb: 1.0,
            taucd: 0.0,
        }
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Single-threshold power law `Qs = kf W (kt (Q/W)^mf S^nf − τc)^pf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerLawParams {
    pub kf: f64,
    pub kt: f64,
    pub mf: f64,
    pub nf: f64,
    pub pf: f64,
    pub tauc: f64,
}

impl Default for PowerLawParams {
    fn default() -> Self {
        Self {
            kf: 1.0e-3,
            kt: 1000.0,
            mf: 0.6,
            nf: 0.7,
            pf: 1.5,
            tauc: 0.0,
        }
    }
}

/// Multi-size power law with Shields thresholds and hiding correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiSizeParams {
    pub kf: f64,
    pub kt: f64,
    pub mf: f64,
    pub nf: f64,
    pub pf: f64,
    /// Hiding/exposure exponent, normally within [0, 1].
    pub hiding_exponent: f64,
}

impl Default for MultiSizeParams {
    fn default() -> Self {
        Self {
            kf: 1.0e-3,
            kt: 1000.0,
            mf: 0.6,
            nf: 0.7,
            pf: 1.5,
            hiding_exponent: 0.75,
        }
    }
}

/// Which transport closure the engine is built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum TransportConfig {
    PowerLaw(PowerLawParams),
    PowerLawMulti(MultiSizeParams),
    /// Two-fraction sand/gravel law; thresholds come from `grain_diameters`.
    Wilcock,
    /// Mine-tailings law sharing the sand/gravel thresholds.
    MineTailings,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::PowerLaw(PowerLawParams::default())
    }
}

impl TransportConfig {
    pub fn name(&self) -> &'static str {
        match self {
            TransportConfig::PowerLaw(_) => "power_law",
            TransportConfig::PowerLawMulti(_) => "power_law_multi",
            TransportConfig::Wilcock => "wilcock",
            TransportConfig::MineTailings => "mine_tailings",
        }
    }

    fn is_two_fraction(&self) -> bool {
        matches!(self, TransportConfig::Wilcock | TransportConfig::MineTailings)
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionConfig {
    pub detachment: DetachmentParams,
    pub transport: TransportConfig,
    /// Diameter (m) of each grain size class, finest first.  Empty means a
    /// single unnamed class (power-law transport only).
    pub grain_diameters: Vec<f64>,
    /// Hillslope diffusivity kd (m²/time unit).
    pub hillslope_diffusivity: f64,
    /// Node flux (m³/time unit) above which the mesh is densified.
    pub mesh_adapt_max_flux: Option<f64>,
    pub discharge_units: TimeUnits,
    pub constants: PhysicalConstants,
}

impl Default for ErosionConfig {
    fn default() -> Self {
        Self {
            detachment: DetachmentParams::default(),
            transport: TransportConfig::default(),
            grain_diameters: Vec::new(),
            hillslope_diffusivity: 0.01,
            mesh_adapt_max_flux: None,
            discharge_units: TimeUnits::Years,
            constants: PhysicalConstants::default(),
        }
    }
}

impl ErosionConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ErosionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of grain size classes carried by every layer.
    pub fn grain_classes(&self) -> usize {
        self.grain_diameters.len().max(1)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.detachment;
        non_negative("detachment.kb", d.kb)?;
        non_negative("detachment.kt", d.kt)?;
        non_negative("detachment.mb", d.mb)?;
        non_negative("detachment.nb", d.nb)?;
        non_negative("detachment.pb", d.pb)?;
        non_negative("detachment.taucd", d.taucd)?;
        non_negative("hillslope_diffusivity", self.hillslope_diffusivity)?;

        if let Some(flux) = self.mesh_adapt_max_flux {
            if !(flux.is_finite() && flux > 0.0) {
                return Err(ErosionError::config(
                    "mesh_adapt_max_flux",
                    format!("must be positive, got {flux}"),
                ));
            }
        }

        if self.grain_diameters.len() > MAX_GRAIN_CLASSES {
            return Err(ErosionError::config(
                "grain_diameters",
                format!(
                    "at most {MAX_GRAIN_CLASSES} grain size classes, got {}",
                    self.grain_diameters.len()
                ),
            ));
        }
        for &diam in &self.grain_diameters {
            if !(diam.is_finite() && diam > 0.0) {
                return Err(ErosionError::config(
                    "grain_diameters",
                    format!("diameters must be positive, got {diam}"),
                ));
            }
        }

        let c = &self.constants;
        if c.sediment_density <= c.fluid_density {
            return Err(ErosionError::config(
                "constants.sediment_density",
                format!(
                    "sediment density {} must exceed fluid density {}",
                    c.sediment_density, c.fluid_density
                ),
            ));
        }

        match &self.transport {
            TransportConfig::PowerLaw(p) => {
                non_negative("transport.kf", p.kf)?;
                non_negative("transport.kt", p.kt)?;
                non_negative("transport.pf", p.pf)?;
                non_negative("transport.tauc", p.tauc)?;
            }
            TransportConfig::PowerLawMulti(p) => {
                non_negative("transport.kf", p.kf)?;
                non_negative("transport.kt", p.kt)?;
                non_negative("transport.pf", p.pf)?;
                non_negative("transport.hiding_exponent", p.hiding_exponent)?;
                if self.grain_diameters.is_empty() {
                    return Err(ErosionError::config(
                        "grain_diameters",
                        "power_law_multi needs at least one grain diameter",
                    ));
                }
                if p.hiding_exponent > 1.0 {
                    log::warn!(
                        "hiding exponent {} is outside the usual [0, 1] range",
                        p.hiding_exponent
                    );
                }
            }
            TransportConfig::Wilcock | TransportConfig::MineTailings => {}
        }

        if self.transport.is_two_fraction() && self.grain_diameters.len() != 2 {
            return Err(ErosionError::UnsupportedGrainConfig {
                mode: "two-fraction sand/gravel transport",
                expected: 2,
                found: self.grain_diameters.len(),
            });
        }

        Ok(())
    }
}

fn non_negative(key: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ErosionError::config(key, format!("must be finite and non-negative, got {value}")))
    }
}
