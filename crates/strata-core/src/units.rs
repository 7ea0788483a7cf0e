//! Physical constants and time-unit handling.
//!
//! Discharge arrives in `m³ per model time unit`.  Shear-stress closures are
//! calibrated in SI seconds, so the conversion factor is folded into each
//! law's shear coefficient once, at construction.

use serde::{Deserialize, Serialize};

/// Seconds in one Julian year.
pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Time unit in which discharge and all rates are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnits {
    /// Discharge in m³/yr, rates in m/yr.
    #[default]
    Years,
    /// Discharge in m³/s, rates in m/s.
    Seconds,
}

impl TimeUnits {
    /// Number of SI seconds in one model time unit.
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnits::Years => SECONDS_PER_YEAR,
            TimeUnits::Seconds => 1.0,
        }
    }

    /// Factor applied to a shear coefficient whose discharge term carries
    /// exponent `m`: `(Q/W)^m` in model units becomes SI via `spu^-m`.
    pub fn shear_coefficient_factor(self, m: f64) -> f64 {
        self.seconds_per_unit().powf(-m)
    }
}

/// Material constants shared by the grain-size aware transport laws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalConstants {
    /// kg/m³
    pub fluid_density: f64,
    /// kg/m³
    pub sediment_density: f64,
    /// m/s²
    pub gravity: f64,
    /// Dimensionless critical Shields stress.
    pub critical_shields: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            fluid_density: 1000.0,
            sediment_density: 2650.0,
            gravity: 9.81,
            critical_shields: 0.045,
        }
    }
}

impl PhysicalConstants {
    /// Shields-type critical shear stress (Pa) for a grain of `diameter` m.
    pub fn critical_shear(&self, diameter: f64) -> f64 {
        self.critical_shields * (self.sediment_density - self.fluid_density) * self.gravity * diameter
    }

    /// Submerged specific weight of sediment, (ρs − ρ)·g.
    pub fn submerged_weight(&self) -> f64 {
        (self.sediment_density - self.fluid_density) * self.gravity
    }
}
