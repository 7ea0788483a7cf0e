//! Sub-step size selection shared by the engine's solvers.
//!
//! A step is bounded by the time until a node and its receiver would reach
//! the same elevation at current rates (slope reversal), scaled by a safety
//! fraction, held above a floor and never past the remaining horizon.

/// Remaining horizon below which an engine call stops sub-stepping.
pub const HORIZON_TOLERANCE: f64 = 1.0e-6;

/// Slopes at or below this are not allowed to limit the step.
pub const FLAT_SLOPE: f64 = 1.0e-7;

/// Time until the elevation gap `dz` closes at convergence rate
/// `rate_diff`; `None` when the pair is not converging.
pub fn convergence_time(dz: f64, rate_diff: f64) -> Option<f64> {
    if rate_diff > 0.0 && dz > 0.0 {
        Some(dz / rate_diff)
    } else {
        None
    }
}

/// Tracks the step bound across the nodes of one sub-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLimiter {
    bound: f64,
    floor: f64,
    floor_hits: usize,
}

impl StepLimiter {
    /// Start from an unconstrained `bound`; no natural bound below `floor`
    /// is honoured.
    pub fn new(bound: f64, floor: f64) -> Self {
        Self {
            bound,
            floor,
            floor_hits: 0,
        }
    }

    /// Tighten the bound with a node's natural step.
    pub fn limit(&mut self, natural: f64) {
        let step = if natural < self.floor {
            self.floor_hits += 1;
            self.floor
        } else {
            natural
        };
        if step < self.bound {
            self.bound = step;
        }
    }

    pub fn floor_hits(&self) -> usize {
        self.floor_hits
    }

    /// Final step: bound times `fraction`, clamped to `remaining`.
    pub fn finish(&self, fraction: f64, remaining: f64) -> f64 {
        (self.bound * fraction).min(remaining)
    }
}

/// Accumulates sub-step durations for one engine call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubStepClock {
    horizon: f64,
    elapsed: f64,
    substeps: usize,
    smallest: f64,
    largest: f64,
}

impl SubStepClock {
    pub fn new(horizon: f64) -> Self {
        Self {
            horizon: horizon.max(0.0),
            elapsed: 0.0,
            substeps: 0,
            smallest: f64::INFINITY,
            largest: 0.0,
        }
    }

    pub fn remaining(&self) -> f64 {
        self.horizon - self.elapsed
    }

    /// More time to integrate.
    pub fn running(&self) -> bool {
        self.remaining() > HORIZON_TOLERANCE
    }

    pub fn advance(&mut self, dt: f64) {
        self.elapsed += dt;
        self.substeps += 1;
        self.smallest = self.smallest.min(dt);
        self.largest = self.largest.max(dt);
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn substeps(&self) -> usize {
        self.substeps
    }

    /// Smallest step taken, 0 when none were.
    pub fn smallest(&self) -> f64 {
        if self.substeps == 0 {
            0.0
        } else {
            self.smallest
        }
    }

    pub fn largest(&self) -> f64 {
        self.largest
    }

    /// Elapsed time matches the horizon within [`HORIZON_TOLERANCE`].
    pub fn covers_horizon(&self) -> bool {
        (self.horizon - self.elapsed).abs() <= HORIZON_TOLERANCE
    }
}
