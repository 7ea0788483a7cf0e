//! Unified error type for the erosion engine and its collaborators.
//!
//! Conditions the numerical scheme cannot resolve locally (negative slope,
//! a referenced layer with no material) surface as `Err` and are expected
//! to end the run.  Configuration mismatches are ordinary recoverable
//! errors.

use thiserror::Error;

use crate::mesh::NodeId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ErosionError>;

#[derive(Error, Debug)]
pub enum ErosionError {
    /// Slope below zero reached a detachment or transport computation.
    #[error("negative slope {slope:.6e} at node {node} in {context}")]
    NegativeSlope {
        node: NodeId,
        slope: f64,
        context: &'static str,
    },

    /// A layer referenced by the solver holds no material.
    #[error("layer {layer} at node {node} has non-positive depth {depth:.6e}")]
    InvalidLayer { node: NodeId, layer: usize, depth: f64 },

    #[error("layer {layer} requested at node {node}, but the stack holds {count} layers")]
    LayerOutOfRange { node: NodeId, layer: usize, count: usize },

    /// The requested solve does not support the configured number of grain
    /// classes.
    #[error("{mode} supports {expected} grain size class(es), found {found}")]
    UnsupportedGrainConfig {
        mode: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{context}: expected {expected} grain size classes, found {found}")]
    GrainClassMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    /// The downstream relation loops back on itself.
    #[error("flow network is not acyclic (cycle through node {node})")]
    CyclicNetwork { node: NodeId },

    #[error("node {node} is outside the mesh (0..{count})")]
    UnknownNode { node: NodeId, count: usize },

    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ErosionError {
    /// Shorthand for [`ErosionError::InvalidConfig`].
    pub fn config(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key,
            reason: reason.into(),
        }
    }

    /// True for conditions that signal a broken precondition rather than a
    /// configuration the caller can correct.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NegativeSlope { .. }
                | Self::InvalidLayer { .. }
                | Self::LayerOutOfRange { .. }
                | Self::CyclicNetwork { .. }
        )
    }
}
