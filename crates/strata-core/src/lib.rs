//! Channel-network erosion, sediment transport and deposition on an
//! unstructured mesh.
//!
//! The centre of the crate is [`erosion::ErosionEngine`], an explicit,
//! adaptively sub-stepped solver that advances node elevations and
//! multi-grain-size sediment through a layered stratigraphy along a
//! directed flow network.  The mesh, layer stack and flow network live in
//! [`mesh`] and [`hydraulic`] as collaborator contracts with reference
//! implementations.
pub mod config;
pub mod diffusion;
pub mod equilibrium;
pub mod erosion;
pub mod error;
pub mod hydraulic;
pub mod mesh;
pub mod units;

pub use config::ErosionConfig;
pub use erosion::{ErosionEngine, ErosionReport};
pub use error::{ErosionError, Result};
pub use mesh::{Mesh, Node, NodeId};
