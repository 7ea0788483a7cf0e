//! Detachment-only baseline for bedrock channels.
//!
//! No transport coupling: every interior node lowers at its detachment
//! rate and the detached material leaves the domain.  Only single-size
//! stratigraphy is supported.
use super::stability::{convergence_time, StepLimiter, SubStepClock};
use super::{ErosionEngine, ErosionReport};
use crate::error::{ErosionError, Result};
use crate::hydraulic::FlowNetwork;
use crate::mesh::{Mesh, NodeId};

const STEP_FRACTION: f64 = 0.9;
const STEP_FLOOR: f64 = 5.0e-6;

/// With uplift the relative rates are less reliable, so steps are smaller
/// and the floor scales with the horizon.
const UPLIFT_STEP_FRACTION: f64 = 0.1;
const UPLIFT_FLOOR_SCALE: f64 = 1.0e-4;

impl ErosionEngine {
    /// Lower every routed interior node at its detachment rate over
    /// `horizon`.  `uplift` (m per time unit) only enters step selection,
    /// as the rate at which an interior node closes on a fixed boundary
    /// receiver; applying it is up to the caller.
    pub fn erode_detach_lim<N>(
        &self,
        mesh: &mut Mesh,
        network: &mut N,
        horizon: f64,
        uplift: Option<f64>,
        time: f64,
    ) -> Result<ErosionReport>
    where
        N: FlowNetwork + ?Sized,
    {
        if mesh.num_grain_sizes() != 1 {
            return Err(ErosionError::UnsupportedGrainConfig {
                mode: "detachment-limited erosion",
                expected: 1,
                found: mesh.num_grain_sizes(),
            });
        }

        let order = network.sort_by_network_order(mesh)?;
        network.update_hydraulic_geometry(mesh);
        let active: Vec<NodeId> = order
            .into_iter()
            .filter(|&id| {
                let node = mesh.node(id);
                node.is_interior() && node.downstream.is_some()
            })
            .collect();

        let (fraction, floor) = match uplift {
            Some(_) => (UPLIFT_STEP_FRACTION, horizon * UPLIFT_FLOOR_SCALE),
            None => (STEP_FRACTION, STEP_FLOOR),
        };

        let mut report = ErosionReport::default();
        let mut clock = SubStepClock::new(horizon);
        let mut floor_hits = 0;
        while clock.running() {
            mesh.update_slopes();
            for node in mesh.nodes_mut() {
                node.dzdt = 0.0;
            }
            for &id in &active {
                let node = mesh.node_mut(id);
                node.dzdt = -self.detachment.detach_rate(node)?;
            }

            let mut limiter = StepLimiter::new(clock.remaining(), floor);
            for &id in &active {
                let node = mesh.node(id);
                let Some(dn) = node.downstream else { continue };
                let down = mesh.node(dn);
                let mut rate_diff = down.dzdt - node.dzdt;
                if let Some(u) = uplift {
                    if !down.is_interior() {
                        rate_diff -= u;
                    }
                }
                if let Some(t) = convergence_time(node.z - down.z, rate_diff) {
                    limiter.limit(t * fraction);
                }
            }
            let dt = limiter.finish(1.0, clock.remaining());
            floor_hits += limiter.floor_hits();

            let stamp = time + clock.elapsed();
            for &id in &active {
                let node = mesh.node_mut(id);
                if node.dzdt == 0.0 {
                    continue;
                }
                let achieved = node.apply_depth_change(node.dzdt * dt, stamp)?;
                report.net_volume_change += achieved * node.varea;
                report.limited.detachment += 1;
            }
            clock.advance(dt);
        }

        report.sediment_exported = -report.net_volume_change;
        report.record_clock(&clock);
        if floor_hits > 0 {
            log::warn!("erode_detach_lim: step floor {floor:e} used {floor_hits} time(s)");
        }
        log::debug!(
            "erode_detach_lim: {} sub-steps over {:.4e}, eroded {:.4e} m³",
            report.substeps,
            report.elapsed,
            -report.net_volume_change
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetachmentParams, ErosionConfig};
    use crate::hydraulic::StreamNetwork;
    use crate::mesh::{Layer, LayerStack, Material, RasterMeshBuilder};
    use crate::units::TimeUnits;

    fn make_engine() -> ErosionEngine {
        let config = ErosionConfig {
            detachment: DetachmentParams {
                kt: 1.0,
                mb: 0.5,
                nb: 1.0,
                pb: 1.0,
                ..Default::default()
            },
            discharge_units: TimeUnits::Seconds,
            ..Default::default()
        };
        ErosionEngine::from_config(&config).unwrap()
    }

    fn make_mesh(classes: usize) -> Mesh {
        let layers = LayerStack::new(
            vec![Layer::new(vec![50.0 / classes as f64; classes], 1.0e-2, Material::Bedrock, 0.0)],
            1.0e-3,
        );
        RasterMeshBuilder::new(5, 6, 10.0)
            .build(|x, y| 0.1 * y + 0.001 * x, &layers)
            .unwrap()
    }

    #[test]
    fn multi_size_mesh_is_rejected() {
        let engine = make_engine();
        let mut mesh = make_mesh(2);
        let mut network = StreamNetwork::default();
        let err = engine.erode_detach_lim(&mut mesh, &mut network, 1.0, None, 0.0).unwrap_err();
        assert!(
            matches!(err, ErosionError::UnsupportedGrainConfig { expected: 1, found: 2, .. }),
            "unexpected error: {err}"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn interior_lowers_and_boundaries_stay_fixed() {
        let engine = make_engine();
        let mut mesh = make_mesh(1);
        let mut network = StreamNetwork::new(1.0, 0.0);
        network.update_net(&mut mesh).unwrap();
        let before: Vec<f64> = mesh.nodes().iter().map(|n| n.z).collect();

        let report = engine.erode_detach_lim(&mut mesh, &mut network, 2.0, None, 0.0).unwrap();

        assert!((report.elapsed - 2.0).abs() <= 1e-6, "elapsed {}", report.elapsed);
        assert!(report.net_volume_change < 0.0, "net change {}", report.net_volume_change);
        assert_eq!(report.sediment_exported, -report.net_volume_change);
        for node in mesh.nodes() {
            if node.is_interior() {
                assert!(node.z <= before[node.id], "node {} rose", node.id);
            } else {
                assert_eq!(node.z, before[node.id], "boundary node {} moved", node.id);
            }
        }
    }

    #[test]
    fn uplift_mode_takes_smaller_steps() {
        let engine = make_engine();
        let mut plain = make_mesh(1);
        let mut network = StreamNetwork::new(1.0, 0.0);
        network.update_net(&mut plain).unwrap();
        let mut lifted = plain.clone();

        // Nodes next to the outlet close on it within ~1000 s.
        let a = engine.erode_detach_lim(&mut plain, &mut network, 5000.0, None, 0.0).unwrap();
        let b = engine.erode_detach_lim(&mut lifted, &mut network, 5000.0, Some(0.0), 0.0).unwrap();
        assert!(a.substeps > 1, "plain run should be step-limited, took {}", a.substeps);
        assert!(
            b.substeps > a.substeps,
            "uplift run took {} sub-steps, plain run {}",
            b.substeps,
            a.substeps
        );
        assert!((b.elapsed - 5000.0).abs() <= 1e-6, "elapsed {}", b.elapsed);
    }
}
