//! Coupled detachment / transport-limited solve over a multi-size layer
//! stack.
//!
//! Each sub-step runs three passes over the active nodes in network order:
//!
//! 1. **rate**: composite transport capacity over the layers inside the
//!    active channel depth, detachment rate at the layer reached, and the
//!    resulting local rate, with a total-only flux estimate passed
//!    downstream;
//! 2. **step**: the largest step that keeps every node above its receiver
//!    at the estimated rates;
//! 3. **apply**: per-class erosion and deposition through the layer stack.
//!    The flux handed downstream is `influx − applied · area / dt`, built
//!    from what the stack actually accepted, so every node balances exactly.
use super::stability::{convergence_time, StepLimiter, SubStepClock, FLAT_SLOPE};
use super::{ErosionEngine, ErosionReport};
use crate::error::{ErosionError, Result};
use crate::hydraulic::FlowNetwork;
use crate::mesh::{Mesh, Node, NodeId};

/// Safety fraction applied to the slope-reversal bound.
const STEP_FRACTION: f64 = 0.3;

/// Bound used in place of any smaller slope-reversal time.
const STEP_FLOOR: f64 = 1.0e-4;

/// Layers are composited until less than this much channel depth is left.
const CHANNEL_DEPTH_TOL: f64 = 1.0e-4;

/// Detachment depth still owed below this counts as satisfied.
const DEPTH_TOL: f64 = 1.0e-9;

/// Nodes that erode and pass flux on: interior, with a receiver.
fn is_active(node: &Node) -> bool {
    node.is_interior() && node.downstream.is_some()
}

impl ErosionEngine {
    /// Advance the surface by `horizon` with coupled detachment and
    /// transport.  `time` stamps layers created or touched during the call.
    ///
    /// A network with no effective runoff makes the call a no-op.
    pub fn detach_erode<N>(&self, mesh: &mut Mesh, network: &mut N, horizon: f64, time: f64) -> Result<ErosionReport>
    where
        N: FlowNetwork + ?Sized,
    {
        let mut report = ErosionReport::default();
        let runoff = network.effective_runoff();
        if runoff <= 0.0 {
            log::warn!(
                "detach_erode: rainfall {} does not exceed infiltration {}; nothing to route",
                network.rainfall_rate(),
                network.infiltration_rate()
            );
            return Ok(report);
        }
        self.check_grain_classes(mesh)?;

        let order = network.sort_by_network_order(mesh)?;
        network.update_hydraulic_geometry(mesh);
        let inlet = inlet_supply(network, mesh)?;
        let (active, passive): (Vec<NodeId>, Vec<NodeId>) =
            order.iter().copied().partition(|&id| is_active(mesh.node(id)));

        let mut clock = SubStepClock::new(horizon);
        let mut floor_hits = 0;
        while clock.running() {
            mesh.update_slopes();
            for node in mesh.nodes_mut() {
                node.reset_capacity();
                node.reset_influx();
                node.dzdt = 0.0;
                node.drdt = 0.0;
            }
            seed_inlet(mesh, inlet.as_ref());
            self.rate_pass(mesh, &active)?;

            let mut limiter = StepLimiter::new(clock.remaining() / STEP_FRACTION, STEP_FLOOR);
            limit_step(mesh, &active, &mut limiter);
            let dt = limiter.finish(STEP_FRACTION, clock.remaining());
            floor_hits += limiter.floor_hits();

            for node in mesh.nodes_mut() {
                node.reset_influx();
            }
            seed_inlet(mesh, inlet.as_ref());
            self.apply_pass(mesh, &active, dt, time + clock.elapsed(), &mut report)?;

            report.sediment_exported += passive.iter().map(|&id| mesh.node(id).qsin).sum::<f64>() * dt;
            if let Some((_, supply)) = &inlet {
                report.sediment_supplied += supply.iter().sum::<f64>() * dt;
            }
            clock.advance(dt);
        }

        report.record_clock(&clock);
        if floor_hits > 0 {
            log::warn!("detach_erode: step floor {STEP_FLOOR:e} used {floor_hits} time(s)");
        }
        log::debug!(
            "detach_erode: {} sub-steps over {:.4e} (dt {:.3e}..{:.3e}), net {:.4e} m³, exported {:.4e} m³",
            report.substeps,
            report.elapsed,
            report.smallest_step,
            report.largest_step,
            report.net_volume_change,
            report.sediment_exported
        );
        Ok(report)
    }

    /// Rate pass: capacity, detachment and estimated local rate.
    fn rate_pass(&self, mesh: &mut Mesh, active: &[NodeId]) -> Result<()> {
        for &id in active {
            let node = mesh.node_mut(id);
            let layer = self.composite_capacity(node)?;
            self.detachment.detach_rate_in_layer(node, layer)?;

            let excess = (node.qs - node.qsin) / node.varea;
            node.dzdt = if -node.drdt > excess { -excess } else { node.drdt };
            let outflux = node.qsin - node.dzdt * node.varea;
            if let Some(dn) = node.downstream {
                mesh.node_mut(dn).add_qsin(outflux);
            }
        }
        Ok(())
    }

    /// Accumulate capacity over the layers spanning the active channel
    /// depth, each weighted by the share of that depth it occupies.
    /// Returns the layer detachment acts on.
    pub(crate) fn composite_capacity(&self, node: &mut Node) -> Result<usize> {
        let chan = node.chan_depth;
        if chan <= CHANNEL_DEPTH_TOL {
            self.transport.weighted_capacity(node, 0, 1.0)?;
            return Ok(0);
        }
        let count = node.layers.len();
        let mut depth = 0.0;
        let mut i = 0;
        while i < count && chan - depth > CHANNEL_DEPTH_TOL {
            let ld = node.layer_depth(i)?;
            let weight = if depth + ld <= chan { ld / chan } else { 1.0 - depth / chan };
            self.transport.weighted_capacity(node, i, weight)?;
            depth += ld;
            i += 1;
        }
        // The layer straddling the channel bottom, or the one below it.
        let layer = if depth > chan { i - 1 } else { i };
        Ok(layer.min(count - 1))
    }

    /// Apply pass: erode and deposit per class, route the balance on.
    fn apply_pass(
        &self,
        mesh: &mut Mesh,
        active: &[NodeId],
        dt: f64,
        time: f64,
        report: &mut ErosionReport,
    ) -> Result<()> {
        for &id in active {
            let node = mesh.node_mut(id);
            let area = node.varea;
            let excess = (node.qs - node.qsin) / area;
            let detachment_limited = -node.drdt < excess;

            let budget: Vec<f64> = node
                .qsin_by_size
                .iter()
                .zip(&node.qs_by_size)
                .map(|(qin, qs)| (qin - qs) * dt / area)
                .collect();
            let mut erodible: Vec<f64> = budget.iter().map(|b| b.min(0.0)).collect();
            let deposit: Vec<f64> = budget.iter().map(|b| b.max(0.0)).collect();

            let mut applied = if detachment_limited {
                report.limited.detachment += 1;
                let depth = -node.drdt * dt;
                log::trace!("node {id}: detachment-limited, depth {depth:.3e}");
                erode_layers(node, Some(depth), &mut erodible, time)?
            } else {
                report.limited.transport += 1;
                log::trace!("node {id}: transport-limited, excess {excess:.3e}");
                erode_layers(node, None, &mut erodible, time)?
            };
            if deposit.iter().any(|&d| d > 0.0) {
                let placed = node.apply_mass_change(0, &deposit, time)?;
                for (a, p) in applied.iter_mut().zip(&placed) {
                    *a += p;
                }
            }

            let change: f64 = applied.iter().sum();
            node.dzdt = change / dt;
            report.net_volume_change += change * area;

            let outflux: Vec<f64> = node
                .qsin_by_size
                .iter()
                .zip(&applied)
                .map(|(qin, a)| qin - a * area / dt)
                .collect();
            if let Some(dn) = node.downstream {
                let down = mesh.node_mut(dn);
                for (class, q) in outflux.into_iter().enumerate() {
                    down.add_qsin_by_size(class, q);
                }
            }
        }
        Ok(())
    }
}

/// Validated inlet location and per-class supply.
fn inlet_supply<N: FlowNetwork + ?Sized>(network: &N, mesh: &Mesh) -> Result<Option<(NodeId, Vec<f64>)>> {
    let Some(inlet) = network.inlet() else {
        return Ok(None);
    };
    mesh.try_node(inlet.node)?;
    if inlet.supply.len() != mesh.num_grain_sizes() {
        return Err(ErosionError::GrainClassMismatch {
            context: "inlet sediment supply",
            expected: mesh.num_grain_sizes(),
            found: inlet.supply.len(),
        });
    }
    Ok(Some((inlet.node, inlet.supply.clone())))
}

fn seed_inlet(mesh: &mut Mesh, inlet: Option<&(NodeId, Vec<f64>)>) {
    if let Some((id, supply)) = inlet {
        mesh.node_mut(*id).set_influx(supply);
    }
}

/// Tighten `limiter` with every pair that would reverse slope.
fn limit_step(mesh: &Mesh, active: &[NodeId], limiter: &mut StepLimiter) {
    for &id in active {
        let node = mesh.node(id);
        let Some(dn) = node.downstream else { continue };
        if node.slope <= FLAT_SLOPE {
            continue;
        }
        let down = mesh.node(dn);
        if let Some(t) = convergence_time(node.z - down.z, down.dzdt - node.dzdt) {
            log::trace!("node {id}: converges on {dn} in {t:.3e}");
            limiter.limit(t);
        }
    }
}

/// Erode downward through the stack.  `erodible` holds the per-class room
/// left (≤ 0) and is drawn down by what each layer gives up.
///
/// With `depth`, that total is detached in proportion to each layer's
/// composition, no class beyond its room; deeper layers are reached only
/// once the ones above are drained.  Without, every class takes its full
/// room from the layers inside the channel depth.
fn erode_layers(node: &mut Node, depth: Option<f64>, erodible: &mut [f64], time: f64) -> Result<Vec<f64>> {
    let mut total = vec![0.0; erodible.len()];
    let mut owed = depth.unwrap_or(f64::INFINITY);
    let reach = if depth.is_some() { f64::INFINITY } else { node.chan_depth };
    let mut passed = 0.0;
    let mut i = 0;
    while i < node.layers.len() && owed > DEPTH_TOL && erodible.iter().any(|&e| e < 0.0) && (i == 0 || passed < reach)
    {
        let ld = node.layer_depth(i)?;
        let owed_here = owed;
        let delta: Vec<f64> = match depth {
            Some(_) => {
                let take = owed.min(ld);
                node.layer_fractions(i)?
                    .iter()
                    .zip(erodible.iter())
                    .map(|(f, room)| (-take * f).max(*room))
                    .collect()
            }
            None => erodible.to_vec(),
        };

        let count = node.layers.len();
        let applied = node.apply_mass_change(i, &delta, time)?;
        for (class, a) in applied.iter().enumerate() {
            erodible[class] -= a;
            total[class] += a;
        }
        owed += applied.iter().sum::<f64>();
        passed += ld;
        // A layer deep enough for the whole detached depth ends the walk,
        // even when class room held part of it back.
        if depth.is_some() && ld >= owed_here {
            break;
        }
        if node.layers.len() == count {
            i += 1;
        }
    }
    Ok(total)
}
