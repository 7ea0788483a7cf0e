//! Dynamic-equilibrium bookkeeping: how fast the mean surface is moving.
use serde::Serialize;

use crate::mesh::Mesh;

/// One observation of the area-weighted mean interior elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElevationRecord {
    pub time: f64,
    pub mean_z: f64,
}

/// Records mean elevation over time and reports short and long term
/// change rates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EquilibriumCheck {
    /// Minimum window for the long-term rate; 0 disables it.
    long_time: f64,
    history: Vec<ElevationRecord>,
    short_rate: f64,
    long_rate: f64,
}

impl EquilibriumCheck {
    pub fn new(long_time: f64) -> Self {
        Self {
            long_time: long_time.max(0.0),
            ..Default::default()
        }
    }

    pub fn long_time(&self) -> f64 {
        self.long_time
    }

    pub fn set_long_time(&mut self, long_time: f64) {
        self.long_time = long_time.max(0.0);
    }

    pub fn history(&self) -> &[ElevationRecord] {
        &self.history
    }

    pub fn short_rate(&self) -> f64 {
        self.short_rate
    }

    pub fn long_rate(&self) -> f64 {
        self.long_rate
    }

    /// Record the mesh at `time` and return the rate of change of mean
    /// elevation since the previous record.  The first record is measured
    /// from elevation 0 at time 0.
    pub fn find_iter_change_rate(&mut self, mesh: &Mesh, time: f64) -> f64 {
        let record = ElevationRecord {
            time,
            mean_z: mesh.mean_elevation(),
        };
        self.short_rate = match self.history.last() {
            None if time > 0.0 => record.mean_z / time,
            None => 0.0,
            Some(prev) => {
                let dt = record.time - prev.time;
                if dt > 0.0 {
                    (record.mean_z - prev.mean_z) / dt
                } else {
                    0.0
                }
            }
        };
        self.history.push(record);
        self.trim_history();
        self.short_rate
    }

    /// Drop records no window can start from any more: everything before
    /// the latest record at or before `t_last − long_time`, or all but the
    /// last record when the window is disabled.
    fn trim_history(&mut self) {
        let Some(last) = self.history.last().copied() else {
            return;
        };
        let keep_from = if self.long_time <= 0.0 {
            self.history.len() - 1
        } else {
            let target = last.time - self.long_time;
            self.history[..self.history.len() - 1]
                .iter()
                .rposition(|r| r.time <= target)
                .unwrap_or(0)
        };
        self.history.drain(..keep_from);
    }

    /// Record the mesh and return the rate over the shortest recorded
    /// window spanning at least `long_time`.  Falls back to the short rate
    /// when the window is disabled or there is no earlier record.
    pub fn find_long_term_change_rate(&mut self, mesh: &Mesh, time: f64, new_long_time: Option<f64>) -> f64 {
        if let Some(long_time) = new_long_time {
            self.set_long_time(long_time);
        }
        let short = self.find_iter_change_rate(mesh, time);
        if self.long_time <= 0.0 || self.history.len() < 2 {
            self.long_rate = short;
            return self.long_rate;
        }

        let last = self.history[self.history.len() - 1];
        let target = last.time - self.long_time;
        // Latest record at or before the target; else the oldest one.
        let start = self.history[..self.history.len() - 1]
            .iter()
            .rev()
            .find(|r| r.time <= target)
            .unwrap_or(&self.history[0]);
        let dt = last.time - start.time;
        self.long_rate = if dt > 0.0 {
            (last.mean_z - start.mean_z) / dt
        } else {
            short
        };
        self.long_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Boundary, Edge, Layer, LayerStack, Material, Node};
    use approx::assert_relative_eq;

    fn make_mesh(z: f64) -> Mesh {
        let layers = LayerStack::new(vec![Layer::new(vec![5.0], 0.01, Material::Bedrock, 0.0)], 0.01);
        let nodes = vec![
            Node::new(0, 0.0, 0.0, z, 2.0, Boundary::Interior, layers.clone()),
            Node::new(0, 1.0, 0.0, z + 2.0, 2.0, Boundary::Interior, layers.clone()),
            Node::new(0, 2.0, 0.0, 0.0, 2.0, Boundary::OpenOutlet, layers),
        ];
        let edges = vec![
            Edge { a: 0, b: 1, length: 1.0, voronoi_length: 1.0 },
            Edge { a: 1, b: 2, length: 1.0, voronoi_length: 1.0 },
        ];
        Mesh::new(nodes, edges).unwrap()
    }

    #[test]
    fn first_record_measures_from_origin() {
        let mut check = EquilibriumCheck::new(10.0);
        // Mean of interior nodes: (4 + 6) / 2 = 5.
        assert_eq!(check.find_iter_change_rate(&make_mesh(4.0), 2.0), 2.5);

        let mut at_zero = EquilibriumCheck::new(10.0);
        assert_eq!(at_zero.find_iter_change_rate(&make_mesh(4.0), 0.0), 0.0);
    }

    #[test]
    fn short_rate_uses_last_record() {
        let mut check = EquilibriumCheck::new(0.0);
        check.find_iter_change_rate(&make_mesh(4.0), 1.0);
        let rate = check.find_iter_change_rate(&make_mesh(3.0), 3.0);
        assert_eq!(rate, -0.5);
        assert_eq!(check.find_iter_change_rate(&make_mesh(3.0), 3.0), 0.0, "zero interval");
    }

    #[test]
    fn long_rate_spans_requested_window() {
        let mut check = EquilibriumCheck::new(4.0);
        for (t, z) in [(1.0, 10.0), (2.0, 9.0), (3.0, 8.5), (4.0, 8.0), (6.0, 7.0)] {
            check.find_long_term_change_rate(&make_mesh(z), t, None);
        }
        // Window from t=2 (the latest record at or before 6 − 4) to t=6.
        assert_eq!(check.long_rate(), (8.0 - 10.0) / 4.0);
        assert_eq!(check.short_rate(), -0.5);
        let times: Vec<f64> = check.history().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![2.0, 3.0, 4.0, 6.0], "records before the window start are dropped");
    }

    #[test]
    fn disabled_window_falls_back_to_short_rate() {
        let mut check = EquilibriumCheck::new(-3.0);
        assert_eq!(check.long_time(), 0.0);
        check.find_long_term_change_rate(&make_mesh(4.0), 1.0, None);
        let rate = check.find_long_term_change_rate(&make_mesh(6.0), 2.0, None);
        assert_eq!(rate, 2.0);

        assert_eq!(check.history().len(), 1, "disabled window keeps only the last record");

        let rate = check.find_long_term_change_rate(&make_mesh(7.0), 3.0, Some(100.0));
        assert_eq!(check.long_time(), 100.0);
        // Window longer than the record: measured from the oldest entry.
        assert_eq!(rate, (8.0 - 7.0) / 1.0);
    }

    #[test]
    fn history_stays_bounded_over_a_long_run() {
        let mut check = EquilibriumCheck::new(10.0);
        for step in 1..=1000 {
            check.find_long_term_change_rate(&make_mesh(4.0 - 0.01 * step as f64), step as f64, None);
        }
        assert!(check.history().len() <= 12, "kept {} records", check.history().len());
        assert_relative_eq!(check.long_rate(), -0.01, epsilon = 1e-9);
    }
}
