use crate::core::track::{GridPlacement, TrackGraph};

/// What happened while a car was moved along the track during one time step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traversal {
    pub finish_line_crossings: u32,
    pub entered_pit_lane: bool,
    pub arrived_at_stop: bool,
    pub dead_end: bool,
}

/// StateHandler tracks where a car is on the track graph and how far it has got in the race.
///
/// A car either sits on a node (`cur_edge` is `None`, the next segment is not yet chosen) or is
/// locked onto the segment leaving `cur_node` with `progress` in [0, 1[.
#[derive(Debug, Clone)]
pub struct StateHandler {
    pub cur_node: usize,
    pub cur_edge: Option<usize>,
    pub progress: f64,
    pub total_distance: f64,
    pub race_time: f64,
    pub laps_completed: u32,
    pub laptimes: Vec<f64>,
    start_line_pending: bool,
    t_standstill: f64,
}

impl StateHandler {
    pub fn new(placement: &GridPlacement) -> StateHandler {
        StateHandler {
            cur_node: placement.node,
            cur_edge: placement.edge,
            progress: placement.progress,
            total_distance: -placement.offset,
            race_time: 0.0,
            laps_completed: 0,
            laptimes: Vec::new(),
            start_line_pending: placement.offset > 0.0,
            t_standstill: 0.0,
        }
    }

    /// resolve_route returns the segment the car is driving on this time step. A segment the car
    /// is already on wins, otherwise the segment leaving the current node is chosen (pit lane at
    /// a fork if and only if the car wants to pit). `None` means the route is exhausted.
    pub fn resolve_route(&self, track: &TrackGraph, wants_to_pit: bool) -> Option<usize> {
        self.cur_edge
            .or_else(|| track.choose_out_edge(self.cur_node, wants_to_pit))
    }

    /// advance moves the car `distance` metres starting on `edge`. Overshoot is carried into the
    /// following segments. Arriving at `stop_at` ends the movement there and discards the rest.
    pub fn advance(
        &mut self,
        track: &TrackGraph,
        edge: usize,
        distance: f64,
        wants_to_pit: bool,
        stop_at: Option<usize>,
    ) -> Traversal {
        let mut traversal = Traversal::default();
        let mut edge = edge;
        let mut remaining = distance.max(0.0);

        if self.cur_edge != Some(edge) {
            self.lock_edge(track, edge, &mut traversal);
        }

        self.total_distance += remaining;

        // bounded so that a graph of tiny segments cannot keep a single step busy forever
        for _ in 0..=track.edges().len() {
            let length = track.edge(edge).length;
            let dist_left_on_edge = (1.0 - self.progress) * length;

            if length > 0.0 && remaining < dist_left_on_edge {
                self.progress += remaining / length;
                return traversal;
            }

            remaining = if length > 0.0 {
                remaining - dist_left_on_edge
            } else {
                remaining
            };

            // segment completed
            if track.edge(edge).is_finish_line {
                if self.start_line_pending {
                    self.start_line_pending = false;
                } else {
                    traversal.finish_line_crossings += 1;
                }
            }

            self.cur_node = track.edge(edge).to;
            self.cur_edge = None;
            self.progress = 0.0;

            if stop_at == Some(self.cur_node) {
                traversal.arrived_at_stop = true;
                return traversal;
            }

            if remaining <= 0.0 {
                return traversal;
            }

            match track.choose_out_edge(self.cur_node, wants_to_pit) {
                Some(next) => {
                    self.lock_edge(track, next, &mut traversal);
                    edge = next;
                }
                None => {
                    traversal.dead_end = true;
                    return traversal;
                }
            }
        }

        traversal
    }

    fn lock_edge(&mut self, track: &TrackGraph, edge: usize, traversal: &mut Traversal) {
        let from_pit_lane = match self.cur_edge {
            Some(prev) => track.edge(prev).is_pit_lane,
            None => track
                .edges()
                .iter()
                .any(|e| e.to == self.cur_node && e.is_pit_lane),
        };

        if track.edge(edge).is_pit_lane && !from_pit_lane {
            traversal.entered_pit_lane = true;
        }

        self.cur_node = track.edge(edge).from;
        self.cur_edge = Some(edge);
    }

    /// record_lap stores the time of the lap just completed and returns it.
    pub fn record_lap(&mut self) -> f64 {
        let laptime = self.race_time - self.laptimes.iter().sum::<f64>();
        self.laptimes.push(laptime);
        self.laps_completed += 1;
        laptime
    }

    /// relocate puts the car onto a node without choosing a segment yet.
    pub fn relocate(&mut self, node: usize) {
        self.cur_node = node;
        self.cur_edge = None;
        self.progress = 0.0;
    }

    pub fn is_at_node(&self, node: usize) -> bool {
        self.cur_edge.is_none() && self.cur_node == node
    }

    // ---------------------------------------------------------------------------------------------
    // PIT STANDSTILL ------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn increment_t_standstill(&mut self, timestep_size: f64) {
        self.t_standstill += timestep_size;
    }

    /// check_leaves_standstill returns true once the standstill target has been reached.
    pub fn check_leaves_standstill(&self, t_standstill_target: f64) -> bool {
        self.t_standstill >= t_standstill_target
    }

    pub fn reset_t_standstill(&mut self) {
        self.t_standstill = 0.0;
    }

    // ---------------------------------------------------------------------------------------------
    // LAP STATISTICS ------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn last_laptime(&self) -> Option<f64> {
        self.laptimes.last().copied()
    }

    pub fn fastest_laptime(&self) -> Option<f64> {
        self.laptimes
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, t| match acc {
                Some(best) if best <= t => Some(best),
                _ => Some(t),
            })
    }

    pub fn average_laptime(&self) -> Option<f64> {
        if self.laptimes.is_empty() {
            None
        } else {
            Some(self.laptimes.iter().sum::<f64>() / self.laptimes.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::tests::oval_with_pits;
    use approx::assert_relative_eq;

    fn oval() -> TrackGraph {
        TrackGraph::new(&oval_with_pits()).unwrap()
    }

    #[test]
    fn advance_within_edge() {
        let track = oval();
        let mut sh = StateHandler::new(&track.grid_placement(0.0));
        let edge = sh.resolve_route(&track, false).unwrap();

        let traversal = sh.advance(&track, edge, 100.0, false, None);

        assert_eq!(traversal, Traversal::default());
        assert_eq!(sh.cur_edge, Some(edge));
        assert_relative_eq!(sh.progress, 100.0 / 800.0);
        assert_relative_eq!(sh.total_distance, 100.0);
    }

    #[test]
    fn overshoot_is_carried_into_next_edge() {
        let track = oval();
        let mut sh = StateHandler::new(&track.grid_placement(0.0));
        let edge = sh.resolve_route(&track, false).unwrap();

        sh.advance(&track, edge, 790.0, false, None);
        sh.advance(&track, edge, 30.0, false, None);

        assert_eq!(track.node_id(sh.cur_node), "b");
        assert_relative_eq!(sh.progress, 20.0 / 200.0, epsilon = 1e-12);
        assert_relative_eq!(sh.total_distance, 820.0);
    }

    #[test]
    fn first_crossing_from_behind_the_line_scores_no_lap() {
        let track = oval();
        let mut sh = StateHandler::new(&track.grid_placement(16.0));
        assert_relative_eq!(sh.total_distance, -16.0);

        let edge = sh.resolve_route(&track, false).unwrap();
        let traversal = sh.advance(&track, edge, 20.0, false, None);
        assert_eq!(traversal.finish_line_crossings, 0);

        // a full lap later the line counts
        let mut crossings = 0;
        for _ in 0..40 {
            let edge = sh.resolve_route(&track, false).unwrap();
            crossings += sh.advance(&track, edge, 50.0, false, None).finish_line_crossings;
        }
        assert_eq!(crossings, 1);
    }

    #[test]
    fn pit_lane_entry_and_stop() {
        let track = oval();
        let stall = track.pit_stall_node();
        let c = track.node_idx("c").unwrap();

        let mut sh = StateHandler::new(&track.grid_placement(0.0));
        sh.relocate(c);
        let edge = sh.resolve_route(&track, true).unwrap();

        let traversal = sh.advance(&track, edge, 850.0, true, stall);
        assert!(traversal.entered_pit_lane);
        assert!(!traversal.arrived_at_stop);

        let edge = sh.resolve_route(&track, true).unwrap();
        let traversal = sh.advance(&track, edge, 100.0, true, stall);
        assert!(traversal.arrived_at_stop);
        assert!(sh.is_at_node(stall.unwrap()));
        assert_eq!(sh.progress, 0.0);
    }

    #[test]
    fn lap_statistics() {
        let track = oval();
        let mut sh = StateHandler::new(&track.grid_placement(0.0));
        sh.race_time = 90.0;
        assert_relative_eq!(sh.record_lap(), 90.0);
        sh.race_time = 178.5;
        assert_relative_eq!(sh.record_lap(), 88.5);

        assert_eq!(sh.laps_completed, 2);
        assert_relative_eq!(sh.fastest_laptime().unwrap(), 88.5);
        assert_relative_eq!(sh.average_laptime().unwrap(), 89.25);
    }

    #[test]
    fn standstill_counter() {
        let track = oval();
        let mut sh = StateHandler::new(&track.grid_placement(0.0));
        for _ in 0..19 {
            sh.increment_t_standstill(0.1);
        }
        assert!(!sh.check_leaves_standstill(2.0));
        sh.increment_t_standstill(0.1);
        assert!(sh.check_leaves_standstill(2.0 - 1e-9));
        sh.reset_t_standstill();
        assert!(!sh.check_leaves_standstill(0.05));
    }
}
