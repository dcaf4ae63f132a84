use crate::error::{SimError, SimResult};
use helpers::general::lerp_2d;
use serde::Deserialize;
use std::collections::HashMap;

/// * `id` - Unique node name, e.g. n_t1_apex
/// * `pos` - (x, y) position in track plan units (only used for visualization)
#[derive(Debug, Deserialize, Clone)]
pub struct NodePars {
    pub id: String,
    pub pos: [f64; 2],
}

/// * `from`, `to` - Node ids of the directed segment
/// * `length` - (m) Segment length, must be > 0 (a pit stall dwell edge uses 1)
/// * `radius` - (m) Corner radius, absent for straights
/// * `boost_zone` - Detection of a car ahead is possible on this segment
/// * `boost_allowed` - Boost may be deployed on this segment (defaults to `boost_zone`)
/// * `is_finish_line` - Completing this segment completes a lap
/// * `is_pit_lane` - Segment belongs to the pit road
/// * `is_pit_entry_decision` - The segment ends at the fork between racing line and pit lane
#[derive(Debug, Deserialize, Clone)]
pub struct EdgePars {
    pub from: String,
    pub to: String,
    pub length: f64,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default, alias = "mom_detection")]
    pub boost_zone: bool,
    #[serde(default, alias = "x_mode_allowed")]
    pub boost_allowed: Option<bool>,
    #[serde(default)]
    pub is_finish_line: bool,
    #[serde(default)]
    pub is_pit_lane: bool,
    #[serde(default)]
    pub is_pit_entry_decision: bool,
}

/// * `name` - Track name
/// * `nodes` - Waypoints
/// * `edges` - Directed track segments
/// * `pit_speed_limit` - (m/s) Speed limit when driving through the pit lane
/// * `grid_spacing` - (m) Distance between two grid positions
/// * `pit_stall_node` - Node where cars stop for service (required if there is a pit lane)
/// * `pit_exit_node` - Node where cars are released after service (required if there is a pit
/// lane)
#[derive(Debug, Deserialize, Clone)]
pub struct TrackPars {
    pub name: String,
    pub nodes: Vec<NodePars>,
    pub edges: Vec<EdgePars>,
    pub pit_speed_limit: f64,
    pub grid_spacing: f64,
    #[serde(default)]
    pub pit_stall_node: Option<String>,
    #[serde(default)]
    pub pit_exit_node: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TrackNode {
    pub id: String,
    pub pos: [f64; 2],
}

#[derive(Debug, Clone)]
pub struct TrackEdge {
    pub from: usize,
    pub to: usize,
    pub length: f64,
    pub radius: Option<f64>,
    pub boost_zone: bool,
    pub boost_allowed: bool,
    pub is_finish_line: bool,
    pub is_pit_lane: bool,
    pub is_pit_entry_decision: bool,
}

/// Grid placement of a car: the segment it starts on, the progress along it and the distance
/// behind the start node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPlacement {
    pub node: usize,
    pub edge: Option<usize>,
    pub progress: f64,
    pub offset: f64,
}

/// TrackGraph is the immutable circuit topology. Nodes and edges are stored densely and
/// addressed by index; out-edges of a node are at most two (a fork between racing line and pit
/// lane).
#[derive(Debug)]
pub struct TrackGraph {
    pub name: String,
    pub pit_speed_limit: f64,
    pub grid_spacing: f64,
    nodes: Vec<TrackNode>,
    edges: Vec<TrackEdge>,
    node_idxs: HashMap<String, usize>,
    out_edges: Vec<Vec<usize>>,
    in_edges: Vec<Vec<usize>>,
    finish_edge: usize,
    pit_stall_node: Option<usize>,
    pit_exit_node: Option<usize>,
    circuit_length: f64,
}

impl TrackGraph {
    pub fn new(track_pars: &TrackPars) -> SimResult<TrackGraph> {
        if track_pars.nodes.is_empty() {
            return Err(SimError::Track(String::from("track has no nodes")));
        }
        if !(track_pars.pit_speed_limit > 0.0) {
            return Err(SimError::Track(format!(
                "pit speed limit must be positive, got {}",
                track_pars.pit_speed_limit
            )));
        }
        if !(track_pars.grid_spacing >= 0.0) {
            return Err(SimError::Track(format!(
                "grid spacing must not be negative, got {}",
                track_pars.grid_spacing
            )));
        }

        // nodes
        let mut nodes = Vec::with_capacity(track_pars.nodes.len());
        let mut node_idxs = HashMap::with_capacity(track_pars.nodes.len());

        for node_pars in track_pars.nodes.iter() {
            if node_idxs.insert(node_pars.id.to_owned(), nodes.len()).is_some() {
                return Err(SimError::Track(format!("duplicate node '{}'", node_pars.id)));
            }
            nodes.push(TrackNode {
                id: node_pars.id.to_owned(),
                pos: node_pars.pos,
            });
        }

        let lookup = |id: &str| -> SimResult<usize> {
            node_idxs
                .get(id)
                .copied()
                .ok_or_else(|| SimError::Track(format!("edge references unknown node '{}'", id)))
        };

        // edges
        let mut edges: Vec<TrackEdge> = Vec::with_capacity(track_pars.edges.len());
        let mut out_edges = vec![Vec::new(); nodes.len()];
        let mut in_edges = vec![Vec::new(); nodes.len()];

        for edge_pars in track_pars.edges.iter() {
            let from = lookup(&edge_pars.from)?;
            let to = lookup(&edge_pars.to)?;

            if !(edge_pars.length > 0.0) || !edge_pars.length.is_finite() {
                return Err(SimError::Track(format!(
                    "edge {} -> {} has non-positive length {}",
                    edge_pars.from, edge_pars.to, edge_pars.length
                )));
            }
            if out_edges[from].iter().any(|&e: &usize| edges[e].to == to) {
                return Err(SimError::Track(format!(
                    "duplicate edge {} -> {}",
                    edge_pars.from, edge_pars.to
                )));
            }

            out_edges[from].push(edges.len());
            in_edges[to].push(edges.len());
            edges.push(TrackEdge {
                from,
                to,
                length: edge_pars.length,
                radius: edge_pars.radius,
                boost_zone: edge_pars.boost_zone,
                boost_allowed: edge_pars.boost_allowed.unwrap_or(edge_pars.boost_zone),
                is_finish_line: edge_pars.is_finish_line,
                is_pit_lane: edge_pars.is_pit_lane,
                is_pit_entry_decision: edge_pars.is_pit_entry_decision,
            });
        }

        // finish line
        let finish_edges: Vec<usize> = (0..edges.len())
            .filter(|&e| edges[e].is_finish_line)
            .collect();
        if finish_edges.len() != 1 {
            return Err(SimError::Track(format!(
                "exactly one finish line edge is required, found {}",
                finish_edges.len()
            )));
        }
        let finish_edge = finish_edges[0];
        if edges[finish_edge].is_pit_lane {
            return Err(SimError::Track(String::from(
                "the finish line must not be part of the pit lane",
            )));
        }

        // forks
        for (node, outs) in out_edges.iter().enumerate() {
            match outs.len() {
                0 | 1 => {}
                2 => {
                    let n_pit = outs.iter().filter(|&&e| edges[e].is_pit_lane).count();
                    if n_pit != 1 {
                        return Err(SimError::Track(format!(
                            "fork at node '{}' must offer exactly one pit lane and one racing edge",
                            nodes[node].id
                        )));
                    }
                }
                n => {
                    return Err(SimError::Track(format!(
                        "node '{}' has {} outgoing edges, at most 2 are supported",
                        nodes[node].id, n
                    )))
                }
            }
        }

        for edge in edges.iter().filter(|e| e.is_pit_entry_decision) {
            if out_edges[edge.to].len() != 2 {
                return Err(SimError::Track(format!(
                    "pit entry decision edge {} -> {} does not lead to a fork",
                    nodes[edge.from].id, nodes[edge.to].id
                )));
            }
        }

        // pit stall and exit
        let pit_stall_node = match &track_pars.pit_stall_node {
            Some(id) => Some(lookup(id)?),
            None => None,
        };
        let pit_exit_node = match &track_pars.pit_exit_node {
            Some(id) => Some(lookup(id)?),
            None => None,
        };

        if edges.iter().any(|e| e.is_pit_lane)
            && (pit_stall_node.is_none() || pit_exit_node.is_none())
        {
            return Err(SimError::Track(String::from(
                "a pit lane requires both pit_stall_node and pit_exit_node",
            )));
        }

        let circuit_length = edges
            .iter()
            .filter(|e| !e.is_pit_lane)
            .map(|e| e.length)
            .sum();

        Ok(TrackGraph {
            name: track_pars.name.to_owned(),
            pit_speed_limit: track_pars.pit_speed_limit,
            grid_spacing: track_pars.grid_spacing,
            nodes,
            edges,
            node_idxs,
            out_edges,
            in_edges,
            finish_edge,
            pit_stall_node,
            pit_exit_node,
            circuit_length,
        })
    }

    // ---------------------------------------------------------------------------------------------
    // QUERIES -------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn node_idx(&self, id: &str) -> Option<usize> {
        self.node_idxs.get(id).copied()
    }

    pub fn node_id(&self, node: usize) -> &str {
        &self.nodes[node].id
    }

    pub fn edge(&self, edge: usize) -> &TrackEdge {
        &self.edges[edge]
    }

    pub fn edges(&self) -> &[TrackEdge] {
        &self.edges
    }

    /// out_edges returns the indices of the outgoing edges of a node (one, or two at a fork).
    pub fn out_edges(&self, node: usize) -> &[usize] {
        &self.out_edges[node]
    }

    pub fn finish_edge(&self) -> usize {
        self.finish_edge
    }

    /// The start node is the node directly behind the finish line.
    pub fn start_node(&self) -> usize {
        self.edges[self.finish_edge].to
    }

    pub fn pit_stall_node(&self) -> Option<usize> {
        self.pit_stall_node
    }

    pub fn pit_exit_node(&self) -> Option<usize> {
        self.pit_exit_node
    }

    pub fn has_pit_lane(&self) -> bool {
        self.pit_stall_node.is_some()
    }

    /// circuit_length returns the sum of all racing line (non pit lane) segment lengths.
    pub fn circuit_length(&self) -> f64 {
        self.circuit_length
    }

    /// choose_out_edge selects the segment leaving a node. At a fork the pit lane is taken if
    /// and only if the car wants to pit. Returns `None` for a dead end.
    pub fn choose_out_edge(&self, node: usize, wants_to_pit: bool) -> Option<usize> {
        let outs = &self.out_edges[node];
        match outs.len() {
            0 => None,
            1 => Some(outs[0]),
            _ => outs
                .iter()
                .copied()
                .find(|&e| self.edges[e].is_pit_lane == wants_to_pit),
        }
    }

    /// position returns the interpolated plan position of a car on `edge` at `progress`.
    pub fn position(&self, node: usize, edge: Option<usize>, progress: f64) -> [f64; 2] {
        match edge {
            Some(e) => lerp_2d(
                self.nodes[self.edges[e].from].pos,
                self.nodes[self.edges[e].to].pos,
                progress,
            ),
            None => self.nodes[node].pos,
        }
    }

    /// gap returns the distance from a car at cumulative distance `d_from` forward to a car at
    /// `d_to`, wrapped into [0, circuit_length[.
    pub fn gap(&self, d_from: f64, d_to: f64) -> f64 {
        if self.circuit_length > 0.0 {
            (d_to - d_from).rem_euclid(self.circuit_length)
        } else {
            d_to - d_from
        }
    }

    /// grid_placement places a car `offset` metres behind the start node by walking backwards
    /// along the racing line.
    pub fn grid_placement(&self, offset: f64) -> GridPlacement {
        let mut node = self.start_node();
        let mut remaining = offset.max(0.0);

        if remaining == 0.0 {
            return GridPlacement {
                node,
                edge: None,
                progress: 0.0,
                offset: 0.0,
            };
        }

        // bounded by the number of edges so that a malformed loop cannot spin forever
        for _ in 0..=self.edges.len() {
            let pred = self.in_edges[node]
                .iter()
                .copied()
                .find(|&e| !self.edges[e].is_pit_lane);

            let edge = match pred {
                Some(e) => e,
                None => break,
            };
            let length = self.edges[edge].length;

            if remaining < length {
                return GridPlacement {
                    node: self.edges[edge].from,
                    edge: Some(edge),
                    progress: 1.0 - remaining / length,
                    offset,
                };
            }

            remaining -= length;
            node = self.edges[edge].from;

            if remaining == 0.0 {
                break;
            }
        }

        GridPlacement {
            node,
            edge: None,
            progress: 0.0,
            offset: offset - remaining,
        }
    }
}
