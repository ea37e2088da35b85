//! # A* Pathfinding
//!
//! Grid search over voxel positions. The volume is the obstacle oracle: a
//! position is passable when it lies inside the volume bounds and the
//! caller's predicate does not call its voxel blocked.
//!
//! ## Costs
//!
//! | move            | cost |
//! |-----------------|------|
//! | face neighbour  | 1    |
//! | edge neighbour  | √2   |
//! | corner neighbour| √3   |
//!
//! The heuristic is Manhattan distance for six-connected searches and the
//! three dimensional octile distance otherwise, scaled by the heuristic
//! weight. A weight above one trades optimality for fewer expansions.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use stratum_volume::{Voxel, VoxelVolume, WorldPos};
use tracing::trace;

use crate::error::PathError;

const SQRT_2: f32 = std::f32::consts::SQRT_2;
const SQRT_3: f32 = 1.732_050_8;

/// Which neighbours a step may reach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Face neighbours only.
    Six,
    /// Face and edge neighbours.
    Eighteen,
    /// Face, edge and corner neighbours.
    #[default]
    TwentySix,
}

impl Connectivity {
    /// Highest number of axes a single step may change.
    #[inline]
    #[must_use]
    pub const fn max_axes(self) -> usize {
        match self {
            Self::Six => 1,
            Self::Eighteen => 2,
            Self::TwentySix => 3,
        }
    }

    /// Neighbour offsets with their step costs.
    #[must_use]
    pub fn steps(self) -> Vec<([i32; 3], f32)> {
        let mut steps = Vec::with_capacity(26);
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let axes = [dx, dy, dz].iter().filter(|&&d| d != 0).count();
                    if axes == 0 || axes > self.max_axes() {
                        continue;
                    }
                    let cost = match axes {
                        1 => 1.0,
                        2 => SQRT_2,
                        _ => SQRT_3,
                    };
                    steps.push(([dx, dy, dz], cost));
                }
            }
        }
        steps
    }
}

/// Search parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingConfig {
    /// Multiplier on the heuristic. 1.0 keeps the search optimal.
    pub heuristic_weight: f32,
    /// Node expansions before the search gives up.
    pub max_iterations: usize,
    /// Neighbourhood of a step.
    pub connectivity: Connectivity,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            heuristic_weight: 1.0,
            max_iterations: 10_000,
            connectivity: Connectivity::TwentySix,
        }
    }
}

/// Open set entry, ordered so the max-heap pops the lowest f first and
/// prefers the deeper node on ties.
#[derive(Clone, Copy, Debug)]
struct OpenNode {
    f: f32,
    g: f32,
    pos: WorldPos,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| self.g.total_cmp(&other.g))
    }
}

/// A* over the voxel grid.
#[derive(Clone, Debug, Default)]
pub struct AStarPathfinder {
    config: PathfindingConfig,
}

impl AStarPathfinder {
    /// Creates a pathfinder.
    #[must_use]
    pub const fn new(config: PathfindingConfig) -> Self {
        Self { config }
    }

    /// Search parameters.
    #[must_use]
    pub const fn config(&self) -> &PathfindingConfig {
        &self.config
    }

    /// Estimated remaining cost between two positions.
    #[must_use]
    pub fn heuristic(&self, from: WorldPos, to: WorldPos) -> f32 {
        let mut d = from.abs_diff(to).map(|v| v as f32);
        let estimate = match self.config.connectivity {
            Connectivity::Six => d[0] + d[1] + d[2],
            Connectivity::Eighteen | Connectivity::TwentySix => {
                d.sort_by(|a, b| b.total_cmp(a));
                let [high, mid, low] = d;
                SQRT_3 * low + SQRT_2 * (mid - low) + (high - mid)
            }
        };
        estimate * self.config.heuristic_weight
    }

    /// Finds a path from `start` to `goal`, both included.
    ///
    /// `is_blocked` decides which voxels cannot be entered; positions
    /// outside the volume bounds are never entered.
    ///
    /// # Errors
    ///
    /// - `PathError::BlockedEndpoint` if the start or the goal is blocked
    /// - `PathError::NoPath` if every reachable position was expanded
    /// - `PathError::BudgetExhausted` if the expansion budget ran out
    pub fn find_path(
        &self,
        volume: &VoxelVolume,
        start: WorldPos,
        goal: WorldPos,
        is_blocked: impl Fn(Voxel) -> bool,
    ) -> Result<Vec<WorldPos>, PathError> {
        if start == goal {
            return Ok(vec![start]);
        }

        let mut sampler = volume.sampler();
        let mut passable =
            |pos: WorldPos| volume.in_bounds(pos) && !is_blocked(sampler.voxel_at(pos));
        if !passable(start) {
            return Err(PathError::BlockedEndpoint(start));
        }
        if !passable(goal) {
            return Err(PathError::BlockedEndpoint(goal));
        }

        let steps = self.config.connectivity.steps();
        let mut open = BinaryHeap::new();
        let mut g_scores: HashMap<WorldPos, f32> = HashMap::new();
        let mut came_from: HashMap<WorldPos, WorldPos> = HashMap::new();
        let mut closed: HashSet<WorldPos> = HashSet::new();

        g_scores.insert(start, 0.0);
        open.push(OpenNode {
            f: self.heuristic(start, goal),
            g: 0.0,
            pos: start,
        });

        let mut iterations = 0usize;
        while let Some(node) = open.pop() {
            if !closed.insert(node.pos) {
                continue;
            }
            if node.pos == goal {
                let path = reconstruct(&came_from, start, goal);
                trace!(%start, %goal, iterations, length = path.len(), "path found");
                return Ok(path);
            }

            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(PathError::BudgetExhausted {
                    start,
                    goal,
                    iterations: self.config.max_iterations,
                });
            }

            for &([dx, dy, dz], cost) in &steps {
                let next = node.pos.offset(dx, dy, dz);
                if closed.contains(&next) || !passable(next) {
                    continue;
                }
                let g = node.g + cost;
                if g_scores.get(&next).is_some_and(|&known| known <= g) {
                    continue;
                }
                g_scores.insert(next, g);
                came_from.insert(next, node.pos);
                open.push(OpenNode {
                    f: g + self.heuristic(next, goal),
                    g,
                    pos: next,
                });
            }
        }

        Err(PathError::NoPath { start, goal })
    }
}

fn reconstruct(
    came_from: &HashMap<WorldPos, WorldPos>,
    start: WorldPos,
    goal: WorldPos,
) -> Vec<WorldPos> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&previous) => {
                path.push(previous);
                current = previous;
            }
            None => break,
        }
    }
    path.reverse();
    path
}
