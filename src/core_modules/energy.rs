// THEORY:
// The `energy` module is the seam between the tracker and its graph-cut
// solver. Every classification in the tracker (binary segmentation, blob
// splitting, topology repair) is phrased as the same problem:
//
//     minimise  Σ_p D_p(l_p)  +  Σ_(p,q) w_pq · [l_p ≠ l_q]
//
// over labellings `l` of a 2D grid, where `D` is a per-pixel per-label cost
// volume and `w` comes from the four directional pairwise arrays. The
// inter-label disagreement is uniform (Potts).
//
// Key architectural principles:
// 1.  **Trait Seam**: Stages depend on `EnergySolver`, not on a concrete
//     algorithm, so a different optimiser can be dropped in.
// 2.  **Exact for two labels**: `AlphaExpansion` starts from the all-zero
//     labelling; for two labels the first expansion of label 1 is already the
//     global minimum.
// 3.  **Expansion moves for k labels**: each move asks "which pixels should
//     switch to α?", a binary problem solved exactly by one min-cut. Moves are
//     accepted only if they strictly lower the energy, which bounds the loop.
// 4.  **Determinism**: labels are visited in ascending order and ties keep the
//     current labelling, so equal inputs give equal outputs.

use crate::core_modules::costs::PairwiseField;
use crate::core_modules::grid::Grid;
use crate::core_modules::max_flow::FlowGraph;
use crate::{Error, Result};
use tracing::trace;

/// Per-pixel, per-label costs for one labelling problem.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelCosts {
    width: usize,
    height: usize,
    labels: usize,
    data: Vec<i32>,
}

impl LabelCosts {
    /// A cost volume with every entry zero.
    pub fn zeros(width: usize, height: usize, labels: usize) -> Self {
        Self {
            width,
            height,
            labels,
            data: vec![0; width * height * labels],
        }
    }

    /// Two-label volume: background costs 0, foreground costs `foreground`.
    pub fn binary(foreground: &Grid<i32>) -> Self {
        let mut costs = Self::zeros(foreground.width(), foreground.height(), 2);
        for (i, &c) in foreground.data().iter().enumerate() {
            costs.data[i * 2 + 1] = c;
        }
        costs
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn labels(&self) -> usize {
        self.labels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, label: usize) -> i32 {
        self.data[(y * self.width + x) * self.labels + label]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, label: usize, cost: i32) {
        let index = (y * self.width + x) * self.labels + label;
        self.data[index] = cost;
    }

    #[inline]
    pub fn add(&mut self, x: usize, y: usize, label: usize, delta: i32) {
        let index = (y * self.width + x) * self.labels + label;
        self.data[index] = self.data[index].saturating_add(delta);
    }

    #[inline]
    fn at(&self, pixel: usize, label: usize) -> i64 {
        self.data[pixel * self.labels + label] as i64
    }
}

/// A solver for Potts-model labelling problems on a pixel grid.
pub trait EnergySolver {
    /// Returns a label in `0..costs.labels()` for every pixel.
    fn solve(&self, costs: &LabelCosts, pairwise: &PairwiseField) -> Result<Grid<u32>>;
}

impl<S: EnergySolver + ?Sized> EnergySolver for &S {
    fn solve(&self, costs: &LabelCosts, pairwise: &PairwiseField) -> Result<Grid<u32>> {
        (**self).solve(costs, pairwise)
    }
}

/// Total energy of `labels` under `costs` and `pairwise`.
pub fn energy(costs: &LabelCosts, pairwise: &PairwiseField, labels: &[u32]) -> i64 {
    let mut total: i64 = labels
        .iter()
        .enumerate()
        .map(|(p, &l)| costs.at(p, l as usize))
        .sum();
    pairwise.for_each_edge(costs.width, |p, q, w| {
        if labels[p] != labels[q] {
            total += w as i64;
        }
    });
    total
}

/// Alpha-expansion graph cuts with Dinic max-flow as the binary step.
#[derive(Debug, Clone, Copy)]
pub struct AlphaExpansion {
    /// Upper bound on full sweeps over the label set.
    pub max_cycles: usize,
}

impl Default for AlphaExpansion {
    fn default() -> Self {
        Self { max_cycles: 5 }
    }
}

impl AlphaExpansion {
    pub fn new(max_cycles: usize) -> Self {
        Self { max_cycles }
    }

    /// Best labelling reachable from `current` by switching any subset of pixels to `alpha`.
    fn expand(&self, costs: &LabelCosts, pairwise: &PairwiseField, current: &[u32], alpha: u32) -> Vec<u32> {
        let n = current.len();
        let a = alpha as usize;
        // e0: cost of keeping the current label; e1: cost of switching to alpha.
        let e0: Vec<i64> = (0..n).map(|p| costs.at(p, current[p] as usize)).collect();
        let mut e1: Vec<i64> = (0..n).map(|p| costs.at(p, a)).collect();
        let mut pair_edges = Vec::new();

        pairwise.for_each_edge(costs.width, |p, q, w| {
            let w = w as i64;
            let (fp, fq) = (current[p], current[q]);
            let e00 = if fp != fq { w } else { 0 };
            let e01 = if fp != alpha { w } else { 0 };
            let e10 = if alpha != fq { w } else { 0 };
            // E(xp, xq) = e00 + (e10 - e00) xp + (0 - e10) xq + (e01 + e10 - e00) (1 - xp) xq
            e1[p] += e10 - e00;
            e1[q] -= e10;
            let coupling = e01 + e10 - e00;
            if coupling > 0 {
                pair_edges.push((p, q, coupling));
            }
        });

        let mut graph = FlowGraph::new(n);
        for p in 0..n {
            let m = e0[p].min(e1[p]);
            // Switching (sink side) pays e1, keeping (source side) pays e0.
            graph.add_terminal(p, e1[p] - m, e0[p] - m);
        }
        for (p, q, cap) in pair_edges {
            graph.add_edge(p, q, cap);
        }
        graph.max_flow();

        graph
            .source_side()
            .into_iter()
            .zip(current)
            .map(|(keep, &label)| if keep { label } else { alpha })
            .collect()
    }
}

impl EnergySolver for AlphaExpansion {
    fn solve(&self, costs: &LabelCosts, pairwise: &PairwiseField) -> Result<Grid<u32>> {
        if costs.labels == 0 {
            return Err(Error::Solver("cost volume has no labels".to_string()));
        }
        pairwise.validate(costs.width, costs.height)?;
        let mut negative = false;
        pairwise.for_each_edge(costs.width, |_, _, w| negative |= w < 0);
        if negative {
            return Err(Error::Solver("pairwise weights must be non-negative".to_string()));
        }

        let mut labels = vec![0u32; costs.width * costs.height];
        if costs.labels > 1 && !labels.is_empty() {
            let mut current = energy(costs, pairwise, &labels);
            for cycle in 0..self.max_cycles {
                let mut improved = false;
                for alpha in 0..costs.labels as u32 {
                    let proposal = self.expand(costs, pairwise, &labels, alpha);
                    let proposed = energy(costs, pairwise, &proposal);
                    if proposed < current {
                        labels = proposal;
                        current = proposed;
                        improved = true;
                    }
                }
                trace!(cycle, energy = current, "expansion sweep");
                if !improved {
                    break;
                }
            }
        }

        Grid::from_vec(costs.width, costs.height, labels)
    }
}
