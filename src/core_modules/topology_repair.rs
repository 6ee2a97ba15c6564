// THEORY:
// `TopologyRepair` enforces the last invariant of an identity map: every plant
// is one connected region. Blob grouping bridges small gaps, but once pixels
// are cut back to the true foreground an identity can still come out in
// several fragments.
//
// Key architectural principles:
// 1.  **Local Problems**: Each fragmented identity is repaired inside its own
//     bounding box, one identity at a time, in ascending order.
// 2.  **Hull Recruitment**: Only unassigned pixels inside the convex hull of the
//     identity may be recruited. Their foreground cost starts at the image's
//     own cost (with the temporal prior for this identity) and is lowered by
//     `joininc` every round until the solver bridges the fragments, or
//     `joinit` rounds pass.
// 3.  **Minimal Additions**: A successful join may have recruited several
//     separate patches. The least plant-like patches are dropped again as long
//     as the identity stays connected.
// 4.  **Graceful Fallback**: If no round joins the fragments, the identity
//     keeps only its largest fragment. This is an expected outcome, not an
//     error.

use crate::config::TrackerConfig;
use crate::core_modules::convex_hull::convex_hull_mask;
use crate::core_modules::costs::FrameCosts;
use crate::core_modules::energy::{EnergySolver, LabelCosts};
use crate::core_modules::grid::{Grid, IdentityMap, Mask};
use crate::core_modules::labeling::{self, Connectivity};
use crate::Result;
use tracing::{debug, warn};

const FOREGROUND: u32 = 1;

/// Which fragmented identities were joined and which fell back to their largest fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub joined: Vec<u32>,
    pub fallback: Vec<u32>,
}

impl RepairReport {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.fallback.is_empty()
    }
}

/// Makes every identity of a map a single connected region.
pub struct TopologyRepair<'a, S: EnergySolver> {
    config: &'a TrackerConfig,
    solver: &'a S,
}

impl<'a, S: EnergySolver> TopologyRepair<'a, S> {
    pub fn new(config: &'a TrackerConfig, solver: &'a S) -> Self {
        Self { config, solver }
    }

    fn connectivity(&self) -> Connectivity {
        self.config.connectivity
    }

    /// Repairs `map` in place.
    pub fn repair(
        &self,
        map: &mut IdentityMap,
        previous: Option<&IdentityMap>,
        costs: &FrameCosts,
    ) -> Result<RepairReport> {
        map.expect_shape(costs.width(), costs.height(), "identity map")?;
        if let Some(prev) = previous {
            prev.expect_shape(costs.width(), costs.height(), "previous identity map")?;
        }

        let mut report = RepairReport::default();
        for identity in 1..=map.max_identity() {
            // Earlier repairs may have recruited or dropped pixels, so boxes are
            // taken from the current state of the map.
            let Some(bbox) = map.bounding_box_of(identity) else {
                continue;
            };
            let mut window = map.crop_box(&bbox);
            let fragments = labeling::count_components(&window.mask_of(identity), self.connectivity());
            if fragments <= 1 {
                continue;
            }

            let prev = previous.map(|p| p.crop_box(&bbox));
            if self.join(identity, &mut window, prev.as_ref(), &costs.crop(&bbox))? {
                debug!(identity, fragments, "joined fragmented identity");
                report.joined.push(identity);
            } else {
                self.keep_largest(identity, &mut window);
                warn!(identity, fragments, rounds = self.config.joinit, "could not join identity; keeping largest fragment");
                report.fallback.push(identity);
            }
            map.paste(&window, bbox.min.x, bbox.min.y);
        }
        Ok(report)
    }

    /// Tries to bridge the fragments of `identity` inside `window`. Returns whether it succeeded.
    fn join(
        &self,
        identity: u32,
        window: &mut IdentityMap,
        prev: Option<&IdentityMap>,
        local: &FrameCosts,
    ) -> Result<bool> {
        let (w, h) = (window.width(), window.height());
        let (uwt, zwt) = (self.config.uwt, self.config.zwt);

        let own = window.mask_of(identity);
        let unassigned = window.map(|v| v == 0);
        let hull = convex_hull_mask(&own);
        let recruitable = Grid::from_fn(w, h, |x, y| hull.get(x, y) && unassigned.get(x, y));
        let recruit_cost = Grid::from_fn(w, h, |x, y| {
            let cost = local.unary.get(x, y);
            match prev {
                Some(p) if p.get(x, y) == identity => cost.saturating_sub(zwt),
                _ => cost,
            }
        });

        let mut unary = Grid::from_fn(w, h, |x, y| {
            if own.get(x, y) {
                -uwt
            } else if recruitable.get(x, y) {
                recruit_cost.get(x, y)
            } else {
                uwt
            }
        });

        for _ in 0..self.config.joinit {
            for (cost, &r) in unary.data_mut().iter_mut().zip(recruitable.data()) {
                if r {
                    *cost = cost.saturating_sub(self.config.joininc);
                }
            }
            let solved = self
                .solver
                .solve(&LabelCosts::binary(&unary), &local.pairwise)?
                .map(|l| l == FOREGROUND);
            if !labeling::is_single_connected(&solved, self.connectivity()) {
                continue;
            }

            let solved = self.prune_additions(solved, &unassigned, &recruit_cost);
            for (cell, &fg) in window.data_mut().iter_mut().zip(solved.data()) {
                if fg {
                    *cell = identity;
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Drops recruited patches the joined region does not need, least plant-like first.
    fn prune_additions(&self, mut solved: Mask, unassigned: &Mask, recruit_cost: &Grid<i32>) -> Mask {
        let additions = Grid::from_fn(solved.width(), solved.height(), |x, y| {
            solved.get(x, y) && unassigned.get(x, y)
        });
        let components = labeling::label_components(&additions, self.connectivity());
        if components.count <= 1 {
            return solved;
        }

        let patches = components.pixels();
        // Background cost of a pixel is its negated foreground cost.
        let mut order: Vec<(i64, usize)> = patches
            .iter()
            .enumerate()
            .map(|(i, pixels)| (-pixels.iter().map(|&p| recruit_cost.at(p) as i64).sum::<i64>(), i))
            .collect();
        order.sort_by_key(|&(score, _)| score);

        for (_, i) in order {
            let mut trial = solved.clone();
            for &p in &patches[i] {
                trial.set(p.x, p.y, false);
            }
            if labeling::is_single_connected(&trial, self.connectivity()) {
                solved = trial;
            }
        }
        solved
    }

    /// Clears every fragment of `identity` except the largest one.
    fn keep_largest(&self, identity: u32, window: &mut IdentityMap) {
        let components = labeling::label_components(&window.mask_of(identity), self.connectivity());
        let sizes = components.sizes();
        let largest = (1..=components.count).fold(1, |best, l| if sizes[l] > sizes[best] { l } else { best });
        for (cell, &l) in window.data_mut().iter_mut().zip(components.labels.data()) {
            if l > 0 && l as usize != largest {
                *cell = 0;
            }
        }
    }
}
