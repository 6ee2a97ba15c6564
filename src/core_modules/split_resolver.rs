// THEORY:
// The `SplitResolver` handles the case the greedy tracker cannot: a single blob
// in the current frame that overlaps several identities from the previous
// frame (two plants whose leaves have grown into each other). It decides, pixel
// by pixel, which of the candidate identities each pixel of the blob belongs to.
//
// The decision is a constrained multi-label energy minimisation over the blob's
// bounding box:
// - label 0 (background) costs the negated foreground cost of the pixel;
// - every candidate label costs nothing by default;
// - wherever the previous frame had any plant, every label pays `zwt`, except
//   that candidate `i` pays nothing where the previous frame was candidate `i`.
// The net effect is a strong pull for each pixel to keep its previous identity
// and a smooth boundary (via the pairwise weights) where ownership is new.
// Pixels the solver sends to background are dropped from the blob.

use crate::config::TrackerConfig;
use crate::core_modules::blob::{Blob, Point};
use crate::core_modules::costs::FrameCosts;
use crate::core_modules::energy::{EnergySolver, LabelCosts};
use crate::core_modules::grid::IdentityMap;
use crate::{Error, Result};
use tracing::debug;

/// Partitions one ambiguous blob among the identities it overlaps.
pub struct SplitResolver<'a, S: EnergySolver> {
    config: &'a TrackerConfig,
    solver: &'a S,
}

impl<'a, S: EnergySolver> SplitResolver<'a, S> {
    pub fn new(config: &'a TrackerConfig, solver: &'a S) -> Self {
        Self { config, solver }
    }

    /// Assigns every pixel of `blob` to one of `candidates` or to background (0).
    ///
    /// Returns `(pixel, identity)` for each blob pixel, in the blob's pixel order.
    pub fn resolve(
        &self,
        blob: &Blob,
        previous: &IdentityMap,
        candidates: &[u32],
        costs: &FrameCosts,
    ) -> Result<Vec<(Point, u32)>> {
        if candidates.is_empty() {
            return Err(Error::NoCandidates);
        }

        let bbox = blob.bounding_box;
        let local = costs.crop(&bbox);
        let prev = previous.crop_box(&bbox);
        let (w, h) = (bbox.width(), bbox.height());
        let zwt = self.config.zwt;

        let mut volume = LabelCosts::zeros(w, h, candidates.len() + 1);
        for y in 0..h {
            for x in 0..w {
                volume.set(x, y, 0, local.unary.get(x, y).saturating_neg());
                let owner = prev.get(x, y);
                if owner == 0 {
                    continue;
                }
                for label in 0..=candidates.len() {
                    volume.add(x, y, label, zwt);
                }
                if let Some(i) = candidates.iter().position(|&c| c == owner) {
                    volume.set(x, y, i + 1, 0);
                }
            }
        }

        let labels = self.solver.solve(&volume, &local.pairwise)?;

        let assignment: Vec<(Point, u32)> = blob
            .pixels
            .iter()
            .map(|&p| {
                let local_p = bbox.to_local(p);
                let label = labels.at(local_p) as usize;
                let identity = if label == 0 { 0 } else { candidates[label - 1] };
                (p, identity)
            })
            .collect();

        debug!(
            blob = blob.id,
            candidates = ?candidates,
            dropped = assignment.iter().filter(|(_, id)| *id == 0).count(),
            "split ambiguous blob"
        );
        Ok(assignment)
    }
}
