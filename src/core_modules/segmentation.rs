// THEORY:
// The `SegmentationStage` performs the binary plant/soil classification of one
// frame. It owns no algorithm of its own: it folds the temporal prior into the
// unary costs and hands a two-label problem to the energy solver.
//
// The temporal prior rewards pixels that carried any identity in the previous
// frame (a fixed `-zwt` on their foreground cost), which keeps slowly changing
// foliage stable from frame to frame.

use crate::config::TrackerConfig;
use crate::core_modules::costs::FrameCosts;
use crate::core_modules::energy::{EnergySolver, LabelCosts};
use crate::core_modules::grid::{Grid, IdentityMap, Mask};
use crate::Result;
use tracing::debug;

const FOREGROUND: u32 = 1;

/// Binary foreground/background classification for a single frame.
pub struct SegmentationStage<'a, S: EnergySolver> {
    config: &'a TrackerConfig,
    solver: &'a S,
}

impl<'a, S: EnergySolver> SegmentationStage<'a, S> {
    pub fn new(config: &'a TrackerConfig, solver: &'a S) -> Self {
        Self { config, solver }
    }

    /// Foreground cost per pixel after applying the temporal prior.
    pub fn biased_unary(&self, costs: &FrameCosts, previous: Option<&IdentityMap>) -> Result<Grid<i32>> {
        let mut unary = costs.unary.clone();
        if let Some(prev) = previous {
            prev.expect_shape(costs.width(), costs.height(), "previous identity map")?;
            let zwt = self.config.zwt;
            for (cost, &id) in unary.data_mut().iter_mut().zip(prev.data()) {
                if id > 0 {
                    *cost = cost.saturating_sub(zwt);
                }
            }
        }
        Ok(unary)
    }

    /// Classifies every pixel of the frame as plant (`true`) or background.
    pub fn segment(&self, costs: &FrameCosts, previous: Option<&IdentityMap>) -> Result<Mask> {
        let unary = self.biased_unary(costs, previous)?;
        let labels = self.solver.solve(&LabelCosts::binary(&unary), &costs.pairwise)?;
        let mask = labels.map(|l| l == FOREGROUND);
        debug!(
            foreground = mask.count(),
            pixels = mask.len(),
            temporal_prior = previous.is_some(),
            "binary segmentation"
        );
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::costs::PairwiseField;
    use crate::core_modules::energy::AlphaExpansion;

    fn costs_with(unary: Grid<i32>) -> FrameCosts {
        let (w, h) = (unary.width(), unary.height());
        FrameCosts::new(unary, PairwiseField::uniform(w, h, 10)).unwrap()
    }

    #[test]
    fn negative_costs_become_foreground() {
        let unary = Grid::from_fn(8, 4, |x, _| if x < 4 { -500 } else { 500 });
        let config = TrackerConfig::default();
        let solver = AlphaExpansion::default();
        let mask = SegmentationStage::new(&config, &solver).segment(&costs_with(unary), None).unwrap();
        assert_eq!(mask.count(), 16);
        assert!(mask.get(0, 0) && !mask.get(7, 3));
    }

    #[test]
    fn temporal_prior_keeps_previous_foreground() {
        // Weakly background everywhere; the previous frame had a plant on the left.
        let unary = Grid::new(8, 4, 1_000);
        let prev = Grid::from_fn(8, 4, |x, _| if x < 3 { 7u32 } else { 0 });
        let config = TrackerConfig::default();
        let solver = AlphaExpansion::default();
        let stage = SegmentationStage::new(&config, &solver);

        let without = stage.segment(&costs_with(unary.clone()), None).unwrap();
        assert!(!without.any());

        let with = stage.segment(&costs_with(unary), Some(&prev)).unwrap();
        assert_eq!(with.count(), 12);
        assert!(with.get(2, 1) && !with.get(3, 1));
    }

    #[test]
    fn empty_cost_field_gives_empty_mask() {
        let unary = Grid::new(6, 6, 300);
        let config = TrackerConfig::default();
        let solver = AlphaExpansion::default();
        let mask = SegmentationStage::new(&config, &solver).segment(&costs_with(unary), None).unwrap();
        assert!(!mask.any());
    }

    #[test]
    fn previous_map_shape_is_checked() {
        let config = TrackerConfig::default();
        let solver = AlphaExpansion::default();
        let prev = Grid::new(3, 3, 0u32);
        let err = SegmentationStage::new(&config, &solver)
            .segment(&costs_with(Grid::new(4, 4, 0)), Some(&prev))
            .unwrap_err();
        assert!(matches!(err, crate::Error::ShapeMismatch { .. }));
    }
}
