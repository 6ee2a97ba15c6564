// THEORY:
// The `Driver` runs the whole per-frame algorithm: segmentation with the
// temporal prior, blob tracking (with split resolution), and topology repair.
// It is the single-frame API that everything else is built on.
//
// The driver owns only its configuration and its solver. Everything that
// carries over between frames (the previous identity map and the
// `IdentityLedger`) is passed in by the caller, so one driver can serve any
// number of independent sequences.

use crate::config::TrackerConfig;
use crate::core_modules::costs::{CostProvider, FrameCosts};
use crate::core_modules::energy::{AlphaExpansion, EnergySolver};
use crate::core_modules::grid::IdentityMap;
use crate::core_modules::segmentation::SegmentationStage;
use crate::core_modules::tracker::{ComponentTracker, IdentityLedger};
use crate::Result;
use image::RgbImage;
use tracing::debug;

/// Per-frame orchestrator of the segmentation and tracking stages.
#[derive(Debug, Clone)]
pub struct Driver<S: EnergySolver = AlphaExpansion> {
    config: TrackerConfig,
    solver: S,
}

impl Driver<AlphaExpansion> {
    /// A driver using the built-in alpha-expansion solver.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Self::with_solver(config, AlphaExpansion::default())
    }
}

impl<S: EnergySolver> Driver<S> {
    /// A driver using a caller-supplied energy solver.
    pub fn with_solver(config: TrackerConfig, solver: S) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, solver })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Produces the identity map for one frame from its costs.
    ///
    /// `previous` is the map of the preceding frame, or `None` for the first
    /// frame of a sequence.
    pub fn track_frame(
        &self,
        costs: &FrameCosts,
        previous: Option<&IdentityMap>,
        ledger: &mut IdentityLedger,
    ) -> Result<IdentityMap> {
        if let Some(prev) = previous {
            prev.expect_shape(costs.width(), costs.height(), "previous identity map")?;
        }

        // --- 1. Binary segmentation with temporal prior ---
        let mask = SegmentationStage::new(&self.config, &self.solver).segment(costs, previous)?;

        // --- 2. Blob tracking, splitting, and repair ---
        let map = ComponentTracker::new(&self.config, &self.solver).track(&mask, previous, costs, ledger)?;

        debug!(
            width = costs.width(),
            height = costs.height(),
            identities = map.identities().len(),
            highest_issued = ledger.highest_issued(),
            "frame tracked"
        );
        Ok(map)
    }

    /// Runs `provider` on `frame` and tracks the result.
    pub fn track_frame_image<P: CostProvider + ?Sized>(
        &self,
        provider: &P,
        frame: &RgbImage,
        previous: Option<&IdentityMap>,
        ledger: &mut IdentityLedger,
    ) -> Result<IdentityMap> {
        let costs = provider.costs(frame)?;
        self.track_frame(&costs, previous, ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::costs::PairwiseField;
    use crate::core_modules::grid::Grid;
    use crate::Error;

    fn square_costs(w: usize, h: usize, squares: &[(usize, usize, usize)]) -> FrameCosts {
        let unary = Grid::from_fn(w, h, |x, y| {
            let inside = squares
                .iter()
                .any(|&(x0, y0, s)| (x0..x0 + s).contains(&x) && (y0..y0 + s).contains(&y));
            if inside { -8_000 } else { 8_000 }
        });
        FrameCosts::new(unary, PairwiseField::uniform(w, h, 100)).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TrackerConfig {
            fsz: 1,
            ..TrackerConfig::default()
        };
        assert!(matches!(Driver::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn identities_persist_across_frames() {
        let config = TrackerConfig {
            ccnbd: 3,
            ..TrackerConfig::default()
        };
        let driver = Driver::new(config).unwrap();
        let mut ledger = IdentityLedger::new();

        let first = driver
            .track_frame(&square_costs(40, 20, &[(2, 2, 6), (25, 10, 6)]), None, &mut ledger)
            .unwrap();
        assert_eq!(first.identities(), vec![1, 2]);

        // Both plants grow by one pixel; identities carry over.
        let second = driver
            .track_frame(&square_costs(40, 20, &[(2, 2, 7), (24, 9, 7)]), Some(&first), &mut ledger)
            .unwrap();
        assert_eq!(second.identities(), vec![1, 2]);
        assert_eq!(second.get(8, 8), 1);
        assert_eq!(second.get(24, 9), 2);
        assert_eq!(ledger.highest_issued(), 2);
    }

    #[test]
    fn previous_map_shape_is_checked() {
        let driver = Driver::new(TrackerConfig::default()).unwrap();
        let prev = Grid::new(3, 3, 0u32);
        let err = driver
            .track_frame(&square_costs(4, 4, &[]), Some(&prev), &mut IdentityLedger::new())
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
