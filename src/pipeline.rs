// THEORY:
// The `pipeline` module is the synchronous, top-level API for tracking a whole
// sequence in memory. It bundles a cost provider, a `Driver`, and the
// cross-frame context (`IdentityLedger` plus the growing identity volume) into
// one object that frames are pushed into, one at a time, in time order.
//
// It persists nothing. Callers that need to store or reload volumes keep the
// maps returned here and resume a sequence with `TrackingPipeline::resume`.

use crate::config::TrackerConfig;
use crate::core_modules::costs::{ChromaCostProvider, CostProvider, FrameCosts};
use crate::core_modules::energy::{AlphaExpansion, EnergySolver};
use crate::core_modules::grid::IdentityMap;
use crate::core_modules::tracker::IdentityLedger;
use crate::driver::Driver;
use crate::Result;
use image::RgbImage;
use tracing::info;

/// Tracks a sequence of frames and keeps every identity map produced so far.
pub struct TrackingPipeline<P: CostProvider = ChromaCostProvider, S: EnergySolver = AlphaExpansion> {
    provider: P,
    driver: Driver<S>,
    ledger: IdentityLedger,
    volume: Vec<IdentityMap>,
}

impl TrackingPipeline {
    /// A pipeline with the built-in colour cost model and solver.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let provider = ChromaCostProvider::new(config.clone());
        Self::with_parts(provider, Driver::new(config)?)
    }
}

impl<P: CostProvider, S: EnergySolver> TrackingPipeline<P, S> {
    pub fn with_parts(provider: P, driver: Driver<S>) -> Result<Self> {
        Ok(Self {
            provider,
            driver,
            ledger: IdentityLedger::new(),
            volume: Vec::new(),
        })
    }

    /// Continues a sequence whose earlier identity maps are `volume`.
    pub fn resume(mut self, volume: Vec<IdentityMap>) -> Self {
        for map in &volume {
            self.ledger.observe(map);
        }
        self.volume = volume;
        self
    }

    /// Tracks the next frame of the sequence.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<&IdentityMap> {
        let costs = self.provider.costs(frame)?;
        self.process_costs(&costs)
    }

    /// Tracks the next frame of the sequence from precomputed costs.
    pub fn process_costs(&mut self, costs: &FrameCosts) -> Result<&IdentityMap> {
        let map = self.driver.track_frame(costs, self.volume.last(), &mut self.ledger)?;
        info!(
            frame = self.volume.len(),
            identities = map.identities().len(),
            highest_issued = self.ledger.highest_issued(),
            "tracked frame"
        );
        self.volume.push(map);
        Ok(&self.volume[self.volume.len() - 1])
    }

    /// Every identity map produced so far, in frame order.
    pub fn volume(&self) -> &[IdentityMap] {
        &self.volume
    }

    pub fn latest(&self) -> Option<&IdentityMap> {
        self.volume.last()
    }

    pub fn ledger(&self) -> &IdentityLedger {
        &self.ledger
    }

    /// Ends the sequence and hands back the identity volume.
    pub fn into_volume(self) -> Vec<IdentityMap> {
        self.volume
    }
}
