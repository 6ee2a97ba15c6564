// THEORY:
// The `tracker` module is the heart of the identity layer. It adds "object
// permanence" to the tracker: it takes the stateless blobs of one frame and
// decides which persistent plant identity each of them carries.
//
// This module solves the data association problem for plants:
// 1.  **Inheritance**: A blob that overlaps exactly one identity from the
//     previous frame simply inherits it. Plants grow slowly relative to the
//     frame rate, so overlap is the strongest evidence there is.
// 2.  **Splitting**: A blob overlapping several identities is handed to the
//     `SplitResolver`, which divides its pixels among them.
// 3.  **Reconciliation**: A blob overlapping nothing is provisional. Identities
//     that vanished from the new frame are visited in ascending order; each
//     claims the nearest provisional blob whose centroid is within `8·ccnbd`
//     of its previous centroid. This is greedy on purpose and the visiting
//     order is part of the contract.
// 4.  **Birth**: Provisional blobs that nobody claimed become new identities,
//     minted from the `IdentityLedger` so a number is never handed out twice.
// 5.  **Repair**: Finally, `TopologyRepair` makes each identity one connected
//     region.

use crate::config::TrackerConfig;
use crate::core_modules::blob::Blob;
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::costs::FrameCosts;
use crate::core_modules::energy::EnergySolver;
use crate::core_modules::grid::{Grid, IdentityMap, Mask};
use crate::core_modules::split_resolver::SplitResolver;
use crate::core_modules::topology_repair::TopologyRepair;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Squared-distance radius, in units of `ccnbd`, within which a vanished
/// identity may claim a provisional blob.
const RECLAIM_RADIUS_FACTOR: f64 = 8.0;

/// The explicit cross-frame context of a tracked sequence: the highest identity
/// ever issued. Identities are minted above it, so they are never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityLedger {
    highest_issued: u32,
}

impl IdentityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes a sequence whose identities so far go up to `highest_issued`.
    pub fn resume(highest_issued: u32) -> Self {
        Self { highest_issued }
    }

    pub fn highest_issued(&self) -> u32 {
        self.highest_issued
    }

    /// Records identities that exist in a map produced elsewhere.
    pub fn observe(&mut self, map: &IdentityMap) {
        self.highest_issued = self.highest_issued.max(map.max_identity());
    }

    /// Issues a fresh identity.
    pub fn mint(&mut self) -> u32 {
        self.highest_issued += 1;
        self.highest_issued
    }
}

/// A cell of the working map while a frame is being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Background,
    /// A blob that overlaps no previous identity, by index into the provisional list.
    Provisional(usize),
    Identity(u32),
}

/// A blob waiting for an identity.
struct Provisional<'b> {
    blob: &'b Blob,
    claimed: bool,
}

/// Extracts blobs from a binary mask and assigns them persistent identities.
pub struct ComponentTracker<'a, S: EnergySolver> {
    config: &'a TrackerConfig,
    solver: &'a S,
}

impl<'a, S: EnergySolver> ComponentTracker<'a, S> {
    pub fn new(config: &'a TrackerConfig, solver: &'a S) -> Self {
        Self { config, solver }
    }

    /// Produces the identity map of the current frame.
    pub fn track(
        &self,
        binary: &Mask,
        previous: Option<&IdentityMap>,
        costs: &FrameCosts,
        ledger: &mut IdentityLedger,
    ) -> Result<IdentityMap> {
        binary.expect_shape(costs.width(), costs.height(), "binary mask")?;
        let blobs = blob_detector::find_blobs(binary, self.config.ccnbd, self.config.connectivity);

        let mut map = match previous {
            None => self.label_first_frame(binary, &blobs, ledger),
            Some(prev) => {
                prev.expect_shape(binary.width(), binary.height(), "previous identity map")?;
                ledger.observe(prev);
                self.label_from_previous(binary, &blobs, prev, costs, ledger)?
            }
        };

        if self.config.joinit > 0 {
            TopologyRepair::new(self.config, self.solver).repair(&mut map, previous, costs)?;
        }
        Ok(map)
    }

    fn label_first_frame(&self, binary: &Mask, blobs: &[Blob], ledger: &mut IdentityLedger) -> IdentityMap {
        let mut map = Grid::new(binary.width(), binary.height(), 0u32);
        for blob in blobs {
            if blob.size() < self.config.ccnbd {
                trace!(blob = blob.id, size = blob.size(), "discarding small blob");
                continue;
            }
            let identity = ledger.mint();
            for &p in &blob.pixels {
                map.set(p.x, p.y, identity);
            }
        }
        debug!(blobs = blobs.len(), identities = ledger.highest_issued(), "labelled first frame");
        map
    }

    fn label_from_previous(
        &self,
        binary: &Mask,
        blobs: &[Blob],
        prev: &IdentityMap,
        costs: &FrameCosts,
        ledger: &mut IdentityLedger,
    ) -> Result<IdentityMap> {
        let ccnbd = self.config.ccnbd;
        let mut slots = Grid::new(binary.width(), binary.height(), Slot::Background);
        let mut provisionals: Vec<Provisional<'_>> = Vec::new();
        let splitter = SplitResolver::new(self.config, self.solver);

        // --- 1. Direct matching by overlap ---
        for blob in blobs {
            let mut overlapping: Vec<u32> = blob.pixels.iter().map(|&p| prev.at(p)).filter(|&id| id > 0).collect();
            overlapping.sort_unstable();
            overlapping.dedup();

            match overlapping.as_slice() {
                [] => {
                    if blob.size() < ccnbd {
                        continue;
                    }
                    let index = provisionals.len();
                    for &p in &blob.pixels {
                        slots.set(p.x, p.y, Slot::Provisional(index));
                    }
                    provisionals.push(Provisional { blob, claimed: false });
                }
                [only] => {
                    for &p in &blob.pixels {
                        slots.set(p.x, p.y, Slot::Identity(*only));
                    }
                }
                candidates => {
                    for (p, identity) in splitter.resolve(blob, prev, candidates, costs)? {
                        if identity > 0 {
                            slots.set(p.x, p.y, Slot::Identity(identity));
                        }
                    }
                }
            }
        }

        // --- 2. Reconcile vanished identities with provisional blobs ---
        let mut present = vec![false; prev.max_identity() as usize + 1];
        for slot in slots.data() {
            if let Slot::Identity(id) = *slot {
                present[id as usize] = true;
            }
        }
        let missing: Vec<u32> = prev.identities().into_iter().filter(|&id| !present[id as usize]).collect();
        let reclaim_radius_sq = (RECLAIM_RADIUS_FACTOR * ccnbd as f64).powi(2);
        let mut unclaimed = provisionals.len();

        for identity in missing {
            if unclaimed == 0 {
                self.carry_forward(&mut slots, prev, identity);
                continue;
            }
            let Some(prior) = prev.centroid_of(identity) else {
                continue;
            };

            let mut nearest: Option<(usize, f64)> = None;
            for (index, candidate) in provisionals.iter().enumerate() {
                if candidate.claimed {
                    continue;
                }
                let d = candidate.blob.squared_distance_to(prior);
                if nearest.is_none_or(|(_, best)| d < best) {
                    nearest = Some((index, d));
                }
            }

            match nearest {
                Some((index, d)) if d < reclaim_radius_sq => {
                    trace!(identity, blob = index, distance_sq = d, "vanished identity reclaimed blob");
                    let candidate = &mut provisionals[index];
                    candidate.claimed = true;
                    for &p in &candidate.blob.pixels {
                        slots.set(p.x, p.y, Slot::Identity(identity));
                    }
                    unclaimed -= 1;
                }
                _ => self.carry_forward(&mut slots, prev, identity),
            }
        }

        // --- 3. Births ---
        // Claimed blobs were relabelled above, so their entry is never looked up.
        let born: Vec<u32> = provisionals
            .iter()
            .map(|c| if c.claimed { 0 } else { ledger.mint() })
            .collect();

        debug!(
            blobs = blobs.len(),
            provisional = provisionals.len(),
            born = born.iter().filter(|&&id| id > 0).count(),
            highest = ledger.highest_issued(),
            "tracked frame"
        );

        Ok(slots.map(|slot| match slot {
            Slot::Identity(id) => id,
            Slot::Provisional(index) => born[index],
            Slot::Background => 0,
        }))
    }

    /// Restores `identity` on its previous footprint if no pixel of it is claimed.
    fn carry_forward(&self, slots: &mut Grid<Slot>, prev: &IdentityMap, identity: u32) {
        if !self.config.carry_forward_missing {
            return;
        }
        let footprint: Vec<usize> = (0..prev.len()).filter(|&i| prev.data()[i] == identity).collect();
        match footprint.iter().map(|&i| slots.data()[i]).find(|&s| s != Slot::Background) {
            Some(_) => trace!(identity, "footprint is taken; identity vanishes"),
            None => {
                trace!(identity, pixels = footprint.len(), "carrying identity forward");
                for i in footprint {
                    slots.data_mut()[i] = Slot::Identity(identity);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::costs::PairwiseField;
    use crate::core_modules::energy::AlphaExpansion;

    fn config(ccnbd: usize) -> TrackerConfig {
        TrackerConfig {
            ccnbd,
            joinit: 0,
            ..TrackerConfig::default()
        }
    }

    fn flat_costs(w: usize, h: usize) -> FrameCosts {
        FrameCosts::new(Grid::new(w, h, -1_000), PairwiseField::uniform(w, h, 100)).unwrap()
    }

    fn fill(mask: &mut Mask, x0: usize, y0: usize, w: usize, h: usize) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.set(x, y, true);
            }
        }
    }

    #[test]
    fn ledger_never_reissues() {
        let mut ledger = IdentityLedger::new();
        assert_eq!(ledger.mint(), 1);
        let map = Grid::from_vec(2, 1, vec![0, 9]).unwrap();
        ledger.observe(&map);
        assert_eq!(ledger.mint(), 10);
        ledger.observe(&Grid::new(2, 1, 0u32));
        assert_eq!(ledger.mint(), 11);
    }

    #[test]
    fn first_frame_numbers_blobs_in_raster_order() {
        let mut mask = Grid::new(30, 10, false);
        fill(&mut mask, 20, 0, 4, 4);
        fill(&mut mask, 0, 5, 4, 4);
        let config = config(3);
        let solver = AlphaExpansion::default();
        let mut ledger = IdentityLedger::new();
        let map = ComponentTracker::new(&config, &solver)
            .track(&mask, None, &flat_costs(30, 10), &mut ledger)
            .unwrap();
        assert_eq!(map.get(21, 1), 1);
        assert_eq!(map.get(1, 6), 2);
        assert_eq!(ledger.highest_issued(), 2);
    }

    #[test]
    fn overlapping_blob_inherits_identity() {
        let mut mask = Grid::new(20, 10, false);
        fill(&mut mask, 5, 2, 5, 5);
        let prev = Grid::from_fn(20, 10, |x, y| if (4..8).contains(&x) && (2..6).contains(&y) { 4 } else { 0 });
        let config = config(3);
        let solver = AlphaExpansion::default();
        let mut ledger = IdentityLedger::new();
        let map = ComponentTracker::new(&config, &solver)
            .track(&mask, Some(&prev), &flat_costs(20, 10), &mut ledger)
            .unwrap();
        assert_eq!(map.identities(), vec![4]);
        assert_eq!(map.histogram()[4], 25);
    }

    #[test]
    fn unmatched_blobs_get_fresh_identities_above_the_ledger() {
        let mut mask = Grid::new(40, 10, false);
        fill(&mut mask, 30, 2, 5, 5);
        let prev = Grid::from_fn(40, 10, |x, y| if x < 4 && y < 4 { 2 } else { 0 });
        let config = TrackerConfig {
            carry_forward_missing: false,
            ccnbd: 2,
            ..config(2)
        };
        let solver = AlphaExpansion::default();
        // Identity 7 was issued in an earlier frame and has since retired.
        let mut ledger = IdentityLedger::resume(7);
        let map = ComponentTracker::new(&config, &solver)
            .track(&mask, Some(&prev), &flat_costs(40, 10), &mut ledger)
            .unwrap();
        // Too far for identity 2 to claim (distance > 16), so it is born as 8.
        assert_eq!(map.identities(), vec![8]);
    }

    #[test]
    fn vanished_identity_is_carried_forward_when_unclaimed() {
        let mask = Grid::new(20, 10, false);
        let prev = Grid::from_fn(20, 10, |x, y| if x < 3 && y < 3 { 6 } else { 0 });
        let solver = AlphaExpansion::default();

        let keep = config(3);
        let mut ledger = IdentityLedger::new();
        let map = ComponentTracker::new(&keep, &solver)
            .track(&mask, Some(&prev), &flat_costs(20, 10), &mut ledger)
            .unwrap();
        assert_eq!(map, prev);

        let drop = TrackerConfig {
            carry_forward_missing: false,
            ..config(3)
        };
        let map = ComponentTracker::new(&drop, &solver)
            .track(&mask, Some(&prev), &flat_costs(20, 10), &mut ledger)
            .unwrap();
        assert!(map.identities().is_empty());
    }

    #[test]
    fn reconciliation_visits_missing_identities_in_ascending_order() {
        // Identities 1 and 2 both vanish; one provisional blob lies near both.
        // Identity 1 is visited first and takes it, even though 2 is closer.
        let mut mask = Grid::new(40, 20, false);
        fill(&mut mask, 20, 10, 3, 3);
        let prev = Grid::from_fn(40, 20, |x, y| {
            if x < 2 && y < 2 {
                1
            } else if (30..32).contains(&x) && (10..12).contains(&y) {
                2
            } else {
                0
            }
        });
        let config = TrackerConfig {
            carry_forward_missing: false,
            ..config(3)
        };
        let solver = AlphaExpansion::default();
        let mut ledger = IdentityLedger::new();
        let map = ComponentTracker::new(&config, &solver)
            .track(&mask, Some(&prev), &flat_costs(40, 20), &mut ledger)
            .unwrap();
        assert_eq!(map.identities(), vec![1]);
        assert_eq!(map.get(21, 11), 1);
    }

    #[test]
    fn identity_split_out_of_a_merged_blob_stays_gone() {
        // A merged blob covers 1, 2 and a single pixel of 3. The strong edges
        // around that pixel hand it to 1, so 3 goes missing with no provisional
        // blob to reclaim and its footprint is already labelled.
        let (w, h) = (12, 5);
        let prev = Grid::from_fn(w, h, |x, y| match (x, y) {
            (2, 2) => 3,
            (0..6, _) => 1,
            _ => 2,
        });
        let mask = Grid::new(w, h, true);
        let costs = FrameCosts::new(Grid::new(w, h, -3_000), PairwiseField::uniform(w, h, 1_000)).unwrap();
        let config = config(3);
        assert!(config.carry_forward_missing);
        let solver = AlphaExpansion::default();
        let mut ledger = IdentityLedger::new();
        let map = ComponentTracker::new(&config, &solver)
            .track(&mask, Some(&prev), &costs, &mut ledger)
            .unwrap();
        assert_eq!(map.identities(), vec![1, 2]);
        assert_eq!(map.get(2, 2), 1);
        assert_eq!(ledger.highest_issued(), 3);
    }
}
