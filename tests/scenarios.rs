//! End-to-end tracking scenarios on synthetic masks and cost fields.
//!
//! These tests drive the public stages the way a sequence orchestrator would
//! and check the behaviours downstream fixtures depend on.

use plant_tracker::core_modules::blob::{Blob, Point};
use plant_tracker::core_modules::segmentation::SegmentationStage;
use plant_tracker::core_modules::split_resolver::SplitResolver;
use plant_tracker::core_modules::topology_repair::TopologyRepair;
use plant_tracker::core_modules::tracker::ComponentTracker;
use plant_tracker::{
    AlphaExpansion, Driver, FrameCosts, Grid, IdentityLedger, IdentityMap, Mask, PairwiseField, TrackerConfig,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn flat_costs(w: usize, h: usize, unary: i32) -> FrameCosts {
    FrameCosts::new(Grid::new(w, h, unary), PairwiseField::uniform(w, h, 100)).unwrap()
}

fn fill(mask: &mut Mask, x0: usize, y0: usize, w: usize, h: usize) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            mask.set(x, y, true);
        }
    }
}

/// Unary costs that mark the given rectangles as plant and everything else as soil.
fn rect_costs(w: usize, h: usize, rects: &[(usize, usize, usize, usize)]) -> FrameCosts {
    let unary = Grid::from_fn(w, h, |x, y| {
        let plant = rects
            .iter()
            .any(|&(x0, y0, rw, rh)| (x0..x0 + rw).contains(&x) && (y0..y0 + rh).contains(&y));
        if plant { -8_000 } else { 8_000 }
    });
    FrameCosts::new(unary, PairwiseField::uniform(w, h, 100)).unwrap()
}

// =============================================================================
// Scenario A: first frame discards small blobs
// =============================================================================

#[test]
fn test_first_frame_discards_blobs_smaller_than_ccnbd() {
    init_tracing();
    let mut mask = Grid::new(60, 30, false);
    fill(&mut mask, 0, 0, 5, 1);
    fill(&mut mask, 40, 20, 10, 5);

    let config = TrackerConfig::default();
    let solver = AlphaExpansion::default();
    let mut ledger = IdentityLedger::new();
    let map = ComponentTracker::new(&config, &solver)
        .track(&mask, None, &flat_costs(60, 30, -1_000), &mut ledger)
        .unwrap();

    assert_eq!(map.identities(), vec![1]);
    assert_eq!(map.histogram()[1], 50);
    assert_eq!(map.get(2, 0), 0);
    assert_eq!(ledger.highest_issued(), 1);
}

// =============================================================================
// Scenario B: a vanished identity reclaims a nearby unmatched blob
// =============================================================================

#[test]
fn test_vanished_identity_reclaims_nearby_blob() {
    init_tracing();
    // Identity 3: a 7x7 ring (40 px) centred on (row 3, col 3).
    let prev: IdentityMap = Grid::from_fn(20, 20, |x, y| {
        let in_square = x < 7 && y < 7;
        let in_hole = (2..5).contains(&x) && (2..5).contains(&y);
        if in_square && !in_hole { 3 } else { 0 }
    });
    assert_eq!(prev.histogram()[3], 40);

    // A 9x5 blob (45 px) centred on (row 10, col 4): squared distance 7² + 1² = 50.
    let mut mask = Grid::new(20, 20, false);
    fill(&mut mask, 0, 8, 9, 5);

    let config = TrackerConfig::default();
    let solver = AlphaExpansion::default();
    let mut ledger = IdentityLedger::new();
    let map = ComponentTracker::new(&config, &solver)
        .track(&mask, Some(&prev), &flat_costs(20, 20, -1_000), &mut ledger)
        .unwrap();

    assert_eq!(map.identities(), vec![3]);
    assert_eq!(map.histogram()[3], 45);
    assert_eq!(ledger.highest_issued(), 3);
}

// =============================================================================
// Scenario C: a merged blob is split among the identities it overlaps
// =============================================================================

#[test]
fn test_split_only_uses_candidate_identities() {
    init_tracing();
    let (w, h) = (16, 6);
    let prev: IdentityMap = Grid::from_fn(w, h, |x, _| match x {
        0..6 => 2,
        10..16 => 5,
        _ => 0,
    });
    let pixels: Vec<Point> = (0..h).flat_map(|y| (0..w).map(move |x| Point::new(x, y))).collect();
    let blob = Blob::from_pixels(0, pixels).unwrap();

    let config = TrackerConfig::default();
    let solver = AlphaExpansion::default();
    let assignment = SplitResolver::new(&config, &solver)
        .resolve(&blob, &prev, &[2, 5], &flat_costs(w, h, -3_000))
        .unwrap();

    assert_eq!(assignment.len(), w * h);
    assert!(assignment.iter().all(|(_, id)| [0, 2, 5].contains(id)));
    assert!(assignment.iter().any(|(_, id)| *id == 2));
    assert!(assignment.iter().any(|(_, id)| *id == 5));
}

#[test]
fn test_tracker_delegates_merged_blobs_to_split() {
    init_tracing();
    let (w, h) = (30, 10);
    let prev: IdentityMap = Grid::from_fn(w, h, |x, y| match (x, y) {
        (2..10, 2..8) => 2,
        (18..26, 2..8) => 5,
        _ => 0,
    });
    // The plants have grown into each other.
    let mut mask = Grid::new(w, h, false);
    fill(&mut mask, 2, 2, 24, 6);

    let config = TrackerConfig {
        ccnbd: 2,
        ..TrackerConfig::default()
    };
    let solver = AlphaExpansion::default();
    let mut ledger = IdentityLedger::new();
    let map = ComponentTracker::new(&config, &solver)
        .track(&mask, Some(&prev), &flat_costs(w, h, -3_000), &mut ledger)
        .unwrap();

    assert_eq!(map.identities(), vec![2, 5]);
    assert_eq!(map.get(3, 3), 2);
    assert_eq!(map.get(24, 6), 5);
    assert_eq!(ledger.highest_issued(), 5);
}

// =============================================================================
// Scenario D: an identity that cannot be joined keeps its largest fragment
// =============================================================================

#[test]
fn test_unjoinable_identity_keeps_largest_fragment() {
    init_tracing();
    let (w, h) = (30, 4);
    let mut map: IdentityMap = Grid::new(w, h, 0);
    for y in 0..h {
        for x in (0..2).chain(10..15).chain(25..28) {
            map.set(x, y, 6);
        }
    }
    let config = TrackerConfig {
        joinit: 1,
        ..TrackerConfig::default()
    };
    let solver = AlphaExpansion::default();
    let report = TopologyRepair::new(&config, &solver)
        .repair(&mut map, None, &flat_costs(w, h, 100_000))
        .unwrap();

    assert_eq!(report.fallback, vec![6]);
    assert!(report.joined.is_empty());
    assert_eq!(map.histogram()[6], 20);
    assert!((0..h).all(|y| map.get(0, y) == 0 && map.get(26, y) == 0));
    assert!((0..h).all(|y| (10..15).all(|x| map.get(x, y) == 6)));
}

// =============================================================================
// Properties over whole sequences
// =============================================================================

#[test]
fn test_identities_are_foreground_without_repair_or_carry_forward() {
    init_tracing();
    let config = TrackerConfig {
        ccnbd: 3,
        joinit: 0,
        carry_forward_missing: false,
        ..TrackerConfig::default()
    };
    let driver = Driver::new(config.clone()).unwrap();
    let solver = AlphaExpansion::default();
    let stage = SegmentationStage::new(&config, &solver);

    let frames = [
        rect_costs(40, 24, &[(2, 2, 6, 6), (20, 10, 8, 8)]),
        rect_costs(40, 24, &[(2, 2, 7, 7), (30, 2, 5, 5)]),
        rect_costs(40, 24, &[(3, 3, 7, 7), (30, 2, 6, 6), (12, 16, 6, 6)]),
    ];
    let mut ledger = IdentityLedger::new();
    let mut previous: Option<IdentityMap> = None;
    for costs in &frames {
        let mask = stage.segment(costs, previous.as_ref()).unwrap();
        let map = driver.track_frame(costs, previous.as_ref(), &mut ledger).unwrap();
        for (p, labelled) in map.foreground().iter_points() {
            if labelled {
                assert!(mask.at(p), "identity {} at {p:?} is not foreground", map.at(p));
            }
        }
        previous = Some(map);
    }
}

#[test]
fn test_identities_are_never_reused() {
    init_tracing();
    let config = TrackerConfig {
        ccnbd: 3,
        carry_forward_missing: false,
        ..TrackerConfig::default()
    };
    let driver = Driver::new(config).unwrap();

    // Plants appear, disappear, and reappear far from where they were.
    let frames = [
        rect_costs(60, 30, &[(2, 2, 6, 6), (40, 2, 6, 6)]),
        rect_costs(60, 30, &[(2, 2, 6, 6)]),
        rect_costs(60, 30, &[]),
        rect_costs(60, 30, &[(40, 20, 6, 6)]),
        rect_costs(60, 30, &[(40, 20, 7, 7), (2, 20, 5, 5)]),
    ];

    let mut ledger = IdentityLedger::new();
    let mut previous: Option<IdentityMap> = None;
    let mut seen: Vec<u32> = Vec::new();
    let mut highest = 0;
    for costs in &frames {
        let map = driver.track_frame(costs, previous.as_ref(), &mut ledger).unwrap();
        assert!(ledger.highest_issued() >= highest);
        highest = ledger.highest_issued();

        let carried: Vec<u32> = previous.as_ref().map(|p| p.identities()).unwrap_or_default();
        for id in map.identities() {
            if !carried.contains(&id) {
                assert!(!seen.contains(&id), "identity {id} was reissued");
            }
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        previous = Some(map);
    }

    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert_eq!(previous.unwrap().identities(), vec![3, 4]);
}
