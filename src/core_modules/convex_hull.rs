// THEORY:
// Convex hull rasterisation, used by topology repair to decide which
// unassigned pixels may be recruited to bridge the fragments of one identity.
//
// The hull is taken over the *corners* of every foreground pixel rather than
// their centres, and a pixel belongs to the hull image when its centre lies
// inside or on the hull polygon. This makes the hull of a one-pixel-wide
// line a proper rectangle instead of a degenerate segment.

use crate::core_modules::grid::{Grid, Mask};

const EDGE_TOLERANCE: f64 = 1e-9;

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Convex hull (Andrew's monotone chain), counter-clockwise, no repeated endpoint.
pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<(f64, f64)> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Pixels whose centres fall inside the convex hull of the foreground of `mask`.
pub fn convex_hull_mask(mask: &Mask) -> Mask {
    let (width, height) = (mask.width(), mask.height());

    // Only the outermost pixel of each row can contribute hull vertices.
    let mut corners = Vec::new();
    for y in 0..height {
        let row = &mask.data()[y * width..(y + 1) * width];
        let first = row.iter().position(|&v| v);
        let last = row.iter().rposition(|&v| v);
        if let (Some(first), Some(last)) = (first, last) {
            for x in [first, last] {
                let (cx, cy) = (x as f64, y as f64);
                corners.push((cx - 0.5, cy - 0.5));
                corners.push((cx + 0.5, cy - 0.5));
                corners.push((cx - 0.5, cy + 0.5));
                corners.push((cx + 0.5, cy + 0.5));
            }
        }
    }
    if corners.is_empty() {
        return Grid::new(width, height, false);
    }

    let hull = convex_hull(&corners);
    Grid::from_fn(width, height, |x, y| {
        let p = (x as f64, y as f64);
        (0..hull.len()).all(|i| cross(hull[i], hull[(i + 1) % hull.len()], p) >= -EDGE_TOLERANCE)
    })
}
