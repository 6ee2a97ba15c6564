// THEORY:
// Connected-component labelling and morphological dilation for binary masks.
//
// Two notions of adjacency are used by the tracker:
// - exact 4- or 8-connectivity, which decides whether an identity is "whole";
// - a dilation-widened adjacency, where two foreground pixels belong to the
//   same blob if they are within `radius` of each other in both axes.
//
// Labels are assigned in raster order of each component's first pixel. The
// tracker's provisional blob numbering, and therefore the order in which new
// identities are minted, depends on this ordering.

use crate::core_modules::blob::Point;
use crate::core_modules::grid::{Grid, Mask};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Pixel adjacency used for exact connectivity tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Horizontal and vertical neighbours only.
    #[default]
    Four,
    /// Horizontal, vertical, and diagonal neighbours.
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        const FOUR: [(isize, isize); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
        const EIGHT: [(isize, isize); 8] = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// A 2D label map from connected component analysis.
/// Label 0 is background; components are numbered 1..=count.
#[derive(Debug, Clone)]
pub struct ComponentLabels {
    pub labels: Grid<u32>,
    pub count: usize,
}

impl ComponentLabels {
    /// Pixel count per label, indexed by label (index 0 counts background).
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.count + 1];
        for &l in self.labels.data() {
            sizes[l as usize] += 1;
        }
        sizes
    }

    /// Member pixels per component, indexed by `label - 1`, each in raster order.
    pub fn pixels(&self) -> Vec<Vec<Point>> {
        let mut groups = vec![Vec::new(); self.count];
        for (p, l) in self.labels.iter_points() {
            if l > 0 {
                groups[l as usize - 1].push(p);
            }
        }
        groups
    }
}

/// Labels the connected components of `mask`.
pub fn label_components(mask: &Mask, connectivity: Connectivity) -> ComponentLabels {
    let (width, height) = (mask.width(), mask.height());
    let mut labels = Grid::new(width, height, 0u32);
    let mut count = 0u32;
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if !mask.data()[start] || labels.data()[start] != 0 {
            continue;
        }
        count += 1;
        labels.data_mut()[start] = count;
        queue.push_back(start);

        while let Some(index) = queue.pop_front() {
            let (x, y) = ((index % width) as isize, (index / width) as isize);
            for &(dx, dy) in connectivity.offsets() {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if mask.data()[n] && labels.data()[n] == 0 {
                    labels.data_mut()[n] = count;
                    queue.push_back(n);
                }
            }
        }
    }

    ComponentLabels {
        labels,
        count: count as usize,
    }
}

/// Number of connected components in `mask`.
pub fn count_components(mask: &Mask, connectivity: Connectivity) -> usize {
    label_components(mask, connectivity).count
}

/// True when the foreground of `mask` is exactly one connected region.
pub fn is_single_connected(mask: &Mask, connectivity: Connectivity) -> bool {
    count_components(mask, connectivity) == 1
}

/// Dilates a binary mask with a `(2 * radius + 1)` square structuring element.
///
/// Separable: a horizontal pass followed by a vertical pass, each using a
/// running count over the window so the cost is independent of `radius`.
pub fn dilate(mask: &Mask, radius: usize) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    let (width, height) = (mask.width(), mask.height());

    let horizontal = dilate_lines(mask, radius, width, height, |line, i| line * width + i);
    dilate_lines(&horizontal, radius, height, width, |line, i| i * width + line)
}

/// Dilates `lines` independent 1D lines of length `len`, where `at(line, i)`
/// gives the flat index of element `i` of `line`.
fn dilate_lines(
    mask: &Mask,
    radius: usize,
    len: usize,
    lines: usize,
    at: impl Fn(usize, usize) -> usize,
) -> Mask {
    let mut out = Grid::new(mask.width(), mask.height(), false);
    for line in 0..lines {
        // Running count of set cells in [i - radius, i + radius].
        let mut set = 0usize;
        for i in 0..radius.min(len) {
            set += mask.data()[at(line, i)] as usize;
        }
        for i in 0..len {
            let entering = i + radius;
            if entering < len {
                set += mask.data()[at(line, entering)] as usize;
            }
            if i > radius {
                set -= mask.data()[at(line, i - radius - 1)] as usize;
            }
            out.data_mut()[at(line, i)] = set > 0;
        }
    }
    out
}
