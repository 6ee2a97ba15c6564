// THEORY:
// The `Grid` is the single raster container used by every stage of the tracker.
// Unary costs, pairwise edge weights, binary masks, and identity maps are all
// row-major 2D arrays of the same spatial shape (or one pixel narrower, in the
// case of edge arrays), so they share one generic type instead of a zoo of
// ad-hoc `Vec<Vec<_>>` layouts.
//
// Key architectural principles:
// 1.  **Flat Storage**: Values live in one `Vec<T>` indexed by `y * width + x`.
//     This keeps crops and full-frame scans cache friendly.
// 2.  **Shape Safety**: Constructors that accept external data validate the
//     length and report a `ShapeMismatch` instead of panicking later.
// 3.  **Cropping**: Every stage after segmentation works on bounding boxes of a
//     single blob or identity. `crop` and `paste` are the only way data moves
//     between a frame-sized grid and a local window.

use crate::core_modules::blob::{BoundingBox, Point};
use crate::{Error, Result};

/// A dense, row-major 2D array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

/// A per-pixel identity assignment. 0 is background.
pub type IdentityMap = Grid<u32>;

/// A binary foreground mask.
pub type Mask = Grid<bool>;

impl<T: Copy> Grid<T> {
    /// Creates a grid with every cell set to `fill`.
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    /// Wraps existing row-major data. Fails if the length does not match the shape.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::ShapeMismatch {
                expected: format!("{} cells ({width}x{height})", width * height),
                got: format!("{} cells", data.len()),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Builds a grid by evaluating `f(x, y)` for every cell.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let index = y * self.width + x;
        self.data[index] = value;
    }

    #[inline]
    pub fn at(&self, point: Point) -> T {
        self.get(point.x, point.y)
    }

    /// Fails with `ShapeMismatch` unless the grid is exactly `width` x `height`.
    pub fn expect_shape(&self, width: usize, height: usize, what: &str) -> Result<()> {
        if self.width != width || self.height != height {
            return Err(Error::ShapeMismatch {
                expected: format!("{what} of {width}x{height}"),
                got: format!("{}x{}", self.width, self.height),
            });
        }
        Ok(())
    }

    /// Copies out the `width` x `height` window whose top-left corner is `(x0, y0)`.
    /// The window must lie within the grid.
    pub fn crop(&self, x0: usize, y0: usize, width: usize, height: usize) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in y0..y0 + height {
            let start = y * self.width + x0;
            data.extend_from_slice(&self.data[start..start + width]);
        }
        Self { width, height, data }
    }

    /// Copies out the cells covered by an inclusive bounding box.
    pub fn crop_box(&self, bbox: &BoundingBox) -> Self {
        self.crop(bbox.min.x, bbox.min.y, bbox.width(), bbox.height())
    }

    /// Writes `window` back into this grid with its top-left corner at `(x0, y0)`.
    pub fn paste(&mut self, window: &Grid<T>, x0: usize, y0: usize) {
        for y in 0..window.height {
            let src = y * window.width;
            let dst = (y0 + y) * self.width + x0;
            self.data[dst..dst + window.width].copy_from_slice(&window.data[src..src + window.width]);
        }
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Iterates `(Point, value)` in raster order.
    pub fn iter_points(&self) -> impl Iterator<Item = (Point, T)> + '_ {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (Point { x: i % width, y: i / width }, v))
    }
}

impl Grid<bool> {
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn any(&self) -> bool {
        self.data.iter().any(|&v| v)
    }
}

impl Grid<u32> {
    /// Largest identity present, or 0 for an empty map.
    pub fn max_identity(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Distinct positive identities in ascending order.
    pub fn identities(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.data.iter().copied().filter(|&v| v > 0).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Number of pixels carrying each value, indexed by value.
    pub fn histogram(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.max_identity() as usize + 1];
        for &v in &self.data {
            counts[v as usize] += 1;
        }
        counts
    }

    /// The mask of pixels equal to `identity`.
    pub fn mask_of(&self, identity: u32) -> Mask {
        self.map(|v| v == identity)
    }

    /// Pixels whose value is positive.
    pub fn foreground(&self) -> Mask {
        self.map(|v| v > 0)
    }

    /// The tight bounding box of every pixel equal to `identity`.
    pub fn bounding_box_of(&self, identity: u32) -> Option<BoundingBox> {
        BoundingBox::enclosing(
            self.iter_points()
                .filter(|&(_, v)| v == identity)
                .map(|(p, _)| p),
        )
    }

    /// Mean `(row, column)` of the pixels equal to `identity`.
    pub fn centroid_of(&self, identity: u32) -> Option<(f64, f64)> {
        let (mut sum_y, mut sum_x, mut n) = (0.0, 0.0, 0usize);
        for (p, v) in self.iter_points() {
            if v == identity {
                sum_y += p.y as f64;
                sum_x += p.x as f64;
                n += 1;
            }
        }
        (n > 0).then(|| (sum_y / n as f64, sum_x / n as f64))
    }
}
