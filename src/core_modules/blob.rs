// THEORY:
// The `blob` module holds the spatial vocabulary of the tracker: grid
// coordinates, inclusive bounding boxes, and the `Blob`, a connected group of
// foreground pixels found in a single frame.
//
// Key architectural principles:
// 1.  **Stateless Data Container**: A `Blob` is a snapshot. It carries no
//     identity and no memory of previous frames. Identity is decided later by
//     the `ComponentTracker`.
// 2.  **Pixel-Exact**: Unlike a detection box, a blob keeps every member
//     pixel. Identity overlap, splitting, and relabelling all work on exact
//     pixel sets.
// 3.  **Row-Major Centroid**: Centroids are `(row, column)` means. Distances
//     between centroids are compared squared, so the order of the pair is
//     irrelevant as long as it is consistent.

/// A 2D coordinate on the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// An inclusive rectangle, represented by its top-left and bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    /// The smallest box containing every point, or `None` for an empty set.
    pub fn enclosing(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox { min: first, max: first };
        for p in iter {
            bbox.min.x = bbox.min.x.min(p.x);
            bbox.min.y = bbox.min.y.min(p.y);
            bbox.max.x = bbox.max.x.max(p.x);
            bbox.max.y = bbox.max.y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> usize {
        self.max.x - self.min.x + 1
    }

    pub fn height(&self) -> usize {
        self.max.y - self.min.y + 1
    }

    /// Converts a frame coordinate into this box's local coordinate.
    pub fn to_local(&self, p: Point) -> Point {
        Point::new(p.x - self.min.x, p.y - self.min.y)
    }
}

/// A single connected group of foreground pixels detected in one frame.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Index of this blob within the current frame, in discovery order. Not persistent.
    pub id: usize,
    /// Every member pixel, in raster order.
    pub pixels: Vec<Point>,
    /// The rectangle enclosing all member pixels.
    pub bounding_box: BoundingBox,
    /// Mean `(row, column)` of the member pixels.
    pub centroid: (f64, f64),
}

impl Blob {
    /// Builds a blob from its pixels. Returns `None` when `pixels` is empty.
    pub fn from_pixels(id: usize, pixels: Vec<Point>) -> Option<Self> {
        let bounding_box = BoundingBox::enclosing(pixels.iter().copied())?;
        let n = pixels.len() as f64;
        let (sum_y, sum_x) = pixels
            .iter()
            .fold((0.0, 0.0), |(sy, sx), p| (sy + p.y as f64, sx + p.x as f64));
        Some(Self {
            id,
            pixels,
            bounding_box,
            centroid: (sum_y / n, sum_x / n),
        })
    }

    /// The area of the blob in pixels.
    pub fn size(&self) -> usize {
        self.pixels.len()
    }

    /// Squared Euclidean distance between this blob's centroid and `other`.
    pub fn squared_distance_to(&self, other: (f64, f64)) -> f64 {
        (self.centroid.0 - other.0).powi(2) + (self.centroid.1 - other.1).powi(2)
    }
}
