// THEORY:
// The `costs` module defines the numeric inputs that drive every energy
// minimisation in the tracker, and the provider that derives them from a raw
// frame.
//
// Key architectural principles:
// 1.  **Unary field**: one signed integer per pixel, the cost of calling that
//     pixel foreground. Lower means more plant-like. Background costs nothing,
//     so a negative value is a reward for foreground.
// 2.  **Pairwise field**: four directional edge-weight arrays. Each weight is
//     paid when the two pixels of that edge receive different labels; weights
//     are low across strong image gradients so label boundaries settle there.
// 3.  **Opaque to the core**: the tracking stages never look at colours. They
//     only see `FrameCosts`, so any `CostProvider` implementation can be
//     substituted.
// 4.  **Local windows**: `crop` cuts the unary and the four edge arrays to the
//     same bounding box, keeping the edge arrays one pixel narrower along their
//     direction exactly as in the full frame.

use crate::config::TrackerConfig;
use crate::core_modules::blob::BoundingBox;
use crate::core_modules::color::color;
use crate::core_modules::grid::Grid;
use crate::{Error, Result};
use image::RgbImage;

/// Four directional edge-weight arrays for an 8-neighbourhood grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseField {
    /// `(x, y)`–`(x, y + 1)`; shape `w x (h - 1)`.
    pub vertical: Grid<i32>,
    /// `(x, y)`–`(x + 1, y)`; shape `(w - 1) x h`.
    pub horizontal: Grid<i32>,
    /// `(x, y)`–`(x + 1, y + 1)`; shape `(w - 1) x (h - 1)`.
    pub diag_down_right: Grid<i32>,
    /// `(x + 1, y)`–`(x, y + 1)`; shape `(w - 1) x (h - 1)`.
    pub diag_down_left: Grid<i32>,
}

impl PairwiseField {
    /// A field with every edge weighted `weight`.
    pub fn uniform(width: usize, height: usize, weight: i32) -> Self {
        let w1 = width.saturating_sub(1);
        let h1 = height.saturating_sub(1);
        Self {
            vertical: Grid::new(width, h1, weight),
            horizontal: Grid::new(w1, height, weight),
            diag_down_right: Grid::new(w1, h1, weight),
            diag_down_left: Grid::new(w1, h1, weight),
        }
    }

    /// Checks that all four arrays fit a `width` x `height` pixel grid.
    pub fn validate(&self, width: usize, height: usize) -> Result<()> {
        let w1 = width.saturating_sub(1);
        let h1 = height.saturating_sub(1);
        self.vertical.expect_shape(width, h1, "vertical edge weights")?;
        self.horizontal.expect_shape(w1, height, "horizontal edge weights")?;
        self.diag_down_right.expect_shape(w1, h1, "down-right edge weights")?;
        self.diag_down_left.expect_shape(w1, h1, "down-left edge weights")?;
        Ok(())
    }

    /// Calls `f(p, q, weight)` for every edge, with `p` and `q` flat pixel indices
    /// of a `width`-wide grid.
    pub fn for_each_edge(&self, width: usize, mut f: impl FnMut(usize, usize, i32)) {
        for y in 0..self.vertical.height() {
            for x in 0..self.vertical.width() {
                f(y * width + x, (y + 1) * width + x, self.vertical.get(x, y));
            }
        }
        for y in 0..self.horizontal.height() {
            for x in 0..self.horizontal.width() {
                f(y * width + x, y * width + x + 1, self.horizontal.get(x, y));
            }
        }
        for y in 0..self.diag_down_right.height() {
            for x in 0..self.diag_down_right.width() {
                f(y * width + x, (y + 1) * width + x + 1, self.diag_down_right.get(x, y));
            }
        }
        for y in 0..self.diag_down_left.height() {
            for x in 0..self.diag_down_left.width() {
                f(y * width + x + 1, (y + 1) * width + x, self.diag_down_left.get(x, y));
            }
        }
    }

    /// The edge weights of the pixels inside `bbox`.
    pub fn crop(&self, bbox: &BoundingBox) -> Self {
        let (x0, y0) = (bbox.min.x, bbox.min.y);
        let (w, h) = (bbox.width(), bbox.height());
        Self {
            vertical: self.vertical.crop(x0, y0, w, h - 1),
            horizontal: self.horizontal.crop(x0, y0, w - 1, h),
            diag_down_right: self.diag_down_right.crop(x0, y0, w - 1, h - 1),
            diag_down_left: self.diag_down_left.crop(x0, y0, w - 1, h - 1),
        }
    }
}

/// Everything the tracking stages need to know about one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCosts {
    /// Per-pixel foreground cost; lower is more plant-like.
    pub unary: Grid<i32>,
    pub pairwise: PairwiseField,
}

impl FrameCosts {
    /// Validates that the pairwise arrays match the unary field's shape.
    pub fn new(unary: Grid<i32>, pairwise: PairwiseField) -> Result<Self> {
        pairwise.validate(unary.width(), unary.height())?;
        Ok(Self { unary, pairwise })
    }

    pub fn width(&self) -> usize {
        self.unary.width()
    }

    pub fn height(&self) -> usize {
        self.unary.height()
    }

    /// The unary and pairwise costs of the pixels inside `bbox`.
    pub fn crop(&self, bbox: &BoundingBox) -> Self {
        Self {
            unary: self.unary.crop_box(bbox),
            pairwise: self.pairwise.crop(bbox),
        }
    }
}

/// Turns a raw frame into unary and pairwise costs.
pub trait CostProvider {
    fn costs(&self, frame: &RgbImage) -> Result<FrameCosts>;
}

/// Greenness-based unary cost with Gaussian-derivative edge affinities.
#[derive(Debug, Clone)]
pub struct ChromaCostProvider {
    config: TrackerConfig,
}

impl ChromaCostProvider {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    /// Probability-like foreground score in `(0, 1)` from the Lab a* channel.
    fn foreground_likelihood(&self, rgb: [u8; 3]) -> f32 {
        let a = color::lab_a(rgb);
        let e = ((-a - self.config.grthresh) / self.config.grsensitivity).exp();
        if e.is_infinite() { 1.0 } else { e / (1.0 + e) }
    }

    fn unary(&self, frame: &RgbImage) -> Grid<i32> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let uwt = self.config.uwt as f32;
        Grid::from_fn(width, height, |x, y| {
            let p = self.foreground_likelihood(frame.get_pixel(x as u32, y as u32).0);
            ((0.5 - p) * uwt) as i32
        })
    }

    fn pairwise(&self, frame: &RgbImage) -> PairwiseField {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let fsz = self.config.fsz;
        let grey = Grid::from_fn(width, height, |x, y| color::grey(frame.get_pixel(x as u32, y as u32).0));

        // Symmetric padding of (fsz/2 - 1) before and fsz/2 after keeps the
        // 'valid' convolution output the size of the frame.
        let before = (fsz / 2).saturating_sub(1);
        let padded = Grid::from_fn(width + fsz - 1, height + fsz - 1, |x, y| {
            grey.get(reflect(x, before, width), reflect(y, before, height))
        });

        let (kx, ky) = derivative_kernels(fsz, self.config.fsgm);
        let dx = convolve_valid(&padded, &kx, fsz, width, height);
        let dy = convolve_valid(&padded, &ky, fsz, width, height);

        let squared = |f: &dyn Fn(f32, f32) -> f32| {
            Grid::from_fn(width, height, |x, y| f(dx.get(x, y), dy.get(x, y)))
        };
        let gx = squared(&|a, _| a * a);
        let gy = squared(&|_, b| b * b);
        let gdr = squared(&|a, b| (a + b) * (a + b));
        let gdl = squared(&|a, b| (a - b) * (a - b));

        let fsens = self.config.fsensitivity;
        let ewt = self.config.ewt as f32;
        let affinity = |g: &Grid<f32>, scale: f32| {
            let mean = g.data().iter().map(|&v| v as f64).sum::<f64>() / g.len().max(1) as f64;
            let mean = mean as f32;
            g.map(|v| {
                let a = if mean > f32::EPSILON { (-v / mean / fsens).exp() } else { 1.0 };
                (scale * a * ewt) as i32
            })
        };
        let ax = affinity(&gx, 1.0);
        let ay = affinity(&gy, 1.0);
        let adr = affinity(&gdr, 0.5);
        let adl = affinity(&gdl, 0.5);

        let w1 = width.saturating_sub(1);
        let h1 = height.saturating_sub(1);
        PairwiseField {
            vertical: ay.crop(0, 0, width, h1),
            horizontal: ax.crop(0, 0, w1, height),
            diag_down_right: adr.crop(0, 0, w1, h1),
            diag_down_left: adl.crop(1, 0, w1, h1),
        }
    }
}

impl CostProvider for ChromaCostProvider {
    fn costs(&self, frame: &RgbImage) -> Result<FrameCosts> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(Error::ShapeMismatch {
                expected: "a non-empty frame".to_string(),
                got: format!("{}x{}", frame.width(), frame.height()),
            });
        }
        FrameCosts::new(self.unary(frame), self.pairwise(frame))
    }
}

/// Maps a padded coordinate back into `[0, len)` with symmetric (edge-repeating) reflection.
fn reflect(padded: usize, before: usize, len: usize) -> usize {
    let period = 2 * len as isize;
    let mut i = (padded as isize - before as isize).rem_euclid(period);
    if i >= len as isize {
        i = period - 1 - i;
    }
    i as usize
}

/// Horizontal and vertical Gaussian-derivative kernels of size `fsz`.
fn derivative_kernels(fsz: usize, sigma2: f32) -> (Grid<f32>, Grid<f32>) {
    let c = (fsz as f32 - 1.0) / 2.0;
    let kx = Grid::from_fn(fsz, fsz, |x, y| {
        let (u, v) = (x as f32 - c, y as f32 - c);
        u * (-(u * u + v * v) / 2.0 / sigma2).exp()
    });
    let ky = Grid::from_fn(fsz, fsz, |x, y| kx.get(y, x));
    (kx, ky)
}

/// True 2D convolution (kernel flipped), keeping only fully overlapping positions.
fn convolve_valid(img: &Grid<f32>, kernel: &Grid<f32>, fsz: usize, width: usize, height: usize) -> Grid<f32> {
    Grid::from_fn(width, height, |x, y| {
        let mut acc = 0.0f32;
        for m in 0..fsz {
            for n in 0..fsz {
                acc += img.get(x + n, y + m) * kernel.get(fsz - 1 - n, fsz - 1 - m);
            }
        }
        acc
    })
}
