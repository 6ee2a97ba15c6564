// THEORY:
// The `BlobDetector` is the engine of the spatial grouping layer. It turns the
// binary plant mask of one frame into a list of `Blob`s, the candidate plants
// that the `ComponentTracker` will try to match to known identities.
//
// Leaves of a single plant are often separated by a thin line of soil or a
// shadow, so plain connected components would shatter one plant into many.
// The detector therefore groups pixels through a widened adjacency:
// 1.  **Bridging**: The mask is dilated by a square of radius `ccnbd`, which
//     fuses any foreground pixels closer than `ccnbd` in both axes.
// 2.  **Labelling**: Connected components of the dilated mask are found in
//     raster order.
// 3.  **Restriction**: Each component is cut back to the true foreground
//     pixels it contains. The dilation decides grouping only; it never adds
//     pixels to a blob.
// 4.  **Stateless Utility**: Like the rest of the spatial layer, the detector
//     has no memory of previous frames. Blob ids are per-frame indices.

use crate::core_modules::blob::{Blob, Point};
use crate::core_modules::grid::Mask;
use crate::core_modules::labeling::{self, Connectivity};

pub mod blob_detector {
    use super::*; // Make items from the parent module available.

    /// Finds every group of foreground pixels that lie within `ccnbd` of each other.
    pub fn find_blobs(mask: &Mask, ccnbd: usize, connectivity: Connectivity) -> Vec<Blob> {
        let dilated = labeling::dilate(mask, ccnbd);
        let components = labeling::label_components(&dilated, connectivity);

        let mut groups: Vec<Vec<Point>> = vec![Vec::new(); components.count];
        for (p, label) in components.labels.iter_points() {
            if label > 0 && mask.at(p) {
                groups[label as usize - 1].push(p);
            }
        }

        groups
            .into_iter()
            .filter_map(|pixels| {
                // Every dilated component contains at least one seed pixel.
                Blob::from_pixels(0, pixels)
            })
            .enumerate()
            .map(|(id, mut blob)| {
                blob.id = id;
                blob
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::find_blobs;
    use super::*;
    use crate::core_modules::grid::Grid;

    #[test]
    fn nearby_pieces_form_one_blob() {
        let mut mask = Grid::new(20, 5, false);
        for x in 0..4 {
            mask.set(x, 2, true);
        }
        for x in 6..9 {
            mask.set(x, 2, true);
        }
        for x in 16..20 {
            mask.set(x, 2, true);
        }
        let blobs = find_blobs(&mask, 2, Connectivity::Four);
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].size(), 7);
        assert_eq!(blobs[1].size(), 4);
        assert_eq!(blobs[1].id, 1);
    }

    #[test]
    fn blobs_never_include_dilated_pixels() {
        let mut mask = Grid::new(9, 9, false);
        mask.set(4, 4, true);
        let blobs = find_blobs(&mask, 3, Connectivity::Four);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].pixels, vec![Point::new(4, 4)]);
        assert_eq!(blobs[0].centroid, (4.0, 4.0));
    }

    #[test]
    fn empty_mask_has_no_blobs() {
        let mask = Grid::new(10, 10, false);
        assert!(find_blobs(&mask, 10, Connectivity::Four).is_empty());
    }
}
