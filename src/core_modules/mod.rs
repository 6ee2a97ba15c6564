// The building blocks of the tracker, from raw rasters up to identity maps.

pub mod blob;
pub mod blob_detector;
pub mod color;
pub mod convex_hull;
pub mod costs;
pub mod energy;
pub mod grid;
pub mod labeling;
pub mod max_flow;
pub mod segmentation;
pub mod split_resolver;
pub mod topology_repair;
pub mod tracker;
