// THEORY:
// `TrackerConfig` gathers every tunable of the tracker in one serialisable
// struct. The field names match the keys of the JSON option files used with
// existing plant datasets, and every field has a default, so a partial file
// only overrides what it names.

use crate::core_modules::labeling::Connectivity;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Configuration for segmentation, cost extraction, and identity tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Negative of the Lab a* value at which a pixel is equally likely plant or soil.
    pub grthresh: f32,
    /// Controls how fast the unary likelihood saturates around `grthresh`.
    pub grsensitivity: f32,
    /// Size of the square Gaussian-derivative filter, in pixels.
    pub fsz: usize,
    /// Variance (sigma squared) of the derivative filter's Gaussian.
    pub fsgm: f32,
    /// Controls how fast edge affinity falls off with gradient magnitude.
    pub fsensitivity: f32,
    /// Relative weight of the unary cost.
    pub uwt: i32,
    /// Relative weight of the spatial edge costs.
    pub ewt: i32,
    /// Weight of the temporal prior towards last frame's foreground.
    pub zwt: i32,
    /// Foreground pixels closer than this (per axis) join one blob; also the minimum blob size.
    pub ccnbd: usize,
    /// Maximum join iterations per fragmented identity; 0 disables topology repair.
    pub joinit: usize,
    /// Amount added to the hull candidates' foreground reward each join iteration.
    pub joininc: i32,
    /// Adjacency used when testing whether an identity is one connected region.
    pub connectivity: Connectivity,
    /// Restore a vanished identity on its previous footprint when nothing else claims it.
    pub carry_forward_missing: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            grthresh: 8.0,
            grsensitivity: 4.0,
            fsz: 8,
            fsgm: 2.0,
            fsensitivity: 4.0,
            uwt: 10_000,
            ewt: 5_000,
            zwt: 2_500,
            ccnbd: 10,
            joinit: 50,
            joininc: 100,
            connectivity: Connectivity::Four,
            carry_forward_missing: true,
        }
    }
}

impl TrackerConfig {
    /// Parses a JSON option file. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON option file from any reader.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make the cost model or the tracker meaningless.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("grsensitivity", self.grsensitivity),
            ("fsgm", self.fsgm),
            ("fsensitivity", self.fsensitivity),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(Error::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.grthresh.is_finite() {
            return Err(Error::InvalidConfig(format!("grthresh must be finite, got {}", self.grthresh)));
        }
        let non_negative = [
            ("uwt", self.uwt),
            ("ewt", self.ewt),
            ("zwt", self.zwt),
            ("joininc", self.joininc),
        ];
        for (name, value) in non_negative {
            if value < 0 {
                return Err(Error::InvalidConfig(format!("{name} must be non-negative, got {value}")));
            }
        }
        // Costs are i32; the deepest hull reward plus the fixed weights must fit.
        let worst = self.joinit as i128 * self.joininc as i128 + self.uwt as i128 + self.zwt as i128;
        if worst > i32::MAX as i128 {
            return Err(Error::InvalidConfig(format!(
                "joinit * joininc + uwt + zwt must not exceed {}, got {worst}",
                i32::MAX
            )));
        }
        if self.fsz < 2 {
            return Err(Error::InvalidConfig(format!("fsz must be at least 2, got {}", self.fsz)));
        }
        Ok(())
    }
}
