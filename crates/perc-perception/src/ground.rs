//! Grid-based ground removal.
//!
//! The gated cloud is binned into square XY cells. The lowest return in a
//! cell is taken as the local ground height; anything more than
//! `height_threshold` above it is an obstacle. Cheap and good enough on a
//! flat track; swap in a plane-fitting segmenter for banked surfaces.

use std::collections::HashMap;

use perc_types::{PercError, Point3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stages::{GroundSegmenter, Segmentation};

/// Tuning for [`GridGroundSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGroundConfig {
    /// Cell edge length (metres).
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    /// Minimum height above the cell floor for an obstacle point (metres).
    #[serde(default = "default_height_threshold")]
    pub height_threshold: f64,
}

fn default_cell_size() -> f64 {
    0.5
}
fn default_height_threshold() -> f64 {
    0.05
}

impl Default for GridGroundConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            height_threshold: default_height_threshold(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridGroundSegmenter {
    config: GridGroundConfig,
}

impl GridGroundSegmenter {
    /// # Errors
    ///
    /// [`PercError::Validation`] for a non-positive cell size or a negative
    /// height threshold.
    pub fn new(config: GridGroundConfig) -> Result<Self, PercError> {
        if !config.cell_size.is_finite() || config.cell_size <= 0.0 {
            return Err(PercError::Validation(format!(
                "ground cell size must be positive, got {}",
                config.cell_size
            )));
        }
        if config.height_threshold.is_nan() || config.height_threshold < 0.0 {
            return Err(PercError::Validation(format!(
                "ground height threshold must be non-negative, got {}",
                config.height_threshold
            )));
        }
        Ok(Self { config })
    }

    fn cell(&self, p: Point3) -> (i64, i64) {
        (
            (p.x / self.config.cell_size).floor() as i64,
            (p.y / self.config.cell_size).floor() as i64,
        )
    }
}

impl GroundSegmenter for GridGroundSegmenter {
    fn segment(&self, points: &[Point3], debug: bool) -> Result<Segmentation, PercError> {
        let mut floor: HashMap<(i64, i64), f64> = HashMap::new();
        for p in points {
            floor
                .entry(self.cell(*p))
                .and_modify(|z| *z = z.min(p.z))
                .or_insert(p.z);
        }

        let mut obstacles = Vec::with_capacity(points.len() / 4);
        let mut ground = debug.then(Vec::new);
        for p in points {
            let base = floor.get(&self.cell(*p)).copied().unwrap_or(p.z);
            if p.z - base > self.config.height_threshold {
                obstacles.push(*p);
            } else if let Some(g) = ground.as_mut() {
                g.push(*p);
            }
        }

        debug!(
            cells = floor.len(),
            input = points.len(),
            obstacles = obstacles.len(),
            "ground removal"
        );
        Ok(Segmentation {
            obstacles,
            debug_payload: ground,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_config() {
        assert!(GridGroundSegmenter::new(GridGroundConfig {
            cell_size: 0.0,
            height_threshold: 0.05
        })
        .is_err());
        assert!(GridGroundSegmenter::new(GridGroundConfig {
            cell_size: 0.5,
            height_threshold: -1.0
        })
        .is_err());
    }

    #[test]
    fn keeps_points_above_cell_floor() {
        let seg = GridGroundSegmenter::new(GridGroundConfig::default()).unwrap();
        let pts = [
            Point3::new(5.1, 1.1, -0.30), // ground
            Point3::new(5.2, 1.2, -0.29), // ground, within threshold
            Point3::new(5.2, 1.1, 0.00),  // cone body
            Point3::new(5.15, 1.15, 0.15), // cone tip
            Point3::new(8.1, -2.1, -0.31), // lone ground return
        ];
        let out = seg.segment(&pts, false).unwrap();
        assert_eq!(out.obstacles, vec![pts[2], pts[3]]);
        assert!(out.debug_payload.is_none());
    }

    #[test]
    fn debug_payload_holds_ground_points() {
        let seg = GridGroundSegmenter::new(GridGroundConfig::default()).unwrap();
        let pts = [Point3::new(1.1, 1.1, -0.3), Point3::new(1.2, 1.2, 0.1)];
        let out = seg.segment(&pts, true).unwrap();
        assert_eq!(out.obstacles, vec![pts[1]]);
        assert_eq!(out.debug_payload, Some(vec![pts[0]]));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let seg = GridGroundSegmenter::new(GridGroundConfig::default()).unwrap();
        let out = seg.segment(&[], true).unwrap();
        assert!(out.obstacles.is_empty());
        assert_eq!(out.debug_payload, Some(Vec::new()));
    }
}
