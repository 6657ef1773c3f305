//! Contracts for the pipeline stages that sit after the spatial gate.
//!
//! Ground segmentation, clustering and color classification are pluggable:
//! a predictor only sees these traits. Implementations report failure with
//! any [`PercError`]; the predictor turns it into
//! [`PercError::StageFailure`] and drops the frame.

use perc_types::{ConeColor, PercError, Point3};

/// Output of a [`GroundSegmenter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    /// Points classified as non-ground.
    pub obstacles: Vec<Point3>,
    /// Optional side channel for visual debugging (e.g. the ground points),
    /// only filled when the segmenter was called with `debug = true`.
    pub debug_payload: Option<Vec<Point3>>,
}

/// Splits a gated point set into ground and obstacle points.
pub trait GroundSegmenter: Send {
    fn segment(&self, points: &[Point3], debug: bool) -> Result<Segmentation, PercError>;
}

/// Partitions obstacle points into candidate cones.
pub trait Clusterer: Send {
    fn cluster(&self, points: &[Point3]) -> Result<Vec<Vec<Point3>>, PercError>;
}

/// Assigns a color to one candidate cone.
pub trait ColorClassifier: Send {
    fn classify(&self, cluster: &[Point3]) -> Result<ConeColor, PercError>;
}

/// Classifier for LiDAR-only setups: every cone is [`ConeColor::Unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownColorClassifier;

impl ColorClassifier for UnknownColorClassifier {
    fn classify(&self, _cluster: &[Point3]) -> Result<ConeColor, PercError> {
        Ok(ConeColor::Unknown)
    }
}

/// Mean of `points`, or `None` when empty.
pub fn centroid(points: &[Point3]) -> Option<Point3> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Point3::zero(), |acc, p| acc.add(*p));
    Some(sum.scale(1.0 / points.len() as f64))
}
