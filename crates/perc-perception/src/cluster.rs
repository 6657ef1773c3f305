//! Euclidean clustering of obstacle points.
//!
//! Region growing over an [`Octree`]: two points belong to the same cluster
//! when a chain of neighbours, each within `tolerance` of the next, connects
//! them. Clusters outside `[min_points, max_points]` are discarded as noise
//! or as objects too large to be a cone.

use std::collections::VecDeque;

use perc_types::{PercError, Point3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::octree::Octree;
use crate::stages::Clusterer;

const OCTREE_LEAF_CAPACITY: usize = 16;

/// Tuning for [`EuclideanClusterer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Neighbour distance (metres).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_min_points")]
    pub min_points: usize,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

fn default_tolerance() -> f64 {
    0.3
}
fn default_min_points() -> usize {
    3
}
fn default_max_points() -> usize {
    400
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            min_points: default_min_points(),
            max_points: default_max_points(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EuclideanClusterer {
    config: ClusterConfig,
}

impl EuclideanClusterer {
    /// # Errors
    ///
    /// [`PercError::Validation`] for a non-positive tolerance, a zero
    /// `min_points`, or `min_points > max_points`.
    pub fn new(config: ClusterConfig) -> Result<Self, PercError> {
        if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
            return Err(PercError::Validation(format!(
                "cluster tolerance must be positive, got {}",
                config.tolerance
            )));
        }
        if config.min_points == 0 || config.min_points > config.max_points {
            return Err(PercError::Validation(format!(
                "cluster size bounds [{}, {}] are invalid",
                config.min_points, config.max_points
            )));
        }
        Ok(Self { config })
    }
}

impl Clusterer for EuclideanClusterer {
    fn cluster(&self, points: &[Point3]) -> Result<Vec<Vec<Point3>>, PercError> {
        let tree = Octree::build(points, OCTREE_LEAF_CAPACITY);
        let mut visited = vec![false; points.len()];
        let mut clusters = Vec::new();
        let mut queue = VecDeque::new();

        for seed in 0..points.len() {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;
            queue.push_back(seed);
            let mut members = Vec::new();

            while let Some(i) = queue.pop_front() {
                members.push(points[i]);
                for n in tree.query_radius(points[i], self.config.tolerance) {
                    if !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }

            if (self.config.min_points..=self.config.max_points).contains(&members.len()) {
                clusters.push(members);
            }
        }

        debug!(input = points.len(), clusters = clusters.len(), "clustering");
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(cx: f64, cy: f64, n: usize) -> Vec<Point3> {
        (0..n)
            .map(|i| Point3::new(cx + 0.05 * (i % 3) as f64, cy + 0.05 * (i / 3) as f64, 0.1))
            .collect()
    }

    #[test]
    fn rejects_bad_config() {
        let bad = |tolerance, min_points, max_points| {
            EuclideanClusterer::new(ClusterConfig {
                tolerance,
                min_points,
                max_points,
            })
            .is_err()
        };
        assert!(bad(0.0, 3, 10));
        assert!(bad(0.3, 0, 10));
        assert!(bad(0.3, 11, 10));
    }

    #[test]
    fn separates_distant_blobs() {
        let mut pts = blob(4.0, 1.5, 6);
        pts.extend(blob(4.0, -1.5, 6));
        pts.extend(blob(9.0, 1.6, 5));

        let clusterer = EuclideanClusterer::new(ClusterConfig::default()).unwrap();
        let clusters = clusterer.cluster(&pts).unwrap();
        let mut sizes: Vec<usize> = clusters.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 6, 6]);
    }

    #[test]
    fn drops_clusters_outside_size_bounds() {
        let mut pts = blob(4.0, 1.5, 6);
        pts.push(Point3::new(20.0, 0.0, 0.1)); // single stray return
        pts.extend(blob(10.0, -3.0, 30)); // wall-sized blob

        let clusterer = EuclideanClusterer::new(ClusterConfig {
            tolerance: 0.3,
            min_points: 3,
            max_points: 20,
        })
        .unwrap();
        let clusters = clusterer.cluster(&pts).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 6);
    }

    #[test]
    fn chains_through_neighbours() {
        // Consecutive points 0.25 m apart form one cluster even though the
        // ends are 1 m apart.
        let pts: Vec<Point3> = (0..5).map(|i| Point3::new(i as f64 * 0.25, 0.0, 0.0)).collect();
        let clusterer = EuclideanClusterer::new(ClusterConfig::default()).unwrap();
        let clusters = clusterer.cluster(&pts).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 5);
    }

    #[test]
    fn empty_input_has_no_clusters() {
        let clusterer = EuclideanClusterer::new(ClusterConfig::default()).unwrap();
        assert!(clusterer.cluster(&[]).unwrap().is_empty());
    }
}
