//! `perc-perception` – point-cloud building blocks of the cone pipeline.
//!
//! Turns a raw LiDAR frame into a vehicle-frame, gated, ground-free point
//! set and defines the contracts of the stages that turn it into cones.
//!
//! # Modules
//!
//! - [`transform`] – [`PoseTransformations`][transform::PoseTransformations]:
//!   static per-sensor rigid transforms into the vehicle-origin frame.
//! - [`filter`] – [`sanitize`][filter::sanitize],
//!   [`remap_axes`][filter::remap_axes] and the
//!   [`fov_range`][filter::fov_range] spatial gate.
//! - [`timer`] – [`Timer`][timer::Timer]: stack-disciplined latency spans.
//! - [`stages`] – [`GroundSegmenter`][stages::GroundSegmenter],
//!   [`Clusterer`][stages::Clusterer] and
//!   [`ColorClassifier`][stages::ColorClassifier] contracts.
//! - [`ground`], [`cluster`] – grid ground removal and octree-backed
//!   Euclidean clustering implementing those contracts.
//! - [`octree`] – [`Octree`][octree::Octree] radius queries.

pub mod cluster;
pub mod filter;
pub mod ground;
pub mod octree;
pub mod stages;
pub mod timer;
pub mod transform;

pub use cluster::{ClusterConfig, EuclideanClusterer};
pub use filter::{
    AxisRemap, FovRange, ZeroSentinel, fov_range, remap_axes, sanitize, to_vehicle_frame,
};
pub use ground::{GridGroundConfig, GridGroundSegmenter};
pub use stages::{
    Clusterer, ColorClassifier, GroundSegmenter, Segmentation, UnknownColorClassifier, centroid,
};
pub use timer::{Timer, TimingReport, TimingSpan};
pub use transform::{Direction, PoseTransformations, Quaternion, Transform3D};
