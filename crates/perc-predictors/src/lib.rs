//! `perc-predictors` – frame-to-cones predictors.
//!
//! # Modules
//!
//! - [`interface`] – the [`Predictor`] trait and its [`Prediction`] output.
//! - [`lidar`] – [`LidarPredictor`]: sanitize, transform, gate, segment,
//!   cluster and color one LiDAR frame.
//! - [`profiler`] – tracing-layer profiling session used by
//!   [`Predictor::profile_predict`].
//! - [`visualizer`] – [`Visualizer`] strategies behind
//!   [`Predictor::display`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use perc_perception::{ClusterConfig, GridGroundConfig, PoseTransformations, Transform3D};
//! use perc_predictors::{LidarPredictor, LidarPredictorConfig, Predictor, Stages};
//! use perc_predictors::visualizer::{self, VisualizerKind};
//! use perc_types::{DataBundle, DataType, Frame};
//!
//! let poses = Arc::new(PoseTransformations::new().with_pose("lidar", Transform3D::identity()));
//! let stages = Stages::reference(GridGroundConfig::default(), ClusterConfig::default()).unwrap();
//! let (vis, _) = visualizer::build(VisualizerKind::None);
//! let mut predictor =
//!     LidarPredictor::new(LidarPredictorConfig::default(), poses, stages, vis).unwrap();
//!
//! let frame = Frame::from_rows(&[[0.0, 5.0, -0.3]]).unwrap();
//! let bundle = DataBundle::new().with(DataType::HesaiPointcloud, frame);
//! let prediction = predictor.predict(&bundle).unwrap();
//! assert!(prediction.cones.is_empty());
//! ```

pub mod interface;
pub mod lidar;
pub mod profiler;
pub mod visualizer;

pub use interface::{Prediction, Predictor};
pub use lidar::{LidarPredictor, LidarPredictorConfig, Stages};
pub use profiler::{ProfileReport, Profiled, SpanProfile, profile};
pub use visualizer::{Visualizer, VisualizerKind};
