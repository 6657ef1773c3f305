//! LiDAR-only cone predictor.
//!
//! One call to [`LidarPredictor::predict`] runs, in order:
//!
//! 1. `init-process`: sanitize the `hesai_pointcloud` frame, remap it into
//!    (forward, left, up) and move it to the vehicle origin.
//! 2. `filter`: the [`FovRange`] gate (`fov-range`) followed by ground
//!    removal (`ground-removal`).
//! 3. `clustering`: partition obstacle points into candidate cones.
//! 4. `coloring`: classify each candidate and place it at its centroid.
//!
//! Every step is a [`Timer`] span and a tracing span labelled as above, so
//! the same names appear in the timing report and in a profile.

use std::sync::Arc;

use perc_perception::{
    AxisRemap, ClusterConfig, Clusterer, ColorClassifier, EuclideanClusterer, FovRange,
    GridGroundConfig, GridGroundSegmenter, GroundSegmenter, PoseTransformations, Timer,
    UnknownColorClassifier, ZeroSentinel, centroid, fov_range, to_vehicle_frame,
};
use perc_types::{Cone, Cones, DataBundle, DataType, PercError, Point3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::interface::{Prediction, Predictor};
use crate::visualizer::Visualizer;

/// Sensor name the LiDAR pose is registered under by default.
pub const DEFAULT_SENSOR: &str = "lidar";
/// Outer gate radius used when none is configured (metres).
pub const DEFAULT_MAX_RADIUS: f64 = 20.0;

const STAGE_SPAN: &str = "stage";

/// Static configuration of a [`LidarPredictor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LidarPredictorConfig {
    /// Pose key of the LiDAR in [`PoseTransformations`].
    #[serde(default = "default_sensor")]
    pub sensor: String,
    #[serde(default)]
    pub zero_sentinel: ZeroSentinel,
    /// Native axis convention of the sensor.
    #[serde(default)]
    pub axis_remap: AxisRemap,
    #[serde(default = "default_gate")]
    pub gate: FovRange,
    /// Collect per-stage timings and return them with each prediction.
    #[serde(default)]
    pub debug_time: bool,
    /// Ask the ground segmenter for its debug payload.
    #[serde(default)]
    pub debug_ground: bool,
}

fn default_sensor() -> String {
    DEFAULT_SENSOR.to_string()
}

fn default_gate() -> FovRange {
    FovRange::new(180.0, 0.0, DEFAULT_MAX_RADIUS)
}

impl Default for LidarPredictorConfig {
    fn default() -> Self {
        Self {
            sensor: default_sensor(),
            zero_sentinel: ZeroSentinel::default(),
            axis_remap: AxisRemap::default(),
            gate: default_gate(),
            debug_time: false,
            debug_ground: false,
        }
    }
}

/// The pluggable stages after the spatial gate.
pub struct Stages {
    pub ground: Box<dyn GroundSegmenter>,
    pub clusterer: Box<dyn Clusterer>,
    pub classifier: Box<dyn ColorClassifier>,
}

impl Stages {
    /// Grid ground removal, Euclidean clustering and no color.
    ///
    /// # Errors
    ///
    /// [`PercError::Validation`] when either config is out of range.
    pub fn reference(ground: GridGroundConfig, cluster: ClusterConfig) -> Result<Self, PercError> {
        Ok(Self {
            ground: Box::new(GridGroundSegmenter::new(ground)?),
            clusterer: Box::new(EuclideanClusterer::new(cluster)?),
            classifier: Box::new(UnknownColorClassifier),
        })
    }
}

/// What [`Predictor::display`] shows: the clustered points and the cones of
/// the last successful call.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    points: Vec<Point3>,
    cones: Cones,
}

pub struct LidarPredictor {
    config: LidarPredictorConfig,
    poses: Arc<PoseTransformations>,
    timer: Timer,
    stages: Stages,
    visualizer: Box<dyn Visualizer>,
    last: Option<Snapshot>,
}

impl std::fmt::Debug for LidarPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LidarPredictor")
            .field("config", &self.config)
            .field("has_snapshot", &self.last.is_some())
            .finish_non_exhaustive()
    }
}

impl LidarPredictor {
    /// # Errors
    ///
    /// - [`PercError::Validation`] for invalid gate parameters.
    /// - [`PercError::UnknownSensor`] when `poses` has no entry for
    ///   `config.sensor`.
    pub fn new(
        config: LidarPredictorConfig,
        poses: Arc<PoseTransformations>,
        stages: Stages,
        visualizer: Box<dyn Visualizer>,
    ) -> Result<Self, PercError> {
        config.gate.validate()?;
        poses.pose(&config.sensor)?;
        Ok(Self {
            timer: Timer::new(config.debug_time),
            config,
            poses,
            stages,
            visualizer,
            last: None,
        })
    }

    pub fn config(&self) -> &LidarPredictorConfig {
        &self.config
    }
}

/// Run `f` as one timed, traced step.
fn timed<T>(timer: &mut Timer, label: &'static str, f: impl FnOnce() -> T) -> T {
    timer.start(label);
    let out = info_span!(STAGE_SPAN, stage = label).in_scope(f);
    timer.end(label);
    out
}

/// Wrap a collaborator error as a failure of `stage`.
fn in_stage(stage: &'static str) -> impl FnOnce(PercError) -> PercError {
    move |e| match e {
        e @ PercError::StageFailure { .. } => e,
        other => PercError::stage(stage, other.to_string()),
    }
}

impl Predictor for LidarPredictor {
    fn name(&self) -> &str {
        "lidar"
    }

    fn required_data(&self) -> Vec<DataType> {
        vec![DataType::HesaiPointcloud]
    }

    fn predict(&mut self, data: &DataBundle) -> Result<Prediction, PercError> {
        data.require(&self.required_data())?;
        let frame = data.get(DataType::HesaiPointcloud)?;

        self.timer.reset();
        self.timer.start("predict");
        let predict_span = info_span!("predict", predictor = self.name()).entered();

        let config = &self.config;
        let poses = &self.poses;
        let points = timed(&mut self.timer, "init-process", || {
            to_vehicle_frame(
                frame,
                config.zero_sentinel,
                config.axis_remap,
                &config.sensor,
                poses,
            )
        })?;

        self.timer.start("filter");
        let filter_span = info_span!(STAGE_SPAN, stage = "filter").entered();
        let gated = timed(&mut self.timer, "fov-range", || fov_range(&points, &config.gate))?;
        let ground = &self.stages.ground;
        let segmentation = timed(&mut self.timer, "ground-removal", || {
            ground.segment(&gated, config.debug_ground)
        })
        .map_err(in_stage("ground-removal"))?;
        drop(filter_span);
        self.timer.end("filter");
        if let Some(ground) = &segmentation.debug_payload {
            debug!(ground_points = ground.len(), "ground debug payload");
        }

        let clusterer = &self.stages.clusterer;
        let clusters = timed(&mut self.timer, "clustering", || {
            clusterer.cluster(&segmentation.obstacles)
        })
        .map_err(in_stage("clustering"))?;

        let classifier = &self.stages.classifier;
        let cones = timed(&mut self.timer, "coloring", || {
            clusters
                .iter()
                .map(|cluster| {
                    let position = centroid(cluster).ok_or_else(|| {
                        PercError::stage("clustering", "clusterer returned an empty cluster")
                    })?;
                    let color = classifier.classify(cluster).map_err(in_stage("coloring"))?;
                    Ok(Cone::new(position, color))
                })
                .collect::<Result<Cones, PercError>>()
        })?;

        drop(predict_span);
        self.timer.end("predict");

        debug!(
            raw = frame.len(),
            vehicle = points.len(),
            gated = gated.len(),
            obstacles = segmentation.obstacles.len(),
            cones = cones.len(),
            "lidar prediction"
        );

        self.last = Some(Snapshot {
            points: clusters.into_iter().flatten().collect(),
            cones: cones.clone(),
        });
        let timings = self.timer.is_enabled().then(|| self.timer.take_report());
        Ok(Prediction { cones, timings })
    }

    fn display(&mut self) {
        let Some(snapshot) = &self.last else {
            debug!("display requested before any successful prediction");
            return;
        };
        self.visualizer.set_points(&snapshot.points);
        self.visualizer.set_cones(&snapshot.cones);
        self.visualizer.update();
    }
}
