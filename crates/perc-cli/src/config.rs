//! Run configuration – reads `perc.toml`.
//!
//! ```toml
//! visualizer = "log"          # required: "log" | "channel" | "none"
//! data_dir = "recordings/skidpad-1"
//!
//! [predictor]
//! debug_time = true
//! zero_sentinel = "all_components"
//! axis_remap = "right_forward_up"   # or "left_back_up"
//! gate = { fov_deg = 180.0, min_radius = 0.0, max_radius = 20.0 }
//!
//! [poses.lidar]
//! translation = [0.0, 0.0, 0.45]
//! rpy_deg = [0.0, 0.0, 0.0]
//!
//! [run]
//! policy = "skip"
//! deadline_ms = 100
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use perc_perception::{
    ClusterConfig, GridGroundConfig, PoseTransformations, Quaternion, Transform3D,
};
use perc_predictors::{LidarPredictorConfig, VisualizerKind};
use perc_runtime::{DriverConfig, FailurePolicy};
use perc_types::Point3;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "perc.toml";

/// Static mounting of one sensor on the vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseConfig {
    /// Sensor origin in the vehicle frame (metres).
    #[serde(default)]
    pub translation: [f64; 3],
    /// Roll, pitch, yaw (degrees).
    #[serde(default)]
    pub rpy_deg: [f64; 3],
}

impl PoseConfig {
    pub fn transform(&self) -> Transform3D {
        let [roll, pitch, yaw] = self.rpy_deg;
        Transform3D::new(
            Point3::from(self.translation),
            Quaternion::from_euler_deg(roll, pitch, yaw),
        )
    }
}

/// Frame-driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub policy: FailurePolicy,
    /// Discard results slower than this.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Push each on-time frame to the visualizer.
    #[serde(default = "default_display")]
    pub display: bool,
    #[serde(default)]
    pub profile: bool,
}

fn default_display() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::default(),
            deadline_ms: None,
            display: default_display(),
            profile: false,
        }
    }
}

impl RunConfig {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            policy: self.policy,
            deadline: self.deadline_ms.map(Duration::from_millis),
            display: self.display,
            profile: self.profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// How `display` renders frames. Deliberately has no default.
    pub visualizer: VisualizerKind,

    /// Recording directory; overridden by the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub predictor: LidarPredictorConfig,

    #[serde(default)]
    pub ground: GridGroundConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Sensor name → mounting. Defaults to an identity LiDAR pose.
    #[serde(default = "default_poses")]
    pub poses: BTreeMap<String, PoseConfig>,

    #[serde(default)]
    pub run: RunConfig,
}

fn default_poses() -> BTreeMap<String, PoseConfig> {
    BTreeMap::from([(
        perc_predictors::lidar::DEFAULT_SENSOR.to_string(),
        PoseConfig::default(),
    )])
}

impl Config {
    pub fn pose_transformations(&self) -> PoseTransformations {
        self.poses
            .iter()
            .fold(PoseTransformations::new(), |acc, (name, pose)| {
                acc.with_pose(name, pose.transform())
            })
    }
}

/// Load the config from `path` and apply environment overrides.
pub fn load_from(path: &Path) -> Result<Config, String> {
    let mut cfg = read(path)?;
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

pub(crate) fn read(path: &Path) -> Result<Config, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    parse(&raw)
}

pub(crate) fn parse(raw: &str) -> Result<Config, String> {
    toml::from_str(raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `PERC_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PERC_DATA_DIR` | `data_dir` |
/// | `PERC_DEBUG_TIME` | `predictor.debug_time` (`1`/`true`/`0`/`false`) |
/// | `PERC_MAX_RADIUS` | `predictor.gate.max_radius` |
///
/// Unparseable values are rejected rather than ignored.
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), String> {
    if let Ok(v) = std::env::var("PERC_DATA_DIR") {
        cfg.data_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("PERC_DEBUG_TIME") {
        cfg.predictor.debug_time = match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => return Err(format!("PERC_DEBUG_TIME: expected a boolean, got '{other}'")),
        };
    }
    if let Ok(v) = std::env::var("PERC_MAX_RADIUS") {
        cfg.predictor.gate.max_radius = v
            .trim()
            .parse()
            .map_err(|e| format!("PERC_MAX_RADIUS: {e}"))?;
    }
    Ok(())
}
