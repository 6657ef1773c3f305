use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sensing-modality key used to address a [`Frame`] inside a [`DataBundle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Raw Hesai LiDAR returns, rows of `(x, y, z, intensity, …)`.
    HesaiPointcloud,
    /// Left ZED camera image, flattened.
    ZedLeftColor,
    /// Right ZED camera image, flattened.
    ZedRightColor,
    /// ZED stereo point cloud.
    ZedPointcloud,
}

impl DataType {
    /// Stable archive key for this modality, e.g. `"hesai_pointcloud"`.
    pub fn key(self) -> &'static str {
        match self {
            DataType::HesaiPointcloud => "hesai_pointcloud",
            DataType::ZedLeftColor => "zed_left_color",
            DataType::ZedRightColor => "zed_right_color",
            DataType::ZedPointcloud => "zed_pointcloud",
        }
    }

    /// Parse an archive key back into a modality.
    pub fn from_key(key: &str) -> Option<Self> {
        [
            DataType::HesaiPointcloud,
            DataType::ZedLeftColor,
            DataType::ZedRightColor,
            DataType::ZedPointcloud,
        ]
        .into_iter()
        .find(|dt| dt.key() == key)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A 3-D point in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    /// Distance from the origin in the XY plane.
    pub fn planar_norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Self) -> f64 {
        let d = self.sub(other);
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// One sensor acquisition: a row-major table of returns.
///
/// Every row has the same number of columns. Rows may be degenerate
/// (all-zero) or carry NaN; cleaning them is the sanitizer's job.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: usize,
    data: Vec<f64>,
}

impl Frame {
    /// Build a frame from a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// [`PercError::Validation`] when `data.len()` is not a multiple of
    /// `columns`, or when `columns` is zero for a non-empty buffer.
    pub fn from_flat(columns: usize, data: Vec<f64>) -> Result<Self, PercError> {
        if columns == 0 && !data.is_empty() {
            return Err(PercError::Validation(
                "frame with data must have at least one column".to_string(),
            ));
        }
        if columns != 0 && data.len() % columns != 0 {
            return Err(PercError::Validation(format!(
                "frame buffer of {} values is not divisible into rows of {columns}",
                data.len()
            )));
        }
        Ok(Self { columns, data })
    }

    /// Build a frame from rows.
    ///
    /// # Errors
    ///
    /// [`PercError::Validation`] when the rows are ragged.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, PercError> {
        let columns = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * columns);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != columns {
                return Err(PercError::Validation(format!(
                    "row {i} has {} columns, expected {columns}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { columns, data })
    }

    /// A three-column frame holding `points` as `(x, y, z)` rows.
    pub fn from_points(points: &[Point3]) -> Self {
        Self {
            columns: 3,
            data: points.iter().flat_map(|p| p.to_array()).collect(),
        }
    }

    /// An empty frame with a fixed column count.
    pub fn empty(columns: usize) -> Self {
        Self {
            columns,
            data: Vec::new(),
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        if self.columns == 0 {
            0
        } else {
            self.data.len() / self.columns
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.columns)?;
        self.data.get(start..start + self.columns)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.columns.max(1))
    }
}

/// Per-call mapping from modality to frame.
///
/// Lookups of absent keys fail with [`PercError::MissingInput`]; there is no
/// default frame.
#[derive(Debug, Clone, Default)]
pub struct DataBundle {
    frames: HashMap<DataType, Frame>,
}

impl DataBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a frame, replacing any previous frame for `key`.
    pub fn insert(&mut self, key: DataType, frame: Frame) {
        self.frames.insert(key, frame);
    }

    /// Builder-style [`insert`][Self::insert].
    pub fn with(mut self, key: DataType, frame: Frame) -> Self {
        self.insert(key, frame);
        self
    }

    pub fn contains(&self, key: DataType) -> bool {
        self.frames.contains_key(&key)
    }

    /// # Errors
    ///
    /// [`PercError::MissingInput`] when `key` is absent.
    pub fn get(&self, key: DataType) -> Result<&Frame, PercError> {
        self.frames.get(&key).ok_or(PercError::MissingInput(key))
    }

    /// Check that every key in `required` is present.
    ///
    /// # Errors
    ///
    /// [`PercError::MissingInput`] naming the first absent key.
    pub fn require(&self, required: &[DataType]) -> Result<(), PercError> {
        match required.iter().find(|k| !self.contains(**k)) {
            Some(missing) => Err(PercError::MissingInput(*missing)),
            None => Ok(()),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = DataType> + '_ {
        self.frames.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Track-boundary cone colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConeColor {
    Blue,
    Yellow,
    Orange,
    Unknown,
}

/// A single detection, positioned in the vehicle-origin frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cone {
    pub position: Point3,
    pub color: ConeColor,
}

impl Cone {
    pub fn new(position: Point3, color: ConeColor) -> Self {
        Self { position, color }
    }
}

/// Ordered cone detections for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cones {
    cones: Vec<Cone>,
}

impl Cones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cone: Cone) {
        self.cones.push(cone);
    }

    pub fn len(&self) -> usize {
        self.cones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cones.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cone> {
        self.cones.iter()
    }

    /// Cones of a single color, in detection order.
    pub fn of_color(&self, color: ConeColor) -> impl Iterator<Item = &Cone> {
        self.cones.iter().filter(move |c| c.color == color)
    }

    pub fn as_slice(&self) -> &[Cone] {
        &self.cones
    }
}

impl FromIterator<Cone> for Cones {
    fn from_iter<I: IntoIterator<Item = Cone>>(iter: I) -> Self {
        Self {
            cones: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Cones {
    type Item = &'a Cone;
    type IntoIter = std::slice::Iter<'a, Cone>;

    fn into_iter(self) -> Self::IntoIter {
        self.cones.iter()
    }
}

/// Error type shared by every stage of the perception pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PercError {
    #[error("Missing input: data bundle has no '{0}' frame")]
    MissingInput(DataType),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown sensor: no pose registered for '{0}'")]
    UnknownSensor(String),

    #[error("Stage '{stage}' failed: {details}")]
    StageFailure { stage: String, details: String },

    #[error("Timer misuse: {0}")]
    TimerMisuse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl PercError {
    pub fn stage(stage: &str, details: impl Into<String>) -> Self {
        PercError::StageFailure {
            stage: stage.to_string(),
            details: details.into(),
        }
    }

    /// Errors raised by external collaborators rather than by the frame
    /// itself.
    pub fn is_stage_failure(&self) -> bool {
        matches!(self, PercError::StageFailure { .. })
    }
}

pub type Result<T, E = PercError> = std::result::Result<T, E>;
