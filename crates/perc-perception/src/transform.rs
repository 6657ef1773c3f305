//! Sensor pose transforms.
//!
//! Every sensor on the car is bolted on at a fixed pose relative to the
//! vehicle origin. [`PoseTransformations`] stores one rigid-body
//! [`Transform3D`] (unit-quaternion rotation + translation) per sensor name
//! and maps point sets between the sensor frame and the vehicle-origin frame
//! in either direction.
//!
//! # Example
//!
//! ```rust
//! use perc_perception::transform::{Direction, PoseTransformations, Quaternion, Transform3D};
//! use perc_types::Point3;
//!
//! // LiDAR mounted 1.2 m ahead of the origin and 0.4 m up, no rotation.
//! let poses = PoseTransformations::new().with_pose(
//!     "lidar",
//!     Transform3D::new(Point3::new(1.2, 0.0, 0.4), Quaternion::identity()),
//! );
//!
//! let out = poses
//!     .to_origin("lidar", &[Point3::new(5.0, 0.0, 0.0)], Direction::Forward)
//!     .unwrap();
//! assert!((out[0].x - 6.2).abs() < 1e-9);
//! ```

use std::collections::HashMap;

use perc_types::{PercError, Point3};

/// Rotation as a unit quaternion `w + xi + yj + zk`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

fn dot(a: Point3, b: Point3) -> f64 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

fn cross(a: Point3, b: Point3) -> Point3 {
    Point3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

impl Quaternion {
    /// Components are taken as given; use [`normalized`][Self::normalized]
    /// on anything that did not come from [`from_euler_deg`][Self::from_euler_deg].
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::from_parts(1.0, Point3::zero())
    }

    fn from_parts(w: f64, v: Point3) -> Self {
        Self::new(w, v.x, v.y, v.z)
    }

    fn vector(self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }

    /// Build a rotation from roll/pitch/yaw in degrees, applied in Z-Y-X
    /// order (yaw, then pitch, then roll).
    pub fn from_euler_deg(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll.to_radians() * 0.5).sin_cos();
        let (sp, cp) = (pitch.to_radians() * 0.5).sin_cos();
        let (sy, cy) = (yaw.to_radians() * 0.5).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + dot(self.vector(), self.vector())).sqrt()
    }

    /// Scale to unit length. Returns `None` for a zero or non-finite
    /// quaternion.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if !n.is_finite() || n == 0.0 {
            return None;
        }
        Some(Self::from_parts(self.w / n, self.vector().scale(1.0 / n)))
    }

    /// `self * rhs`: the rotation `rhs` followed by `self`.
    pub fn mul(self, rhs: Self) -> Self {
        let (a, b) = (self.vector(), rhs.vector());
        Self::from_parts(
            self.w * rhs.w - dot(a, b),
            b.scale(self.w).add(a.scale(rhs.w)).add(cross(a, b)),
        )
    }

    /// Inverse rotation, valid for unit quaternions.
    pub fn conjugate(self) -> Self {
        Self::from_parts(self.w, self.vector().scale(-1.0))
    }

    /// Rotate `v` without building the sandwich product.
    pub fn rotate(self, v: Point3) -> Point3 {
        let u = self.vector();
        let t = cross(u, v).scale(2.0);
        v.add(t.scale(self.w)).add(cross(u, t))
    }
}

/// Rigid mounting of a sensor: a sensor-frame point `p` sits at
/// `rotation · p + translation` in the vehicle frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Point3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Point3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Point3::zero(), Quaternion::identity())
    }

    /// Chain mountings: the result applies `inner` first, then `self`.
    pub fn compose(self, inner: Self) -> Self {
        Self::new(
            self.apply(inner.translation),
            self.rotation.mul(inner.rotation),
        )
    }

    /// The transform that undoes this one.
    pub fn inverse(self) -> Self {
        let rotation = self.rotation.conjugate();
        let translation = rotation.rotate(self.translation).scale(-1.0);
        Self::new(translation, rotation)
    }

    /// Map a sensor-frame point into the vehicle frame.
    pub fn apply(&self, p: Point3) -> Point3 {
        self.rotation.rotate(p).add(self.translation)
    }

    /// Map a vehicle-frame point back into the sensor frame.
    pub fn apply_inverse(&self, p: Point3) -> Point3 {
        self.rotation.conjugate().rotate(p.sub(self.translation))
    }
}

/// Which way [`PoseTransformations::to_origin`] maps points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sensor frame → vehicle-origin frame.
    Forward,
    /// Vehicle-origin frame → sensor frame.
    Inverse,
}

/// Static per-sensor poses, keyed by sensor name (`"lidar"`, `"zed"`, …).
///
/// Poses are registered while building the value and cannot be changed
/// afterwards; predictors share it read-only behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PoseTransformations {
    poses: HashMap<String, Transform3D>,
}

impl PoseTransformations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pose of `sensor`, replacing an earlier registration of
    /// the same name.
    pub fn with_pose(mut self, sensor: &str, transform: Transform3D) -> Self {
        self.poses.insert(sensor.to_string(), transform);
        self
    }

    pub fn contains(&self, sensor: &str) -> bool {
        self.poses.contains_key(sensor)
    }

    /// Registered sensor names, in unspecified order.
    pub fn sensors(&self) -> impl Iterator<Item = &str> {
        self.poses.keys().map(String::as_str)
    }

    /// # Errors
    ///
    /// [`PercError::UnknownSensor`] when no pose is registered for `sensor`.
    pub fn pose(&self, sensor: &str) -> Result<&Transform3D, PercError> {
        self.poses
            .get(sensor)
            .ok_or_else(|| PercError::UnknownSensor(sensor.to_string()))
    }

    /// Map `points` between the frame of `sensor` and the vehicle origin.
    ///
    /// # Errors
    ///
    /// [`PercError::UnknownSensor`] when no pose is registered for `sensor`.
    pub fn to_origin(
        &self,
        sensor: &str,
        points: &[Point3],
        direction: Direction,
    ) -> Result<Vec<Point3>, PercError> {
        let pose = self.pose(sensor)?;
        let mapped = match direction {
            Direction::Forward => points.iter().map(|p| pose.apply(*p)).collect(),
            Direction::Inverse => points.iter().map(|p| pose.apply_inverse(*p)).collect(),
        };
        Ok(mapped)
    }
}
