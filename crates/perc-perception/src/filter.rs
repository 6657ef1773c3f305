//! Point-cloud sanitizing and spatial gating.
//!
//! The raw LiDAR frame goes through [`sanitize`] (column truncation, sentinel
//! and NaN removal), [`remap_axes`] (sensor convention → vehicle forward /
//! left / up) and then the sensor pose. [`fov_range`] bounds the working set
//! before ground segmentation.

use perc_types::{Frame, PercError, Point3};
use serde::{Deserialize, Serialize};

use crate::transform::{Direction, PoseTransformations};

/// Slack on the bearing bound so that points exactly on the FOV edge (e.g.
/// straight left at `fov = 180`) survive floating-point rounding.
const BEARING_EPS_RAD: f64 = 1e-9;

/// Which rows count as the sensor's zero "no return" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroSentinel {
    /// Drop rows whose three spatial components are all exactly zero.
    #[default]
    AllComponents,
    /// Drop rows where any spatial component is exactly zero.
    AnyComponent,
}

impl ZeroSentinel {
    fn is_sentinel(self, p: &[f64]) -> bool {
        match self {
            ZeroSentinel::AllComponents => p.iter().all(|v| *v == 0.0),
            ZeroSentinel::AnyComponent => p.iter().any(|v| *v == 0.0),
        }
    }
}

/// Native axis convention of the sensor, as seen from the vehicle's
/// (forward, left, up) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisRemap {
    /// Sensor reports (right, forward, up): `(x, y, z) → (y, −x, z)`.
    #[default]
    RightForwardUp,
    /// Sensor reports (left, back, up): swap the first two columns, then
    /// negate the new first column, `(x, y, z) → (−y, x, z)`.
    LeftBackUp,
}

impl AxisRemap {
    pub fn apply(self, p: Point3) -> Point3 {
        match self {
            AxisRemap::RightForwardUp => Point3::new(p.y, -p.x, p.z),
            AxisRemap::LeftBackUp => Point3::new(-p.y, p.x, p.z),
        }
    }
}

/// Reduce `frame` to clean `(x, y, z)` points in sensor coordinates.
///
/// Keeps the first three columns, then drops sentinel rows and rows with a
/// NaN component. Row order is preserved.
///
/// # Errors
///
/// [`PercError::Validation`] when the frame has fewer than 3 columns. An
/// empty frame is not an error.
pub fn sanitize(frame: &Frame, sentinel: ZeroSentinel) -> Result<Vec<Point3>, PercError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    if frame.columns() < 3 {
        return Err(PercError::Validation(format!(
            "point frame needs at least 3 columns, got {}",
            frame.columns()
        )));
    }

    let points = frame
        .rows()
        .map(|row| &row[..3])
        .filter(|xyz| !sentinel.is_sentinel(xyz))
        .filter(|xyz| !xyz.iter().any(|v| v.is_nan()))
        .map(|xyz| Point3::new(xyz[0], xyz[1], xyz[2]))
        .collect();
    Ok(points)
}

/// Convert sensor axes to vehicle axes (forward, left, up) in place.
pub fn remap_axes(points: &mut [Point3], remap: AxisRemap) {
    for p in points.iter_mut() {
        *p = remap.apply(*p);
    }
}

/// Sanitize, remap and move a raw frame of `sensor` into the vehicle-origin
/// frame.
///
/// # Errors
///
/// [`PercError::Validation`] for a malformed frame,
/// [`PercError::UnknownSensor`] when `sensor` has no registered pose.
pub fn to_vehicle_frame(
    frame: &Frame,
    sentinel: ZeroSentinel,
    remap: AxisRemap,
    sensor: &str,
    poses: &PoseTransformations,
) -> Result<Vec<Point3>, PercError> {
    let mut points = sanitize(frame, sentinel)?;
    remap_axes(&mut points, remap);
    poses.to_origin(sensor, &points, Direction::Forward)
}

/// Field-of-view and radius bounds of the spatial gate.
///
/// `fov_deg` is the full opening angle, centred on the vehicle's forward
/// (+x) axis; values ≥ 360 disable the bearing test. Radii are planar
/// (XY) distances from the vehicle origin, inclusive at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FovRange {
    pub fov_deg: f64,
    pub min_radius: f64,
    pub max_radius: f64,
}

impl FovRange {
    pub fn new(fov_deg: f64, min_radius: f64, max_radius: f64) -> Self {
        Self {
            fov_deg,
            min_radius,
            max_radius,
        }
    }

    /// # Errors
    ///
    /// [`PercError::Validation`] for a non-positive or NaN FOV, a negative
    /// or NaN radius, or `min_radius > max_radius`.
    pub fn validate(&self) -> Result<(), PercError> {
        if self.fov_deg.is_nan() || self.fov_deg <= 0.0 {
            return Err(PercError::Validation(format!(
                "fov must be positive, got {}",
                self.fov_deg
            )));
        }
        if self.min_radius.is_nan() || self.max_radius.is_nan() || self.min_radius < 0.0 {
            return Err(PercError::Validation(format!(
                "radius bounds must be non-negative, got [{}, {}]",
                self.min_radius, self.max_radius
            )));
        }
        if self.min_radius > self.max_radius {
            return Err(PercError::Validation(format!(
                "min radius {} exceeds max radius {}",
                self.min_radius, self.max_radius
            )));
        }
        Ok(())
    }

    /// True when `p` satisfies both the radius and the bearing bound.
    pub fn admits(&self, p: Point3) -> bool {
        let r = p.planar_norm();
        if r < self.min_radius || r > self.max_radius {
            return false;
        }
        if self.fov_deg >= 360.0 {
            return true;
        }
        bearing(p).abs() <= (self.fov_deg * 0.5).to_radians() + BEARING_EPS_RAD
    }
}

/// Bearing of `p` from the forward axis, in radians, positive to the left.
/// A point on the vertical axis through the origin has bearing 0.
pub fn bearing(p: Point3) -> f64 {
    if p.x == 0.0 && p.y == 0.0 {
        return 0.0;
    }
    p.y.atan2(p.x)
}

/// Keep the points admitted by `gate`, in their original order.
///
/// # Errors
///
/// [`PercError::Validation`] when the gate parameters are invalid.
pub fn fov_range(points: &[Point3], gate: &FovRange) -> Result<Vec<Point3>, PercError> {
    gate.validate()?;
    Ok(points.iter().copied().filter(|p| gate.admits(*p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform3D;

    fn scenario_frame() -> Frame {
        Frame::from_rows(&[
            [0.0, 0.0, 0.0],
            [1.0, 2.0, 3.0],
            [0.0, 0.0, 0.0],
            [f64::NAN, 1.0, 1.0],
            [4.0, 0.0, 1.0],
        ])
        .unwrap()
    }

    fn identity_poses() -> PoseTransformations {
        PoseTransformations::new().with_pose("lidar", Transform3D::identity())
    }

    #[test]
    fn sanitize_scenario_keeps_valid_rows() {
        let pts = sanitize(&scenario_frame(), ZeroSentinel::AllComponents).unwrap();
        assert_eq!(
            pts,
            vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 0.0, 1.0)]
        );
    }

    #[test]
    fn sanitize_any_component_policy_drops_partial_zero_rows() {
        let pts = sanitize(&scenario_frame(), ZeroSentinel::AnyComponent).unwrap();
        assert_eq!(pts, vec![Point3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn sanitize_truncates_extra_columns_before_sentinel_check() {
        // Zero intensity in column 3 must not make a row look like "no return".
        let frame = Frame::from_rows(&[[1.0, 1.0, 1.0, 0.0], [0.0, 0.0, 0.0, 7.0]]).unwrap();
        let pts = sanitize(&frame, ZeroSentinel::AnyComponent).unwrap();
        assert_eq!(pts, vec![Point3::new(1.0, 1.0, 1.0)]);
    }

    #[test]
    fn sanitize_rejects_narrow_frames() {
        let frame = Frame::from_rows(&[[1.0, 2.0]]).unwrap();
        assert!(matches!(
            sanitize(&frame, ZeroSentinel::AllComponents),
            Err(PercError::Validation(_))
        ));
    }

    #[test]
    fn sanitize_empty_frame_is_empty() {
        assert!(sanitize(&Frame::empty(4), ZeroSentinel::AllComponents)
            .unwrap()
            .is_empty());
        assert!(sanitize(&Frame::empty(0), ZeroSentinel::AllComponents)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize(&scenario_frame(), ZeroSentinel::AllComponents).unwrap();
        let twice = sanitize(&Frame::from_points(&once), ZeroSentinel::AllComponents).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn sanitize_removes_exactly_flagged_rows() {
        let rows = [
            [0.5, 0.5, 0.5],
            [0.0, 0.0, 0.0],
            [2.0, f64::NAN, 1.0],
            [-3.0, 1.0, 0.2],
            [0.0, 0.0, f64::NAN],
            [7.0, -7.0, 0.0],
        ];
        let frame = Frame::from_rows(&rows).unwrap();
        let pts = sanitize(&frame, ZeroSentinel::AllComponents).unwrap();
        let expected: Vec<Point3> = [rows[0], rows[3], rows[5]]
            .into_iter()
            .map(Point3::from)
            .collect();
        assert_eq!(pts, expected);
    }

    #[test]
    fn remap_moves_sensor_forward_to_vehicle_forward() {
        let mut pts = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 0.0, 1.0)];
        remap_axes(&mut pts, AxisRemap::RightForwardUp);
        assert_eq!(
            pts,
            vec![Point3::new(2.0, -1.0, 3.0), Point3::new(0.0, -4.0, 1.0)]
        );
    }

    #[test]
    fn left_back_up_swaps_then_negates_first_column() {
        let mut pts = vec![Point3::new(1.0, 2.0, 3.0)];
        remap_axes(&mut pts, AxisRemap::LeftBackUp);
        assert_eq!(pts, vec![Point3::new(-2.0, 1.0, 3.0)]);
    }

    #[test]
    fn remap_conventions_differ_by_half_turn() {
        let p = Point3::new(0.7, -3.1, 0.4);
        let a = AxisRemap::RightForwardUp.apply(p);
        let b = AxisRemap::LeftBackUp.apply(p);
        assert_eq!(b, Point3::new(-a.x, -a.y, a.z));
        assert_eq!(AxisRemap::default(), AxisRemap::RightForwardUp);
    }

    #[test]
    fn to_vehicle_frame_scenario() {
        let pts = to_vehicle_frame(
            &scenario_frame(),
            ZeroSentinel::AllComponents,
            AxisRemap::RightForwardUp,
            "lidar",
            &identity_poses(),
        )
        .unwrap();
        assert_eq!(
            pts,
            vec![Point3::new(2.0, -1.0, 3.0), Point3::new(0.0, -4.0, 1.0)]
        );
    }

    #[test]
    fn to_vehicle_frame_unknown_sensor() {
        let err = to_vehicle_frame(
            &scenario_frame(),
            ZeroSentinel::AllComponents,
            AxisRemap::RightForwardUp,
            "hesai",
            &identity_poses(),
        )
        .unwrap_err();
        assert!(matches!(err, PercError::UnknownSensor(_)));
    }

    #[test]
    fn fov_range_scenario() {
        let pts = [Point3::new(2.0, -1.0, 3.0), Point3::new(0.0, -4.0, 1.0)];

        let wide = fov_range(&pts, &FovRange::new(180.0, 0.0, 5.0)).unwrap();
        assert_eq!(wide, pts.to_vec());

        let tight = fov_range(&pts, &FovRange::new(180.0, 0.0, 2.0)).unwrap();
        assert!(tight.is_empty());

        let mid = fov_range(&pts, &FovRange::new(180.0, 0.0, 3.0)).unwrap();
        assert_eq!(mid, vec![Point3::new(2.0, -1.0, 3.0)]);
    }

    #[test]
    fn fov_range_excludes_points_behind() {
        let pts = [
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(-5.0, 0.0, 0.0),
            Point3::new(3.0, 3.0, 0.0),
            Point3::new(1.0, 3.0, 0.0),
        ];
        let out = fov_range(&pts, &FovRange::new(90.0, 0.0, 100.0)).unwrap();
        // 45° is on the edge of a 90° FOV; atan2(3, 1) ≈ 71.6° is outside.
        assert_eq!(out, vec![pts[0], pts[2]]);

        let all = fov_range(&pts, &FovRange::new(360.0, 0.0, 100.0)).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn points_above_the_origin_pass_any_bearing_bound() {
        let gate = FovRange::new(180.0, 0.0, 5.0);
        assert!(gate.admits(Point3::new(-0.0, -0.0, 1.0)));
        assert!(gate.admits(Point3::new(0.0, -0.0, 0.0)));
        assert_eq!(bearing(Point3::new(-0.0, 0.0, 2.0)), 0.0);
        assert!(!FovRange::new(180.0, 0.5, 5.0).admits(Point3::new(-0.0, -0.0, 1.0)));
    }

    #[test]
    fn fov_range_min_radius_is_inclusive() {
        let pts = [Point3::new(1.0, 0.0, 0.0), Point3::new(0.5, 0.0, 0.0)];
        let out = fov_range(&pts, &FovRange::new(180.0, 1.0, 2.0)).unwrap();
        assert_eq!(out, vec![pts[0]]);
    }

    #[test]
    fn gate_bounds_hold_for_kept_and_excluded_points() {
        let gate = FovRange::new(120.0, 1.0, 10.0);
        let mut pts = Vec::new();
        for i in -12..=12 {
            for j in -12..=12 {
                pts.push(Point3::new(i as f64 * 0.9, j as f64 * 0.9, 0.1));
            }
        }
        let kept = fov_range(&pts, &gate).unwrap();
        let half = 60f64.to_radians();
        for p in &kept {
            let r = p.planar_norm();
            assert!(r >= 1.0 && r <= 10.0, "{p:?}");
            assert!(bearing(*p).abs() <= half + 1e-9, "{p:?}");
        }
        for p in pts.iter().filter(|p| !kept.contains(p)) {
            let r = p.planar_norm();
            let outside = r < 1.0 || r > 10.0 || bearing(*p).abs() > half;
            assert!(outside, "{p:?} was excluded without violating a bound");
        }
    }

    #[test]
    fn fov_range_rejects_bad_parameters() {
        let pts = [Point3::new(1.0, 0.0, 0.0)];
        assert!(fov_range(&pts, &FovRange::new(0.0, 0.0, 1.0)).is_err());
        assert!(fov_range(&pts, &FovRange::new(f64::NAN, 0.0, 1.0)).is_err());
        assert!(fov_range(&pts, &FovRange::new(90.0, -1.0, 1.0)).is_err());
        assert!(fov_range(&pts, &FovRange::new(90.0, 3.0, 1.0)).is_err());
        assert!(fov_range(&pts, &FovRange::new(90.0, 0.0, f64::INFINITY)).is_ok());
    }
}
