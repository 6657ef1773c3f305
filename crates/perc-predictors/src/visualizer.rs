//! Visualizer strategies behind [`Predictor::display`][crate::Predictor::display].
//!
//! The strategy is picked once, when the predictor is built, from a
//! [`VisualizerKind`]. There is deliberately no default kind: a deployment
//! has to say whether it wants frames logged, streamed to a viewer, or
//! dropped.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use perc_types::{Cones, Point3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Consumer of the latest points and cones.
///
/// Calls are best effort: implementations must not block the pipeline and
/// report trouble through logs only.
pub trait Visualizer: Send {
    fn set_points(&mut self, points: &[Point3]);
    fn set_cones(&mut self, cones: &Cones);
    /// Flush the staged points and cones.
    fn update(&mut self);
}

/// Strategy selector, usually read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizerKind {
    /// One structured log line per update.
    Log,
    /// Hand frames to an in-process viewer over a bounded channel.
    Channel,
    /// Discard everything.
    None,
}

/// One flushed visualizer frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualFrame {
    pub points: Vec<Point3>,
    pub cones: Cones,
}

/// Queue depth of [`ChannelVisualizer`] when built through [`build`].
pub const DEFAULT_CHANNEL_DEPTH: usize = 4;

/// Instantiate the strategy for `kind`.
///
/// [`VisualizerKind::Channel`] also returns the receiving end for the viewer.
pub fn build(kind: VisualizerKind) -> (Box<dyn Visualizer>, Option<Receiver<VisualFrame>>) {
    match kind {
        VisualizerKind::Log => (Box::new(LogVisualizer::default()), None),
        VisualizerKind::Channel => {
            let (vis, rx) = ChannelVisualizer::new(DEFAULT_CHANNEL_DEPTH);
            (Box::new(vis), Some(rx))
        }
        VisualizerKind::None => (Box::new(NullVisualizer), None),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// NullVisualizer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct NullVisualizer;

impl Visualizer for NullVisualizer {
    fn set_points(&mut self, _points: &[Point3]) {}
    fn set_cones(&mut self, _cones: &Cones) {}
    fn update(&mut self) {}
}

// ────────────────────────────────────────────────────────────────────────────
// LogVisualizer
// ────────────────────────────────────────────────────────────────────────────

/// Logs a one-line summary of each update.
#[derive(Debug, Default)]
pub struct LogVisualizer {
    points: usize,
    cones: Vec<Point3>,
    updates: u64,
}

impl Visualizer for LogVisualizer {
    fn set_points(&mut self, points: &[Point3]) {
        self.points = points.len();
    }

    fn set_cones(&mut self, cones: &Cones) {
        self.cones = cones.iter().map(|c| c.position).collect();
    }

    fn update(&mut self) {
        self.updates += 1;
        let nearest = self
            .cones
            .iter()
            .map(|p| p.planar_norm())
            .fold(f64::INFINITY, f64::min);
        info!(
            update = self.updates,
            points = self.points,
            cones = self.cones.len(),
            nearest_cone_m = if nearest.is_finite() { nearest } else { -1.0 },
            "visualizer update"
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ChannelVisualizer
// ────────────────────────────────────────────────────────────────────────────

/// Streams [`VisualFrame`]s to a viewer thread.
///
/// The queue is bounded; when the viewer falls behind the newest frame is
/// dropped instead of blocking the pipeline.
#[derive(Debug)]
pub struct ChannelVisualizer {
    tx: SyncSender<VisualFrame>,
    staged: VisualFrame,
    dropped: u64,
    disconnected: bool,
}

impl ChannelVisualizer {
    pub fn new(depth: usize) -> (Self, Receiver<VisualFrame>) {
        let (tx, rx) = mpsc::sync_channel(depth.max(1));
        (
            Self {
                tx,
                staged: VisualFrame::default(),
                dropped: 0,
                disconnected: false,
            },
            rx,
        )
    }

    /// Frames discarded because the viewer was behind or gone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Visualizer for ChannelVisualizer {
    fn set_points(&mut self, points: &[Point3]) {
        self.staged.points = points.to_vec();
    }

    fn set_cones(&mut self, cones: &Cones) {
        self.staged.cones = cones.clone();
    }

    fn update(&mut self) {
        match self.tx.try_send(self.staged.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(dropped = self.dropped, "viewer queue full; frame dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                if !self.disconnected {
                    warn!("viewer disconnected; further frames are discarded");
                    self.disconnected = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perc_types::{Cone, ConeColor};

    fn one_cone() -> Cones {
        [Cone::new(Point3::new(3.0, 1.0, 0.1), ConeColor::Unknown)]
            .into_iter()
            .collect()
    }

    #[test]
    fn channel_visualizer_delivers_staged_frame() {
        let (mut vis, rx) = ChannelVisualizer::new(2);
        vis.set_points(&[Point3::new(1.0, 0.0, 0.0)]);
        vis.set_cones(&one_cone());
        vis.update();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.points.len(), 1);
        assert_eq!(frame.cones, one_cone());
    }

    #[test]
    fn channel_visualizer_never_blocks_when_full() {
        let (mut vis, rx) = ChannelVisualizer::new(1);
        vis.update();
        vis.update();
        vis.update();
        assert_eq!(vis.dropped(), 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_visualizer_survives_dropped_viewer() {
        let (mut vis, rx) = ChannelVisualizer::new(1);
        drop(rx);
        vis.update();
        vis.update();
        assert_eq!(vis.dropped(), 2);
    }

    #[test]
    fn build_returns_receiver_only_for_channel() {
        assert!(build(VisualizerKind::Channel).1.is_some());
        assert!(build(VisualizerKind::Log).1.is_none());
        assert!(build(VisualizerKind::None).1.is_none());
    }

    #[test]
    fn log_visualizer_counts_updates() {
        let mut vis = LogVisualizer::default();
        vis.set_points(&[Point3::zero(); 3]);
        vis.set_cones(&one_cone());
        vis.update();
        assert_eq!(vis.updates, 1);
        assert_eq!(vis.points, 3);
        assert_eq!(vis.cones.len(), 1);
    }

    #[test]
    fn visualizer_kind_parses_from_config_strings() {
        use serde::de::IntoDeserializer;
        use serde::de::value::{Error, StrDeserializer};

        let parse = |s: &str| {
            let de: StrDeserializer<'_, Error> = s.into_deserializer();
            VisualizerKind::deserialize(de)
        };
        assert_eq!(parse("channel").unwrap(), VisualizerKind::Channel);
        assert_eq!(parse("none").unwrap(), VisualizerKind::None);
        assert!(parse("window").is_err());
    }
}
