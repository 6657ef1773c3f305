//! Frame-by-frame execution of a predictor over a recording.
//!
//! [`FrameDriver`] pulls bundles from any iterator, runs the predictor on
//! each, applies the optional latency deadline after the fact and decides
//! per [`FailurePolicy`] whether a failed frame ends the run. A shared
//! `AtomicBool` requests a stop between frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use perc_predictors::{Prediction, Predictor};
use perc_types::{DataBundle, PercError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

/// What to do with a frame that fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, count and continue with the next frame.
    #[default]
    Skip,
    /// Stop the run at the first failure.
    Halt,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverConfig {
    pub policy: FailurePolicy,
    /// Results slower than this are discarded as late.
    pub deadline: Option<Duration>,
    /// Call [`Predictor::display`] after each on-time frame.
    pub display: bool,
    /// Use [`Predictor::profile_predict`] and log each report.
    pub profile: bool,
}

/// Per-frame result handed to the observer of [`FrameDriver::run_with`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Predicted {
        prediction: Prediction,
        latency: Duration,
    },
    /// The prediction succeeded but missed the deadline.
    Late { latency: Duration },
    Failed(PercError),
}

/// Totals of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSummary {
    pub started_at: DateTime<Utc>,
    /// Frames pulled from the source.
    pub frames: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub late: usize,
    /// Cones over all on-time frames.
    pub cones: usize,
    /// Mean `predict` latency over frames that reached the predictor.
    pub mean_latency: Duration,
    /// The run ended on a stop request.
    pub stopped: bool,
    /// Error that ended the run under [`FailurePolicy::Halt`].
    pub halted_on: Option<String>,
}

pub struct FrameDriver {
    predictor: Box<dyn Predictor>,
    config: DriverConfig,
}

impl FrameDriver {
    pub fn new(predictor: Box<dyn Predictor>, config: DriverConfig) -> Self {
        Self { predictor, config }
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    pub fn run<I>(&mut self, frames: I, stop: &AtomicBool) -> DriverSummary
    where
        I: IntoIterator<Item = Result<DataBundle, PercError>>,
    {
        self.run_with(frames, stop, |_, _| {})
    }

    /// [`run`](Self::run), reporting each frame to `observer` as
    /// `(index, outcome)`.
    pub fn run_with<I, F>(&mut self, frames: I, stop: &AtomicBool, mut observer: F) -> DriverSummary
    where
        I: IntoIterator<Item = Result<DataBundle, PercError>>,
        F: FnMut(usize, &FrameOutcome),
    {
        let mut summary = DriverSummary {
            started_at: Utc::now(),
            frames: 0,
            succeeded: 0,
            failed: 0,
            late: 0,
            cones: 0,
            mean_latency: Duration::ZERO,
            stopped: false,
            halted_on: None,
        };
        let mut total_latency = Duration::ZERO;
        let mut timed_frames: u32 = 0;

        info!(predictor = self.predictor.name(), "run started");
        for (index, bundle) in frames.into_iter().enumerate() {
            if stop.load(Ordering::SeqCst) {
                summary.stopped = true;
                info!(frame = index, "stop requested");
                break;
            }
            summary.frames += 1;
            let _span = info_span!("frame", index).entered();

            let outcome = match bundle {
                Ok(bundle) => {
                    let (result, latency) = self.predict(&bundle);
                    total_latency += latency;
                    timed_frames += 1;
                    match result {
                        Ok(prediction) if self.is_late(latency) => {
                            debug!(
                                latency_ms = latency.as_secs_f64() * 1e3,
                                discarded_cones = prediction.cones.len(),
                                "late result discarded"
                            );
                            FrameOutcome::Late { latency }
                        }
                        Ok(prediction) => FrameOutcome::Predicted {
                            prediction,
                            latency,
                        },
                        Err(e) => FrameOutcome::Failed(e),
                    }
                }
                Err(e) => FrameOutcome::Failed(e),
            };

            match &outcome {
                FrameOutcome::Predicted { prediction, .. } => {
                    summary.succeeded += 1;
                    summary.cones += prediction.cones.len();
                    if self.config.display {
                        self.predictor.display();
                    }
                }
                FrameOutcome::Late { .. } => summary.late += 1,
                FrameOutcome::Failed(e) => {
                    summary.failed += 1;
                    warn!(frame = index, error = %e, "frame failed");
                }
            }
            observer(index, &outcome);

            if let FrameOutcome::Failed(e) = outcome
                && self.config.policy == FailurePolicy::Halt
            {
                summary.halted_on = Some(e.to_string());
                break;
            }
        }

        if timed_frames > 0 {
            summary.mean_latency = total_latency / timed_frames;
        }
        info!(
            frames = summary.frames,
            succeeded = summary.succeeded,
            failed = summary.failed,
            late = summary.late,
            cones = summary.cones,
            "run finished"
        );
        summary
    }

    fn predict(&mut self, bundle: &DataBundle) -> (Result<Prediction, PercError>, Duration) {
        let started = Instant::now();
        if self.config.profile {
            let profiled = self.predictor.profile_predict(bundle);
            let latency = started.elapsed();
            debug!(target: "perc::profile", "\n{}", profiled.report);
            (profiled.result, latency)
        } else {
            let result = self.predictor.predict(bundle);
            (result, started.elapsed())
        }
    }

    fn is_late(&self, latency: Duration) -> bool {
        self.config.deadline.is_some_and(|d| latency > d)
    }
}
