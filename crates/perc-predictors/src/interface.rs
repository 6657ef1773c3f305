//! The contract every cone predictor implements.

use perc_perception::TimingReport;
use perc_types::{Cones, DataBundle, DataType, PercError};

use crate::profiler::{self, Profiled};

/// Cones found in one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    pub cones: Cones,
    /// Per-stage latencies, present when the predictor was built with
    /// timing enabled.
    pub timings: Option<TimingReport>,
}

/// A stateful, frame-at-a-time cone detector.
///
/// Implementations are single-threaded per instance: `predict` takes
/// `&mut self` and a caller that wants parallelism runs one instance per
/// thread.
pub trait Predictor: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Keys that must be present in every bundle handed to
    /// [`predict`](Predictor::predict). Constant for the lifetime of the
    /// instance.
    fn required_data(&self) -> Vec<DataType>;

    /// Detect cones in one frame.
    ///
    /// # Errors
    ///
    /// - [`PercError::MissingInput`] when a required key is absent; raised
    ///   before any processing or side effect.
    /// - [`PercError::Validation`] / [`PercError::UnknownSensor`] for a
    ///   malformed frame or configuration.
    /// - [`PercError::StageFailure`] when a pluggable stage fails. No
    ///   partial cones are returned.
    fn predict(&mut self, data: &DataBundle) -> Result<Prediction, PercError>;

    /// [`predict`](Predictor::predict) under a profiling session.
    ///
    /// The session is stopped and the report produced whatever the outcome.
    fn profile_predict(&mut self, data: &DataBundle) -> Profiled<Prediction> {
        profiler::profile(|| self.predict(data))
    }

    /// Push the state of the last successful prediction to the configured
    /// visualizer. Does nothing before the first success.
    fn display(&mut self);
}
