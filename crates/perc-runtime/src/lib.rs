//! `perc-runtime` – running predictors over recordings.
//!
//! # Modules
//!
//! - [`loader`] – [`FrameLoader`][loader::FrameLoader]: indexed access to a
//!   directory of `instance-{i}.json` archives.
//! - [`driver`] – [`FrameDriver`][driver::FrameDriver]: per-frame execution
//!   with a failure policy, an optional latency deadline and a cooperative
//!   stop flag.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   subscriber with optional OTLP export.

pub mod driver;
pub mod loader;
pub mod telemetry;

pub use driver::{DriverConfig, DriverSummary, FailurePolicy, FrameDriver, FrameOutcome};
pub use loader::FrameLoader;
pub use telemetry::{TracerProviderGuard, init_tracing};
