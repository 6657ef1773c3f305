//! Call-level profiling of one prediction.
//!
//! [`profile`] installs a thread-scoped tracing subscriber whose only layer
//! is a [`ProfileLayer`], runs the closure, and restores the previous
//! subscriber. Restoration is tied to a drop guard, so the session ends on
//! success, on error, and on unwind.
//!
//! Every span closed inside the session becomes a [`SpanProfile`] keyed by
//! its label and its parent's label. A span's label is the value of its
//! `stage` field when present, else the span name. Events emitted inside
//! the session are not forwarded to the process-wide subscriber.
//!
//! # Example
//!
//! ```rust
//! use perc_predictors::profiler::profile;
//!
//! let profiled = profile(|| {
//!     let _outer = tracing::info_span!("predict").entered();
//!     let _inner = tracing::info_span!("stage", stage = "clustering").entered();
//!     Ok::<_, perc_types::PercError>(42)
//! });
//! assert_eq!(profiled.result, Ok(42));
//! let clustering = profiled.report.get("clustering").unwrap();
//! assert_eq!(clustering.parent.as_deref(), Some("predict"));
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use perc_types::PercError;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, Registry};

const LABEL_FIELD: &str = "stage";

/// Aggregate of every closed span sharing a label and a parent label.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanProfile {
    pub name: String,
    pub parent: Option<String>,
    pub calls: u64,
    /// Time spent entered, summed over calls.
    pub busy: Duration,
}

/// Result of one profiling session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileReport {
    /// Wall time of the whole session.
    pub total: Duration,
    /// In first-close order.
    pub spans: Vec<SpanProfile>,
}

impl ProfileReport {
    /// First profile whose label is `name`.
    pub fn get(&self, name: &str) -> Option<&SpanProfile> {
        self.spans.iter().find(|s| s.name == name)
    }

    fn from_closed(total: Duration, closed: Vec<ClosedSpan>) -> Self {
        let mut spans: Vec<SpanProfile> = Vec::new();
        for c in closed {
            match spans
                .iter_mut()
                .find(|s| s.name == c.label && s.parent == c.parent)
            {
                Some(s) => {
                    s.calls += 1;
                    s.busy += c.busy;
                }
                None => spans.push(SpanProfile {
                    name: c.label,
                    parent: c.parent,
                    calls: 1,
                    busy: c.busy,
                }),
            }
        }
        Self { total, spans }
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total {:.3} ms", self.total.as_secs_f64() * 1e3)?;
        writeln!(f, "{:>6}  {:>10}  {:<20} parent", "calls", "busy ms", "span")?;
        let mut sorted: Vec<&SpanProfile> = self.spans.iter().collect();
        sorted.sort_by(|a, b| b.busy.cmp(&a.busy));
        for s in sorted {
            writeln!(
                f,
                "{:>6}  {:>10.3}  {:<20} {}",
                s.calls,
                s.busy.as_secs_f64() * 1e3,
                s.name,
                s.parent.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }
}

/// Outcome of the profiled call plus its profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profiled<T> {
    pub result: Result<T, PercError>,
    pub report: ProfileReport,
}

/// Run `f` inside a profiling session.
pub fn profile<T>(f: impl FnOnce() -> Result<T, PercError>) -> Profiled<T> {
    let closed = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(ProfileLayer {
        closed: Arc::clone(&closed),
    });

    let started = Instant::now();
    let result = tracing::subscriber::with_default(subscriber, f);
    let total = started.elapsed();

    let closed = closed
        .lock()
        .map(|mut v| std::mem::take(&mut *v))
        .unwrap_or_default();
    Profiled {
        result,
        report: ProfileReport::from_closed(total, closed),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ClosedSpan {
    label: String,
    parent: Option<String>,
    busy: Duration,
}

/// Per-span bookkeeping stored in the registry's extensions.
struct SpanTiming {
    label: String,
    busy: Duration,
    entered_at: Option<Instant>,
}

#[derive(Default)]
struct LabelVisitor(Option<String>);

impl Visit for LabelVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == LABEL_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == LABEL_FIELD && self.0.is_none() {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

/// Tracing layer that measures busy time of every span it sees.
pub struct ProfileLayer {
    closed: Arc<Mutex<Vec<ClosedSpan>>>,
}

impl<S> Layer<S> for ProfileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = LabelVisitor::default();
        attrs.record(&mut visitor);
        let label = visitor
            .0
            .unwrap_or_else(|| attrs.metadata().name().to_string());
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanTiming {
                label,
                busy: Duration::ZERO,
                entered_at: None,
            });
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut ext = span.extensions_mut();
        if let Some(timing) = ext.get_mut::<SpanTiming>() {
            timing.entered_at = Some(Instant::now());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut ext = span.extensions_mut();
        if let Some(timing) = ext.get_mut::<SpanTiming>()
            && let Some(at) = timing.entered_at.take()
        {
            timing.busy += at.elapsed();
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let parent = span.parent().and_then(|p| {
            p.extensions()
                .get::<SpanTiming>()
                .map(|t| t.label.clone())
        });
        let ext = span.extensions();
        let Some(timing) = ext.get::<SpanTiming>() else {
            return;
        };
        let record = ClosedSpan {
            label: timing.label.clone(),
            parent,
            busy: timing.busy,
        };
        if let Ok(mut closed) = self.closed.lock() {
            closed.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info_span;

    #[test]
    fn records_nesting_and_call_counts() {
        let profiled = profile(|| {
            let _root = info_span!("predict").entered();
            for _ in 0..3 {
                let _s = info_span!("stage", stage = "coloring").entered();
            }
            Ok(())
        });
        assert!(profiled.result.is_ok());

        let coloring = profiled.report.get("coloring").unwrap();
        assert_eq!(coloring.calls, 3);
        assert_eq!(coloring.parent.as_deref(), Some("predict"));

        let root = profiled.report.get("predict").unwrap();
        assert_eq!(root.calls, 1);
        assert!(root.parent.is_none());
        assert!(profiled.report.total >= root.busy);
    }

    #[test]
    fn session_ends_on_error() {
        let profiled: Profiled<()> = profile(|| {
            let _root = info_span!("predict").entered();
            Err(PercError::stage("clustering", "boom"))
        });
        assert!(profiled.result.unwrap_err().is_stage_failure());
        assert!(profiled.report.get("predict").is_some());

        // The profiling subscriber is gone: spans here are not recorded.
        let after = profile(|| Ok(()));
        assert!(after.report.spans.is_empty());
    }

    #[test]
    fn session_ends_on_panic() {
        let outcome = std::panic::catch_unwind(|| {
            profile::<()>(|| {
                let _root = info_span!("predict").entered();
                panic!("stage exploded");
            })
        });
        assert!(outcome.is_err());
        let still_profiling = tracing::dispatcher::get_default(|d| {
            d.is::<tracing_subscriber::layer::Layered<ProfileLayer, Registry>>()
        });
        assert!(!still_profiling);
    }

    #[test]
    fn display_lists_every_span() {
        let profiled = profile(|| {
            let _a = info_span!("predict").entered();
            let _b = info_span!("stage", stage = "fov-range").entered();
            Ok(())
        });
        let text = profiled.report.to_string();
        assert!(text.contains("predict"));
        assert!(text.contains("fov-range"));
        assert!(text.starts_with("total "));
    }
}
