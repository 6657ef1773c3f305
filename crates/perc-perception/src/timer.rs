//! Hierarchical latency instrumentation.
//!
//! A [`Timer`] keeps an explicit stack of open spans. The nesting depth of a
//! span is the number of spans open when it started, so a report renders as
//! an indented tree:
//!
//! ```text
//! predict: 4.210 ms
//!   init-process: 0.610 ms
//!   filter: 3.480 ms
//!     fov-range: 0.220 ms
//!     ground-removal: 3.190 ms
//! ```
//!
//! The timer is switched on or off at construction. A disabled timer never
//! allocates a span and every call returns immediately.
//!
//! # Example
//!
//! ```rust
//! use perc_perception::timer::Timer;
//!
//! let mut timer = Timer::new(true);
//! timer.start("predict");
//! timer.start("filter");
//! let inner = timer.end("filter").unwrap();
//! assert_eq!(inner.depth, 1);
//! let outer = timer.end("predict").unwrap();
//! assert_eq!(outer.depth, 0);
//! assert_eq!(timer.report().len(), 2);
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use perc_types::PercError;
use tracing::{debug, warn};

/// A closed, measured interval.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSpan {
    pub label: String,
    /// Number of spans that were open when this one started.
    pub depth: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct OpenSpan {
    label: String,
    started: Instant,
}

/// Completed spans of one call, in completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingReport {
    spans: Vec<TimingSpan>,
}

impl TimingReport {
    pub fn spans(&self) -> &[TimingSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Most recent span with `label`.
    pub fn get(&self, label: &str) -> Option<&TimingSpan> {
        self.spans.iter().rev().find(|s| s.label == label)
    }

    /// Sum of the top-level spans.
    pub fn total(&self) -> Duration {
        self.spans
            .iter()
            .filter(|s| s.depth == 0)
            .map(|s| s.elapsed)
            .sum()
    }
}

impl fmt::Display for TimingReport {
    /// Parents are listed before their children regardless of completion
    /// order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A child closes before its parent, so a parent's descendants are the
        // spans completed between its previous sibling and itself.
        let mut ordered: Vec<&TimingSpan> = Vec::with_capacity(self.spans.len());
        render_subtree(&self.spans, 0, &mut ordered);
        for span in ordered {
            writeln!(
                f,
                "{:indent$}{}: {:.3} ms",
                "",
                span.label,
                span.elapsed.as_secs_f64() * 1e3,
                indent = span.depth * 2
            )?;
        }
        Ok(())
    }
}

/// Emit the spans at `depth` found in `spans` (a completion-ordered slice
/// holding one subtree level) together with their descendants, parents first.
fn render_subtree<'a>(spans: &'a [TimingSpan], depth: usize, out: &mut Vec<&'a TimingSpan>) {
    let mut child_start = 0;
    for (i, span) in spans.iter().enumerate() {
        if span.depth == depth {
            out.push(span);
            render_subtree(&spans[child_start..i], depth + 1, out);
            child_start = i + 1;
        }
    }
}

/// Stack-disciplined span timer.
#[derive(Debug)]
pub struct Timer {
    enabled: bool,
    open: Vec<OpenSpan>,
    completed: Vec<TimingSpan>,
}

impl Timer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            open: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of currently open spans.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Open a span nested under every span that is currently open.
    pub fn start(&mut self, label: &str) {
        if !self.enabled {
            return;
        }
        self.open.push(OpenSpan {
            label: label.to_string(),
            started: Instant::now(),
        });
    }

    /// Close the innermost open span, which must carry `label`.
    ///
    /// Misuse (see [`try_end`][Self::try_end]) panics in debug builds. Release
    /// builds log a warning and return `None` without touching the stack.
    pub fn end(&mut self, label: &str) -> Option<TimingSpan> {
        match self.try_end(label) {
            Ok(span) => span,
            Err(e) => {
                if cfg!(debug_assertions) {
                    panic!("{e}");
                }
                warn!(error = %e, "timer end() out of stack order; ignored");
                None
            }
        }
    }

    /// Checked form of [`end`][Self::end]. `Ok(None)` when the timer is
    /// disabled.
    ///
    /// # Errors
    ///
    /// [`PercError::TimerMisuse`] when `label` is not the innermost open
    /// span, or nothing is open. The stack is left unchanged.
    pub fn try_end(&mut self, label: &str) -> Result<Option<TimingSpan>, PercError> {
        if !self.enabled {
            return Ok(None);
        }
        let top = self.open.last().map(|s| s.label.as_str());
        if top != Some(label) {
            return Err(PercError::TimerMisuse(format!(
                "span '{label}' closed while innermost open span is '{}'",
                top.unwrap_or("<none>")
            )));
        }
        let Some(open) = self.open.pop() else {
            return Ok(None);
        };

        let span = TimingSpan {
            label: open.label,
            depth: self.open.len(),
            elapsed: open.started.elapsed(),
        };
        let indent = "  ".repeat(span.depth);
        debug!(
            target: "perc::timer",
            "{indent}{}: {:.3} ms",
            span.label,
            span.elapsed.as_secs_f64() * 1e3
        );
        self.completed.push(span.clone());
        Ok(Some(span))
    }

    /// Drop all open and completed spans.
    pub fn reset(&mut self) {
        self.open.clear();
        self.completed.clear();
    }

    /// Completed spans since the last reset.
    pub fn report(&self) -> TimingReport {
        TimingReport {
            spans: self.completed.clone(),
        }
    }

    /// Like [`report`][Self::report] but leaves the timer empty.
    pub fn take_report(&mut self) -> TimingReport {
        self.open.clear();
        TimingReport {
            spans: std::mem::take(&mut self.completed),
        }
    }
}
