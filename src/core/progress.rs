// ─── Progress Reporting ───
// One `(fraction, message)` callback threaded through downloads and installs.

use std::sync::{Arc, Mutex};

/// Callback invoked with an overall fraction in `[0, 1]` and a status line.
pub type ProgressFn = Arc<dyn Fn(f64, &str) + Send + Sync>;

struct Shared {
    callback: ProgressFn,
    last: Mutex<f64>,
}

/// Reports progress to a caller-supplied callback.
///
/// Reported fractions never decrease, even when several concurrent
/// downloads report through the same reporter. `scoped` hands a sub-range
/// of the bar to a nested step.
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Option<Arc<Shared>>,
    start: f64,
    span: f64,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("start", &self.start)
            .field("span", &self.span)
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(callback: ProgressFn) -> Self {
        Self {
            shared: Some(Arc::new(Shared {
                callback,
                last: Mutex::new(0.0),
            })),
            start: 0.0,
            span: 1.0,
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(f64, &str) + Send + Sync + 'static,
    {
        Self::new(Arc::new(f))
    }

    /// A reporter that discards everything.
    pub fn silent() -> Self {
        Self {
            shared: None,
            start: 0.0,
            span: 1.0,
        }
    }

    /// Report `fraction` of this reporter's range.
    pub fn report(&self, fraction: f64, message: &str) {
        let Some(shared) = &self.shared else {
            return;
        };

        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let value = (self.start + self.span * fraction).clamp(0.0, 1.0);

        let mut last = match shared.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let value = value.max(*last);
        *last = value;
        (shared.callback)(value, message);
    }

    /// A child reporter covering `[from, to]` of this reporter's range.
    pub fn scoped(&self, from: f64, to: f64) -> Self {
        let from = from.clamp(0.0, 1.0);
        let to = to.clamp(from, 1.0);
        Self {
            shared: self.shared.clone(),
            start: self.start + self.span * from,
            span: self.span * (to - from),
        }
    }
}
