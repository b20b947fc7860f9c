//! Named CPU scope timers.
//!
//! A [`CpuProfiler`] keeps the most recent duration recorded under each label.
//! It is a plain value: whoever needs timings owns one (the renderer's
//! telemetry collector does) and hands out `&CpuProfiler` to the code being
//! measured. Scopes are opened through a shared reference, so nested and
//! sequential scopes can be active while the profiler is borrowed elsewhere.
//!
//! ```
//! use ember_core::timing::CpuProfiler;
//!
//! let profiler = CpuProfiler::new();
//! {
//!     let _scope = profiler.scope("Culling");
//!     // ... work ...
//! }
//! assert!(profiler.last_time("Culling").is_some());
//! ```

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Convert a duration to fractional milliseconds.
#[inline]
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// One named duration, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSample {
    /// Label shared by the CPU and GPU readouts of the same work.
    pub name: &'static str,
    /// Duration in milliseconds.
    pub milliseconds: f64,
}

/// Collects the last recorded duration for each named CPU scope.
#[derive(Debug, Default)]
pub struct CpuProfiler {
    samples: Mutex<Vec<TimingSample>>,
}

impl CpuProfiler {
    /// Create an empty profiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `name`; the duration is recorded when the guard drops.
    pub fn scope(&self, name: &'static str) -> CpuScope<'_> {
        CpuScope {
            profiler: self,
            name,
            start: Instant::now(),
            #[cfg(feature = "profiling")]
            _span: tracy_client::Client::running()
                .map(|client| client.span_alloc(Some(name), "", file!(), line!(), 0)),
        }
    }

    /// Record a duration measured elsewhere, replacing the previous value.
    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let milliseconds = duration_ms(elapsed);
        let mut samples = self.samples.lock();
        match samples.iter_mut().find(|sample| sample.name == name) {
            Some(sample) => sample.milliseconds = milliseconds,
            None => samples.push(TimingSample { name, milliseconds }),
        }
        log::trace!("CPU scope '{}' took {:.3} ms", name, milliseconds);
    }

    /// Most recent duration recorded under `name`, in milliseconds.
    pub fn last_time(&self, name: &str) -> Option<f64> {
        self.samples
            .lock()
            .iter()
            .find(|sample| sample.name == name)
            .map(|sample| sample.milliseconds)
    }

    /// Snapshot of every label recorded so far, in first-recorded order.
    pub fn samples(&self) -> Vec<TimingSample> {
        self.samples.lock().clone()
    }

    /// Forget all recorded durations.
    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

/// Guard returned by [`CpuProfiler::scope`].
#[must_use = "the scope is measured until this guard is dropped"]
pub struct CpuScope<'a> {
    profiler: &'a CpuProfiler,
    name: &'static str,
    start: Instant,
    #[cfg(feature = "profiling")]
    _span: Option<tracy_client::Span>,
}

impl CpuScope<'_> {
    /// Time elapsed since the scope was opened.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for CpuScope<'_> {
    fn drop(&mut self) {
        self.profiler.record(self.name, self.start.elapsed());
    }
}
