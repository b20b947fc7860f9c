//! Tracy instrumentation macros.
//!
//! Everything here compiles to nothing unless the `profiling` feature is
//! enabled, so the macros can stay in hot render loops permanently.
//!
//! ```bash
//! cargo run -p ember-demos --bin frame_benchmark --features profiling
//! ```
//!
//! Then attach the Tracy UI (<https://github.com/wolfpld/tracy/releases>) to
//! the running process.
//!
//! # Usage
//!
//! ```ignore
//! use ember_core::profiling::{frame_mark, profile_function, profile_scope};
//!
//! fn render_frame() {
//!     profile_function!();
//!     {
//!         profile_scope!("record_commands");
//!     }
//!     frame_mark!();
//! }
//! ```
//!
//! Named CPU durations that must be read back by the application (for
//! diagnostics or the benchmark capture) go through
//! [`CpuProfiler`](crate::timing::CpuProfiler) instead; its scopes forward to
//! Tracy as well when the feature is on.

#[cfg(feature = "profiling")]
pub use tracy_client::{
    self, Client, Span, frame_mark as tracy_frame_mark, plot as tracy_plot, span,
};

/// Mark the end of a rendered frame.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark the end of a rendered frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Open a span that lasts until the end of the enclosing scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Open a span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Open a span named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Open a function span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plot a value over time, e.g. instance counts or frame times.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

/// Send a message to Tracy's message log.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_message {
    ($msg:expr) => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.message($msg, 0);
        }
    };
}

/// Send a message (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_message {
    ($msg:expr) => {
        let _ = $msg;
    };
}

pub use crate::{frame_mark, profile_function, profile_message, profile_plot, profile_scope};
