//! # Ember Core
//!
//! Small utilities shared by every Ember crate:
//! - [`profiling`] - Tracy macros, compiled out unless the `profiling` feature is on
//! - [`timing`] - named CPU scope timers read back by the renderer's telemetry

pub mod profiling;
pub mod timing;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core crate version. Call once at startup.
pub fn init() {
    log::info!("Ember Core v{} initialized", VERSION);
}
