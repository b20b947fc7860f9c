//! # Ember Demos
//!
//! Procedural scenes used to benchmark the renderer.
//!
//! ## Available Demos
//!
//! - `frame_benchmark` - drives the renderer headlessly over one of the
//!   [`DemoScene`]s and writes the benchmark CSV

pub mod scenes;

pub use scenes::DemoScene;

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
