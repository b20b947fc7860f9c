//! Graphics error types.
//!
//! Surface states that the renderer recovers from on its own (out of date,
//! suboptimal) are *not* errors: acquire and present return them as
//! [`SurfaceStatus`](crate::backend::SurfaceStatus). Everything else that
//! reaches a [`GraphicsError`] is fatal for the frame loop, except a failed
//! benchmark write, which [`GraphicsError::is_fatal`] reports as survivable.

use crate::backend::BackendError;
use crate::graph::GraphError;

/// Coarse classification of a [`GraphicsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The presentation surface could not be brought back to a usable state.
    Surface,
    /// The device or one of its objects failed.
    Device,
    /// The frame graph was assembled incorrectly.
    Graph,
    /// A pass reported a failure while preparing its resources.
    Pass,
    /// Writing a diagnostic artifact failed.
    Io,
}

/// Errors surfaced by the renderer.
#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    /// A backend call failed.
    #[error("failed to {operation}: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
    /// Acquire still reported an out-of-date surface after recreation.
    #[error("surface still out of date after swapchain recreation")]
    SurfaceOutOfDate,
    /// Frame graph validation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A pass failed while compiling or reacting to a lifecycle event.
    #[error("pass '{pass}' failed: {message}")]
    Pass { pass: String, message: String },
    /// Writing the benchmark artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphicsError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend { source, .. } if source.is_surface_error() => ErrorKind::Surface,
            Self::Backend { .. } => ErrorKind::Device,
            Self::SurfaceOutOfDate => ErrorKind::Surface,
            Self::Graph(_) => ErrorKind::Graph,
            Self::Pass { .. } => ErrorKind::Pass,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the frame loop must stop.
    ///
    /// Only I/O failures of diagnostic output are survivable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io(_))
    }

    /// Build a pass error.
    pub fn pass(pass: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pass {
            pass: pass.into(),
            message: message.into(),
        }
    }
}

/// Attach the name of the failing operation to a backend result.
pub(crate) trait BackendResultExt<T> {
    fn during(self, operation: &'static str) -> Result<T, GraphicsError>;
}

impl<T> BackendResultExt<T> for Result<T, BackendError> {
    fn during(self, operation: &'static str) -> Result<T, GraphicsError> {
        self.map_err(|source| GraphicsError::Backend { operation, source })
    }
}
