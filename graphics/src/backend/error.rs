//! Backend error types.

/// Errors reported by a device, presentation surface or window implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Failed to initialize the backend.
    #[error("backend initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource or synchronization object.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A handle does not belong to this backend or was already destroyed.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),
    /// An object was used in a state that does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A wait did not complete.
    #[error("wait timed out")]
    Timeout,
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// The presentation surface was lost.
    #[error("presentation surface lost")]
    SurfaceLost,
    /// Internal backend error.
    #[error("internal backend error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Whether the failure concerns the presentation surface rather than the device.
    pub fn is_surface_error(&self) -> bool {
        matches!(self, Self::SurfaceLost)
    }
}

/// Result type of backend calls.
pub type BackendResult<T> = Result<T, BackendError>;
