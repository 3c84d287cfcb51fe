use thiserror::Error;

/// User-visible workflow failures.
///
/// Every variant is recoverable by retrying the triggering action; none is
/// fatal to the process. Collaborator failures are converted into this
/// taxonomy at the call site and never left to propagate unhandled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("camera access denied: {0}")]
    CameraAccessDenied(String),
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("video playback failed: {0}")]
    PlaybackFailed(String),
    #[error("model load failed: {0}")]
    ModelLoadFailed(String),
    #[error("classification failed: {0}")]
    ClassificationFailed(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
